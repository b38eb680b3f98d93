use tracing::debug;

use common::{Error, Result, Trade, TradeDirection};

use crate::config::StrategyConfig;
use crate::frame::{CandleFrame, SignalKind};
use crate::indicators::{crossed_above, crossed_below, ema, ewm};
use crate::strategies::{base_settings, map_mask, PositionPlan};
use crate::{Adjustment, AnalysisContext, PositionTick, Strategy, StrategySettings};

const FAST: &str = "ema_fast";
const SLOW: &str = "ema_slow";

/// How the moving averages are seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmaKind {
    /// SMA-seeded EMA with a warm-up prefix.
    Classic,
    /// Recursive EMA seeded with the first close, no warm-up.
    Ewm,
}

/// Fast/slow EMA crossover with optional position management.
///
/// Enters when the fast EMA crosses above the slow one and exits on the
/// opposite cross. Shorts mirror both when enabled.
pub struct EmaCrossStrategy {
    cfg: StrategyConfig,
    settings: StrategySettings,
    fast: usize,
    slow: usize,
    kind: EmaKind,
    short: bool,
    exit_on_cross: bool,
    /// Exit when a single candle gains at least this much (close / open - 1).
    candle_gain_exit: Option<f64>,
    plan: PositionPlan,
}

impl EmaCrossStrategy {
    pub fn from_config(cfg: &StrategyConfig) -> Result<Self> {
        let fast = cfg.param_usize("fast", 15)?;
        let slow = cfg.param_usize("slow", 30)?;
        if fast == 0 || fast >= slow {
            return Err(Error::Config(format!(
                "strategy '{}': fast EMA ({fast}) must be shorter than slow ({slow})",
                cfg.name
            )));
        }
        let kind = match cfg.param_str("ema", "classic") {
            "classic" => EmaKind::Classic,
            "ewm" => EmaKind::Ewm,
            other => {
                return Err(Error::Config(format!(
                    "strategy '{}': unknown ema kind '{other}'",
                    cfg.name
                )))
            }
        };

        let plan = PositionPlan::from_config(cfg)?;
        let mut settings = base_settings(cfg, "30m", -0.05)?;
        plan.apply(&mut settings);

        Ok(Self {
            cfg: cfg.clone(),
            settings,
            fast,
            slow,
            kind,
            short: cfg.param_bool("short", false),
            exit_on_cross: cfg.param_bool("exit_on_cross", true),
            candle_gain_exit: cfg.param_opt_f64("candle_gain_exit"),
            plan,
        })
    }

    fn average(&self, closes: &[f64], period: usize) -> Vec<f64> {
        match self.kind {
            EmaKind::Classic => ema(closes, period),
            EmaKind::Ewm => ewm(closes, period),
        }
    }
}

impl Strategy for EmaCrossStrategy {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn pair(&self) -> &str {
        &self.cfg.pair
    }

    fn settings(&self) -> &StrategySettings {
        &self.settings
    }

    fn populate_indicators(&self, frame: &mut CandleFrame, _ctx: &AnalysisContext<'_>) -> Result<()> {
        let fast = self.average(frame.close(), self.fast);
        let slow = self.average(frame.close(), self.slow);
        frame.set_column(FAST, fast)?;
        frame.set_column(SLOW, slow)
    }

    fn populate_entry_trend(&self, frame: &mut CandleFrame, _ctx: &AnalysisContext<'_>) -> Result<()> {
        let up = crossed_above(frame.column(FAST)?, frame.column(SLOW)?);
        debug!(strategy = %self.cfg.name, crosses = up.iter().filter(|x| **x).count(), "EMA crosses up");
        frame.mark_tagged(SignalKind::EnterLong, &up, "ema_cross")?;
        if self.short {
            let down = crossed_below(frame.column(FAST)?, frame.column(SLOW)?);
            frame.mark_tagged(SignalKind::EnterShort, &down, "ema_cross")?;
        }
        Ok(())
    }

    fn populate_exit_trend(&self, frame: &mut CandleFrame, _ctx: &AnalysisContext<'_>) -> Result<()> {
        if self.exit_on_cross {
            let down = crossed_below(frame.column(FAST)?, frame.column(SLOW)?);
            frame.mark_tagged(SignalKind::ExitLong, &down, "ema_cross")?;
            if self.short {
                let up = crossed_above(frame.column(FAST)?, frame.column(SLOW)?);
                frame.mark_tagged(SignalKind::ExitShort, &up, "ema_cross")?;
            }
        }
        if let Some(gain) = self.candle_gain_exit {
            let body: Vec<f64> = frame
                .close()
                .iter()
                .zip(frame.open())
                .map(|(c, o)| if *o > 0.0 { c / o - 1.0 } else { f64::NAN })
                .collect();
            let mask = map_mask(&body, |g| g >= gain);
            frame.set_column("candle_gain", body)?;
            frame.mark_tagged(SignalKind::ExitLong, &mask, "candle_gain")?;
        }
        Ok(())
    }

    fn custom_stoploss(&self, trade: &mut Trade, tick: &PositionTick) -> Result<Option<f64>> {
        self.plan.stoploss(trade, tick)
    }

    fn adjust_trade_position(&self, trade: &mut Trade, tick: &PositionTick) -> Result<Option<Adjustment>> {
        self.plan.adjust(trade, tick)
    }

    fn leverage(&self, _proposed: f64, max: f64, _side: TradeDirection) -> f64 {
        self.plan.leverage(max)
    }
}

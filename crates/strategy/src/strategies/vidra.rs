use tracing::debug;

use common::{CandleType, Error, Result, Timeframe, Trade, TradeDirection};

use crate::config::StrategyConfig;
use crate::frame::{CandleFrame, SignalKind};
use crate::indicators::{adx, ema, last_defined, MacdIndicator, RsiIndicator};
use crate::orderbook::DepthMode;
use crate::strategies::{
    and, base_settings, falling, fetch_book, gated, macd_periods, map_mask, or, rising, rsi_bands,
    zip_mask, DepthGate, PositionPlan,
};
use crate::{Adjustment, AnalysisContext, Informative, PositionTick, Strategy, StrategySettings};

/// Trend filter layered on top of the order-book entry.
#[derive(Debug, Clone)]
pub enum Trend {
    /// RSI on a slower timeframe: enter under the buy band, exit over the sell band.
    InformativeRsi { timeframe: Timeframe, rsi: RsiIndicator },
    /// EMA pair on a slower timeframe: enter while fast > slow, exit on inversion.
    InformativeEma { timeframe: Timeframe, fast: usize, slow: usize },
    /// Base-timeframe trend stack: price and short EMA over the long EMA,
    /// MACD over its signal, ADX over a threshold, RSI under the buy band.
    EmaMacdAdx {
        rsi: RsiIndicator,
        ema_short: usize,
        ema_long: usize,
        macd: MacdIndicator,
        adx_period: usize,
        adx_threshold: f64,
    },
}

/// Depth-of-market entries with a trend filter, a DCA ladder and staged
/// take-profits.
pub struct VidraStrategy {
    cfg: StrategyConfig,
    settings: StrategySettings,
    gate: DepthGate,
    trend: Trend,
    plan: PositionPlan,
}

impl VidraStrategy {
    pub fn from_config(cfg: &StrategyConfig) -> Result<Self> {
        let plan = PositionPlan::from_config(cfg)?;
        let mut settings = base_settings(cfg, "5m", -0.1)?;
        plan.apply(&mut settings);

        let informative_tf = || -> Result<Timeframe> {
            let tf: Timeframe = cfg.param_str("informative_timeframe", "1h").parse()?;
            if tf <= settings.timeframe {
                return Err(Error::Config(format!(
                    "strategy '{}': informative timeframe {tf} must be longer than {}",
                    cfg.name, settings.timeframe
                )));
            }
            Ok(tf)
        };

        let trend = match cfg.param_str("trend", "informative_rsi") {
            "informative_rsi" => Trend::InformativeRsi { timeframe: informative_tf()?, rsi: rsi_bands(cfg)? },
            "informative_ema" => Trend::InformativeEma {
                timeframe: informative_tf()?,
                fast: cfg.param_usize("ema_fast", 20)?,
                slow: cfg.param_usize("ema_slow", 30)?,
            },
            "ema_macd_adx" => Trend::EmaMacdAdx {
                rsi: rsi_bands(cfg)?,
                ema_short: cfg.param_usize("ema_short", 50)?,
                ema_long: cfg.param_usize("ema_long", 200)?,
                macd: macd_periods(cfg)?,
                adx_period: cfg.param_usize("adx_period", 14)?,
                adx_threshold: cfg.param_f64("adx_threshold", 20.0),
            },
            other => {
                return Err(Error::Config(format!(
                    "strategy '{}': unknown trend filter '{other}'",
                    cfg.name
                )))
            }
        };

        Ok(Self {
            cfg: cfg.clone(),
            gate: DepthGate::from_config(cfg, "", settings.timeframe, DepthMode::BidsOverAsks)?,
            settings,
            trend,
            plan,
        })
    }

    /// Entry-side trend mask.
    fn trend_up(&self, frame: &CandleFrame) -> Result<Vec<bool>> {
        match &self.trend {
            Trend::InformativeRsi { timeframe, rsi } => {
                Ok(map_mask(frame.column(&format!("rsi_{timeframe}"))?, |r| rsi.is_oversold(r)))
            }
            Trend::InformativeEma { timeframe, .. } => Ok(zip_mask(
                frame.column(&format!("ema_fast_{timeframe}"))?,
                frame.column(&format!("ema_slow_{timeframe}"))?,
                |f, s| f > s,
            )),
            Trend::EmaMacdAdx { rsi, adx_threshold, .. } => {
                let above_long = zip_mask(frame.close(), frame.column("ema_long")?, |c, l| c > l);
                let stacked = zip_mask(frame.column("ema_short")?, frame.column("ema_long")?, |s, l| s > l);
                let macd_up = zip_mask(frame.column("macd")?, frame.column("macdsignal")?, |m, s| m > s);
                let strong = map_mask(frame.column("adx")?, |a| a > *adx_threshold);
                let dip = map_mask(frame.column("rsi")?, |r| rsi.is_oversold(r));
                Ok(and(&and(&and(&above_long, &stacked), &and(&macd_up, &strong)), &dip))
            }
        }
    }
}

impl Strategy for VidraStrategy {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn pair(&self) -> &str {
        &self.cfg.pair
    }

    fn settings(&self) -> &StrategySettings {
        &self.settings
    }

    fn informative(&self) -> Vec<Informative> {
        let timeframe = match &self.trend {
            Trend::InformativeRsi { timeframe, .. } | Trend::InformativeEma { timeframe, .. } => *timeframe,
            Trend::EmaMacdAdx { .. } => return Vec::new(),
        };
        vec![Informative {
            pair: self.cfg.pair.clone(),
            timeframe,
            candle_type: CandleType::Spot,
        }]
    }

    fn populate_informative(&self, _informative: &Informative, frame: &mut CandleFrame) -> Result<()> {
        match &self.trend {
            Trend::InformativeRsi { rsi, .. } => {
                let values = rsi.series(frame.close());
                frame.set_column("rsi", values)
            }
            Trend::InformativeEma { fast, slow, .. } => {
                let f = ema(frame.close(), *fast);
                let s = ema(frame.close(), *slow);
                frame.set_column("ema_fast", f)?;
                frame.set_column("ema_slow", s)
            }
            Trend::EmaMacdAdx { .. } => Ok(()),
        }
    }

    fn populate_indicators(&self, frame: &mut CandleFrame, _ctx: &AnalysisContext<'_>) -> Result<()> {
        if let Trend::EmaMacdAdx { rsi, ema_short, ema_long, macd, adx_period, .. } = &self.trend {
            let r = rsi.series(frame.close());
            let short = ema(frame.close(), *ema_short);
            let long = ema(frame.close(), *ema_long);
            let series = macd.series(frame.close());
            let strength = adx(frame.high(), frame.low(), frame.close(), *adx_period);
            frame.set_column("rsi", r)?;
            frame.set_column("ema_short", short)?;
            frame.set_column("ema_long", long)?;
            frame.set_column("macd", series.macd)?;
            frame.set_column("macdsignal", series.signal)?;
            frame.set_column("macdhist", series.hist)?;
            frame.set_column("adx", strength)?;
            debug!(
                strategy = %self.cfg.name,
                macd = ?last_defined(frame.column("macd")?),
                signal = ?last_defined(frame.column("macdsignal")?),
                "MACD"
            );
        }
        Ok(())
    }

    fn populate_entry_trend(&self, frame: &mut CandleFrame, ctx: &AnalysisContext<'_>) -> Result<()> {
        let book = fetch_book(ctx, &[self.gate.check.depth])?;
        let gate = self.gate.passes(&book);
        debug!(strategy = %self.cfg.name, gate, "Depth gate");

        let setup = and(&rising(frame.volume()), &falling(frame.close()));
        let entries = and(&setup, &self.trend_up(frame)?);
        frame.mark_tagged(SignalKind::EnterLong, &gated(entries, gate), "vidra")
    }

    fn populate_exit_trend(&self, frame: &mut CandleFrame, _ctx: &AnalysisContext<'_>) -> Result<()> {
        let exits = match &self.trend {
            Trend::InformativeRsi { timeframe, rsi } => {
                map_mask(frame.column(&format!("rsi_{timeframe}"))?, |r| rsi.is_overbought(r))
            }
            Trend::InformativeEma { timeframe, .. } => zip_mask(
                frame.column(&format!("ema_slow_{timeframe}"))?,
                frame.column(&format!("ema_fast_{timeframe}"))?,
                |s, f| s > f,
            ),
            Trend::EmaMacdAdx { rsi, .. } => {
                let hot = map_mask(frame.column("rsi")?, |r| rsi.is_overbought(r));
                let broken = zip_mask(frame.close(), frame.column("ema_long")?, |c, l| c < l);
                let macd_down = zip_mask(frame.column("macd")?, frame.column("macdsignal")?, |m, s| m < s);
                or(&or(&hot, &broken), &macd_down)
            }
        };
        frame.mark_tagged(SignalKind::ExitLong, &exits, "trend_exit")
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

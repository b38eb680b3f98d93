//! The strategy catalog.
//!
//! Each family is parameterised from its `[strategy.params]` table; the
//! shipped presets live in `config/strategies.toml`.

pub mod depth;
pub mod ema_cross;
pub mod ema_stoch_rsi;
pub mod support_resistance;
pub mod vidra;

pub use depth::DepthStrategy;
pub use ema_cross::EmaCrossStrategy;
pub use ema_stoch_rsi::EmaStochRsiStrategy;
pub use support_resistance::SupportResistanceStrategy;
pub use vidra::VidraStrategy;

use std::collections::BTreeMap;

use chrono::Duration;
use tracing::info;

use common::{Error, OrderBook, Result, Timeframe, Trade};

use crate::config::StrategyConfig;
use crate::exits::{
    BreakEven, DcaLevel, DrawdownLadder, MaxRateTrail, ProfitTargets, Stage, StagedLadder, Target,
};
use crate::indicators::{shift, MacdIndicator, RsiIndicator};
use crate::orderbook::{has_large_orders, DepthCheck, DepthMode};
use crate::{
    Adjustment, AnalysisContext, OrderKind, OrderTypes, PositionTick, StrategySettings, TrailingStop,
};

// ─── Settings ────────────────────────────────────────────────────────────────

/// Settings every family reads the same way.
pub(crate) fn base_settings(
    cfg: &StrategyConfig,
    default_timeframe: &str,
    default_stoploss: f64,
) -> Result<StrategySettings> {
    let mut settings = StrategySettings::new(
        cfg.timeframe_or(default_timeframe)?,
        cfg.param_f64("stoploss", default_stoploss),
    );
    if settings.stoploss >= 0.0 {
        return Err(Error::Config(format!(
            "strategy '{}': stoploss must be negative, got {}",
            cfg.name, settings.stoploss
        )));
    }

    if let (Some(positive), Some(offset)) = (
        cfg.param_opt_f64("trailing_positive"),
        cfg.param_opt_f64("trailing_offset"),
    ) {
        settings.trailing = Some(TrailingStop {
            positive,
            offset,
            only_offset_is_reached: cfg.param_bool("trailing_only_offset_is_reached", false),
        });
    }

    let mut roi = BTreeMap::new();
    for (minutes, ratio) in cfg.param_table_f64("minimal_roi")? {
        let minutes: u64 = minutes.parse().map_err(|_| {
            Error::Config(format!(
                "strategy '{}': minimal_roi key '{minutes}' is not a number of minutes",
                cfg.name
            ))
        })?;
        roi.insert(minutes, ratio);
    }
    settings.minimal_roi = roi;

    settings.can_short = cfg.param_bool("can_short", cfg.param_bool("short", false));
    settings.use_exit_signal = cfg.param_bool("use_exit_signal", true);
    settings.exit_profit_only = cfg.param_bool("exit_profit_only", false);

    let order = |key: &str, default: OrderKind| -> Result<OrderKind> {
        if !cfg.has_param(key) {
            return Ok(default);
        }
        cfg.param_str(key, "").parse().map_err(|e| named(cfg, e))
    };
    let defaults = OrderTypes::default();
    settings.order_types = OrderTypes {
        entry: order("entry_order", defaults.entry)?,
        exit: order("exit_order", defaults.exit)?,
        stoploss: order("stoploss_order", defaults.stoploss)?,
    };
    Ok(settings)
}

// ─── Position management ─────────────────────────────────────────────────────

/// The exit and stop building blocks a preset switches on.
#[derive(Debug, Clone, Default)]
pub struct PositionPlan {
    pub ladder: Option<StagedLadder>,
    pub drawdown: Option<DrawdownLadder>,
    pub targets: Option<ProfitTargets>,
    pub break_even: Option<BreakEven>,
    pub trail: Option<MaxRateTrail>,
    /// Close everything this long after entry once stage 1 has been sold.
    pub time_exit: Option<Duration>,
    pub leverage: f64,
}

impl PositionPlan {
    pub fn from_config(cfg: &StrategyConfig) -> Result<Self> {
        let stages: Vec<Stage> = cfg
            .param_pairs("stages")?
            .into_iter()
            .map(|(threshold, fraction)| Stage { threshold, fraction })
            .collect();
        let dca: Vec<DcaLevel> = cfg
            .param_pairs("dca")?
            .into_iter()
            .map(|(level, fraction)| DcaLevel { level, fraction })
            .collect();
        let final_target = cfg.param_opt_f64("final_target");

        if stages.windows(2).any(|w| w[0].threshold > w[1].threshold) {
            return Err(Error::Config(format!(
                "strategy '{}': stages must be sorted by threshold",
                cfg.name
            )));
        }
        if dca.iter().any(|d| d.level >= 0.0) {
            return Err(Error::Config(format!(
                "strategy '{}': dca levels must be negative",
                cfg.name
            )));
        }

        let ladder = (!stages.is_empty() || !dca.is_empty() || final_target.is_some())
            .then(|| StagedLadder::new(stages, final_target).with_dca(dca));

        let targets: Vec<Target> = cfg
            .param_pairs("targets")?
            .into_iter()
            .map(|(profit, fraction)| Target { profit, fraction })
            .collect();

        Ok(Self {
            ladder,
            drawdown: cfg.param_opt_f64("pullback_limit").map(DrawdownLadder::new),
            targets: (!targets.is_empty()).then(|| ProfitTargets::new(targets)),
            break_even: cfg.param_opt_f64("break_even_trigger").map(|trigger| BreakEven {
                trigger,
                offset: cfg.param_f64("break_even_offset", 0.002),
            }),
            trail: cfg.param_opt_f64("trail_activation").map(|activation| MaxRateTrail {
                activation,
                distance: cfg.param_f64("trail_distance", 0.035),
            }),
            time_exit: cfg
                .param_opt_f64("time_exit_days")
                .map(|days| Duration::seconds((days * 86_400.0) as i64)),
            leverage: cfg.param_f64("leverage", 1.0),
        })
    }

    /// Switch on the host hooks this plan needs.
    pub fn apply(&self, settings: &mut StrategySettings) {
        settings.position_adjustment = self.ladder.is_some()
            || self.drawdown.is_some()
            || self.targets.is_some()
            || self.time_exit.is_some();
        settings.use_custom_stoploss =
            self.break_even.is_some() || self.trail.is_some() || self.targets.is_some();
    }

    /// Tightest of the stops the plan proposes.
    pub fn stoploss(&self, trade: &mut Trade, tick: &PositionTick) -> Result<Option<f64>> {
        let mut candidates = Vec::new();
        if let Some(be) = &self.break_even {
            candidates.extend(be.evaluate(trade, tick.current_rate, tick.current_profit)?);
        }
        if let Some(trail) = &self.trail {
            candidates.extend(trail.evaluate(trade, tick.current_rate, tick.current_profit));
        }
        if let Some(targets) = &self.targets {
            candidates.extend(targets.stoploss(trade, tick.current_rate));
        }
        Ok(candidates.into_iter().reduce(f64::min))
    }

    pub fn adjust(&self, trade: &mut Trade, tick: &PositionTick) -> Result<Option<Adjustment>> {
        if let Some(limit) = self.time_exit {
            if tick.current_time - trade.open_date >= limit && StagedLadder::first_stage_sold(trade) {
                info!(trade_id = %trade.id, pair = %trade.pair, "Time limit reached after first stage, closing");
                return Ok(Some(Adjustment::decrease(trade.stake_amount, "time_exit")));
            }
        }
        if let Some(ladder) = &self.ladder {
            if let Some(action) = ladder.evaluate(trade, tick.current_rate)? {
                return Ok(Some(action));
            }
        }
        if let Some(drawdown) = &self.drawdown {
            if let Some(action) = drawdown.evaluate(trade, tick.current_rate)? {
                return Ok(Some(action));
            }
        }
        if let Some(targets) = &self.targets {
            return targets.evaluate(trade, tick.current_rate);
        }
        Ok(None)
    }

    pub fn leverage(&self, max: f64) -> f64 {
        self.leverage.min(max).max(1.0)
    }
}

// ─── Order-book gate ─────────────────────────────────────────────────────────

/// Depth-of-market plus large-order check applied to a whole analysis pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthGate {
    pub check: DepthCheck,
    pub volume_threshold: f64,
    pub mode: DepthMode,
}

impl DepthGate {
    /// Reads `{prefix}depth`, `{prefix}delta` and `{prefix}volume_threshold`,
    /// overridden by a `depth_settings` row for `timeframe` when present
    /// (`"5m" = [delta, depth, volume_threshold]`).
    pub fn from_config(
        cfg: &StrategyConfig,
        prefix: &str,
        timeframe: Timeframe,
        mode: DepthMode,
    ) -> Result<Self> {
        let mut delta = cfg.param_f64(&format!("{prefix}delta"), 1.3);
        let mut depth = cfg.param_usize(&format!("{prefix}depth"), 7)?;
        let mut volume_threshold = cfg.param_f64(&format!("{prefix}volume_threshold"), 500.0);

        let key = timeframe.to_string();
        if prefix.is_empty() {
            if let Some((_, row)) = cfg
                .param_table_list("depth_settings")?
                .into_iter()
                .find(|(tf, _)| *tf == key)
            {
                match row.as_slice() {
                    [d, n, v] if *n >= 0.0 && n.fract() == 0.0 => {
                        delta = *d;
                        depth = *n as usize;
                        volume_threshold = *v;
                    }
                    _ => {
                        return Err(Error::Config(format!(
                            "strategy '{}': depth_settings.{key} must be [delta, depth, volume_threshold]",
                            cfg.name
                        )))
                    }
                }
            }
        }

        Ok(Self {
            check: DepthCheck::new(depth, delta),
            volume_threshold,
            mode,
        })
    }

    pub fn passes(&self, book: &OrderBook) -> bool {
        self.check.passes(book, self.mode) && has_large_orders(book, self.volume_threshold)
    }
}

// ─── Indicator parameters ────────────────────────────────────────────────────

/// `rsi_period` with `rsi_sell` / `rsi_buy` bands.
pub(crate) fn rsi_bands(cfg: &StrategyConfig) -> Result<RsiIndicator> {
    RsiIndicator::new(
        cfg.param_usize("rsi_period", 14)?,
        cfg.param_f64("rsi_sell", 70.0),
        cfg.param_f64("rsi_buy", 35.0),
    )
    .map_err(|e| named(cfg, e))
}

/// `macd_fast` / `macd_slow` / `macd_signal`.
pub(crate) fn macd_periods(cfg: &StrategyConfig) -> Result<MacdIndicator> {
    MacdIndicator::new(
        cfg.param_usize("macd_fast", 12)?,
        cfg.param_usize("macd_slow", 26)?,
        cfg.param_usize("macd_signal", 9)?,
    )
    .map_err(|e| named(cfg, e))
}

fn named(cfg: &StrategyConfig, err: Error) -> Error {
    match err {
        Error::Config(msg) => Error::Config(format!("strategy '{}': {msg}", cfg.name)),
        other => other,
    }
}

/// Snapshot deep enough for every gate in `depths`.
pub(crate) fn fetch_book(ctx: &AnalysisContext<'_>, depths: &[usize]) -> Result<OrderBook> {
    let depth = depths.iter().copied().max().unwrap_or(0);
    ctx.data.orderbook(ctx.pair, depth + 1)
}

// ─── Mask helpers ────────────────────────────────────────────────────────────

/// Row-wise predicate over two columns; `NaN` rows read false.
pub(crate) fn zip_mask(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> bool) -> Vec<bool> {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| !x.is_nan() && !y.is_nan() && f(x, y))
        .collect()
}

pub(crate) fn map_mask(a: &[f64], f: impl Fn(f64) -> bool) -> Vec<bool> {
    a.iter().map(|&x| !x.is_nan() && f(x)).collect()
}

/// `values[i] > values[i - 1]`
pub(crate) fn rising(values: &[f64]) -> Vec<bool> {
    zip_mask(values, &shift(values, 1), |now, prev| now > prev)
}

/// `values[i] < values[i - 1]`
pub(crate) fn falling(values: &[f64]) -> Vec<bool> {
    zip_mask(values, &shift(values, 1), |now, prev| now < prev)
}

pub(crate) fn and(a: &[bool], b: &[bool]) -> Vec<bool> {
    a.iter().zip(b).map(|(x, y)| *x && *y).collect()
}

pub(crate) fn or(a: &[bool], b: &[bool]) -> Vec<bool> {
    a.iter().zip(b).map(|(x, y)| *x || *y).collect()
}

/// Broadcast a per-call condition (e.g. an order-book gate) over a mask.
pub(crate) fn gated(mask: Vec<bool>, gate: bool) -> Vec<bool> {
    if gate {
        mask
    } else {
        vec![false; mask.len()]
    }
}

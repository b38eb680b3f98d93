pub mod config;
pub mod exits;
pub mod frame;
pub mod indicators;
pub mod orderbook;
pub mod registry;
pub mod settings;
pub mod strategies;

pub use config::{StrategyConfig, StrategyFileConfig};
pub use frame::{resample, CandleFrame, SignalKind};
pub use registry::StrategyRegistry;
pub use settings::{Informative, OrderKind, OrderTypes, StrategySettings, TrailingStop};

use chrono::{DateTime, Utc};
use tracing::debug;

use common::{Candle, DataProvider, Result, Timeframe, Trade, TradeDirection};

/// What a strategy sees of the host while analysing a series.
pub struct AnalysisContext<'a> {
    pub pair: &'a str,
    pub timeframe: Timeframe,
    pub data: &'a dyn DataProvider,
}

/// Market state handed to the per-position callbacks.
#[derive(Debug, Clone)]
pub struct PositionTick {
    pub current_time: DateTime<Utc>,
    pub current_rate: f64,
    /// Leveraged profit ratio at `current_rate`.
    pub current_profit: f64,
    /// Last analysed row, when the host has one.
    pub last_candle: Option<Candle>,
}

/// Stake change requested by `adjust_trade_position`.
#[derive(Debug, Clone, PartialEq)]
pub enum Adjustment {
    Increase { stake: f64, tag: Option<String> },
    /// A decrease of at least the trade's stake closes it.
    Decrease { stake: f64, tag: Option<String> },
}

impl Adjustment {
    pub fn increase(stake: f64, tag: impl Into<String>) -> Self {
        Adjustment::Increase { stake, tag: Some(tag.into()) }
    }

    pub fn decrease(stake: f64, tag: impl Into<String>) -> Self {
        Adjustment::Decrease { stake, tag: Some(tag.into()) }
    }

    pub fn stake(&self) -> f64 {
        match self {
            Adjustment::Increase { stake, .. } | Adjustment::Decrease { stake, .. } => *stake,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            Adjustment::Increase { tag, .. } | Adjustment::Decrease { tag, .. } => tag.as_deref(),
        }
    }
}

/// All strategy implementations must satisfy this trait.
///
/// Callbacks take `&self`: anything a strategy must remember about a
/// position goes into `trade.custom_data`, which the host persists.
pub trait Strategy: Send + Sync {
    /// Human-readable name of this strategy instance.
    fn name(&self) -> &str;

    /// The trading pair this strategy trades (e.g. "SOLUSDT").
    fn pair(&self) -> &str;

    fn settings(&self) -> &StrategySettings;

    /// Extra series to merge into the frame before `populate_indicators`.
    fn informative(&self) -> Vec<Informative> {
        Vec::new()
    }

    /// Indicators computed on an informative series before it is merged.
    fn populate_informative(&self, _informative: &Informative, _frame: &mut CandleFrame) -> Result<()> {
        Ok(())
    }

    fn populate_indicators(&self, frame: &mut CandleFrame, ctx: &AnalysisContext<'_>) -> Result<()>;

    fn populate_entry_trend(&self, frame: &mut CandleFrame, ctx: &AnalysisContext<'_>) -> Result<()>;

    fn populate_exit_trend(&self, frame: &mut CandleFrame, ctx: &AnalysisContext<'_>) -> Result<()>;

    /// New stop distance from the current rate as a positive, leveraged
    /// ratio (`0.02` at 2x sits 1% away). `None` keeps the current stop.
    fn custom_stoploss(&self, _trade: &mut Trade, _tick: &PositionTick) -> Result<Option<f64>> {
        Ok(None)
    }

    fn adjust_trade_position(
        &self,
        _trade: &mut Trade,
        _tick: &PositionTick,
    ) -> Result<Option<Adjustment>> {
        Ok(None)
    }

    /// Exit reason when the strategy wants out right now.
    fn custom_exit(&self, _trade: &mut Trade, _tick: &PositionTick) -> Result<Option<String>> {
        Ok(None)
    }

    fn leverage(&self, _proposed: f64, _max: f64, _side: TradeDirection) -> f64 {
        1.0
    }
}

/// Build the analysed frame: merge informative series, then run the three
/// populate callbacks in order.
pub fn analyze(
    strategy: &dyn Strategy,
    candles: &[Candle],
    ctx: &AnalysisContext<'_>,
) -> Result<CandleFrame> {
    let mut frame = CandleFrame::from_candles(candles);

    for inf in strategy.informative() {
        let series = ctx.data.candles(&inf.pair, inf.timeframe, inf.candle_type)?;
        let mut inf_frame = CandleFrame::from_candles(&series);
        strategy.populate_informative(&inf, &mut inf_frame)?;
        frame.merge_informative(&inf_frame, ctx.timeframe, inf.timeframe)?;
        debug!(
            strategy = %strategy.name(),
            pair = %inf.pair,
            timeframe = %inf.timeframe,
            candle_type = %inf.candle_type,
            rows = series.len(),
            "Merged informative series"
        );
    }

    strategy.populate_indicators(&mut frame, ctx)?;
    strategy.populate_entry_trend(&mut frame, ctx)?;
    strategy.populate_exit_trend(&mut frame, ctx)?;
    Ok(frame)
}

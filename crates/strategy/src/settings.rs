use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use common::{CandleType, Error, Result, Timeframe};

/// Host-facing knobs a strategy declares once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySettings {
    pub timeframe: Timeframe,
    /// Static stop as a negative ratio of the stake, e.g. `-0.03`.
    pub stoploss: f64,
    #[serde(default)]
    pub trailing: Option<TrailingStop>,
    /// Minutes since entry -> profit ratio at which to take everything.
    #[serde(default)]
    pub minimal_roi: BTreeMap<u64, f64>,
    #[serde(default)]
    pub can_short: bool,
    #[serde(default)]
    pub position_adjustment: bool,
    #[serde(default)]
    pub use_custom_stoploss: bool,
    #[serde(default = "default_true")]
    pub use_exit_signal: bool,
    #[serde(default)]
    pub exit_profit_only: bool,
    #[serde(default)]
    pub order_types: OrderTypes,
}

fn default_true() -> bool {
    true
}

impl StrategySettings {
    pub fn new(timeframe: Timeframe, stoploss: f64) -> Self {
        Self {
            timeframe,
            stoploss,
            trailing: None,
            minimal_roi: BTreeMap::new(),
            can_short: false,
            position_adjustment: false,
            use_custom_stoploss: false,
            use_exit_signal: true,
            exit_profit_only: false,
            order_types: OrderTypes::default(),
        }
    }

    /// ROI target in force `minutes` after entry: the entry with the largest
    /// key not above `minutes`.
    pub fn roi_at(&self, minutes: u64) -> Option<f64> {
        self.minimal_roi
            .range(..=minutes)
            .next_back()
            .map(|(_, ratio)| *ratio)
    }
}

/// Host-side trailing stop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingStop {
    /// Distance kept below the best rate once `offset` is reached. `0.0`
    /// moves the stop to the entry rate instead.
    pub positive: f64,
    /// Profit that must be reached before `positive` applies.
    pub offset: f64,
    /// Trail only after `offset` is reached; before that the static stop holds.
    pub only_offset_is_reached: bool,
}

/// How the host fills an order. Limit orders fill at the quoted rate,
/// market orders pay the host's slippage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    #[default]
    Limit,
    Market,
}

impl std::str::FromStr for OrderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "limit" => Ok(Self::Limit),
            "market" => Ok(Self::Market),
            other => Err(Error::Config(format!("unknown order type '{other}'"))),
        }
    }
}

/// Order kind per fill purpose. Entries and DCA buys use `entry`; signal,
/// ROI, custom and partial exits use `exit`; stop hits use `stoploss`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTypes {
    pub entry: OrderKind,
    pub exit: OrderKind,
    pub stoploss: OrderKind,
}

impl Default for OrderTypes {
    fn default() -> Self {
        Self {
            entry: OrderKind::Limit,
            exit: OrderKind::Limit,
            stoploss: OrderKind::Market,
        }
    }
}

/// A secondary series the host must fetch and merge before analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct Informative {
    pub pair: String,
    pub timeframe: Timeframe,
    pub candle_type: CandleType,
}

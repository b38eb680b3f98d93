use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// One OHLCV record. Series are always ordered oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Kind of series requested from the host.
///
/// Funding-rate series reuse the candle shape; the rate sits in `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CandleType {
    #[default]
    Spot,
    Futures,
    FundingRate,
}

impl fmt::Display for CandleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandleType::Spot => write!(f, "spot"),
            CandleType::Futures => write!(f, "futures"),
            CandleType::FundingRate => write!(f, "funding_rate"),
        }
    }
}

/// Candle interval, e.g. `5m` or `1h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    secs: i64,
}

impl Timeframe {
    pub fn from_secs(secs: i64) -> Result<Self> {
        if secs <= 0 {
            return Err(Error::Config(format!("timeframe must be positive, got {secs}s")));
        }
        Ok(Self { secs })
    }

    pub fn secs(&self) -> i64 {
        self.secs
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.secs)
    }

    /// Start of the interval containing `ts`, aligned to the Unix epoch.
    pub fn floor(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let t = ts.timestamp();
        let floored = t - t.rem_euclid(self.secs);
        DateTime::from_timestamp(floored, 0).unwrap_or(ts)
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| Error::Config(format!("timeframe '{s}' has no unit")))?;
        let (num, unit) = s.split_at(split);
        let n: i64 = num
            .parse()
            .map_err(|_| Error::Config(format!("timeframe '{s}' has no count")))?;
        let unit_secs = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            "w" => 604_800,
            other => return Err(Error::Config(format!("unknown timeframe unit '{other}' in '{s}'"))),
        };
        let secs = n
            .checked_mul(unit_secs)
            .ok_or_else(|| Error::Config(format!("timeframe '{s}' is out of range")))?;
        Self::from_secs(secs)
    }
}

impl TryFrom<String> for Timeframe {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.to_string()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.secs;
        if s % 604_800 == 0 {
            write!(f, "{}w", s / 604_800)
        } else if s % 86_400 == 0 {
            write!(f, "{}d", s / 86_400)
        } else if s % 3_600 == 0 {
            write!(f, "{}h", s / 3_600)
        } else if s % 60 == 0 {
            write!(f, "{}m", s / 60)
        } else {
            write!(f, "{s}s")
        }
    }
}

/// One price level of an order book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

/// Point-in-time order book. Both sides are best-first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    /// Copy of the book truncated to `depth` levels per side.
    pub fn truncated(&self, depth: usize) -> Self {
        Self {
            bids: self.bids.iter().take(depth).copied().collect(),
            asks: self.asks.iter().take(depth).copied().collect(),
        }
    }
}

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Long,
    Short,
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeDirection::Long => write!(f, "long"),
            TradeDirection::Short => write!(f, "short"),
        }
    }
}

impl FromStr for TradeDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "long" => Ok(TradeDirection::Long),
            "short" => Ok(TradeDirection::Short),
            other => Err(Error::Other(format!("unknown trade direction '{other}'"))),
        }
    }
}

/// Side of a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Side that opens (or adds to) a position in `direction`.
    pub fn entering(direction: TradeDirection) -> Self {
        match direction {
            TradeDirection::Long => OrderSide::Buy,
            TradeDirection::Short => OrderSide::Sell,
        }
    }

    /// Side that reduces a position in `direction`.
    pub fn exiting(direction: TradeDirection) -> Self {
        match direction {
            TradeDirection::Long => OrderSide::Sell,
            TradeDirection::Short => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Named key-value flags the host persists alongside a position.
///
/// Strategies use it to remember which milestones were already acted on.
/// Any write that changes a value marks the bag dirty so the host knows to
/// persist it after the callback returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomData {
    values: BTreeMap<String, Value>,
    #[serde(skip)]
    dirty: bool,
}

impl CustomData {
    pub fn from_map(values: BTreeMap<String, Value>) -> Self {
        Self { values, dirty: false }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Boolean flag. Numbers count as set when non-zero.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(default),
            _ => default,
        }
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.values
            .get(key)
            .and_then(Value::as_f64)
            .unwrap_or(default)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if self.values.get(&key) != Some(&value) {
            self.values.insert(key, value);
            self.dirty = true;
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.values.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns whether the bag changed since the last call and clears the marker.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// An open position as the host exposes it to strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub pair: String,
    pub direction: TradeDirection,
    /// Average entry price.
    pub open_rate: f64,
    pub open_date: DateTime<Utc>,
    /// Capital currently committed, in quote currency.
    pub stake_amount: f64,
    /// Position size in base asset units.
    pub amount: f64,
    pub leverage: f64,
    /// Highest rate seen while open.
    pub max_rate: f64,
    /// Lowest rate seen while open.
    pub min_rate: f64,
    pub enter_tag: Option<String>,
    pub custom_data: CustomData,
}

impl Trade {
    pub fn open(
        pair: impl Into<String>,
        direction: TradeDirection,
        rate: f64,
        stake_amount: f64,
        leverage: f64,
        open_date: DateTime<Utc>,
    ) -> Self {
        let leverage = if leverage > 0.0 { leverage } else { 1.0 };
        let amount = if rate > 0.0 { stake_amount * leverage / rate } else { 0.0 };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pair: pair.into(),
            direction,
            open_rate: rate,
            open_date,
            stake_amount,
            amount,
            leverage,
            max_rate: rate,
            min_rate: rate,
            enter_tag: None,
            custom_data: CustomData::default(),
        }
    }

    pub fn is_short(&self) -> bool {
        self.direction == TradeDirection::Short
    }

    /// Relative move of `rate` from the entry, positive in the trade's favour.
    /// Long: `rate / open - 1`; short: `open / rate - 1`.
    pub fn excursion(&self, rate: f64) -> Result<f64> {
        if self.open_rate <= 0.0 || rate <= 0.0 {
            return Err(Error::InvalidTrade(format!(
                "trade {} has non-positive rate (open {}, current {rate})",
                self.id, self.open_rate
            )));
        }
        Ok(match self.direction {
            TradeDirection::Long => rate / self.open_rate - 1.0,
            TradeDirection::Short => self.open_rate / rate - 1.0,
        })
    }

    /// Leveraged profit ratio at `rate`, fees excluded.
    pub fn profit_ratio(&self, rate: f64) -> f64 {
        if self.open_rate <= 0.0 {
            return 0.0;
        }
        let raw = match self.direction {
            TradeDirection::Long => rate / self.open_rate - 1.0,
            TradeDirection::Short => 1.0 - rate / self.open_rate,
        };
        raw * self.leverage
    }

    /// Track the extremes of the price path while the trade is open.
    pub fn observe_range(&mut self, low: f64, high: f64) {
        if high > self.max_rate {
            self.max_rate = high;
        }
        if low < self.min_rate {
            self.min_rate = low;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_parses_and_displays() {
        let tf: Timeframe = "30m".parse().unwrap();
        assert_eq!(tf.secs(), 1_800);
        assert_eq!(tf.to_string(), "30m");
        assert_eq!("60m".parse::<Timeframe>().unwrap().to_string(), "1h");
        assert_eq!("15s".parse::<Timeframe>().unwrap().secs(), 15);
        assert!("5x".parse::<Timeframe>().is_err());
        assert!("m".parse::<Timeframe>().is_err());
    }

    #[test]
    fn timeframe_rejects_overflowing_counts() {
        assert!("9223372036854775807w".parse::<Timeframe>().is_err());
        assert!("153722867280912931m".parse::<Timeframe>().is_err());
        assert!("99999999999999999999s".parse::<Timeframe>().is_err());
    }

    #[test]
    fn timeframe_floor_aligns_to_interval() {
        let tf: Timeframe = "1h".parse().unwrap();
        let ts = DateTime::from_timestamp(3_600 * 5 + 1_234, 0).unwrap();
        assert_eq!(tf.floor(ts).timestamp(), 3_600 * 5);
    }

    #[test]
    fn custom_data_tracks_changes() {
        let mut data = CustomData::default();
        assert!(!data.get_bool("stage_1_sold", false));
        data.set("stage_1_sold", true);
        assert!(data.get_bool("stage_1_sold", false));
        assert!(data.take_dirty());

        // Writing the same value again is not a change
        data.set("stage_1_sold", true);
        assert!(!data.is_dirty());

        data.set("best_price", 12.5);
        assert_eq!(data.get_f64("best_price", 0.0), 12.5);
        assert!(data.take_dirty());
    }

    #[test]
    fn excursion_is_direction_aware() {
        let now = Utc::now();
        let long = Trade::open("SOLUSDT", TradeDirection::Long, 100.0, 50.0, 1.0, now);
        assert!((long.excursion(103.0).unwrap() - 0.03).abs() < 1e-12);

        let short = Trade::open("SOLUSDT", TradeDirection::Short, 100.0, 50.0, 4.0, now);
        assert!((short.excursion(80.0).unwrap() - 0.25).abs() < 1e-12);
        assert!((short.profit_ratio(99.0) - 0.04).abs() < 1e-12);
        assert!((short.amount - 2.0).abs() < 1e-12);
    }

    #[test]
    fn excursion_rejects_zero_rate() {
        let trade = Trade::open("X", TradeDirection::Long, 0.0, 10.0, 1.0, Utc::now());
        assert!(matches!(trade.excursion(1.0), Err(Error::InvalidTrade(_))));
    }
}

//! Indicator series over `f64` slices.
//!
//! Every function returns a vector as long as its input. Rows inside the
//! warm-up window hold `NaN`, so columns line up with the candle frame and
//! comparisons against undefined rows are simply false.

pub mod adx;
pub mod cross;
pub mod ema;
pub mod macd;
pub mod rolling;
pub mod rsi;
pub mod stoch_rsi;

pub use adx::adx;
pub use cross::{crossed_above, crossed_below, shift};
pub use ema::{ema, ewm, sma};
pub use macd::{macd, Macd, MacdIndicator};
pub use rolling::{rolling_max, rolling_min};
pub use rsi::{rsi, RsiIndicator};
pub use stoch_rsi::{stoch_rsi, StochRsi};

/// Last defined value of a series.
pub fn last_defined(values: &[f64]) -> Option<f64> {
    values.iter().rev().copied().find(|v| !v.is_nan())
}

use tracing::debug;

use common::{Result, Trade};

const BE_ACTIVATED: &str = "be_activated";

/// Convert a stop expressed relative to the open rate into one relative to
/// the current rate, the form the host expects from `custom_stoploss`.
///
/// `open_relative_stop` is a ratio of the open price (`0.002` locks in 0.2%),
/// `current_profit` the leveraged profit ratio. Never negative.
pub fn stoploss_from_open(
    open_relative_stop: f64,
    current_profit: f64,
    is_short: bool,
    leverage: f64,
) -> f64 {
    let leverage = if leverage > 0.0 { leverage } else { 1.0 };
    let p = current_profit / leverage;
    if (p == -1.0 && !is_short) || (p == 1.0 && is_short) {
        return 1.0;
    }

    let stop = if is_short {
        -1.0 + (1.0 - open_relative_stop / leverage) / (1.0 - p)
    } else {
        1.0 - (1.0 + open_relative_stop / leverage) / (1.0 + p)
    };
    (stop * leverage).max(0.0)
}

/// Move the stop to just above entry once the trade has run far enough.
///
/// Activation is remembered in custom data so the stop stays at break-even
/// after the price falls back under the trigger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakEven {
    /// Excursion that activates the break-even stop.
    pub trigger: f64,
    /// Profit locked in, relative to the open rate.
    pub offset: f64,
}

impl BreakEven {
    pub fn evaluate(&self, trade: &mut Trade, current_rate: f64, current_profit: f64) -> Result<Option<f64>> {
        let activated = trade.custom_data.get_bool(BE_ACTIVATED, false);
        let excursion = trade.excursion(current_rate)?;

        if !activated && excursion < self.trigger {
            return Ok(None);
        }
        if !activated {
            debug!(trade_id = %trade.id, excursion, trigger = self.trigger, "Break-even stop activated");
            trade.custom_data.set(BE_ACTIVATED, true);
        }
        Ok(Some(stoploss_from_open(
            self.offset,
            current_profit,
            trade.is_short(),
            trade.leverage,
        )))
    }
}

/// Trail a fixed distance behind the best rate once profit clears
/// `activation`, never below the entry price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaxRateTrail {
    pub activation: f64,
    pub distance: f64,
}

impl MaxRateTrail {
    pub fn evaluate(&self, trade: &Trade, current_rate: f64, current_profit: f64) -> Option<f64> {
        if current_profit <= self.activation || current_rate <= 0.0 {
            return None;
        }
        let stop = if trade.is_short() {
            let stop_price = (trade.min_rate * (1.0 + self.distance)).min(trade.open_rate);
            stop_price / current_rate - 1.0
        } else {
            let stop_price = (trade.max_rate * (1.0 - self.distance)).max(trade.open_rate);
            1.0 - stop_price / current_rate
        };
        Some((stop * trade.leverage).max(0.0))
    }
}

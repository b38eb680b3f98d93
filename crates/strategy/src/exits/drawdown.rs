use tracing::info;

use common::{Result, Trade, TradeDirection};

use crate::Adjustment;

const BEST_PRICE: &str = "best_price";
const SELL_HALF: &str = "pl_sell_half";
const SELL_3_4: &str = "pl_sell_3_4";

/// Scale out as the price pulls back from the best rate seen.
///
/// Past `pl / 2` half the stake goes, past `3/4 · pl` another half, past `pl`
/// everything. A new best re-arms both partial steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawdownLadder {
    pub pl: f64,
}

impl DrawdownLadder {
    pub fn new(pl: f64) -> Self {
        Self { pl }
    }

    pub fn evaluate(&self, trade: &mut Trade, current_rate: f64) -> Result<Option<Adjustment>> {
        if current_rate <= 0.0 {
            return Err(common::Error::InvalidTrade(format!(
                "trade {} got non-positive rate {current_rate}",
                trade.id
            )));
        }

        let best = trade.custom_data.get_f64(BEST_PRICE, 0.0);
        if best <= 0.0 {
            trade.custom_data.set(BEST_PRICE, current_rate);
            return Ok(None);
        }

        let new_best = match trade.direction {
            TradeDirection::Long => current_rate > best,
            TradeDirection::Short => current_rate < best,
        };
        if new_best {
            trade.custom_data.set(BEST_PRICE, current_rate);
            trade.custom_data.set(SELL_HALF, false);
            trade.custom_data.set(SELL_3_4, false);
            return Ok(None);
        }

        let pullback = match trade.direction {
            TradeDirection::Long => 1.0 - current_rate / best,
            TradeDirection::Short => 1.0 - best / current_rate,
        };

        if pullback > self.pl {
            info!(trade_id = %trade.id, pullback, pl = self.pl, "Pull-back limit reached, selling all");
            return Ok(Some(Adjustment::decrease(trade.stake_amount, "pl_full")));
        }
        if pullback > self.pl * 0.75 && !trade.custom_data.get_bool(SELL_3_4, false) {
            info!(trade_id = %trade.id, pullback, "Pull-back at 3/4 of limit, selling half");
            trade.custom_data.set(SELL_3_4, true);
            return Ok(Some(Adjustment::decrease(trade.stake_amount / 2.0, "pl_3_4")));
        }
        if pullback > self.pl / 2.0 && !trade.custom_data.get_bool(SELL_HALF, false) {
            info!(trade_id = %trade.id, pullback, "Pull-back at half of limit, selling half");
            trade.custom_data.set(SELL_HALF, true);
            return Ok(Some(Adjustment::decrease(trade.stake_amount / 2.0, "pl_half")));
        }
        Ok(None)
    }
}

use tracing::info;

use common::{Result, Trade, TradeDirection};

use crate::Adjustment;

/// Profit target relative to the entry price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub profit: f64,
    /// Share of the remaining stake to sell; `1.0` closes the trade.
    pub fraction: f64,
}

/// Ordered profit targets with a stop that ratchets up behind them.
///
/// After target 1 the stop moves to the entry price, after target `n` to
/// the price of target `n - 1`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfitTargets {
    pub targets: Vec<Target>,
}

impl ProfitTargets {
    pub fn new(targets: Vec<Target>) -> Self {
        Self { targets }
    }

    pub fn hit_flag(n: usize) -> String {
        format!("target{n}_hit")
    }

    pub fn evaluate(&self, trade: &mut Trade, current_rate: f64) -> Result<Option<Adjustment>> {
        let excursion = trade.excursion(current_rate)?;
        for (i, target) in self.targets.iter().enumerate() {
            let n = i + 1;
            let flag = Self::hit_flag(n);
            if excursion >= target.profit && !trade.custom_data.get_bool(&flag, false) {
                let stake = trade.stake_amount * target.fraction;
                info!(trade_id = %trade.id, pair = %trade.pair, target = n, excursion, stake, "Profit target hit");
                trade.custom_data.set(flag, true);
                return Ok(Some(Adjustment::decrease(stake, format!("exit_profit_{n}"))));
            }
        }
        Ok(None)
    }

    /// Price the stop has ratcheted to, from the targets hit so far.
    pub fn stop_price(&self, trade: &Trade) -> Option<f64> {
        let hit = (1..=self.targets.len())
            .take_while(|n| trade.custom_data.get_bool(&Self::hit_flag(*n), false))
            .last()?;
        let locked = if hit == 1 { 0.0 } else { self.targets[hit - 2].profit };
        Some(match trade.direction {
            TradeDirection::Long => trade.open_rate * (1.0 + locked),
            TradeDirection::Short => trade.open_rate / (1.0 + locked),
        })
    }

    /// Ratcheted stop relative to `current_rate`, for `custom_stoploss`.
    pub fn stoploss(&self, trade: &Trade, current_rate: f64) -> Option<f64> {
        if current_rate <= 0.0 {
            return None;
        }
        let price = self.stop_price(trade)?;
        let ratio = match trade.direction {
            TradeDirection::Long => 1.0 - price / current_rate,
            TradeDirection::Short => price / current_rate - 1.0,
        };
        Some((ratio * trade.leverage).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn targets() -> ProfitTargets {
        ProfitTargets::new(vec![
            Target { profit: 0.015, fraction: 0.2 },
            Target { profit: 0.039, fraction: 0.3 },
            Target { profit: 0.127, fraction: 0.5 },
            Target { profit: 0.195, fraction: 1.0 },
        ])
    }

    #[test]
    fn targets_fire_in_order_and_ratchet_stop() {
        let targets = targets();
        let mut trade = Trade::open("SOLUSDT", TradeDirection::Long, 100.0, 100.0, 1.0, Utc::now());
        assert_eq!(targets.stoploss(&trade, 101.0), None);

        let first = targets.evaluate(&mut trade, 101.6).unwrap().unwrap();
        assert_eq!(first, Adjustment::decrease(20.0, "exit_profit_1"));
        trade.stake_amount -= first.stake();
        assert_eq!(targets.stop_price(&trade), Some(100.0));

        let second = targets.evaluate(&mut trade, 104.0).unwrap().unwrap();
        assert!((second.stake() - 24.0).abs() < 1e-9);
        assert!((targets.stop_price(&trade).unwrap() - 101.5).abs() < 1e-9);
        assert_eq!(targets.evaluate(&mut trade, 104.0).unwrap(), None);

        let stop = targets.stoploss(&trade, 104.0).unwrap();
        assert!((stop - (1.0 - 101.5 / 104.0)).abs() < 1e-9);
    }

    #[test]
    fn last_target_closes_remaining_stake() {
        let targets = targets();
        let mut trade = Trade::open("SOLUSDT", TradeDirection::Long, 100.0, 100.0, 1.0, Utc::now());
        for n in 1..=3 {
            trade.custom_data.set(ProfitTargets::hit_flag(n), true);
        }
        trade.stake_amount = 28.0;
        let last = targets.evaluate(&mut trade, 120.0).unwrap().unwrap();
        assert_eq!(last.stake(), 28.0);
    }
}

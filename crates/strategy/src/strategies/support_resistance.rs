use common::{Error, Result, Trade, TradeDirection};

use crate::config::StrategyConfig;
use crate::frame::{CandleFrame, SignalKind};
use crate::indicators::{rolling_max, rolling_min, shift};
use crate::strategies::{and, base_settings, rising, zip_mask, PositionPlan};
use crate::{Adjustment, AnalysisContext, PositionTick, Strategy, StrategySettings};

/// Rolling support/resistance breakouts, traded as reversals.
///
/// A close under the previous row's support on rising volume buys; a close
/// over the previous row's resistance on rising volume sells short. Longs
/// exit at resistance, shorts at support.
pub struct SupportResistanceStrategy {
    cfg: StrategyConfig,
    settings: StrategySettings,
    window: usize,
    short: bool,
    plan: PositionPlan,
}

impl SupportResistanceStrategy {
    pub fn from_config(cfg: &StrategyConfig) -> Result<Self> {
        let window = cfg.param_usize("window", 25)?;
        if window < 2 {
            return Err(Error::Config(format!(
                "strategy '{}': window must be at least 2, got {window}",
                cfg.name
            )));
        }
        let plan = PositionPlan::from_config(cfg)?;
        let mut settings = base_settings(cfg, "5m", -0.02)?;
        plan.apply(&mut settings);

        Ok(Self {
            cfg: cfg.clone(),
            settings,
            window,
            short: cfg.param_bool("short", false),
            plan,
        })
    }
}

impl Strategy for SupportResistanceStrategy {
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
        let support = rolling_min(frame.close(), self.window);
        let resistance = rolling_max(frame.close(), self.window);
        frame.set_column("support", support)?;
        frame.set_column("resistance", resistance)
    }

    fn populate_entry_trend(&self, frame: &mut CandleFrame, _ctx: &AnalysisContext<'_>) -> Result<()> {
        let volume_up = rising(frame.volume());
        let prev_support = shift(frame.column("support")?, 1);
        let breakdown = zip_mask(frame.close(), &prev_support, |c, s| c < s);
        frame.mark_tagged(SignalKind::EnterLong, &and(&breakdown, &volume_up), "support_break")?;

        if self.short {
            let prev_resistance = shift(frame.column("resistance")?, 1);
            let breakout = zip_mask(frame.close(), &prev_resistance, |c, r| c > r);
            frame.mark_tagged(SignalKind::EnterShort, &and(&breakout, &volume_up), "resistance_break")?;
        }
        Ok(())
    }

    fn populate_exit_trend(&self, frame: &mut CandleFrame, _ctx: &AnalysisContext<'_>) -> Result<()> {
        let at_resistance = zip_mask(frame.close(), frame.column("resistance")?, |c, r| c >= r);
        frame.mark_tagged(SignalKind::ExitLong, &at_resistance, "resistance")?;
        if self.short {
            let at_support = zip_mask(frame.close(), frame.column("support")?, |c, s| c <= s);
            frame.mark_tagged(SignalKind::ExitShort, &at_support, "support")?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyFileConfig;
    use chrono::{DateTime, Duration};
    use common::{Candle, CandleType, DataProvider, OrderBook, Timeframe};

    struct NoData;

    impl DataProvider for NoData {
        fn candles(&self, pair: &str, _: Timeframe, _: CandleType) -> Result<Vec<Candle>> {
            Err(Error::MissingData(pair.to_string()))
        }

        fn orderbook(&self, pair: &str, _: usize) -> Result<OrderBook> {
            Err(Error::MissingData(pair.to_string()))
        }
    }

    fn frame_for(closes: &[f64], volumes: &[f64]) -> CandleFrame {
        let text = "[[strategy]]\ntype = \"support_resistance\"\nname = \"sr\"\npair = \"SOLUSDT\"\nstake = 10.0\n\
                    [strategy.params]\nwindow = 3\nshort = true\nleverage = 4.0";
        let cfg = StrategyFileConfig::parse(text).unwrap().strategies.remove(0);
        let s = SupportResistanceStrategy::from_config(&cfg).unwrap();
        assert_eq!(s.leverage(1.0, 10.0, TradeDirection::Short), 4.0);

        let start = DateTime::from_timestamp(1_700_000_100, 0).unwrap();
        let bars: Vec<Candle> = closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&c, &v))| Candle {
                timestamp: start + Duration::minutes(5 * i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: v,
            })
            .collect();
        let ctx = AnalysisContext { pair: "SOLUSDT", timeframe: s.settings().timeframe, data: &NoData };
        crate::analyze(&s, &bars, &ctx).unwrap()
    }

    #[test]
    fn break_below_previous_support_enters_long() {
        let frame = frame_for(&[10.0, 11.0, 12.0, 9.0, 9.5], &[1.0, 1.0, 1.0, 2.0, 1.0]);
        // Support over rows 0..=2 is 10; row 3 closes at 9 on higher volume
        assert_eq!(frame.signal(SignalKind::EnterLong), &[false, false, false, true, false]);
        assert_eq!(frame.enter_tag(3), Some("support_break"));
        // Row 3 is its own support, which also closes any short
        assert!(frame.signal(SignalKind::ExitShort)[3]);
    }

    #[test]
    fn break_above_previous_resistance_enters_short() {
        let frame = frame_for(&[10.0, 11.0, 10.5, 12.0, 11.0], &[1.0, 1.0, 1.0, 2.0, 1.0]);
        assert_eq!(frame.signal(SignalKind::EnterShort), &[false, false, false, true, false]);
        assert!(frame.signal(SignalKind::ExitLong)[3]);
        assert!(frame.signal(SignalKind::EnterLong).iter().all(|e| !e));
    }
}

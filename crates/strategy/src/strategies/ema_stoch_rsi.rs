use common::{Error, Result};

use crate::config::StrategyConfig;
use crate::frame::{CandleFrame, SignalKind};
use crate::indicators::{ema, stoch_rsi};
use crate::strategies::{and, base_settings, map_mask, zip_mask};
use crate::{AnalysisContext, Strategy, StrategySettings};

/// EMA trend with a Stochastic-RSI timing filter.
///
/// Buys pull-backs inside an up-trend (%K under `lower`) and sells stretched
/// readings inside a down-trend (%K over `upper`). Risk is left to the
/// host's trailing stop.
pub struct EmaStochRsiStrategy {
    cfg: StrategyConfig,
    settings: StrategySettings,
    fast: usize,
    slow: usize,
    rsi_period: usize,
    k_period: usize,
    d_period: usize,
    lower: f64,
    upper: f64,
}

impl EmaStochRsiStrategy {
    pub fn from_config(cfg: &StrategyConfig) -> Result<Self> {
        let fast = cfg.param_usize("fast", 28)?;
        let slow = cfg.param_usize("slow", 48)?;
        if fast == 0 || fast >= slow {
            return Err(Error::Config(format!(
                "strategy '{}': fast EMA ({fast}) must be shorter than slow ({slow})",
                cfg.name
            )));
        }
        Ok(Self {
            cfg: cfg.clone(),
            settings: base_settings(cfg, "5m", -0.04)?,
            fast,
            slow,
            rsi_period: cfg.param_usize("rsi_period", 14)?,
            k_period: cfg.param_usize("k_period", 3)?,
            d_period: cfg.param_usize("d_period", 3)?,
            lower: cfg.param_f64("lower", 20.0),
            upper: cfg.param_f64("upper", 80.0),
        })
    }
}

impl Strategy for EmaStochRsiStrategy {
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
        let fast = ema(frame.close(), self.fast);
        let slow = ema(frame.close(), self.slow);
        let stoch = stoch_rsi(frame.close(), self.rsi_period, self.k_period, self.d_period);
        frame.set_column("ema_fast", fast)?;
        frame.set_column("ema_slow", slow)?;
        frame.set_column("stoch_rsi_k", stoch.fastk)?;
        frame.set_column("stoch_rsi_d", stoch.fastd)
    }

    fn populate_entry_trend(&self, frame: &mut CandleFrame, _ctx: &AnalysisContext<'_>) -> Result<()> {
        let trend = zip_mask(frame.column("ema_fast")?, frame.column("ema_slow")?, |f, s| f > s);
        let low = map_mask(frame.column("stoch_rsi_k")?, |k| k < self.lower);
        frame.mark_tagged(SignalKind::EnterLong, &and(&trend, &low), "stoch_rsi_dip")
    }

    fn populate_exit_trend(&self, frame: &mut CandleFrame, _ctx: &AnalysisContext<'_>) -> Result<()> {
        let down = zip_mask(frame.column("ema_fast")?, frame.column("ema_slow")?, |f, s| f < s);
        let high = map_mask(frame.column("stoch_rsi_k")?, |k| k > self.upper);
        frame.mark_tagged(SignalKind::ExitLong, &and(&down, &high), "stoch_rsi_peak")
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

    fn strategy() -> EmaStochRsiStrategy {
        let text = "[[strategy]]\ntype = \"ema_stoch_rsi\"\nname = \"x\"\npair = \"ATOMUSDT\"\nstake = 10.0\n\
                    [strategy.params]\nfast = 5\nslow = 10\nrsi_period = 5";
        let cfg = StrategyFileConfig::parse(text).unwrap().strategies.remove(0);
        EmaStochRsiStrategy::from_config(&cfg).unwrap()
    }

    fn bars(closes: &[f64]) -> Vec<Candle> {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                timestamp: start + Duration::minutes(5 * i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn entries_need_uptrend_and_low_k() {
        let s = strategy();
        let closes: Vec<f64> = (0..80)
            .map(|i| 100.0 + i as f64 * 0.5 + (i as f64 * 0.9).sin() * 2.0)
            .collect();
        let ctx = AnalysisContext { pair: "ATOMUSDT", timeframe: s.settings().timeframe, data: &NoData };
        let frame = crate::analyze(&s, &bars(&closes), &ctx).unwrap();

        let entries = frame.signal(SignalKind::EnterLong);
        assert!(entries.iter().any(|e| *e));
        for (i, entered) in entries.iter().enumerate() {
            let expected = match (
                frame.value("ema_fast", i),
                frame.value("ema_slow", i),
                frame.value("stoch_rsi_k", i),
            ) {
                (Some(f), Some(sl), Some(k)) => f > sl && k < 20.0,
                _ => false,
            };
            assert_eq!(*entered, expected, "row {i}");
        }
    }

    #[test]
    fn no_entries_in_a_downtrend() {
        let s = strategy();
        let closes: Vec<f64> = (0..60)
            .map(|i| 200.0 - i as f64 + (i as f64 * 0.9).sin())
            .collect();
        let ctx = AnalysisContext { pair: "ATOMUSDT", timeframe: s.settings().timeframe, data: &NoData };
        let frame = crate::analyze(&s, &bars(&closes), &ctx).unwrap();
        assert!(frame.signal(SignalKind::EnterLong).iter().all(|e| !e));
    }
}

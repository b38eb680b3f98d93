use common::{Error, Result};

use super::ema::ema;

/// MACD line, signal line and histogram, each as long as the input.
#[derive(Debug, Clone)]
pub struct Macd {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub hist: Vec<f64>,
}

/// MACD (Moving Average Convergence/Divergence) series.
///
/// MACD line = EMA(fast) − EMA(slow), Signal = EMA(macd_line, signal_period),
/// histogram = MACD − Signal.
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);
    let line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema(&line, signal);
    let hist = line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| m - s)
        .collect();
    Macd {
        macd: line,
        signal: signal_line,
        hist,
    }
}

/// MACD periods, validated once at config load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacdIndicator {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl MacdIndicator {
    /// Rejects zero periods and `fast >= slow`.
    pub fn new(fast: usize, slow: usize, signal: usize) -> Result<Self> {
        if fast == 0 || signal == 0 || fast >= slow {
            return Err(Error::Config(format!(
                "MACD periods {fast}/{slow}/{signal}: need fast < slow and non-zero fast and signal"
            )));
        }
        Ok(Self { fast, slow, signal })
    }

    /// Full MACD series with this indicator's periods.
    pub fn series(&self, closes: &[f64]) -> Macd {
        macd(closes, self.fast, self.slow, self.signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{crossed_above, crossed_below};

    fn trending_up(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64 * 0.5).collect()
    }

    fn accelerating(n: usize, rate: f64) -> Vec<f64> {
        (0..n).map(|i| 100.0 + rate * (i * i) as f64).collect()
    }

    #[test]
    fn rejects_degenerate_periods() {
        assert!(MacdIndicator::new(0, 1, 0).is_err());
        assert!(MacdIndicator::new(3, 6, 0).is_err());
        assert!(MacdIndicator::new(6, 6, 3).is_err());
        assert_eq!(
            MacdIndicator::new(12, 26, 9).unwrap(),
            MacdIndicator { fast: 12, slow: 26, signal: 9 }
        );
    }

    #[test]
    fn macd_series_warm_up() {
        let prices = trending_up(50);
        let series = macd(&prices, 12, 26, 9);
        assert!(series.macd[24].is_nan());
        assert!(!series.macd[25].is_nan());
        // Signal seeds on the 9th defined MACD value
        assert!(series.signal[32].is_nan());
        assert!(!series.signal[33].is_nan());
        assert!(!series.hist[33].is_nan());
    }

    #[test]
    fn macd_crosses_signal_on_reversal() {
        let ind = MacdIndicator::new(3, 6, 3).unwrap();
        // Accelerating sell-off keeps MACD under its signal, then a sharp bounce
        let mut prices = accelerating(20, -0.05);
        prices.extend([84.0, 86.0, 88.0]);
        let series = ind.series(&prices);
        assert!(crossed_above(&series.macd, &series.signal).iter().any(|c| *c));
    }

    #[test]
    fn macd_stays_above_signal_on_steady_trend() {
        let series = MacdIndicator::new(3, 6, 3).unwrap().series(&accelerating(40, 0.05));
        // An accelerating up-trend keeps MACD above its lagging signal line
        assert!(series.hist[30..].iter().all(|h| *h > 0.0));
        assert!(!crossed_below(&series.macd, &series.signal)[20..].iter().any(|c| *c));
    }
}

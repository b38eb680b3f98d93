use common::{Error, Result};

/// RSI (Relative Strength Index) series.
///
/// Uses Wilder's smoothed moving average (same as TradingView / standard RSI).
/// The first defined value sits at index `period`. A window with gains and
/// no losses reads 100; a perfectly flat window reads 50.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() <= period {
        return out;
    }

    // First average gain/loss over the initial `period` changes
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for w in values[..=period].windows(2) {
        let change = w[1] - w[0];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = rsi_value(avg_gain, avg_loss);

    // Wilder smoothing over remaining changes
    let p = period as f64;
    for i in period + 1..values.len() {
        let change = values[i] - values[i - 1];
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        out[i] = rsi_value(avg_gain, avg_loss);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// RSI period with overbought/oversold bands.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
    pub overbought: f64,
    pub oversold: f64,
}

impl RsiIndicator {
    /// Rejects periods under 2.
    pub fn new(period: usize, overbought: f64, oversold: f64) -> Result<Self> {
        if period < 2 {
            return Err(Error::Config(format!("RSI period must be >= 2, got {period}")));
        }
        Ok(Self { period, overbought, oversold })
    }

    /// RSI series over `closes` with this period.
    pub fn series(&self, closes: &[f64]) -> Vec<f64> {
        rsi(closes, self.period)
    }

    pub fn is_oversold(&self, value: f64) -> bool {
        value < self.oversold
    }

    pub fn is_overbought(&self, value: f64) -> bool {
        value > self.overbought
    }
}

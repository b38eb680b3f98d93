use super::ema::sma;
use super::rsi::rsi;

/// Stochastic RSI lines on a 0..100 scale.
#[derive(Debug, Clone)]
pub struct StochRsi {
    pub fastk: Vec<f64>,
    pub fastd: Vec<f64>,
}

/// Stochastic oscillator applied to RSI: `fastk` is where the current RSI sits
/// within its range over the last `k_period` rows, `fastd` is the SMA of
/// `fastk` over `d_period`. A flat RSI window reads 0.
pub fn stoch_rsi(values: &[f64], rsi_period: usize, k_period: usize, d_period: usize) -> StochRsi {
    let r = rsi(values, rsi_period);
    let mut fastk = vec![f64::NAN; values.len()];
    if k_period > 0 && r.len() >= k_period {
        for i in k_period - 1..r.len() {
            let window = &r[i + 1 - k_period..=i];
            if window.iter().any(|v| v.is_nan()) {
                continue;
            }
            let lo = window.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            fastk[i] = if hi > lo { (r[i] - lo) / (hi - lo) * 100.0 } else { 0.0 };
        }
    }
    let fastd = sma(&fastk, d_period);
    StochRsi { fastk, fastd }
}

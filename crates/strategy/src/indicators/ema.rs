/// Exponential moving average, seeded with the SMA of the first `period`
/// defined values. Leading `NaN`s in the input are skipped, so the function
/// can be chained onto another indicator's output.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }
    let Some(start) = values.iter().position(|v| !v.is_nan()) else {
        return out;
    };
    let seed_end = start + period;
    if seed_end > values.len() {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut prev = values[start..seed_end].iter().sum::<f64>() / period as f64;
    out[seed_end - 1] = prev;
    for i in seed_end..values.len() {
        prev = values[i] * k + prev * (1.0 - k);
        out[i] = prev;
    }
    out
}

/// Exponentially weighted mean with `adjust = false`: seeded with the first
/// value and defined from the first row on.
pub fn ewm(values: &[f64], span: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if span == 0 {
        out.resize(values.len(), f64::NAN);
        return out;
    }
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            None => v,
            Some(p) if v.is_nan() => p,
            Some(p) => alpha * v + (1.0 - alpha) * p,
        };
        if !next.is_nan() {
            prev = Some(next);
        }
        out.push(next);
    }
    out
}

/// Simple moving average. A window containing `NaN` yields `NaN`.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    for i in period - 1..values.len() {
        let window = &values[i + 1 - period..=i];
        if window.iter().all(|v| !v.is_nan()) {
            out[i] = window.iter().sum::<f64>() / period as f64;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_seeds_with_sma() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = ema(&values, 3);
        assert!(out[0].is_nan() && out[1].is_nan());
        assert!((out[2] - 2.0).abs() < 1e-12);
        // k = 0.5
        assert!((out[3] - 3.0).abs() < 1e-12);
        assert!((out[4] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn ema_skips_leading_nan() {
        let values = [f64::NAN, f64::NAN, 2.0, 4.0, 6.0];
        let out = ema(&values, 2);
        assert!(out[2].is_nan());
        assert!((out[3] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn ema_short_input_is_all_nan() {
        assert!(ema(&[1.0, 2.0], 3).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn ewm_starts_at_first_value() {
        let out = ewm(&[10.0, 20.0], 3);
        assert_eq!(out[0], 10.0);
        assert!((out[1] - 15.0).abs() < 1e-12);
    }

    #[test]
    fn sma_window() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0], 2);
        assert!(out[0].is_nan());
        assert_eq!(&out[1..], &[1.5, 2.5, 3.5]);
    }
}

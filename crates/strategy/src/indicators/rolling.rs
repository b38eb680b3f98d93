/// Lowest value over the trailing `window` rows, current row included.
pub fn rolling_min(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, f64::min)
}

/// Highest value over the trailing `window` rows, current row included.
pub fn rolling_max(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, f64::max)
}

fn rolling(values: &[f64], window: usize, pick: fn(f64, f64) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    for i in window - 1..values.len() {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = slice.iter().copied().fold(slice[0], pick);
    }
    out
}

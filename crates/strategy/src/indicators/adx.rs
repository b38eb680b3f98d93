/// Average Directional Index with Wilder smoothing.
///
/// True range and directional movement start on the second row; the first
/// ADX value is the mean of the first `period` DX values and lands on index
/// `2 * period - 1`.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let n = high.len().min(low.len()).min(close.len());
    let mut out = vec![f64::NAN; high.len()];
    if period == 0 || n < 2 * period {
        return out;
    }

    let mut tr = vec![0.0; n];
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up = high[i] - high[i - 1];
        let down = low[i - 1] - low[i];
        plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
        minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };
        tr[i] = (high[i] - low[i])
            .max((high[i] - close[i - 1]).abs())
            .max((low[i] - close[i - 1]).abs());
    }

    let p = period as f64;
    let mut tr_s: f64 = tr[1..=period].iter().sum();
    let mut plus_s: f64 = plus_dm[1..=period].iter().sum();
    let mut minus_s: f64 = minus_dm[1..=period].iter().sum();

    let mut dx = vec![f64::NAN; n];
    dx[period] = directional_index(tr_s, plus_s, minus_s);
    for i in period + 1..n {
        tr_s = tr_s - tr_s / p + tr[i];
        plus_s = plus_s - plus_s / p + plus_dm[i];
        minus_s = minus_s - minus_s / p + minus_dm[i];
        dx[i] = directional_index(tr_s, plus_s, minus_s);
    }

    let first = 2 * period - 1;
    let mut value = dx[period..=first].iter().sum::<f64>() / p;
    out[first] = value;
    for i in first + 1..n {
        value = (value * (p - 1.0) + dx[i]) / p;
        out[i] = value;
    }
    out
}

fn directional_index(tr: f64, plus: f64, minus: f64) -> f64 {
    if tr <= 0.0 {
        return 0.0;
    }
    let plus_di = 100.0 * plus / tr;
    let minus_di = 100.0 * minus / tr;
    let sum = plus_di + minus_di;
    if sum == 0.0 {
        0.0
    } else {
        100.0 * (plus_di - minus_di).abs() / sum
    }
}

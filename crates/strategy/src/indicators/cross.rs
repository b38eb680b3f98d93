/// `a` is above `b` on this row and was at or below it on the previous one.
pub fn crossed_above(a: &[f64], b: &[f64]) -> Vec<bool> {
    cross(a, b, |x, y| x > y, |x, y| x <= y)
}

/// `a` is below `b` on this row and was at or above it on the previous one.
pub fn crossed_below(a: &[f64], b: &[f64]) -> Vec<bool> {
    cross(a, b, |x, y| x < y, |x, y| x >= y)
}

fn cross(
    a: &[f64],
    b: &[f64],
    now: impl Fn(f64, f64) -> bool,
    before: impl Fn(f64, f64) -> bool,
) -> Vec<bool> {
    let n = a.len().min(b.len());
    let mut out = vec![false; a.len()];
    for i in 1..n {
        out[i] = now(a[i], b[i]) && before(a[i - 1], b[i - 1]);
    }
    out
}

/// Series moved `n` rows later; the first `n` rows become `NaN`.
pub fn shift(values: &[f64], n: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if n < values.len() {
        out[n..].copy_from_slice(&values[..values.len() - n]);
    }
    out
}

//! Series primitives: shifts, differences and fixed-window statistics

/// Value `k` bars earlier; the first `k` positions are `NaN`
pub fn shift(values: &[f64], k: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| if i >= k { values[i - k] } else { f64::NAN })
        .collect()
}

/// `x[i] - x[i-k]`
pub fn diff(values: &[f64], k: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| if i >= k { values[i] - values[i - k] } else { f64::NAN })
        .collect()
}

/// Fractional change over `k` bars: `x[i] / x[i-k] - 1`
pub fn pct_change(values: &[f64], k: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if i >= k {
                values[i] / values[i - k] - 1.0
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Apply `f` over each full trailing window. Windows that are incomplete or
/// contain a `NaN` produce `NaN`.
pub fn rolling_apply<F>(values: &[f64], window: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    if window == 0 {
        return vec![f64::NAN; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return f64::NAN;
            }
            let slice = &values[i + 1 - window..=i];
            if slice.iter().any(|v| v.is_nan()) {
                f64::NAN
            } else {
                f(slice)
            }
        })
        .collect()
}

pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |w| w.iter().sum::<f64>() / w.len() as f64)
}

/// Sample standard deviation (n - 1 denominator)
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |w| {
        if w.len() < 2 {
            return f64::NAN;
        }
        let mean = w.iter().sum::<f64>() / w.len() as f64;
        let var = w.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (w.len() - 1) as f64;
        var.sqrt()
    })
}

pub fn rolling_min(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |w| w.iter().copied().fold(f64::INFINITY, f64::min))
}

pub fn rolling_max(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |w| {
        w.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    })
}

/// Running total that skips `NaN` inputs; those positions stay `NaN`
pub fn cumsum_skip_nan(values: &[f64]) -> Vec<f64> {
    let mut total = 0.0;
    values
        .iter()
        .map(|&v| {
            if v.is_nan() {
                f64::NAN
            } else {
                total += v;
                total
            }
        })
        .collect()
}

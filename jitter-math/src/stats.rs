//! Statistical helpers used for registration scoring and fit QA

use ndarray::{ArrayView2, Zip};

/// Variance below which a patch is considered featureless
const MIN_VARIANCE: f64 = 1e-12;

/// Arithmetic mean, or NaN for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Root-mean-square, or 0.0 for an empty slice
pub fn rms(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| v * v).sum();
    (sum_sq / values.len() as f64).sqrt()
}

/// Zero-mean normalized cross-correlation of two equally sized patches.
///
/// Returns the Pearson correlation of the pixel values in `[-1, 1]`, or None
/// when the shapes differ or either patch has no variance.
pub fn normalized_cross_correlation(a: &ArrayView2<f64>, b: &ArrayView2<f64>) -> Option<f64> {
    if a.dim() != b.dim() || a.is_empty() {
        return None;
    }

    let n = a.len() as f64;
    let mean_a = a.sum() / n;
    let mean_b = b.sum() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    Zip::from(a).and(b).for_each(|&x, &y| {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    });

    if var_a < MIN_VARIANCE || var_b < MIN_VARIANCE {
        return None;
    }

    Some((cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0))
}

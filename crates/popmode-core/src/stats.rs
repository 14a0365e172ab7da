//! Scalar statistics helpers shared by the fitting and estimation code.

/// Arithmetic mean of a slice. Returns 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance of a slice. Returns 0.0 for an empty slice.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

/// Population standard deviation of a slice.
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Pearson correlation coefficient between two equal-length slices.
///
/// Returns 0.0 for mismatched lengths, empty inputs, or when either input
/// has (near) zero variance.
pub fn pearson_correlation(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.is_empty() {
        return 0.0;
    }

    let mean_x = mean(x);
    let mean_y = mean(y);

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;

    for i in 0..x.len() {
        let dx = x[i] - mean_x;
        let dy = y[i] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x < 1e-12 || var_y < 1e-12 {
        return 0.0;
    }

    cov / (var_x.sqrt() * var_y.sqrt())
}

/// Mean squared error between two equal-length slices.
///
/// Returns 0.0 for mismatched lengths or empty inputs.
pub fn mean_squared_error(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.is_empty() {
        return 0.0;
    }

    let sum: f64 = x.iter().zip(y.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
    sum / x.len() as f64
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_variance() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert!((mean(&values) - 2.5).abs() < 1e-12);
        assert!((variance(&values) - 1.25).abs() < 1e-12);
        assert!((std_dev(&values) - 1.25_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_empty_slices() {
        assert!(mean(&[]).abs() < 1e-12);
        assert!(variance(&[]).abs() < 1e-12);
        assert!(pearson_correlation(&[], &[]).abs() < 1e-12);
        assert!(mean_squared_error(&[1.0], &[]).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_perfect_correlation() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.0, 4.0, 6.0, 8.0];
        assert!((pearson_correlation(&x, &y) - 1.0).abs() < 1e-12);

        let y_neg = [-2.0, -4.0, -6.0, -8.0];
        assert!((pearson_correlation(&x, &y_neg) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_constant_input_is_zero() {
        let x = [1.0, 1.0, 1.0];
        let y = [0.5, 1.5, 2.5];
        assert!(pearson_correlation(&x, &y).abs() < 1e-12);
    }

    #[test]
    fn test_mean_squared_error() {
        let x = [1.0, 2.0, 3.0];
        let y = [1.0, 2.0, 5.0];
        assert!((mean_squared_error(&x, &y) - 4.0 / 3.0).abs() < 1e-12);
    }
}

//! Descriptive statistics shared by the risk metrics.

use statrs::statistics::{Data, Distribution};

/// Arithmetic mean; `0.0` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    Data::new(values.to_vec()).mean().unwrap_or(0.0)
}

/// Sample standard deviation with an `n - 1` denominator; `0.0` below two
/// observations and exactly `0.0` for a constant series.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 || values.iter().all(|v| *v == values[0]) {
        return 0.0;
    }
    Data::new(values.to_vec()).std_dev().unwrap_or(0.0)
}

/// Percentile with linear interpolation between order statistics (type 7).
///
/// `pct` is in `[0, 100]` and is clamped to that range. `NaN` for an empty
/// slice.
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let p = (pct / 100.0).clamp(0.0, 1.0);
    let h = (sorted.len() - 1) as f64 * p;
    let lower = h.floor() as usize;
    let upper = h.ceil() as usize;
    let weight = h - lower as f64;

    sorted[lower] + weight * (sorted[upper] - sorted[lower])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_type7() {
        let values = [15.0, 20.0, 35.0, 40.0, 50.0];
        assert_eq!(percentile(&values, 0.0), 15.0);
        assert_eq!(percentile(&values, 100.0), 50.0);
        assert_eq!(percentile(&values, 50.0), 35.0);
        // h = 4 * 0.4 = 1.6 -> 20 + 0.6 * 15 = 29
        assert!((percentile(&values, 40.0) - 29.0).abs() < 1e-12);
        // Input order does not matter
        assert!((percentile(&[50.0, 15.0, 40.0, 35.0, 20.0], 40.0) - 29.0).abs() < 1e-12);
        assert!(percentile(&[], 50.0).is_nan());
    }

    #[test]
    fn test_mean_and_std() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(sample_std(&[4.0]), 0.0);
        assert!((sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.138089935).abs() < 1e-9);
    }

    #[test]
    fn test_sample_std_constant_series_is_exactly_zero() {
        assert_eq!(sample_std(&[0.1; 30]), 0.0);
        assert_eq!(sample_std(&[]), 0.0);
        // n - 1 denominator: variance of [1, 3] is 2
        assert!((sample_std(&[1.0, 3.0]) - 2f64.sqrt()).abs() < 1e-12);
    }
}

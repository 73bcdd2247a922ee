//! Linear-interpolation percentile, the "classical" definition used by the
//! original's manual (non-numpy) percentile calculation.

/// Computes the `p`-th percentile (`0..=100`) of `sorted_values`, which
/// must already be sorted ascending. Returns `None` for an empty slice.
/// Uses linear interpolation between the two neighbouring ordered values,
/// matching `numpy.percentile`'s default (`linear`) method.
pub fn linear_interpolated_percentile(sorted_values: &[f64], p: f64) -> Option<f64> {
    if sorted_values.is_empty() {
        return None;
    }
    if sorted_values.len() == 1 {
        return Some(sorted_values[0]);
    }

    let rank = (p / 100.0) * (sorted_values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        return Some(sorted_values[lower]);
    }

    let frac = rank - lower as f64;
    let lo = sorted_values[lower];
    let hi = sorted_values[upper];
    Some(lo + (hi - lo) * frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_none() {
        assert_eq!(linear_interpolated_percentile(&[], 95.0), None);
    }

    #[test]
    fn test_single_value() {
        assert_eq!(linear_interpolated_percentile(&[42.0], 95.0), Some(42.0));
    }

    #[test]
    fn test_p0_and_p100_are_extremes() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(linear_interpolated_percentile(&values, 0.0), Some(1.0));
        assert_eq!(linear_interpolated_percentile(&values, 100.0), Some(5.0));
    }

    #[test]
    fn test_median_of_even_count_interpolates() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        // rank = 0.5 * 3 = 1.5 -> between index 1 (2.0) and 2 (3.0)
        let p50 = linear_interpolated_percentile(&values, 50.0).unwrap();
        assert!((p50 - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_p95_matches_manual_calc() {
        let values: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        // rank = 0.95 * 19 = 18.05
        let p95 = linear_interpolated_percentile(&values, 95.0).unwrap();
        assert!((p95 - 19.05).abs() < 1e-9);
    }
}

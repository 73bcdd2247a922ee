//! Property-based checks for the core's documented invariants (spec §8),
//! run against the same pure functions the unit tests exercise directly.
//! Kept separate from the inline `#[cfg(test)]` modules since these need
//! `proptest`'s generators rather than literal fixtures.

use loadshaper::controller::ring::SlotRing;
use loadshaper::metrics::linear_interpolated_percentile;
use proptest::prelude::*;

proptest! {
    /// Invariant 4: `|slot_history| <= ring_size` and `slots_recorded <=
    /// ring_size`, no matter how many slots close.
    #[test]
    fn ring_population_never_exceeds_capacity(ring_size in 1usize..200, closes in 0usize..500, high_bits in prop::collection::vec(any::<bool>(), 0..500)) {
        let mut ring = SlotRing::new(ring_size);
        for i in 0..closes {
            let is_high = high_bits.get(i).copied().unwrap_or(false);
            ring.record(is_high);
        }
        prop_assert!(ring.population() <= ring.ring_size());
        prop_assert!(ring.write_index() < ring.ring_size());
    }

    /// The current exceedance is always a valid percentage in [0, 100].
    #[test]
    fn ring_exceedance_is_a_valid_percentage(ring_size in 1usize..100, bits in prop::collection::vec(any::<bool>(), 0..300)) {
        let mut ring = SlotRing::new(ring_size);
        for b in &bits {
            ring.record(*b);
        }
        let e = ring.current_exceedance();
        prop_assert!((0.0..=100.0).contains(&e));
    }

    /// `percentile` of any non-empty value set lies within the set's own
    /// [min, max] bounds, for any percentile in [0, 100].
    #[test]
    fn percentile_is_bounded_by_min_and_max(
        mut values in prop::collection::vec(-1000.0f64..1000.0, 1..200),
        p in 0.0f64..100.0,
    ) {
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let result = linear_interpolated_percentile(&values, p);
        let min = values[0];
        let max = values[values.len() - 1];
        prop_assert!(result.is_some());
        let v = result.unwrap();
        prop_assert!(v >= min - 1e-9 && v <= max + 1e-9);
    }

    /// `percentile` is monotonically non-decreasing in `p` for a fixed
    /// value set.
    #[test]
    fn percentile_is_monotonic_in_p(
        mut values in prop::collection::vec(-1000.0f64..1000.0, 2..100),
        p_lo in 0.0f64..50.0,
        p_hi in 50.0f64..100.0,
    ) {
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let lo = linear_interpolated_percentile(&values, p_lo).unwrap();
        let hi = linear_interpolated_percentile(&values, p_hi).unwrap();
        prop_assert!(lo <= hi + 1e-9);
    }
}

//! Weighted random sampling
//!
//! Draw `u ∈ [0, W)` over the weight total and walk the prefix sums;
//! the first entry whose prefix reaches `u` wins. When every weight is
//! zero the last entry wins, so a candidate set never yields nothing.

use rand::Rng;

/// Pick an index from `weights` proportionally to its value.
///
/// Returns `None` only for an empty slice. Negative weights are treated
/// as zero.
pub fn weighted_sample_index<R: Rng>(rng: &mut R, weights: &[f64]) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }

    let total: f64 = weights.iter().map(|w| w.max(0.0)).sum();
    if total <= 0.0 {
        return Some(weights.len() - 1);
    }

    let u = rng.gen_range(0.0..total);
    let mut prefix = 0.0;
    for (index, weight) in weights.iter().enumerate() {
        prefix += weight.max(0.0);
        if prefix > u {
            return Some(index);
        }
    }

    // Floating-point shortfall at the very end of the walk
    Some(weights.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_empty_returns_none() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(weighted_sample_index(&mut rng, &[]), None);
    }

    #[test]
    fn test_all_zero_returns_last() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(weighted_sample_index(&mut rng, &[0.0, 0.0, 0.0]), Some(2));
    }

    #[test]
    fn test_single_positive_weight_always_selected() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(weighted_sample_index(&mut rng, &[0.0, 5.0, 0.0]), Some(1));
        }
    }

    #[test]
    fn test_selection_rates_converge_to_weights() {
        let mut rng = StdRng::seed_from_u64(42);
        let weights = [1.0, 3.0, 6.0];
        let mut hits = [0u32; 3];
        let draws = 100_000;

        for _ in 0..draws {
            let index = weighted_sample_index(&mut rng, &weights).unwrap();
            hits[index] += 1;
        }

        let total: f64 = weights.iter().sum();
        for (index, weight) in weights.iter().enumerate() {
            let expected = weight / total;
            let observed = f64::from(hits[index]) / f64::from(draws);
            assert!(
                (observed - expected).abs() < 0.01,
                "index {index}: observed {observed}, expected {expected}"
            );
        }
    }
}

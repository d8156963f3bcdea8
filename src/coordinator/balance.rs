//! Read Load Balancing
//!
//! Picks the replica a new reader should use: the least-loaded one,
//! with ties broken uniformly at random.

use rand::seq::SliceRandom;
use rand::Rng;

use super::ReplicaId;

/// Choose the replica with the fewest active readers.
///
/// Every replica sharing the minimum count is a candidate and one is drawn
/// uniformly, so symmetric replicas never skew toward the lowest index.
/// Returns `None` only for an empty slice.
pub fn least_loaded<R: Rng + ?Sized>(reader_counts: &[usize], rng: &mut R) -> Option<ReplicaId> {
    let min = *reader_counts.iter().min()?;

    let candidates: Vec<ReplicaId> = reader_counts
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count == min)
        .map(|(replica, _)| replica)
        .collect();

    candidates.choose(rng).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_single_minimum_is_always_chosen() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(least_loaded(&[4, 1, 3], &mut rng), Some(1));
        }
    }

    #[test]
    fn test_empty_counts() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(least_loaded(&[], &mut rng), None);
    }

    #[test]
    fn test_ties_are_broken_evenly() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut picks = [0usize; 3];

        for _ in 0..2000 {
            let replica = least_loaded(&[1, 0, 0], &mut rng).unwrap();
            picks[replica] += 1;
        }

        // The loaded replica is never picked, the tied pair splits ~50/50
        assert_eq!(picks[0], 0);
        assert!(picks[1] > 800 && picks[1] < 1200, "picks: {:?}", picks);
        assert!(picks[2] > 800 && picks[2] < 1200, "picks: {:?}", picks);
    }
}

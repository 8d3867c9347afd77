//! Brute-force Hamming matching with mutual cross-check.

use super::FeatureSet;

/// A correspondence between two feature sets.
#[derive(Debug, Clone, Copy)]
pub struct FeatureMatch {
    /// Index into the first (query) set.
    pub query: usize,
    /// Index into the second (train) set.
    pub train: usize,
    pub distance: u32,
}

/// Match two feature sets with mutual nearest-neighbor consistency.
///
/// A pair survives only when each descriptor is the other's nearest
/// neighbor, mirroring a Hamming brute-force matcher with cross-checking.
/// The result is sorted by ascending distance.
pub fn match_features(query: &FeatureSet, train: &FeatureSet) -> Vec<FeatureMatch> {
    if query.is_empty() || train.is_empty() {
        return Vec::new();
    }

    let forward = nearest_neighbors(query, train);
    let backward = nearest_neighbors(train, query);

    let mut matches: Vec<FeatureMatch> = forward
        .into_iter()
        .enumerate()
        .filter_map(|(query_idx, (train_idx, distance))| {
            (backward[train_idx].0 == query_idx).then_some(FeatureMatch {
                query: query_idx,
                train: train_idx,
                distance,
            })
        })
        .collect();

    matches.sort_by(|a, b| a.distance.cmp(&b.distance).then(a.query.cmp(&b.query)));
    matches
}

/// For each descriptor in `from`, the index and distance of its nearest
/// neighbor in `to`. Ties resolve to the lowest index.
fn nearest_neighbors(from: &FeatureSet, to: &FeatureSet) -> Vec<(usize, u32)> {
    from.descriptors
        .iter()
        .map(|d| {
            let mut best = (0usize, u32::MAX);
            for (idx, other) in to.descriptors.iter().enumerate() {
                let distance = d.hamming_distance(other);
                if distance < best.1 {
                    best = (idx, distance);
                }
            }
            best
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::descriptor::{Descriptor, DESCRIPTOR_BYTES};
    use crate::features::KeyPoint;

    fn set_from_bytes(rows: &[[u8; DESCRIPTOR_BYTES]]) -> FeatureSet {
        FeatureSet {
            keypoints: rows
                .iter()
                .enumerate()
                .map(|(i, _)| KeyPoint {
                    x: i as f64,
                    y: 0.0,
                    response: 1.0,
                    angle: 0.0,
                })
                .collect(),
            descriptors: rows.iter().map(|r| Descriptor(*r)).collect(),
        }
    }

    fn desc(seed: u8) -> [u8; DESCRIPTOR_BYTES] {
        std::array::from_fn(|i| seed.wrapping_mul(31).wrapping_add(i as u8))
    }

    #[test]
    fn identical_sets_match_one_to_one() {
        let rows = [desc(1), desc(7), desc(42), desc(99)];
        let a = set_from_bytes(&rows);
        let b = set_from_bytes(&rows);

        let matches = match_features(&a, &b);
        assert_eq!(matches.len(), rows.len());
        for m in &matches {
            assert_eq!(m.query, m.train);
            assert_eq!(m.distance, 0);
        }
    }

    #[test]
    fn one_sided_nearest_neighbor_is_rejected() {
        // a0's nearest neighbor is b1; b0's nearest is also a0, but the
        // cross-check only accepts the mutual pair (a0, b1).
        let a = set_from_bytes(&[[0u8; DESCRIPTOR_BYTES]]);
        let mut near = [0u8; DESCRIPTOR_BYTES];
        near[0] = 0b1;
        let b = set_from_bytes(&[near, [0u8; DESCRIPTOR_BYTES]]);

        let matches = match_features(&a, &b);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].train, 1);
    }

    #[test]
    fn matches_sorted_by_distance() {
        let zeros = [0u8; DESCRIPTOR_BYTES];
        let mut one_bit = zeros;
        one_bit[3] = 0b100;
        let mut far = desc(200);
        far[0] ^= 0b11;

        // Pairings by mutual proximity: (0↔0) at distance 2, (1↔1) at 1.
        let a = set_from_bytes(&[desc(200), zeros]);
        let b = set_from_bytes(&[far, one_bit]);

        let matches = match_features(&a, &b);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].distance, 1);
        assert_eq!(matches[1].distance, 2);
    }

    #[test]
    fn empty_sets_yield_no_matches() {
        let a = set_from_bytes(&[desc(3)]);
        assert!(match_features(&a, &FeatureSet::default()).is_empty());
        assert!(match_features(&FeatureSet::default(), &a).is_empty());
    }
}

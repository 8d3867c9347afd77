//! Colored point cloud accumulator.

use nalgebra::Vector3;

/// Parallel ordered sequences of world-frame points and RGB colors.
///
/// The two vectors grow in lockstep; every constructor and mutation keeps
/// `points.len() == colors.len()`.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    pub points: Vec<Vector3<f64>>,
    pub colors: Vec<[u8; 3]>,
}

impl PointCloud {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            colors: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, point: Vector3<f64>, color: [u8; 3]) {
        self.points.push(point);
        self.colors.push(color);
    }

    /// Append another cloud's points; merge order does not affect validity,
    /// only the ordering of the output file.
    pub fn merge(&mut self, other: PointCloud) {
        self.points.extend(other.points);
        self.colors.extend(other.colors);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

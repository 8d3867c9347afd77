//! Tracking state per keyframe step.

use serde::{Deserialize, Serialize};

/// Confidence label for one pose in the trajectory, derived from the inlier
/// count of the step that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingState {
    /// Step supported by at least twice the minimum inlier count.
    Good,
    /// Step supported, but below the comfortable margin.
    Limited,
    /// Step failed; the previous world pose was carried forward.
    Lost,
}

impl TrackingState {
    /// Classify a step from its inlier count.
    pub fn classify(inliers: usize, min_inliers: usize) -> Self {
        if inliers >= min_inliers * 2 {
            TrackingState::Good
        } else if inliers >= min_inliers {
            TrackingState::Limited
        } else {
            TrackingState::Lost
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingState::Good => "good",
            TrackingState::Limited => "limited",
            TrackingState::Lost => "lost",
        }
    }
}

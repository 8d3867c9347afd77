//! Pipeline parameter sets with defaults.
//!
//! Configuration file parsing is owned by the calling application; the
//! library only consumes these plain structs.

use serde::{Deserialize, Serialize};

/// Parameters for the streaming keyframe selector.
#[derive(Debug, Clone)]
pub struct KeyframeConfig {
    /// Keep at most one frame per `interval` source frames.
    pub interval: u64,
    /// Frames with a variance-of-Laplacian blur score below this are rejected.
    pub blur_threshold: f64,
    /// Minimum mean absolute pixel difference against the previous kept frame.
    pub pixel_delta_threshold: f64,
}

impl Default for KeyframeConfig {
    fn default() -> Self {
        Self {
            interval: 4,
            blur_threshold: 40.0,
            pixel_delta_threshold: 10.0,
        }
    }
}

/// Parameters for the monocular pose tracker.
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    /// Below this inlier count a step is lost; at `2 * min_inliers` it is good.
    pub min_inliers: usize,
    /// Magnitude assigned to every relative translation step, in meters.
    pub step_scale_m: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_inliers: 30,
            step_scale_m: 0.1,
        }
    }
}

/// Match-count budget per reconstructed pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityProfile {
    High,
    Medium,
}

impl QualityProfile {
    /// Maximum matches retained per keyframe pair.
    pub fn max_matches(&self) -> usize {
        match self {
            QualityProfile::High => 1200,
            QualityProfile::Medium => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityProfile::High => "high",
            QualityProfile::Medium => "medium",
        }
    }
}

/// Parameters for multi-view reconstruction.
#[derive(Debug, Clone)]
pub struct ReconstructionConfig {
    pub quality: QualityProfile,
    /// Statistical outlier removal, applied when the cloud exceeds 50 points.
    pub enable_outlier_filter: bool,
    /// Convex-hull mesh export, attempted when the cloud has at least 30 points.
    pub enable_mesh_export: bool,
    /// Prefer the binary cloud writer over the baseline ASCII grammar.
    pub enable_enhanced_writer: bool,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            quality: QualityProfile::High,
            enable_outlier_filter: true,
            enable_mesh_export: true,
            enable_enhanced_writer: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_profile_match_caps() {
        assert_eq!(QualityProfile::High.max_matches(), 1200);
        assert_eq!(QualityProfile::Medium.max_matches(), 500);
    }

    #[test]
    fn quality_profile_serializes_lowercase() {
        let json = serde_json::to_string(&QualityProfile::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
    }
}

//! Binary feature extraction and matching.
//!
//! The pipeline detects FAST corners over a small image pyramid, orients
//! them with the intensity centroid, and describes them with 256-bit
//! steered BRIEF descriptors matched under the Hamming distance.

pub mod descriptor;
pub mod detector;
pub mod matcher;

pub use descriptor::Descriptor;
pub use matcher::{match_features, FeatureMatch};

/// A detected corner with its response strength and orientation (radians).
#[derive(Debug, Clone, Copy)]
pub struct KeyPoint {
    pub x: f64,
    pub y: f64,
    pub response: f64,
    pub angle: f64,
}

/// Keypoints and their descriptors in parallel order.
///
/// Keypoints whose descriptor window leaves the image are dropped during
/// extraction, so the two vectors always have equal length.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub keypoints: Vec<KeyPoint>,
    pub descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Detect, orient and describe at most `max_features` keypoints.
pub fn extract_features(image: &image::GrayImage, max_features: usize) -> FeatureSet {
    let mut keypoints = detector::detect_keypoints(image, max_features);
    detector::compute_orientations(image, &mut keypoints);

    let mut set = FeatureSet::default();
    for kp in keypoints {
        if let Some(desc) = descriptor::describe(image, &kp) {
            set.keypoints.push(kp);
            set.descriptors.push(desc);
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn textured(width: u32, height: u32) -> GrayImage {
        let mut state: u64 = 0x2545F4914F6CDD1D;
        GrayImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            Luma([(state >> 56) as u8])
        })
    }

    #[test]
    fn textured_image_yields_features() {
        let img = textured(128, 128);
        let set = extract_features(&img, 500);
        assert!(set.len() >= 8, "only {} features detected", set.len());
        assert_eq!(set.keypoints.len(), set.descriptors.len());
    }

    #[test]
    fn uniform_image_yields_no_features() {
        let img = GrayImage::from_pixel(128, 128, Luma([127]));
        let set = extract_features(&img, 500);
        assert!(set.is_empty());
    }

    #[test]
    fn feature_count_respects_cap() {
        let img = textured(256, 256);
        let set = extract_features(&img, 50);
        assert!(set.len() <= 50);
    }
}

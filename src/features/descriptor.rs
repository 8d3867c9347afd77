//! 256-bit steered BRIEF descriptors.
//!
//! The sampling pattern is generated once from a fixed-seed generator so
//! descriptors are reproducible across runs and processes; each pair is
//! rotated by the keypoint orientation before sampling.

use std::sync::OnceLock;

use image::GrayImage;

use super::KeyPoint;

/// Descriptor payload: 256 comparisons packed into 32 bytes.
pub const DESCRIPTOR_BYTES: usize = 32;

const NUM_PAIRS: usize = DESCRIPTOR_BYTES * 8;

/// Half-side of the sampling patch.
const PATCH_HALF: f32 = 15.0;

/// Keypoints closer than this to the border are not described; it covers the
/// worst-case rotated sample offset (PATCH_HALF · √2, rounded up).
const BORDER_MARGIN: i32 = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor(pub [u8; DESCRIPTOR_BYTES]);

impl Descriptor {
    /// Number of differing bits between two descriptors.
    pub fn hamming_distance(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

/// Deterministic sampling pattern of 256 point pairs inside the patch.
fn pattern() -> &'static [(f32, f32, f32, f32); NUM_PAIRS] {
    static PATTERN: OnceLock<[(f32, f32, f32, f32); NUM_PAIRS]> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut state: u64 = 0x9E3779B97F4A7C15;
        let mut next_coord = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            // Top bits have the best mixing in this generator.
            let unit = (state >> 40) as f32 / (1u64 << 24) as f32;
            unit * 2.0 * PATCH_HALF - PATCH_HALF
        };
        std::array::from_fn(|_| (next_coord(), next_coord(), next_coord(), next_coord()))
    })
}

/// Describe a keypoint, or `None` when its patch would leave the image.
pub fn describe(image: &GrayImage, kp: &KeyPoint) -> Option<Descriptor> {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let cx = kp.x as i32;
    let cy = kp.y as i32;

    if cx < BORDER_MARGIN
        || cy < BORDER_MARGIN
        || cx >= width - BORDER_MARGIN
        || cy >= height - BORDER_MARGIN
    {
        return None;
    }

    let cos_a = kp.angle.cos() as f32;
    let sin_a = kp.angle.sin() as f32;

    let mut bytes = [0u8; DESCRIPTOR_BYTES];
    for (i, &(x1, y1, x2, y2)) in pattern().iter().enumerate() {
        let rx1 = cos_a * x1 - sin_a * y1;
        let ry1 = sin_a * x1 + cos_a * y1;
        let rx2 = cos_a * x2 - sin_a * y2;
        let ry2 = sin_a * x2 + cos_a * y2;

        let val1 = image.get_pixel((cx + rx1 as i32) as u32, (cy + ry1 as i32) as u32)[0];
        let val2 = image.get_pixel((cx + rx2 as i32) as u32, (cy + ry2 as i32) as u32)[0];

        if val1 < val2 {
            bytes[i / 8] |= 1 << (7 - i % 8);
        }
    }

    Some(Descriptor(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn textured() -> GrayImage {
        GrayImage::from_fn(96, 96, |x, y| {
            Luma([((x * 31 + y * 57) % 251) as u8])
        })
    }

    fn center_keypoint() -> KeyPoint {
        KeyPoint {
            x: 48.0,
            y: 48.0,
            response: 1.0,
            angle: 0.0,
        }
    }

    #[test]
    fn hamming_distance_is_zero_for_identical() {
        let img = textured();
        let d = describe(&img, &center_keypoint()).unwrap();
        assert_eq!(d.hamming_distance(&d), 0);
    }

    #[test]
    fn hamming_distance_counts_flipped_bits() {
        let a = Descriptor([0u8; DESCRIPTOR_BYTES]);
        let mut flipped = [0u8; DESCRIPTOR_BYTES];
        flipped[0] = 0b1010_0000;
        flipped[31] = 0b0000_0001;
        assert_eq!(a.hamming_distance(&Descriptor(flipped)), 3);
    }

    #[test]
    fn border_keypoints_are_rejected() {
        let img = textured();
        let kp = KeyPoint {
            x: 5.0,
            y: 48.0,
            response: 1.0,
            angle: 0.0,
        };
        assert!(describe(&img, &kp).is_none());
    }

    #[test]
    fn descriptor_is_reproducible() {
        let img = textured();
        let a = describe(&img, &center_keypoint()).unwrap();
        let b = describe(&img, &center_keypoint()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn shifted_patch_matches_shifted_keypoint() {
        // The same texture sampled at the same relative location must give
        // the same descriptor, the property matching relies on.
        let img = textured();
        let wider = GrayImage::from_fn(106, 96, |x, y| {
            if x >= 10 {
                *img.get_pixel(x - 10, y)
            } else {
                Luma([0])
            }
        });
        let d1 = describe(&img, &center_keypoint()).unwrap();
        let d2 = describe(
            &wider,
            &KeyPoint {
                x: 58.0,
                y: 48.0,
                response: 1.0,
                angle: 0.0,
            },
        )
        .unwrap();
        assert_eq!(d1.hamming_distance(&d2), 0);
    }
}

//! FAST corner detection with intensity-centroid orientation.

use image::GrayImage;

use super::KeyPoint;

/// Bresenham circle of radius 3 sampled at 12 positions.
const CIRCLE_OFFSETS: [(i32, i32); 12] = [
    (-3, 0),
    (-2, 1),
    (-1, 2),
    (0, 3),
    (1, 2),
    (2, 1),
    (3, 0),
    (2, -1),
    (1, -2),
    (0, -3),
    (-1, -2),
    (-2, -1),
];

/// Circle samples that must agree for a corner.
const MIN_ARC: usize = 9;

/// Intensity difference for a circle pixel to count as brighter/darker.
const FAST_THRESHOLD: u8 = 20;

/// Pyramid used for a measure of scale invariance.
const N_LEVELS: usize = 4;
const SCALE_FACTOR: f32 = 1.2;

/// Patch side for the intensity-centroid orientation.
const ORIENTATION_PATCH: i32 = 31;

/// Detect FAST corners over the pyramid, rank by corner response and keep
/// the `max_features` strongest. Coordinates are in the original image frame.
pub fn detect_keypoints(image: &GrayImage, max_features: usize) -> Vec<KeyPoint> {
    let mut all = Vec::new();
    let mut scale = 1.0f32;

    for level in 0..N_LEVELS {
        let scaled;
        let level_image = if level == 0 {
            image
        } else {
            let w = (image.width() as f32 / scale) as u32;
            let h = (image.height() as f32 / scale) as u32;
            if w < 16 || h < 16 {
                break;
            }
            scaled = image::imageops::resize(image, w, h, image::imageops::FilterType::Triangle);
            &scaled
        };

        for kp in detect_level(level_image) {
            all.push(KeyPoint {
                x: kp.x * scale as f64,
                y: kp.y * scale as f64,
                response: kp.response,
                angle: 0.0,
            });
        }
        scale *= SCALE_FACTOR;
    }

    all.sort_by(|a, b| {
        b.response
            .partial_cmp(&a.response)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    all.truncate(max_features);
    all
}

fn detect_level(image: &GrayImage) -> Vec<KeyPoint> {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let mut keypoints = Vec::new();
    if width < 7 || height < 7 {
        return keypoints;
    }

    for y in 3..height - 3 {
        for x in 3..width - 3 {
            let p = image.get_pixel(x as u32, y as u32)[0];

            let mut brighter = 0usize;
            let mut darker = 0usize;
            let mut response = 0.0f64;

            for &(dx, dy) in &CIRCLE_OFFSETS {
                let val = image.get_pixel((x + dx) as u32, (y + dy) as u32)[0];
                if val > p.saturating_add(FAST_THRESHOLD) {
                    brighter += 1;
                    response += (val - p) as f64;
                } else if val < p.saturating_sub(FAST_THRESHOLD) {
                    darker += 1;
                    response += (p - val) as f64;
                }
            }

            if brighter >= MIN_ARC || darker >= MIN_ARC {
                keypoints.push(KeyPoint {
                    x: x as f64,
                    y: y as f64,
                    response,
                    angle: 0.0,
                });
            }
        }
    }
    keypoints
}

/// Assign each keypoint the intensity-centroid orientation of its patch.
pub fn compute_orientations(image: &GrayImage, keypoints: &mut [KeyPoint]) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let half = ORIENTATION_PATCH / 2;

    for kp in keypoints {
        let cx = kp.x as i32;
        let cy = kp.y as i32;
        let mut m01 = 0.0f64;
        let mut m10 = 0.0f64;

        for dy in -half..=half {
            for dx in -half..=half {
                let px = cx + dx;
                let py = cy + dy;
                if px >= 0 && px < width && py >= 0 && py < height {
                    let intensity = image.get_pixel(px as u32, py as u32)[0] as f64;
                    m01 += intensity * dy as f64;
                    m10 += intensity * dx as f64;
                }
            }
        }

        kp.angle = m01.atan2(m10);
    }
}

//! Streaming keyframe selection.
//!
//! The selector is a single forward pass over the source stream: it carries
//! the previously *kept* grayscale frame (and nothing else) between calls,
//! so a run cannot be resumed mid-stream without replaying from frame 0.

use image::GrayImage;

use crate::config::KeyframeConfig;

/// Outcome of evaluating one source frame.
#[derive(Debug, Clone, Copy)]
pub struct KeyframeDecision {
    pub keep: bool,
    /// Variance-of-Laplacian sharpness measure for the frame.
    pub blur_score: f64,
}

/// Keyframe decision state machine.
///
/// Rules, in order:
/// 1. frame 0 is always kept;
/// 2. a frame below the blur threshold is never kept;
/// 3. before any frame has been kept, the interval gate alone decides;
/// 4. afterwards the interval gate AND the mean absolute pixel difference
///    against the previous kept frame must both pass.
///
/// The carried frame is updated only on a keep decision.
pub struct KeyframeSelector {
    config: KeyframeConfig,
    previous_kept: Option<GrayImage>,
}

impl KeyframeSelector {
    pub fn new(config: KeyframeConfig) -> Self {
        Self {
            config,
            previous_kept: None,
        }
    }

    pub fn evaluate(&mut self, frame_index: u64, gray: &GrayImage) -> KeyframeDecision {
        let blur_score = variance_of_laplacian(gray);
        let keep = self.should_keep(frame_index, gray, blur_score);
        if keep {
            self.previous_kept = Some(gray.clone());
        }
        KeyframeDecision { keep, blur_score }
    }

    fn should_keep(&self, frame_index: u64, gray: &GrayImage, blur_score: f64) -> bool {
        if frame_index == 0 {
            return true;
        }
        if blur_score < self.config.blur_threshold {
            return false;
        }
        let on_interval = frame_index % self.config.interval.max(1) == 0;
        match &self.previous_kept {
            None => on_interval,
            Some(prev) => {
                on_interval && mean_abs_diff(prev, gray) >= self.config.pixel_delta_threshold
            }
        }
    }
}

/// Variance of the 3x3 Laplacian response; low values mean a blurry frame.
pub fn variance_of_laplacian(gray: &GrayImage) -> f64 {
    let width = gray.width() as i64;
    let height = gray.height() as i64;
    if width < 3 || height < 3 {
        return 0.0;
    }

    let px = |x: i64, y: i64| gray.get_pixel(x as u32, y as u32)[0] as f64;
    let count = ((width - 2) * (height - 2)) as f64;

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let lap =
                px(x - 1, y) + px(x + 1, y) + px(x, y - 1) + px(x, y + 1) - 4.0 * px(x, y);
            sum += lap;
            sum_sq += lap * lap;
        }
    }

    let mean = sum / count;
    sum_sq / count - mean * mean
}

/// Mean absolute per-pixel difference between two frames of equal size.
///
/// A dimension mismatch is treated as unbounded motion so the interval rule
/// alone decides; the capture stream never changes resolution mid-session.
pub fn mean_abs_diff(a: &GrayImage, b: &GrayImage) -> f64 {
    if a.dimensions() != b.dimensions() {
        return f64::INFINITY;
    }
    let total: u64 = a
        .as_raw()
        .iter()
        .zip(b.as_raw().iter())
        .map(|(&pa, &pb)| pa.abs_diff(pb) as u64)
        .sum();
    total as f64 / a.as_raw().len() as f64
}

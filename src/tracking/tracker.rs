//! Sequential monocular visual odometry over the keyframe sequence.
//!
//! Pose i depends on the accumulated world pose through i-1, so the tracker
//! is an explicit sequential fold: one pass over consecutive keyframe pairs,
//! carrying the world rotation and translation. Every per-step failure
//! downgrades that step to `Lost` and carries the pose forward; only an
//! empty session or unreadable session metadata aborts the run.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use nalgebra::{Matrix3, Point2, Vector3};
use tracing::{debug, info, warn};

use crate::config::TrackingConfig;
use crate::features::{extract_features, match_features, FeatureSet};
use crate::geometry::epipolar::MIN_PAIR_MATCHES;
use crate::geometry::{
    find_essential_ransac, recover_pose, rotation_to_quaternion_xyzw, RansacParams,
};
use crate::io::session::{self, FrameRecord, Trajectory, TrajectoryPose};
use crate::tracking::TrackingState;

/// Feature budget per tracked keyframe image.
const MAX_FEATURES: usize = 2000;

/// Relative translations shorter than this are left unscaled to avoid
/// normalizing a numerically-zero direction.
const MIN_STEP_NORM: f64 = 1e-8;

/// Result of a tracking run.
#[derive(Debug, Clone)]
pub struct TrackingSummary {
    pub trajectory_path: PathBuf,
    pub pose_count: usize,
    pub good_ratio: f64,
}

/// Relative motion estimated for one keyframe pair.
struct StepEstimate {
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
    inliers: usize,
}

/// Track the session's keyframe sequence and persist the trajectory.
pub fn run_tracking(session_dir: &Path, config: &TrackingConfig) -> Result<TrackingSummary> {
    let frames = session::load_frame_records(session_dir)?;
    if frames.is_empty() {
        bail!("session has no keyframes");
    }
    let intrinsics = session::load_intrinsics(session_dir)?;
    let k = intrinsics.matrix();
    let ransac = RansacParams::default();

    let mut world_rotation = Matrix3::<f64>::identity();
    let mut world_translation = Vector3::<f64>::zeros();
    let mut poses = Vec::with_capacity(frames.len());
    poses.push(TrajectoryPose::origin(&frames[0]));

    let mut previous = load_features(session_dir, &frames[0]);

    for frame in &frames[1..] {
        let current = load_features(session_dir, frame);

        let estimate = match (&previous, &current) {
            (Some(prev), Some(curr)) => track_step(prev, curr, &k, &ransac),
            _ => None,
        };

        let state = match estimate {
            Some(step) => {
                let state = TrackingState::classify(step.inliers, config.min_inliers);
                if state != TrackingState::Lost {
                    let mut t_rel = step.translation;
                    let norm = t_rel.norm();
                    if norm > MIN_STEP_NORM {
                        // The monocular scale is unobservable; every step is
                        // assigned a fixed metric length instead.
                        t_rel = t_rel / norm * config.step_scale_m;
                    }
                    world_translation += world_rotation * t_rel;
                    world_rotation *= step.rotation;
                }
                debug!(
                    keyframe = frame.keyframe_index,
                    inliers = step.inliers,
                    state = state.as_str(),
                    "tracked keyframe pair"
                );
                state
            }
            None => {
                debug!(
                    keyframe = frame.keyframe_index,
                    "step lost; carrying pose forward"
                );
                TrackingState::Lost
            }
        };

        poses.push(TrajectoryPose::new(
            frame,
            [
                world_translation.x,
                world_translation.y,
                world_translation.z,
            ],
            rotation_to_quaternion_xyzw(&world_rotation),
            state,
        ));
        previous = current;
    }

    let trajectory = Trajectory::from_poses(poses);
    let trajectory_path = session::write_trajectory(session_dir, &trajectory)?;
    info!(
        poses = trajectory.metrics.pose_count,
        good_ratio = trajectory.metrics.good_ratio,
        "tracking finished"
    );

    Ok(TrackingSummary {
        trajectory_path,
        pose_count: trajectory.metrics.pose_count,
        good_ratio: trajectory.metrics.good_ratio,
    })
}

/// Estimate the relative motion of one pair, or `None` when the step is lost.
fn track_step(
    prev: &FeatureSet,
    curr: &FeatureSet,
    k: &Matrix3<f64>,
    ransac: &RansacParams,
) -> Option<StepEstimate> {
    if prev.len() < MIN_PAIR_MATCHES || curr.len() < MIN_PAIR_MATCHES {
        return None;
    }

    let matches = match_features(prev, curr);
    if matches.len() < MIN_PAIR_MATCHES {
        return None;
    }

    let pts1: Vec<Point2<f64>> = matches
        .iter()
        .map(|m| {
            let kp = &prev.keypoints[m.query];
            Point2::new(kp.x, kp.y)
        })
        .collect();
    let pts2: Vec<Point2<f64>> = matches
        .iter()
        .map(|m| {
            let kp = &curr.keypoints[m.train];
            Point2::new(kp.x, kp.y)
        })
        .collect();

    let geometry = find_essential_ransac(&pts1, &pts2, k, ransac)?;
    let pose = recover_pose(&geometry.essential, &pts1, &pts2, k, &geometry.inliers)?;

    Some(StepEstimate {
        rotation: pose.rotation,
        translation: pose.translation,
        inliers: geometry.inlier_count,
    })
}

/// Load a keyframe image and extract its features; an unreadable image is a
/// lost step, not an error.
fn load_features(session_dir: &Path, frame: &FrameRecord) -> Option<FeatureSet> {
    match session::open_image(session_dir, &frame.relative_rgb_path) {
        Ok(img) => Some(extract_features(&img.to_luma8(), MAX_FEATURES)),
        Err(err) => {
            warn!(
                keyframe = frame.keyframe_index,
                error = %err,
                "keyframe image unreadable"
            );
            None
        }
    }
}

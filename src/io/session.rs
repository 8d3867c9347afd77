//! Session directory records and persistence.
//!
//! A session is a directory produced by the capture stage:
//!
//! ```text
//! <session>/meta/intrinsics.json
//! <session>/meta/frames.jsonl          one FrameRecord per line
//! <session>/rgb/frame_000000.png       referenced by the records
//! ```
//!
//! The tracker adds `meta/trajectory.json`; the reconstructor adds
//! `reconstruction/pointcloud.ply`, optionally `reconstruction/mesh.obj`,
//! and `reconstruction/reconstruction.json`.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use image::DynamicImage;
use nalgebra::Matrix3;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::config::QualityProfile;
use crate::tracking::TrackingState;

pub const SCHEMA_VERSION: &str = "v1";
pub const POSE_SOURCE_SLAM: &str = "slam";

/// Pinhole camera intrinsics, immutable for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intrinsics {
    pub camera_id: String,
    pub version: u32,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    /// The projection matrix K.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0,
        )
    }
}

/// One kept keyframe as recorded by the capture stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    pub frame_index: u64,
    pub keyframe_index: u64,
    pub relative_rgb_path: String,
    pub t_capture_ns: u64,
    pub t_wall_ms: u64,
    pub width: u32,
    pub height: u32,
    pub blur_score: f64,
}

/// One pose of the estimated trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryPose {
    pub frame_index: u64,
    pub keyframe_index: u64,
    pub translation_m: [f64; 3],
    pub quaternion_xyzw: [f64; 4],
    pub tracking_state: TrackingState,
    #[serde(default = "default_pose_source")]
    pub pose_source: String,
}

fn default_pose_source() -> String {
    POSE_SOURCE_SLAM.to_string()
}

impl TrajectoryPose {
    pub fn new(
        frame: &FrameRecord,
        translation_m: [f64; 3],
        quaternion_xyzw: [f64; 4],
        tracking_state: TrackingState,
    ) -> Self {
        Self {
            frame_index: frame.frame_index,
            keyframe_index: frame.keyframe_index,
            translation_m,
            quaternion_xyzw,
            tracking_state,
            pose_source: default_pose_source(),
        }
    }

    /// The identity pose emitted for keyframe 0.
    pub fn origin(frame: &FrameRecord) -> Self {
        Self::new(
            frame,
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
            TrackingState::Good,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryMetrics {
    pub pose_count: usize,
    pub good_ratio: f64,
}

/// The persisted trajectory artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    pub schema_version: String,
    pub pose_source: String,
    pub poses: Vec<TrajectoryPose>,
    pub metrics: TrajectoryMetrics,
}

impl Trajectory {
    pub fn from_poses(poses: Vec<TrajectoryPose>) -> Self {
        let good = poses
            .iter()
            .filter(|p| p.tracking_state == TrackingState::Good)
            .count();
        let metrics = TrajectoryMetrics {
            pose_count: poses.len(),
            good_ratio: good as f64 / poses.len().max(1) as f64,
        };
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            pose_source: POSE_SOURCE_SLAM.to_string(),
            poses,
            metrics,
        }
    }
}

/// The persisted reconstruction summary artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionRecord {
    pub schema_version: String,
    pub point_count: usize,
    pub mesh_generated: bool,
    pub quality_profile: QualityProfile,
}

pub fn intrinsics_path(session_dir: &Path) -> PathBuf {
    session_dir.join("meta/intrinsics.json")
}

pub fn frames_path(session_dir: &Path) -> PathBuf {
    session_dir.join("meta/frames.jsonl")
}

pub fn trajectory_path(session_dir: &Path) -> PathBuf {
    session_dir.join("meta/trajectory.json")
}

pub fn pointcloud_path(session_dir: &Path) -> PathBuf {
    session_dir.join("reconstruction/pointcloud.ply")
}

pub fn mesh_path(session_dir: &Path) -> PathBuf {
    session_dir.join("reconstruction/mesh.obj")
}

pub fn reconstruction_record_path(session_dir: &Path) -> PathBuf {
    session_dir.join("reconstruction/reconstruction.json")
}

/// Load and validate the session intrinsics.
pub fn load_intrinsics(session_dir: &Path) -> Result<Intrinsics> {
    let intrinsics: Intrinsics = read_json(&intrinsics_path(session_dir))?;
    if intrinsics.fx <= 0.0 || intrinsics.fy <= 0.0 {
        bail!(
            "invalid intrinsics: focal lengths must be positive (fx={}, fy={})",
            intrinsics.fx,
            intrinsics.fy
        );
    }
    Ok(intrinsics)
}

/// Load the keyframe records, enforcing the dense 0-based keyframe index.
pub fn load_frame_records(session_dir: &Path) -> Result<Vec<FrameRecord>> {
    let path = frames_path(session_dir);
    let file = fs::File::open(&path)
        .with_context(|| format!("cannot open frame records at {}", path.display()))?;

    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("cannot read {}", path.display()))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: FrameRecord = serde_json::from_str(line)
            .with_context(|| format!("malformed frame record on line {}", line_no + 1))?;
        if record.keyframe_index != records.len() as u64 {
            bail!(
                "keyframe_index {} out of order on line {} (expected {})",
                record.keyframe_index,
                line_no + 1,
                records.len()
            );
        }
        records.push(record);
    }
    Ok(records)
}

/// Write the keyframe records as JSON lines.
pub fn write_frame_records(session_dir: &Path, records: &[FrameRecord]) -> Result<()> {
    let path = frames_path(session_dir);
    ensure_parent(&path)?;
    let mut body = String::new();
    for record in records {
        body.push_str(&serde_json::to_string(record)?);
        body.push('\n');
    }
    fs::write(&path, body).with_context(|| format!("cannot write {}", path.display()))
}

pub fn write_trajectory(session_dir: &Path, trajectory: &Trajectory) -> Result<PathBuf> {
    let path = trajectory_path(session_dir);
    write_json(&path, trajectory)?;
    Ok(path)
}

pub fn load_trajectory(session_dir: &Path) -> Result<Trajectory> {
    read_json(&trajectory_path(session_dir))
}

pub fn write_reconstruction_record(
    session_dir: &Path,
    record: &ReconstructionRecord,
) -> Result<PathBuf> {
    let path = reconstruction_record_path(session_dir);
    write_json(&path, record)?;
    Ok(path)
}

pub fn write_intrinsics(session_dir: &Path, intrinsics: &Intrinsics) -> Result<()> {
    write_json(&intrinsics_path(session_dir), intrinsics)
}

/// Resolve and decode a frame image relative to the session root.
pub fn open_image(session_dir: &Path, relative_path: &str) -> Result<DynamicImage> {
    let path = session_dir.join(relative_path);
    image::open(&path).with_context(|| format!("cannot read image {}", path.display()))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("cannot create directory {}", parent.display()))?;
    }
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let body = serde_json::to_string_pretty(value)?;
    fs::write(path, body).with_context(|| format!("cannot write {}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let body =
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&body).with_context(|| format!("malformed JSON in {}", path.display()))
}

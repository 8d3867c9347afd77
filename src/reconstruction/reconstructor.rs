//! Multi-view reconstruction over consecutive keyframe pairs.
//!
//! Each pair is triangulated independently with a fresh feature pass and its
//! own relative pose, then placed into the world frame with the *tracker's*
//! pose at the pair's first keyframe. The two pose estimates are never
//! reconciled. Pairs are independent, so they run as a parallel map with an
//! order-independent merge; only the finalized trajectory is shared, and
//! read-only.

use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nalgebra::{Point2, Vector3};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::ReconstructionConfig;
use crate::features::{extract_features, match_features};
use crate::geometry::epipolar::MIN_PAIR_MATCHES;
use crate::geometry::{
    find_essential_ransac, identity_projection, projection_from_krt, quaternion_xyzw_to_rotation,
    recover_pose, triangulate_points, RansacParams,
};
use crate::io::session::{
    self, FrameRecord, ReconstructionRecord, TrajectoryPose, SCHEMA_VERSION,
};
use crate::io::ply;
use crate::reconstruction::capability::CapabilitySet;
use crate::reconstruction::PointCloud;

/// Feature budget per reconstructed image.
const MAX_FEATURES: usize = 3000;

/// Triangulated points at or beyond this distance are discarded as unstable.
const MAX_POINT_NORM: f64 = 100.0;

/// Outlier filtering only engages above this cloud size.
const FILTER_MIN_POINTS: usize = 50;

/// Mesh export only engages at or above this cloud size.
const MESH_MIN_POINTS: usize = 30;

/// Color of the fallback cloud built from trajectory positions.
const FALLBACK_GRAY: [u8; 3] = [180, 180, 180];

/// Result of a reconstruction run.
#[derive(Debug, Clone)]
pub struct ReconstructionSummary {
    pub pointcloud_path: PathBuf,
    pub mesh_path: Option<PathBuf>,
    pub point_count: usize,
}

/// Reconstruct the session's point cloud and persist the artifacts.
pub fn run_reconstruction(
    session_dir: &Path,
    config: &ReconstructionConfig,
) -> Result<ReconstructionSummary> {
    let frames = session::load_frame_records(session_dir)?;
    if frames.is_empty() {
        bail!("session has no keyframes");
    }
    let trajectory = session::load_trajectory(session_dir)
        .context("reconstruction requires a trajectory; run tracking first")?;
    if trajectory.poses.len() != frames.len() {
        bail!(
            "trajectory has {} poses for {} keyframes; rerun tracking",
            trajectory.poses.len(),
            frames.len()
        );
    }
    let intrinsics = session::load_intrinsics(session_dir)?;
    let k = intrinsics.matrix();

    let capabilities = CapabilitySet::detect(config);
    let max_matches = config.quality.max_matches();

    let contributions: Vec<PointCloud> = (0..frames.len().saturating_sub(1))
        .into_par_iter()
        .map(|i| {
            triangulate_pair(
                session_dir,
                &frames[i],
                &frames[i + 1],
                &trajectory.poses[i],
                &k,
                max_matches,
            )
        })
        .collect();

    let mut cloud = PointCloud::default();
    for contribution in contributions {
        cloud.merge(contribution);
    }

    if cloud.is_empty() {
        // Keeps the output non-empty even when every pair fails.
        for pose in &trajectory.poses {
            cloud.push(Vector3::from(pose.translation_m), FALLBACK_GRAY);
        }
        debug!(points = cloud.len(), "triangulation empty; using pose fallback cloud");
    }

    if cloud.len() > FILTER_MIN_POINTS {
        if let Some(filtered) = capabilities.outlier_filter.apply(&cloud) {
            cloud = filtered;
        }
    }

    let pointcloud_path = session::pointcloud_path(session_dir);
    if !capabilities.cloud_writer.write(&cloud, &pointcloud_path) {
        write_ascii_cloud(&pointcloud_path, &cloud)?;
    }

    let mesh_target = session::mesh_path(session_dir);
    let mesh_path = (cloud.len() >= MESH_MIN_POINTS
        && capabilities.mesh_export.export(&cloud, &mesh_target))
    .then_some(mesh_target);

    session::write_reconstruction_record(
        session_dir,
        &ReconstructionRecord {
            schema_version: SCHEMA_VERSION.to_string(),
            point_count: cloud.len(),
            mesh_generated: mesh_path.is_some(),
            quality_profile: config.quality,
        },
    )?;

    info!(
        points = cloud.len(),
        mesh = mesh_path.is_some(),
        quality = config.quality.as_str(),
        "reconstruction finished"
    );

    Ok(ReconstructionSummary {
        pointcloud_path,
        mesh_path,
        point_count: cloud.len(),
    })
}

/// Triangulate one keyframe pair into world-frame points, or an empty cloud
/// when any stage of the pair fails.
fn triangulate_pair(
    session_dir: &Path,
    frame_a: &FrameRecord,
    frame_b: &FrameRecord,
    world_pose: &TrajectoryPose,
    k: &nalgebra::Matrix3<f64>,
    max_matches: usize,
) -> PointCloud {
    let Ok(image_a) = session::open_image(session_dir, &frame_a.relative_rgb_path) else {
        return PointCloud::default();
    };
    let Ok(image_b) = session::open_image(session_dir, &frame_b.relative_rgb_path) else {
        return PointCloud::default();
    };
    let rgb_a = image_a.to_rgb8();

    let features_a = extract_features(&image_a.to_luma8(), MAX_FEATURES);
    let features_b = extract_features(&image_b.to_luma8(), MAX_FEATURES);
    if features_a.len() < MIN_PAIR_MATCHES || features_b.len() < MIN_PAIR_MATCHES {
        return PointCloud::default();
    }

    // match_features sorts ascending by distance, so truncation keeps the
    // strongest correspondences within the quality profile's budget.
    let mut matches = match_features(&features_a, &features_b);
    matches.truncate(max_matches);
    if matches.len() < MIN_PAIR_MATCHES {
        return PointCloud::default();
    }

    let pts1: Vec<Point2<f64>> = matches
        .iter()
        .map(|m| {
            let kp = &features_a.keypoints[m.query];
            Point2::new(kp.x, kp.y)
        })
        .collect();
    let pts2: Vec<Point2<f64>> = matches
        .iter()
        .map(|m| {
            let kp = &features_b.keypoints[m.train];
            Point2::new(kp.x, kp.y)
        })
        .collect();

    let Some(geometry) = find_essential_ransac(&pts1, &pts2, k, &RansacParams::default()) else {
        debug!(
            keyframe = frame_a.keyframe_index,
            "essential estimation failed; pair contributes nothing"
        );
        return PointCloud::default();
    };
    let Some(pair_pose) = recover_pose(&geometry.essential, &pts1, &pts2, k, &geometry.inliers)
    else {
        return PointCloud::default();
    };

    let p1 = identity_projection(k);
    let p2 = projection_from_krt(k, &pair_pose.rotation, &pair_pose.translation);
    let triangulated = triangulate_points(&p1, &p2, &pts1, &pts2);

    let world_rotation = quaternion_xyzw_to_rotation(&world_pose.quaternion_xyzw);
    let world_translation = Vector3::from(world_pose.translation_m);

    let mut cloud = PointCloud::with_capacity(triangulated.len());
    for (local, pixel) in triangulated.iter().zip(&pts1) {
        let finite = local.coords.iter().all(|v| v.is_finite());
        if !finite || local.z <= 0.0 || local.coords.norm() >= MAX_POINT_NORM {
            continue;
        }

        let x = (pixel.x.round() as i64).clamp(0, rgb_a.width() as i64 - 1) as u32;
        let y = (pixel.y.round() as i64).clamp(0, rgb_a.height() as i64 - 1) as u32;
        let color = rgb_a.get_pixel(x, y).0;

        cloud.push(world_rotation * local.coords + world_translation, color);
    }
    cloud
}

fn write_ascii_cloud(path: &Path, cloud: &PointCloud) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create directory {}", parent.display()))?;
    }
    let mut writer = BufWriter::new(
        File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
    );
    ply::write_ascii_ply(&mut writer, cloud)?;
    writer
        .flush()
        .with_context(|| format!("cannot write {}", path.display()))
}

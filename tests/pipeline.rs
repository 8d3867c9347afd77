//! End-to-end pipeline tests over synthetic sessions.
//!
//! Synthetic frames are random textures shifted horizontally between
//! keyframes, with a foreground patch shifted by a larger amount. The two
//! shift magnitudes act as two scene depths (parallax), which keeps the
//! two-view geometry well-posed.

use std::path::Path;

use image::{GrayImage, Luma};

use mono_recon::config::{QualityProfile, ReconstructionConfig, TrackingConfig};
use mono_recon::features::{extract_features, match_features};
use mono_recon::io::session::{
    load_trajectory, write_frame_records, write_intrinsics, FrameRecord, Intrinsics,
};
use mono_recon::reconstruction::run_reconstruction;
use mono_recon::tracking::{run_tracking, TrackingState};

/// Deterministic noise texture.
fn noise(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut state = seed ^ 0x9E3779B97F4A7C15;
    GrayImage::from_fn(width, height, |_, _| {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        Luma([(state >> 56) as u8])
    })
}

/// Frame i of a synthetic sequence: wrapped background texture shifted by
/// `i * bg_dx`, with a foreground patch shifted by `i * fg_dx`.
fn parallax_frame(
    background: &GrayImage,
    foreground: &GrayImage,
    index: u32,
    bg_dx: u32,
    fg_dx: u32,
) -> GrayImage {
    let (width, height) = background.dimensions();
    let (fg_w, fg_h) = foreground.dimensions();
    let fg_x0 = 40 + index * fg_dx;
    let fg_y0 = (height - fg_h) / 2;

    GrayImage::from_fn(width, height, |x, y| {
        if x >= fg_x0 && x < fg_x0 + fg_w && y >= fg_y0 && y < fg_y0 + fg_h {
            *foreground.get_pixel(x - fg_x0, y - fg_y0)
        } else {
            let src_x = (x + width - (index * bg_dx) % width) % width;
            *background.get_pixel(src_x, y)
        }
    })
}

fn parallax_sequence(count: u32, width: u32, height: u32) -> Vec<GrayImage> {
    let background = noise(width, height, 11);
    let foreground = noise(width / 3, height / 2, 77);
    (0..count)
        .map(|i| parallax_frame(&background, &foreground, i, 4, 12))
        .collect()
}

/// Write a complete session directory for the given keyframe images.
fn write_session(session_dir: &Path, frames: &[GrayImage]) {
    let (width, height) = frames[0].dimensions();
    write_intrinsics(
        session_dir,
        &Intrinsics {
            camera_id: "synthetic".into(),
            version: 1,
            fx: width.max(height) as f64,
            fy: width.max(height) as f64,
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
        },
    )
    .unwrap();

    let records: Vec<FrameRecord> = frames
        .iter()
        .enumerate()
        .map(|(i, img)| {
            let relative = format!("rgb/frame_{i:06}.png");
            let path = session_dir.join(&relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            img.save(&path).unwrap();
            FrameRecord {
                frame_index: i as u64,
                keyframe_index: i as u64,
                relative_rgb_path: relative,
                t_capture_ns: 33_000_000 * i as u64,
                t_wall_ms: 33 * i as u64,
                width: img.width(),
                height: img.height(),
                blur_score: 500.0,
            }
        })
        .collect();
    write_frame_records(session_dir, &records).unwrap();
}

fn tracking_config(min_inliers: usize) -> TrackingConfig {
    TrackingConfig {
        min_inliers,
        ..TrackingConfig::default()
    }
}

#[test]
fn scenario_horizontal_shift_is_tracked() {
    let dir = tempfile::tempdir().unwrap();
    write_session(dir.path(), &parallax_sequence(2, 240, 180));

    let summary = run_tracking(dir.path(), &TrackingConfig::default()).unwrap();
    assert_eq!(summary.pose_count, 2);

    let trajectory = load_trajectory(dir.path()).unwrap();
    assert_eq!(trajectory.poses.len(), 2);
    assert!(matches!(
        trajectory.poses[1].tracking_state,
        TrackingState::Good | TrackingState::Limited
    ));
    // A tracked step moves the camera by exactly the fixed step length.
    let t = trajectory.poses[1].translation_m;
    let norm = (t[0] * t[0] + t[1] * t[1] + t[2] * t[2]).sqrt();
    assert!((norm - 0.1).abs() < 1e-9);
}

#[test]
fn scenario_featureless_pair_is_lost() {
    let dir = tempfile::tempdir().unwrap();
    let black = GrayImage::from_pixel(240, 180, Luma([0]));
    let white = GrayImage::from_pixel(240, 180, Luma([255]));
    write_session(dir.path(), &[black, white]);

    let summary = run_tracking(dir.path(), &TrackingConfig::default()).unwrap();
    assert_eq!(summary.pose_count, 2);

    let trajectory = load_trajectory(dir.path()).unwrap();
    assert_eq!(trajectory.poses[1].tracking_state, TrackingState::Lost);
    assert_eq!(
        trajectory.poses[1].translation_m,
        trajectory.poses[0].translation_m
    );
    assert_eq!(trajectory.poses[1].quaternion_xyzw, [0.0, 0.0, 0.0, 1.0]);
}

#[test]
fn scenario_textured_sequence_has_perfect_good_ratio() {
    let dir = tempfile::tempdir().unwrap();
    write_session(dir.path(), &parallax_sequence(5, 240, 180));

    let summary = run_tracking(dir.path(), &tracking_config(8)).unwrap();
    assert_eq!(summary.pose_count, 5);
    assert_eq!(summary.good_ratio, 1.0);

    let trajectory = load_trajectory(dir.path()).unwrap();
    assert_eq!(trajectory.poses[4].tracking_state, TrackingState::Good);
}

#[test]
fn scenario_quality_profiles_cap_match_counts() {
    let dir = tempfile::tempdir().unwrap();
    let frames = parallax_sequence(2, 320, 240);

    // By construction the pair offers more candidate matches than the
    // largest cap.
    let set_a = extract_features(&frames[0], 3000);
    let set_b = extract_features(&frames[1], 3000);
    let candidates = match_features(&set_a, &set_b);
    assert!(
        candidates.len() > 1200,
        "synthetic pair offers only {} matches",
        candidates.len()
    );

    write_session(dir.path(), &frames);
    run_tracking(dir.path(), &tracking_config(8)).unwrap();

    let bare = |quality| ReconstructionConfig {
        quality,
        enable_outlier_filter: false,
        enable_mesh_export: false,
        enable_enhanced_writer: false,
    };

    let high = run_reconstruction(dir.path(), &bare(QualityProfile::High)).unwrap();
    assert!(high.point_count <= 1200);
    assert!(
        high.point_count > 500,
        "high profile produced only {} points",
        high.point_count
    );

    let medium = run_reconstruction(dir.path(), &bare(QualityProfile::Medium)).unwrap();
    assert!(medium.point_count <= 500);
}

#[test]
fn scenario_failed_triangulation_falls_back_to_poses() {
    let dir = tempfile::tempdir().unwrap();
    let frames: Vec<GrayImage> = (0..3)
        .map(|i| GrayImage::from_pixel(240, 180, Luma([60 + 40 * i])))
        .collect();
    write_session(dir.path(), &frames);

    run_tracking(dir.path(), &TrackingConfig::default()).unwrap();
    let summary =
        run_reconstruction(dir.path(), &ReconstructionConfig::default()).unwrap();

    // One uniform-gray point per trajectory pose.
    assert_eq!(summary.point_count, 3);
    assert!(summary.mesh_path.is_none());

    let body = std::fs::read_to_string(&summary.pointcloud_path).unwrap();
    assert!(body.contains("element vertex 3"));
    let data_lines: Vec<&str> = body
        .lines()
        .skip_while(|l| *l != "end_header")
        .skip(1)
        .collect();
    assert_eq!(data_lines.len(), 3);
    for line in data_lines {
        assert!(line.ends_with("180 180 180"), "unexpected color in {line:?}");
    }
}

#[test]
fn single_keyframe_session_still_produces_a_cloud() {
    let dir = tempfile::tempdir().unwrap();
    write_session(dir.path(), &parallax_sequence(1, 240, 180));

    let summary = run_tracking(dir.path(), &TrackingConfig::default()).unwrap();
    assert_eq!(summary.pose_count, 1);
    assert_eq!(summary.good_ratio, 1.0);

    let reconstruction =
        run_reconstruction(dir.path(), &ReconstructionConfig::default()).unwrap();
    assert_eq!(reconstruction.point_count, 1);
}

#[test]
fn end_to_end_artifacts_are_consistent() {
    let dir = tempfile::tempdir().unwrap();
    write_session(dir.path(), &parallax_sequence(5, 240, 180));

    let tracking = run_tracking(dir.path(), &tracking_config(8)).unwrap();
    assert_eq!(tracking.pose_count, 5);
    assert!(tracking.trajectory_path.exists());

    let trajectory = load_trajectory(dir.path()).unwrap();
    assert_eq!(trajectory.schema_version, "v1");
    assert_eq!(trajectory.pose_source, "slam");
    assert_eq!(trajectory.metrics.pose_count, 5);
    assert!(trajectory.metrics.good_ratio >= 0.0 && trajectory.metrics.good_ratio <= 1.0);
    assert_eq!(trajectory.poses[0].translation_m, [0.0, 0.0, 0.0]);
    assert_eq!(trajectory.poses[0].quaternion_xyzw, [0.0, 0.0, 0.0, 1.0]);
    assert_eq!(trajectory.poses[0].tracking_state, TrackingState::Good);

    let reconstruction =
        run_reconstruction(dir.path(), &ReconstructionConfig::default()).unwrap();
    assert!(reconstruction.point_count > 0);
    assert!(reconstruction.pointcloud_path.exists());

    // Vertex count in the PLY header matches the persisted summary, and each
    // vertex line carries three coordinates plus an RGB triple.
    let body = std::fs::read_to_string(&reconstruction.pointcloud_path).unwrap();
    assert!(body.starts_with("ply\nformat ascii 1.0\n"));
    assert!(body.contains(&format!("element vertex {}", reconstruction.point_count)));
    let data_lines = body.lines().skip_while(|l| *l != "end_header").skip(1);
    let mut vertex_count = 0;
    for line in data_lines {
        assert_eq!(line.split_whitespace().count(), 6, "bad vertex line {line:?}");
        vertex_count += 1;
    }
    assert_eq!(vertex_count, reconstruction.point_count);

    let record: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("reconstruction/reconstruction.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(record["schema_version"], "v1");
    assert_eq!(record["point_count"], reconstruction.point_count as u64);
    assert_eq!(record["quality_profile"], "high");
    assert_eq!(
        record["mesh_generated"],
        reconstruction.mesh_path.is_some()
    );
}

#[test]
fn tracking_requires_keyframes() {
    let dir = tempfile::tempdir().unwrap();
    write_intrinsics(
        dir.path(),
        &Intrinsics {
            camera_id: "synthetic".into(),
            version: 1,
            fx: 240.0,
            fy: 240.0,
            cx: 120.0,
            cy: 90.0,
        },
    )
    .unwrap();
    write_frame_records(dir.path(), &[]).unwrap();

    assert!(run_tracking(dir.path(), &TrackingConfig::default()).is_err());
}

#[test]
fn reconstruction_requires_a_trajectory() {
    let dir = tempfile::tempdir().unwrap();
    write_session(dir.path(), &parallax_sequence(2, 240, 180));

    let err = run_reconstruction(dir.path(), &ReconstructionConfig::default());
    assert!(err.is_err());
}

#[test]
fn unreadable_keyframe_image_degrades_to_lost() {
    let dir = tempfile::tempdir().unwrap();
    let frames = parallax_sequence(3, 240, 180);
    write_session(dir.path(), &frames);
    // Corrupt the middle keyframe's image.
    std::fs::write(dir.path().join("rgb/frame_000001.png"), b"not a png").unwrap();

    let summary = run_tracking(dir.path(), &tracking_config(8)).unwrap();
    assert_eq!(summary.pose_count, 3);

    let trajectory = load_trajectory(dir.path()).unwrap();
    // Both pairs touching the unreadable frame are lost; poses carry forward.
    assert_eq!(trajectory.poses[1].tracking_state, TrackingState::Lost);
    assert_eq!(trajectory.poses[2].tracking_state, TrackingState::Lost);
    assert_eq!(
        trajectory.poses[2].translation_m,
        trajectory.poses[0].translation_m
    );
}

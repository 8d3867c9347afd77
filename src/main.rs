use std::path::PathBuf;

use anyhow::{bail, Result};

use mono_recon::config::{QualityProfile, ReconstructionConfig, TrackingConfig};
use mono_recon::reconstruction::run_reconstruction;
use mono_recon::tracking::run_tracking;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(session_dir) = args.next().map(PathBuf::from) else {
        bail!("usage: mono-recon <session-dir> [high|medium]");
    };
    let quality = match args.next().as_deref() {
        None | Some("high") => QualityProfile::High,
        Some("medium") => QualityProfile::Medium,
        Some(other) => bail!("unknown quality profile '{}', expected high|medium", other),
    };

    println!("Tracking session at {}", session_dir.display());
    let tracking = run_tracking(&session_dir, &TrackingConfig::default())?;
    println!(
        "Tracked {} poses, good ratio {:.2} -> {}",
        tracking.pose_count,
        tracking.good_ratio,
        tracking.trajectory_path.display()
    );

    let config = ReconstructionConfig {
        quality,
        ..ReconstructionConfig::default()
    };
    let reconstruction = run_reconstruction(&session_dir, &config)?;
    println!(
        "Reconstructed {} points -> {}",
        reconstruction.point_count,
        reconstruction.pointcloud_path.display()
    );
    if let Some(mesh) = &reconstruction.mesh_path {
        println!("Mesh -> {}", mesh.display());
    }

    Ok(())
}

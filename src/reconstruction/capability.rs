//! Optional post-processing capabilities.
//!
//! Outlier filtering, mesh export and the enhanced cloud writer may or may
//! not be present at runtime. Each is modeled as an `Available`/`Unavailable`
//! enum resolved once by [`CapabilitySet::detect`] before the reconstruction
//! loop runs; the algorithm body never probes for them inline. An available
//! capability that fails degrades the same way as an absent one.

use std::fs::File;
use std::io::BufWriter;
use std::io::Write as _;
use std::path::Path;

use nalgebra::Vector3;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::ReconstructionConfig;
use crate::io::ply;
use crate::reconstruction::PointCloud;

/// The capabilities resolved for one reconstruction run.
pub struct CapabilitySet {
    pub outlier_filter: OutlierFilter,
    pub mesh_export: MeshExport,
    pub cloud_writer: CloudWriter,
}

impl CapabilitySet {
    pub fn detect(config: &ReconstructionConfig) -> Self {
        Self {
            outlier_filter: if config.enable_outlier_filter {
                OutlierFilter::Available(StatisticalOutlierFilter::default())
            } else {
                OutlierFilter::Unavailable
            },
            mesh_export: if config.enable_mesh_export {
                MeshExport::Available(ConvexHullMesher)
            } else {
                MeshExport::Unavailable
            },
            cloud_writer: if config.enable_enhanced_writer {
                CloudWriter::Enhanced(BinaryCloudWriter)
            } else {
                CloudWriter::Unavailable
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Statistical outlier removal
// ---------------------------------------------------------------------------

pub enum OutlierFilter {
    Available(StatisticalOutlierFilter),
    Unavailable,
}

impl OutlierFilter {
    /// Filter the cloud, or `None` when the capability is absent or the
    /// filter cannot run on this input.
    pub fn apply(&self, cloud: &PointCloud) -> Option<PointCloud> {
        match self {
            OutlierFilter::Available(filter) => filter.apply(cloud),
            OutlierFilter::Unavailable => None,
        }
    }
}

/// Removes points whose mean distance to their nearest neighbors is more
/// than `std_ratio` standard deviations above the cloud-wide mean.
pub struct StatisticalOutlierFilter {
    pub neighbors: usize,
    pub std_ratio: f64,
}

impl Default for StatisticalOutlierFilter {
    fn default() -> Self {
        Self {
            neighbors: 20,
            std_ratio: 2.0,
        }
    }
}

impl StatisticalOutlierFilter {
    pub fn apply(&self, cloud: &PointCloud) -> Option<PointCloud> {
        let n = cloud.len();
        if self.neighbors == 0 || n <= self.neighbors + 1 {
            return None;
        }

        let mean_dists: Vec<f64> = cloud
            .points
            .par_iter()
            .enumerate()
            .map(|(i, p)| {
                let mut dists: Vec<f64> = cloud
                    .points
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, q)| (p - q).norm())
                    .collect();
                dists.select_nth_unstable_by(self.neighbors - 1, |a, b| {
                    a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
                });
                dists[..self.neighbors].iter().sum::<f64>() / self.neighbors as f64
            })
            .collect();

        let mean = mean_dists.iter().sum::<f64>() / n as f64;
        let variance = mean_dists.iter().map(|d| (d - mean) * (d - mean)).sum::<f64>() / n as f64;
        let cutoff = mean + self.std_ratio * variance.sqrt();

        let mut filtered = PointCloud::with_capacity(n);
        for ((point, color), dist) in cloud.points.iter().zip(&cloud.colors).zip(&mean_dists) {
            if *dist <= cutoff {
                filtered.push(*point, *color);
            }
        }

        debug!(
            before = n,
            after = filtered.len(),
            "statistical outlier removal"
        );
        Some(filtered)
    }
}

// ---------------------------------------------------------------------------
// Convex-hull mesh export
// ---------------------------------------------------------------------------

pub enum MeshExport {
    Available(ConvexHullMesher),
    Unavailable,
}

impl MeshExport {
    /// Compute the hull and write the mesh artifact. Returns whether a mesh
    /// was produced; any failure is absorbed.
    pub fn export(&self, cloud: &PointCloud, path: &Path) -> bool {
        let MeshExport::Available(mesher) = self else {
            return false;
        };
        let Some(faces) = mesher.hull(&cloud.points) else {
            debug!("convex hull degenerate; mesh omitted");
            return false;
        };
        match write_obj_mesh(path, &cloud.points, &faces) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "mesh export failed; mesh omitted");
                let _ = std::fs::remove_file(path);
                false
            }
        }
    }
}

/// Incremental 3D convex hull over the point set.
pub struct ConvexHullMesher;

impl ConvexHullMesher {
    /// Triangle faces of the hull as point indices, or `None` for degenerate
    /// input (fewer than four points, or all nearly coplanar).
    pub fn hull(&self, points: &[Vector3<f64>]) -> Option<Vec<[usize; 3]>> {
        if points.len() < 4 {
            return None;
        }

        let extent = bounding_extent(points);
        if extent <= 0.0 {
            return None;
        }
        let eps = 1e-9 * extent;

        let (a, b, c, d) = initial_tetrahedron(points, eps)?;
        let interior = (points[a] + points[b] + points[c] + points[d]) / 4.0;

        let mut faces: Vec<[usize; 3]> = vec![[a, b, c], [a, b, d], [a, c, d], [b, c, d]];
        for face in &mut faces {
            orient_outward(face, points, &interior);
        }

        for (idx, point) in points.iter().enumerate() {
            if idx == a || idx == b || idx == c || idx == d {
                continue;
            }

            let visible: Vec<usize> = (0..faces.len())
                .filter(|&f| signed_distance(&faces[f], points, point) > eps)
                .collect();
            if visible.is_empty() {
                continue;
            }

            // Horizon: directed edges of visible faces whose reverse edge is
            // not on a visible face.
            let mut visible_edges = std::collections::HashSet::new();
            for &f in &visible {
                let [u, v, w] = faces[f];
                visible_edges.insert((u, v));
                visible_edges.insert((v, w));
                visible_edges.insert((w, u));
            }
            let horizon: Vec<(usize, usize)> = visible_edges
                .iter()
                .filter(|(u, v)| !visible_edges.contains(&(*v, *u)))
                .copied()
                .collect();

            let visible_set: std::collections::HashSet<usize> = visible.into_iter().collect();
            let mut kept: Vec<[usize; 3]> = faces
                .into_iter()
                .enumerate()
                .filter(|(f, _)| !visible_set.contains(f))
                .map(|(_, face)| face)
                .collect();

            for (u, v) in horizon {
                let mut face = [u, v, idx];
                orient_outward(&mut face, points, &interior);
                kept.push(face);
            }
            faces = kept;
        }

        (faces.len() >= 4).then_some(faces)
    }
}

fn bounding_extent(points: &[Vector3<f64>]) -> f64 {
    let mut min = points[0];
    let mut max = points[0];
    for p in points {
        min = min.inf(p);
        max = max.sup(p);
    }
    (max - min).norm()
}

fn face_normal(face: &[usize; 3], points: &[Vector3<f64>]) -> Vector3<f64> {
    let [a, b, c] = *face;
    (points[b] - points[a]).cross(&(points[c] - points[a]))
}

fn signed_distance(face: &[usize; 3], points: &[Vector3<f64>], p: &Vector3<f64>) -> f64 {
    let normal = face_normal(face, points);
    let norm = normal.norm();
    if norm <= f64::MIN_POSITIVE {
        return 0.0;
    }
    normal.dot(&(p - points[face[0]])) / norm
}

fn orient_outward(face: &mut [usize; 3], points: &[Vector3<f64>], interior: &Vector3<f64>) {
    if signed_distance(face, points, interior) > 0.0 {
        face.swap(1, 2);
    }
}

/// Four points spanning a non-degenerate tetrahedron.
fn initial_tetrahedron(
    points: &[Vector3<f64>],
    eps: f64,
) -> Option<(usize, usize, usize, usize)> {
    let a = 0;
    let b = (1..points.len()).max_by(|&i, &j| {
        let di = (points[i] - points[a]).norm();
        let dj = (points[j] - points[a]).norm();
        di.partial_cmp(&dj).unwrap_or(std::cmp::Ordering::Equal)
    })?;
    if (points[b] - points[a]).norm() <= eps {
        return None;
    }

    let ab = points[b] - points[a];
    let c = (0..points.len())
        .filter(|&i| i != a && i != b)
        .max_by(|&i, &j| {
            let di = ab.cross(&(points[i] - points[a])).norm();
            let dj = ab.cross(&(points[j] - points[a])).norm();
            di.partial_cmp(&dj).unwrap_or(std::cmp::Ordering::Equal)
        })?;
    if ab.cross(&(points[c] - points[a])).norm() <= eps * ab.norm() {
        return None;
    }

    let normal = ab.cross(&(points[c] - points[a]));
    let d = (0..points.len())
        .filter(|&i| i != a && i != b && i != c)
        .max_by(|&i, &j| {
            let di = normal.dot(&(points[i] - points[a])).abs();
            let dj = normal.dot(&(points[j] - points[a])).abs();
            di.partial_cmp(&dj).unwrap_or(std::cmp::Ordering::Equal)
        })?;
    if normal.dot(&(points[d] - points[a])).abs() <= eps * normal.norm() {
        return None;
    }

    Some((a, b, c, d))
}

fn write_obj_mesh(
    path: &Path,
    points: &[Vector3<f64>],
    faces: &[[usize; 3]],
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for p in points {
        writeln!(writer, "v {} {} {}", p.x, p.y, p.z)?;
    }
    for face in faces {
        writeln!(writer, "f {} {} {}", face[0] + 1, face[1] + 1, face[2] + 1)?;
    }
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Enhanced cloud writer
// ---------------------------------------------------------------------------

pub enum CloudWriter {
    Enhanced(BinaryCloudWriter),
    Unavailable,
}

impl CloudWriter {
    /// Attempt the enhanced write. Returns whether it fully succeeded; on
    /// `false` the caller must use the baseline ASCII writer instead.
    pub fn write(&self, cloud: &PointCloud, path: &Path) -> bool {
        let CloudWriter::Enhanced(writer) = self else {
            return false;
        };
        match writer.write(cloud, path) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "enhanced cloud writer failed; falling back to ASCII");
                false
            }
        }
    }
}

/// Binary little-endian PLY writer.
pub struct BinaryCloudWriter;

impl BinaryCloudWriter {
    fn write(&self, cloud: &PointCloud, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        ply::write_binary_ply(&mut writer, cloud)?;
        writer.flush()?;
        Ok(())
    }
}

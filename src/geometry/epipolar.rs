//! Two-view epipolar geometry: essential-matrix estimation, robust outlier
//! rejection, pose recovery and linear triangulation.
//!
//! Conventions: a point `X1` in the first camera frame maps into the second
//! as `X2 = R·X1 + t`, so the essential matrix is `E = [t]× R` and satisfies
//! `x2ᵀ E x1 = 0` for normalized image coordinates.

use nalgebra::{DMatrix, Matrix3, Matrix3x4, Matrix4, Point2, Point3, Vector3};
use rand::seq::index::sample;

/// Minimum correspondences for the linear essential-matrix estimate.
pub const MIN_PAIR_MATCHES: usize = 8;

/// Robust estimation parameters. The pixel threshold is converted to
/// normalized coordinates by dividing through the mean focal length, which
/// makes it equivalent to roughly one pixel of reprojection slack.
#[derive(Debug, Clone)]
pub struct RansacParams {
    pub threshold_px: f64,
    pub max_iterations: usize,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            threshold_px: 1.0,
            max_iterations: 200,
        }
    }
}

/// A robustly estimated essential matrix together with its consensus set.
#[derive(Debug, Clone)]
pub struct TwoViewGeometry {
    pub essential: Matrix3<f64>,
    /// Per-correspondence inlier flags, aligned with the input slices.
    pub inliers: Vec<bool>,
    pub inlier_count: usize,
}

/// Relative pose recovered from an essential matrix.
#[derive(Debug, Clone)]
pub struct RecoveredPose {
    pub rotation: Matrix3<f64>,
    /// Direction-only translation, unit norm up to the estimation.
    pub translation: Vector3<f64>,
    /// Points that ended up in front of both cameras for the winning candidate.
    pub cheirality_count: usize,
}

/// Map pixel coordinates to normalized image coordinates through `K⁻¹`.
pub fn normalize_points(k_inv: &Matrix3<f64>, pts: &[Point2<f64>]) -> Vec<Point2<f64>> {
    pts.iter()
        .map(|p| {
            let v = k_inv * Vector3::new(p.x, p.y, 1.0);
            Point2::new(v[0] / v[2], v[1] / v[2])
        })
        .collect()
}

/// Estimate an essential matrix with RANSAC over the 8-point algorithm.
///
/// Correspondences are in pixel coordinates; `k` is the pinhole intrinsics
/// matrix. Returns `None` when fewer than eight correspondences are supplied,
/// the intrinsics are not invertible, or no sample yields a model.
pub fn find_essential_ransac(
    pts1: &[Point2<f64>],
    pts2: &[Point2<f64>],
    k: &Matrix3<f64>,
    params: &RansacParams,
) -> Option<TwoViewGeometry> {
    if pts1.len() != pts2.len() || pts1.len() < MIN_PAIR_MATCHES {
        return None;
    }
    let k_inv = k.try_inverse()?;
    let n1 = normalize_points(&k_inv, pts1);
    let n2 = normalize_points(&k_inv, pts2);

    let focal = 0.5 * (k[(0, 0)] + k[(1, 1)]);
    let thresh_norm = params.threshold_px / focal.max(1e-12);
    let thresh_sq = thresh_norm * thresh_norm;

    let mut rng = rand::thread_rng();
    let mut best: Option<(Matrix3<f64>, Vec<bool>, usize)> = None;

    for _ in 0..params.max_iterations {
        let picked = sample(&mut rng, n1.len(), MIN_PAIR_MATCHES);
        let s1: Vec<Point2<f64>> = picked.iter().map(|i| n1[i]).collect();
        let s2: Vec<Point2<f64>> = picked.iter().map(|i| n2[i]).collect();

        let Some(candidate) = estimate_essential_8_point(&s1, &s2) else {
            continue;
        };

        let mask: Vec<bool> = n1
            .iter()
            .zip(&n2)
            .map(|(a, b)| sampson_distance(&candidate, a, b) < thresh_sq)
            .collect();
        let count = mask.iter().filter(|&&m| m).count();

        if best.as_ref().map_or(true, |(_, _, c)| count > *c) {
            best = Some((candidate, mask, count));
        }
    }

    let (essential, inliers, inlier_count) = best?;
    if inlier_count < MIN_PAIR_MATCHES {
        return None;
    }
    Some(TwoViewGeometry {
        essential,
        inliers,
        inlier_count,
    })
}

/// Recover the relative pose from an essential matrix by testing the four
/// `(R, ±t)` candidates and keeping the one with the most triangulated
/// points in front of both cameras (the cheirality test).
///
/// Only correspondences flagged in `inliers` participate in the vote.
pub fn recover_pose(
    essential: &Matrix3<f64>,
    pts1: &[Point2<f64>],
    pts2: &[Point2<f64>],
    k: &Matrix3<f64>,
    inliers: &[bool],
) -> Option<RecoveredPose> {
    let k_inv = k.try_inverse()?;
    let kept1: Vec<Point2<f64>> = pts1
        .iter()
        .zip(inliers)
        .filter(|(_, &m)| m)
        .map(|(p, _)| *p)
        .collect();
    let kept2: Vec<Point2<f64>> = pts2
        .iter()
        .zip(inliers)
        .filter(|(_, &m)| m)
        .map(|(p, _)| *p)
        .collect();
    if kept1.is_empty() {
        return None;
    }
    let n1 = normalize_points(&k_inv, &kept1);
    let n2 = normalize_points(&k_inv, &kept2);

    let svd = essential.svd(true, true);
    let mut u = svd.u?;
    let mut v_t = svd.v_t?;
    if u.determinant() < 0.0 {
        u = -u;
    }
    if v_t.determinant() < 0.0 {
        v_t = -v_t;
    }

    let w = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    let r1 = u * w * v_t;
    let r2 = u * w.transpose() * v_t;
    let t = u.column(2).into_owned();

    let candidates = [(r1, t), (r1, -t), (r2, t), (r2, -t)];
    let p1 = Matrix3x4::<f64>::identity();

    let mut best: Option<RecoveredPose> = None;
    for (rotation, translation) in candidates {
        let p2 = rt_projection(&rotation, &translation);
        let points = triangulate_points(&p1, &p2, &n1, &n2);
        let count = points
            .iter()
            .filter(|x| {
                let z2 = (rotation * x.coords + translation)[2];
                x.z > 0.0 && z2 > 0.0
            })
            .count();
        if best.as_ref().map_or(true, |b| count > b.cheirality_count) {
            best = Some(RecoveredPose {
                rotation,
                translation,
                cheirality_count: count,
            });
        }
    }
    best
}

/// Linear (DLT) triangulation of corresponding points under two projections.
///
/// Each correspondence contributes four rows `x·P[2] − P[0]`, `y·P[2] − P[1]`
/// per view; the homogeneous solution is the singular vector of the smallest
/// singular value. Degenerate solutions (`w ≈ 0`) come back at the origin and
/// are left to the caller's validity filter.
pub fn triangulate_points(
    p1: &Matrix3x4<f64>,
    p2: &Matrix3x4<f64>,
    pts1: &[Point2<f64>],
    pts2: &[Point2<f64>],
) -> Vec<Point3<f64>> {
    debug_assert_eq!(pts1.len(), pts2.len());

    let mut out = Vec::with_capacity(pts1.len());
    for (a, b) in pts1.iter().zip(pts2.iter()) {
        let mut m = Matrix4::<f64>::zeros();
        for c in 0..4 {
            m[(0, c)] = a.x * p1[(2, c)] - p1[(0, c)];
            m[(1, c)] = a.y * p1[(2, c)] - p1[(1, c)];
            m[(2, c)] = b.x * p2[(2, c)] - p2[(0, c)];
            m[(3, c)] = b.y * p2[(2, c)] - p2[(1, c)];
        }
        let svd = m.svd(true, true);
        let Some(v_t) = svd.v_t else {
            out.push(Point3::origin());
            continue;
        };
        let xh = v_t.row(3);
        let w = xh[(0, 3)];
        if w.abs() < 1e-12 {
            out.push(Point3::origin());
            continue;
        }
        out.push(Point3::new(
            xh[(0, 0)] / w,
            xh[(0, 1)] / w,
            xh[(0, 2)] / w,
        ));
    }
    out
}

/// Build `K·[R|t]`.
pub fn projection_from_krt(k: &Matrix3<f64>, r: &Matrix3<f64>, t: &Vector3<f64>) -> Matrix3x4<f64> {
    k * rt_projection(r, t)
}

/// Build `K·[I|0]`.
pub fn identity_projection(k: &Matrix3<f64>) -> Matrix3x4<f64> {
    k * Matrix3x4::<f64>::identity()
}

fn rt_projection(r: &Matrix3<f64>, t: &Vector3<f64>) -> Matrix3x4<f64> {
    Matrix3x4::from_columns(&[
        r.column(0).into_owned(),
        r.column(1).into_owned(),
        r.column(2).into_owned(),
        *t,
    ])
}

/// Squared Sampson distance of a normalized correspondence to an essential
/// matrix, the first-order approximation of the reprojection error.
pub fn sampson_distance(e: &Matrix3<f64>, p1: &Point2<f64>, p2: &Point2<f64>) -> f64 {
    let x1 = Vector3::new(p1.x, p1.y, 1.0);
    let x2 = Vector3::new(p2.x, p2.y, 1.0);
    let ex1 = e * x1;
    let etx2 = e.transpose() * x2;
    let x2tex1 = x2.dot(&ex1);
    let denom = ex1[0] * ex1[0] + ex1[1] * ex1[1] + etx2[0] * etx2[0] + etx2[1] * etx2[1];
    if denom <= 1e-18 {
        f64::INFINITY
    } else {
        (x2tex1 * x2tex1) / denom
    }
}

/// 8-point estimate over normalized correspondences, with the rank-2 and
/// equal-singular-value constraints enforced afterwards.
fn estimate_essential_8_point(
    pts1: &[Point2<f64>],
    pts2: &[Point2<f64>],
) -> Option<Matrix3<f64>> {
    if pts1.len() != pts2.len() || pts1.len() < MIN_PAIR_MATCHES {
        return None;
    }

    let n = pts1.len();
    let mut a = DMatrix::<f64>::zeros(n, 9);
    for i in 0..n {
        let (x1, y1) = (pts1[i].x, pts1[i].y);
        let (x2, y2) = (pts2[i].x, pts2[i].y);
        a[(i, 0)] = x2 * x1;
        a[(i, 1)] = x2 * y1;
        a[(i, 2)] = x2;
        a[(i, 3)] = y2 * x1;
        a[(i, 4)] = y2 * y1;
        a[(i, 5)] = y2;
        a[(i, 6)] = x1;
        a[(i, 7)] = y1;
        a[(i, 8)] = 1.0;
    }

    // The null vector of A via the eigenvectors of AᵀA; the thin SVD of an
    // 8x9 system would not expose the ninth right singular vector.
    let svd = (a.transpose() * &a).svd(false, true);
    let v_t = svd.v_t?;
    let evec = v_t.row(v_t.nrows() - 1);
    let e = Matrix3::new(
        evec[0], evec[1], evec[2], evec[3], evec[4], evec[5], evec[6], evec[7], evec[8],
    );
    enforce_essential_constraints(&e)
}

fn enforce_essential_constraints(e: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let svd = e.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let s = 0.5 * (svd.singular_values[0] + svd.singular_values[1]);
    let sigma = Matrix3::new(s, 0.0, 0.0, 0.0, s, 0.0, 0.0, 0.0, 0.0);
    Some(u * sigma * v_t)
}

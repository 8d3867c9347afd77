//! Rotation-matrix ↔ unit-quaternion conversion.
//!
//! Quaternions use (x, y, z, w) component order throughout the pipeline.
//! The matrix-to-quaternion direction uses Shepperd's method: the extraction
//! branch is chosen from the trace and the dominant diagonal element so the
//! divisor stays well away from zero for every input rotation.

use nalgebra::Matrix3;

/// Extract a unit quaternion (x, y, z, w) from a rotation matrix.
///
/// Four branches: the trace branch when `tr > 0`, otherwise the branch of
/// the largest diagonal element. The result is renormalized; a zero norm
/// (only possible for garbage input) yields the identity quaternion.
pub fn rotation_to_quaternion_xyzw(m: &Matrix3<f64>) -> [f64; 4] {
    let trace = m[(0, 0)] + m[(1, 1)] + m[(2, 2)];

    let (qx, qy, qz, qw) = if trace > 0.0 {
        let s = (trace + 1.0).sqrt() * 2.0;
        (
            (m[(2, 1)] - m[(1, 2)]) / s,
            (m[(0, 2)] - m[(2, 0)]) / s,
            (m[(1, 0)] - m[(0, 1)]) / s,
            0.25 * s,
        )
    } else if m[(0, 0)] > m[(1, 1)] && m[(0, 0)] > m[(2, 2)] {
        let s = (1.0 + m[(0, 0)] - m[(1, 1)] - m[(2, 2)]).sqrt() * 2.0;
        (
            0.25 * s,
            (m[(0, 1)] + m[(1, 0)]) / s,
            (m[(0, 2)] + m[(2, 0)]) / s,
            (m[(2, 1)] - m[(1, 2)]) / s,
        )
    } else if m[(1, 1)] > m[(2, 2)] {
        let s = (1.0 + m[(1, 1)] - m[(0, 0)] - m[(2, 2)]).sqrt() * 2.0;
        (
            (m[(0, 1)] + m[(1, 0)]) / s,
            0.25 * s,
            (m[(1, 2)] + m[(2, 1)]) / s,
            (m[(0, 2)] - m[(2, 0)]) / s,
        )
    } else {
        let s = (1.0 + m[(2, 2)] - m[(0, 0)] - m[(1, 1)]).sqrt() * 2.0;
        (
            (m[(0, 2)] + m[(2, 0)]) / s,
            (m[(1, 2)] + m[(2, 1)]) / s,
            0.25 * s,
            (m[(1, 0)] - m[(0, 1)]) / s,
        )
    };

    let norm = (qx * qx + qy * qy + qz * qz + qw * qw).sqrt();
    if norm == 0.0 {
        return [0.0, 0.0, 0.0, 1.0];
    }
    [qx / norm, qy / norm, qz / norm, qw / norm]
}

/// Build a rotation matrix from a quaternion (x, y, z, w).
///
/// The standard formula scaled by `2 / ‖q‖²`, so a non-unit quaternion still
/// produces a proper rotation. A quaternion with `‖q‖² < 1e-12` yields the
/// identity matrix instead of dividing by a near-zero norm.
pub fn quaternion_xyzw_to_rotation(q: &[f64; 4]) -> Matrix3<f64> {
    let [x, y, z, w] = *q;
    let n = x * x + y * y + z * z + w * w;
    if n < 1e-12 {
        return Matrix3::identity();
    }
    let s = 2.0 / n;

    let (xx, xy, xz) = (x * x * s, x * y * s, x * z * s);
    let (yy, yz, zz) = (y * y * s, y * z * s, z * z * s);
    let (wx, wy, wz) = (w * x * s, w * y * s, w * z * s);

    Matrix3::new(
        1.0 - (yy + zz),
        xy - wz,
        xz + wy,
        xy + wz,
        1.0 - (xx + zz),
        yz - wx,
        xz - wy,
        yz + wx,
        1.0 - (xx + yy),
    )
}

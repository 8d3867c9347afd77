//! Numerical geometry: rotation representations and two-view relations.

pub mod epipolar;
pub mod rotation;

pub use epipolar::{
    find_essential_ransac, identity_projection, projection_from_krt, recover_pose,
    triangulate_points, RansacParams, RecoveredPose, TwoViewGeometry,
};
pub use rotation::{quaternion_xyzw_to_rotation, rotation_to_quaternion_xyzw};

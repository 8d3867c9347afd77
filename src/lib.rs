//! Monocular visual odometry and multi-view point cloud reconstruction.
//!
//! An offline, batch pipeline over an already-captured keyframe session:
//! the tracker estimates a camera trajectory from consecutive keyframe
//! pairs, and the reconstructor triangulates matched features into a
//! world-frame colored point cloud (optionally filtered and meshed).

pub mod config;
pub mod features;
pub mod geometry;
pub mod io;
pub mod keyframe;
pub mod reconstruction;
pub mod tracking;

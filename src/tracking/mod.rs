//! Monocular pose tracking: the keyframe sequence in, a trajectory out.

pub mod state;
pub mod tracker;

pub use state::TrackingState;
pub use tracker::{run_tracking, TrackingSummary};

//! Multi-view reconstruction: trajectory + keyframes in, point cloud out.

pub mod capability;
pub mod cloud;
pub mod reconstructor;

pub use capability::CapabilitySet;
pub use cloud::PointCloud;
pub use reconstructor::{run_reconstruction, ReconstructionSummary};

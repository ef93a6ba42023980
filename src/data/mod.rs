//! # Data Module
//!
//! Ground-truth trajectories and the batches drawn from them.
//!
//! ## Components
//!
//! - [`trajectory`]: Trajectory and the read-only training dataset
//! - [`sampler`]: Random fixed-length training windows
//! - [`loader`]: Recorded demonstration files
//! - [`synthetic`]: Ground truth integrated from known dynamics

mod loader;
mod sampler;
mod synthetic;
mod trajectory;

pub use loader::{load_records, load_trajectory, read_records, trajectory_from_records, TrajectoryRecord};
pub use sampler::{Batch, BatchSampler};
pub use synthetic::{generate_trajectory, linspace, spiral_dataset};
pub use trajectory::{Trajectory, TrajectoryDataset};

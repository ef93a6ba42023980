//! # Neural ODE Trajectory Fitting
//!
//! Fits a learned vector field `dy/dt = f(y)` to an observed trajectory by
//! integrating the field over short windows of the data and descending the
//! rollout loss through the solver.
//!
//! ## Features
//!
//! - **ODE Solvers**: Euler, Midpoint, RK4 and adaptive Dopri5 over one
//!   Runge-Kutta core, with reverse-mode gradients through every step
//! - **Adjoint Mode**: Checkpointed backward pass that recomputes steps
//! - **Vector Fields**: Learned cubic-input MLP or wrapped external dynamics
//! - **Training**: Random window batches, RMSprop, EMA diagnostics and
//!   periodic full-trajectory evaluation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use neural_ode_trajectory::prelude::*;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! fn main() -> neural_ode_trajectory::Result<()> {
//!     let dataset = spiral_dataset(1000)?;
//!     let mut rng = StdRng::seed_from_u64(42);
//!
//!     let config = TrainingConfig::default();
//!     let mut trainer = Trainer::new(config, &dataset, &mut rng)?;
//!     let report = trainer.run(&mut rng)?;
//!
//!     println!("final loss {:?}", report.last_evaluation());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Run configuration
//! - [`data`]: Trajectories, batch sampling and loaders
//! - [`model`]: Learned and external vector fields
//! - [`ode`]: Integrators and gradient tapes
//! - [`training`]: Loss, optimizers, meters and the training loop

pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod ode;
pub mod training;

// Re-exports for convenience
pub use config::{Device, ModelConfig, TrainingConfig};
pub use data::{Batch, BatchSampler, Trajectory, TrajectoryDataset};
pub use error::{Error, Result};
pub use model::{ExternalDynamics, LearnedField, VectorFieldModel};
pub use ode::{GradientMode, Integrator, Method, OdeConfig, VectorField};
pub use training::{RunningAverageMeter, Trainer, TrainingReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Device, ModelConfig, TrainingConfig};
    pub use crate::data::{load_trajectory, spiral_dataset, BatchSampler, Trajectory, TrajectoryDataset};
    pub use crate::model::{ExternalDynamics, LearnedField, VectorFieldModel};
    pub use crate::ode::{GradientMode, Integrator, Method, OdeConfig, VectorField};
    pub use crate::training::{
        CsvVisualizer, LossFunction, OptimizerKind, RunningAverageMeter, Trainer, TrainingReport,
        Visualizer,
    };
}

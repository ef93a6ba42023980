//! # Training
//!
//! Everything needed to fit a learned vector field to a trajectory.
//!
//! ## Components
//!
//! - [`LossFunction`]: Rollout loss and its gradient
//! - [`RunningAverageMeter`]: EMA diagnostics
//! - [`Optimizer`]: RMSprop and SGD updates
//! - [`Trainer`]: The sample/rollout/update loop with periodic evaluation
//! - [`Visualizer`]: Evaluation observers

mod loss;
mod meter;
mod optim;
mod trainer;
mod viz;

pub use loss::LossFunction;
pub use meter::RunningAverageMeter;
pub use optim::{Optimizer, OptimizerKind, RmsProp, Sgd};
pub use trainer::{Evaluation, Trainer, TrainingReport};
pub use viz::{CsvVisualizer, Visualizer};

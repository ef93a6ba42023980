//! # Vector Field Models
//!
//! Models for the right-hand side of the ODE being fitted.
//!
//! ## Components
//!
//! - [`network`]: Dense layers over a flat parameter vector
//! - [`params`]: Parameter values and gradients
//! - [`field`]: Learned and externally supplied vector fields

mod field;
mod network;
mod params;

pub use field::{ExternalDynamics, LearnedField, VectorFieldModel};
pub use network::{Activation, ForwardCache, LayerShape, Mlp};
pub use params::ModelParameters;

//! # ODE Integration
//!
//! Explicit Runge-Kutta integration of a [`VectorField`] across a time mesh,
//! with an optional gradient tape for training through the solver.
//!
//! ## Available Methods
//!
//! - [`Method::Euler`]: first order, fixed step
//! - [`Method::Midpoint`]: second order, fixed step
//! - [`Method::Rk4`]: classic fourth order, fixed step
//! - [`Method::Dopri5`]: adaptive Dormand-Prince 5(4), recommended for Neural ODE

mod integrator;
mod rollout;
mod tableau;

pub use integrator::Integrator;
pub use rollout::Rollout;

use std::fmt;
use std::str::FromStr;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Right-hand side of an ODE, `dy/dt = f(t, y)`.
pub trait VectorField: Send + Sync {
    /// Human-readable name used in errors and logs
    fn name(&self) -> &str;

    /// Dimension of the state vector
    fn dim(&self) -> usize;

    /// Evaluate the time derivative at `(t, y)`
    fn evaluate(&self, t: f64, y: &Array1<f64>) -> Result<Array1<f64>>;

    /// Number of trainable parameters
    fn num_params(&self) -> usize {
        0
    }

    /// Vector-Jacobian product at `(t, y)`.
    ///
    /// Given `cotangent = dL/df`, accumulates `dL/dparams` into `param_grad`
    /// and returns `dL/dy`.
    fn vjp(
        &self,
        _t: f64,
        _y: &Array1<f64>,
        _cotangent: &Array1<f64>,
        _param_grad: &mut [f64],
    ) -> Result<Array1<f64>> {
        Err(Error::NotDifferentiable(self.name().to_string()))
    }
}

/// Integration method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Euler,
    Midpoint,
    Rk4,
    #[default]
    Dopri5,
}

impl Method {
    /// Whether the step size is chosen from a local error estimate
    pub fn is_adaptive(&self) -> bool {
        matches!(self, Method::Dopri5)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Method::Euler => "euler",
            Method::Midpoint => "midpoint",
            Method::Rk4 => "rk4",
            Method::Dopri5 => "dopri5",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "euler" => Ok(Method::Euler),
            "midpoint" => Ok(Method::Midpoint),
            "rk4" => Ok(Method::Rk4),
            "dopri5" => Ok(Method::Dopri5),
            "adams" => Err(Error::InvalidConfig(
                "multistep method 'adams' is not available; use 'dopri5' (adaptive) \
                 or 'rk4' (fixed step)"
                    .into(),
            )),
            other => Err(Error::InvalidConfig(format!(
                "unknown integration method '{}' (expected euler, midpoint, rk4 or dopri5)",
                other
            ))),
        }
    }
}

/// How gradients are obtained through the solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GradientMode {
    /// Keep every accepted step on the tape
    #[default]
    Direct,
    /// Keep only mesh-point checkpoints and recompute steps on the way back
    Adjoint,
}

/// ODE solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OdeConfig {
    /// Relative tolerance for adaptive methods
    pub rtol: f64,
    /// Absolute tolerance for adaptive methods
    pub atol: f64,
    /// Maximum number of internal steps per integration
    pub max_steps: usize,
    /// Minimum step size
    pub min_step: f64,
    /// Maximum step size
    pub max_step: f64,
    /// Step size for fixed-step methods; one step per mesh interval when unset
    pub step_size: Option<f64>,
}

impl Default for OdeConfig {
    fn default() -> Self {
        Self {
            rtol: 1e-4,
            atol: 1e-6,
            max_steps: 10000,
            min_step: 1e-10,
            max_step: 1.0,
            step_size: None,
        }
    }
}

impl OdeConfig {
    /// Create with custom tolerances
    pub fn with_tolerances(rtol: f64, atol: f64) -> Self {
        Self {
            rtol,
            atol,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.rtol > 0.0 && self.atol > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "tolerances must be positive (rtol={}, atol={})",
                self.rtol, self.atol
            )));
        }
        if self.max_steps == 0 {
            return Err(Error::InvalidConfig("max_steps must be at least 1".into()));
        }
        if !(self.min_step > 0.0 && self.min_step < self.max_step) {
            return Err(Error::InvalidConfig(format!(
                "need 0 < min_step < max_step (min_step={}, max_step={})",
                self.min_step, self.max_step
            )));
        }
        if let Some(h) = self.step_size {
            if !(h > 0.0 && h.is_finite()) {
                return Err(Error::InvalidConfig(format!("step_size must be positive, got {}", h)));
            }
        }
        Ok(())
    }
}

/// Check that a time mesh is non-empty and strictly increasing
pub(crate) fn check_mesh(times: &[f64]) -> Result<()> {
    if times.is_empty() {
        return Err(Error::InvalidTrajectory("time mesh is empty".into()));
    }
    for (i, w) in times.windows(2).enumerate() {
        if !(w[0] < w[1]) {
            return Err(Error::InvalidTrajectory(format!(
                "time mesh not strictly increasing at index {}: {} then {}",
                i + 1,
                w[0],
                w[1]
            )));
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

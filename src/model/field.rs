//! # Vector Field Models
//!
//! The right-hand side `dy/dt = f(t, y)` being fitted, either learned
//! ([`LearnedField`]) or supplied from outside ([`ExternalDynamics`]).

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::{Array1, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::network::{Activation, Mlp};
use super::params::ModelParameters;
use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::ode::VectorField;

/// Feed-forward field applied to the cubed state.
///
/// `f(t, y) = W2 * act(W1 * y^3 + b1) + b2`, autonomous in `t`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedField {
    dim: usize,
    net: Mlp,
    params: ModelParameters,
}

impl LearnedField {
    /// Build a `[dim, hidden, dim]` network with weights from `N(0, init_std)`
    /// and zero biases.
    pub fn new<R: Rng + ?Sized>(dim: usize, config: &ModelConfig, rng: &mut R) -> Result<Self> {
        let net = Mlp::new(
            &[dim, config.hidden_dim, dim],
            config.activation,
            Activation::Identity,
        )?;
        let params = ModelParameters::new(net.init_params(config.init_std, rng)?);
        Ok(Self { dim, net, params })
    }

    /// Tanh network with a custom initialisation scale
    pub fn with_init_std<R: Rng + ?Sized>(
        dim: usize,
        hidden_dim: usize,
        init_std: f64,
        rng: &mut R,
    ) -> Result<Self> {
        let config = ModelConfig {
            hidden_dim,
            activation: Activation::Tanh,
            init_std,
        };
        Self::new(dim, &config, rng)
    }

    /// Assemble from an existing network and parameter vector
    pub fn from_parts(net: Mlp, params: ModelParameters) -> Result<Self> {
        net.validate()?;
        let dim = net.input_dim();
        if net.output_dim() != dim {
            return Err(Error::shape("field network output", dim, net.output_dim()));
        }
        if params.len() != net.num_params() {
            return Err(Error::shape("field parameters", net.num_params(), params.len()));
        }
        Ok(Self { dim, net, params })
    }

    pub fn network(&self) -> &Mlp {
        &self.net
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.params
    }

    pub fn parameters_mut(&mut self) -> &mut ModelParameters {
        &mut self.params
    }

    /// Save the model as JSON
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Load a model saved with [`LearnedField::save_json`]
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let field: LearnedField = serde_json::from_reader(reader)?;
        let LearnedField { net, params, .. } = field;
        let mut field = Self::from_parts(net, params)?;
        field.params.zero_grad();
        Ok(field)
    }

    fn check_state(&self, y: &Array1<f64>) -> Result<()> {
        if y.len() != self.dim {
            return Err(Error::shape("learned field state", self.dim, y.len()));
        }
        Ok(())
    }
}

fn cubed(y: &Array1<f64>) -> Array1<f64> {
    y.mapv(|v| v.powi(3))
}

impl VectorField for LearnedField {
    fn name(&self) -> &str {
        "learned"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn evaluate(&self, _t: f64, y: &Array1<f64>) -> Result<Array1<f64>> {
        self.check_state(y)?;
        self.net.forward(self.params.values(), &cubed(y))
    }

    fn num_params(&self) -> usize {
        self.params.len()
    }

    fn vjp(
        &self,
        _t: f64,
        y: &Array1<f64>,
        cotangent: &Array1<f64>,
        param_grad: &mut [f64],
    ) -> Result<Array1<f64>> {
        self.check_state(y)?;
        let values = self.params.values();
        let cache = self.net.forward_cached(values, &cubed(y))?;
        let feature_bar = self.net.backward(values, &cache, cotangent, param_grad)?;
        // d(y^3)/dy = 3y^2
        Ok(feature_bar * &y.mapv(|v| 3.0 * v * v))
    }
}

type DynamicsFn = dyn Fn(f64, &Array1<f64>) -> Array1<f64> + Send + Sync;

/// Externally supplied dynamics, used to generate ground truth. Never trained.
pub struct ExternalDynamics {
    name: String,
    dim: usize,
    func: Box<DynamicsFn>,
}

impl ExternalDynamics {
    pub fn new<F>(name: impl Into<String>, dim: usize, func: F) -> Self
    where
        F: Fn(f64, &Array1<f64>) -> Array1<f64> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            dim,
            func: Box::new(func),
        }
    }

    /// `dy/dt = (y^3) A`, with `y` taken as a row vector
    pub fn cubic_linear(a: Array2<f64>) -> Result<Self> {
        let (rows, cols) = a.dim();
        if rows != cols {
            return Err(Error::shape("cubic dynamics matrix columns", rows, cols));
        }
        let a_t = a.reversed_axes();
        Ok(Self::new("cubic_linear", rows, move |_t, y| a_t.dot(&cubed(y))))
    }

    /// Damped cubic spiral, `A = [[-0.1, 2.0], [-2.0, -0.1]]`
    pub fn spiral() -> Self {
        let a_t = Array2::from_shape_fn((2, 2), |(i, j)| SPIRAL_A[j][i]);
        Self::new("spiral", 2, move |_t, y| a_t.dot(&cubed(y)))
    }
}

const SPIRAL_A: [[f64; 2]; 2] = [[-0.1, 2.0], [-2.0, -0.1]];

impl fmt::Debug for ExternalDynamics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalDynamics")
            .field("name", &self.name)
            .field("dim", &self.dim)
            .finish_non_exhaustive()
    }
}

impl VectorField for ExternalDynamics {
    fn name(&self) -> &str {
        &self.name
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn evaluate(&self, t: f64, y: &Array1<f64>) -> Result<Array1<f64>> {
        if y.len() != self.dim {
            return Err(Error::shape(format!("'{}' state", self.name), self.dim, y.len()));
        }
        let dy = (self.func)(t, y);
        if dy.len() != self.dim {
            return Err(Error::shape(format!("'{}' derivative", self.name), self.dim, dy.len()));
        }
        Ok(dy)
    }
}

/// A vector field that is either learned or wrapped from outside
#[derive(Debug)]
pub enum VectorFieldModel {
    Learned(LearnedField),
    External(ExternalDynamics),
}

impl VectorFieldModel {
    pub fn is_trainable(&self) -> bool {
        matches!(self, VectorFieldModel::Learned(_))
    }

    /// Parameters, or `None` for external dynamics
    pub fn parameters(&self) -> Option<&ModelParameters> {
        match self {
            VectorFieldModel::Learned(field) => Some(field.parameters()),
            VectorFieldModel::External(_) => None,
        }
    }

    pub fn parameters_mut(&mut self) -> Option<&mut ModelParameters> {
        match self {
            VectorFieldModel::Learned(field) => Some(field.parameters_mut()),
            VectorFieldModel::External(_) => None,
        }
    }

    pub fn as_learned(&self) -> Option<&LearnedField> {
        match self {
            VectorFieldModel::Learned(field) => Some(field),
            VectorFieldModel::External(_) => None,
        }
    }

    pub fn into_learned(self) -> Option<LearnedField> {
        match self {
            VectorFieldModel::Learned(field) => Some(field),
            VectorFieldModel::External(_) => None,
        }
    }

    fn inner(&self) -> &dyn VectorField {
        match self {
            VectorFieldModel::Learned(field) => field,
            VectorFieldModel::External(dynamics) => dynamics,
        }
    }
}

impl From<LearnedField> for VectorFieldModel {
    fn from(field: LearnedField) -> Self {
        VectorFieldModel::Learned(field)
    }
}

impl From<ExternalDynamics> for VectorFieldModel {
    fn from(dynamics: ExternalDynamics) -> Self {
        VectorFieldModel::External(dynamics)
    }
}

impl VectorField for VectorFieldModel {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn dim(&self) -> usize {
        self.inner().dim()
    }

    fn evaluate(&self, t: f64, y: &Array1<f64>) -> Result<Array1<f64>> {
        self.inner().evaluate(t, y)
    }

    fn num_params(&self) -> usize {
        self.inner().num_params()
    }

    fn vjp(
        &self,
        t: f64,
        y: &Array1<f64>,
        cotangent: &Array1<f64>,
        param_grad: &mut [f64],
    ) -> Result<Array1<f64>> {
        self.inner().vjp(t, y, cotangent, param_grad)
    }
}

// ============================================================================
// Tests
// ============================================================================

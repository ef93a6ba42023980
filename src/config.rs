//! # Run Configuration
//!
//! Immutable settings read once before training starts.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::model::Activation;
use crate::ode::{GradientMode, Integrator, Method, OdeConfig};
use crate::training::{LossFunction, OptimizerKind};

/// Learned vector field architecture
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Width of the single hidden layer
    pub hidden_dim: usize,
    /// Hidden activation
    pub activation: Activation,
    /// Standard deviation of the initial weights
    pub init_std: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_dim: 50,
            activation: Activation::Tanh,
            init_std: 0.1,
        }
    }
}

/// Compute device selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Cuda(u32),
}

impl Device {
    /// Device actually used for the run. Only the CPU backend exists.
    pub fn resolve(self) -> Device {
        match self {
            Device::Cpu => Device::Cpu,
            Device::Cuda(index) => {
                warn!("CUDA device {} requested but unavailable, using CPU", index);
                Device::Cpu
            }
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(index) => write!(f, "cuda:{}", index),
        }
    }
}

/// Training run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Integration method
    pub method: Method,
    /// Number of ground-truth states for the synthetic trajectory
    pub data_size: usize,
    /// Rollout window length `T`
    pub batch_time: usize,
    /// Windows per batch `M`
    pub batch_size: usize,
    /// Number of training iterations
    pub niters: usize,
    /// Evaluate every `test_freq` iterations
    pub test_freq: usize,
    /// Render evaluations through the visualizer
    pub viz: bool,
    pub device: Device,
    /// Reduced-memory gradients through the solver
    pub adjoint: bool,
    pub learning_rate: f64,
    /// RNG seed for initialization and sampling
    pub seed: Option<u64>,
    /// EMA momentum of the diagnostic meters
    pub meter_momentum: f64,
    pub loss: LossFunction,
    pub optimizer: OptimizerKind,
    pub model: ModelConfig,
    pub ode: OdeConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            method: Method::Dopri5,
            data_size: 1000,
            batch_time: 10,
            batch_size: 10,
            niters: 5000,
            test_freq: 20,
            viz: false,
            device: Device::Cpu,
            adjoint: false,
            learning_rate: 1e-3,
            seed: None,
            meter_momentum: 0.97,
            loss: LossFunction::MeanAbsolute,
            optimizer: OptimizerKind::default(),
            model: ModelConfig::default(),
            ode: OdeConfig::default(),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("batch_time", self.batch_time),
            ("batch_size", self.batch_size),
            ("test_freq", self.test_freq),
            ("hidden_dim", self.model.hidden_dim),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(Error::InvalidConfig(format!("{} must be at least 1", name)));
        }
        if !(self.meter_momentum > 0.0 && self.meter_momentum < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "meter_momentum must be in (0, 1), got {}",
                self.meter_momentum
            )));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.model.init_std >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "init_std must be non-negative, got {}",
                self.model.init_std
            )));
        }
        self.optimizer.validate()?;
        self.ode.validate()
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn gradient_mode(&self) -> GradientMode {
        if self.adjoint {
            GradientMode::Adjoint
        } else {
            GradientMode::Direct
        }
    }

    /// Integrator for training rollouts and evaluation
    pub fn integrator(&self) -> Integrator {
        Integrator::new(self.method, self.ode.clone()).with_gradient_mode(self.gradient_mode())
    }
}

//! # Optimizers
//!
//! Gradient-descent updates over [`ModelParameters`]. An optimizer is the
//! only writer of parameter values during training.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::ModelParameters;

/// Gradient-based parameter update
pub trait Optimizer: Send {
    fn name(&self) -> &str;

    /// Clear the accumulated gradient before a new backward pass
    fn zero_grad(&mut self, params: &mut ModelParameters) {
        params.zero_grad();
    }

    /// Update values in place from the accumulated gradient
    fn apply(&mut self, params: &mut ModelParameters) -> Result<()>;
}

/// RMS-scaled gradient descent
///
/// `v = alpha * v + (1 - alpha) * g^2`, `p -= lr * g / (sqrt(v) + eps)`
#[derive(Debug, Clone)]
pub struct RmsProp {
    learning_rate: f64,
    alpha: f64,
    eps: f64,
    weight_decay: f64,
    square_avg: Vec<f64>,
}

impl RmsProp {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            alpha: 0.99,
            eps: 1e-8,
            weight_decay: 0.0,
            square_avg: Vec::new(),
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    /// Running mean of squared gradients
    pub fn square_avg(&self) -> &[f64] {
        &self.square_avg
    }
}

impl Optimizer for RmsProp {
    fn name(&self) -> &str {
        "rmsprop"
    }

    fn apply(&mut self, params: &mut ModelParameters) -> Result<()> {
        if self.square_avg.is_empty() {
            self.square_avg = vec![0.0; params.len()];
        } else if self.square_avg.len() != params.len() {
            return Err(Error::shape("rmsprop state", self.square_avg.len(), params.len()));
        }

        let (values, grad) = params.split_mut();
        for ((p, &g), v) in values.iter_mut().zip(grad).zip(self.square_avg.iter_mut()) {
            let g = g + self.weight_decay * *p;
            *v = self.alpha * *v + (1.0 - self.alpha) * g * g;
            *p -= self.learning_rate * g / (v.sqrt() + self.eps);
        }
        Ok(())
    }
}

/// Plain gradient descent with norm clipping and multiplicative weight decay
#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f64,
    grad_clip: f64,
    weight_decay: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64, grad_clip: f64, weight_decay: f64) -> Self {
        Self {
            learning_rate,
            grad_clip,
            weight_decay,
        }
    }
}

impl Optimizer for Sgd {
    fn name(&self) -> &str {
        "sgd"
    }

    fn apply(&mut self, params: &mut ModelParameters) -> Result<()> {
        let grad_norm = params.grad_norm();
        let clip_factor = if grad_norm > self.grad_clip {
            self.grad_clip / grad_norm
        } else {
            1.0
        };

        let (values, grad) = params.split_mut();
        for (p, g) in values.iter_mut().zip(grad) {
            *p -= self.learning_rate * g * clip_factor;
            *p *= 1.0 - self.weight_decay;
        }
        Ok(())
    }
}

/// Optimizer selection in the run configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerKind {
    RmsProp {
        alpha: f64,
        eps: f64,
        weight_decay: f64,
    },
    Sgd {
        grad_clip: f64,
        weight_decay: f64,
    },
}

impl Default for OptimizerKind {
    fn default() -> Self {
        OptimizerKind::RmsProp {
            alpha: 0.99,
            eps: 1e-8,
            weight_decay: 0.0,
        }
    }
}

impl OptimizerKind {
    pub fn validate(&self) -> Result<()> {
        match *self {
            OptimizerKind::RmsProp {
                alpha,
                eps,
                weight_decay,
            } => {
                if !(0.0..1.0).contains(&alpha) || !(eps > 0.0) || !(weight_decay >= 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "rmsprop needs 0 <= alpha < 1, eps > 0, weight_decay >= 0 \
                         (alpha={}, eps={}, weight_decay={})",
                        alpha, eps, weight_decay
                    )));
                }
            }
            OptimizerKind::Sgd {
                grad_clip,
                weight_decay,
            } => {
                if !(grad_clip > 0.0) || !(0.0..1.0).contains(&weight_decay) {
                    return Err(Error::InvalidConfig(format!(
                        "sgd needs grad_clip > 0 and 0 <= weight_decay < 1 \
                         (grad_clip={}, weight_decay={})",
                        grad_clip, weight_decay
                    )));
                }
            }
        }
        Ok(())
    }

    /// Instantiate with the given learning rate
    pub fn build(&self, learning_rate: f64) -> Box<dyn Optimizer> {
        match *self {
            OptimizerKind::RmsProp {
                alpha,
                eps,
                weight_decay,
            } => Box::new(
                RmsProp::new(learning_rate)
                    .with_alpha(alpha)
                    .with_eps(eps)
                    .with_weight_decay(weight_decay),
            ),
            OptimizerKind::Sgd {
                grad_clip,
                weight_decay,
            } => Box::new(Sgd::new(learning_rate, grad_clip, weight_decay)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params_with_grad(values: Vec<f64>, grad: &[f64]) -> ModelParameters {
        let mut params = ModelParameters::new(values);
        params.accumulate_grad(grad).unwrap();
        params
    }

    #[test]
    fn test_rmsprop_first_step() {
        let mut params = params_with_grad(vec![1.0, -1.0, 0.5], &[0.2, -0.4, 0.0]);
        let mut opt = RmsProp::new(1e-3);
        opt.apply(&mut params).unwrap();

        // v = 0.01 g^2, step = lr * g / (0.1 |g| + eps) ~ 10 lr * sign(g)
        let v = params.values();
        assert!((v[0] - (1.0 - 1e-3 * 0.2 / ((0.01f64 * 0.04).sqrt() + 1e-8))).abs() < 1e-12);
        assert!((v[0] - 0.99).abs() < 1e-6);
        assert!((v[1] + 0.99).abs() < 1e-6);
        assert_eq!(v[2], 0.5);
        assert!((opt.square_avg()[1] - 0.01 * 0.16).abs() < 1e-15);
    }

    #[test]
    fn test_rmsprop_descends_quadratic() {
        // minimise sum(p^2)
        let mut params = ModelParameters::new(vec![2.0, -3.0]);
        let mut opt = RmsProp::new(0.05);
        for _ in 0..500 {
            opt.zero_grad(&mut params);
            let grad: Vec<f64> = params.values().iter().map(|p| 2.0 * p).collect();
            params.accumulate_grad(&grad).unwrap();
            opt.apply(&mut params).unwrap();
        }
        assert!(params.values().iter().all(|p| p.abs() < 0.1));
    }

    #[test]
    fn test_rmsprop_state_size_checked() {
        let mut opt = RmsProp::new(1e-3);
        opt.apply(&mut params_with_grad(vec![1.0, 2.0], &[1.0, 1.0])).unwrap();
        let err = opt.apply(&mut params_with_grad(vec![1.0], &[1.0])).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_sgd_clips() {
        let mut params = params_with_grad(vec![0.0, 0.0], &[3.0, 4.0]);
        let mut opt = Sgd::new(0.1, 1.0, 0.0);
        opt.apply(&mut params).unwrap();
        // |g| = 5 clipped to 1
        assert!((params.values()[0] + 0.06).abs() < 1e-12);
        assert!((params.values()[1] + 0.08).abs() < 1e-12);
    }

    #[test]
    fn test_zero_grad() {
        let mut params = params_with_grad(vec![1.0], &[5.0]);
        let mut opt = OptimizerKind::default().build(1e-3);
        opt.zero_grad(&mut params);
        assert_eq!(params.grad(), &[0.0]);
        assert_eq!(opt.name(), "rmsprop");
    }

    #[test]
    fn test_kind_serde() {
        let kind: OptimizerKind =
            serde_json::from_str(r#"{"kind": "sgd", "grad_clip": 1.0, "weight_decay": 0.0}"#).unwrap();
        assert_eq!(kind, OptimizerKind::Sgd { grad_clip: 1.0, weight_decay: 0.0 });
        assert!(kind.validate().is_ok());

        let bad = OptimizerKind::RmsProp {
            alpha: 1.5,
            eps: 1e-8,
            weight_decay: 0.0,
        };
        assert!(bad.validate().is_err());
    }
}

//! # Neural Network Primitives
//!
//! Dense layers evaluated against a flat parameter slice, with the reverse
//! pass needed to differentiate through an ODE solver.
//!
//! Parameter layout, per layer in order: weights (`output_dim x input_dim`,
//! row-major) followed by bias (`output_dim`).

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Activation functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// Rectified Linear Unit: max(0, x)
    ReLU,
    /// Hyperbolic tangent: tanh(x)
    #[default]
    Tanh,
    /// Sigmoid: 1 / (1 + exp(-x))
    Sigmoid,
    /// Swish/SiLU: x * sigmoid(x)
    SiLU,
    /// No activation
    Identity,
}

impl Activation {
    /// Apply activation function element-wise
    pub fn apply(&self, x: &Array1<f64>) -> Array1<f64> {
        match self {
            Activation::ReLU => x.mapv(|v| v.max(0.0)),
            Activation::Tanh => x.mapv(|v| v.tanh()),
            Activation::Sigmoid => x.mapv(sigmoid),
            Activation::SiLU => x.mapv(|v| v * sigmoid(v)),
            Activation::Identity => x.clone(),
        }
    }

    /// Derivative with respect to the pre-activation `x`
    pub fn derivative(&self, x: &Array1<f64>) -> Array1<f64> {
        match self {
            Activation::ReLU => x.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Tanh => x.mapv(|v| 1.0 - v.tanh().powi(2)),
            Activation::Sigmoid => x.mapv(|v| {
                let s = sigmoid(v);
                s * (1.0 - s)
            }),
            Activation::SiLU => x.mapv(|v| {
                let s = sigmoid(v);
                s + v * s * (1.0 - s)
            }),
            Activation::Identity => Array1::ones(x.len()),
        }
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// Shape of a single dense (fully connected) layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerShape {
    pub input_dim: usize,
    pub output_dim: usize,
    pub activation: Activation,
}

impl LayerShape {
    pub fn num_params(&self) -> usize {
        self.input_dim * self.output_dim + self.output_dim
    }

    fn weights<'a>(&self, params: &'a [f64]) -> Result<ArrayView2<'a, f64>> {
        let n = self.input_dim * self.output_dim;
        Ok(ArrayView2::from_shape(
            (self.output_dim, self.input_dim),
            &params[..n],
        )?)
    }

    fn bias<'a>(&self, params: &'a [f64]) -> ArrayView1<'a, f64> {
        let n = self.input_dim * self.output_dim;
        ArrayView1::from(&params[n..n + self.output_dim])
    }
}

/// Values kept from a forward pass for the reverse pass
#[derive(Debug, Clone)]
pub struct ForwardCache {
    inputs: Vec<Array1<f64>>,
    pre_activations: Vec<Array1<f64>>,
    output: Array1<f64>,
}

impl ForwardCache {
    pub fn output(&self) -> &Array1<f64> {
        &self.output
    }
}

/// Multi-Layer Perceptron (MLP) over an external parameter vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    layers: Vec<LayerShape>,
}

impl Mlp {
    /// Create a new MLP with specified architecture
    ///
    /// # Arguments
    ///
    /// * `dims` - Layer dimensions [input, hidden1, hidden2, ..., output]
    /// * `hidden_activation` - Activation for hidden layers
    /// * `output_activation` - Activation for output layer
    pub fn new(
        dims: &[usize],
        hidden_activation: Activation,
        output_activation: Activation,
    ) -> Result<Self> {
        if dims.len() < 2 {
            return Err(Error::InvalidConfig(
                "need at least input and output dimensions".into(),
            ));
        }
        if dims.contains(&0) {
            return Err(Error::InvalidConfig(format!(
                "layer dimensions must be positive, got {:?}",
                dims
            )));
        }

        let layers = dims
            .windows(2)
            .enumerate()
            .map(|(i, pair)| LayerShape {
                input_dim: pair[0],
                output_dim: pair[1],
                activation: if i == dims.len() - 2 {
                    output_activation
                } else {
                    hidden_activation
                },
            })
            .collect();

        Ok(Self { layers })
    }

    /// Check that the layers are non-empty and chain input to output
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(Error::InvalidConfig("network has no layers".into()));
        }
        if let Some(layer) = self.layers.iter().find(|l| l.input_dim == 0 || l.output_dim == 0) {
            return Err(Error::InvalidConfig(format!(
                "layer dimensions must be positive, got {} -> {}",
                layer.input_dim, layer.output_dim
            )));
        }
        for (i, pair) in self.layers.windows(2).enumerate() {
            if pair[0].output_dim != pair[1].input_dim {
                return Err(Error::shape(
                    format!("input of layer {}", i + 1),
                    pair[0].output_dim,
                    pair[1].input_dim,
                ));
            }
        }
        Ok(())
    }

    pub fn layers(&self) -> &[LayerShape] {
        &self.layers
    }

    pub fn input_dim(&self) -> usize {
        self.layers.first().map(|l| l.input_dim).unwrap_or(0)
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map(|l| l.output_dim).unwrap_or(0)
    }

    /// Get total number of parameters
    pub fn num_params(&self) -> usize {
        self.layers.iter().map(LayerShape::num_params).sum()
    }

    /// Weights drawn from `N(0, std)`, biases zero
    pub fn init_params<R: Rng + ?Sized>(&self, std: f64, rng: &mut R) -> Result<Vec<f64>> {
        let normal = Normal::new(0.0, std)
            .map_err(|e| Error::InvalidConfig(format!("init std {}: {}", std, e)))?;

        let mut params = Vec::with_capacity(self.num_params());
        for layer in &self.layers {
            params.extend((0..layer.input_dim * layer.output_dim).map(|_| normal.sample(&mut *rng)));
            params.extend(std::iter::repeat(0.0).take(layer.output_dim));
        }
        Ok(params)
    }

    fn check(&self, params: &[f64], x: &Array1<f64>) -> Result<()> {
        if params.len() != self.num_params() {
            return Err(Error::shape("network parameters", self.num_params(), params.len()));
        }
        if x.len() != self.input_dim() {
            return Err(Error::shape("network input", self.input_dim(), x.len()));
        }
        Ok(())
    }

    /// Forward pass through all layers
    pub fn forward(&self, params: &[f64], x: &Array1<f64>) -> Result<Array1<f64>> {
        self.check(params, x)?;

        let mut offset = 0;
        let mut output = x.clone();
        for layer in &self.layers {
            let p = &params[offset..offset + layer.num_params()];
            let z = layer.weights(p)?.dot(&output) + &layer.bias(p);
            output = layer.activation.apply(&z);
            offset += layer.num_params();
        }
        Ok(output)
    }

    /// Forward pass that keeps layer inputs and pre-activations
    pub fn forward_cached(&self, params: &[f64], x: &Array1<f64>) -> Result<ForwardCache> {
        self.check(params, x)?;

        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        let mut offset = 0;
        let mut output = x.clone();
        for layer in &self.layers {
            let p = &params[offset..offset + layer.num_params()];
            let z = layer.weights(p)?.dot(&output) + &layer.bias(p);
            let next = layer.activation.apply(&z);
            inputs.push(output);
            pre_activations.push(z);
            output = next;
            offset += layer.num_params();
        }

        Ok(ForwardCache {
            inputs,
            pre_activations,
            output,
        })
    }

    /// Reverse pass.
    ///
    /// Accumulates `dL/dparams` into `param_grad` and returns `dL/dx`.
    pub fn backward(
        &self,
        params: &[f64],
        cache: &ForwardCache,
        grad_output: &Array1<f64>,
        param_grad: &mut [f64],
    ) -> Result<Array1<f64>> {
        if param_grad.len() != self.num_params() {
            return Err(Error::shape("parameter gradient", self.num_params(), param_grad.len()));
        }
        if grad_output.len() != self.output_dim() {
            return Err(Error::shape("output gradient", self.output_dim(), grad_output.len()));
        }

        let mut offsets = Vec::with_capacity(self.layers.len());
        let mut offset = 0;
        for layer in &self.layers {
            offsets.push(offset);
            offset += layer.num_params();
        }

        let mut grad = grad_output.clone();
        for (l, layer) in self.layers.iter().enumerate().rev() {
            let p = &params[offsets[l]..offsets[l] + layer.num_params()];
            let g = &mut param_grad[offsets[l]..offsets[l] + layer.num_params()];
            let x = &cache.inputs[l];
            let delta = &grad * &layer.activation.derivative(&cache.pre_activations[l]);

            let (g_weights, g_bias) = g.split_at_mut(layer.input_dim * layer.output_dim);
            for (r, &d) in delta.iter().enumerate() {
                let row = &mut g_weights[r * layer.input_dim..(r + 1) * layer.input_dim];
                for (gw, &xc) in row.iter_mut().zip(x.iter()) {
                    *gw += d * xc;
                }
                g_bias[r] += d;
            }

            grad = layer.weights(p)?.t().dot(&delta);
        }

        Ok(grad)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_activations() {
        let x = Array1::from_vec(vec![-1.0, 0.0, 1.0, 2.0]);

        // ReLU
        let relu = Activation::ReLU.apply(&x);
        assert_eq!(relu[0], 0.0);
        assert_eq!(relu[2], 1.0);

        // Tanh
        let tanh = Activation::Tanh.apply(&x);
        assert!(tanh[0] < 0.0);
        assert!((tanh[1]).abs() < 1e-10);

        // Sigmoid
        let sig = Activation::Sigmoid.apply(&x);
        assert!(sig[0] < 0.5);
        assert!((sig[1] - 0.5).abs() < 1e-10);
        assert!(sig[2] > 0.5);
    }

    #[test]
    fn test_activation_derivatives() {
        let x = Array1::from_vec(vec![-1.3, -0.2, 0.4, 1.7]);
        let eps = 1e-6;
        for act in [
            Activation::Tanh,
            Activation::Sigmoid,
            Activation::SiLU,
            Activation::Identity,
        ] {
            let analytic = act.derivative(&x);
            let numeric = (act.apply(&(&x + eps)) - act.apply(&(&x - eps))) / (2.0 * eps);
            for (a, n) in analytic.iter().zip(numeric.iter()) {
                assert!((a - n).abs() < 1e-6, "{:?}: {} vs {}", act, a, n);
            }
        }
    }

    #[test]
    fn test_mlp_params() {
        let mlp = Mlp::new(&[2, 3, 2], Activation::ReLU, Activation::Identity).unwrap();

        // Layer 1: 2*3 weights + 3 bias = 9
        // Layer 2: 3*2 weights + 2 bias = 8
        // Total: 17
        assert_eq!(mlp.num_params(), 17);
        assert_eq!(mlp.input_dim(), 2);
        assert_eq!(mlp.output_dim(), 2);

        let mut rng = StdRng::seed_from_u64(1);
        let params = mlp.init_params(0.1, &mut rng).unwrap();
        assert_eq!(params.len(), 17);
        // Biases start at zero
        assert!(params[6..9].iter().all(|&b| b == 0.0));
        assert!(params[15..17].iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_known_forward() {
        let mlp = Mlp::new(&[2, 1], Activation::Tanh, Activation::Identity).unwrap();
        // w = [2, -1], b = 0.5
        let params = [2.0, -1.0, 0.5];
        let y = mlp.forward(&params, &Array1::from_vec(vec![1.0, 3.0])).unwrap();
        assert!((y[0] - (-0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_backward_matches_finite_differences() {
        let mlp = Mlp::new(&[3, 5, 2], Activation::Tanh, Activation::Identity).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let mut params = mlp.init_params(0.7, &mut rng).unwrap();
        for (i, p) in params.iter_mut().enumerate() {
            *p += 0.01 * i as f64;
        }
        let x = Array1::from_vec(vec![0.4, -0.9, 1.2]);
        let g_out = Array1::from_vec(vec![0.7, -1.1]);

        let cache = mlp.forward_cached(&params, &x).unwrap();
        let mut g_params = vec![0.0; mlp.num_params()];
        let g_x = mlp.backward(&params, &cache, &g_out, &mut g_params).unwrap();

        let objective = |p: &[f64], x: &Array1<f64>| mlp.forward(p, x).unwrap().dot(&g_out);
        let eps = 1e-6;

        for k in 0..params.len() {
            let mut plus = params.clone();
            plus[k] += eps;
            let mut minus = params.clone();
            minus[k] -= eps;
            let numeric = (objective(&plus, &x) - objective(&minus, &x)) / (2.0 * eps);
            assert!((g_params[k] - numeric).abs() < 1e-7, "param {}", k);
        }
        for k in 0..x.len() {
            let mut plus = x.clone();
            plus[k] += eps;
            let mut minus = x.clone();
            minus[k] -= eps;
            let numeric = (objective(&params, &plus) - objective(&params, &minus)) / (2.0 * eps);
            assert!((g_x[k] - numeric).abs() < 1e-7, "input {}", k);
        }
    }

    #[test]
    fn test_shape_errors() {
        let mlp = Mlp::new(&[2, 4, 2], Activation::Tanh, Activation::Identity).unwrap();
        let params = vec![0.0; mlp.num_params()];
        assert!(matches!(
            mlp.forward(&params, &Array1::zeros(3)),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            mlp.forward(&params[1..], &Array1::zeros(2)),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(Mlp::new(&[2], Activation::Tanh, Activation::Identity).is_err());
    }
}

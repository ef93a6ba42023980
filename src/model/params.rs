//! Flat parameter storage shared by a learned field and its optimizer.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Parameter values and their accumulated gradient
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelParameters {
    values: Vec<f64>,
    #[serde(skip)]
    grad: Vec<f64>,
}

impl ModelParameters {
    pub fn new(values: Vec<f64>) -> Self {
        let grad = vec![0.0; values.len()];
        Self { values, grad }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn grad(&self) -> &[f64] {
        &self.grad
    }

    /// Overwrite all values
    pub fn set_values(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.values.len() {
            return Err(Error::shape("parameter values", self.values.len(), values.len()));
        }
        self.values.copy_from_slice(values);
        Ok(())
    }

    pub fn zero_grad(&mut self) {
        self.grad.clear();
        self.grad.resize(self.values.len(), 0.0);
    }

    /// Add `grad` to the accumulated gradient
    pub fn accumulate_grad(&mut self, grad: &[f64]) -> Result<()> {
        if grad.len() != self.values.len() {
            return Err(Error::shape("parameter gradient", self.values.len(), grad.len()));
        }
        if self.grad.len() != self.values.len() {
            self.zero_grad();
        }
        for (acc, g) in self.grad.iter_mut().zip(grad) {
            *acc += g;
        }
        Ok(())
    }

    /// L2 norm of the accumulated gradient
    pub fn grad_norm(&self) -> f64 {
        self.grad.iter().map(|g| g * g).sum::<f64>().sqrt()
    }

    /// Values for in-place update alongside the gradient that drives it
    pub fn split_mut(&mut self) -> (&mut [f64], &[f64]) {
        if self.grad.len() != self.values.len() {
            self.zero_grad();
        }
        (&mut self.values, &self.grad)
    }
}

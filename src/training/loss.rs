//! Rollout losses over predicted and target states.

use ndarray::{Array, Dimension, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Loss function types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFunction {
    /// Mean absolute error over every element
    #[default]
    MeanAbsolute,
    /// Mean squared error over every element
    MeanSquared,
}

impl LossFunction {
    /// Scalar loss between predictions and targets of the same shape
    pub fn compute<D: Dimension>(&self, predicted: &Array<f64, D>, target: &Array<f64, D>) -> Result<f64> {
        check_shapes(predicted, target)?;
        if predicted.is_empty() {
            return Ok(0.0);
        }

        let n = predicted.len() as f64;
        let total = Zip::from(predicted)
            .and(target)
            .fold(0.0, |acc, &p, &t| match self {
                LossFunction::MeanAbsolute => acc + (p - t).abs(),
                LossFunction::MeanSquared => acc + (p - t).powi(2),
            });
        Ok(total / n)
    }

    /// Gradient of the loss w.r.t. `predicted`
    pub fn gradient<D: Dimension>(
        &self,
        predicted: &Array<f64, D>,
        target: &Array<f64, D>,
    ) -> Result<Array<f64, D>> {
        check_shapes(predicted, target)?;
        let n = predicted.len().max(1) as f64;

        let mut grad = predicted - target;
        match self {
            // sign(0) = 0 so exact matches contribute nothing
            LossFunction::MeanAbsolute => grad.mapv_inplace(|d| {
                if d > 0.0 {
                    1.0 / n
                } else if d < 0.0 {
                    -1.0 / n
                } else {
                    0.0
                }
            }),
            LossFunction::MeanSquared => grad.mapv_inplace(|d| 2.0 * d / n),
        }
        Ok(grad)
    }

    pub fn name(&self) -> &'static str {
        match self {
            LossFunction::MeanAbsolute => "mae",
            LossFunction::MeanSquared => "mse",
        }
    }
}

fn check_shapes<D: Dimension>(predicted: &Array<f64, D>, target: &Array<f64, D>) -> Result<()> {
    if predicted.shape() != target.shape() {
        return Err(Error::ShapeMismatch {
            context: format!("loss target {:?} vs prediction {:?}", target.shape(), predicted.shape()),
            expected: predicted.len(),
            found: target.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    #[test]
    fn test_zero_loss_on_exact_match() {
        let a = Array3::from_shape_fn((4, 3, 2), |(i, j, k)| (i + 2 * j) as f64 - k as f64 * 0.5);
        for loss in [LossFunction::MeanAbsolute, LossFunction::MeanSquared] {
            assert_eq!(loss.compute(&a, &a).unwrap(), 0.0);
            assert!(loss.gradient(&a, &a).unwrap().iter().all(|&g| g == 0.0));
        }
    }

    #[test]
    fn test_mae() {
        let pred = array![[0.5, 0.5], [1.0, -1.0]];
        let target = array![[0.6, 0.4], [1.0, 1.0]];
        let loss = LossFunction::MeanAbsolute.compute(&pred, &target).unwrap();
        assert!((loss - (0.1 + 0.1 + 0.0 + 2.0) / 4.0).abs() < 1e-12);

        let grad = LossFunction::MeanAbsolute.gradient(&pred, &target).unwrap();
        assert_eq!(grad, array![[-0.25, 0.25], [0.0, -0.25]]);
    }

    #[test]
    fn test_mse() {
        let pred = array![0.5, 0.5];
        let target = array![0.6, 0.4];
        let loss = LossFunction::MeanSquared.compute(&pred, &target).unwrap();
        assert!((loss - 0.01).abs() < 1e-12);

        let grad = LossFunction::MeanSquared.gradient(&pred, &target).unwrap();
        assert!((grad[0] + 0.1).abs() < 1e-12);
        assert!((grad[1] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch() {
        let pred = Array3::<f64>::zeros((2, 1, 2));
        let target = Array3::<f64>::zeros((2, 2, 1));
        assert!(matches!(
            LossFunction::MeanAbsolute.compute(&pred, &target),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}

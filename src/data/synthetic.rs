//! Ground truth generated by integrating known dynamics.

use ndarray::{Array1, Array2};
use tracing::info;

use super::trajectory::{Trajectory, TrajectoryDataset};
use crate::error::{Error, Result};
use crate::model::ExternalDynamics;
use crate::ode::{Integrator, Method, OdeConfig, VectorField};

/// `n` evenly spaced points on `[t0, t1]`
pub fn linspace(t0: f64, t1: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![t0],
        _ => (0..n)
            .map(|i| t0 + (t1 - t0) * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

/// Integrate `dynamics` from `y0` across `times` with a tight-tolerance Dopri5
pub fn generate_trajectory(
    dynamics: &ExternalDynamics,
    y0: Array1<f64>,
    times: Vec<f64>,
) -> Result<Trajectory> {
    let integrator = Integrator::new(Method::Dopri5, OdeConfig::with_tolerances(1e-7, 1e-9));
    let states: Array2<f64> = integrator.integrate(dynamics, &y0, &times)?;
    Trajectory::new(Array1::from_vec(times), states)
}

/// Damped cubic spiral from `y0 = (2, 0)` over `t in [0, 25]`
pub fn spiral_dataset(data_size: usize) -> Result<TrajectoryDataset> {
    if data_size < 2 {
        return Err(Error::InvalidConfig(format!(
            "data_size must be at least 2, got {}",
            data_size
        )));
    }

    let dynamics = ExternalDynamics::spiral();
    let y0 = Array1::from_vec(vec![2.0, 0.0]);
    let trajectory = generate_trajectory(&dynamics, y0, linspace(0.0, 25.0, data_size))?;

    info!(
        "Generated {} ground-truth states from '{}' dynamics",
        trajectory.len(),
        dynamics.name()
    );
    Ok(TrajectoryDataset::new(trajectory))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linspace() {
        assert_eq!(linspace(0.0, 1.0, 3), vec![0.0, 0.5, 1.0]);
        assert_eq!(linspace(2.0, 3.0, 1), vec![2.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_spiral_dataset() {
        let ds = spiral_dataset(200).unwrap();
        assert_eq!(ds.len(), 200);
        assert_eq!(ds.dim(), 2);
        assert_eq!(ds.initial_condition().to_vec(), vec![2.0, 0.0]);
        assert_eq!(ds.times()[199], 25.0);

        // Damped: the spiral ends closer to the origin than it starts
        let last = ds.states().row(199);
        let radius = (last[0] * last[0] + last[1] * last[1]).sqrt();
        assert!(radius < 2.0, "radius {}", radius);
    }

    #[test]
    fn test_spiral_dataset_too_small() {
        assert!(spiral_dataset(1).is_err());
    }
}

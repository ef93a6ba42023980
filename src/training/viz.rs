//! # Visualization
//!
//! Observers invoked at evaluation time. They never feed back into training.

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use tracing::debug;

use crate::data::{linspace, Trajectory};
use crate::error::{Error, Result};
use crate::model::VectorFieldModel;
use crate::ode::VectorField;

/// Receives the true and predicted trajectories at each evaluation
pub trait Visualizer {
    fn render(
        &mut self,
        truth: &Trajectory,
        predicted: &Array2<f64>,
        model: &VectorFieldModel,
        step: usize,
    ) -> Result<()>;
}

/// Writes one CSV per evaluation into a directory.
///
/// `trajectory_NNN.csv` holds time, true and predicted states. For 2-D
/// models `field_NNN.csv` holds the normalised field on a grid.
#[derive(Debug, Clone)]
pub struct CsvVisualizer {
    dir: PathBuf,
    grid_size: usize,
    extent: f64,
}

impl CsvVisualizer {
    /// Create the output directory if needed
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            grid_size: 21,
            extent: 2.0,
        })
    }

    /// Grid of `size x size` points on `[-extent, extent]^2`
    pub fn with_grid(mut self, size: usize, extent: f64) -> Self {
        self.grid_size = size;
        self.extent = extent;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_trajectory(&self, truth: &Trajectory, predicted: &Array2<f64>, step: usize) -> Result<()> {
        if predicted.dim() != truth.states().dim() {
            return Err(Error::shape("predicted trajectory", truth.len(), predicted.nrows()));
        }

        let path = self.dir.join(format!("trajectory_{:03}.csv", step));
        let mut wtr = csv::Writer::from_path(&path)?;

        let mut header = vec!["t".to_string()];
        header.extend((0..truth.dim()).map(|i| format!("true_{}", i)));
        header.extend((0..truth.dim()).map(|i| format!("pred_{}", i)));
        wtr.write_record(&header)?;

        for (i, &t) in truth.times().iter().enumerate() {
            let true_row = truth.states().row(i);
            let pred_row = predicted.row(i);
            let row = std::iter::once(t)
                .chain(true_row.iter().copied())
                .chain(pred_row.iter().copied());
            wtr.write_record(row.map(|v| v.to_string()))?;
        }
        wtr.flush()?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    fn write_field(&self, model: &VectorFieldModel, step: usize) -> Result<()> {
        let path = self.dir.join(format!("field_{:03}.csv", step));
        let mut wtr = csv::Writer::from_path(&path)?;
        wtr.write_record(["x", "y", "dx", "dy"])?;

        let axis = linspace(-self.extent, self.extent, self.grid_size);
        for &y in &axis {
            for &x in &axis {
                let dydt = model.evaluate(0.0, &Array1::from_vec(vec![x, y]))?;
                let mag = (dydt[0] * dydt[0] + dydt[1] * dydt[1]).sqrt();
                let (dx, dy) = if mag > 0.0 {
                    (dydt[0] / mag, dydt[1] / mag)
                } else {
                    (0.0, 0.0)
                };
                wtr.write_record([x, y, dx, dy].iter().map(|v| v.to_string()))?;
            }
        }
        wtr.flush()?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}

impl Visualizer for CsvVisualizer {
    fn render(
        &mut self,
        truth: &Trajectory,
        predicted: &Array2<f64>,
        model: &VectorFieldModel,
        step: usize,
    ) -> Result<()> {
        self.write_trajectory(truth, predicted, step)?;
        if model.dim() == 2 {
            self.write_field(model, step)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExternalDynamics;
    use tempfile::tempdir;

    #[test]
    fn test_csv_visualizer_writes_files() {
        let dir = tempdir().unwrap();
        let mut viz = CsvVisualizer::new(dir.path().join("png")).unwrap().with_grid(5, 1.0);

        let rows = vec![vec![1.0, 0.0], vec![0.5, 0.5], vec![0.0, 1.0]];
        let truth = Trajectory::from_rows(vec![0.0, 0.5, 1.0], &rows).unwrap();
        let predicted = truth.states().clone();
        let model: VectorFieldModel = ExternalDynamics::spiral().into();

        viz.render(&truth, &predicted, &model, 3).unwrap();

        let traj = std::fs::read_to_string(viz.dir().join("trajectory_003.csv")).unwrap();
        let lines: Vec<&str> = traj.lines().collect();
        assert_eq!(lines[0], "t,true_0,true_1,pred_0,pred_1");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[2], "0.5,0.5,0.5,0.5,0.5");

        let field = std::fs::read_to_string(viz.dir().join("field_003.csv")).unwrap();
        assert_eq!(field.lines().count(), 1 + 25);
    }

    #[test]
    fn test_mismatched_prediction() {
        let dir = tempdir().unwrap();
        let mut viz = CsvVisualizer::new(dir.path()).unwrap();
        let truth = Trajectory::from_rows(vec![0.0, 1.0], &[vec![0.0], vec![1.0]]).unwrap();
        let model: VectorFieldModel = ExternalDynamics::new("decay", 1, |_t, z| -z).into();

        let err = viz.render(&truth, &Array2::zeros((3, 1)), &model, 0).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }
}

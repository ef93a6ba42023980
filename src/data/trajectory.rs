//! # Trajectory Data
//!
//! Time-ordered ground-truth states and the read-only dataset built on them.

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

use crate::error::{Error, Result};

/// `N` states of dimension `D` paired with `N` strictly increasing times
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    times: Array1<f64>,
    states: Array2<f64>,
}

impl Trajectory {
    /// Create a trajectory, checking lengths and time ordering
    pub fn new(times: Array1<f64>, states: Array2<f64>) -> Result<Self> {
        if times.len() != states.nrows() {
            return Err(Error::shape("trajectory states", times.len(), states.nrows()));
        }
        if times.is_empty() {
            return Err(Error::InvalidTrajectory("trajectory has no states".into()));
        }
        if states.ncols() == 0 {
            return Err(Error::InvalidTrajectory("states have dimension 0".into()));
        }
        if let Some(i) = (1..times.len()).find(|&i| !(times[i - 1] < times[i])) {
            return Err(Error::InvalidTrajectory(format!(
                "times not strictly increasing at index {}: {} then {}",
                i,
                times[i - 1],
                times[i]
            )));
        }
        if states.iter().chain(times.iter()).any(|v| !v.is_finite()) {
            return Err(Error::InvalidTrajectory("non-finite value".into()));
        }

        Ok(Self { times, states })
    }

    /// Build from per-time state rows
    pub fn from_rows(times: Vec<f64>, rows: &[Vec<f64>]) -> Result<Self> {
        let dim = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = rows.iter().find(|r| r.len() != dim) {
            return Err(Error::shape("trajectory row", dim, bad.len()));
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let states = Array2::from_shape_vec((rows.len(), dim), flat)?;
        Self::new(Array1::from_vec(times), states)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// State dimension `D`
    pub fn dim(&self) -> usize {
        self.states.ncols()
    }

    pub fn times(&self) -> &Array1<f64> {
        &self.times
    }

    pub fn states(&self) -> &Array2<f64> {
        &self.states
    }
}

/// Read-only ground truth for one training run
#[derive(Debug, Clone)]
pub struct TrajectoryDataset {
    trajectory: Trajectory,
}

impl TrajectoryDataset {
    pub fn new(trajectory: Trajectory) -> Self {
        Self { trajectory }
    }

    /// Number of states `N`
    pub fn len(&self) -> usize {
        self.trajectory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectory.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.trajectory.dim()
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn times(&self) -> &Array1<f64> {
        self.trajectory.times()
    }

    pub fn states(&self) -> &Array2<f64> {
        self.trajectory.states()
    }

    /// Times and states of `[start, start + length)`
    pub fn window(
        &self,
        start: usize,
        length: usize,
    ) -> Result<(ArrayView1<'_, f64>, ArrayView2<'_, f64>)> {
        let end = start
            .checked_add(length)
            .filter(|&end| end <= self.len())
            .ok_or(Error::OutOfRange {
                start,
                length,
                len: self.len(),
            })?;

        Ok((
            self.trajectory.times.slice(s![start..end]),
            self.trajectory.states.slice(s![start..end, ..]),
        ))
    }

    /// First state, where full-trajectory evaluation starts
    pub fn initial_condition(&self) -> Array1<f64> {
        self.trajectory.states.row(0).to_owned()
    }
}

impl From<Trajectory> for TrajectoryDataset {
    fn from(trajectory: Trajectory) -> Self {
        Self::new(trajectory)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn diagonal(n: usize) -> TrajectoryDataset {
        let times = (0..n).map(|i| i as f64).collect();
        let rows: Vec<Vec<f64>> = (0..n).map(|i| vec![i as f64, i as f64]).collect();
        Trajectory::from_rows(times, &rows).unwrap().into()
    }

    #[test]
    fn test_window() {
        let ds = diagonal(5);
        let (t, y) = ds.window(1, 3).unwrap();
        assert_eq!(t.to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(y.nrows(), 3);
        assert_eq!(y[[2, 1]], 3.0);

        // Full-length window is allowed
        assert!(ds.window(0, 5).is_ok());
    }

    #[test]
    fn test_window_out_of_range() {
        let ds = diagonal(5);
        assert!(matches!(ds.window(3, 3), Err(Error::OutOfRange { start: 3, length: 3, len: 5 })));
        assert!(matches!(ds.window(usize::MAX, 2), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn test_initial_condition() {
        let ds = diagonal(3);
        assert_eq!(ds.initial_condition().to_vec(), vec![0.0, 0.0]);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.dim(), 2);
    }

    #[test]
    fn test_invalid_trajectories() {
        let states = Array2::zeros((3, 2));
        let err = Trajectory::new(Array1::from_vec(vec![0.0, 1.0]), states.clone()).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));

        let err = Trajectory::new(Array1::from_vec(vec![0.0, 1.0, 1.0]), states).unwrap_err();
        assert!(matches!(err, Error::InvalidTrajectory(_)));

        let err = Trajectory::from_rows(vec![0.0, 1.0], &[vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));

        assert!(Trajectory::from_rows(vec![], &[]).is_err());
    }
}

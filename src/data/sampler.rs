//! # Batch Sampling
//!
//! Random fixed-length training windows drawn from a [`TrajectoryDataset`].

use ndarray::{s, Array1, Array2, Array3};
use rand::seq::index;
use rand::Rng;

use super::trajectory::TrajectoryDataset;
use crate::error::{Error, Result};

/// One training batch of `M` windows, each `T` states long
#[derive(Debug, Clone)]
pub struct Batch {
    /// Window start indices, pairwise distinct
    pub starts: Vec<usize>,
    /// `[M, D]` state at each window start
    pub initial_states: Array2<f64>,
    /// `T` offsets shared by every window, starting at 0
    pub time_offsets: Array1<f64>,
    /// `[T, M, D]`, `targets[i, k] = states[starts[k] + i]`
    pub targets: Array3<f64>,
}

impl Batch {
    pub fn batch_size(&self) -> usize {
        self.starts.len()
    }

    pub fn batch_time(&self) -> usize {
        self.time_offsets.len()
    }
}

/// Draws [`Batch`]es from a dataset
#[derive(Debug, Clone, Copy)]
pub struct BatchSampler<'a> {
    dataset: &'a TrajectoryDataset,
}

impl<'a> BatchSampler<'a> {
    pub fn new(dataset: &'a TrajectoryDataset) -> Self {
        Self { dataset }
    }

    /// Sample `batch_size` windows of `batch_time` states.
    ///
    /// Starts are drawn without replacement from `[0, N - batch_time)`.
    /// Windows may still overlap in time. The shared time offsets are the
    /// first `batch_time` dataset times relative to the first one, which
    /// assumes uniform spacing.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        batch_size: usize,
        batch_time: usize,
    ) -> Result<Batch> {
        let n = self.dataset.len();
        let insufficient = || Error::InsufficientData {
            len: n,
            batch_time,
            batch_size,
        };
        if batch_size == 0 || batch_time == 0 || batch_time > n {
            return Err(insufficient());
        }
        let candidates = n - batch_time;
        if candidates < batch_size {
            return Err(insufficient());
        }

        let starts = index::sample(rng, candidates, batch_size).into_vec();

        let states = self.dataset.states();
        let dim = self.dataset.dim();
        let mut initial_states = Array2::zeros((batch_size, dim));
        let mut targets = Array3::zeros((batch_time, batch_size, dim));

        for (k, &start) in starts.iter().enumerate() {
            let (_, window) = self.dataset.window(start, batch_time)?;
            initial_states.row_mut(k).assign(&states.row(start));
            targets.slice_mut(s![.., k, ..]).assign(&window);
        }

        let times = self.dataset.times();
        let t0 = times[0];
        let time_offsets = times.slice(s![..batch_time]).mapv(|t| t - t0);

        Ok(Batch {
            starts,
            initial_states,
            time_offsets,
            targets,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

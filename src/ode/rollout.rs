//! # Rollout
//!
//! Forward integration of a batch of windows that remembers enough to pull a
//! loss gradient back onto the field's parameters.
//!
//! In [`GradientMode::Direct`] every accepted step is kept. In
//! [`GradientMode::Adjoint`] only the state and step-size seed at each mesh
//! point are kept, and the steps inside an interval are recomputed while
//! walking backwards.

use std::borrow::Cow;

use ndarray::{s, Array1, Array3, ArrayView2};

use super::tableau::Tableau;
use super::{check_mesh, GradientMode, Integrator, VectorField};
use crate::error::{Error, Result};

/// One accepted solver step: state `y` at time `t`, advanced by `h`
#[derive(Debug, Clone)]
pub(crate) struct StepRecord {
    pub t: f64,
    pub h: f64,
    pub y: Array1<f64>,
}

#[derive(Debug, Clone)]
struct Checkpoint {
    y: Array1<f64>,
    h: f64,
}

#[derive(Debug)]
enum Tape {
    /// `[window][interval]` -> accepted steps
    Direct(Vec<Vec<Vec<StepRecord>>>),
    /// `[window][interval]` -> state and step seed at the interval start
    Checkpointed(Vec<Vec<Checkpoint>>),
}

/// Predicted `[T, M, D]` states plus the tape needed for [`Rollout::backward`]
#[derive(Debug)]
pub struct Rollout {
    states: Array3<f64>,
    times: Vec<f64>,
    integrator: Integrator,
    tape: Tape,
}

impl Rollout {
    pub(crate) fn record(
        integrator: &Integrator,
        func: &dyn VectorField,
        y0: ArrayView2<'_, f64>,
        times: &[f64],
    ) -> Result<Self> {
        check_mesh(times)?;
        let (m, d) = y0.dim();
        if d != func.dim() {
            return Err(Error::shape(
                format!("batch initial states for '{}'", func.name()),
                func.dim(),
                d,
            ));
        }

        let n_times = times.len();
        let mut states = Array3::zeros((n_times, m, d));
        let h0 = integrator.initial_step(times);

        let mut direct = Vec::new();
        let mut checkpoints = Vec::new();

        for (w, row) in y0.outer_iter().enumerate() {
            let mut y = row.to_owned();
            let mut h = h0;
            states.slice_mut(s![0, w, ..]).assign(&y);

            let mut window_steps = Vec::with_capacity(n_times.saturating_sub(1));
            let mut window_checkpoints = Vec::with_capacity(n_times.saturating_sub(1));

            for i in 1..n_times {
                let (y_next, h_next) = match integrator.gradient_mode() {
                    GradientMode::Direct => {
                        let mut steps = Vec::new();
                        let out =
                            integrator.advance(func, times[i - 1], times[i], y, h, Some(&mut steps))?;
                        window_steps.push(steps);
                        out
                    }
                    GradientMode::Adjoint => {
                        window_checkpoints.push(Checkpoint { y: y.clone(), h });
                        integrator.advance(func, times[i - 1], times[i], y, h, None)?
                    }
                };
                states.slice_mut(s![i, w, ..]).assign(&y_next);
                y = y_next;
                h = h_next;
            }

            direct.push(window_steps);
            checkpoints.push(window_checkpoints);
        }

        let tape = match integrator.gradient_mode() {
            GradientMode::Direct => Tape::Direct(direct),
            GradientMode::Adjoint => Tape::Checkpointed(checkpoints),
        };

        Ok(Self {
            states,
            times: times.to_vec(),
            integrator: integrator.clone(),
            tape,
        })
    }

    /// Predicted states, `[T, M, D]`
    pub fn states(&self) -> &Array3<f64> {
        &self.states
    }

    pub fn into_states(self) -> Array3<f64> {
        self.states
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Pull `cotangent = dL/d(states)` back to `dL/d(parameters)`.
    ///
    /// `func` must be the field the rollout was recorded with, with unchanged
    /// parameters.
    pub fn backward(&self, func: &dyn VectorField, cotangent: &Array3<f64>) -> Result<Vec<f64>> {
        if cotangent.dim() != self.states.dim() {
            return Err(Error::shape(
                "loss cotangent",
                self.states.len(),
                cotangent.len(),
            ));
        }

        let tableau = Tableau::for_method(self.integrator.method());
        let (n_times, m, _) = self.states.dim();
        let mut grad = vec![0.0; func.num_params()];

        for w in 0..m {
            let mut a_bar = cotangent.slice(s![n_times - 1, w, ..]).to_owned();

            for i in (1..n_times).rev() {
                let steps = self.interval_steps(func, w, i - 1)?;
                for step in steps.iter().rev() {
                    a_bar = tableau.step_vjp(func, step.t, &step.y, step.h, &a_bar, &mut grad)?;
                }
                a_bar += &cotangent.slice(s![i - 1, w, ..]);
            }
        }

        Ok(grad)
    }

    fn interval_steps(
        &self,
        func: &dyn VectorField,
        window: usize,
        interval: usize,
    ) -> Result<Cow<'_, [StepRecord]>> {
        match &self.tape {
            Tape::Direct(steps) => Ok(Cow::Borrowed(&steps[window][interval][..])),
            Tape::Checkpointed(checkpoints) => {
                let cp = &checkpoints[window][interval];
                let mut steps = Vec::new();
                self.integrator.advance(
                    func,
                    self.times[interval],
                    self.times[interval + 1],
                    cp.y.clone(),
                    cp.h,
                    Some(&mut steps),
                )?;
                Ok(Cow::Owned(steps))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

//! # Integrator
//!
//! Advances a [`VectorField`] across a time mesh. Fixed-step methods take
//! equal sub-steps inside each mesh interval; Dopri5 adapts its step from the
//! embedded error estimate and lands exactly on every mesh time.

use ndarray::{s, Array1, Array2, Array3, ArrayView2};

use super::rollout::{Rollout, StepRecord};
use super::tableau::Tableau;
use super::{check_mesh, GradientMode, Method, OdeConfig, VectorField};
use crate::error::{Error, Result};

/// ODE integrator bound to a method and solver configuration
#[derive(Debug, Clone, Default)]
pub struct Integrator {
    method: Method,
    config: OdeConfig,
    gradient_mode: GradientMode,
}

impl Integrator {
    pub fn new(method: Method, config: OdeConfig) -> Self {
        Self {
            method,
            config,
            gradient_mode: GradientMode::Direct,
        }
    }

    /// Select how [`Rollout::backward`] obtains gradients
    pub fn with_gradient_mode(mut self, gradient_mode: GradientMode) -> Self {
        self.gradient_mode = gradient_mode;
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn config(&self) -> &OdeConfig {
        &self.config
    }

    pub fn gradient_mode(&self) -> GradientMode {
        self.gradient_mode
    }

    /// Integrate a single initial state across `times` without a gradient tape.
    ///
    /// Returns a `[T, D]` array whose first row is `y0`.
    pub fn integrate(
        &self,
        func: &dyn VectorField,
        y0: &Array1<f64>,
        times: &[f64],
    ) -> Result<Array2<f64>> {
        check_mesh(times)?;
        if y0.len() != func.dim() {
            return Err(Error::shape(
                format!("initial state for '{}'", func.name()),
                func.dim(),
                y0.len(),
            ));
        }

        let mut states = Array2::zeros((times.len(), y0.len()));
        states.row_mut(0).assign(y0);

        let mut y = y0.clone();
        let mut h = self.initial_step(times);
        for i in 1..times.len() {
            let (y_next, h_next) = self.advance(func, times[i - 1], times[i], y, h, None)?;
            states.row_mut(i).assign(&y_next);
            y = y_next;
            h = h_next;
        }

        Ok(states)
    }

    /// Integrate `M` initial states (rows of `y0`) across a shared mesh.
    ///
    /// Returns a `[T, M, D]` array.
    pub fn integrate_batch(
        &self,
        func: &dyn VectorField,
        y0: ArrayView2<'_, f64>,
        times: &[f64],
    ) -> Result<Array3<f64>> {
        let (m, d) = y0.dim();
        let mut states = Array3::zeros((times.len(), m, d));
        for (w, row) in y0.outer_iter().enumerate() {
            let window = self.integrate(func, &row.to_owned(), times)?;
            states.slice_mut(s![.., w, ..]).assign(&window);
        }
        Ok(states)
    }

    /// Integrate with a gradient tape so parameter gradients can be pulled back.
    pub fn rollout(
        &self,
        func: &dyn VectorField,
        y0: ArrayView2<'_, f64>,
        times: &[f64],
    ) -> Result<Rollout> {
        Rollout::record(self, func, y0, times)
    }

    /// First step size tried by the adaptive method
    pub(crate) fn initial_step(&self, times: &[f64]) -> f64 {
        match (times.first(), times.last()) {
            (Some(&t0), Some(&t1)) if t1 > t0 => ((t1 - t0) / 100.0)
                .max(self.config.min_step)
                .min(self.config.max_step),
            _ => self.config.max_step,
        }
    }

    /// Advance `y` from `t0` to `t1`.
    ///
    /// Accepted steps are appended to `tape` when given. Returns the state at
    /// `t1` and the step size to try next.
    pub(crate) fn advance(
        &self,
        func: &dyn VectorField,
        t0: f64,
        t1: f64,
        y: Array1<f64>,
        h: f64,
        tape: Option<&mut Vec<StepRecord>>,
    ) -> Result<(Array1<f64>, f64)> {
        if self.method.is_adaptive() {
            self.advance_adaptive(func, t0, t1, y, h, tape)
        } else {
            self.advance_fixed(func, t0, t1, y, tape).map(|y| (y, h))
        }
    }

    fn advance_fixed(
        &self,
        func: &dyn VectorField,
        t0: f64,
        t1: f64,
        mut y: Array1<f64>,
        mut tape: Option<&mut Vec<StepRecord>>,
    ) -> Result<Array1<f64>> {
        let tableau = Tableau::for_method(self.method);
        let span = t1 - t0;
        let n_steps = match self.config.step_size {
            Some(step) => ((span / step) - 1e-9).ceil().max(1.0) as usize,
            None => 1,
        };
        if n_steps > self.config.max_steps {
            return Err(self.failure(
                t0,
                t1,
                format!(
                    "fixed step needs {} steps, budget is {}",
                    n_steps, self.config.max_steps
                ),
            ));
        }

        let h = span / n_steps as f64;
        for i in 0..n_steps {
            let t = t0 + i as f64 * h;
            if let Some(tape) = tape.as_deref_mut() {
                tape.push(StepRecord { t, h, y: y.clone() });
            }
            y = tableau.step(func, t, &y, h)?;
            if y.iter().any(|v| !v.is_finite()) {
                return Err(self.failure(t0, t1, format!("non-finite state at t = {}", t + h)));
            }
        }

        Ok(y)
    }

    fn advance_adaptive(
        &self,
        func: &dyn VectorField,
        t0: f64,
        t1: f64,
        mut y: Array1<f64>,
        mut h: f64,
        mut tape: Option<&mut Vec<StepRecord>>,
    ) -> Result<(Array1<f64>, f64)> {
        let tableau = Tableau::for_method(self.method);
        let mut t = t0;
        let mut attempts = 0;

        while t < t1 {
            if attempts >= self.config.max_steps {
                return Err(self.failure(
                    t0,
                    t1,
                    format!(
                        "step budget of {} exhausted at t = {}",
                        self.config.max_steps, t
                    ),
                ));
            }
            attempts += 1;

            // Don't overshoot the next mesh time
            let last = h >= t1 - t;
            let h_try = if last { t1 - t } else { h };

            let (y_new, z_err) = tableau.step_with_error(func, t, &y, h_try)?;
            let err = match &z_err {
                Some(z_err) => self.error_norm(z_err, &y, &y_new),
                None => 0.0,
            };
            if !err.is_finite() || y_new.iter().any(|v| !v.is_finite()) {
                return Err(self.failure(t0, t1, format!("non-finite state at t = {}", t + h_try)));
            }

            if err <= 1.0 {
                // Step accepted
                if let Some(tape) = tape.as_deref_mut() {
                    tape.push(StepRecord { t, h: h_try, y: y.clone() });
                }
                y = y_new;
                t = if last { t1 } else { t + h_try };
                let proposal = self.optimal_step(h_try, err);
                h = if last { proposal.max(h) } else { proposal };
            } else {
                if h_try <= self.config.min_step {
                    return Err(self.failure(
                        t0,
                        t1,
                        format!(
                            "step size {:e} below minimum with error norm {:.3}",
                            h_try, err
                        ),
                    ));
                }
                h = self.optimal_step(h_try, err);
            }
        }

        Ok((y, h.min(self.config.max_step)))
    }

    /// RMS error norm scaled by the mixed tolerance
    fn error_norm(&self, z_err: &Array1<f64>, z: &Array1<f64>, z_new: &Array1<f64>) -> f64 {
        let n = z_err.len();
        if n == 0 {
            return 0.0;
        }

        let mut err_sum = 0.0;
        for i in 0..n {
            let scale = self.config.atol + self.config.rtol * z[i].abs().max(z_new[i].abs());
            err_sum += (z_err[i] / scale).powi(2);
        }

        (err_sum / n as f64).sqrt()
    }

    /// Compute optimal step size
    fn optimal_step(&self, h: f64, err: f64) -> f64 {
        if err == 0.0 {
            return (h * 2.0).min(self.config.max_step);
        }

        const SAFETY: f64 = 0.9;
        const MIN_FACTOR: f64 = 0.2;
        const MAX_FACTOR: f64 = 10.0;

        let factor = SAFETY * (1.0 / err).powf(0.2);
        let factor = factor.clamp(MIN_FACTOR, MAX_FACTOR);

        (h * factor).clamp(self.config.min_step, self.config.max_step)
    }

    fn failure(&self, t_start: f64, t_end: f64, reason: String) -> Error {
        Error::IntegrationFailure {
            iteration: None,
            t_start,
            t_end,
            reason: format!("{}: {}", self.method, reason),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExternalDynamics;

    fn linspace(t0: f64, t1: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| t0 + (t1 - t0) * i as f64 / (n - 1) as f64)
            .collect()
    }

    fn oscillator() -> ExternalDynamics {
        // dx/dt = v, dv/dt = -x
        ExternalDynamics::new("oscillator", 2, |_t, z| {
            Array1::from_vec(vec![z[1], -z[0]])
        })
    }

    #[test]
    fn test_harmonic_oscillator_rk4() {
        let config = OdeConfig {
            step_size: Some(0.01),
            ..OdeConfig::default()
        };
        let integrator = Integrator::new(Method::Rk4, config);
        let z0 = Array1::from_vec(vec![1.0, 0.0]);

        let states = integrator
            .integrate(&oscillator(), &z0, &linspace(0.0, std::f64::consts::PI, 32))
            .unwrap();

        // At t=π, x should be approximately -1
        let error = (states[[31, 0]] - (-1.0)).abs();
        assert!(error < 0.001, "Error: {}", error);
    }

    #[test]
    fn test_stiff_system() {
        // Moderately stiff: dz/dt = -10*z
        let ode = ExternalDynamics::new("stiff", 1, |_t, z| z * -10.0);
        let integrator = Integrator::new(Method::Dopri5, OdeConfig::with_tolerances(1e-6, 1e-8));
        let z0 = Array1::from_vec(vec![1.0]);

        let states = integrator.integrate(&ode, &z0, &linspace(0.0, 1.0, 11)).unwrap();

        // z(1) = e^(-10) ≈ 4.54e-5
        let expected = (-10.0_f64).exp();
        let relative_error = (states[[10, 0]] - expected).abs() / expected;
        assert!(relative_error < 0.01, "Relative error: {}", relative_error);
    }

    #[test]
    fn test_van_der_pol_bounded() {
        let ode = ExternalDynamics::new("van_der_pol", 2, |_t, z| {
            let x = z[0];
            let y = z[1];
            let mu = 0.1;
            Array1::from_vec(vec![y, mu * (1.0 - x * x) * y - x])
        });
        let integrator = Integrator::new(Method::Dopri5, OdeConfig::default());
        let z0 = Array1::from_vec(vec![2.0, 0.0]);

        let states = integrator.integrate(&ode, &z0, &linspace(0.0, 10.0, 101)).unwrap();

        for state in states.outer_iter() {
            assert!(state[0].abs() < 5.0, "x unbounded: {}", state[0]);
            assert!(state[1].abs() < 5.0, "y unbounded: {}", state[1]);
        }
    }

    #[test]
    fn test_mesh_points_are_hit_exactly() {
        // dz/dt = 1 is integrated exactly by every method
        let ode = ExternalDynamics::new("ramp", 1, |_t, _z| Array1::from_vec(vec![1.0]));
        let times = vec![0.0, 0.3, 0.35, 1.7];
        for method in [Method::Euler, Method::Midpoint, Method::Rk4, Method::Dopri5] {
            let integrator = Integrator::new(method, OdeConfig::default());
            let states = integrator
                .integrate(&ode, &Array1::from_vec(vec![0.0]), &times)
                .unwrap();
            for (i, &t) in times.iter().enumerate() {
                assert!((states[[i, 0]] - t).abs() < 1e-12, "{}: {} vs {}", method, states[[i, 0]], t);
            }
        }
    }

    #[test]
    fn test_forward_solve_is_deterministic() {
        let integrator = Integrator::new(Method::Dopri5, OdeConfig::default());
        let z0 = Array1::from_vec(vec![1.0, 0.5]);
        let times = linspace(0.0, 5.0, 40);

        let a = integrator.integrate(&oscillator(), &z0, &times).unwrap();
        let b = integrator.integrate(&oscillator(), &z0, &times).unwrap();

        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() <= 1e-9 * x.abs().max(1.0));
        }
    }

    #[test]
    fn test_batch_matches_single() {
        let integrator = Integrator::new(Method::Dopri5, OdeConfig::default());
        let y0 = Array2::from_shape_vec((2, 2), vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let times = linspace(0.0, 1.0, 5);

        let batch = integrator.integrate_batch(&oscillator(), y0.view(), &times).unwrap();
        assert_eq!(batch.dim(), (5, 2, 2));

        let single = integrator
            .integrate(&oscillator(), &y0.row(1).to_owned(), &times)
            .unwrap();
        for i in 0..5 {
            for d in 0..2 {
                assert_eq!(batch[[i, 1, d]], single[[i, d]]);
            }
        }
    }

    #[test]
    fn test_step_budget_exhausted() {
        let config = OdeConfig {
            max_steps: 2,
            ..OdeConfig::default()
        };
        let integrator = Integrator::new(Method::Dopri5, config);
        let z0 = Array1::from_vec(vec![1.0, 0.0]);

        let err = integrator
            .integrate(&oscillator(), &z0, &[0.0, 50.0])
            .unwrap_err();
        match err {
            Error::IntegrationFailure { t_start, t_end, .. } => {
                assert_eq!(t_start, 0.0);
                assert_eq!(t_end, 50.0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_blow_up_is_reported() {
        let ode = ExternalDynamics::new("blow_up", 1, |_t, z| z.mapv(|v| v * v));
        let config = OdeConfig {
            step_size: Some(0.5),
            ..OdeConfig::default()
        };
        let integrator = Integrator::new(Method::Euler, config);
        let z0 = Array1::from_vec(vec![1e200]);

        let err = integrator.integrate(&ode, &z0, &[0.0, 10.0]).unwrap_err();
        assert!(matches!(err, Error::IntegrationFailure { .. }));
    }

    #[test]
    fn test_dimension_mismatch() {
        let integrator = Integrator::default();
        let z0 = Array1::from_vec(vec![1.0, 2.0, 3.0]);
        let err = integrator.integrate(&oscillator(), &z0, &[0.0, 1.0]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { expected: 2, found: 3, .. }));
    }
}

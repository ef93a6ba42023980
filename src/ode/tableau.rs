//! # Butcher Tableaux
//!
//! Explicit Runge-Kutta methods expressed as coefficient tables, so a single
//! stepper (and a single reverse pass) serves every method.
//!
//! ```text
//! Y_i = y + h * sum_{j<i} a_ij * k_j
//! k_i = f(t + c_i * h, Y_i)
//! y'  = y + h * sum_i b_i * k_i
//! ```

use ndarray::Array1;

use super::{Method, VectorField};
use crate::error::Result;

/// Coefficients of an explicit Runge-Kutta method
#[derive(Debug)]
pub(crate) struct Tableau {
    c: &'static [f64],
    a: &'static [&'static [f64]],
    b: &'static [f64],
    /// Error weights; the final entry multiplies `f(t + h, y')` (FSAL stage)
    e: Option<&'static [f64]>,
}

const EULER: Tableau = Tableau {
    c: &[0.0],
    a: &[&[]],
    b: &[1.0],
    e: None,
};

const MIDPOINT: Tableau = Tableau {
    c: &[0.0, 0.5],
    a: &[&[], &[0.5]],
    b: &[0.0, 1.0],
    e: None,
};

const RK4: Tableau = Tableau {
    c: &[0.0, 0.5, 0.5, 1.0],
    a: &[&[], &[0.5], &[0.0, 0.5], &[0.0, 0.0, 1.0]],
    b: &[1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0],
    e: None,
};

// Dormand-Prince 5(4)
const DOPRI5: Tableau = Tableau {
    c: &[0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0],
    a: &[
        &[],
        &[1.0 / 5.0],
        &[3.0 / 40.0, 9.0 / 40.0],
        &[44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0],
        &[19372.0 / 6561.0, -25360.0 / 2187.0, 64448.0 / 6561.0, -212.0 / 729.0],
        &[
            9017.0 / 3168.0,
            -355.0 / 33.0,
            46732.0 / 5247.0,
            49.0 / 176.0,
            -5103.0 / 18656.0,
        ],
    ],
    b: &[
        35.0 / 384.0,
        0.0,
        500.0 / 1113.0,
        125.0 / 192.0,
        -2187.0 / 6784.0,
        11.0 / 84.0,
    ],
    e: Some(&[
        71.0 / 57600.0,
        0.0,
        -71.0 / 16695.0,
        71.0 / 1920.0,
        -17253.0 / 339200.0,
        22.0 / 525.0,
        -1.0 / 40.0,
    ]),
};

impl Tableau {
    pub(crate) fn for_method(method: Method) -> &'static Tableau {
        match method {
            Method::Euler => &EULER,
            Method::Midpoint => &MIDPOINT,
            Method::Rk4 => &RK4,
            Method::Dopri5 => &DOPRI5,
        }
    }

    fn num_stages(&self) -> usize {
        self.b.len()
    }

    /// Stage inputs `Y_i` and slopes `k_i`
    fn stages(
        &self,
        func: &dyn VectorField,
        t: f64,
        y: &Array1<f64>,
        h: f64,
    ) -> Result<(Vec<Array1<f64>>, Vec<Array1<f64>>)> {
        let s = self.num_stages();
        let mut inputs = Vec::with_capacity(s);
        let mut slopes: Vec<Array1<f64>> = Vec::with_capacity(s);

        for i in 0..s {
            let mut yi = y.clone();
            for (j, &a) in self.a[i].iter().enumerate() {
                if a != 0.0 {
                    yi.scaled_add(h * a, &slopes[j]);
                }
            }
            let k = func.evaluate(t + self.c[i] * h, &yi)?;
            inputs.push(yi);
            slopes.push(k);
        }

        Ok((inputs, slopes))
    }

    fn combine(&self, y: &Array1<f64>, slopes: &[Array1<f64>], h: f64) -> Array1<f64> {
        let mut y_new = y.clone();
        for (k, &b) in slopes.iter().zip(self.b) {
            if b != 0.0 {
                y_new.scaled_add(h * b, k);
            }
        }
        y_new
    }

    /// Single step without error estimate
    pub(crate) fn step(
        &self,
        func: &dyn VectorField,
        t: f64,
        y: &Array1<f64>,
        h: f64,
    ) -> Result<Array1<f64>> {
        let (_, slopes) = self.stages(func, t, y, h)?;
        Ok(self.combine(y, &slopes, h))
    }

    /// Single step returning `(y_new, local_error)`.
    ///
    /// The error is `None` for methods without an embedded estimate.
    pub(crate) fn step_with_error(
        &self,
        func: &dyn VectorField,
        t: f64,
        y: &Array1<f64>,
        h: f64,
    ) -> Result<(Array1<f64>, Option<Array1<f64>>)> {
        let (_, slopes) = self.stages(func, t, y, h)?;
        let y_new = self.combine(y, &slopes, h);

        let Some(e) = self.e else {
            return Ok((y_new, None));
        };

        let k_last = func.evaluate(t + h, &y_new)?;
        let mut err = Array1::zeros(y.len());
        for (k, &w) in slopes.iter().chain(std::iter::once(&k_last)).zip(e) {
            if w != 0.0 {
                err.scaled_add(h * w, k);
            }
        }

        Ok((y_new, Some(err)))
    }

    /// Reverse pass through one step.
    ///
    /// Given `y_bar = dL/dy'`, accumulates `dL/dparams` into `param_grad` and
    /// returns `dL/dy`. The step size is treated as a constant.
    pub(crate) fn step_vjp(
        &self,
        func: &dyn VectorField,
        t: f64,
        y: &Array1<f64>,
        h: f64,
        y_bar: &Array1<f64>,
        param_grad: &mut [f64],
    ) -> Result<Array1<f64>> {
        let (inputs, _) = self.stages(func, t, y, h)?;

        let mut k_bar: Vec<Array1<f64>> = self.b.iter().map(|&b| y_bar * (h * b)).collect();
        let mut out = y_bar.clone();

        for i in (0..self.num_stages()).rev() {
            if k_bar[i].iter().all(|&v| v == 0.0) {
                continue;
            }
            let stage_bar = func.vjp(t + self.c[i] * h, &inputs[i], &k_bar[i], param_grad)?;
            out += &stage_bar;
            for (j, &a) in self.a[i].iter().enumerate() {
                if a != 0.0 {
                    k_bar[j].scaled_add(h * a, &stage_bar);
                }
            }
        }

        Ok(out)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExternalDynamics;

    #[test]
    fn test_consistency() {
        // Row sums of A equal c, weights sum to one
        for method in [Method::Euler, Method::Midpoint, Method::Rk4, Method::Dopri5] {
            let tab = Tableau::for_method(method);
            let b_sum: f64 = tab.b.iter().sum();
            assert!((b_sum - 1.0).abs() < 1e-12, "{}: b sums to {}", method, b_sum);
            for (row, &c) in tab.a.iter().zip(tab.c) {
                let row_sum: f64 = row.iter().sum();
                assert!((row_sum - c).abs() < 1e-12, "{}: row sum {} != c {}", method, row_sum, c);
            }
        }
        let e_sum: f64 = DOPRI5.e.unwrap().iter().sum();
        assert!(e_sum.abs() < 1e-12);
    }

    #[test]
    fn test_rk4_single_step() {
        // dz/dt = z => z(t) = z(0)*e^t
        let ode = ExternalDynamics::new("growth", 1, |_t, z| z.clone());
        let z = Array1::from_vec(vec![1.0]);

        let z_new = RK4.step(&ode, 0.0, &z, 0.1).unwrap();

        let expected = 0.1_f64.exp();
        let error = (z_new[0] - expected).abs();
        assert!(error < 1e-6, "Error: {}", error);
    }

    #[test]
    fn test_dopri5_error_estimate_small() {
        let ode = ExternalDynamics::new("growth", 1, |_t, z| z.clone());
        let z = Array1::from_vec(vec![1.0]);

        let (z_new, err) = DOPRI5.step_with_error(&ode, 0.0, &z, 0.1).unwrap();
        let err = err.unwrap();

        assert!((z_new[0] - 0.1_f64.exp()).abs() < 1e-8);
        assert!(err[0].abs() < 1e-6);
    }

    #[test]
    fn test_fixed_methods_have_no_error_estimate() {
        let ode = ExternalDynamics::new("growth", 1, |_t, z| z.clone());
        let z = Array1::from_vec(vec![1.0]);
        let (_, err) = MIDPOINT.step_with_error(&ode, 0.0, &z, 0.1).unwrap();
        assert!(err.is_none());
    }
}

//! Variable-step backward differentiation formulas
//!
//! The stepper starts with the implicit Euler method (BDF1) and switches to the
//! variable-coefficient BDF2 as soon as two previous points are available. Each step solves
//! the implicit corrector equation with a simplified Newton iteration on a finite-difference
//! Jacobian. The local error is estimated from the difference between the corrector and an
//! explicit predictor (Milne's device):
//!
//! | history    | predictor               | error constant |
//! |------------|-------------------------|----------------|
//! | none       | explicit Euler          | 1/2            |
//! | one point  | linear extrapolation    | 1/3            |
//! | two points | quadratic extrapolation | 2/11           |

use std::collections::VecDeque;

use log::trace;
use nalgebra::{DMatrix, DVector};

use super::integrator::{
    all_finite, error_norm, evaluate, initial_step, min_step, StepFailure, Stepper, Tolerances,
};
use super::ode_fun::RightHandSide;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_NEWTON_ITERATIONS: usize = 6;
const NEWTON_FAILURE_FACTOR: f64 = 0.25;

#[derive(Debug, Clone, Default)]
pub struct Bdf {
    first_step: Option<f64>,
    h: Option<f64>,
    /// Accepted points before the current one, oldest first
    history: VecDeque<(f64, Vec<f64>)>,
    /// Time of the last returned point; history is only valid when stepping on from it
    current: Option<f64>,
}

/// Coefficients of `y_{n+1} = c_n y_n + c_{n-1} y_{n-1} + beta h f(t_{n+1}, y_{n+1})`
#[derive(Debug, Clone, Copy)]
struct Formula {
    order: usize,
    c_n: f64,
    c_nm1: f64,
    beta: f64,
}

impl Formula {
    fn implicit_euler() -> Self {
        Self {
            order: 1,
            c_n: 1.0,
            c_nm1: 0.0,
            beta: 1.0,
        }
    }

    /// BDF2 for the step ratio `omega = h_{n+1} / h_n`
    fn bdf2(omega: f64) -> Self {
        let denominator = 1.0 + 2.0 * omega;
        Self {
            order: 2,
            c_n: (1.0 + omega).powi(2) / denominator,
            c_nm1: -omega.powi(2) / denominator,
            beta: (1.0 + omega) / denominator,
        }
    }

    fn max_factor(&self) -> f64 {
        match self.order {
            1 => 5.0,
            _ => 2.0,
        }
    }
}

enum CorrectorFailure {
    Diverged,
    Failed(StepFailure),
}

impl Bdf {
    pub fn new(first_step: Option<f64>) -> Self {
        Self {
            first_step,
            ..Self::default()
        }
    }

    fn newton_tolerance(tolerances: &Tolerances) -> f64 {
        (10.0 * f64::EPSILON / tolerances.rel).max(0.03f64.min(tolerances.rel.sqrt()))
    }

    /// Predicted state and error constant for a step to `t_new`
    fn predict(&self, t: f64, y: &[f64], f0: &[f64], t_new: f64) -> (Vec<f64>, f64) {
        let h = t_new - t;
        match self.history.len() {
            0 => (
                y.iter().zip(f0).map(|(yi, fi)| yi + h * fi).collect(),
                1.0 / 2.0,
            ),
            1 => {
                let (t1, y1) = &self.history[0];
                let nodes = [(*t1, y1.as_slice()), (t, y)];
                (extrapolate(&nodes, t_new), 1.0 / 3.0)
            }
            _ => {
                let (t2, y2) = &self.history[self.history.len() - 2];
                let (t1, y1) = &self.history[self.history.len() - 1];
                let nodes = [(*t2, y2.as_slice()), (*t1, y1.as_slice()), (t, y)];
                (extrapolate(&nodes, t_new), 2.0 / 11.0)
            }
        }
    }

    fn formula(&self, t: f64, h: f64) -> Formula {
        match self.history.back() {
            Some((t_prev, _)) if self.history.len() >= 2 => Formula::bdf2(h / (t - t_prev)),
            _ => Formula::implicit_euler(),
        }
    }

    /// Solves the corrector equation with a simplified Newton iteration
    #[allow(clippy::too_many_arguments)]
    fn correct(
        &self,
        rhs: &dyn RightHandSide,
        jacobian: &DMatrix<f64>,
        formula: &Formula,
        y: &[f64],
        t_new: f64,
        h: f64,
        predictor: &[f64],
        tolerances: &Tolerances,
    ) -> Result<Vec<f64>, CorrectorFailure> {
        let n = y.len();
        let beta_h = formula.beta * h;

        let constant: Vec<f64> = match (formula.order, self.history.back()) {
            (2, Some((_, y_prev))) => y
                .iter()
                .zip(y_prev)
                .map(|(yn, ynm1)| formula.c_n * yn + formula.c_nm1 * ynm1)
                .collect(),
            _ => y.to_vec(),
        };

        let iteration_matrix = DMatrix::<f64>::identity(n, n) - jacobian * beta_h;
        let lu = iteration_matrix.lu();
        let newton_tol = Self::newton_tolerance(tolerances);

        let mut z = predictor.to_vec();
        let mut previous_norm: Option<f64> = None;

        for _ in 0..MAX_NEWTON_ITERATIONS {
            let f = evaluate(rhs, t_new, &z).map_err(CorrectorFailure::Failed)?;
            let residual = DVector::from_iterator(
                n,
                (0..n).map(|i| constant[i] + beta_h * f[i] - z[i]),
            );
            let delta = lu.solve(&residual).ok_or(CorrectorFailure::Diverged)?;

            z.iter_mut().zip(delta.iter()).for_each(|(zi, di)| *zi += di);
            if !all_finite(&z) {
                return Err(CorrectorFailure::Diverged);
            }

            let norm = error_norm(delta.as_slice(), y, &z, tolerances);
            if norm <= newton_tol {
                return Ok(z);
            }
            if previous_norm.is_some_and(|previous| norm > 2.0 * previous) {
                return Err(CorrectorFailure::Diverged);
            }
            previous_norm = Some(norm);
        }

        Err(CorrectorFailure::Diverged)
    }
}

/// Evaluates the Lagrange interpolant through `nodes` at `t`
fn extrapolate(nodes: &[(f64, &[f64])], t: f64) -> Vec<f64> {
    let weights: Vec<f64> = nodes
        .iter()
        .enumerate()
        .map(|(j, (tj, _))| {
            nodes
                .iter()
                .enumerate()
                .filter(|(m, _)| *m != j)
                .map(|(_, (tm, _))| (t - tm) / (tj - tm))
                .product::<f64>()
        })
        .collect();

    let n = nodes[0].1.len();
    (0..n)
        .map(|i| {
            nodes
                .iter()
                .zip(&weights)
                .map(|((_, y), w)| w * y[i])
                .sum::<f64>()
        })
        .collect()
}

/// Forward-difference Jacobian `∂f/∂y` at `(t, y)`
pub(crate) fn finite_difference_jacobian(
    rhs: &dyn RightHandSide,
    t: f64,
    y: &[f64],
    f0: &[f64],
) -> Result<DMatrix<f64>, StepFailure> {
    let n = y.len();
    let eps = f64::EPSILON.sqrt();
    let mut jacobian = DMatrix::<f64>::zeros(n, n);
    let mut perturbed = y.to_vec();

    for j in 0..n {
        let original = perturbed[j];
        let delta = eps * original.abs().max(1.0);
        perturbed[j] = original + delta;
        let f = evaluate(rhs, t, &perturbed)?;
        perturbed[j] = original;

        for i in 0..n {
            jacobian[(i, j)] = (f[i] - f0[i]) / delta;
        }
    }

    Ok(jacobian)
}

impl Stepper for Bdf {
    fn advance(
        &mut self,
        rhs: &dyn RightHandSide,
        t: f64,
        y: &[f64],
        t_end: f64,
        tolerances: &Tolerances,
    ) -> Result<(f64, Vec<f64>), StepFailure> {
        if self.current != Some(t) {
            self.history.clear();
        }

        let f0 = evaluate(rhs, t, y)?;
        if !all_finite(&f0) {
            return Err(StepFailure::NonFinite { t });
        }
        let jacobian = finite_difference_jacobian(rhs, t, y, &f0)?;

        let mut h = match (self.h, self.first_step) {
            (Some(h), _) | (None, Some(h)) => h,
            (None, None) => initial_step(y, &f0, tolerances),
        };

        loop {
            let last = h >= t_end - t;
            if last {
                h = t_end - t;
            }
            if h < min_step(t) {
                return Err(StepFailure::StepSizeTooSmall { t, h });
            }

            let t_new = if last { t_end } else { t + h };
            let formula = self.formula(t, h);
            let (predictor, error_constant) = self.predict(t, y, &f0, t_new);

            let corrected = match self.correct(
                rhs, &jacobian, &formula, y, t_new, h, &predictor, tolerances,
            ) {
                Ok(z) => z,
                Err(CorrectorFailure::Diverged) => {
                    trace!("Newton iteration failed at t = {}, h = {:e}", t, h);
                    h *= NEWTON_FAILURE_FACTOR;
                    continue;
                }
                Err(CorrectorFailure::Failed(failure)) => return Err(failure),
            };

            let difference: Vec<f64> = corrected
                .iter()
                .zip(&predictor)
                .map(|(z, p)| error_constant * (z - p))
                .collect();
            let err = error_norm(&difference, y, &corrected, tolerances);
            let exponent = -1.0 / (formula.order as f64 + 1.0);

            if err <= 1.0 {
                let factor = if err == 0.0 {
                    formula.max_factor()
                } else {
                    (SAFETY * err.powf(exponent)).clamp(MIN_FACTOR, formula.max_factor())
                };

                self.history.push_back((t, y.to_vec()));
                if self.history.len() > 2 {
                    self.history.pop_front();
                }
                self.current = Some(t_new);
                self.h = Some(h * factor);

                return Ok((t_new, corrected));
            }

            h *= (SAFETY * err.powf(exponent)).max(MIN_FACTOR);
        }
    }

    fn reset(&mut self) {
        self.h = None;
        self.history.clear();
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::error::SimulationError;
    use approx::assert_relative_eq;

    /// Robertson's stiff chemical kinetics problem
    struct Robertson;

    impl RightHandSide for Robertson {
        fn dimension(&self) -> usize {
            3
        }

        fn evaluate(&self, _t: f64, y: &[f64], dy: &mut [f64]) -> Result<(), SimulationError> {
            dy[0] = -0.04 * y[0] + 1e4 * y[1] * y[2];
            dy[1] = 0.04 * y[0] - 1e4 * y[1] * y[2] - 3e7 * y[1].powi(2);
            dy[2] = 3e7 * y[1].powi(2);
            Ok(())
        }
    }

    struct Linear;

    impl RightHandSide for Linear {
        fn dimension(&self) -> usize {
            2
        }

        fn evaluate(&self, _t: f64, y: &[f64], dy: &mut [f64]) -> Result<(), SimulationError> {
            dy[0] = 2.0 * y[0] + 3.0 * y[1];
            dy[1] = -y[0];
            Ok(())
        }
    }

    #[test]
    fn test_extrapolate_is_exact_for_quadratics() {
        let f = |t: f64| 3.0 * t * t - 2.0 * t + 1.0;
        let (y0, y1, y2) = ([f(0.0)], [f(0.5)], [f(1.5)]);
        let nodes = [(0.0, &y0[..]), (0.5, &y1[..]), (1.5, &y2[..])];

        assert_relative_eq!(extrapolate(&nodes, 2.0)[0], f(2.0), epsilon = 1e-12);
    }

    #[test]
    fn test_bdf2_coefficients_constant_step() {
        let formula = Formula::bdf2(1.0);

        assert_relative_eq!(formula.c_n, 4.0 / 3.0);
        assert_relative_eq!(formula.c_nm1, -1.0 / 3.0);
        assert_relative_eq!(formula.beta, 2.0 / 3.0);
    }

    #[test]
    fn test_finite_difference_jacobian() {
        let y = [1.0, 2.0];
        let f0 = [8.0, -1.0];
        let jacobian = finite_difference_jacobian(&Linear, 0.0, &y, &f0).unwrap();

        assert_relative_eq!(jacobian[(0, 0)], 2.0, epsilon = 1e-6);
        assert_relative_eq!(jacobian[(0, 1)], 3.0, epsilon = 1e-6);
        assert_relative_eq!(jacobian[(1, 0)], -1.0, epsilon = 1e-6);
        assert_relative_eq!(jacobian[(1, 1)], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_robertson_conserves_mass() {
        let tolerances = Tolerances {
            rel: 1e-6,
            abs: 1e-10,
        };
        let mut stepper = Bdf::new(None);

        let mut t = 0.0;
        let mut y = vec![1.0, 0.0, 0.0];
        let mut steps = 0;
        while t < 40.0 {
            (t, y) = stepper.advance(&Robertson, t, &y, 40.0, &tolerances).unwrap();
            steps += 1;
        }

        assert_eq!(t, 40.0);
        assert!(steps < 5_000);
        assert_relative_eq!(y.iter().sum::<f64>(), 1.0, epsilon = 1e-7);
        assert_relative_eq!(y[0], 0.7158, max_relative = 1e-2);
    }
}

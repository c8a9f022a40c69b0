//! Integrator adapter
//!
//! [`Integrator`] drives one of the adaptive steppers over a [`RightHandSide`]. It keeps the
//! current time and state, counts accepted steps and remembers why integration stopped, so
//! the integration loop only has to ask whether the last call was successful.

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::bdf::Bdf;
use super::dopri::DormandPrince;
use super::error::SimulationError;
use super::ode_fun::RightHandSide;
use super::setup::{SolverMethod, SolverOptions};

/// Reason an integration stopped before reaching its target
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepFailure {
    #[error("Step size {h:e} at t = {t} fell below the minimum step size")]
    StepSizeTooSmall { t: f64, h: f64 },
    #[error("Maximum number of steps ({0}) exceeded")]
    MaxStepsExceeded(usize),
    #[error("Right-hand side could not be evaluated: {0}")]
    Evaluation(String),
    #[error("Right-hand side is not finite at t = {t}")]
    NonFinite { t: f64 },
}

/// Relative and absolute error tolerances of a stepper
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    pub rel: f64,
    pub abs: f64,
}

impl From<&SolverOptions> for Tolerances {
    fn from(options: &SolverOptions) -> Self {
        Self {
            rel: options.rel_tol,
            abs: options.abs_tol,
        }
    }
}

/// A single-step method with its own step size control
pub trait Stepper {
    /// Advances from `(t, y)` by one accepted step that does not pass `t_end`
    ///
    /// Rejected attempts are retried internally with a smaller step size. Returns the new
    /// time and state. The returned time equals `t_end` exactly when the step reaches it.
    fn advance(
        &mut self,
        rhs: &dyn RightHandSide,
        t: f64,
        y: &[f64],
        t_end: f64,
        tolerances: &Tolerances,
    ) -> Result<(f64, Vec<f64>), StepFailure>;

    /// Forgets the step size and history, e.g. after a new initial value was set
    fn reset(&mut self);
}

pub struct Integrator<'a> {
    rhs: &'a dyn RightHandSide,
    stepper: Box<dyn Stepper>,
    tolerances: Tolerances,
    max_steps: usize,
    t: f64,
    y: Vec<f64>,
    steps: usize,
    failure: Option<StepFailure>,
}

impl<'a> Integrator<'a> {
    /// Creates an integrator for `rhs` using the method and tolerances of `options`
    pub fn new(rhs: &'a dyn RightHandSide, options: &SolverOptions) -> Self {
        let stepper: Box<dyn Stepper> = match options.solver {
            SolverMethod::AdaptiveBdf => Box::new(Bdf::new(options.first_step)),
            SolverMethod::Rk45 => Box::new(DormandPrince::new(options.first_step)),
        };

        Self {
            rhs,
            stepper,
            tolerances: Tolerances::from(options),
            max_steps: options.max_steps,
            t: 0.0,
            y: vec![0.0; rhs.dimension()],
            steps: 0,
            failure: None,
        }
    }

    /// Sets the state to start integrating from and clears all step history
    pub fn set_initial_value(&mut self, y0: Vec<f64>, t0: f64) -> Result<(), SimulationError> {
        if y0.len() != self.rhs.dimension() {
            return Err(SimulationError::StateDimensionMismatch {
                expected: self.rhs.dimension(),
                found: y0.len(),
            });
        }

        self.t = t0;
        self.y = y0;
        self.steps = 0;
        self.failure = None;
        self.stepper.reset();
        Ok(())
    }

    /// Integrates towards `target`
    ///
    /// With `single_step` the call returns after one accepted step, otherwise it continues
    /// until `target` is reached. Returns whether the integrator is still successful.
    pub fn integrate(&mut self, target: f64, single_step: bool) -> bool {
        if self.failure.is_some() {
            return false;
        }

        while self.t < target {
            if self.steps >= self.max_steps {
                self.failure = Some(StepFailure::MaxStepsExceeded(self.max_steps));
                return false;
            }

            match self
                .stepper
                .advance(self.rhs, self.t, &self.y, target, &self.tolerances)
            {
                Ok((t, y)) => {
                    self.t = t;
                    self.y = y;
                    self.steps += 1;
                }
                Err(failure) => {
                    debug!("Step from t = {} failed after {} steps: {}", self.t, self.steps, failure);
                    self.failure = Some(failure);
                    return false;
                }
            }

            if single_step {
                break;
            }
        }

        true
    }

    pub fn t(&self) -> f64 {
        self.t
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn successful(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failure(&self) -> Option<&StepFailure> {
        self.failure.as_ref()
    }
}

/// Evaluates the right-hand side into a fresh vector
pub(crate) fn evaluate(
    rhs: &dyn RightHandSide,
    t: f64,
    y: &[f64],
) -> Result<Vec<f64>, StepFailure> {
    let mut dy = vec![0.0; y.len()];
    rhs.evaluate(t, y, &mut dy)
        .map_err(|err| StepFailure::Evaluation(err.to_string()))?;
    Ok(dy)
}

pub(crate) fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// Weighted RMS norm of `v` with the scale `abs + rel * max(|y|, |y_new|)`
pub(crate) fn error_norm(v: &[f64], y: &[f64], y_new: &[f64], tolerances: &Tolerances) -> f64 {
    if v.is_empty() {
        return 0.0;
    }

    let sum: f64 = v
        .iter()
        .zip(y.iter().zip(y_new))
        .map(|(vi, (yi, yn))| {
            let scale = tolerances.abs + tolerances.rel * yi.abs().max(yn.abs());
            (vi / scale).powi(2)
        })
        .sum();

    (sum / v.len() as f64).sqrt()
}

/// Estimates the size of the first step from the initial state and slope
pub(crate) fn initial_step(y: &[f64], f0: &[f64], tolerances: &Tolerances) -> f64 {
    let d0 = error_norm(y, y, y, tolerances);
    let d1 = error_norm(f0, y, y, tolerances);

    if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    }
}

/// Smallest step size that still changes `t` in floating point
pub(crate) fn min_step(t: f64) -> f64 {
    16.0 * f64::EPSILON * t.abs().max(1.0)
}

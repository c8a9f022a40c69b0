//! Explicit Dormand-Prince 4(5) stepper with first-same-as-last stage reuse

use super::integrator::{
    all_finite, error_norm, evaluate, initial_step, min_step, StepFailure, Stepper, Tolerances,
};
use super::ode_fun::RightHandSide;

// Dormand–Prince coefficients
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th-order weights, propagated solution
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// Difference between the 5th- and 4th-order weights
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;

#[derive(Debug, Clone, Default)]
pub struct DormandPrince {
    first_step: Option<f64>,
    h: Option<f64>,
    /// Last stage of the previous step, valid at the stored time
    fsal: Option<(f64, Vec<f64>)>,
}

impl DormandPrince {
    pub fn new(first_step: Option<f64>) -> Self {
        Self {
            first_step,
            h: None,
            fsal: None,
        }
    }
}

/// `y + h * Σ a_j k_j`
fn stage_state(y: &[f64], h: f64, terms: &[(f64, &[f64])]) -> Vec<f64> {
    y.iter()
        .enumerate()
        .map(|(i, yi)| yi + h * terms.iter().map(|(a, k)| a * k[i]).sum::<f64>())
        .collect()
}

impl Stepper for DormandPrince {
    fn advance(
        &mut self,
        rhs: &dyn RightHandSide,
        t: f64,
        y: &[f64],
        t_end: f64,
        tolerances: &Tolerances,
    ) -> Result<(f64, Vec<f64>), StepFailure> {
        let k1 = match self.fsal.take() {
            Some((t_fsal, k)) if t_fsal == t => k,
            _ => evaluate(rhs, t, y)?,
        };
        if !all_finite(&k1) {
            return Err(StepFailure::NonFinite { t });
        }

        let mut h = match (self.h, self.first_step) {
            (Some(h), _) | (None, Some(h)) => h,
            (None, None) => initial_step(y, &k1, tolerances),
        };

        loop {
            let last = h >= t_end - t;
            if last {
                h = t_end - t;
            }
            if h < min_step(t) {
                return Err(StepFailure::StepSizeTooSmall { t, h });
            }

            let k2 = evaluate(rhs, t + C2 * h, &stage_state(y, h, &[(A21, &k1)]))?;
            let k3 = evaluate(rhs, t + C3 * h, &stage_state(y, h, &[(A31, &k1), (A32, &k2)]))?;
            let k4 = evaluate(
                rhs,
                t + C4 * h,
                &stage_state(y, h, &[(A41, &k1), (A42, &k2), (A43, &k3)]),
            )?;
            let k5 = evaluate(
                rhs,
                t + C5 * h,
                &stage_state(y, h, &[(A51, &k1), (A52, &k2), (A53, &k3), (A54, &k4)]),
            )?;
            let k6 = evaluate(
                rhs,
                t + h,
                &stage_state(
                    y,
                    h,
                    &[(A61, &k1), (A62, &k2), (A63, &k3), (A64, &k4), (A65, &k5)],
                ),
            )?;

            let y_new = stage_state(
                y,
                h,
                &[(B1, &k1), (B3, &k3), (B4, &k4), (B5, &k5), (B6, &k6)],
            );
            let t_new = if last { t_end } else { t + h };
            let k7 = evaluate(rhs, t_new, &y_new)?;

            let error: Vec<f64> = (0..y.len())
                .map(|i| {
                    h * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i]
                        + E7 * k7[i])
                })
                .collect();
            let err = error_norm(&error, y, &y_new, tolerances);

            if !err.is_finite() || !all_finite(&k7) {
                h *= MIN_FACTOR;
                continue;
            }

            if err <= 1.0 {
                let factor = if err == 0.0 {
                    MAX_FACTOR
                } else {
                    (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
                };
                self.h = Some(h * factor);
                self.fsal = Some((t_new, k7));
                return Ok((t_new, y_new));
            }

            h *= (SAFETY * err.powf(-0.2)).max(MIN_FACTOR);
        }
    }

    fn reset(&mut self) {
        self.h = None;
        self.fsal = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::error::SimulationError;
    use approx::assert_relative_eq;

    /// Harmonic oscillator, x'' = -x
    struct Oscillator;

    impl RightHandSide for Oscillator {
        fn dimension(&self) -> usize {
            2
        }

        fn evaluate(&self, _t: f64, y: &[f64], dy: &mut [f64]) -> Result<(), SimulationError> {
            dy[0] = y[1];
            dy[1] = -y[0];
            Ok(())
        }
    }

    #[test]
    fn test_oscillator_period() {
        let tolerances = Tolerances {
            rel: 1e-10,
            abs: 1e-12,
        };
        let mut stepper = DormandPrince::new(None);
        let t_end = 2.0 * std::f64::consts::PI;

        let mut t = 0.0;
        let mut y = vec![1.0, 0.0];
        while t < t_end {
            (t, y) = stepper
                .advance(&Oscillator, t, &y, t_end, &tolerances)
                .unwrap();
        }

        assert_eq!(t, t_end);
        assert_relative_eq!(y[0], 1.0, epsilon = 1e-7);
        assert_relative_eq!(y[1], 0.0, epsilon = 1e-7);
    }

    #[test]
    fn test_first_step_is_respected() {
        let tolerances = Tolerances {
            rel: 1e-6,
            abs: 1e-6,
        };
        let mut stepper = DormandPrince::new(Some(1e-3));
        let (t, _) = stepper
            .advance(&Oscillator, 0.0, &[1.0, 0.0], 1.0, &tolerances)
            .unwrap();

        assert_relative_eq!(t, 1e-3);
    }
}

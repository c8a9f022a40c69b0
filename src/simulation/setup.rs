//! Setup module for configuring model integrations.
//!
//! This module provides the [`SolverOptions`] struct and its builder for configuring
//! the numerical integration of a kinetic model. It handles:
//!
//! - Choice of the integration method ([`SolverMethod`])
//! - Error tolerance settings (relative and absolute)
//! - The simulation type the right-hand side is built for
//! - Step limits and an optional first step size

use std::fmt::{self, Display};
use std::str::FromStr;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::model::SimulationType;

use super::error::SimulationError;

/// Integration method used by the solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolverMethod {
    /// Variable-step backward differentiation formulas of order 1 and 2
    #[default]
    AdaptiveBdf,
    /// Explicit Dormand-Prince 4(5) pair
    Rk45,
}

impl FromStr for SolverMethod {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "adaptive-bdf" | "bdf" => Ok(SolverMethod::AdaptiveBdf),
            "rk45" | "dopri5" => Ok(SolverMethod::Rk45),
            _ => Err(SimulationError::UnknownSolver(s.to_string())),
        }
    }
}

impl Display for SolverMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverMethod::AdaptiveBdf => write!(f, "adaptive-bdf"),
            SolverMethod::Rk45 => write!(f, "rk45"),
        }
    }
}

/// Configuration for the numerical integration of a kinetic model
///
/// # Fields
///
/// * `solver` - Integration method (default: adaptive BDF)
/// * `rel_tol` - Relative tolerance for error control (default: 1e-8)
/// * `abs_tol` - Absolute tolerance for error control (default: 1e-8)
/// * `simulation_type` - Which rate laws the right-hand side is built from (default: QSSA)
/// * `max_steps` - Maximum number of accepted steps per solve (default: 500 000)
/// * `first_step` - Size of the first step, estimated from the initial state if unset
///
/// # Examples
///
/// ```
/// use kinmodel::prelude::{SolverMethod, SolverOptionsBuilder};
///
/// let options = SolverOptionsBuilder::default()
///     .solver(SolverMethod::Rk45)
///     .rel_tol(1e-6)
///     .abs_tol(1e-10)
///     .build()
///     .unwrap();
///
/// assert_eq!(options.max_steps, 500_000);
/// ```
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct SolverOptions {
    #[builder(default)]
    pub solver: SolverMethod,
    #[builder(default = "1e-8")]
    pub rel_tol: f64,
    #[builder(default = "1e-8")]
    pub abs_tol: f64,
    #[builder(default)]
    pub simulation_type: SimulationType,
    #[builder(default = "500_000")]
    pub max_steps: usize,
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub first_step: Option<f64>,
}

impl SolverOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(rel_tol) = self.rel_tol {
            check_tolerance("rel_tol", rel_tol)?;
        }
        if let Some(abs_tol) = self.abs_tol {
            check_tolerance("abs_tol", abs_tol)?;
        }
        if let Some(Some(first_step)) = self.first_step {
            if !(first_step.is_finite() && first_step > 0.0) {
                return Err(format!("first_step must be positive, got {}", first_step));
            }
        }
        Ok(())
    }
}

impl SolverOptions {
    /// Re-checks the tolerances, for options that bypassed the builder (e.g. deserialized)
    pub fn validate(&self) -> Result<(), SimulationError> {
        check_tolerance("rel_tol", self.rel_tol).map_err(SimulationError::InvalidTolerance)?;
        check_tolerance("abs_tol", self.abs_tol).map_err(SimulationError::InvalidTolerance)?;
        Ok(())
    }
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            solver: SolverMethod::AdaptiveBdf,
            rel_tol: 1e-8,
            abs_tol: 1e-8,
            simulation_type: SimulationType::Qssa,
            max_steps: 500_000,
            first_step: None,
        }
    }
}

fn check_tolerance(name: &str, value: f64) -> Result<(), String> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(format!("{} must be positive and finite, got {}", name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_match_default() {
        let built = SolverOptionsBuilder::default().build().unwrap();
        assert_eq!(built, SolverOptions::default());
    }

    #[test]
    fn test_builder_rejects_negative_tolerance() {
        let result = SolverOptionsBuilder::default().rel_tol(-1.0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_solver_method_from_str() {
        assert_eq!(
            "adaptive-bdf".parse::<SolverMethod>().unwrap(),
            SolverMethod::AdaptiveBdf
        );
        assert_eq!("dopri5".parse::<SolverMethod>().unwrap(), SolverMethod::Rk45);
        assert!(matches!(
            "lsoda".parse::<SolverMethod>(),
            Err(SimulationError::UnknownSolver(_))
        ));
    }

    #[test]
    fn test_options_serde() {
        let json = r#"{
            "solver": "rk45",
            "rel_tol": 1e-6,
            "abs_tol": 1e-9,
            "simulation_type": "qssa",
            "max_steps": 1000
        }"#;

        let options: SolverOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.solver, SolverMethod::Rk45);
        assert_eq!(options.first_step, None);
        assert!(options.validate().is_ok());
    }
}

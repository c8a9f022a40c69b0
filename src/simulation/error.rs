//! Simulation Error Module
//!
//! This module provides the error type for compiling and integrating a kinetic model.
//!
//! # Key Error Types
//!
//! The [`SimulationError`] enum covers the failure points that are detected before or while
//! setting up an integration:
//! - Invalid time spans and tolerances
//! - State vectors that do not match the dimension of the system
//! - Parameter vectors that do not match the parameters of the system
//! - Unknown solver names
//! - Right-hand side evaluation errors
//! - Invalid solver option builders
//!
//! A failing integration step is not reported here. The integration loop returns the
//! partial trajectory and flags it through
//! [`SolveStatus`](crate::simulation::solution::SolveStatus).

use thiserror::Error;

use super::setup::SolverOptionsBuilderError;

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Invalid time span: t0 = {t0} must be finite and smaller than t1 = {t1}")]
    InvalidTimeSpan { t0: f64, t1: f64 },
    #[error("Invalid tolerance: {0}")]
    InvalidTolerance(String),
    #[error("State dimension mismatch: expected {expected} values, found {found}")]
    StateDimensionMismatch { expected: usize, found: usize },
    #[error("Parameter count mismatch: expected {expected} values, found {found}")]
    ParameterCountMismatch { expected: usize, found: usize },
    #[error("Unknown solver '{0}'. Available solvers are 'adaptive-bdf' and 'rk45'")]
    UnknownSolver(String),
    #[error("Error evaluating right-hand side: {0}")]
    Evaluation(String),
    #[error("Invalid solver options: {0}")]
    Builder(#[from] SolverOptionsBuilderError),
}

//! Kinetic Model Library
//!
//! This library builds and integrates ODE models of biochemical reaction networks, including:
//! - Symbolic rate laws of enzyme-kinetics mechanisms (reversible Hill, convenience kinetics
//!   with competitive inhibition)
//! - Assembly of the per-reaction rate laws into one mass-balance ODE system
//! - Boundary conditions that rewrite the assembled rates
//! - Compilation of the system and integration with adaptive stiff and non-stiff solvers

#![warn(unused_imports)]

/// Commonly used types and functionality re-exported for convenience
pub mod prelude {
    pub use crate::boundary::{BoundaryCondition, ConstantConcentration, ConstantFlux};
    pub use crate::error::KineticsError;
    pub use crate::expression::{Expr, ExpressionError, Symbol};
    pub use crate::itemsets::*;
    pub use crate::mechanisms::{
        make_convenience_with_inhibition, BiUniReversibleHill, ConvenienceInhibited,
        ConvenienceShape, Expressions, KineticMechanism, Mechanism, ReactionRates,
    };
    pub use crate::model::*;
    pub use crate::reaction::*;

    #[cfg(feature = "simulation")]
    pub use crate::simulation::error::*;
    #[cfg(feature = "simulation")]
    pub use crate::simulation::integrator::{Integrator, StepFailure, Tolerances};
    #[cfg(feature = "simulation")]
    pub use crate::simulation::ode_fun::*;
    #[cfg(feature = "simulation")]
    pub use crate::simulation::setup::*;
    #[cfg(feature = "simulation")]
    pub use crate::simulation::solution::*;
}

/// Symbolic expressions used to write down rate laws
pub mod expression;

/// Error types for model construction
pub mod error;

/// Reactant and parameter sets of mechanisms
pub mod itemsets;

/// Kinetic mechanisms and their rate laws
pub mod mechanisms;

/// Reactions binding a mechanism into a model
pub mod reaction;

/// Boundary conditions applied to the assembled rates
pub mod boundary;

/// Kinetic model assembly and solving
pub mod model;

/// Compilation and numerical integration of kinetic models
#[cfg(feature = "simulation")]
pub mod simulation {
    pub use crate::simulation::setup::SolverOptions;
    pub use peroxide::fuga::ODEProblem;

    /// Error types for simulation failures
    pub mod error;
    /// Compiled right-hand side
    pub mod ode_fun;
    /// Integrator adapter and stepper interface
    pub mod integrator;
    /// Variable-step BDF stepper
    pub mod bdf;
    /// Dormand-Prince stepper
    pub mod dopri;
    /// Solver configuration
    pub mod setup;
    /// Integration loop and solution data structures
    pub mod solution;
}

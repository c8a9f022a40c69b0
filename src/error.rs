//! Error Module
//!
//! This module defines [`KineticsError`], the error type shared by mechanisms, reactions
//! and the kinetic model.
//!
//! Structural problems (duplicate or unknown names, unsupported capabilities, parameters
//! used outside of their declared simulation types) are reported before any numeric work
//! begins. Integrator failures are not errors: they are reported through the status of the
//! returned solution.

use thiserror::Error;

use crate::expression::ExpressionError;
use crate::itemsets::SimulationTag;

#[cfg(feature = "simulation")]
use crate::simulation::error::SimulationError;

#[derive(Error, Debug)]
pub enum KineticsError {
    /// A reaction with the same name is already part of the model
    #[error("Reaction '{0}' already exists in the model")]
    DuplicateName(String),

    /// A role was declared twice in a reactant or parameter set
    #[error("Role '{0}' is declared more than once")]
    DuplicateRole(String),

    /// A role that the set does not declare was looked up
    #[error("Unknown role '{0}'")]
    UnknownRole(String),

    /// A declared reactant role was not bound to a species
    #[error("Reactant role '{0}' is not bound to a species")]
    MissingReactant(String),

    /// The model holds no reaction with the given name
    #[error("Unknown reaction '{0}'")]
    UnknownReaction(String),

    /// The mechanism or model structurally lacks the requested capability
    #[error("{0} is not supported")]
    NotSupported(String),

    /// A parameter is used in a simulation type it is not declared for
    #[error("Parameter '{parameter}' is not valid for {simulation} simulations")]
    InconsistentParameter {
        parameter: String,
        simulation: SimulationTag,
    },

    /// A parameter required by the compiled system has no numeric value
    #[error("Parameter '{0}' has no value")]
    MissingParameterValue(String),

    /// The initial state does not provide a value for a species of the system
    #[error("No initial value given for species '{0}'")]
    MissingInitialValue(String),

    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[cfg(feature = "simulation")]
    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),
}

impl KineticsError {
    /// Whether the error signals a missing capability rather than a failure
    ///
    /// Calling code can use this to probe which simulation types a model supports.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, KineticsError::NotSupported(_))
    }
}

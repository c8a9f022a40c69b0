//! Reactions bind a kinetic mechanism to a name within a model and own its parametrization.

use std::collections::HashMap;

use log::debug;

use crate::error::KineticsError;
use crate::mechanisms::{Expressions, KineticMechanism, Mechanism, ReactionRates};

/// Parameter role → value mapping used to parametrize a reaction
pub type ParameterValues = HashMap<String, f64>;

#[derive(Debug, Clone, PartialEq)]
pub struct Reaction {
    name: String,
    mechanism: Mechanism,
}

impl Reaction {
    /// Wraps a mechanism into a reaction carrying the mechanism's name
    pub fn new(mechanism: impl Into<Mechanism>) -> Self {
        let mechanism = mechanism.into();
        Self {
            name: mechanism.name().to_string(),
            mechanism,
        }
    }

    /// Wraps a mechanism and assigns initial parameter values
    pub fn with_parameters(
        mechanism: impl Into<Mechanism>,
        values: &ParameterValues,
    ) -> Result<Self, KineticsError> {
        let mut reaction = Self::new(mechanism);
        reaction.parametrize(values)?;
        Ok(reaction)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mechanism(&self) -> &Mechanism {
        &self.mechanism
    }

    pub fn mechanism_mut(&mut self) -> &mut Mechanism {
        &mut self.mechanism
    }

    pub fn reaction_rates(&self) -> Option<&ReactionRates> {
        self.mechanism.reaction_rates()
    }

    pub fn expressions(&self) -> Option<&Expressions> {
        self.mechanism.expressions()
    }

    /// Assigns numeric values to parameters of the mechanism
    ///
    /// All roles are checked before any value is written, so a failing call leaves the
    /// reaction untouched. If the rate law was already derived, the species expressions are
    /// refreshed from the stored `v_net` without re-deriving it.
    ///
    /// # Errors
    ///
    /// Returns [`KineticsError::UnknownRole`] for a parameter the mechanism does not declare.
    pub fn parametrize(&mut self, values: &ParameterValues) -> Result<(), KineticsError> {
        let parameters = self.mechanism.parameters();
        if let Some(role) = values.keys().find(|role| !parameters.contains(role)) {
            return Err(KineticsError::UnknownRole(role.clone()));
        }

        for (role, value) in values {
            self.mechanism.parameters_mut().set_value(role, *value)?;
        }
        debug!("Parametrized {} with {} values", self.name, values.len());

        if self.mechanism.reaction_rates().is_some() {
            self.mechanism.update_qssa_rate_expression()?;
        }

        Ok(())
    }
}

//! Kinetic mechanisms
//!
//! A mechanism is the symbolic rate law of one reaction. It is bound to the species of that
//! reaction through a [`ReactantSet`] (and optionally an inhibitor set) and carries a
//! [`ParameterSet`] whose symbols appear in the rate law.
//!
//! Deriving the rate law produces two artifacts that the kinetic model consumes:
//!
//! - [`ReactionRates`]: the net, forward and backward rate expressions
//! - [`Expressions`]: the signed contribution of the reaction to the net production rate of
//!   every substrate and product species
//!
//! The supported mechanisms form the closed set [`Mechanism`], which exposes them all
//! through the [`KineticMechanism`] trait.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::KineticsError;
use crate::expression::{Expr, Symbol};
use crate::itemsets::{Parameter, ParameterSet, ReactantSet};

pub mod bi_uni_reversible_hill;
pub mod convenience_with_inhibition;

pub use bi_uni_reversible_hill::BiUniReversibleHill;
pub use convenience_with_inhibition::{
    make_convenience_with_inhibition, ConvenienceInhibited, ConvenienceShape,
};

/// Species symbol → signed net production rate contribution
pub type Expressions = BTreeMap<Symbol, Expr>;

/// Net, forward and backward rate of a reaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionRates {
    pub v_net: Expr,
    pub v_fwd: Expr,
    pub v_bwd: Expr,
}

impl ReactionRates {
    /// Builds the rates from forward and backward expressions, `v_net = v_fwd - v_bwd`
    pub fn from_forward_backward(v_fwd: Expr, v_bwd: Expr) -> Self {
        Self {
            v_net: &v_fwd - &v_bwd,
            v_fwd,
            v_bwd,
        }
    }
}

/// State shared by every mechanism: its bindings and its derived expressions
#[derive(Debug, Clone, PartialEq)]
pub struct MechanismState {
    pub(crate) name: String,
    pub(crate) reactants: ReactantSet,
    pub(crate) inhibitors: Option<ReactantSet>,
    pub(crate) parameters: ParameterSet,
    pub(crate) reaction_rates: Option<ReactionRates>,
    pub(crate) expressions: Option<Expressions>,
    pub(crate) expression_parameters: BTreeSet<Symbol>,
}

impl MechanismState {
    pub(crate) fn new(
        name: impl Into<String>,
        reactants: ReactantSet,
        inhibitors: Option<ReactantSet>,
        parameters: ParameterSet,
    ) -> Self {
        Self {
            name: name.into(),
            reactants,
            inhibitors,
            parameters,
            reaction_rates: None,
            expressions: None,
            expression_parameters: BTreeSet::new(),
        }
    }

    /// Michaelis (or inhibition) constant linked to a reactant role
    pub(crate) fn linked_constant(
        &self,
        links: &[(String, String)],
        reactant_role: &str,
    ) -> Result<Expr, KineticsError> {
        let (parameter_role, _) = links
            .iter()
            .find(|(_, linked)| linked == reactant_role)
            .ok_or_else(|| KineticsError::UnknownRole(format!("km of {}", reactant_role)))?;
        self.parameters.expr(parameter_role)
    }

    /// Stores freshly derived rates along with the species expressions built from them
    pub(crate) fn store_rates(
        &mut self,
        rates: ReactionRates,
        stoichiometry: &[(String, f64)],
    ) -> Result<(), KineticsError> {
        let expressions = species_expressions(&self.reactants, stoichiometry, &rates.v_net)?;
        let declared: BTreeSet<&Symbol> = self.parameters.symbols().collect();
        self.expression_parameters = rates
            .v_net
            .free_symbols()
            .into_iter()
            .filter(|s| declared.contains(s))
            .collect();
        self.reaction_rates = Some(rates);
        self.expressions = Some(expressions);
        Ok(())
    }
}

/// Builds the stoichiometry-weighted contribution of `v_net` for every reactant role.
///
/// A species bound to several roles accumulates the sum of its contributions.
pub(crate) fn species_expressions(
    reactants: &ReactantSet,
    stoichiometry: &[(String, f64)],
    v_net: &Expr,
) -> Result<Expressions, KineticsError> {
    let mut expressions = Expressions::new();

    for (role, stoich) in stoichiometry {
        let symbol = reactants.symbol(role)?.clone();
        let contribution = *stoich * v_net;

        match expressions.entry(symbol) {
            Entry::Occupied(mut entry) => {
                let accumulated = std::mem::replace(entry.get_mut(), Expr::zero());
                *entry.get_mut() = accumulated + contribution;
            }
            Entry::Vacant(entry) => {
                entry.insert(contribution);
            }
        }
    }

    Ok(expressions)
}

/// Capability interface of all kinetic mechanisms
pub trait KineticMechanism {
    fn state(&self) -> &MechanismState;

    fn state_mut(&mut self) -> &mut MechanismState;

    /// Signed stoichiometry of every reactant role, substrates first
    fn reactant_stoichiometry(&self) -> &[(String, f64)];

    /// `(parameter role, reactant role)` pairs linking Michaelis constants to reactants
    fn parameter_reactant_links(&self) -> &[(String, String)];

    /// Derives the rate law under the quasi-steady-state assumption and stores
    /// `reaction_rates` and `expressions`
    fn get_qssa_rate_expression(&mut self) -> Result<(), KineticsError>;

    /// Derives the detailed elementary-step rate expressions
    fn get_full_rate_expression(&mut self) -> Result<(), KineticsError>;

    /// Back-calculates elementary rate constants from the lumped parameters
    fn calculate_rate_constants(&mut self) -> Result<(), KineticsError>;

    /// Rebuilds `expressions` from the stored `v_net` without re-deriving the rate law.
    ///
    /// Derives the rate law first if it was never derived.
    fn update_qssa_rate_expression(&mut self) -> Result<(), KineticsError> {
        let v_net = match &self.state().reaction_rates {
            Some(rates) => rates.v_net.clone(),
            None => return self.get_qssa_rate_expression(),
        };

        let expressions =
            species_expressions(&self.state().reactants, self.reactant_stoichiometry(), &v_net)?;
        self.state_mut().expressions = Some(expressions);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.state().name
    }

    fn reactants(&self) -> &ReactantSet {
        &self.state().reactants
    }

    fn inhibitors(&self) -> Option<&ReactantSet> {
        self.state().inhibitors.as_ref()
    }

    fn parameters(&self) -> &ParameterSet {
        &self.state().parameters
    }

    fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.state_mut().parameters
    }

    fn reaction_rates(&self) -> Option<&ReactionRates> {
        self.state().reaction_rates.as_ref()
    }

    fn expressions(&self) -> Option<&Expressions> {
        self.state().expressions.as_ref()
    }

    /// Symbols of the declared parameters appearing in `v_net`
    fn expression_parameters(&self) -> &BTreeSet<Symbol> {
        &self.state().expression_parameters
    }

    /// Declared parameters whose symbols are free in `expr`
    fn get_parameters_from_expression(&self, expr: &Expr) -> Vec<&Parameter> {
        let symbols = expr.free_symbols();
        self.parameters()
            .iter()
            .filter(|p| symbols.contains(p.symbol()))
            .collect()
    }
}

/// The closed set of supported mechanisms
#[derive(Debug, Clone, PartialEq)]
pub enum Mechanism {
    BiUniReversibleHill(BiUniReversibleHill),
    ConvenienceInhibited(ConvenienceInhibited),
}

macro_rules! dispatch {
    ($self:ident, $mechanism:ident => $call:expr) => {
        match $self {
            Mechanism::BiUniReversibleHill($mechanism) => $call,
            Mechanism::ConvenienceInhibited($mechanism) => $call,
        }
    };
}

impl KineticMechanism for Mechanism {
    fn state(&self) -> &MechanismState {
        dispatch!(self, m => m.state())
    }

    fn state_mut(&mut self) -> &mut MechanismState {
        dispatch!(self, m => m.state_mut())
    }

    fn reactant_stoichiometry(&self) -> &[(String, f64)] {
        dispatch!(self, m => m.reactant_stoichiometry())
    }

    fn parameter_reactant_links(&self) -> &[(String, String)] {
        dispatch!(self, m => m.parameter_reactant_links())
    }

    fn get_qssa_rate_expression(&mut self) -> Result<(), KineticsError> {
        dispatch!(self, m => m.get_qssa_rate_expression())
    }

    fn get_full_rate_expression(&mut self) -> Result<(), KineticsError> {
        dispatch!(self, m => m.get_full_rate_expression())
    }

    fn calculate_rate_constants(&mut self) -> Result<(), KineticsError> {
        dispatch!(self, m => m.calculate_rate_constants())
    }
}

impl From<BiUniReversibleHill> for Mechanism {
    fn from(mechanism: BiUniReversibleHill) -> Self {
        Mechanism::BiUniReversibleHill(mechanism)
    }
}

impl From<ConvenienceInhibited> for Mechanism {
    fn from(mechanism: ConvenienceInhibited) -> Self {
        Mechanism::ConvenienceInhibited(mechanism)
    }
}

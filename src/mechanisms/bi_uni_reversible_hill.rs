//! Reversible Hill kinetics for bi-substrate, uni-product reactions (A + B <-> C)

use log::debug;

use crate::error::KineticsError;
use crate::itemsets::{
    make_parameter_set, make_reactant_set, ParameterDeclaration, ReactantDeclaration,
    SimulationTag::{Mca, Ode, Qssa},
};

use super::{KineticMechanism, MechanismState, ReactionRates};

const REACTANT_ROLES: [&str; 3] = ["substrate1", "substrate2", "product"];

/// Reversible Hill bi-uni mechanism
///
/// The rate law uses a single Hill coefficient `h` for cooperativity:
///
/// ```text
/// hill_effect = (s1/kms1 * s2/kms2 + p/kmp)^(h - 1)
/// v_fwd = vmaxf * s1/kms1 * s2/kms2 * hill_effect / D
/// v_bwd = vmaxf / (keq * kms1 * kms2) * p * hill_effect / D
/// D = 1 + (s1/kms1 + p/kmp)^h + (s2/kms2 + p/kmp)^h
///       + (s1/kms1 * s2/kms2 + p/kmp)^h - 2 * (p/kmp)^h
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BiUniReversibleHill {
    state: MechanismState,
    stoichiometry: Vec<(String, f64)>,
    links: Vec<(String, String)>,
}

impl BiUniReversibleHill {
    /// Creates the mechanism for one reaction
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the reaction, used to qualify the parameter symbols
    /// * `reactants` - `(role, species)` bindings for `substrate1`, `substrate2` and `product`
    ///
    /// # Errors
    ///
    /// Fails if a role is missing, unknown or bound twice.
    pub fn new(name: &str, reactants: &[(&str, &str)]) -> Result<Self, KineticsError> {
        let reactants = Self::reactant_declaration()?.bind(reactants)?;
        let parameters = Self::parameter_declaration()?.instantiate(name);

        Ok(Self {
            state: MechanismState::new(name, reactants, None, parameters),
            stoichiometry: vec![
                ("substrate1".to_string(), -1.0),
                ("substrate2".to_string(), -1.0),
                ("product".to_string(), 1.0),
            ],
            links: vec![
                ("km_substrate1".to_string(), "substrate1".to_string()),
                ("km_substrate2".to_string(), "substrate2".to_string()),
                ("km_product".to_string(), "product".to_string()),
            ],
        })
    }

    pub fn reactant_declaration() -> Result<ReactantDeclaration, KineticsError> {
        make_reactant_set(REACTANT_ROLES)
    }

    pub fn parameter_declaration() -> Result<ParameterDeclaration, KineticsError> {
        make_parameter_set([
            ("vmax_forward", vec![Ode, Mca, Qssa]),
            ("k_equilibrium", vec![Ode, Mca, Qssa]),
            ("hill_coefficient", vec![Ode, Mca, Qssa]),
            ("km_substrate1", vec![Ode, Mca, Qssa]),
            ("km_substrate2", vec![Ode, Mca, Qssa]),
            ("km_product", vec![Ode, Mca, Qssa]),
            ("vmax_backward", vec![Ode, Qssa]),
        ])
    }
}

impl KineticMechanism for BiUniReversibleHill {
    fn state(&self) -> &MechanismState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut MechanismState {
        &mut self.state
    }

    fn reactant_stoichiometry(&self) -> &[(String, f64)] {
        &self.stoichiometry
    }

    fn parameter_reactant_links(&self) -> &[(String, String)] {
        &self.links
    }

    fn get_qssa_rate_expression(&mut self) -> Result<(), KineticsError> {
        let state = &self.state;
        let reactants = &state.reactants;
        let parameters = &state.parameters;

        let s1 = reactants.get("substrate1")?.expr();
        let s2 = reactants.get("substrate2")?.expr();
        let p = reactants.get("product")?.expr();

        let kms1 = state.linked_constant(&self.links, "substrate1")?;
        let kms2 = state.linked_constant(&self.links, "substrate2")?;
        let kmp = state.linked_constant(&self.links, "product")?;

        let keq = parameters.expr("k_equilibrium")?;
        let vmaxf = parameters.expr("vmax_forward")?;
        let h = parameters.expr("hill_coefficient")?;

        let hill_effect = (&s1 / &kms1 * &s2 / &kms2 + &p / &kmp).pow(&h - 1.0);

        let fwd_nominator = &vmaxf * &s1 / &kms1 * &s2 / &kms2 * &hill_effect;
        let bwd_nominator = &vmaxf / (&keq * &kms1 * &kms2) * &p * &hill_effect;

        let common_denominator = 1.0
            + (&s1 / &kms1 + &p / &kmp).pow(&h)
            + (&s2 / &kms2 + &p / &kmp).pow(&h)
            + (&s1 / &kms1 * &s2 / &kms2 + &p / &kmp).pow(&h)
            - 2.0 * (&p / &kmp).pow(&h);

        let rates = ReactionRates::from_forward_backward(
            fwd_nominator / &common_denominator,
            bwd_nominator / &common_denominator,
        );

        debug!("Derived reversible Hill rate law of {}", self.state.name);
        self.state.store_rates(rates, &self.stoichiometry)
    }

    fn get_full_rate_expression(&mut self) -> Result<(), KineticsError> {
        Err(KineticsError::NotSupported(
            "Full rate expression of reversible Hill kinetics".to_string(),
        ))
    }

    fn calculate_rate_constants(&mut self) -> Result<(), KineticsError> {
        Err(KineticsError::NotSupported(
            "Rate constants of reversible Hill kinetics".to_string(),
        ))
    }
}

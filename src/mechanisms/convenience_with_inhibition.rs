//! Convenience kinetics with competitive inhibition
//!
//! A reversible N-substrate / M-product mechanism with any number of competitive
//! inhibitors, as described in:
//!
//! Savoglidis, G., et al. (2016). "A method for analysis and design of metabolism using
//! metabolomics data and kinetic models: Application on lipidomics using a novel kinetic
//! model of sphingolipid metabolism." Metabolic Engineering 37: 46-62.
//!
//! The roles and parameters of the mechanism depend on the stoichiometry of the reaction.
//! [`make_convenience_with_inhibition`] derives a [`ConvenienceShape`] from a signed
//! stoichiometry vector and the inhibitor multiplicities, and memoizes it: equal inputs
//! always yield the same shared shape.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};

use itertools::Itertools;
use lazy_static::lazy_static;
use log::debug;
use ordered_float::OrderedFloat;

use crate::error::KineticsError;
use crate::expression::Expr;
use crate::itemsets::{
    make_parameter_set, make_reactant_set, Item, ParameterDeclaration, ReactantDeclaration,
    SimulationTag::{Mca, Ode, Qssa},
};

use super::{KineticMechanism, MechanismState, ReactionRates};

lazy_static! {
    static ref SHAPES: Mutex<HashMap<ShapeKey, Arc<ConvenienceShape>>> =
        Mutex::new(HashMap::new());
}

/// Canonical descriptor of a convenience mechanism shape
///
/// Substrate and product magnitudes are kept in the order they appear in the
/// stoichiometry vector; zero entries are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeKey {
    substrates: Vec<OrderedFloat<f64>>,
    products: Vec<OrderedFloat<f64>>,
    inhibitors: Vec<OrderedFloat<f64>>,
}

impl ShapeKey {
    fn new(stoichiometry: &[f64], inhibitor_stoichiometry: &[f64]) -> Self {
        Self {
            substrates: stoichiometry
                .iter()
                .filter(|s| **s < 0.0)
                .map(|s| OrderedFloat(s.abs()))
                .collect(),
            products: stoichiometry
                .iter()
                .filter(|s| **s > 0.0)
                .map(|s| OrderedFloat(*s))
                .collect(),
            inhibitors: inhibitor_stoichiometry
                .iter()
                .map(|i| OrderedFloat(*i))
                .collect(),
        }
    }
}

/// Renders the key as `Convenience_s1_s2_p1_i1`
impl Display for ShapeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts = self
            .substrates
            .iter()
            .map(|s| format!("s{}", s))
            .chain(self.products.iter().map(|p| format!("p{}", p)))
            .chain(self.inhibitors.iter().map(|i| format!("i{}", i)));

        write!(f, "Convenience_{}", parts.format("_"))
    }
}

/// Role layout of a convenience mechanism for one stoichiometry
///
/// Substrates are named `substrate1..N`, products `product1..M` and inhibitors
/// `inhibitor1..K`, each with its `km_*` or `ki_*` constant.
#[derive(Debug)]
pub struct ConvenienceShape {
    key: ShapeKey,
    name: String,
    reactants: ReactantDeclaration,
    inhibitors: ReactantDeclaration,
    parameters: ParameterDeclaration,
    stoichiometry: Vec<(String, f64)>,
    links: Vec<(String, String)>,
}

impl PartialEq for ConvenienceShape {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ConvenienceShape {}

impl Hash for ConvenienceShape {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl ConvenienceShape {
    fn from_key(key: ShapeKey) -> Result<Self, KineticsError> {
        let mut reactant_roles = Vec::new();
        let mut inhibitor_roles = Vec::new();
        let mut parameters = vec![
            ("vmax_forward".to_string(), vec![Ode, Mca, Qssa]),
            ("k_equilibrium".to_string(), vec![Ode, Mca, Qssa]),
        ];
        let mut stoichiometry = Vec::new();
        let mut links = Vec::new();

        let roles = key
            .substrates
            .iter()
            .enumerate()
            .map(|(i, s)| (format!("substrate{}", i + 1), -s.into_inner()))
            .chain(
                key.products
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (format!("product{}", i + 1), p.into_inner())),
            );

        for (role, stoich) in roles {
            let km = format!("km_{}", role);
            parameters.push((km.clone(), vec![Ode, Mca, Qssa]));
            links.push((km, role.clone()));
            stoichiometry.push((role.clone(), stoich));
            reactant_roles.push(role);
        }

        for i in 1..=key.inhibitors.len() {
            let inhibitor = format!("inhibitor{}", i);
            let ki = format!("ki_{}", inhibitor);
            parameters.push((ki.clone(), vec![Ode, Mca, Qssa]));
            links.push((ki, inhibitor.clone()));
            inhibitor_roles.push(inhibitor);
        }

        Ok(Self {
            name: key.to_string(),
            reactants: make_reactant_set(reactant_roles)?,
            inhibitors: make_reactant_set(inhibitor_roles)?,
            parameters: make_parameter_set(parameters)?,
            stoichiometry,
            links,
            key,
        })
    }

    /// Canonical name of the shape, e.g. `Convenience_s1_p2_i1`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reactant_declaration(&self) -> &ReactantDeclaration {
        &self.reactants
    }

    pub fn inhibitor_declaration(&self) -> &ReactantDeclaration {
        &self.inhibitors
    }

    pub fn parameter_declaration(&self) -> &ParameterDeclaration {
        &self.parameters
    }

    pub fn num_substrates(&self) -> usize {
        self.key.substrates.len()
    }

    pub fn num_products(&self) -> usize {
        self.key.products.len()
    }

    pub fn num_inhibitors(&self) -> usize {
        self.key.inhibitors.len()
    }
}

/// Returns the convenience shape for a stoichiometry and inhibitor multiplicities
///
/// Negative entries of `stoichiometry` are substrates, positive entries products. Every
/// entry of `inhibitor_stoichiometry` adds one competitive inhibitor. Shapes are memoized
/// process-wide, so calling this twice with equal arguments returns the same
/// `Arc` (`Arc::ptr_eq` holds).
///
/// # Errors
///
/// Only fails if the generated role declarations are inconsistent, which cannot happen for
/// the generated role names.
pub fn make_convenience_with_inhibition(
    stoichiometry: &[f64],
    inhibitor_stoichiometry: &[f64],
) -> Result<Arc<ConvenienceShape>, KineticsError> {
    let key = ShapeKey::new(stoichiometry, inhibitor_stoichiometry);
    let mut shapes = SHAPES.lock().unwrap_or_else(PoisonError::into_inner);

    if let Some(shape) = shapes.get(&key) {
        return Ok(Arc::clone(shape));
    }

    let shape = Arc::new(ConvenienceShape::from_key(key.clone())?);
    debug!("Generated convenience mechanism shape {}", shape.name());
    shapes.insert(key, Arc::clone(&shape));

    Ok(shape)
}

/// Convenience kinetics bound to the species of one reaction
#[derive(Debug, Clone, PartialEq)]
pub struct ConvenienceInhibited {
    shape: Arc<ConvenienceShape>,
    state: MechanismState,
}

impl ConvenienceInhibited {
    /// Binds a convenience shape to the species of a reaction
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the reaction, used to qualify the parameter symbols
    /// * `shape` - Shape obtained from [`make_convenience_with_inhibition`]
    /// * `reactants` - `(role, species)` bindings for all substrate and product roles
    /// * `inhibitors` - `(role, species)` bindings for all inhibitor roles
    pub fn new(
        name: &str,
        shape: Arc<ConvenienceShape>,
        reactants: &[(&str, &str)],
        inhibitors: &[(&str, &str)],
    ) -> Result<Self, KineticsError> {
        let reactants = shape.reactants.bind(reactants)?;
        let inhibitors = shape.inhibitors.bind(inhibitors)?;
        let parameters = shape.parameters.instantiate(name);

        Ok(Self {
            state: MechanismState::new(name, reactants, Some(inhibitors), parameters),
            shape,
        })
    }

    pub fn shape(&self) -> &Arc<ConvenienceShape> {
        &self.shape
    }

    /// `1 + Σ_{a=1..n} (x/km)^a` for a species of stoichiometric magnitude `n`
    fn saturation_term(x: &Expr, km: &Expr, stoich: f64) -> Expr {
        let magnitude = stoich.abs().trunc() as u32;
        (1..=magnitude).fold(Expr::one(), |term, alpha| {
            term + (x / km).pow(f64::from(alpha))
        })
    }
}

impl KineticMechanism for ConvenienceInhibited {
    fn state(&self) -> &MechanismState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut MechanismState {
        &mut self.state
    }

    fn reactant_stoichiometry(&self) -> &[(String, f64)] {
        &self.shape.stoichiometry
    }

    fn parameter_reactant_links(&self) -> &[(String, String)] {
        &self.shape.links
    }

    fn get_qssa_rate_expression(&mut self) -> Result<(), KineticsError> {
        let state = &self.state;
        let links = &self.shape.links;

        let keq = state.parameters.expr("k_equilibrium")?;
        let vmaxf = state.parameters.expr("vmax_forward")?;

        let mut denominator_substrates = Expr::one();
        let mut denominator_products = Expr::one();
        let mut fwd_nominator = vmaxf.clone();
        let mut bwd_nominator = &vmaxf / &keq;

        for (role, stoich) in self.shape.stoichiometry.iter() {
            let x = state.reactants.get(role)?.expr();
            let km = state.linked_constant(links, role)?;
            let term = Self::saturation_term(&x, &km, *stoich);

            if *stoich < 0.0 {
                denominator_substrates = denominator_substrates * term;
                fwd_nominator = fwd_nominator * (&x / &km).pow(stoich.abs());
                bwd_nominator = bwd_nominator * km.pow(-stoich.abs());
            } else {
                denominator_products = denominator_products * term;
                bwd_nominator = bwd_nominator * x.pow(stoich.abs());
            }
        }

        let mut denominator_inhibitors = Expr::zero();
        if let Some(inhibitors) = &state.inhibitors {
            for inhibitor in inhibitors.iter() {
                let ki = state.linked_constant(links, inhibitor.role())?;
                denominator_inhibitors = denominator_inhibitors + inhibitor.expr() / ki;
            }
        }

        let common_denominator =
            denominator_substrates + denominator_products - 1.0 + denominator_inhibitors;

        let rates = ReactionRates::from_forward_backward(
            fwd_nominator / &common_denominator,
            bwd_nominator / &common_denominator,
        );

        self.state.store_rates(rates, &self.shape.stoichiometry)
    }

    fn get_full_rate_expression(&mut self) -> Result<(), KineticsError> {
        Err(KineticsError::NotSupported(format!(
            "Full rate expression of {}",
            self.shape.name
        )))
    }

    fn calculate_rate_constants(&mut self) -> Result<(), KineticsError> {
        Err(KineticsError::NotSupported(format!(
            "Rate constants of {}",
            self.shape.name
        )))
    }
}

//! Reactant and parameter sets
//!
//! Every mechanism declares a fixed list of reactant roles (`substrate1`, `product`, ...)
//! and parameter roles (`vmax_forward`, `km_substrate1`, ...). The declarations are built
//! once with [`make_reactant_set`] and [`make_parameter_set`] and then instantiated per
//! reaction into an [`ItemSet`], which can be read by role either through [`ItemSet::get`]
//! or by indexing (`set["km_product"]`).

use std::fmt::Display;
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::error::KineticsError;
use crate::expression::{Expr, Symbol};

/// Simulation types a parameter can be declared valid for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimulationTag {
    /// Full kinetic ODE simulations
    Ode,
    /// Moment / metabolic control analysis
    Mca,
    /// Quasi-steady-state rate laws
    Qssa,
}

impl Display for SimulationTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimulationTag::Ode => write!(f, "ODE"),
            SimulationTag::Mca => write!(f, "MCA"),
            SimulationTag::Qssa => write!(f, "QSSA"),
        }
    }
}

/// Entries of an [`ItemSet`] are addressed by their role name
pub trait Item {
    fn role(&self) -> &str;
}

/// A reactant role bound to the symbol of a species concentration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reactant {
    role: String,
    symbol: Symbol,
}

impl Reactant {
    pub fn new(role: impl Into<String>, symbol: Symbol) -> Self {
        Self {
            role: role.into(),
            symbol,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// The species symbol as an expression leaf
    pub fn expr(&self) -> Expr {
        Expr::from(&self.symbol)
    }
}

impl Item for Reactant {
    fn role(&self) -> &str {
        &self.role
    }
}

/// A kinetic parameter: a symbolic placeholder plus an optional numeric value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    role: String,
    symbol: Symbol,
    value: Option<f64>,
    valid_for: Vec<SimulationTag>,
}

impl Parameter {
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn expr(&self) -> Expr {
        Expr::from(&self.symbol)
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn valid_for(&self) -> &[SimulationTag] {
        &self.valid_for
    }

    pub fn is_valid_for(&self, tag: SimulationTag) -> bool {
        self.valid_for.contains(&tag)
    }
}

impl Item for Parameter {
    fn role(&self) -> &str {
        &self.role
    }
}

/// Insertion-ordered collection of items addressed by role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSet<T> {
    items: Vec<T>,
}

pub type ReactantSet = ItemSet<Reactant>;
pub type ParameterSet = ItemSet<Parameter>;

impl<T: Item> ItemSet<T> {
    fn from_items(items: Vec<T>) -> Result<Self, KineticsError> {
        check_unique(items.iter().map(|item| item.role()))?;
        Ok(Self { items })
    }

    /// Looks up an item by role
    ///
    /// # Errors
    ///
    /// Returns [`KineticsError::UnknownRole`] if the set does not declare the role.
    pub fn get(&self, role: &str) -> Result<&T, KineticsError> {
        self.items
            .iter()
            .find(|item| item.role() == role)
            .ok_or_else(|| KineticsError::UnknownRole(role.to_string()))
    }

    pub fn get_mut(&mut self, role: &str) -> Result<&mut T, KineticsError> {
        self.items
            .iter_mut()
            .find(|item| item.role() == role)
            .ok_or_else(|| KineticsError::UnknownRole(role.to_string()))
    }

    pub fn contains(&self, role: &str) -> bool {
        self.items.iter().any(|item| item.role() == role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.role())
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Mapping-style access. Panics on an undeclared role, like indexing a `HashMap`.
impl<T: Item> Index<&str> for ItemSet<T> {
    type Output = T;

    fn index(&self, role: &str) -> &T {
        match self.get(role) {
            Ok(item) => item,
            Err(_) => panic!("Role '{}' is not declared in this set", role),
        }
    }
}

impl ReactantSet {
    /// Symbol bound to the given reactant role
    pub fn symbol(&self, role: &str) -> Result<&Symbol, KineticsError> {
        Ok(self.get(role)?.symbol())
    }
}

impl ParameterSet {
    /// Sets the numeric value of a parameter
    pub fn set_value(&mut self, role: &str, value: f64) -> Result<(), KineticsError> {
        self.get_mut(role)?.value = Some(value);
        Ok(())
    }

    /// Symbolic placeholder of the given parameter role as an expression
    pub fn expr(&self, role: &str) -> Result<Expr, KineticsError> {
        Ok(self.get(role)?.expr())
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.iter().map(|p| p.symbol())
    }

    /// Numeric values of all parameters that have one, keyed by symbol
    pub fn values(&self) -> impl Iterator<Item = (&Symbol, f64)> {
        self.iter()
            .filter_map(|p| p.value().map(|value| (p.symbol(), value)))
    }

    /// Checks that every parameter carrying a value is declared valid for `tag`
    ///
    /// # Errors
    ///
    /// Returns [`KineticsError::InconsistentParameter`] for the first offending parameter.
    pub fn check_simulation_type(&self, tag: SimulationTag) -> Result<(), KineticsError> {
        match self
            .iter()
            .find(|p| p.value().is_some() && !p.is_valid_for(tag))
        {
            Some(parameter) => Err(KineticsError::InconsistentParameter {
                parameter: parameter.symbol().name().to_string(),
                simulation: tag,
            }),
            None => Ok(()),
        }
    }
}

/// Declared reactant roles of a mechanism
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReactantDeclaration {
    roles: Vec<String>,
}

/// Declared parameter roles of a mechanism with the simulation types they are valid for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterDeclaration {
    entries: Vec<(String, Vec<SimulationTag>)>,
}

/// Declares a reactant set from a list of role names
///
/// # Errors
///
/// Returns [`KineticsError::DuplicateRole`] if a role is listed twice.
pub fn make_reactant_set<I, S>(roles: I) -> Result<ReactantDeclaration, KineticsError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let roles: Vec<String> = roles.into_iter().map(Into::into).collect();
    check_unique(roles.iter().map(String::as_str))?;
    Ok(ReactantDeclaration { roles })
}

/// Declares a parameter set from `(role, valid simulation types)` pairs
///
/// # Errors
///
/// Returns [`KineticsError::DuplicateRole`] if a role is listed twice, and
/// [`KineticsError::InconsistentParameter`] for a parameter declared without any valid
/// simulation type.
pub fn make_parameter_set<I, S>(entries: I) -> Result<ParameterDeclaration, KineticsError>
where
    I: IntoIterator<Item = (S, Vec<SimulationTag>)>,
    S: Into<String>,
{
    let entries: Vec<(String, Vec<SimulationTag>)> = entries
        .into_iter()
        .map(|(role, tags)| (role.into(), tags))
        .collect();
    check_unique(entries.iter().map(|(role, _)| role.as_str()))?;

    if let Some((role, _)) = entries.iter().find(|(_, tags)| tags.is_empty()) {
        return Err(KineticsError::InconsistentParameter {
            parameter: role.clone(),
            simulation: SimulationTag::Qssa,
        });
    }

    Ok(ParameterDeclaration { entries })
}

impl ReactantDeclaration {
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Binds every declared role to a species
    ///
    /// # Arguments
    ///
    /// * `bindings` - `(role, species name)` pairs, in any order
    ///
    /// # Errors
    ///
    /// * [`KineticsError::UnknownRole`] for a binding to an undeclared role
    /// * [`KineticsError::DuplicateRole`] if a role is bound twice
    /// * [`KineticsError::MissingReactant`] if a declared role is left unbound
    pub fn bind(&self, bindings: &[(&str, &str)]) -> Result<ReactantSet, KineticsError> {
        if let Some((role, _)) = bindings
            .iter()
            .find(|(role, _)| !self.roles.iter().any(|r| r == role))
        {
            return Err(KineticsError::UnknownRole(role.to_string()));
        }
        check_unique(bindings.iter().map(|(role, _)| *role))?;

        let items = self
            .roles
            .iter()
            .map(|role| {
                bindings
                    .iter()
                    .find(|(r, _)| r == role)
                    .map(|(_, species)| Reactant::new(role.clone(), Symbol::new(*species)))
                    .ok_or_else(|| KineticsError::MissingReactant(role.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        ItemSet::from_items(items)
    }
}

impl ParameterDeclaration {
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(role, _)| role.as_str())
    }

    /// Creates the parameter set of one reaction
    ///
    /// Parameter symbols are qualified with the reaction name (`km_product_PGI`), so
    /// parameters of different reactions never share a symbol.
    pub fn instantiate(&self, reaction_name: &str) -> ParameterSet {
        let items = self
            .entries
            .iter()
            .map(|(role, tags)| Parameter {
                role: role.clone(),
                symbol: Symbol::new(format!("{}_{}", role, reaction_name)),
                value: None,
                valid_for: tags.clone(),
            })
            .collect();

        ItemSet { items }
    }
}

fn check_unique<'a>(roles: impl Iterator<Item = &'a str>) -> Result<(), KineticsError> {
    let mut seen = std::collections::HashSet::new();
    for role in roles {
        if !seen.insert(role) {
            return Err(KineticsError::DuplicateRole(role.to_string()));
        }
    }
    Ok(())
}

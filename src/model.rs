//! Kinetic Model Module
//!
//! This module provides [`KineticModel`], the container of reactions and boundary conditions
//! that synthesizes a single mass-balance ODE system from them.
//!
//! # Model assembly
//!
//! Building the right-hand side runs through the following stages:
//!
//! 1. Every reaction derives its rate law (or reuses the one it already derived)
//! 2. The per-reaction species contributions are summed per species
//! 3. Species that only influence rates (e.g. inhibitors) get a zero rate
//! 4. The boundary conditions rewrite the mapping, in the order they were added
//! 5. The parameters are pruned to those appearing in the final expressions
//! 6. The expressions are compiled into an [`OdeFunction`]
//!
//! The compiled function is cached together with the model generation it was built from.
//! Adding a reaction or a boundary condition bumps the generation, so the next solve
//! recompiles. Parametrizing does not: parameter values are bound at every solve.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{self, Display};
use std::str::FromStr;

use log::debug;
#[cfg(feature = "simulation")]
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::boundary::{apply_boundaries, BoundaryCondition};
use crate::error::KineticsError;
use crate::expression::{Expr, Symbol};
use crate::itemsets::SimulationTag;
use crate::mechanisms::{Expressions, KineticMechanism};
use crate::reaction::{ParameterValues, Reaction};

#[cfg(feature = "simulation")]
use crate::simulation::{
    error::SimulationError,
    integrator::Integrator,
    ode_fun::OdeFunction,
    setup::SolverOptions,
    solution::{solve_ode, Solution},
};

/// Which rate laws the right-hand side is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationType {
    /// Quasi-steady-state rate laws
    #[default]
    Qssa,
    /// Total quasi-steady-state rate laws
    Tqssa,
    /// Detailed elementary-step rate laws
    Full,
}

impl SimulationType {
    /// Parameter validity tag checked for this simulation type
    pub fn tag(&self) -> SimulationTag {
        match self {
            SimulationType::Qssa | SimulationType::Tqssa => SimulationTag::Qssa,
            SimulationType::Full => SimulationTag::Ode,
        }
    }
}

impl Display for SimulationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationType::Qssa => write!(f, "qssa"),
            SimulationType::Tqssa => write!(f, "tqssa"),
            SimulationType::Full => write!(f, "full"),
        }
    }
}

impl FromStr for SimulationType {
    type Err = KineticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "qssa" => Ok(SimulationType::Qssa),
            "tqssa" => Ok(SimulationType::Tqssa),
            "full" | "elementary" => Ok(SimulationType::Full),
            _ => Err(KineticsError::NotSupported(format!(
                "Simulation type '{}'",
                s
            ))),
        }
    }
}

/// Initial concentrations, either in species order or by species name
#[derive(Debug, Clone, PartialEq)]
pub enum InitialState {
    Vector(Vec<f64>),
    Named(HashMap<String, f64>),
}

impl From<Vec<f64>> for InitialState {
    fn from(values: Vec<f64>) -> Self {
        InitialState::Vector(values)
    }
}

impl From<&[f64]> for InitialState {
    fn from(values: &[f64]) -> Self {
        InitialState::Vector(values.to_vec())
    }
}

impl From<HashMap<String, f64>> for InitialState {
    fn from(values: HashMap<String, f64>) -> Self {
        InitialState::Named(values)
    }
}

impl From<&HashMap<String, f64>> for InitialState {
    fn from(values: &HashMap<String, f64>) -> Self {
        InitialState::Named(values.clone())
    }
}

/// The symbolic ODE system of a model, before compilation
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledSystem {
    /// Species → net production rate, in canonical species order
    pub expressions: Expressions,
    /// Parameter symbols appearing in the expressions, sorted by name
    pub parameters: Vec<Symbol>,
}

impl AssembledSystem {
    pub fn variables(&self) -> Vec<Symbol> {
        self.expressions.keys().cloned().collect()
    }
}

#[cfg(feature = "simulation")]
struct CachedRhs {
    generation: u64,
    simulation_type: SimulationType,
    function: OdeFunction,
}

/// A named collection of reactions and boundary conditions
#[derive(Default)]
pub struct KineticModel {
    reactions: Vec<Reaction>,
    boundaries: Vec<Box<dyn BoundaryCondition>>,
    generation: u64,
    #[cfg(feature = "simulation")]
    rhs: Option<CachedRhs>,
    rhs_builds: usize,
}

impl KineticModel {
    /// Creates a model from reactions and boundary conditions
    ///
    /// # Errors
    ///
    /// Returns [`KineticsError::DuplicateName`] if two reactions share a name.
    pub fn new(
        reactions: Vec<Reaction>,
        boundaries: Vec<Box<dyn BoundaryCondition>>,
    ) -> Result<Self, KineticsError> {
        let mut model = Self::default();
        for reaction in reactions {
            model.add_reaction(reaction)?;
        }
        if !boundaries.is_empty() {
            model.boundaries = boundaries;
            model.generation += 1;
        }
        Ok(model)
    }

    /// Adds a reaction and marks the compiled right-hand side as stale
    ///
    /// # Errors
    ///
    /// Returns [`KineticsError::DuplicateName`] if a reaction with the same name exists.
    pub fn add_reaction(&mut self, reaction: Reaction) -> Result<(), KineticsError> {
        if self.reaction(reaction.name()).is_some() {
            return Err(KineticsError::DuplicateName(reaction.name().to_string()));
        }

        debug!("Adding reaction {}", reaction.name());
        self.reactions.push(reaction);
        self.generation += 1;
        Ok(())
    }

    /// Appends a boundary condition and marks the compiled right-hand side as stale
    pub fn add_boundary<B>(&mut self, boundary: B)
    where
        B: BoundaryCondition + 'static,
    {
        self.boundaries.push(Box::new(boundary));
        self.generation += 1;
    }

    /// Assigns parameter values per reaction name
    ///
    /// All reaction names and parameter roles are checked before any reaction is touched, so
    /// a failing call leaves the model unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`KineticsError::UnknownReaction`] for a name not in the model, and
    /// [`KineticsError::UnknownRole`] for a role the reaction's mechanism does not declare.
    pub fn parametrize(
        &mut self,
        values: &HashMap<String, ParameterValues>,
    ) -> Result<(), KineticsError> {
        for (name, reaction_values) in values {
            let reaction = self
                .reaction(name)
                .ok_or_else(|| KineticsError::UnknownReaction(name.clone()))?;
            let parameters = reaction.mechanism().parameters();
            if let Some(role) = reaction_values.keys().find(|role| !parameters.contains(role)) {
                return Err(KineticsError::UnknownRole(role.clone()));
            }
        }

        for reaction in self.reactions.iter_mut() {
            if let Some(reaction_values) = values.get(reaction.name()) {
                reaction.parametrize(reaction_values)?;
            }
        }

        Ok(())
    }

    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn reaction(&self, name: &str) -> Option<&Reaction> {
        self.reactions.iter().find(|reaction| reaction.name() == name)
    }

    pub fn boundaries(&self) -> &[Box<dyn BoundaryCondition>] {
        &self.boundaries
    }

    /// Counter bumped by every structural change of the model
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of times the right-hand side was compiled
    pub fn rhs_builds(&self) -> usize {
        self.rhs_builds
    }

    /// Distinct species of all reactions (reactants and inhibitors), in canonical order
    ///
    /// Boundary conditions are not consulted. A species that only a boundary introduces (e.g.
    /// a [`ConstantFlux`](crate::boundary::ConstantFlux) on a name no reaction uses) is a
    /// state variable of the assembled system but is not listed here; use
    /// [`AssembledSystem::variables`] for the full state.
    pub fn species(&self) -> Vec<Symbol> {
        self.reactions
            .iter()
            .flat_map(|reaction| {
                let mechanism = reaction.mechanism();
                mechanism
                    .reactants()
                    .iter()
                    .chain(mechanism.inhibitors().into_iter().flat_map(|set| set.iter()))
                    .map(|reactant| reactant.symbol().clone())
                    .collect::<Vec<_>>()
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Values of all parametrized parameters, keyed by their reaction-qualified name
    pub fn parameters(&self) -> BTreeMap<String, f64> {
        self.reactions
            .iter()
            .flat_map(|reaction| reaction.mechanism().parameters().values())
            .map(|(symbol, value)| (symbol.name().to_string(), value))
            .collect()
    }

    /// Derives, aggregates and post-processes the expressions of all reactions
    ///
    /// # Errors
    ///
    /// Returns [`KineticsError::NotSupported`] for [`SimulationType::Tqssa`] and for mechanisms
    /// lacking the requested rate law, and [`KineticsError::InconsistentParameter`] if a
    /// parametrized parameter is not valid for the simulation type.
    pub fn assemble(
        &mut self,
        simulation_type: SimulationType,
    ) -> Result<AssembledSystem, KineticsError> {
        if simulation_type == SimulationType::Tqssa {
            return Err(KineticsError::NotSupported(
                "Total quasi-steady-state simulation".to_string(),
            ));
        }

        for reaction in self.reactions.iter_mut() {
            let mechanism = reaction.mechanism_mut();
            match simulation_type {
                SimulationType::Full => mechanism.get_full_rate_expression()?,
                SimulationType::Qssa if mechanism.expressions().is_none() => {
                    mechanism.get_qssa_rate_expression()?
                }
                _ => {}
            }
        }

        for reaction in self.reactions.iter() {
            reaction
                .mechanism()
                .parameters()
                .check_simulation_type(simulation_type.tag())?;
        }

        let declared: BTreeSet<Symbol> = self
            .reactions
            .iter()
            .flat_map(|reaction| reaction.mechanism().parameters().symbols().cloned())
            .collect();

        let mut expressions = aggregate_expressions(&self.reactions);
        add_passive_species(&mut expressions, &declared);
        apply_boundaries(&self.boundaries, &mut expressions);

        let parameters: Vec<Symbol> = expressions
            .values()
            .flat_map(|expr| expr.free_symbols())
            .filter(|symbol| declared.contains(symbol))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        debug!(
            "Assembled {} species and {} parameters for {} simulation",
            expressions.len(),
            parameters.len(),
            simulation_type
        );

        Ok(AssembledSystem {
            expressions,
            parameters,
        })
    }

    /// Compiles the right-hand side for `simulation_type` and caches it
    ///
    /// # Errors
    ///
    /// See [`KineticModel::assemble`]. Compilation errors are reported as
    /// [`KineticsError::Expression`].
    #[cfg(feature = "simulation")]
    pub fn build_rhs(
        &mut self,
        simulation_type: SimulationType,
    ) -> Result<&OdeFunction, KineticsError> {
        let cached = self.compile(simulation_type)?;
        Ok(&self.rhs.insert(cached).function)
    }

    #[cfg(feature = "simulation")]
    fn compile(&mut self, simulation_type: SimulationType) -> Result<CachedRhs, KineticsError> {
        let system = self.assemble(simulation_type)?;
        let variables = system.variables();
        let expressions = system.expressions.into_values().collect();
        let function = OdeFunction::new(variables, system.parameters, expressions)?;

        self.rhs_builds += 1;
        info!(
            "Compiled right-hand side with {} species (generation {})",
            function.variables().len(),
            self.generation
        );

        Ok(CachedRhs {
            generation: self.generation,
            simulation_type,
            function,
        })
    }

    /// Integrates the model over `time_span`
    ///
    /// The compiled right-hand side is reused unless the model changed structurally or was
    /// compiled for another simulation type. Current parameter values are bound before every
    /// integration.
    ///
    /// # Arguments
    ///
    /// * `time_span` - `(t0, t1)` with `t0 < t1`
    /// * `initial_state` - Initial concentrations in species order or by name
    /// * `options` - Solver configuration
    ///
    /// # Returns
    ///
    /// The trajectory at every accepted step. A failing integrator does not produce an
    /// error; the partial trajectory is returned and flagged in [`Solution::status`].
    ///
    /// # Errors
    ///
    /// Structural errors (see [`KineticModel::assemble`]), missing parameter or initial
    /// values, and invalid time spans or tolerances.
    #[cfg(feature = "simulation")]
    pub fn solve(
        &mut self,
        time_span: (f64, f64),
        initial_state: impl Into<InitialState>,
        options: &SolverOptions,
    ) -> Result<Solution, KineticsError> {
        options.validate()?;

        let mut cached = self.take_or_compile(options.simulation_type)?;
        let result = self.bind_parameters(&mut cached.function).and_then(|_| {
            Self::integrate(&cached.function, time_span, initial_state.into(), options)
        });
        self.rhs = Some(cached);
        result
    }

    /// Compiled right-hand side for `simulation_type` with the current parameter values bound
    ///
    /// Reuses the cached function under the same conditions as [`KineticModel::solve`]. The
    /// returned function can be handed to any integrator, e.g. through
    /// [`ODEProblem`](peroxide::fuga::ODEProblem).
    ///
    /// # Errors
    ///
    /// Structural errors (see [`KineticModel::assemble`]) and
    /// [`KineticsError::MissingParameterValue`].
    #[cfg(feature = "simulation")]
    pub fn rhs(&mut self, simulation_type: SimulationType) -> Result<&OdeFunction, KineticsError> {
        let mut cached = self.take_or_compile(simulation_type)?;
        let bound = self.bind_parameters(&mut cached.function);
        let cached = self.rhs.insert(cached);
        bound?;
        Ok(&cached.function)
    }

    #[cfg(feature = "simulation")]
    fn take_or_compile(
        &mut self,
        simulation_type: SimulationType,
    ) -> Result<CachedRhs, KineticsError> {
        match self.rhs.take() {
            Some(cached)
                if cached.generation == self.generation
                    && cached.simulation_type == simulation_type =>
            {
                Ok(cached)
            }
            previous => {
                let compiled = self.compile(simulation_type);
                if compiled.is_err() {
                    self.rhs = previous;
                }
                compiled
            }
        }
    }

    #[cfg(feature = "simulation")]
    fn bind_parameters(&self, function: &mut OdeFunction) -> Result<(), KineticsError> {
        let values: HashMap<&Symbol, f64> = self
            .reactions
            .iter()
            .flat_map(|reaction| reaction.mechanism().parameters().values())
            .collect();

        let parameter_values = function
            .parameters()
            .iter()
            .map(|symbol| {
                values
                    .get(symbol)
                    .copied()
                    .ok_or_else(|| KineticsError::MissingParameterValue(symbol.name().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(function.bind_parameters(parameter_values)?)
    }

    #[cfg(feature = "simulation")]
    fn integrate(
        function: &OdeFunction,
        time_span: (f64, f64),
        initial_state: InitialState,
        options: &SolverOptions,
    ) -> Result<Solution, KineticsError> {
        let y0 = initial_vector(function.variables(), initial_state)?;

        info!(
            "Solving {} species from t = {} to t = {} with {}",
            y0.len(),
            time_span.0,
            time_span.1,
            options.solver
        );

        let mut integrator = Integrator::new(function, options);
        let (time, states, status) = solve_ode(&mut integrator, time_span, y0)?;

        let species = function
            .variables()
            .iter()
            .map(|symbol| symbol.name().to_string())
            .collect();

        Ok(Solution::new(time, species, states, status))
    }
}

/// Sums the contributions of all reactions per species
fn aggregate_expressions(reactions: &[Reaction]) -> Expressions {
    let mut aggregated = Expressions::new();

    for expressions in reactions.iter().filter_map(|reaction| reaction.expressions()) {
        for (species, contribution) in expressions {
            let sum = match aggregated.remove(species) {
                Some(previous) => previous + contribution,
                None => contribution.clone(),
            };
            aggregated.insert(species.clone(), sum);
        }
    }

    aggregated
}

/// Gives species that only appear inside rate laws a zero rate
fn add_passive_species(expressions: &mut Expressions, parameters: &BTreeSet<Symbol>) {
    let passive: BTreeSet<Symbol> = expressions
        .values()
        .flat_map(|expr| expr.free_symbols())
        .filter(|symbol| !parameters.contains(symbol) && !expressions.contains_key(symbol))
        .collect();

    for species in passive {
        expressions.insert(species, Expr::zero());
    }
}

#[cfg(feature = "simulation")]
fn initial_vector(
    variables: &[Symbol],
    initial_state: InitialState,
) -> Result<Vec<f64>, KineticsError> {
    match initial_state {
        InitialState::Vector(values) => {
            if values.len() != variables.len() {
                return Err(SimulationError::StateDimensionMismatch {
                    expected: variables.len(),
                    found: values.len(),
                }
                .into());
            }
            Ok(values)
        }
        InitialState::Named(values) => {
            let known: BTreeSet<&str> = variables.iter().map(|symbol| symbol.name()).collect();
            for name in values.keys().filter(|name| !known.contains(name.as_str())) {
                warn!("Ignoring initial value of '{}', which is not a species of the model", name);
            }

            variables
                .iter()
                .map(|symbol| {
                    values
                        .get(symbol.name())
                        .copied()
                        .ok_or_else(|| KineticsError::MissingInitialValue(symbol.name().to_string()))
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{ConstantConcentration, ConstantFlux};
    use crate::mechanisms::{make_convenience_with_inhibition, ConvenienceInhibited};
    use pretty_assertions::assert_eq;

    fn inhibited_reaction(name: &str) -> Reaction {
        let shape = make_convenience_with_inhibition(&[-1.0, 1.0], &[1.0]).unwrap();
        let mechanism = ConvenienceInhibited::new(
            name,
            shape,
            &[("substrate1", "A"), ("product1", "B")],
            &[("inhibitor1", "I")],
        )
        .unwrap();
        Reaction::new(mechanism)
    }

    #[test]
    fn test_inhibitor_becomes_passive_species() {
        let mut model = KineticModel::new(vec![inhibited_reaction("R1")], vec![]).unwrap();
        let system = model.assemble(SimulationType::Qssa).unwrap();

        assert_eq!(
            system.variables(),
            vec![Symbol::new("A"), Symbol::new("B"), Symbol::new("I")]
        );
        assert_eq!(system.expressions[&Symbol::new("I")], Expr::zero());
        assert!(system
            .parameters
            .iter()
            .all(|symbol| symbol.name().ends_with("_R1")));
    }

    #[test]
    fn test_species_are_sorted_and_distinct() {
        let model = KineticModel::new(
            vec![inhibited_reaction("R2"), inhibited_reaction("R1")],
            vec![],
        )
        .unwrap();

        assert_eq!(
            model.species(),
            vec![Symbol::new("A"), Symbol::new("B"), Symbol::new("I")]
        );
    }

    #[test]
    fn test_aggregation_sums_contributions() {
        let mut model = KineticModel::new(
            vec![inhibited_reaction("R1"), inhibited_reaction("R2")],
            vec![],
        )
        .unwrap();
        let system = model.assemble(SimulationType::Qssa).unwrap();

        let rate_a = &system.expressions[&Symbol::new("A")];
        assert!(rate_a.contains(&Symbol::new("vmax_forward_R1")));
        assert!(rate_a.contains(&Symbol::new("vmax_forward_R2")));
    }

    #[test]
    fn test_boundary_bumps_generation() {
        let mut model = KineticModel::new(vec![inhibited_reaction("R1")], vec![]).unwrap();
        let generation = model.generation();

        model.add_boundary(ConstantConcentration::new("A"));

        assert_eq!(model.generation(), generation + 1);
        let system = model.assemble(SimulationType::Qssa).unwrap();
        assert_eq!(system.expressions[&Symbol::new("A")], Expr::zero());
    }

    #[test]
    fn test_parametrize_is_all_or_nothing() {
        let mut model = KineticModel::new(
            vec![inhibited_reaction("R1"), inhibited_reaction("R2")],
            vec![],
        )
        .unwrap();

        let result = model.parametrize(&HashMap::from([
            (
                "R1".to_string(),
                ParameterValues::from([("vmax_forward".to_string(), 99.0)]),
            ),
            (
                "R2".to_string(),
                ParameterValues::from([("bogus".to_string(), 1.0)]),
            ),
        ]));

        assert!(matches!(result, Err(KineticsError::UnknownRole(role)) if role == "bogus"));
        assert!(model.parameters().is_empty());
    }

    #[test]
    fn test_boundary_species_only_in_assembled_system() {
        let mut model = KineticModel::new(vec![inhibited_reaction("R1")], vec![]).unwrap();
        model.add_boundary(ConstantFlux::new("Feed", 0.5));

        assert!(!model.species().contains(&Symbol::new("Feed")));

        let system = model.assemble(SimulationType::Qssa).unwrap();
        assert!(system.variables().contains(&Symbol::new("Feed")));
        assert_eq!(system.expressions[&Symbol::new("Feed")], Expr::Number(0.5));
    }

    #[test]
    fn test_simulation_type_parsing() {
        assert_eq!("QSSA".parse::<SimulationType>().unwrap(), SimulationType::Qssa);
        assert_eq!("full".parse::<SimulationType>().unwrap(), SimulationType::Full);
        assert!("sde".parse::<SimulationType>().unwrap_err().is_not_supported());
    }

    #[test]
    fn test_tqssa_not_supported() {
        let mut model = KineticModel::new(vec![inhibited_reaction("R1")], vec![]).unwrap();

        assert!(model
            .assemble(SimulationType::Tqssa)
            .unwrap_err()
            .is_not_supported());
    }
}

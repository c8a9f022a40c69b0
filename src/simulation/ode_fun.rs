//! Compiled right-hand side of a kinetic model
//!
//! [`OdeFunction`] holds one compiled expression per state variable. The expressions are
//! rendered from the symbolic tree and parsed by `meval` once, when the function is built.
//! Before parsing, every symbol is renamed to the identifier of its slot in the concatenation
//! `[state.., parameters..]` (`v0`, `v1`, ...). Species names therefore never have to be valid
//! `meval` identifiers (`13dpg` or `D-glc` are common), and the parameter values can be
//! rebound between solves without recompiling.

use std::collections::HashMap;
use std::fmt;

use meval::ContextProvider;
use peroxide::fuga::ODEProblem;

use crate::expression::{Expr, ExpressionError, Symbol};

use super::error::SimulationError;

/// Right-hand side `dy/dt = f(t, y)` of an ODE system
pub trait RightHandSide {
    /// Number of state variables
    fn dimension(&self) -> usize;

    /// Evaluates `f(t, y)` into `dy`
    fn evaluate(&self, t: f64, y: &[f64], dy: &mut [f64]) -> Result<(), SimulationError>;
}

/// Compiled mass-balance ODE system
pub struct OdeFunction {
    variables: Vec<Symbol>,
    parameters: Vec<Symbol>,
    expressions: Vec<Expr>,
    compiled: Vec<meval::Expr>,
    parameter_values: Vec<f64>,
}

impl OdeFunction {
    /// Compiles the right-hand side
    ///
    /// # Arguments
    ///
    /// * `variables` - State variables, in state vector order
    /// * `parameters` - Parameter symbols the expressions may reference
    /// * `expressions` - Rate expression of each state variable, same order as `variables`
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::UnboundSymbol`] if an expression references a symbol that is
    /// neither a variable nor a parameter, and [`ExpressionError::Parse`] if `meval` rejects
    /// the rendered expression.
    pub fn new(
        variables: Vec<Symbol>,
        parameters: Vec<Symbol>,
        expressions: Vec<Expr>,
    ) -> Result<Self, ExpressionError> {
        let slots: HashMap<Symbol, Expr> = variables
            .iter()
            .chain(parameters.iter())
            .enumerate()
            .map(|(slot, symbol)| (symbol.clone(), Expr::Symbol(slot_identifier(slot))))
            .collect();

        let compiled = expressions
            .iter()
            .map(|expr| {
                if let Some(unbound) = expr
                    .free_symbols()
                    .into_iter()
                    .find(|symbol| !slots.contains_key(symbol))
                {
                    return Err(ExpressionError::UnboundSymbol(unbound.name().to_string()));
                }

                let rendered = expr.subs(&slots).to_string();
                rendered
                    .parse::<meval::Expr>()
                    .map_err(|err| ExpressionError::Parse {
                        expression: expr.to_string(),
                        message: err.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            parameter_values: vec![0.0; parameters.len()],
            variables,
            parameters,
            expressions,
            compiled,
        })
    }

    /// Binds the numeric parameter values, in the order of [`OdeFunction::parameters`]
    pub fn bind_parameters(&mut self, values: Vec<f64>) -> Result<(), SimulationError> {
        if values.len() != self.parameters.len() {
            return Err(SimulationError::ParameterCountMismatch {
                expected: self.parameters.len(),
                found: values.len(),
            });
        }
        self.parameter_values = values;
        Ok(())
    }

    pub fn variables(&self) -> &[Symbol] {
        &self.variables
    }

    pub fn parameters(&self) -> &[Symbol] {
        &self.parameters
    }

    pub fn parameter_values(&self) -> &[f64] {
        &self.parameter_values
    }

    /// Symbolic rate expression of a state variable
    pub fn expression(&self, variable: &str) -> Option<&Expr> {
        self.variables
            .iter()
            .position(|symbol| symbol.name() == variable)
            .map(|index| &self.expressions[index])
    }
}

impl fmt::Debug for OdeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OdeFunction")
            .field("variables", &self.variables)
            .field("parameters", &self.parameters)
            .field("parameter_values", &self.parameter_values)
            .finish()
    }
}

fn slot_identifier(slot: usize) -> Symbol {
    Symbol::new(format!("v{}", slot))
}

#[derive(Clone, Copy)]
struct SlotContext<'a> {
    state: &'a [f64],
    parameters: &'a [f64],
}

impl ContextProvider for SlotContext<'_> {
    fn get_var(&self, name: &str) -> Option<f64> {
        let slot: usize = name.strip_prefix('v')?.parse().ok()?;
        match slot.checked_sub(self.state.len()) {
            None => Some(self.state[slot]),
            Some(parameter) => self.parameters.get(parameter).copied(),
        }
    }
}

impl RightHandSide for OdeFunction {
    fn dimension(&self) -> usize {
        self.variables.len()
    }

    fn evaluate(&self, _t: f64, y: &[f64], dy: &mut [f64]) -> Result<(), SimulationError> {
        let n = self.dimension();
        if y.len() != n || dy.len() != n {
            return Err(SimulationError::StateDimensionMismatch {
                expected: n,
                found: y.len().min(dy.len()),
            });
        }

        let context = SlotContext {
            state: y,
            parameters: &self.parameter_values,
        };

        for (rate, expr) in dy.iter_mut().zip(&self.compiled) {
            *rate = expr
                .eval_with_context(context)
                .map_err(|err| SimulationError::Evaluation(err.to_string()))?;
        }

        Ok(())
    }
}

impl ODEProblem for OdeFunction {
    fn rhs(&self, t: f64, y: &[f64], dy: &mut [f64]) -> Result<(), argmin_math::Error> {
        RightHandSide::evaluate(self, t, y, dy).map_err(argmin_math::Error::from)
    }
}

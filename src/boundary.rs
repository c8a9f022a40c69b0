//! Boundary conditions
//!
//! A boundary condition rewrites entries of the aggregated species → rate mapping before
//! the right-hand side is compiled, e.g. to hold a species at a constant concentration.
//! Boundaries are applied one after the other in the order they were added to the model,
//! each seeing the effect of the previous ones.

use crate::expression::{Expr, Symbol};
use crate::mechanisms::Expressions;

pub trait BoundaryCondition {
    fn apply(&self, expressions: &mut Expressions);
}

impl<F> BoundaryCondition for F
where
    F: Fn(&mut Expressions),
{
    fn apply(&self, expressions: &mut Expressions) {
        self(expressions)
    }
}

/// Holds a species at its initial concentration by pinning its rate to zero
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantConcentration {
    species: Symbol,
}

impl ConstantConcentration {
    pub fn new(species: &str) -> Self {
        Self {
            species: Symbol::new(species),
        }
    }
}

impl BoundaryCondition for ConstantConcentration {
    fn apply(&self, expressions: &mut Expressions) {
        if let Some(rate) = expressions.get_mut(&self.species) {
            *rate = Expr::zero();
        }
    }
}

/// Replaces the rate of a species by a fixed flux, adding the species if needed
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantFlux {
    species: Symbol,
    flux: f64,
}

impl ConstantFlux {
    pub fn new(species: &str, flux: f64) -> Self {
        Self {
            species: Symbol::new(species),
            flux,
        }
    }
}

impl BoundaryCondition for ConstantFlux {
    fn apply(&self, expressions: &mut Expressions) {
        expressions.insert(self.species.clone(), Expr::Number(self.flux));
    }
}

/// Applies the boundaries in order to the expression mapping
pub(crate) fn apply_boundaries(
    boundaries: &[Box<dyn BoundaryCondition>],
    expressions: &mut Expressions,
) {
    boundaries
        .iter()
        .for_each(|boundary| boundary.apply(expressions));
}

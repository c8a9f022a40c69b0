//! Symbolic Expression Module
//!
//! This module provides the small expression tree the mechanisms use to write down their
//! rate laws. It covers exactly what the model assembly needs:
//!
//! - Composing expressions from named [`Symbol`]s and constants through the usual
//!   arithmetic operators
//! - Extracting the symbols free in an expression
//! - Substituting symbols by other expressions
//! - Evaluating an expression against numeric bindings
//! - Rendering an expression in `meval` syntax, which is the input of the compiled
//!   right-hand side
//!
//! No simplification is performed. The tree keeps exactly the structure it was built with,
//! so two derivations of the same rate law compare equal with `==`.

use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Display};
use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named symbol, used for species concentrations and kinetic parameters alike
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::new(name)
    }
}

/// Symbolic expression tree
///
/// Binary nodes own their operands. Constants are stored as `f64`, which also covers the
/// real-valued stoichiometric coefficients of the convenience kinetics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Number(f64),
    Symbol(Symbol),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
}

/// Errors raised while evaluating or compiling expressions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Symbol '{0}' has no value bound")]
    UnboundSymbol(String),
    #[error("Could not parse expression '{expression}': {message}")]
    Parse { expression: String, message: String },
}

impl Expr {
    pub fn zero() -> Self {
        Expr::Number(0.0)
    }

    pub fn one() -> Self {
        Expr::Number(1.0)
    }

    /// Raises the expression to the given power
    pub fn pow(self, exponent: impl Into<Expr>) -> Self {
        Expr::Pow(Box::new(self), Box::new(exponent.into()))
    }

    /// Sums the given expressions from left to right.
    ///
    /// An empty iterator yields the constant zero.
    pub fn sum<I: IntoIterator<Item = Expr>>(terms: I) -> Self {
        terms
            .into_iter()
            .reduce(|acc, term| acc + term)
            .unwrap_or_else(Expr::zero)
    }

    /// Returns the set of symbols appearing in the expression
    ///
    /// # Returns
    ///
    /// A sorted set of all [`Symbol`]s referenced anywhere in the tree.
    pub fn free_symbols(&self) -> BTreeSet<Symbol> {
        let mut symbols = BTreeSet::new();
        self.collect_symbols(&mut symbols);
        symbols
    }

    fn collect_symbols(&self, symbols: &mut BTreeSet<Symbol>) {
        match self {
            Expr::Number(_) => {}
            Expr::Symbol(symbol) => {
                symbols.insert(symbol.clone());
            }
            Expr::Neg(inner) => inner.collect_symbols(symbols),
            Expr::Add(lhs, rhs)
            | Expr::Sub(lhs, rhs)
            | Expr::Mul(lhs, rhs)
            | Expr::Div(lhs, rhs)
            | Expr::Pow(lhs, rhs) => {
                lhs.collect_symbols(symbols);
                rhs.collect_symbols(symbols);
            }
        }
    }

    /// Whether the given symbol appears in the expression
    pub fn contains(&self, symbol: &Symbol) -> bool {
        match self {
            Expr::Number(_) => false,
            Expr::Symbol(s) => s == symbol,
            Expr::Neg(inner) => inner.contains(symbol),
            Expr::Add(lhs, rhs)
            | Expr::Sub(lhs, rhs)
            | Expr::Mul(lhs, rhs)
            | Expr::Div(lhs, rhs)
            | Expr::Pow(lhs, rhs) => lhs.contains(symbol) || rhs.contains(symbol),
        }
    }

    /// Replaces every occurrence of the mapped symbols by their replacement expression
    ///
    /// # Arguments
    ///
    /// * `substitutions` - Mapping from symbol to the expression that takes its place
    ///
    /// # Returns
    ///
    /// A new expression; the original is left untouched.
    pub fn subs(&self, substitutions: &HashMap<Symbol, Expr>) -> Expr {
        match self {
            Expr::Number(value) => Expr::Number(*value),
            Expr::Symbol(symbol) => substitutions
                .get(symbol)
                .cloned()
                .unwrap_or_else(|| Expr::Symbol(symbol.clone())),
            Expr::Neg(inner) => Expr::Neg(Box::new(inner.subs(substitutions))),
            Expr::Add(lhs, rhs) => Expr::Add(
                Box::new(lhs.subs(substitutions)),
                Box::new(rhs.subs(substitutions)),
            ),
            Expr::Sub(lhs, rhs) => Expr::Sub(
                Box::new(lhs.subs(substitutions)),
                Box::new(rhs.subs(substitutions)),
            ),
            Expr::Mul(lhs, rhs) => Expr::Mul(
                Box::new(lhs.subs(substitutions)),
                Box::new(rhs.subs(substitutions)),
            ),
            Expr::Div(lhs, rhs) => Expr::Div(
                Box::new(lhs.subs(substitutions)),
                Box::new(rhs.subs(substitutions)),
            ),
            Expr::Pow(lhs, rhs) => Expr::Pow(
                Box::new(lhs.subs(substitutions)),
                Box::new(rhs.subs(substitutions)),
            ),
        }
    }

    /// Evaluates the expression against a symbol → value mapping
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::UnboundSymbol`] if a symbol in the tree has no value.
    pub fn evaluate(&self, bindings: &HashMap<Symbol, f64>) -> Result<f64, ExpressionError> {
        self.evaluate_with(&|symbol: &Symbol| bindings.get(symbol).copied())
    }

    /// Evaluates the expression with an arbitrary symbol lookup
    pub fn evaluate_with<F>(&self, lookup: &F) -> Result<f64, ExpressionError>
    where
        F: Fn(&Symbol) -> Option<f64>,
    {
        Ok(match self {
            Expr::Number(value) => *value,
            Expr::Symbol(symbol) => lookup(symbol)
                .ok_or_else(|| ExpressionError::UnboundSymbol(symbol.name().to_string()))?,
            Expr::Neg(inner) => -inner.evaluate_with(lookup)?,
            Expr::Add(lhs, rhs) => lhs.evaluate_with(lookup)? + rhs.evaluate_with(lookup)?,
            Expr::Sub(lhs, rhs) => lhs.evaluate_with(lookup)? - rhs.evaluate_with(lookup)?,
            Expr::Mul(lhs, rhs) => lhs.evaluate_with(lookup)? * rhs.evaluate_with(lookup)?,
            Expr::Div(lhs, rhs) => lhs.evaluate_with(lookup)? / rhs.evaluate_with(lookup)?,
            Expr::Pow(lhs, rhs) => lhs.evaluate_with(lookup)?.powf(rhs.evaluate_with(lookup)?),
        })
    }
}

/// Renders the expression fully parenthesised in `meval` syntax (`^` for powers).
impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(value) if *value < 0.0 => write!(f, "({})", value),
            Expr::Number(value) => write!(f, "{}", value),
            Expr::Symbol(symbol) => write!(f, "{}", symbol),
            Expr::Neg(inner) => write!(f, "(-{})", inner),
            Expr::Add(lhs, rhs) => write!(f, "({} + {})", lhs, rhs),
            Expr::Sub(lhs, rhs) => write!(f, "({} - {})", lhs, rhs),
            Expr::Mul(lhs, rhs) => write!(f, "({} * {})", lhs, rhs),
            Expr::Div(lhs, rhs) => write!(f, "({} / {})", lhs, rhs),
            Expr::Pow(lhs, rhs) => write!(f, "({} ^ {})", lhs, rhs),
        }
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Number(value)
    }
}

impl From<Symbol> for Expr {
    fn from(symbol: Symbol) -> Self {
        Expr::Symbol(symbol)
    }
}

impl From<&Symbol> for Expr {
    fn from(symbol: &Symbol) -> Self {
        Expr::Symbol(symbol.clone())
    }
}

impl From<&Expr> for Expr {
    fn from(expr: &Expr) -> Self {
        expr.clone()
    }
}

/// Implements a binary operator for owned and borrowed expressions, and for `f64` on the
/// left-hand side.
macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl<R: Into<Expr>> $trait<R> for Expr {
            type Output = Expr;

            fn $method(self, rhs: R) -> Expr {
                Expr::$variant(Box::new(self), Box::new(rhs.into()))
            }
        }

        impl<R: Into<Expr>> $trait<R> for &Expr {
            type Output = Expr;

            fn $method(self, rhs: R) -> Expr {
                Expr::$variant(Box::new(self.clone()), Box::new(rhs.into()))
            }
        }

        impl $trait<Expr> for f64 {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant(Box::new(Expr::Number(self)), Box::new(rhs))
            }
        }

        impl $trait<&Expr> for f64 {
            type Output = Expr;

            fn $method(self, rhs: &Expr) -> Expr {
                Expr::$variant(Box::new(Expr::Number(self)), Box::new(rhs.clone()))
            }
        }
    };
}

impl_binary_op!(Add, add, Add);
impl_binary_op!(Sub, sub, Sub);
impl_binary_op!(Mul, mul, Mul);
impl_binary_op!(Div, div, Div);

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

impl Neg for &Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self.clone()))
    }
}

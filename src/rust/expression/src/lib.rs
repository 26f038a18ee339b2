// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Unit-aware expression engine.
//!
//! Expressions are parsed into an [`parser::Expr`] tree and evaluated against a
//! caller-supplied set of [`Variables`]. Every evaluation reports the names of
//! the variables it read, which feeds the [`DependencyGraph`] used to
//! re-evaluate only the dependents of a changed value.

pub mod evaluator;
pub mod functions;
pub mod graph;
pub mod lexer;
pub mod parser;
pub mod value;

use ionpulse_units::DimensionalityError;

pub use evaluator::{Evaluation, Evaluator, Variables, constant};
pub use functions::FunctionRegistry;
pub use graph::{DependencyGraph, GraphError};
pub use value::Value;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("Unresolved identifier '{name}' at offset {offset}")]
    UnresolvedIdentifier { offset: usize, name: String },
    #[error("Unknown function '{name}' at offset {offset}")]
    UnknownFunction { offset: usize, name: String },
    #[error("Function '{name}' takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("{0}")]
    Type(String),
    #[error(transparent)]
    Dimensionality(#[from] DimensionalityError),
}

impl ExpressionError {
    /// Source offset of the failure, where one is known.
    pub fn offset(&self) -> Option<usize> {
        match self {
            ExpressionError::Syntax { offset, .. }
            | ExpressionError::UnresolvedIdentifier { offset, .. }
            | ExpressionError::UnknownFunction { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

pub type Result<T, E = ExpressionError> = std::result::Result<T, E>;

/// Evaluate `text` with default settings.
pub fn evaluate(text: &str, variables: &dyn Variables) -> Result<Evaluation> {
    Evaluator::new().evaluate(text, variables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    proptest! {
        #[test]
        fn test_evaluation_is_deterministic(
            a in -1000i64..1000,
            b in 1i64..1000,
            op in prop::sample::select(vec!["+", "-", "*", "/", "%", "<", "=="]),
            unit in prop::sample::select(vec!["", " MHz", " us", " V"]),
        ) {
            let mut variables = HashMap::new();
            variables.insert("a".to_string(), Value::Int(a));
            variables.insert("b".to_string(), Value::Int(b));
            let text = format!("a * 1{unit} {op} b * 1{unit}");
            let first = evaluate(&text, &variables);
            let second = evaluate(&text, &variables);
            prop_assert_eq!(first, second);
        }
    }
}

// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Global variables whose values may be expressions over other globals.

use expression::{DependencyGraph, Evaluator, ExpressionError, GraphError};
use indexmap::IndexMap;
use ionpulse_units::Quantity;

use crate::context::evaluate_quantity;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error(transparent)]
    Expression(#[from] ExpressionError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Values plus the expressions that define some of them.
///
/// Changing a value re-evaluates exactly the transitive dependents of that
/// value, in dependency order.
#[derive(Debug, Clone, Default)]
pub struct ParameterTable {
    values: IndexMap<String, Quantity>,
    expressions: IndexMap<String, String>,
    graph: DependencyGraph,
}

impl ParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Quantity> {
        self.values.get(name)
    }

    pub fn values(&self) -> &IndexMap<String, Quantity> {
        &self.values
    }

    pub fn expression(&self, name: &str) -> Option<&str> {
        self.expressions.get(name).map(String::as_str)
    }

    /// Set a plain value; returns every name whose value changed.
    pub fn set_value(&mut self, name: &str, value: Quantity) -> Result<Vec<String>, ParameterError> {
        self.expressions.shift_remove(name);
        self.graph.clear_dependencies(name);
        self.values.insert(name.to_string(), value);
        self.propagate(name)
    }

    /// Define `name` by an expression; a dependency cycle leaves the table untouched.
    pub fn set_expression(&mut self, name: &str, text: &str) -> Result<Vec<String>, ParameterError> {
        let evaluation = Evaluator::new().evaluate(text, &self.values)?;
        self.graph
            .set_dependencies(name, evaluation.dependencies.iter().map(String::as_str))?;
        let value = evaluate_quantity(text, &self.values)?;
        self.expressions.insert(name.to_string(), text.to_string());
        self.values.insert(name.to_string(), value);
        self.propagate(name)
    }

    fn propagate(&mut self, changed: &str) -> Result<Vec<String>, ParameterError> {
        let order: Vec<String> = self
            .graph
            .propagation_order(changed)
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut updated = vec![changed.to_string()];
        for name in order {
            let Some(text) = self.expressions.get(&name) else {
                continue;
            };
            let value = evaluate_quantity(text, &self.values)?;
            if self.values.get(&name) != Some(&value) {
                self.values.insert(name.clone(), value);
                updated.push(name);
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ionpulse_units::q;

    #[test]
    fn test_wave_reaches_only_dependents() {
        let mut table = ParameterTable::new();
        table.set_value("carrier", q(10.0, "MHz").unwrap()).unwrap();
        table.set_value("detuning", q(1.0, "MHz").unwrap()).unwrap();
        table.set_value("other", q(1.0, "us").unwrap()).unwrap();
        table.set_expression("probe", "carrier + detuning").unwrap();
        table.set_expression("probe2", "probe * 2").unwrap();

        let updated = table.set_value("detuning", q(2.0, "MHz").unwrap()).unwrap();
        assert_eq!(updated, ["detuning", "probe", "probe2"]);
        assert_eq!(table.get("probe2"), Some(&q(24.0, "MHz").unwrap()));

        let updated = table.set_value("other", q(2.0, "us").unwrap()).unwrap();
        assert_eq!(updated, ["other"]);
    }

    #[test]
    fn test_cycle_leaves_table_untouched() {
        let mut table = ParameterTable::new();
        table.set_value("a", Quantity::dimensionless(1.0)).unwrap();
        table.set_expression("b", "a + 1").unwrap();
        assert!(matches!(
            table.set_expression("a", "b + 1"),
            Err(ParameterError::Graph(_))
        ));
        assert_eq!(table.expression("a"), None);
        assert_eq!(table.get("a"), Some(&Quantity::dimensionless(1.0)));
    }
}

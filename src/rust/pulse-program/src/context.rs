// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Named bundles of variable values with parent inheritance.
//!
//! A child context may mark a variable as using its parent's value. Values are
//! materialized when a context is resolved: ancestors first, then the child's
//! own entries on top. Parent links are checked for cycles when they are set.

use std::path::PathBuf;

use expression::{Evaluator, ExpressionError, Value};
use indexmap::IndexMap;
use ionpulse_units::Quantity;

use crate::PulseProgram;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ContextError {
    #[error("Unknown context '{0}'")]
    Unknown(String),
    #[error("Making '{parent}' the parent of '{child}' would create a cycle")]
    Cycle { child: String, parent: String },
    #[error("Variable '{variable}' of context '{context}' uses the parent value, but no ancestor defines it")]
    MissingParentValue { context: String, variable: String },
    #[error("Expression of '{variable}' in context '{context}': {source}")]
    Expression {
        context: String,
        variable: String,
        source: ExpressionError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextValue {
    pub value: Quantity,
    /// Evaluated against the global variables when the context is resolved.
    pub expression: Option<String>,
    pub use_parent_value: bool,
    pub enabled: bool,
}

impl ContextValue {
    pub fn new(value: Quantity) -> Self {
        ContextValue {
            value,
            expression: None,
            use_parent_value: false,
            enabled: true,
        }
    }

    pub fn from_parent() -> Self {
        ContextValue {
            use_parent_value: true,
            ..ContextValue::new(Quantity::dimensionless(0.0))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    pub name: String,
    pub variables: IndexMap<String, ContextValue>,
    pub shutters: IndexMap<String, u64>,
    pub triggers: IndexMap<String, u64>,
    pub counters: IndexMap<String, u64>,
    pub source_file: Option<PathBuf>,
    pub ram_file: Option<PathBuf>,
    parent: Option<String>,
}

impl Context {
    pub fn new(name: &str) -> Self {
        Context {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }
}

/// Flat view of a context with all inheritance applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedContext {
    pub values: IndexMap<String, Quantity>,
    pub disabled: Vec<String>,
    pub shutters: IndexMap<String, u64>,
    pub triggers: IndexMap<String, u64>,
    pub counters: IndexMap<String, u64>,
    pub source_file: Option<PathBuf>,
    pub ram_file: Option<PathBuf>,
}

impl ResolvedContext {
    /// Push the resolved values into a program; returns the changed data words.
    pub fn apply(&self, program: &mut PulseProgram) -> Vec<(usize, u64)> {
        let mut changed = program.update_variables(&self.values);
        for masks in [&self.shutters, &self.triggers, &self.counters] {
            for (slot, word) in program.update_masks(masks) {
                changed.retain(|(changed_slot, _)| *changed_slot != slot);
                changed.push((slot, word));
            }
        }
        for name in self.values.keys() {
            let enabled = !self.disabled.contains(name);
            if let Some(word) = program.set_enabled(name, enabled) {
                changed.retain(|(address, _)| *address != word.0);
                changed.push(word);
            }
        }
        changed
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextStore {
    contexts: IndexMap<String, Context>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, context: Context) {
        self.contexts.insert(context.name.clone(), context);
    }

    pub fn get(&self, name: &str) -> Option<&Context> {
        self.contexts.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Context> {
        self.contexts.get_mut(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.contexts.keys().map(String::as_str)
    }

    fn ancestors_of(&self, name: &str) -> impl Iterator<Item = &Context> {
        let mut next = self.contexts.get(name);
        std::iter::from_fn(move || {
            let current = next?;
            next = current.parent.as_deref().and_then(|p| self.contexts.get(p));
            Some(current)
        })
    }

    pub fn set_parent(&mut self, child: &str, parent: Option<&str>) -> Result<(), ContextError> {
        if !self.contexts.contains_key(child) {
            return Err(ContextError::Unknown(child.to_string()));
        }
        if let Some(parent) = parent {
            if !self.contexts.contains_key(parent) {
                return Err(ContextError::Unknown(parent.to_string()));
            }
            if self.ancestors_of(parent).any(|ctx| ctx.name == child) {
                return Err(ContextError::Cycle {
                    child: child.to_string(),
                    parent: parent.to_string(),
                });
            }
        }
        if let Some(context) = self.contexts.get_mut(child) {
            context.parent = parent.map(str::to_string);
        }
        Ok(())
    }

    /// Materialize the values of `name`, evaluating expressions with `globals`.
    pub fn resolve(
        &self,
        name: &str,
        globals: &IndexMap<String, Quantity>,
    ) -> Result<ResolvedContext, ContextError> {
        let context = self
            .contexts
            .get(name)
            .ok_or_else(|| ContextError::Unknown(name.to_string()))?;
        let chain: Vec<&Context> = self.ancestors_of(name).collect();
        let mut resolved = ResolvedContext {
            source_file: context.source_file.clone(),
            ram_file: context.ram_file.clone(),
            ..Default::default()
        };
        // Oldest ancestor first so that descendants override.
        for ctx in chain.iter().rev() {
            for (variable, entry) in &ctx.variables {
                if entry.use_parent_value {
                    if !resolved.values.contains_key(variable) {
                        return Err(ContextError::MissingParentValue {
                            context: ctx.name.clone(),
                            variable: variable.clone(),
                        });
                    }
                    continue;
                }
                let value = match &entry.expression {
                    Some(text) => evaluate_quantity(text, globals).map_err(|source| {
                        ContextError::Expression {
                            context: ctx.name.clone(),
                            variable: variable.clone(),
                            source,
                        }
                    })?,
                    None => entry.value.clone(),
                };
                resolved.values.insert(variable.clone(), value);
                resolved.disabled.retain(|name| name != variable);
                if !entry.enabled {
                    resolved.disabled.push(variable.clone());
                }
            }
            resolved.shutters.extend(ctx.shutters.iter().map(|(k, v)| (k.clone(), *v)));
            resolved.triggers.extend(ctx.triggers.iter().map(|(k, v)| (k.clone(), *v)));
            resolved.counters.extend(ctx.counters.iter().map(|(k, v)| (k.clone(), *v)));
            if resolved.source_file.is_none() {
                resolved.source_file.clone_from(&ctx.source_file);
            }
        }
        Ok(resolved)
    }
}

pub(crate) fn evaluate_quantity(
    text: &str,
    variables: &IndexMap<String, Quantity>,
) -> Result<Quantity, ExpressionError> {
    match Evaluator::new().evaluate(text, variables)?.value {
        Value::Quantity(q) => Ok(q),
        other => Ok(Quantity::dimensionless(other.to_f64("value")?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ionpulse_units::q;

    fn store() -> ContextStore {
        let mut store = ContextStore::new();
        let mut base = Context::new("base");
        base.variables.insert("freq".into(), ContextValue::new(q(100.0, "MHz").unwrap()));
        base.variables.insert("delay".into(), ContextValue::new(q(1.0, "us").unwrap()));
        base.shutters.insert("shutters".into(), 0b01);
        let mut child = Context::new("child");
        child.variables.insert("freq".into(), ContextValue::from_parent());
        child.variables.insert("delay".into(), ContextValue::new(q(2.0, "us").unwrap()));
        child.shutters.insert("shutters".into(), 0b10);
        store.insert(base);
        store.insert(child);
        store
    }

    #[test]
    fn test_child_inherits_and_overrides() {
        let mut store = store();
        store.set_parent("child", Some("base")).unwrap();
        let resolved = store.resolve("child", &IndexMap::new()).unwrap();
        assert_eq!(resolved.values["freq"], q(100.0, "MHz").unwrap());
        assert_eq!(resolved.values["delay"], q(2.0, "us").unwrap());
        assert_eq!(resolved.shutters["shutters"], 0b10);
    }

    #[test]
    fn test_missing_parent_value() {
        let store = store();
        assert!(matches!(
            store.resolve("child", &IndexMap::new()),
            Err(ContextError::MissingParentValue { .. })
        ));
    }

    #[test]
    fn test_cycles_rejected_at_set_time() {
        let mut store = store();
        store.insert(Context::new("grandchild"));
        store.set_parent("child", Some("base")).unwrap();
        store.set_parent("grandchild", Some("child")).unwrap();
        assert_eq!(
            store.set_parent("base", Some("grandchild")),
            Err(ContextError::Cycle {
                child: "base".into(),
                parent: "grandchild".into()
            })
        );
        assert!(store.set_parent("base", Some("base")).is_err());
        assert!(store.set_parent("base", Some("missing")).is_err());
    }

    #[test]
    fn test_apply_writes_full_width_masks() {
        let mut program = PulseProgram::default();
        program
            .load_text("a.pp", "var gain 1\nvar shutters 0, shutter\nSHUTTERMASK shutters\n")
            .unwrap();
        let mut resolved = ResolvedContext::default();
        resolved.shutters.insert("shutters".into(), 0x8000_0000_0000_0001);
        resolved.values.insert("gain".into(), Quantity::dimensionless(2.0));
        let changed = resolved.apply(&mut program);
        assert_eq!(changed, vec![(0, 2), (1, 0x8000_0000_0000_0001)]);
        assert_eq!(program.data()[1], 0x8000_0000_0000_0001);
    }

    #[test]
    fn test_expression_values() {
        let mut store = ContextStore::new();
        let mut ctx = Context::new("ctx");
        ctx.variables.insert(
            "freq".into(),
            ContextValue {
                expression: Some("carrier + 2 MHz".into()),
                ..ContextValue::new(Quantity::dimensionless(0.0))
            },
        );
        store.insert(ctx);
        let mut globals = IndexMap::new();
        globals.insert("carrier".to_string(), q(10.0, "MHz").unwrap());
        let resolved = store.resolve("ctx", &globals).unwrap();
        assert_eq!(resolved.values["freq"], q(12.0, "MHz").unwrap());
    }
}

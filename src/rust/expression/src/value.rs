// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;
use ionpulse_units::Quantity;

use crate::{ExpressionError, Result};

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Quantity(Quantity),
    Str(String),
    List(Vec<Value>),
    Dict(IndexMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Quantity(_) => "quantity",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Quantity(_)
        )
    }

    /// The value as a quantity; plain numbers become dimensionless.
    pub fn to_quantity(&self) -> Result<Quantity> {
        match self {
            Value::Bool(b) => Ok(Quantity::dimensionless(f64::from(u8::from(*b)))),
            Value::Int(i) => Ok(Quantity::dimensionless(*i as f64)),
            Value::Float(f) => Ok(Quantity::dimensionless(*f)),
            Value::Quantity(q) => Ok(q.clone()),
            other => Err(ExpressionError::Type(format!(
                "expected a number, got {}",
                other.type_name()
            ))),
        }
    }

    /// A plain number, rejecting quantities that carry a dimension.
    pub fn to_f64(&self, op: &str) -> Result<f64> {
        Ok(self.to_quantity()?.require_dimensionless(op)?)
    }

    pub fn to_i64(&self) -> Result<i64> {
        match self {
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Int(i) => Ok(*i),
            Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            Value::Quantity(q) if q.is_plain_number() && q.magnitude().fract() == 0.0 => {
                Ok(q.magnitude() as i64)
            }
            other => Err(ExpressionError::Type(format!(
                "expected an integer, got {other}"
            ))),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Quantity(q) => q.magnitude() != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Dict(d) => !d.is_empty(),
        }
    }

    /// Collapse a dimensionless, unit-less quantity into a float.
    pub(crate) fn from_quantity(q: Quantity) -> Value {
        if q.is_plain_number() {
            Value::Float(q.magnitude())
        } else {
            Value::Quantity(q)
        }
    }

    pub(crate) fn compare(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                Ok(a.to_quantity()?.try_cmp(&b.to_quantity()?)?)
            }
            (a, b) => Err(ExpressionError::Type(format!(
                "cannot compare {} with {}",
                a.type_name(),
                b.type_name()
            ))),
        }
    }

    /// Equality with numeric promotion; incompatible dimensions are unequal.
    pub(crate) fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_numeric() && b.is_numeric() => {
                a.compare(b).is_ok_and(|ord| ord == Ordering::Equal)
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (a, b) => a == b,
        }
    }
}

impl From<Quantity> for Value {
    fn from(value: Quantity) -> Self {
        Value::Quantity(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Quantity(q) => write!(f, "{q}"),
            Value::Str(s) => write!(f, "'{s}'"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Dict(items) => {
                write!(f, "{{")?;
                for (i, (key, item)) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{key}': {item}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ionpulse_units::q;

    #[test]
    fn test_loose_eq_promotes() {
        assert!(Value::Int(2).loose_eq(&Value::Float(2.0)));
        assert!(Value::from(q(1.0, "kHz").unwrap()).loose_eq(&Value::from(q(1000.0, "Hz").unwrap())));
        assert!(!Value::from(q(1.0, "V").unwrap()).loose_eq(&Value::from(q(1.0, "A").unwrap())));
    }

    #[test]
    fn test_to_i64() {
        assert_eq!(Value::Float(3.0).to_i64().unwrap(), 3);
        assert!(Value::Float(3.5).to_i64().is_err());
        assert!(Value::from(q(3.0, "s").unwrap()).to_i64().is_err());
    }

    #[test]
    fn test_display() {
        let list = Value::List(vec![Value::Int(1), Value::Bool(true), Value::from("a")]);
        assert_eq!(list.to_string(), "[1, True, 'a']");
    }
}

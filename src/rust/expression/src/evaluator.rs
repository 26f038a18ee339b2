// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet, HashMap};

use indexmap::IndexMap;
use ionpulse_units::Quantity;

use crate::functions::{FunctionRegistry, call_builtin};
use crate::parser::{BinaryOp, Expr, ExprKind, UnaryOp, parse};
use crate::value::Value;
use crate::{ExpressionError, Result};

/// Source of identifier values supplied by the caller.
pub trait Variables {
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl Variables for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Variables for IndexMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Variables for BTreeMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Variables for HashMap<String, Quantity> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned().map(Value::from_quantity)
    }
}

impl Variables for IndexMap<String, Quantity> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned().map(Value::from_quantity)
    }
}

/// No variables at all.
impl Variables for () {
    fn lookup(&self, _name: &str) -> Option<Value> {
        None
    }
}

pub fn constant(name: &str) -> Option<Value> {
    Some(match name {
        "pi" => Value::Float(std::f64::consts::PI),
        "e" => Value::Float(std::f64::consts::E),
        "tau" => Value::Float(std::f64::consts::TAU),
        "inf" => Value::Float(f64::INFINITY),
        "nan" => Value::Float(f64::NAN),
        "True" => Value::Bool(true),
        "False" => Value::Bool(false),
        _ => return None,
    })
}

/// Value of an expression plus the caller variables it read.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub value: Value,
    pub dependencies: BTreeSet<String>,
}

/// Expression evaluator.
///
/// Identifiers resolve against the caller's variables first, then the
/// constants. Functions resolve against the caller-supplied registry, then the
/// builtins, then the user-function registry.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    /// Bare integer literals evaluate to floats.
    pub use_float: bool,
    pub functions: FunctionRegistry,
    pub user_functions: FunctionRegistry,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_float(use_float: bool) -> Self {
        Evaluator {
            use_float,
            ..Default::default()
        }
    }

    pub fn evaluate(&self, text: &str, variables: &dyn Variables) -> Result<Evaluation> {
        let expr = parse(text)?;
        self.evaluate_expr(&expr, variables)
    }

    pub fn evaluate_expr(&self, expr: &Expr, variables: &dyn Variables) -> Result<Evaluation> {
        let mut dependencies = BTreeSet::new();
        let value = self.eval(expr, variables, &mut dependencies)?;
        Ok(Evaluation {
            value,
            dependencies,
        })
    }

    fn eval(
        &self,
        expr: &Expr,
        variables: &dyn Variables,
        dependencies: &mut BTreeSet<String>,
    ) -> Result<Value> {
        match &expr.kind {
            ExprKind::Int(i) if self.use_float => Ok(Value::Float(*i as f64)),
            ExprKind::Int(i) => Ok(Value::Int(*i)),
            ExprKind::Float(f) => Ok(Value::Float(*f)),
            ExprKind::Quantity(magnitude, unit) => {
                Ok(Value::Quantity(Quantity::with_unit(*magnitude, unit.clone())))
            }
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Ident(name) => {
                if let Some(value) = variables.lookup(name) {
                    dependencies.insert(name.clone());
                    return Ok(value);
                }
                constant(name).ok_or_else(|| ExpressionError::UnresolvedIdentifier {
                    offset: expr.offset,
                    name: name.clone(),
                })
            }
            ExprKind::List(items) => items
                .iter()
                .map(|item| self.eval(item, variables, dependencies))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            ExprKind::Dict(items) => {
                let mut dict = IndexMap::new();
                for (key, item) in items {
                    let key = match self.eval(key, variables, dependencies)? {
                        Value::Str(s) => s,
                        other => other.to_string(),
                    };
                    dict.insert(key, self.eval(item, variables, dependencies)?);
                }
                Ok(Value::Dict(dict))
            }
            ExprKind::Unary(op, operand) => {
                let value = self.eval(operand, variables, dependencies)?;
                unary(*op, value)
            }
            ExprKind::Binary(BinaryOp::And, lhs, rhs) => {
                let lhs = self.eval(lhs, variables, dependencies)?;
                if !lhs.is_truthy() {
                    return Ok(lhs);
                }
                self.eval(rhs, variables, dependencies)
            }
            ExprKind::Binary(BinaryOp::Or, lhs, rhs) => {
                let lhs = self.eval(lhs, variables, dependencies)?;
                if lhs.is_truthy() {
                    return Ok(lhs);
                }
                self.eval(rhs, variables, dependencies)
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, variables, dependencies)?;
                let rhs = self.eval(rhs, variables, dependencies)?;
                binary(*op, lhs, rhs)
            }
            ExprKind::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, variables, dependencies))
                    .collect::<Result<Vec<_>>>()?;
                self.call(name, &args, expr.offset)
            }
            ExprKind::Index(target, index) => {
                let target = self.eval(target, variables, dependencies)?;
                let index = self.eval(index, variables, dependencies)?;
                subscript(target, index)
            }
        }
    }

    fn call(&self, name: &str, args: &[Value], offset: usize) -> Result<Value> {
        if let Some(function) = self.functions.get(name) {
            return function(args);
        }
        if let Some(result) = call_builtin(name, args) {
            return result;
        }
        if let Some(function) = self.user_functions.get(name) {
            return function(args);
        }
        Err(ExpressionError::UnknownFunction {
            offset,
            name: name.to_string(),
        })
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value> {
    match (op, value) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOp::Plus, value) if value.is_numeric() => Ok(value),
        (UnaryOp::Neg, Value::Int(i)) => Ok(i
            .checked_neg()
            .map_or(Value::Float(-(i as f64)), Value::Int)),
        (UnaryOp::Neg, Value::Bool(b)) => Ok(Value::Int(-i64::from(b))),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, Value::Quantity(q)) => Ok(Value::Quantity(-q)),
        (_, value) => Err(ExpressionError::Type(format!(
            "bad operand type for unary operator: {}",
            value.type_name()
        ))),
    }
}

fn python_mod(a: i64, b: i64) -> Result<i64> {
    let r = a
        .checked_rem(b)
        .ok_or_else(|| ExpressionError::Type(format!("integer overflow in {a} % {b}")))?;
    Ok(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
}

fn int_binary(op: BinaryOp, a: i64, b: i64) -> Result<Value> {
    let checked = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(ExpressionError::Type("division by zero".to_string()));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinaryOp::Rem => {
            if b == 0 {
                return Err(ExpressionError::Type("modulo by zero".to_string()));
            }
            Some(python_mod(a, b)?)
        }
        BinaryOp::Pow if b >= 0 => u32::try_from(b).ok().and_then(|b| a.checked_pow(b)),
        BinaryOp::Pow => return Ok(Value::Float((a as f64).powf(b as f64))),
        _ => unreachable!("comparison and logic operators are handled by the caller"),
    };
    // Overflow falls back to floating point.
    Ok(checked.map_or_else(|| float_binary(op, a as f64, b as f64), Value::Int))
}

fn float_binary(op: BinaryOp, a: f64, b: f64) -> Value {
    Value::Float(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a - b * (a / b).floor(),
        BinaryOp::Pow => a.powf(b),
        _ => unreachable!("comparison and logic operators are handled by the caller"),
    })
}

fn quantity_binary(op: BinaryOp, a: &Quantity, b: &Quantity) -> Result<Value> {
    let result = match op {
        BinaryOp::Add => a.try_add(b)?,
        BinaryOp::Sub => a.try_sub(b)?,
        BinaryOp::Mul => a.try_mul(b)?,
        BinaryOp::Div => a.try_div(b)?,
        BinaryOp::Rem => a.try_rem(b)?,
        BinaryOp::Pow => {
            let exponent = b.require_dimensionless("pow")?;
            if exponent.fract() == 0.0 {
                a.powi(exponent as i64)?
            } else {
                a.powf(exponent)?
            }
        }
        _ => unreachable!("comparison and logic operators are handled by the caller"),
    };
    Ok(Value::from_quantity(result))
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    let ordering = |expected: fn(std::cmp::Ordering) -> bool| -> Result<Value> {
        Ok(Value::Bool(expected(lhs.compare(&rhs)?)))
    };
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(lhs.loose_eq(&rhs))),
        BinaryOp::Ne => return Ok(Value::Bool(!lhs.loose_eq(&rhs))),
        BinaryOp::Lt => return ordering(std::cmp::Ordering::is_lt),
        BinaryOp::Le => return ordering(std::cmp::Ordering::is_le),
        BinaryOp::Gt => return ordering(std::cmp::Ordering::is_gt),
        BinaryOp::Ge => return ordering(std::cmp::Ordering::is_ge),
        _ => {}
    }
    match (op, &lhs, &rhs) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::Str(format!("{a}{b}"))),
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            return Ok(Value::List(a.iter().chain(b).cloned().collect()));
        }
        _ => {}
    }
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => int_binary(op, a, b),
        (Value::Bool(a), Value::Int(b)) => int_binary(op, i64::from(a), b),
        (Value::Int(a), Value::Bool(b)) => int_binary(op, a, i64::from(b)),
        (Value::Bool(a), Value::Bool(b)) => int_binary(op, i64::from(a), i64::from(b)),
        (lhs @ Value::Quantity(_), rhs) | (lhs, rhs @ Value::Quantity(_)) => {
            quantity_binary(op, &lhs.to_quantity()?, &rhs.to_quantity()?)
        }
        (lhs, rhs) if lhs.is_numeric() && rhs.is_numeric() => Ok(float_binary(
            op,
            lhs.to_f64("arithmetic")?,
            rhs.to_f64("arithmetic")?,
        )),
        (lhs, rhs) => Err(ExpressionError::Type(format!(
            "unsupported operand types for {op:?}: {} and {}",
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn subscript(target: Value, index: Value) -> Result<Value> {
    match (&target, &index) {
        (Value::List(items), _) => {
            let i = index.to_i64()?;
            let position = if i < 0 { items.len() as i64 + i } else { i };
            usize::try_from(position)
                .ok()
                .and_then(|p| items.get(p))
                .cloned()
                .ok_or_else(|| ExpressionError::Type(format!("list index {i} out of range")))
        }
        (Value::Dict(items), Value::Str(key)) => items
            .get(key)
            .cloned()
            .ok_or_else(|| ExpressionError::Type(format!("key '{key}' not found"))),
        (Value::Dict(items), key) => items
            .get(&key.to_string())
            .cloned()
            .ok_or_else(|| ExpressionError::Type(format!("key {key} not found"))),
        _ => Err(ExpressionError::Type(format!(
            "{} is not subscriptable",
            target.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ionpulse_units::q;

    fn eval(text: &str) -> Result<Value> {
        Evaluator::new().evaluate(text, &()).map(|e| e.value)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Int(7));
        assert_eq!(eval("2^10").unwrap(), Value::Int(1024));
        assert_eq!(eval("-2**2").unwrap(), Value::Int(-4));
        assert_eq!(eval("7 / 2").unwrap(), Value::Float(3.5));
        assert_eq!(eval("-7 % 3").unwrap(), Value::Int(2));
        assert_eq!(eval("0x10 + 1").unwrap(), Value::Int(17));
    }

    #[test]
    fn test_integer_overflow_is_an_error() {
        assert!(matches!(
            eval("0x8000000000000000 % -1"),
            Err(ExpressionError::Type(_))
        ));
        assert_eq!(eval("0x8000000000000000 % 7").unwrap(), Value::Int(i64::MIN.rem_euclid(7)));
    }

    #[test]
    fn test_use_float() {
        let evaluator = Evaluator::with_float(true);
        assert_eq!(
            evaluator.evaluate("3", &()).unwrap().value,
            Value::Float(3.0)
        );
    }

    #[test]
    fn test_quantities() {
        assert_eq!(
            eval("10 MHz + 500 kHz").unwrap(),
            Value::from(q(10.5, "MHz").unwrap())
        );
        assert_eq!(eval("1 GHz * 1 ns").unwrap(), Value::Float(1.0));
        assert_eq!(eval("1 hr / 30 min").unwrap(), Value::Float(2.0));
        assert!(matches!(
            eval("1 V + 1 A"),
            Err(ExpressionError::Dimensionality(_))
        ));
        assert_eq!(
            eval("2 * 3 us").unwrap(),
            Value::from(q(6.0, "us").unwrap())
        );
    }

    #[test]
    fn test_comparisons_and_logic() {
        assert_eq!(eval("1 us < 2000 ns").unwrap(), Value::Bool(true));
        assert_eq!(eval("1 == 1.0 and not False").unwrap(), Value::Bool(true));
        assert_eq!(eval("0 or 'x'").unwrap(), Value::from("x"));
        assert!(eval("1 V < 1 s").is_err());
        assert_eq!(eval("1 V == 1 s").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_collections() {
        assert_eq!(eval("[1, 2, 3][-1]").unwrap(), Value::Int(3));
        assert_eq!(eval("{'a': 1, 'b': 2}['b']").unwrap(), Value::Int(2));
        assert_eq!(eval("'ab' + \"cd\"").unwrap(), Value::from("abcd"));
    }

    #[test]
    fn test_dependencies() {
        let mut variables = HashMap::new();
        variables.insert("x".to_string(), Value::from(q(2.0, "MHz").unwrap()));
        variables.insert("y".to_string(), Value::Int(3));
        let evaluation = Evaluator::new()
            .evaluate("x * y * (pi / pi)", &variables)
            .unwrap();
        assert_eq!(evaluation.value, Value::from(q(6.0, "MHz").unwrap()));
        assert_eq!(
            evaluation.dependencies.into_iter().collect::<Vec<_>>(),
            vec!["x".to_string(), "y".to_string()]
        );
    }

    #[test]
    fn test_unresolved_identifier_offset() {
        assert_eq!(
            eval("1 + foo").unwrap_err(),
            ExpressionError::UnresolvedIdentifier {
                offset: 4,
                name: "foo".to_string()
            }
        );
    }

    #[test]
    fn test_function_resolution_order() {
        let mut evaluator = Evaluator::new();
        evaluator.functions.register("sin", |_| Ok(Value::Int(42)));
        evaluator.user_functions.register("double", |args| {
            let x = args[0].to_i64()?;
            Ok(Value::Int(2 * x))
        });
        assert_eq!(evaluator.evaluate("sin(0)", &()).unwrap().value, Value::Int(42));
        assert_eq!(evaluator.evaluate("double(4)", &()).unwrap().value, Value::Int(8));
        assert!(matches!(
            evaluator.evaluate("nope(1)", &()),
            Err(ExpressionError::UnknownFunction { offset: 0, .. })
        ));
    }
}

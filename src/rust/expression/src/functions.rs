// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use indexmap::IndexMap;
use ionpulse_units::Quantity;

use crate::value::Value;
use crate::{ExpressionError, Result};

pub type Function = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Named functions callable from expressions.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: IndexMap<String, Function>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(function));
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.functions.keys()).finish()
    }
}

fn arity(name: &str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(ExpressionError::Arity {
            name: name.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn unary_float(name: &str, args: &[Value], f: fn(f64) -> f64) -> Result<Value> {
    arity(name, args, 1)?;
    Ok(Value::Float(f(args[0].to_f64(name)?)))
}

/// Apply `f` to the magnitude while keeping the unit.
fn map_magnitude(value: &Value, f: impl Fn(f64) -> f64) -> Result<Value> {
    Ok(match value {
        Value::Quantity(q) => Value::Quantity(Quantity::with_unit(f(q.magnitude()), q.unit().clone())),
        other => Value::Float(f(other.to_f64("map")?)),
    })
}

fn reinterpret_signed(value: &Value, bits: u32) -> Result<Value> {
    let n = value.to_i64()?;
    if n < 0 {
        return Err(ExpressionError::Type(format!(
            "sint{bits} expects a non-negative integer, got {n}"
        )));
    }
    let shift = 64 - bits;
    Ok(Value::Int((n << shift) >> shift))
}

fn round_ties_even_to_int(x: f64) -> Value {
    let rounded = x.round_ties_even();
    if rounded.abs() < i64::MAX as f64 {
        Value::Int(rounded as i64)
    } else {
        Value::Float(rounded)
    }
}

/// Call a built-in function, or `None` if `name` is not a builtin.
pub fn call_builtin(name: &str, args: &[Value]) -> Option<Result<Value>> {
    let result = match name {
        "sin" => unary_float(name, args, f64::sin),
        "cos" => unary_float(name, args, f64::cos),
        "tan" => unary_float(name, args, f64::tan),
        "asin" => unary_float(name, args, f64::asin),
        "acos" => unary_float(name, args, f64::acos),
        "atan" => unary_float(name, args, f64::atan),
        "degrees" => unary_float(name, args, f64::to_degrees),
        "radians" => unary_float(name, args, f64::to_radians),
        "exp" => unary_float(name, args, f64::exp),
        "erf" => unary_float(name, args, erf),
        "erfc" => unary_float(name, args, erfc),
        "sqrt" => unary_float(name, args, f64::sqrt),
        "abs" => arity(name, args, 1).and_then(|_| match &args[0] {
            Value::Int(i) => i
                .checked_abs()
                .map(Value::Int)
                .ok_or_else(|| ExpressionError::Type(format!("integer overflow in abs({i})"))),
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            other => map_magnitude(other, f64::abs),
        }),
        "round" => match args {
            [Value::Int(i)] => Ok(Value::Int(*i)),
            [Value::Quantity(_)] => map_magnitude(&args[0], f64::round_ties_even),
            [x] => x.to_f64(name).map(round_ties_even_to_int),
            [x, digits] => digits.to_i64().and_then(|digits| {
                let scale = 10f64.powi(digits as i32);
                map_magnitude(x, |m| (m * scale).round_ties_even() / scale)
            }),
            _ => Err(ExpressionError::Arity {
                name: name.to_string(),
                expected: 1,
                got: args.len(),
            }),
        },
        "trunc" => arity(name, args, 1).and_then(|_| match &args[0] {
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::Quantity(_) => map_magnitude(&args[0], f64::trunc),
            other => other.to_f64(name).map(|x| Value::Int(x.trunc() as i64)),
        }),
        "sign" => arity(name, args, 1).and_then(|_| {
            let magnitude = args[0].to_quantity()?.magnitude();
            Ok(Value::Int(if magnitude > 0.0 {
                1
            } else if magnitude < 0.0 {
                -1
            } else {
                0
            }))
        }),
        "min" | "max" => extremum(name, args),
        "sint12" => arity(name, args, 1).and_then(|_| reinterpret_signed(&args[0], 12)),
        "sint16" => arity(name, args, 1).and_then(|_| reinterpret_signed(&args[0], 16)),
        "sint32" => arity(name, args, 1).and_then(|_| reinterpret_signed(&args[0], 32)),
        _ => return None,
    };
    Some(result)
}

fn extremum(name: &str, args: &[Value]) -> Result<Value> {
    let items = match args {
        [Value::List(items)] => items.as_slice(),
        items => items,
    };
    let mut best = items.first().ok_or_else(|| ExpressionError::Arity {
        name: name.to_string(),
        expected: 1,
        got: 0,
    })?;
    for item in &items[1..] {
        let ordering = item.compare(best)?;
        if (name == "min" && ordering.is_lt()) || (name == "max" && ordering.is_gt()) {
            best = item;
        }
    }
    Ok(best.clone())
}

pub fn erf(x: f64) -> f64 {
    1.0 - erfc(x)
}

/// Complementary error function, Chebyshev fit with fractional error below 1.2e-7.
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let value = t * poly.exp();
    if x >= 0.0 { value } else { 2.0 - value }
}

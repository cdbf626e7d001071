//! 二元、一元运算符的语义。
//!
//! - 整数运算溢出时提升为浮点数。
//! - 任一操作数为 Null 时结果为 Null（`IsNull` 等类型测试除外）。
//! - `And` / `Or` 采用三值逻辑。

use std::cmp::Ordering;

use crate::{
    bytecode::opcode::{BinaryOp, UnaryOp},
    error::VmError,
};

use super::value::{make_string_value, Value};

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i32),
    Float(f64),
}

impl Number {
    fn of(value: &Value) -> Option<Number> {
        match value {
            Value::Integer(i) => Some(Number::Int(*i)),
            Value::Boolean(b) => Some(Number::Int(*b as i32)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

fn mismatch(op: BinaryOp, a: &Value, b: &Value) -> VmError {
    VmError::type_mismatch(format!(
        "cannot apply '{}' to {} and {}",
        op.symbol(),
        a.type_name(),
        b.type_name()
    ))
}

/// 结果放得下时为整数，否则为浮点数。
fn int_or_float(checked: Option<i32>, fallback: f64) -> Value {
    match checked {
        Some(i) => Value::Integer(i),
        None => Value::Float(fallback),
    }
}

pub fn binary(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, VmError> {
    match op {
        BinaryOp::And => return Ok(logical_and(a, b)),
        BinaryOp::Or => return Ok(logical_or(a, b)),
        _ => {}
    }
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    match op {
        BinaryOp::Eq => equals(op, a, b).map(Value::Boolean),
        BinaryOp::Ne => equals(op, a, b).map(|eq| Value::Boolean(!eq)),
        BinaryOp::Lt => compare(op, a, b).map(|o| Value::Boolean(o == Ordering::Less)),
        BinaryOp::Le => compare(op, a, b).map(|o| Value::Boolean(o != Ordering::Greater)),
        BinaryOp::Gt => compare(op, a, b).map(|o| Value::Boolean(o == Ordering::Greater)),
        BinaryOp::Ge => compare(op, a, b).map(|o| Value::Boolean(o != Ordering::Less)),
        BinaryOp::Min => compare(op, a, b).map(|o| if o == Ordering::Greater { b.clone() } else { a.clone() }),
        BinaryOp::Max => compare(op, a, b).map(|o| if o == Ordering::Less { b.clone() } else { a.clone() }),
        BinaryOp::Xor => match (a.to_bool(), b.to_bool()) {
            (Some(x), Some(y)) => Ok(Value::Boolean(x != y)),
            _ => Ok(Value::Null),
        },
        BinaryOp::Concat => {
            let mut text = a.to_string(false);
            text.push_str(&b.to_string(false));
            Ok(make_string_value(text))
        }
        BinaryOp::Add => {
            if let (Value::String(x), Value::String(y)) = (a, b) {
                let mut text = String::with_capacity(x.len() + y.len());
                text.push_str(x);
                text.push_str(y);
                return Ok(make_string_value(text));
            }
            arithmetic(op, a, b)
        }
        _ => arithmetic(op, a, b),
    }
}

fn arithmetic(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, VmError> {
    let (Some(x), Some(y)) = (Number::of(a), Number::of(b)) else {
        return Err(mismatch(op, a, b));
    };
    match (x, y) {
        (Number::Int(x), Number::Int(y)) => int_arithmetic(op, x, y),
        _ => float_arithmetic(op, x.as_f64(), y.as_f64()),
    }
}

fn int_arithmetic(op: BinaryOp, x: i32, y: i32) -> Result<Value, VmError> {
    let (fx, fy) = (x as f64, y as f64);
    Ok(match op {
        BinaryOp::Add => int_or_float(x.checked_add(y), fx + fy),
        BinaryOp::Sub => int_or_float(x.checked_sub(y), fx - fy),
        BinaryOp::Mul => int_or_float(x.checked_mul(y), fx * fy),
        BinaryOp::Div => {
            if y == 0 {
                return Err(VmError::DivisionByZero);
            }
            match x.checked_rem(y) {
                Some(0) => int_or_float(x.checked_div(y), fx / fy),
                _ => Value::Float(fx / fy),
            }
        }
        BinaryOp::IntDiv => {
            if y == 0 {
                return Err(VmError::DivisionByZero);
            }
            int_or_float(x.checked_div(y), (fx / fy).trunc())
        }
        BinaryOp::Mod => {
            if y == 0 {
                return Err(VmError::DivisionByZero);
            }
            Value::Integer(x.checked_rem(y).unwrap_or(0))
        }
        BinaryOp::Pow => {
            if y >= 0 {
                int_or_float(x.checked_pow(y as u32), fx.powf(fy))
            } else {
                Value::Float(fx.powf(fy))
            }
        }
        _ => return Err(VmError::fault(format!("'{}' is not arithmetic", op.symbol()))),
    })
}

fn float_arithmetic(op: BinaryOp, x: f64, y: f64) -> Result<Value, VmError> {
    Ok(Value::Float(match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => {
            if y == 0.0 {
                return Err(VmError::DivisionByZero);
            }
            x / y
        }
        BinaryOp::Pow => x.powf(y),
        BinaryOp::IntDiv | BinaryOp::Mod => {
            return Err(VmError::type_mismatch(format!(
                "'{}' needs integer operands",
                op.symbol()
            )))
        }
        _ => return Err(VmError::fault(format!("'{}' is not arithmetic", op.symbol()))),
    }))
}

fn equals(op: BinaryOp, a: &Value, b: &Value) -> Result<bool, VmError> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(x == y),
        (Value::String(_), _) | (_, Value::String(_))
            if Number::of(a).is_some() || Number::of(b).is_some() =>
        {
            Err(mismatch(op, a, b))
        }
        _ => match (Number::of(a), Number::of(b)) {
            (Some(Number::Int(x)), Some(Number::Int(y))) => Ok(x == y),
            (Some(x), Some(y)) => Ok(x.as_f64() == y.as_f64()),
            _ => Ok(a.same_identity(b)),
        },
    }
}

fn compare(op: BinaryOp, a: &Value, b: &Value) -> Result<Ordering, VmError> {
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return Ok(x.as_bytes().cmp(y.as_bytes()));
    }
    match (Number::of(a), Number::of(b)) {
        (Some(Number::Int(x)), Some(Number::Int(y))) => Ok(x.cmp(&y)),
        (Some(x), Some(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .ok_or_else(|| mismatch(op, a, b)),
        _ => Err(mismatch(op, a, b)),
    }
}

fn logical_and(a: &Value, b: &Value) -> Value {
    match (a.to_bool(), b.to_bool()) {
        (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
        (Some(true), Some(true)) => Value::Boolean(true),
        _ => Value::Null,
    }
}

fn logical_or(a: &Value, b: &Value) -> Value {
    match (a.to_bool(), b.to_bool()) {
        (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
        (Some(false), Some(false)) => Value::Boolean(false),
        _ => Value::Null,
    }
}

pub fn unary(op: UnaryOp, a: &Value) -> Result<Value, VmError> {
    match op {
        UnaryOp::IsNull => return Ok(Value::Boolean(a.is_null())),
        UnaryOp::IsNumber => return Ok(Value::Boolean(matches!(a, Value::Integer(_) | Value::Float(_)))),
        UnaryOp::IsString => return Ok(Value::Boolean(matches!(a, Value::String(_)))),
        _ => {}
    }
    if a.is_null() {
        return Ok(Value::Null);
    }
    match op {
        UnaryOp::Not => Ok(a.to_bool().map_or(Value::Null, |b| Value::Boolean(!b))),
        UnaryOp::Bool => Ok(a.to_bool().map_or(Value::Null, Value::Boolean)),
        UnaryOp::Str => Ok(make_string_value(a.to_string(false))),
        _ => {
            let number = Number::of(a).ok_or_else(|| {
                VmError::type_mismatch(format!("cannot apply {:?} to {}", op, a.type_name()))
            })?;
            Ok(match (op, number) {
                (UnaryOp::Neg, Number::Int(i)) => int_or_float(i.checked_neg(), -(i as f64)),
                (UnaryOp::Neg, Number::Float(f)) => Value::Float(-f),
                (UnaryOp::Pos, Number::Int(i)) => Value::Integer(i),
                (UnaryOp::Pos, Number::Float(f)) => Value::Float(f),
                (UnaryOp::Inc, Number::Int(i)) => int_or_float(i.checked_add(1), i as f64 + 1.0),
                (UnaryOp::Inc, Number::Float(f)) => Value::Float(f + 1.0),
                (UnaryOp::Dec, Number::Int(i)) => int_or_float(i.checked_sub(1), i as f64 - 1.0),
                (UnaryOp::Dec, Number::Float(f)) => Value::Float(f - 1.0),
                (UnaryOp::Abs, Number::Int(i)) => int_or_float(i.checked_abs(), (i as f64).abs()),
                (UnaryOp::Abs, Number::Float(f)) => Value::Float(f.abs()),
                _ => return Err(VmError::fault(format!("unhandled unary operator {:?}", op))),
            })
        }
    }
}

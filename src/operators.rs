//! Arithmetic, relational, and logical operators.
//!
//! Stateless helpers: every function here takes already-resolved [`Value`]s
//! and an instruction `order` for error messages, and returns a result or a
//! typed error. The VM is the only caller.

use crate::error::{Error, Result};
use crate::value::Value;

fn expect_int(order: u32, v: &Value) -> Result<i64> {
    v.as_int().ok_or_else(|| Error::TypeError {
        order,
        message: format!("expected int, found {}", v.type_name()),
    })
}

fn expect_bool(order: u32, v: &Value) -> Result<bool> {
    v.as_bool().ok_or_else(|| Error::TypeError {
        order,
        message: format!("expected bool, found {}", v.type_name()),
    })
}

fn expect_str<'a>(order: u32, v: &'a Value) -> Result<&'a str> {
    v.as_str().ok_or_else(|| Error::TypeError {
        order,
        message: format!("expected string, found {}", v.type_name()),
    })
}

pub fn add(order: u32, a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::Int(expect_int(order, a)? + expect_int(order, b)?))
}

pub fn sub(order: u32, a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::Int(expect_int(order, a)? - expect_int(order, b)?))
}

pub fn mul(order: u32, a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::Int(expect_int(order, a)? * expect_int(order, b)?))
}

/// Truncating integer division. Division by zero is `BadValue`, not a
/// type problem — both operands were legitimate integers.
pub fn idiv(order: u32, a: &Value, b: &Value) -> Result<Value> {
    let (a, b) = (expect_int(order, a)?, expect_int(order, b)?);
    if b == 0 {
        return Err(Error::BadValue {
            order,
            message: "integer division by zero".to_string(),
        });
    }
    Ok(Value::Int(a.wrapping_div(b)))
}

pub fn and(order: u32, a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::Bool(expect_bool(order, a)? && expect_bool(order, b)?))
}

pub fn or(order: u32, a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::Bool(expect_bool(order, a)? || expect_bool(order, b)?))
}

pub fn not(order: u32, a: &Value) -> Result<Value> {
    Ok(Value::Bool(!expect_bool(order, a)?))
}

pub fn concat(order: u32, a: &Value, b: &Value) -> Result<Value> {
    Ok(Value::Str(format!("{}{}", expect_str(order, a)?, expect_str(order, b)?)))
}

/// `LT`/`GT`: same concrete type required, `Nil` forbidden on either side.
pub fn less_than(order: u32, a: &Value, b: &Value) -> Result<bool> {
    require_ordered(order, a, b)?;
    Ok(match (a, b) {
        (Value::Int(x), Value::Int(y)) => x < y,
        (Value::Bool(x), Value::Bool(y)) => !x & y,
        (Value::Str(x), Value::Str(y)) => x < y,
        _ => unreachable!("require_ordered rules out every other pairing"),
    })
}

pub fn greater_than(order: u32, a: &Value, b: &Value) -> Result<bool> {
    less_than(order, b, a)
}

fn require_ordered(order: u32, a: &Value, b: &Value) -> Result<()> {
    if matches!(a, Value::Nil) || matches!(b, Value::Nil) {
        return Err(Error::TypeError {
            order,
            message: "nil has no ordering".to_string(),
        });
    }
    require_same_type(order, a, b)
}

fn require_same_type(order: u32, a: &Value, b: &Value) -> Result<()> {
    if std::mem::discriminant(a) != std::mem::discriminant(b) {
        return Err(Error::TypeError {
            order,
            message: format!("cannot compare {} with {}", a.type_name(), b.type_name()),
        });
    }
    Ok(())
}

/// `EQ`: comparing anything to `Nil` is permitted and compares by
/// identity; otherwise the concrete types must agree.
pub fn equal(order: u32, a: &Value, b: &Value) -> Result<bool> {
    if matches!(a, Value::Nil) || matches!(b, Value::Nil) {
        return Ok(matches!(a, Value::Nil) && matches!(b, Value::Nil));
    }
    require_same_type(order, a, b)?;
    Ok(a == b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn idiv_truncates_toward_zero() {
        assert_eq!(idiv(1, &Value::Int(7), &Value::Int(2)).unwrap(), Value::Int(3));
        assert_eq!(idiv(1, &Value::Int(-7), &Value::Int(2)).unwrap(), Value::Int(-3));
    }

    #[test]
    fn idiv_by_zero_is_bad_value() {
        assert_eq!(idiv(1, &Value::Int(1), &Value::Int(0)).unwrap_err().exit_code(), 57);
    }

    #[test]
    fn lt_rejects_nil_and_mixed_types() {
        assert_eq!(less_than(1, &Value::Nil, &Value::Int(1)).unwrap_err().exit_code(), 53);
        assert_eq!(
            less_than(1, &Value::Int(1), &Value::Str("1".to_string()))
                .unwrap_err()
                .exit_code(),
            53
        );
        assert!(less_than(1, &Value::Bool(false), &Value::Bool(true)).unwrap());
    }

    #[test]
    fn eq_compares_nil_by_identity() {
        assert!(equal(1, &Value::Nil, &Value::Nil).unwrap());
        assert!(!equal(1, &Value::Nil, &Value::Int(0)).unwrap());
        assert!(!equal(1, &Value::Int(0), &Value::Nil).unwrap());
    }

    #[test]
    fn eq_requires_same_type_unless_nil() {
        assert_eq!(
            equal(1, &Value::Int(1), &Value::Str("1".to_string())).unwrap_err().exit_code(),
            53
        );
    }
}

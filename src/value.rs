//! Typed runtime values.
//!
//! A [`Value`] is the tagged union every variable slot and data-stack entry
//! holds. [`Slot`] additionally distinguishes a declared-but-unassigned
//! variable from one holding a concrete value — this is what makes `DEFVAR`
//! separable from assignment instead of collapsing to "absent from a map".

use std::fmt;

/// A concrete, assignable runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    Nil,
}

impl Value {
    /// The literal type name as written by `TYPE` and compared in the
    /// document's `type` attribute.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Nil => "nil",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    /// The exact text `WRITE` prints: booleans lowercase, `Nil` empty,
    /// strings literal, integers decimal.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Value::Str(s) => write!(f, "{s}"),
            Value::Nil => Ok(()),
        }
    }
}

/// The content of a variable slot: either declared-but-unassigned, or a
/// concrete value.
///
/// This is a distinguished variant rather than the absence of a map entry,
/// so reading an undefined slot and reading an undeclared one are different
/// failures (`MissingValue` vs. `AccessUndefinedVariable`).
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Undefined,
    Value(Value),
}

impl Slot {
    /// The literal type name `TYPE` writes: `""` for an undefined slot.
    pub fn type_name(&self) -> &'static str {
        match self {
            Slot::Undefined => "",
            Slot::Value(v) => v.type_name(),
        }
    }
}

// value.rs — Runtime values of the expression language

use std::fmt;

use serde::{Deserialize, Serialize};

/// A tagged runtime value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Int(i64),
    Str(String),
    Bool(bool),
}

/// The tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Str,
    Bool,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Str(_) => ValueKind::Str,
            Value::Bool(_) => ValueKind::Bool,
        }
    }

    /// Non-zero integers, `true`, and every string are truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(v) => *v != 0,
            Value::Str(_) => true,
            Value::Bool(b) => *b,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Int => "int",
            ValueKind::Str => "string",
            ValueKind::Bool => "bool",
        };
        write!(f, "{name}")
    }
}

/// Declared type of a block argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    Int,
    String,
}

impl ArgType {
    /// Descriptor spelling of the type (`int`, `string`).
    pub fn from_name(name: &str) -> Option<ArgType> {
        match name {
            "int" | "integer" => Some(ArgType::Int),
            "string" | "str" => Some(ArgType::String),
            _ => None,
        }
    }

    pub fn kind(self) -> ValueKind {
        match self {
            ArgType::Int => ValueKind::Int,
            ArgType::String => ValueKind::Str,
        }
    }

    pub fn accepts(self, value: &Value) -> bool {
        value.kind() == self.kind()
    }

    /// Parse a textual literal (descriptor default or user input) into a
    /// value of this type. Integers accept decimal and `0x` hex.
    pub fn parse_literal(self, text: &str) -> Option<Value> {
        match self {
            ArgType::Int => parse_int_literal(text.trim()).map(Value::Int),
            ArgType::String => Some(Value::Str(text.to_string())),
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgType::Int => write!(f, "int"),
            ArgType::String => write!(f, "string"),
        }
    }
}

fn parse_int_literal(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}

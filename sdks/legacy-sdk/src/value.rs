// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Tagged argument values and argument specifications.
//!
//! Filters declare their parameters with a compact string such as
//! `"c[radius]i[strength]f"`. Each entry is a type letter, optionally preceded
//! by a bracketed name and followed by a repetition marker:
//!
//! | Letter | Type |
//! |---|---|
//! | `c` | clip |
//! | `i` | integer |
//! | `f` | float (integers are accepted and promoted) |
//! | `b` | boolean |
//! | `s` | string |
//! | `.` | any value |
//!
//! A bracketed name makes the argument optional and passable by name only.
//! `*` accepts zero or more values of the type, `+` one or more.

use crate::clip::PClip;
use framebridge_core::{BridgeError, Result};
use std::fmt;
use std::sync::Arc;

/// A dynamically typed argument or return value.
#[derive(Clone, Default)]
pub enum Value {
    /// No value; what an omitted optional argument resolves to.
    #[default]
    Void,
    Clip(PClip),
    Bool(bool),
    Int(i32),
    Float(f32),
    String(Arc<str>),
    Array(Vec<Value>),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::String(Arc::from(s.as_ref()))
    }

    pub const fn arg_type(&self) -> Option<ArgType> {
        match self {
            Self::Void | Self::Array(_) => None,
            Self::Clip(_) => Some(ArgType::Clip),
            Self::Bool(_) => Some(ArgType::Bool),
            Self::Int(_) => Some(ArgType::Int),
            Self::Float(_) => Some(ArgType::Float),
            Self::String(_) => Some(ArgType::String),
        }
    }

    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Clip(_) => "clip",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Array(_) => "array",
        }
    }

    pub const fn is_defined(&self) -> bool {
        !matches!(self, Self::Void)
    }

    pub fn as_clip(&self) -> Option<&PClip> {
        match self {
            Self::Clip(clip) => Some(clip),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float value, promoting integers.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(values) => Some(values),
            _ => None,
        }
    }

    /// Number of elements: the array length, 1 for a scalar, 0 for void.
    pub fn array_len(&self) -> usize {
        match self {
            Self::Void => 0,
            Self::Array(values) => values.len(),
            _ => 1,
        }
    }

    /// Element `idx` of an array. A scalar is its own element 0.
    pub fn get(&self, idx: usize) -> Option<&Self> {
        match self {
            Self::Array(values) => values.get(idx),
            Self::Void => None,
            scalar => (idx == 0).then_some(scalar),
        }
    }

    pub fn int_or(&self, default: i32) -> i32 {
        self.as_int().unwrap_or(default)
    }

    pub fn float_or(&self, default: f32) -> f32 {
        self.as_float().unwrap_or(default)
    }

    pub fn bool_or(&self, default: bool) -> bool {
        self.as_bool().unwrap_or(default)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("Void"),
            Self::Clip(clip) => {
                let vi = clip.video_info();
                write!(f, "Clip({}x{} {}, {} frames)", vi.width, vi.height, vi.pixel_type, vi.num_frames)
            },
            Self::Bool(v) => write!(f, "Bool({v})"),
            Self::Int(v) => write!(f, "Int({v})"),
            Self::Float(v) => write!(f, "Float({v})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Array(values) => f.debug_tuple("Array").field(values).finish(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Void, Self::Void) => true,
            (Self::Clip(a), Self::Clip(b)) => Arc::ptr_eq(a, b),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl From<PClip> for Value {
    fn from(clip: PClip) -> Self {
        Self::Clip(clip)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<Vec<Self>> for Value {
    fn from(values: Vec<Self>) -> Self {
        Self::Array(values)
    }
}

/// The type letter of an argument specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgType {
    Clip,
    Int,
    Float,
    Bool,
    String,
    Any,
}

impl ArgType {
    pub const fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'c' => Some(Self::Clip),
            'i' => Some(Self::Int),
            'f' => Some(Self::Float),
            'b' => Some(Self::Bool),
            's' => Some(Self::String),
            '.' => Some(Self::Any),
            _ => None,
        }
    }

    pub const fn letter(self) -> char {
        match self {
            Self::Clip => 'c',
            Self::Int => 'i',
            Self::Float => 'f',
            Self::Bool => 'b',
            Self::String => 's',
            Self::Any => '.',
        }
    }

    /// Whether `value` may be bound to an argument of this type.
    pub const fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any, Value::Array(_) | Value::Void) => false,
            (Self::Any, _)
            | (Self::Clip, Value::Clip(_))
            | (Self::Int, Value::Int(_))
            | (Self::Float, Value::Float(_) | Value::Int(_))
            | (Self::Bool, Value::Bool(_))
            | (Self::String, Value::String(_)) => true,
            _ => false,
        }
    }
}

/// How many values an argument takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Repeat {
    One,
    ZeroOrMore,
    OneOrMore,
}

/// One parsed entry of a parameter string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArgSpec {
    pub name: Option<String>,
    pub arg_type: ArgType,
    pub required: bool,
    pub repeat: Repeat,
}

impl fmt::Display for ArgSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "[{name}]")?;
        }
        write!(f, "{}", self.arg_type.letter())?;
        match self.repeat {
            Repeat::One => Ok(()),
            Repeat::ZeroOrMore => f.write_str("*"),
            Repeat::OneOrMore => f.write_str("+"),
        }
    }
}

/// Parses a parameter string into argument specifications.
///
/// # Errors
///
/// Returns `BridgeError::Argument` on an unknown type letter, an unterminated or
/// empty name, or a name or repetition marker with no type letter after it.
pub fn parse_arg_specs(params: &str) -> Result<Vec<ArgSpec>> {
    let mut specs = Vec::new();
    let mut chars = params.chars().peekable();

    while let Some(c) = chars.next() {
        let (name, letter) = if c == '[' {
            let mut name = String::new();
            loop {
                match chars.next() {
                    Some(']') => break,
                    Some(ch) => name.push(ch),
                    None => {
                        return Err(BridgeError::Argument(format!(
                            "unterminated argument name in '{params}'"
                        )))
                    },
                }
            }
            if name.is_empty() {
                return Err(BridgeError::Argument(format!("empty argument name in '{params}'")));
            }
            let Some(letter) = chars.next() else {
                return Err(BridgeError::Argument(format!(
                    "argument '{name}' has no type in '{params}'"
                )));
            };
            (Some(name), letter)
        } else {
            (None, c)
        };

        let Some(arg_type) = ArgType::from_letter(letter) else {
            return Err(BridgeError::Argument(format!("unknown argument type '{letter}' in '{params}'")));
        };

        let repeat = match chars.peek() {
            Some('*') => {
                chars.next();
                Repeat::ZeroOrMore
            },
            Some('+') => {
                chars.next();
                Repeat::OneOrMore
            },
            _ => Repeat::One,
        };

        let required = name.is_none();
        specs.push(ArgSpec { name, arg_type, required, repeat });
    }

    Ok(specs)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_repeated_specs() {
        let specs = parse_arg_specs("c[radius]i[strength]f.*s+").unwrap();
        assert_eq!(specs.len(), 5);
        assert_eq!(specs[0], ArgSpec { name: None, arg_type: ArgType::Clip, required: true, repeat: Repeat::One });
        assert_eq!(specs[1].name.as_deref(), Some("radius"));
        assert!(!specs[1].required);
        assert_eq!(specs[2].arg_type, ArgType::Float);
        assert_eq!(specs[3].repeat, Repeat::ZeroOrMore);
        assert_eq!(specs[4].repeat, Repeat::OneOrMore);

        let printed: String = specs.iter().map(ToString::to_string).collect();
        assert_eq!(printed, "c[radius]i[strength]f.*s+");
        assert!(parse_arg_specs("").unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed_specs() {
        assert!(parse_arg_specs("cx").is_err());
        assert!(parse_arg_specs("c[radius").is_err());
        assert!(parse_arg_specs("c[]i").is_err());
        assert!(parse_arg_specs("c[radius]").is_err());
        assert!(parse_arg_specs("*").is_err());
    }

    #[test]
    fn type_acceptance() {
        assert!(ArgType::Float.accepts(&Value::Int(3)));
        assert!(!ArgType::Int.accepts(&Value::Float(3.0)));
        assert!(ArgType::Any.accepts(&Value::string("x")));
        assert!(!ArgType::Any.accepts(&Value::Void));
        assert!(!ArgType::Bool.accepts(&Value::Int(1)));
    }

    #[test]
    fn accessors() {
        assert_eq!(Value::Int(2).as_float(), Some(2.0));
        assert_eq!(Value::Void.int_or(7), 7);
        assert_eq!(Value::from("abc").as_str(), Some("abc"));
        let arr = Value::from(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(arr.array_len(), 2);
        assert_eq!(arr.get(1), Some(&Value::Int(2)));
        assert_eq!(Value::Bool(true).get(0), Some(&Value::Bool(true)));
        assert_eq!(Value::Void.array_len(), 0);
        assert!(!Value::Void.is_defined());
    }
}

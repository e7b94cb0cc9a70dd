// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Binding call arguments to a function's parameter list.
//!
//! Positional values fill the unnamed parameters in order. A repeated parameter
//! absorbs consecutive values of its type. Named values bind only to bracketed
//! parameters, matched without regard to ASCII case.

use framebridge_core::{BridgeError, Result};
use framebridge_legacy_sdk::{ArgSpec, ArgType, Repeat, Value};

#[derive(Default)]
struct Binding {
    values: Vec<Value>,
    given: bool,
}

fn mismatch(spec: &ArgSpec, idx: usize, value: &Value) -> BridgeError {
    BridgeError::Argument(format!(
        "argument {} ({spec}) does not accept a {} value",
        idx + 1,
        value.type_name()
    ))
}

#[allow(clippy::cast_precision_loss)]
fn coerce(arg_type: ArgType, value: Value) -> Value {
    match (arg_type, value) {
        (ArgType::Float, Value::Int(i)) => Value::Float(i as f32),
        (_, value) => value,
    }
}

/// Resolves `values` against `specs` and returns one array entry per parameter.
///
/// `names[i]` names `values[i]`; missing entries mean positional. Omitted optional
/// parameters come back as `Value::Void`, and repeated parameters as arrays.
///
/// # Errors
///
/// Returns `BridgeError::Argument` for surplus values, unknown or repeated names,
/// type mismatches, and missing required parameters.
pub fn resolve_args(specs: &[ArgSpec], values: Vec<Value>, names: &[Option<&str>]) -> Result<Value> {
    if names.len() > values.len() {
        return Err(BridgeError::Argument(format!(
            "{} argument names given for {} values",
            names.len(),
            values.len()
        )));
    }

    let mut bindings: Vec<Binding> = specs.iter().map(|_| Binding::default()).collect();
    let positional_specs: Vec<usize> =
        specs.iter().enumerate().filter(|(_, s)| s.name.is_none()).map(|(i, _)| i).collect();
    let mut cursor = 0;

    for (pos, value) in values.into_iter().enumerate() {
        if let Some(name) = names.get(pos).copied().flatten() {
            let Some(idx) = specs
                .iter()
                .position(|s| s.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
            else {
                return Err(BridgeError::Argument(format!("unknown argument name '{name}'")));
            };
            let spec = &specs[idx];
            let binding = &mut bindings[idx];
            if binding.given {
                return Err(BridgeError::Argument(format!("argument '{name}' given twice")));
            }
            binding.given = true;
            match (spec.repeat, value) {
                (Repeat::ZeroOrMore | Repeat::OneOrMore, Value::Array(items)) => {
                    for item in items {
                        if !spec.arg_type.accepts(&item) {
                            return Err(mismatch(spec, idx, &item));
                        }
                        binding.values.push(coerce(spec.arg_type, item));
                    }
                },
                (_, value) => {
                    if !spec.arg_type.accepts(&value) {
                        return Err(mismatch(spec, idx, &value));
                    }
                    binding.values.push(coerce(spec.arg_type, value));
                },
            }
            continue;
        }

        loop {
            let Some(&idx) = positional_specs.get(cursor) else {
                return Err(BridgeError::Argument(format!(
                    "too many arguments: expected at most {} positional values",
                    positional_specs.len()
                )));
            };
            let spec = &specs[idx];
            let binding = &mut bindings[idx];
            let accepted = spec.arg_type.accepts(&value);
            match spec.repeat {
                Repeat::One => {
                    if !accepted {
                        return Err(mismatch(spec, idx, &value));
                    }
                    binding.given = true;
                    binding.values.push(coerce(spec.arg_type, value));
                    cursor += 1;
                    break;
                },
                Repeat::ZeroOrMore | Repeat::OneOrMore => {
                    if accepted {
                        binding.given = true;
                        binding.values.push(coerce(spec.arg_type, value));
                        break;
                    }
                    if spec.repeat == Repeat::OneOrMore && binding.values.is_empty() {
                        return Err(mismatch(spec, idx, &value));
                    }
                    cursor += 1;
                },
            }
        }
    }

    let mut out = Vec::with_capacity(specs.len());
    for (idx, (spec, binding)) in specs.iter().zip(bindings).enumerate() {
        match spec.repeat {
            Repeat::One => {
                if spec.required && !binding.given {
                    return Err(BridgeError::Argument(format!(
                        "missing required argument {} ({spec})",
                        idx + 1
                    )));
                }
                out.push(binding.values.into_iter().next().unwrap_or_default());
            },
            Repeat::ZeroOrMore | Repeat::OneOrMore => {
                if spec.repeat == Repeat::OneOrMore && binding.values.is_empty() && spec.required {
                    return Err(BridgeError::Argument(format!(
                        "argument {} ({spec}) needs at least one value",
                        idx + 1
                    )));
                }
                out.push(Value::Array(binding.values));
            },
        }
    }
    Ok(Value::Array(out))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use framebridge_legacy_sdk::parse_arg_specs;

    fn resolve(params: &str, values: Vec<Value>, names: &[Option<&str>]) -> Result<Value> {
        resolve_args(&parse_arg_specs(params).unwrap(), values, names)
    }

    #[test]
    fn positional_and_named() {
        let out = resolve("i[strength]f[mode]s", vec![Value::Int(3), Value::Int(2)], &[None, Some("STRENGTH")])
            .unwrap();
        assert_eq!(out, Value::Array(vec![Value::Int(3), Value::Float(2.0), Value::Void]));
    }

    #[test]
    fn optional_arguments_are_named_only() {
        let err = resolve("i[radius]i", vec![Value::Int(1), Value::Int(2)], &[]).unwrap_err();
        assert!(err.to_string().contains("too many"));
    }

    #[test]
    fn repeated_parameters_absorb_matching_values() {
        let out = resolve("i*s", vec![Value::Int(1), Value::Int(2), Value::string("x")], &[]).unwrap();
        assert_eq!(
            out,
            Value::Array(vec![Value::Array(vec![Value::Int(1), Value::Int(2)]), Value::string("x")])
        );

        let out = resolve("i*s", vec![Value::string("x")], &[]).unwrap();
        assert_eq!(out, Value::Array(vec![Value::Array(vec![]), Value::string("x")]));

        assert!(resolve("i+s", vec![Value::string("x")], &[]).is_err());
    }

    #[test]
    fn argument_errors() {
        assert!(resolve("i", vec![], &[]).unwrap_err().to_string().contains("missing"));
        assert!(resolve("i", vec![Value::string("a")], &[]).is_err());
        assert!(resolve("[a]i", vec![Value::Int(1)], &[Some("b")]).is_err());
        assert!(resolve("[a]i", vec![Value::Int(1), Value::Int(2)], &[Some("a"), Some("a")]).is_err());
        assert!(resolve("i", vec![Value::Int(1)], &[None, None]).is_err());
    }

    #[test]
    fn named_repeated_parameter_takes_an_array() {
        let out = resolve("[planes]i*", vec![Value::Array(vec![Value::Int(0), Value::Int(2)])], &[Some("planes")])
            .unwrap();
        assert_eq!(out, Value::Array(vec![Value::Array(vec![Value::Int(0), Value::Int(2)])]));
    }
}

//! Non-interactive task arguments.
//!
//! Turns `name=value` pairs into the typed `args` object sent to a plugin,
//! using each input's declared type, choices, default and required flag.

use crate::manifest::{InputSpec, InputType, TaskSpec};
use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("expected name=value, got {0:?}")]
    Malformed(String),

    #[error("unknown input {name} for task {task}")]
    Unknown { name: String, task: String },

    #[error("invalid {kind} for {name}: {value:?}")]
    InvalidValue {
        name: String,
        kind: &'static str,
        value: String,
    },

    #[error("invalid choice {value:?} for {name}")]
    InvalidChoice { name: String, value: String },

    #[error("missing required input: {0}")]
    MissingRequired(String),

    #[error("no choices available for {0}")]
    NoChoices(String),

    #[error("unsupported input type {kind:?} for {name}")]
    UnsupportedType { name: String, kind: String },
}

/// Split `name=value` at the first `=`.
pub fn parse_assignment(raw: &str) -> Result<(&str, &str), InputError> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value)),
        _ => Err(InputError::Malformed(raw.to_string())),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

fn check_choice(input: &InputSpec, value: &str) -> Result<(), InputError> {
    if input.choices.iter().any(|c| c == value) {
        Ok(())
    } else {
        Err(InputError::InvalidChoice {
            name: input.name.clone(),
            value: value.to_string(),
        })
    }
}

/// Coerce a raw string according to the input's type.
pub fn parse_input_value(input: &InputSpec, raw: &str) -> Result<Value, InputError> {
    let raw = raw.trim();
    let invalid = |kind: &'static str| InputError::InvalidValue {
        name: input.name.clone(),
        kind,
        value: raw.to_string(),
    };
    match &input.input_type {
        InputType::String | InputType::Path => Ok(Value::String(raw.to_string())),
        InputType::Int => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid("int")),
        InputType::Float => raw
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| invalid("float")),
        InputType::Bool => parse_bool(raw).map(Value::Bool).ok_or_else(|| invalid("bool")),
        InputType::Enum => {
            // Without choices an enum takes free text
            if !input.choices.is_empty() {
                check_choice(input, raw)?;
            }
            Ok(Value::String(raw.to_string()))
        }
        InputType::MultiEnum => {
            let parts: Vec<&str> = raw
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .collect();
            for part in &parts {
                check_choice(input, part)?;
            }
            Ok(Value::Array(
                parts.into_iter().map(|p| Value::String(p.to_string())).collect(),
            ))
        }
        InputType::Other(kind) => Err(InputError::UnsupportedType {
            name: input.name.clone(),
            kind: kind.clone(),
        }),
    }
}

fn is_empty_answer(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Build the `args` object for `task`.
///
/// `base` (from `--args-json`) is taken as-is, then each `name=value`
/// assignment is coerced and applied. A blank value counts as no answer.
/// Missing inputs fall back to their default; a required input with neither
/// is an error.
pub fn collect_args(
    task: &TaskSpec,
    base: Map<String, Value>,
    assignments: &[String],
) -> Result<Map<String, Value>, InputError> {
    if let Some(input) = task
        .inputs
        .iter()
        .find(|input| input.required && input.input_type.is_choice() && input.choices.is_empty())
    {
        return Err(InputError::NoChoices(input.name.clone()));
    }

    let mut args = base;
    for raw in assignments {
        let (name, value) = parse_assignment(raw)?;
        let input = task
            .inputs
            .iter()
            .find(|input| input.name == name)
            .ok_or_else(|| InputError::Unknown {
                name: name.to_string(),
                task: task.name.clone(),
            })?;
        if value.trim().is_empty() {
            args.remove(&input.name);
            continue;
        }
        args.insert(input.name.clone(), parse_input_value(input, value)?);
    }

    for input in &task.inputs {
        if args.get(&input.name).is_some_and(|v| !is_empty_answer(v)) {
            continue;
        }
        if let Some(default) = &input.default {
            args.insert(input.name.clone(), default.clone());
            continue;
        }
        if input.required {
            return Err(InputError::MissingRequired(input.name.clone()));
        }
    }
    Ok(args)
}

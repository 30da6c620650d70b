//! Parameter contracts and lenient decoding of planner-supplied arguments.
//!
//! Completion output is loosely typed: numbers arrive as strings, ISBNs as
//! numbers and booleans as `"true"`. Decoding accepts those shapes and rejects
//! everything else with a [`ValidationError`].

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use shelfwise_core::domain::catalog::MAX_QUANTITY;

pub(crate) const QUANTITY_CONSTRAINT: &str = "must be between 1 and 1000000";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
    OrderItems,
}

impl ParameterType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::OrderItems => "list of {isbn: string, quantity: integer}",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub kind: ParameterType,
    pub required: bool,
    pub constraint: Option<&'static str>,
}

impl ParameterSpec {
    pub const fn required(name: &'static str, kind: ParameterType) -> Self {
        Self { name, kind, required: true, constraint: None }
    }

    pub const fn optional(name: &'static str, kind: ParameterType) -> Self {
        Self { name, kind, required: false, constraint: None }
    }

    pub const fn with_constraint(mut self, constraint: &'static str) -> Self {
        self.constraint = Some(constraint);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ParameterContract {
    pub parameters: Vec<ParameterSpec>,
}

impl ParameterContract {
    pub fn new(parameters: Vec<ParameterSpec>) -> Self {
        Self { parameters }
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// One-line form used in planning prompts, e.g.
    /// `isbn: string (required), quantity: integer (required, must be > 0)`.
    pub fn render(&self) -> String {
        if self.parameters.is_empty() {
            return "no parameters".to_string();
        }

        self.parameters
            .iter()
            .map(|spec| {
                let presence = if spec.required { "required" } else { "optional" };
                match spec.constraint {
                    Some(constraint) => {
                        format!("{}: {} ({presence}, {constraint})", spec.name, spec.kind.as_str())
                    }
                    None => format!("{}: {} ({presence})", spec.name, spec.kind.as_str()),
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("parameters must be a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("missing required parameter '{0}'")]
    Missing(String),
    #[error("parameter '{name}' must be {expected}")]
    WrongType { name: String, expected: &'static str },
    #[error("parameter '{name}' {constraint} (got {value})")]
    Constraint { name: String, constraint: &'static str, value: String },
}

/// Borrowed view over a call's parameter object. `null` reads as empty.
pub(crate) struct Params<'a> {
    fields: Option<&'a Map<String, Value>>,
}

impl<'a> Params<'a> {
    pub(crate) fn new(value: &'a Value) -> Result<Self, ValidationError> {
        match value {
            Value::Object(map) => Ok(Self { fields: Some(map) }),
            Value::Null => Ok(Self { fields: None }),
            other => Err(ValidationError::NotAnObject(json_type(other))),
        }
    }

    fn get(&self, name: &str) -> Option<&'a Value> {
        self.fields.and_then(|fields| fields.get(name)).filter(|value| !value.is_null())
    }

    pub(crate) fn optional_string(&self, name: &str) -> Result<Option<String>, ValidationError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => as_string(value)
                .map(|text| Some(text).filter(|text| !text.is_empty()))
                .ok_or_else(|| wrong_type(name, ParameterType::String)),
        }
    }

    pub(crate) fn required_string(&self, name: &str) -> Result<String, ValidationError> {
        self.optional_string(name)?.ok_or_else(|| ValidationError::Missing(name.to_string()))
    }

    pub(crate) fn optional_integer(&self, name: &str) -> Result<Option<i64>, ValidationError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => {
                as_integer(value).map(Some).ok_or_else(|| wrong_type(name, ParameterType::Integer))
            }
        }
    }

    pub(crate) fn required_integer(&self, name: &str) -> Result<i64, ValidationError> {
        self.optional_integer(name)?.ok_or_else(|| ValidationError::Missing(name.to_string()))
    }

    pub(crate) fn optional_decimal(&self, name: &str) -> Result<Option<Decimal>, ValidationError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => {
                as_decimal(value).map(Some).ok_or_else(|| wrong_type(name, ParameterType::Number))
            }
        }
    }

    pub(crate) fn required_decimal(&self, name: &str) -> Result<Decimal, ValidationError> {
        self.optional_decimal(name)?.ok_or_else(|| ValidationError::Missing(name.to_string()))
    }

    pub(crate) fn optional_bool(&self, name: &str) -> Result<Option<bool>, ValidationError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => {
                as_bool(value).map(Some).ok_or_else(|| wrong_type(name, ParameterType::Boolean))
            }
        }
    }

    pub(crate) fn required_list(&self, name: &str) -> Result<&'a [Value], ValidationError> {
        match self.get(name) {
            None => Err(ValidationError::Missing(name.to_string())),
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(wrong_type(name, ParameterType::OrderItems)),
        }
    }
}

/// Quantities run from 1 to [`MAX_QUANTITY`].
pub(crate) fn quantity(name: &str, value: i64) -> Result<i64, ValidationError> {
    if (1..=MAX_QUANTITY).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::Constraint {
            name: name.to_string(),
            constraint: QUANTITY_CONSTRAINT,
            value: value.to_string(),
        })
    }
}

pub(crate) fn non_negative(name: &str, value: Decimal) -> Result<Decimal, ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        Err(ValidationError::Constraint {
            name: name.to_string(),
            constraint: "must be >= 0",
            value: value.to_string(),
        })
    } else {
        Ok(value)
    }
}

fn wrong_type(name: &str, kind: ParameterType) -> ValidationError {
    ValidationError::WrongType { name: name.to_string(), expected: kind.as_str() }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0 && float.abs() < 9.0e15)
                .map(|float| float as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().trim_start_matches('$').to_string(),
        _ => return None,
    };
    Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text)).ok()
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

//! The typed property model every algorithm declares its contract with.
//!
//! - [`PropertyValue`] is the closed set of values a property can hold
//! - [`ValueType`] describes what a property accepts
//! - [`PropertyDescriptor`] is one declared property (name, direction, type, default, validator)
//! - [`PropertySchema`] holds the declarations of one algorithm plus the values bound to them

pub mod schema;
pub mod validator;

pub use schema::PropertySchema;
pub use validator::Validator;

use serde::{Deserialize, Serialize};
use std::fmt;

/// A value bound to a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    String(String),
    FloatArray(Vec<f64>),
    IntegerArray(Vec<i64>),
    StringArray(Vec<String>),
    /// A reference, by name, to a workspace held in the run's workspace store.
    Workspace(String),
}

impl PropertyValue {
    /// Short human-readable name of the variant, used in type errors.
    pub fn kind(&self) -> &'static str {
        match self {
            PropertyValue::Float(_) => "float",
            PropertyValue::Integer(_) => "integer",
            PropertyValue::Boolean(_) => "boolean",
            PropertyValue::String(_) => "string",
            PropertyValue::FloatArray(_) => "float array",
            PropertyValue::IntegerArray(_) => "integer array",
            PropertyValue::StringArray(_) => "string array",
            PropertyValue::Workspace(_) => "workspace",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64_array(&self) -> Option<&[f64]> {
        match self {
            PropertyValue::FloatArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64_array(&self) -> Option<&[i64]> {
        match self {
            PropertyValue::IntegerArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_string_array(&self) -> Option<&[String]> {
        match self {
            PropertyValue::StringArray(v) => Some(v),
            _ => None,
        }
    }

    /// The workspace name if this is a workspace reference.
    pub fn as_workspace(&self) -> Option<&str> {
        match self {
            PropertyValue::Workspace(v) => Some(v),
            _ => None,
        }
    }

    /// Number of elements for arrays, `None` for everything else.
    pub fn array_len(&self) -> Option<usize> {
        match self {
            PropertyValue::FloatArray(v) => Some(v.len()),
            PropertyValue::IntegerArray(v) => Some(v.len()),
            PropertyValue::StringArray(v) => Some(v.len()),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<T: fmt::Display>(items: &[T]) -> String {
            items
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        }

        match self {
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::Integer(v) => write!(f, "{v}"),
            PropertyValue::Boolean(v) => write!(f, "{v}"),
            PropertyValue::String(v) | PropertyValue::Workspace(v) => write!(f, "{v}"),
            PropertyValue::FloatArray(v) => write!(f, "{}", join(v)),
            PropertyValue::IntegerArray(v) => write!(f, "{}", join(v)),
            PropertyValue::StringArray(v) => write!(f, "{}", join(v)),
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Integer(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Boolean(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl From<Vec<f64>> for PropertyValue {
    fn from(v: Vec<f64>) -> Self {
        PropertyValue::FloatArray(v)
    }
}

impl From<Vec<i64>> for PropertyValue {
    fn from(v: Vec<i64>) -> Self {
        PropertyValue::IntegerArray(v)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(v: Vec<String>) -> Self {
        PropertyValue::StringArray(v)
    }
}

/// The type a property accepts.
///
/// Matching is strict: an `Integer` is not accepted where a `Float` is declared,
/// so a value always comes back out of a schema exactly as it went in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Float,
    Integer,
    Boolean,
    String,
    FloatArray,
    IntegerArray,
    StringArray,
    Workspace,
    /// A string restricted to the listed options.
    Enum(Vec<String>),
}

impl ValueType {
    /// Whether `value` has the right shape for this type. Enum membership is
    /// not checked here, see [`ValueType::check_membership`].
    pub fn accepts(&self, value: &PropertyValue) -> bool {
        matches!(
            (self, value),
            (ValueType::Float, PropertyValue::Float(_))
                | (ValueType::Integer, PropertyValue::Integer(_))
                | (ValueType::Boolean, PropertyValue::Boolean(_))
                | (ValueType::String, PropertyValue::String(_))
                | (ValueType::FloatArray, PropertyValue::FloatArray(_))
                | (ValueType::IntegerArray, PropertyValue::IntegerArray(_))
                | (ValueType::StringArray, PropertyValue::StringArray(_))
                | (ValueType::Workspace, PropertyValue::Workspace(_))
                | (ValueType::Enum(_), PropertyValue::String(_))
        )
    }

    pub fn check_membership(&self, value: &PropertyValue) -> Result<(), String> {
        match (self, value) {
            (ValueType::Enum(allowed), PropertyValue::String(s)) if !allowed.contains(s) => Err(
                format!("'{s}' is not one of the allowed values [{}]", allowed.join(", ")),
            ),
            _ => Ok(()),
        }
    }

    /// Parses command-line text into a value of this type.
    ///
    /// Arrays are comma separated; an empty string is an empty array.
    pub fn parse_str(&self, text: &str) -> Result<PropertyValue, String> {
        let text = text.trim();
        let items: Vec<&str> = if text.is_empty() {
            Vec::new()
        } else {
            text.split(',').map(str::trim).collect()
        };

        match self {
            ValueType::Float => text
                .parse::<f64>()
                .map(PropertyValue::Float)
                .map_err(|e| format!("'{text}' is not a number: {e}")),
            ValueType::Integer => text
                .parse::<i64>()
                .map(PropertyValue::Integer)
                .map_err(|e| format!("'{text}' is not an integer: {e}")),
            ValueType::Boolean => match text.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(PropertyValue::Boolean(true)),
                "false" | "0" | "no" => Ok(PropertyValue::Boolean(false)),
                _ => Err(format!("'{text}' is not a boolean")),
            },
            ValueType::String | ValueType::Enum(_) => Ok(PropertyValue::String(text.to_string())),
            ValueType::Workspace => Ok(PropertyValue::Workspace(text.to_string())),
            ValueType::FloatArray => items
                .into_iter()
                .map(|s| s.parse::<f64>().map_err(|e| format!("'{s}' is not a number: {e}")))
                .collect::<Result<Vec<_>, _>>()
                .map(PropertyValue::FloatArray),
            ValueType::IntegerArray => items
                .into_iter()
                .map(|s| s.parse::<i64>().map_err(|e| format!("'{s}' is not an integer: {e}")))
                .collect::<Result<Vec<_>, _>>()
                .map(PropertyValue::IntegerArray),
            ValueType::StringArray => Ok(PropertyValue::StringArray(
                items.into_iter().map(str::to_string).collect(),
            )),
        }
    }

    /// Converts a plain JSON value (as found in a reduction plan) into a value of this type.
    pub fn from_json(&self, json: &serde_json::Value) -> Result<PropertyValue, String> {
        use serde_json::Value;

        let floats = |items: &Vec<Value>| -> Result<Vec<f64>, String> {
            items
                .iter()
                .map(|v| v.as_f64().ok_or_else(|| format!("{v} is not a number")))
                .collect()
        };

        match (self, json) {
            (ValueType::Float, Value::Number(n)) => n
                .as_f64()
                .map(PropertyValue::Float)
                .ok_or_else(|| format!("{n} is not representable as a float")),
            (ValueType::Integer, Value::Number(n)) => n
                .as_i64()
                .map(PropertyValue::Integer)
                .ok_or_else(|| format!("{n} is not an integer")),
            (ValueType::Boolean, Value::Bool(b)) => Ok(PropertyValue::Boolean(*b)),
            (ValueType::FloatArray, Value::Array(items)) => floats(items).map(PropertyValue::FloatArray),
            (ValueType::FloatArray, Value::Number(n)) => n
                .as_f64()
                .map(|v| PropertyValue::FloatArray(vec![v]))
                .ok_or_else(|| format!("{n} is not a number")),
            (ValueType::IntegerArray, Value::Array(items)) => items
                .iter()
                .map(|v| v.as_i64().ok_or_else(|| format!("{v} is not an integer")))
                .collect::<Result<Vec<_>, _>>()
                .map(PropertyValue::IntegerArray),
            (ValueType::StringArray, Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| format!("{v} is not a string"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(PropertyValue::StringArray),
            // Strings fall back to the command-line syntax so "1,2,3" works everywhere
            (_, Value::String(s)) => self.parse_str(s),
            (ty, other) => Err(format!("{other} cannot be used as {ty}")),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Float => write!(f, "float"),
            ValueType::Integer => write!(f, "integer"),
            ValueType::Boolean => write!(f, "boolean"),
            ValueType::String => write!(f, "string"),
            ValueType::FloatArray => write!(f, "float array"),
            ValueType::IntegerArray => write!(f, "integer array"),
            ValueType::StringArray => write!(f, "string array"),
            ValueType::Workspace => write!(f, "workspace"),
            ValueType::Enum(options) => write!(f, "one of [{}]", options.join(", ")),
        }
    }
}

/// Whether a property is read, written, or both by the algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
    InOut,
}

impl Direction {
    pub fn is_input(self) -> bool {
        matches!(self, Direction::Input | Direction::InOut)
    }

    pub fn is_output(self) -> bool {
        matches!(self, Direction::Output | Direction::InOut)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "Input"),
            Direction::Output => write!(f, "Output"),
            Direction::InOut => write!(f, "InOut"),
        }
    }
}

/// One declared property of an algorithm.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    pub name: String,
    pub direction: Direction,
    pub value_type: ValueType,
    pub default: Option<PropertyValue>,
    pub validator: Option<Validator>,
    pub doc: String,
    /// An optional input may stay unbound; steps bound to it see no argument.
    pub optional: bool,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, direction: Direction, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            direction,
            value_type,
            default: None,
            validator: None,
            doc: String::new(),
            optional: false,
        }
    }

    pub fn input(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(name, Direction::Input, value_type)
    }

    pub fn output(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(name, Direction::Output, value_type)
    }

    pub fn in_out(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(name, Direction::InOut, value_type)
    }

    pub fn default(mut self, value: impl Into<PropertyValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// An Input/InOut property with no default has to be bound before execution,
    /// unless declared optional.
    pub fn is_mandatory(&self) -> bool {
        self.direction.is_input() && self.default.is_none() && !self.optional
    }

    /// Runs the type, enum membership and validator checks against `value`.
    pub(crate) fn check(&self, value: &PropertyValue) -> Result<(), crate::core::error::SchemaError> {
        use crate::core::error::SchemaError;

        if !self.value_type.accepts(value) {
            return Err(SchemaError::TypeMismatch {
                name: self.name.clone(),
                expected: self.value_type.to_string(),
                actual: value.kind().to_string(),
            });
        }

        let verdict = self
            .value_type
            .check_membership(value)
            .and_then(|_| match &self.validator {
                Some(v) => v.check(value),
                None => Ok(()),
            });

        verdict.map_err(|message| SchemaError::Validator {
            name: self.name.clone(),
            message,
        })
    }
}

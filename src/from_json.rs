//! Build runtime values from JSON or from any `serde::Serialize` type.
//!
//! JSON objects become [`JsonRecord`]s, so their members can be read with
//! `var.field` references. Arrays become [`Param::List`] and are checked
//! against a slice kind only when an operator consumes them.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value as Json};

use crate::record::Record;
use crate::value::{Environment, Param};

#[derive(Debug, thiserror::Error)]
pub enum FromJsonError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported number {0}: only integers are supported")]
    UnsupportedNumber(serde_json::Number),
    #[error("expected a JSON object at the top level, got {0}")]
    NotAnObject(&'static str),
}

/// A JSON object exposed as a record.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRecord {
    type_name: String,
    fields: BTreeMap<String, Param>,
}

impl JsonRecord {
    pub fn new(type_name: impl Into<String>, members: &Map<String, Json>) -> Result<Self, FromJsonError> {
        let fields = members
            .iter()
            .map(|(name, value)| param_from_json(value).map(|p| (name.clone(), p)))
            .collect::<Result<_, _>>()?;
        Ok(JsonRecord {
            type_name: type_name.into(),
            fields,
        })
    }
}

impl Record for JsonRecord {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn field(&self, name: &str) -> Option<Param> {
        self.fields.get(name).cloned()
    }
}

/// Convert a JSON value into a runtime value.
pub fn param_from_json(value: &Json) -> Result<Param, FromJsonError> {
    match value {
        Json::Null => Ok(Param::Null),
        Json::Bool(b) => Ok(Param::Bool(*b)),
        Json::String(s) => Ok(Param::Str(s.clone())),
        Json::Number(n) => {
            if let Some(u) = n.as_u64() {
                Ok(Param::Int(i128::from(u)))
            } else if let Some(i) = n.as_i64() {
                Ok(Param::Int(i128::from(i)))
            } else {
                Err(FromJsonError::UnsupportedNumber(n.clone()))
            }
        }
        Json::Array(items) => items
            .iter()
            .map(param_from_json)
            .collect::<Result<_, _>>()
            .map(Param::List),
        Json::Object(members) => Ok(Param::record(JsonRecord::new("object", members)?)),
    }
}

/// Serialize a host value and expose it as a runtime value.
///
/// Structs become records whose field names are the serialized names, so
/// `#[serde(rename = "UserId")]` is visible as `request.UserId`.
pub fn to_param<T: Serialize + ?Sized>(value: &T) -> Result<Param, FromJsonError> {
    match serde_json::to_value(value)? {
        Json::Object(members) => {
            let type_name = std::any::type_name::<T>()
                .rsplit("::")
                .next()
                .unwrap_or("object");
            Ok(Param::record(JsonRecord::new(type_name, &members)?))
        }
        other => param_from_json(&other),
    }
}

/// Parse a JSON object into an environment, one variable per member.
pub fn environment_from_json(input: &str) -> Result<Environment, FromJsonError> {
    match serde_json::from_str::<Json>(input)? {
        Json::Object(members) => members
            .iter()
            .map(|(name, value)| param_from_json(value).map(|p| (name.clone(), p)))
            .collect(),
        other => Err(FromJsonError::NotAnObject(json_type(&other))),
    }
}

fn json_type(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

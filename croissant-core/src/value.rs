//! Dynamically typed values flowing through operations and records

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde_json::{Map, Number, Value as JsonValue};

use crate::image::ImageHandle;

/// A record: field name to value
pub type Record = BTreeMap<String, Value>;

/// A single cell or record value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Missing value
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point; `NaN` counts as missing
    Float(f64),
    /// UTF-8 text
    Text(String),
    /// Raw bytes (file contents, undecodable text)
    Bytes(Vec<u8>),
    /// Date or date-time without timezone
    Timestamp(NaiveDateTime),
    /// Encoded image
    Image(ImageHandle),
    /// List of values (repeated fields, bounding boxes, JSON arrays)
    List(Vec<Value>),
    /// Nested record (sub-fields, JSON objects)
    Record(Record),
}

impl Value {
    /// Whether the value is missing (`Null` or `NaN`)
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::Image(_) => "image",
            Value::List(_) => "list",
            Value::Record(_) => "record",
        }
    }

    /// Borrow the text, if this is a text value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// String form of a scalar, used by regex transforms and joins
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) if f.is_nan() => None,
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            Value::Timestamp(ts) => Some(ts.to_string()),
            Value::Image(_) | Value::List(_) | Value::Record(_) => {
                Some(self.to_json().to_string())
            }
        }
    }

    /// Key used to match rows in an equality join
    ///
    /// Integral floats compare equal to integers so that `1` and `1.0` join.
    pub fn join_key(&self) -> Option<String> {
        match self {
            #[allow(clippy::cast_possible_truncation)]
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                Some((*f as i64).to_string())
            }
            other => other.to_text(),
        }
    }

    /// Convert a JSON value
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Value::Text(s.clone()),
            JsonValue::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            JsonValue::Object(object) => Value::Record(
                object
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON for display and interchange
    ///
    /// Bytes become (lossy) text, images a small descriptor object.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::Number((*i).into()),
            Value::Float(f) => Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number),
            Value::Text(s) => JsonValue::String(s.clone()),
            Value::Bytes(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
            Value::Timestamp(ts) => JsonValue::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Value::Image(image) => {
                let mut object = Map::new();
                object.insert(
                    "format".into(),
                    JsonValue::String(image.format().mime_type().into()),
                );
                object.insert("size".into(), JsonValue::Number(image.bytes().len().into()));
                if let Some((width, height)) = image.dimensions() {
                    object.insert("width".into(), JsonValue::Number(width.into()));
                    object.insert("height".into(), JsonValue::Number(height.into()));
                }
                JsonValue::Object(object)
            }
            Value::List(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Record(record) => JsonValue::Object(
                record
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s}"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_detection() {
        assert!(Value::Null.is_null());
        assert!(Value::Float(f64::NAN).is_null());
        assert!(!Value::Float(0.0).is_null());
        assert!(!Value::Text(String::new()).is_null());
    }

    #[test]
    fn test_json_conversion() {
        let json = json!({"a": [1, 2.5, "x", null, true]});
        let value = Value::from_json(&json);
        let Value::Record(record) = &value else {
            panic!("expected a record");
        };
        assert_eq!(
            record["a"],
            Value::List(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::Text("x".into()),
                Value::Null,
                Value::Bool(true),
            ])
        );
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_join_keys() {
        assert_eq!(Value::Int(1).join_key(), Value::Float(1.0).join_key());
        assert_eq!(Value::Text("1".into()).join_key(), Some("1".to_string()));
        assert_eq!(Value::Null.join_key(), None);
        assert_eq!(Value::Float(f64::NAN).join_key(), None);
    }
}

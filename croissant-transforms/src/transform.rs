//! Field transforms applied between extraction and casting
//!
//! A [`TransformChain`] is compiled once per field and applied to every row, so that
//! regular expressions and JSON paths are parsed a single time.

use regex::{NoExpand, Regex};
use serde_json::Value as JsonValue;
use serde_json_path::JsonPath;

use croissant_core::structure::normalize_json_path;
use croissant_core::{Transform, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct Step {
    regex: Option<Regex>,
    json_path: Option<JsonPath>,
    replace: Option<(Regex, String)>,
    separator: Option<String>,
}

impl Step {
    fn compile(transform: &Transform) -> Result<Self> {
        let regex = transform.regex.as_deref().map(Regex::new).transpose()?;
        let json_path = transform
            .json_path
            .as_deref()
            .map(|path| {
                JsonPath::parse(&normalize_json_path(path))
                    .map_err(|e| Error::JsonPath(format!("{path}: {e}")))
            })
            .transpose()?;
        let replace = match transform.replace.as_deref() {
            Some(spec) => {
                let (pattern, replacement) = spec.split_once('/').ok_or_else(|| {
                    Error::Replace(format!(
                        "expected \"pattern/replacement\", got \"{spec}\""
                    ))
                })?;
                Some((Regex::new(pattern)?, replacement.to_string()))
            }
            None => None,
        };
        Ok(Self {
            regex,
            json_path,
            replace,
            separator: transform.separator.clone(),
        })
    }

    fn apply(&self, mut value: Value) -> Value {
        if let Some(regex) = &self.regex {
            value = map_text(value, &|text| capture(regex, text));
        }
        if let Some(path) = &self.json_path {
            value = query(path, value);
        }
        if let Some((pattern, replacement)) = &self.replace {
            value = map_text(value, &|text| {
                Value::Text(pattern.replace_all(text, NoExpand(replacement)).into_owned())
            });
        }
        if let Some(separator) = &self.separator {
            value = map_text(value, &|text| {
                Value::List(text.split(separator.as_str()).map(Value::from).collect())
            });
        }
        value
    }
}

/// First non-empty capturing group of a match anchored at the start of `text`
///
/// The value is returned unchanged when nothing matches.
fn capture(regex: &Regex, text: &str) -> Value {
    let Some(captures) = regex.captures(text) else {
        return Value::from(text);
    };
    if captures.get(0).map_or(true, |m| m.start() != 0) {
        return Value::from(text);
    }
    captures
        .iter()
        .skip(1)
        .flatten()
        .find(|group| !group.as_str().is_empty())
        .map_or_else(|| Value::from(text), |group| Value::from(group.as_str()))
}

fn query(path: &JsonPath, value: Value) -> Value {
    let json = match &value {
        Value::Null => return value,
        Value::Text(text) => match serde_json::from_str::<JsonValue>(text) {
            Ok(json) => json,
            Err(_) => return value,
        },
        Value::Bytes(bytes) => match serde_json::from_slice::<JsonValue>(bytes) {
            Ok(json) => json,
            Err(_) => return value,
        },
        other => other.to_json(),
    };
    let nodes = path.query(&json).all();
    match nodes.as_slice() {
        [] => Value::Null,
        [single] => Value::from_json(single),
        many => Value::List(many.iter().map(|node| Value::from_json(node)).collect()),
    }
}

/// Apply `f` to the text form of scalars, element-wise on lists
fn map_text(value: Value, f: &dyn Fn(&str) -> Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::List(items) => Value::List(items.into_iter().map(|item| map_text(item, f)).collect()),
        Value::Record(_) | Value::Image(_) => value,
        scalar => match scalar.to_text() {
            Some(text) => f(&text),
            None => scalar,
        },
    }
}

/// Compiled list of transforms for one field
#[derive(Debug, Clone, Default)]
pub struct TransformChain {
    steps: Vec<Step>,
}

impl TransformChain {
    /// Compile transforms, failing on invalid regexes or JSON paths
    pub fn new(transforms: &[Transform]) -> Result<Self> {
        let steps = transforms
            .iter()
            .map(Step::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { steps })
    }

    /// Whether the chain does nothing
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Apply every transform in order; missing values pass through
    pub fn apply(&self, value: Value) -> Value {
        if value.is_null() {
            return value;
        }
        self.steps.iter().fold(value, |value, step| step.apply(value))
    }
}

/// Compile and apply transforms in one go
pub fn apply_transforms(value: Value, transforms: &[Transform]) -> Result<Value> {
    Ok(TransformChain::new(transforms)?.apply(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn regex(pattern: &str) -> Transform {
        Transform {
            regex: Some(pattern.to_string()),
            ..Transform::default()
        }
    }

    #[test_case("train/cat/001.jpg", "^(train|test)/.*$", "train")]
    #[test_case("images/001.jpg", r"^.*/(\d+)\.jpg$", "001")]
    #[test_case("no-match", r"^(\d+)$", "no-match")]
    #[test_case("prefix-123", r"(\d+)", "prefix-123")]
    fn test_regex(input: &str, pattern: &str, expected: &str) {
        let value = apply_transforms(Value::from(input), &[regex(pattern)]).unwrap();
        assert_eq!(value, Value::from(expected));
    }

    #[test]
    fn test_regex_skips_empty_groups() {
        let value = apply_transforms(Value::from("abc"), &[regex("^(x?)(abc)$")]).unwrap();
        assert_eq!(value, Value::from("abc"));
        let value = apply_transforms(Value::from("b-12"), &[regex(r"^(a)?b-(\d+)$")]).unwrap();
        assert_eq!(value, Value::from("12"));
    }

    #[test]
    fn test_replace_then_separator() {
        let transform = Transform {
            replace: Some("\\n/<eos>".to_string()),
            separator: Some(" ".to_string()),
            ..Transform::default()
        };
        let value = apply_transforms(Value::from("a b\nc"), &[transform]).unwrap();
        assert_eq!(
            value,
            Value::List(vec![Value::from("a"), Value::from("b<eos>c")])
        );
    }

    #[test]
    fn test_json_path() {
        let transform = Transform {
            json_path: Some("annotations[*].label".to_string()),
            ..Transform::default()
        };
        let value = apply_transforms(
            Value::from(r#"{"annotations": [{"label": "cat"}, {"label": "dog"}]}"#),
            &[transform.clone()],
        )
        .unwrap();
        assert_eq!(value, Value::List(vec![Value::from("cat"), Value::from("dog")]));

        let single = Value::from(r#"{"annotations": [{"label": "cat"}]}"#);
        assert_eq!(apply_transforms(single, &[transform]).unwrap(), Value::from("cat"));
    }

    #[test]
    fn test_null_passes_through() {
        let chain = TransformChain::new(&[regex("(a)")]).unwrap();
        assert_eq!(chain.apply(Value::Null), Value::Null);
        assert!(chain.apply(Value::Float(f64::NAN)).is_null());
    }

    #[test]
    fn test_invalid_definitions() {
        assert!(TransformChain::new(&[regex("(")]).is_err());
        let bad_replace = Transform {
            replace: Some("no-slash".to_string()),
            ..Transform::default()
        };
        assert!(matches!(
            TransformChain::new(&[bad_replace]),
            Err(Error::Replace(_))
        ));
    }

    #[test]
    fn test_numbers_are_transformed_as_text() {
        let value = apply_transforms(Value::Int(2024), &[regex(r"^(\d{2})")]).unwrap();
        assert_eq!(value, Value::from("20"));
    }
}

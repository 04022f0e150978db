//! Casting raw extracted values to declared data types

use croissant_core::{DataType, ImageHandle, Value};

use crate::bounding_box;
use crate::dates;
use crate::error::{Error, Result};

fn cast_error(value: &Value, data_type: &DataType, reason: impl Into<String>) -> Error {
    Error::Cast {
        value: value.to_string(),
        kind: value.type_name(),
        data_type: data_type.clone(),
        reason: reason.into(),
    }
}

fn parse_bool(value: &Value, data_type: &DataType) -> Result<Value> {
    match value {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::Int(i) => Ok(Value::Bool(*i != 0)),
        Value::Float(f) => Ok(Value::Bool(*f != 0.0)),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Ok(Value::Bool(true)),
            "false" | "f" | "no" | "n" | "0" | "" => Ok(Value::Bool(false)),
            _ => Err(cast_error(value, data_type, "not a boolean")),
        },
        _ => Err(cast_error(value, data_type, "not a boolean")),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn parse_int(value: &Value, data_type: &DataType) -> Result<Value> {
    match value {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
        Value::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Value::Int)
                .or_else(|_| {
                    // "3.0" is a valid integer once written by a float-typed writer.
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && f.fract() == 0.0)
                        .map(|f| Value::Int(f as i64))
                        .ok_or(())
                })
                .map_err(|()| cast_error(value, data_type, "not an integer"))
        }
        Value::Bytes(bytes) => parse_int(&Value::Text(String::from_utf8_lossy(bytes).into()), data_type),
        _ => Err(cast_error(value, data_type, "not an integer")),
    }
}

#[allow(clippy::cast_precision_loss)]
fn parse_float(value: &Value, data_type: &DataType) -> Result<Value> {
    match value {
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Bool(b) => Ok(Value::Float(f64::from(u8::from(*b)))),
        Value::Text(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| cast_error(value, data_type, "not a number")),
        Value::Bytes(bytes) => {
            parse_float(&Value::Text(String::from_utf8_lossy(bytes).into()), data_type)
        }
        _ => Err(cast_error(value, data_type, "not a number")),
    }
}

fn to_text(value: Value) -> Value {
    match value {
        Value::Text(_) | Value::List(_) | Value::Record(_) => value,
        Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => Value::Text(text),
            Err(e) => Value::Bytes(e.into_bytes()),
        },
        other => other.to_text().map_or(Value::Null, Value::Text),
    }
}

fn to_timestamp(value: &Value, data_type: &DataType, format: Option<&str>) -> Result<Value> {
    let parsed = match value {
        Value::Timestamp(ts) => return Ok(Value::Timestamp(*ts)),
        Value::Int(seconds) if format.is_none() => dates::from_timestamp(*seconds),
        other => match other.to_text() {
            Some(text) => dates::parse_datetime(&text, format),
            None => return Err(cast_error(value, data_type, "not a date")),
        },
    };
    parsed
        .map(Value::Timestamp)
        .map_err(|e| cast_error(value, data_type, e.to_string()))
}

fn to_image(value: Value, data_type: &DataType) -> Result<Value> {
    match value {
        Value::Image(_) => Ok(value),
        Value::Bytes(bytes) => Ok(Value::Image(crate::image::decode(ImageHandle::new(bytes))?)),
        other => Err(cast_error(
            &other,
            data_type,
            format!("type {} is not accepted for an image", other.type_name()),
        )),
    }
}

/// Cast `value` to `data_type`
///
/// Missing values (`Null`, `NaN`) pass through unchanged whatever the declared type.
/// `format` is the first date format declared among the field's transforms. Unknown
/// semantic types leave the value as extracted. Lists are cast element-wise, except
/// for bounding boxes which consume the whole list.
pub fn cast(value: Value, data_type: &DataType, format: Option<&str>) -> Result<Value> {
    if value.is_null() {
        return Ok(value);
    }
    if let Value::List(items) = value {
        if *data_type == DataType::BoundingBox {
            return bounding_box::parse(&Value::List(items));
        }
        return items
            .into_iter()
            .map(|item| cast(item, data_type, format))
            .collect::<Result<Vec<_>>>()
            .map(Value::List);
    }
    match data_type {
        DataType::Boolean => parse_bool(&value, data_type),
        DataType::Integer => parse_int(&value, data_type),
        DataType::Float => parse_float(&value, data_type),
        DataType::Text | DataType::Url => Ok(to_text(value)),
        DataType::Date | DataType::DateTime => to_timestamp(&value, data_type, format),
        DataType::ImageObject => to_image(value, data_type),
        DataType::BoundingBox => bounding_box::parse(&value),
        DataType::Other(_) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Value::from("42"), DataType::Integer, Value::Int(42))]
    #[test_case(Value::from(" 3.0 "), DataType::Integer, Value::Int(3))]
    #[test_case(Value::Float(2.9), DataType::Integer, Value::Int(2))]
    #[test_case(Value::from("1.5"), DataType::Float, Value::Float(1.5))]
    #[test_case(Value::Int(1), DataType::Float, Value::Float(1.0))]
    #[test_case(Value::from("True"), DataType::Boolean, Value::Bool(true))]
    #[test_case(Value::from("no"), DataType::Boolean, Value::Bool(false))]
    #[test_case(Value::Int(8), DataType::Text, Value::from("8"))]
    #[test_case(Value::Bytes(b"caf\xc3\xa9".to_vec()), DataType::Text, Value::from("café"))]
    #[test_case(Value::from("https://a"), DataType::Url, Value::from("https://a"))]
    #[test_case(Value::from("x"), DataType::Other("cr:Label".into()), Value::from("x"))]
    fn test_scalar_casts(input: Value, data_type: DataType, expected: Value) {
        assert_eq!(cast(input, &data_type, None).unwrap(), expected);
    }

    #[test]
    fn test_date() {
        let value = cast(Value::from("2024-12-10"), &DataType::Date, None).unwrap();
        let Value::Timestamp(ts) = value else { panic!("expected a timestamp") };
        assert_eq!(ts.format("%Y-%m-%dT%H:%M:%S").to_string(), "2024-12-10T00:00:00");

        let value = cast(Value::from("10.12.2024"), &DataType::Date, Some("%d.%m.%Y")).unwrap();
        assert!(matches!(value, Value::Timestamp(_)));
        assert!(cast(Value::from("soon"), &DataType::DateTime, None).is_err());
    }

    #[test]
    fn test_nan_passes_through_every_type() {
        for data_type in [
            DataType::Boolean,
            DataType::Integer,
            DataType::Float,
            DataType::Text,
            DataType::Date,
            DataType::ImageObject,
            DataType::BoundingBox,
        ] {
            let value = cast(Value::Float(f64::NAN), &data_type, None).unwrap();
            assert!(value.is_null());
            assert_eq!(cast(Value::Null, &data_type, None).unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_bounding_box() {
        let value = Value::List((1..=4).map(Value::Int).collect());
        assert_eq!(
            cast(value, &DataType::BoundingBox, None).unwrap(),
            Value::List(vec![
                Value::Float(1.0),
                Value::Float(2.0),
                Value::Float(3.0),
                Value::Float(4.0)
            ])
        );
        let value = Value::List((1..=5).map(Value::Int).collect());
        assert!(cast(value, &DataType::BoundingBox, None).is_err());
    }

    #[test]
    fn test_lists_are_cast_element_wise() {
        let value = Value::List(vec![Value::from("1"), Value::from("2")]);
        assert_eq!(
            cast(value, &DataType::Integer, None).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_invalid_cast_names_the_type() {
        let err = cast(Value::from("abc"), &DataType::Integer, None).unwrap_err();
        assert!(err.to_string().contains("sc:Integer"));
    }

    #[test]
    fn test_image_requires_bytes() {
        let png = b"\x89PNG\r\n\x1a\n rest".to_vec();
        let value = cast(Value::Bytes(png), &DataType::ImageObject, None);
        if cfg!(feature = "image") {
            // Not a real PNG body: the decoder rejects it.
            assert!(value.is_err());
        } else {
            assert!(matches!(value.unwrap(), Value::Image(_)));
        }
        assert!(cast(Value::Int(3), &DataType::ImageObject, None).is_err());
    }
}

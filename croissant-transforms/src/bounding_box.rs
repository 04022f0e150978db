//! Bounding box parsing
//!
//! A box is four coordinates. Manifests store them as a whitespace or comma
//! separated string, a flat list of `4 * n` numbers, or a list of 4-lists. One box
//! yields a flat list of four floats; several boxes yield a list of such lists.

use croissant_core::Value;

use crate::error::{Error, Result};

const COORDINATES: usize = 4;

#[allow(clippy::cast_precision_loss)]
fn coordinate(value: &Value) -> Result<f64> {
    match value {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        Value::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| Error::BoundingBox(format!("\"{s}\" is not a number"))),
        other => Err(Error::BoundingBox(format!(
            "expected a number, got a {}",
            other.type_name()
        ))),
    }
}

fn boxes(coordinates: Vec<f64>) -> Result<Value> {
    if coordinates.is_empty() || coordinates.len() % COORDINATES != 0 {
        return Err(Error::BoundingBox(format!(
            "expected a multiple of {COORDINATES} coordinates, got {}: {coordinates:?}",
            coordinates.len()
        )));
    }
    let to_list = |chunk: &[f64]| Value::List(chunk.iter().copied().map(Value::Float).collect());
    if coordinates.len() == COORDINATES {
        return Ok(to_list(&coordinates));
    }
    Ok(Value::List(
        coordinates.chunks(COORDINATES).map(to_list).collect(),
    ))
}

/// Parse a bounding box or a list of bounding boxes
pub fn parse(value: &Value) -> Result<Value> {
    match value {
        Value::Text(text) => {
            let coordinates = text
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|part| !part.is_empty())
                .map(|part| coordinate(&Value::Text(part.to_string())))
                .collect::<Result<Vec<_>>>()?;
            boxes(coordinates)
        }
        Value::List(items)
            if !items.is_empty() && items.iter().all(|item| matches!(item, Value::List(_))) =>
        {
            let parsed = items
                .iter()
                .filter_map(|item| match item {
                    Value::List(inner) => Some(inner),
                    _ => None,
                })
                .map(|inner| {
                    if inner.len() != COORDINATES {
                        return Err(Error::BoundingBox(format!(
                            "each box needs {COORDINATES} coordinates, got {}",
                            inner.len()
                        )));
                    }
                    let coordinates = inner.iter().map(coordinate).collect::<Result<Vec<_>>>()?;
                    Ok(Value::List(coordinates.into_iter().map(Value::Float).collect()))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::List(parsed))
        }
        Value::List(items) => boxes(items.iter().map(coordinate).collect::<Result<Vec<_>>>()?),
        other => Err(Error::BoundingBox(format!(
            "cannot parse a {} as a bounding box",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn floats(values: &[f64]) -> Value {
        Value::List(values.iter().copied().map(Value::Float).collect())
    }

    #[test]
    fn test_flat_list_of_four() {
        let value = Value::List((1..=4).map(Value::Int).collect());
        assert_eq!(parse(&value).unwrap(), floats(&[1.0, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn test_five_coordinates_is_an_error() {
        let value = Value::List((1..=5).map(Value::Int).collect());
        let err = parse(&value).unwrap_err();
        assert!(err.to_string().contains("got 5"));
    }

    #[test]
    fn test_string_forms() {
        assert_eq!(
            parse(&Value::from("1 2 3 4")).unwrap(),
            floats(&[1.0, 2.0, 3.0, 4.0])
        );
        assert_eq!(
            parse(&Value::from("1.5,2, 3,4")).unwrap(),
            floats(&[1.5, 2.0, 3.0, 4.0])
        );
        assert!(parse(&Value::from("1 2 x 4")).is_err());
    }

    #[test]
    fn test_nested_lists() {
        let value = Value::List(vec![
            Value::List((1..=4).map(Value::Int).collect()),
            Value::List((5..=8).map(Value::Int).collect()),
        ]);
        assert_eq!(
            parse(&value).unwrap(),
            Value::List(vec![floats(&[1.0, 2.0, 3.0, 4.0]), floats(&[5.0, 6.0, 7.0, 8.0])])
        );
        let bad = Value::List(vec![Value::List((1..=3).map(Value::Int).collect())]);
        assert!(parse(&bad).is_err());
    }

    proptest! {
        #[test]
        fn test_flat_lists_chunk_into_boxes(n in 2usize..20, seed in any::<i32>()) {
            let coordinates: Vec<Value> = (0..n * 4)
                .map(|i| Value::Int(i64::from(seed) + i as i64))
                .collect();
            let parsed = parse(&Value::List(coordinates)).unwrap();
            let Value::List(boxes) = parsed else { panic!("expected a list") };
            prop_assert_eq!(boxes.len(), n);
            for b in boxes {
                prop_assert!(matches!(b, Value::List(ref c) if c.len() == 4));
            }
        }

        #[test]
        fn test_bad_lengths_are_rejected(n in 1usize..40) {
            prop_assume!(n % 4 != 0);
            let coordinates: Vec<Value> = (0..n).map(|i| Value::Int(i as i64)).collect();
            prop_assert!(parse(&Value::List(coordinates)).is_err());
        }
    }
}

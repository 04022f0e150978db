//! Semantic data types declared on fields

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::vocab::local_name;

/// Data type declared by a field's `dataType`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// `sc:Boolean`
    Boolean,

    /// `sc:Integer`
    Integer,

    /// `sc:Float` or `sc:Number`
    Float,

    /// `sc:Text`
    Text,

    /// `sc:URL`
    Url,

    /// `sc:Date`
    Date,

    /// `sc:DateTime`
    DateTime,

    /// `sc:ImageObject`, decoded into an image handle
    ImageObject,

    /// `cr:BoundingBox`
    BoundingBox,

    /// Any other semantic type; values pass through uncast
    Other(String),
}

impl DataType {
    /// Parse a data type from its IRI or compact form (`sc:Text`, `https://schema.org/Text`)
    pub fn from_iri(iri: &str) -> Self {
        match local_name(iri) {
            "Boolean" | "Bool" => DataType::Boolean,
            "Integer" | "Int" | "Int8" | "Int16" | "Int32" | "Int64" | "UInt8" | "UInt16"
            | "UInt32" | "UInt64" => DataType::Integer,
            "Float" | "Float16" | "Float32" | "Float64" | "Number" => DataType::Float,
            "Text" => DataType::Text,
            "URL" | "Url" => DataType::Url,
            "Date" => DataType::Date,
            "DateTime" => DataType::DateTime,
            "ImageObject" => DataType::ImageObject,
            "BoundingBox" => DataType::BoundingBox,
            _ => DataType::Other(iri.to_string()),
        }
    }

    /// Pick the type that drives casting among several declared types
    ///
    /// Semantic types that need special decoding win over plain ones, so that
    /// `["sc:ImageObject", "cr:Label"]` decodes images.
    pub fn select(types: &[DataType]) -> Option<DataType> {
        types
            .iter()
            .find(|t| matches!(t, DataType::BoundingBox | DataType::ImageObject))
            .or_else(|| types.iter().find(|t| !matches!(t, DataType::Other(_))))
            .or_else(|| types.first())
            .cloned()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "sc:Boolean"),
            DataType::Integer => write!(f, "sc:Integer"),
            DataType::Float => write!(f, "sc:Float"),
            DataType::Text => write!(f, "sc:Text"),
            DataType::Url => write!(f, "sc:URL"),
            DataType::Date => write!(f, "sc:Date"),
            DataType::DateTime => write!(f, "sc:DateTime"),
            DataType::ImageObject => write!(f, "sc:ImageObject"),
            DataType::BoundingBox => write!(f, "cr:BoundingBox"),
            DataType::Other(iri) => write!(f, "{iri}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("sc:Text", DataType::Text)]
    #[test_case("https://schema.org/Integer", DataType::Integer)]
    #[test_case("http://schema.org/Float", DataType::Float)]
    #[test_case("sc:Number", DataType::Float)]
    #[test_case("cr:BoundingBox", DataType::BoundingBox)]
    #[test_case("ml:BoundingBox", DataType::BoundingBox)]
    #[test_case("sc:Date", DataType::Date)]
    #[test_case("wd:Q48277", DataType::Other("wd:Q48277".into()))]
    fn test_from_iri(iri: &str, expected: DataType) {
        assert_eq!(DataType::from_iri(iri), expected);
    }

    #[test]
    fn test_select_prefers_decoding_types() {
        let types = vec![DataType::Other("cr:Label".into()), DataType::ImageObject];
        assert_eq!(DataType::select(&types), Some(DataType::ImageObject));

        let types = vec![DataType::Other("cr:Label".into()), DataType::Text];
        assert_eq!(DataType::select(&types), Some(DataType::Text));

        assert_eq!(DataType::select(&[]), None);
    }
}

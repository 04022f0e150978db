//! Manifest vocabulary: schema versions, property names and JSON-LD key handling
//!
//! Manifests may spell the same property as `name`, `sc:name` or
//! `https://schema.org/name`. Lookups compare the *local name* of a key so that all
//! spellings resolve to the same property, while unknown keys are kept verbatim for
//! serialization.

use std::fmt;

use serde_json::{Map, Value as JsonValue};

/// Namespace of schema.org properties
pub const SCHEMA_ORG: &str = "https://schema.org/";

/// Croissant 0.8 namespace
pub const ML_COMMONS_V0_8: &str = "http://mlcommons.org/schema/";

/// Croissant 1.0 namespace
pub const ML_COMMONS_V1_0: &str = "http://mlcommons.org/croissant/";

/// Supported revisions of the Croissant vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum CroissantVersion {
    /// Manifests without `conformsTo`
    V0_8,
    /// `http://mlcommons.org/croissant/1.0`
    #[default]
    V1_0,
}

impl CroissantVersion {
    /// Parse the `conformsTo` property; a missing value means 0.8
    pub fn from_conforms_to(value: Option<&str>) -> Result<Self, String> {
        match value {
            None | Some("") => Ok(Self::V0_8),
            Some("http://mlcommons.org/croissant/0.8") => Ok(Self::V0_8),
            Some("http://mlcommons.org/croissant/1.0") => Ok(Self::V1_0),
            Some(other) => Err(format!(
                "conformsTo should be a string or a CroissantVersion. Got: {other}"
            )),
        }
    }

    /// Value written back to `conformsTo`, if any
    pub fn conforms_to(self) -> Option<&'static str> {
        match self {
            Self::V0_8 => None,
            Self::V1_0 => Some("http://mlcommons.org/croissant/1.0"),
        }
    }

    /// Whether this is the 0.8 vocabulary
    pub fn is_v0(self) -> bool {
        self == Self::V0_8
    }

    /// Namespace of Croissant-specific properties
    pub fn namespace(self) -> &'static str {
        match self {
            Self::V0_8 => ML_COMMONS_V0_8,
            Self::V1_0 => ML_COMMONS_V1_0,
        }
    }

    /// Compact prefix used for Croissant-specific types
    pub fn prefix(self) -> &'static str {
        match self {
            Self::V0_8 => "ml",
            Self::V1_0 => "cr",
        }
    }

    /// Full IRI of a Croissant-specific property, used in messages
    pub fn iri(self, property: &str) -> String {
        format!("{}{property}", self.namespace())
    }
}

impl fmt::Display for CroissantVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V0_8 => write!(f, "0.8"),
            Self::V1_0 => write!(f, "1.0"),
        }
    }
}

/// Full IRI of a schema.org property, used in messages
pub fn schema_org(property: &str) -> String {
    format!("{SCHEMA_ORG}{property}")
}

/// Local name of a JSON-LD key or compact IRI
///
/// `sc:name`, `https://schema.org/name` and `name` all give `name`. Keywords such as
/// `@type` are returned unchanged.
pub fn local_name(key: &str) -> &str {
    if key.starts_with('@') {
        return key;
    }
    if key.contains("://") {
        let trimmed = key.trim_end_matches(['/', '#']);
        return trimmed
            .rsplit(['/', '#'])
            .next()
            .unwrap_or(trimmed);
    }
    match key.split_once(':') {
        Some((_, name)) => name,
        None => key,
    }
}

/// Find a property in a JSON object by local name
pub fn lookup<'a>(object: &'a Map<String, JsonValue>, property: &str) -> Option<&'a JsonValue> {
    object
        .iter()
        .find(|(key, _)| local_name(key) == property)
        .map(|(_, value)| value)
}

/// Find the first of several candidate properties
pub fn lookup_any<'a>(
    object: &'a Map<String, JsonValue>,
    properties: &[&'a str],
) -> Option<(&'a str, &'a JsonValue)> {
    properties.iter().find_map(|property| {
        object
            .iter()
            .find(|(key, _)| local_name(key) == *property)
            .map(|(_, value)| (*property, value))
    })
}

/// String value of a property; single-element lists are unwrapped
pub fn lookup_str<'a>(object: &'a Map<String, JsonValue>, property: &str) -> Option<&'a str> {
    lookup(object, property).and_then(as_single_str)
}

/// A string, or a one-element list holding a string
pub fn as_single_str(value: &JsonValue) -> Option<&str> {
    match value {
        JsonValue::String(s) => Some(s.as_str()),
        JsonValue::Array(items) if items.len() == 1 => items[0].as_str(),
        _ => None,
    }
}

/// A string or list of strings
pub fn as_str_list(value: &JsonValue) -> Vec<String> {
    match value {
        JsonValue::String(s) => vec![s.clone()],
        JsonValue::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Keys of an object that are not among `known`, with their original spelling
pub fn extra_properties(
    object: &Map<String, JsonValue>,
    known: &[&str],
) -> Map<String, JsonValue> {
    object
        .iter()
        .filter(|(key, _)| !known.contains(&local_name(key)))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// How a reference to another node was spelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefStyle {
    /// `"containedIn": "archive.zip"`
    #[default]
    Plain,
    /// `"containedIn": {"@id": "archive.zip"}`
    Id,
}

/// References to other nodes, remembering how they were written
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeRefs {
    /// Referenced identifiers
    pub uids: Vec<String>,
    /// Spelling of each reference
    pub style: RefStyle,
    /// Whether the references were written as a list
    pub list: bool,
}

impl NodeRefs {
    /// Parse a reference, a list of references, `{"@id": ...}` objects included
    pub fn parse(value: &JsonValue) -> Option<Self> {
        fn one(value: &JsonValue) -> Option<(String, RefStyle)> {
            match value {
                JsonValue::String(s) => Some((s.clone(), RefStyle::Plain)),
                JsonValue::Object(object) => object
                    .get("@id")
                    .and_then(JsonValue::as_str)
                    .map(|id| (id.to_string(), RefStyle::Id)),
                _ => None,
            }
        }
        match value {
            JsonValue::Array(items) => {
                let parsed: Option<Vec<_>> = items.iter().map(one).collect();
                let parsed = parsed?;
                let style = parsed.first().map_or(RefStyle::Plain, |(_, style)| *style);
                Some(Self {
                    uids: parsed.into_iter().map(|(uid, _)| uid).collect(),
                    style,
                    list: true,
                })
            }
            other => one(other).map(|(uid, style)| Self {
                uids: vec![uid],
                style,
                list: false,
            }),
        }
    }

    /// Whether there are no references
    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }

    /// Serialize back in the original spelling
    pub fn to_json(&self) -> JsonValue {
        let encode = |uid: &String| match self.style {
            RefStyle::Plain => JsonValue::String(uid.clone()),
            RefStyle::Id => {
                let mut object = Map::new();
                object.insert("@id".to_string(), JsonValue::String(uid.clone()));
                JsonValue::Object(object)
            }
        };
        if self.list || self.uids.len() != 1 {
            JsonValue::Array(self.uids.iter().map(encode).collect())
        } else {
            encode(&self.uids[0])
        }
    }
}

/// Strings written either as one string or as a list
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StrList {
    /// The strings
    pub items: Vec<String>,
    /// Whether they were written as a list
    pub list: bool,
}

impl StrList {
    /// Parse a string or a list of strings
    pub fn parse(value: &JsonValue) -> Self {
        Self {
            items: as_str_list(value),
            list: value.is_array(),
        }
    }

    /// Whether there are no strings
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Serialize back in the original shape
    pub fn to_json(&self) -> JsonValue {
        one_or_many(
            self.items.iter().cloned().map(JsonValue::String).collect(),
            self.list,
        )
    }
}

/// A value that may be written either as a single item or as a list
pub fn one_or_many(items: Vec<JsonValue>, list: bool) -> JsonValue {
    if !list && items.len() == 1 {
        items.into_iter().next().unwrap_or(JsonValue::Null)
    } else {
        JsonValue::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("name", "name")]
    #[test_case("sc:name", "name")]
    #[test_case("https://schema.org/name", "name")]
    #[test_case("http://mlcommons.org/croissant/recordSet", "recordSet")]
    #[test_case("dct:conformsTo", "conformsTo")]
    #[test_case("@type", "@type")]
    fn test_local_name(key: &str, expected: &str) {
        assert_eq!(local_name(key), expected);
    }

    #[test]
    fn test_versions() {
        assert_eq!(
            CroissantVersion::from_conforms_to(None),
            Ok(CroissantVersion::V0_8)
        );
        assert_eq!(
            CroissantVersion::from_conforms_to(Some("http://mlcommons.org/croissant/1.0")),
            Ok(CroissantVersion::V1_0)
        );
        assert!(CroissantVersion::from_conforms_to(Some("2.0")).is_err());
        assert!(CroissantVersion::V0_8 < CroissantVersion::V1_0);
        assert_eq!(
            CroissantVersion::V1_0.iri("includes"),
            "http://mlcommons.org/croissant/includes"
        );
    }

    #[test]
    fn test_lookup_by_local_name() {
        let object = json!({"sc:name": "a", "cr:includes": "*.csv"});
        let object = object.as_object().unwrap();
        assert_eq!(lookup_str(object, "name"), Some("a"));
        assert_eq!(lookup_str(object, "includes"), Some("*.csv"));
        assert!(lookup(object, "missing").is_none());
        assert!(extra_properties(object, &["name"]).contains_key("cr:includes"));
    }

    #[test]
    fn test_lookup_any_returns_first_candidate_present() {
        let object = json!({"cr:fileSet": {"@id": "images"}, "cr:field": {"@id": "a/b"}});
        let object = object.as_object().unwrap();
        let (key, value) = lookup_any(object, &["fileObject", "fileSet", "field"]).unwrap();
        assert_eq!(key, "fileSet");
        assert_eq!(value, &json!({"@id": "images"}));
        assert!(lookup_any(object, &["distribution"]).is_none());
    }

    #[test]
    fn test_refs_keep_their_spelling() {
        let plain = json!("archive.zip");
        let refs = NodeRefs::parse(&plain).unwrap();
        assert_eq!(refs.uids, vec!["archive.zip"]);
        assert_eq!(refs.to_json(), plain);

        let ids = json!([{"@id": "a"}, {"@id": "b"}]);
        let refs = NodeRefs::parse(&ids).unwrap();
        assert_eq!(refs.uids, vec!["a", "b"]);
        assert_eq!(refs.style, RefStyle::Id);
        assert_eq!(refs.to_json(), ids);

        assert!(NodeRefs::parse(&json!(3)).is_none());
    }
}

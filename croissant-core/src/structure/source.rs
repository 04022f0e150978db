//! Sources: where a field's values come from and how they are post-processed

use std::fmt;

use serde_json::{Map, Value as JsonValue};

use crate::issues::{IssueContext, Issues};
use crate::vocab::{self, lookup, lookup_any, CroissantVersion, RefStyle};

/// Intrinsic properties of a file that a field can extract
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileProperty {
    /// Whole content of the file
    Content,
    /// Name of the file
    Filename,
    /// Path of the file on disk
    Filepath,
    /// Path of the file relative to its resource root
    Fullpath,
    /// One row per line of the file
    Lines,
    /// Index of the line, alongside `Lines`
    LineNumbers,
}

impl FileProperty {
    /// All file properties
    pub const ALL: [FileProperty; 6] = [
        FileProperty::Content,
        FileProperty::Filename,
        FileProperty::Filepath,
        FileProperty::Fullpath,
        FileProperty::Lines,
        FileProperty::LineNumbers,
    ];

    /// Parse the manifest spelling
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == value)
    }

    /// Manifest spelling; also the name of the column holding the property
    pub fn as_str(self) -> &'static str {
        match self {
            FileProperty::Content => "content",
            FileProperty::Filename => "filename",
            FileProperty::Filepath => "filepath",
            FileProperty::Fullpath => "fullpath",
            FileProperty::Lines => "lines",
            FileProperty::LineNumbers => "lineNumbers",
        }
    }
}

impl fmt::Display for FileProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How to extract values from a resource
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Extract {
    /// Column of a tabular file
    pub column: Option<String>,
    /// Intrinsic file property
    pub file_property: Option<FileProperty>,
    /// JSON path inside a JSON document
    pub json_path: Option<String>,
}

impl Extract {
    /// Whether nothing is extracted explicitly
    pub fn is_empty(&self) -> bool {
        self.column.is_none() && self.file_property.is_none() && self.json_path.is_none()
    }

    fn to_json(&self) -> JsonValue {
        let mut object = Map::new();
        if let Some(column) = &self.column {
            object.insert("column".into(), JsonValue::String(column.clone()));
        }
        if let Some(property) = self.file_property {
            object.insert("fileProperty".into(), JsonValue::String(property.as_str().into()));
        }
        if let Some(path) = &self.json_path {
            object.insert("jsonPath".into(), JsonValue::String(path.clone()));
        }
        JsonValue::Object(object)
    }
}

/// Post-extraction transformation
///
/// Several operations may be declared in the same object; they apply in the order
/// `regex`, `jsonPath`, `replace`, `separator`. `format` is consumed by date casting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transform {
    /// Keep the first capturing group of this regex
    pub regex: Option<String>,
    /// `pattern/replacement`
    pub replace: Option<String>,
    /// Format used to parse dates
    pub format: Option<String>,
    /// Split text into a list on this separator
    pub separator: Option<String>,
    /// Query inside a JSON value
    pub json_path: Option<String>,
}

impl Transform {
    fn parse(object: &Map<String, JsonValue>) -> Self {
        let get = |property| vocab::lookup_str(object, property).map(str::to_string);
        Self {
            regex: get("regex"),
            replace: get("replace"),
            format: get("format"),
            separator: get("separator"),
            json_path: get("jsonPath"),
        }
    }

    fn to_json(&self) -> JsonValue {
        let mut object = Map::new();
        let entries = [
            ("regex", &self.regex),
            ("replace", &self.replace),
            ("format", &self.format),
            ("separator", &self.separator),
            ("jsonPath", &self.json_path),
        ];
        for (key, value) in entries {
            if let Some(value) = value {
                object.insert(key.into(), JsonValue::String(value.clone()));
            }
        }
        JsonValue::Object(object)
    }
}

/// Kind of node a source points to, as spelled in the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// `distribution` (0.8): a FileObject or FileSet
    Distribution,
    /// `fileObject` (1.0)
    FileObject,
    /// `fileSet` (1.0)
    FileSet,
    /// `field`: another RecordSet's field
    Field,
}

impl SourceKind {
    /// Manifest key of this kind
    pub fn key(self) -> &'static str {
        match self {
            SourceKind::Distribution => "distribution",
            SourceKind::FileObject => "fileObject",
            SourceKind::FileSet => "fileSet",
            SourceKind::Field => "field",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key {
            "distribution" => Some(SourceKind::Distribution),
            "fileObject" => Some(SourceKind::FileObject),
            "fileSet" => Some(SourceKind::FileSet),
            "field" => Some(SourceKind::Field),
            _ => None,
        }
    }
}

/// Pointer into a resource or another field, with extraction and transforms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Identifier of the referenced node
    pub uid: String,
    /// Kind of the referenced node
    pub kind: SourceKind,
    /// Spelling of the reference
    pub style: RefStyle,
    /// Extraction mode
    pub extract: Extract,
    /// Transforms applied after extraction
    pub transforms: Vec<Transform>,
    transforms_list: bool,
}

impl Source {
    /// Create a source pointing at `uid`
    pub fn new(uid: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            uid: uid.into(),
            kind,
            style: RefStyle::Plain,
            extract: Extract::default(),
            transforms: Vec::new(),
            transforms_list: false,
        }
    }

    /// Parse a `source` or `references` property, recording problems in `issues`
    pub fn parse(
        value: &JsonValue,
        version: CroissantVersion,
        issues: &Issues,
        ctx: &IssueContext,
    ) -> Option<Self> {
        let object = match value {
            JsonValue::Object(object) => object,
            JsonValue::Array(items) if items.len() == 1 => {
                return Self::parse(&items[0], version, issues, ctx);
            }
            JsonValue::Array(items) => {
                issues.add_error(
                    ctx,
                    format!("Field {value} should have one element. Got: {}.", items.len()),
                );
                return None;
            }
            other => {
                issues.add_error(ctx, format!("`source` has wrong type: {other}"));
                return None;
            }
        };

        let origins: &[&str] = if version.is_v0() {
            &["distribution", "field"]
        } else {
            &["fileObject", "fileSet", "field", "distribution"]
        };
        let Some((key, reference)) = lookup_any(object, origins) else {
            let expected: Vec<String> = origins
                .iter()
                .map(|origin| match *origin {
                    "distribution" => vocab::schema_org(origin),
                    _ => version.iri(origin),
                })
                .collect();
            issues.add_error(
                ctx,
                format!(
                    "Every {} should declare either {}",
                    version.iri("source"),
                    expected.join(" or ")
                ),
            );
            return None;
        };
        let Some(refs) = vocab::NodeRefs::parse(reference) else {
            issues.add_error(ctx, format!("Malformed `source`: {value}"));
            return None;
        };
        let Some(uid) = refs.uids.into_iter().next() else {
            issues.add_error(ctx, format!("Malformed `source`: {value}"));
            return None;
        };
        let kind = SourceKind::from_key(key).unwrap_or(SourceKind::Distribution);

        let extract = match lookup(object, "extract") {
            Some(extract) => Self::parse_extract(extract, version, issues, ctx),
            None => Extract::default(),
        };

        let (transforms, transforms_list) = match lookup(object, "transform") {
            Some(JsonValue::Object(transform)) => (vec![Transform::parse(transform)], false),
            Some(JsonValue::Array(items)) => (
                items
                    .iter()
                    .filter_map(JsonValue::as_object)
                    .map(Transform::parse)
                    .collect(),
                true,
            ),
            Some(other) => {
                issues.add_error(ctx, format!("Malformed `transform`: {other}"));
                (Vec::new(), false)
            }
            None => (Vec::new(), false),
        };
        for transform in &transforms {
            if let Some(path) = &transform.json_path {
                check_json_path(path, issues, ctx);
            }
            if let Some(regex) = &transform.regex {
                if let Err(e) = regex::Regex::new(regex) {
                    issues.add_error(ctx, format!("Wrong regex \"{regex}\": {e}"));
                }
            }
        }

        Some(Self {
            uid,
            kind,
            style: refs.style,
            extract,
            transforms,
            transforms_list,
        })
    }

    fn parse_extract(
        value: &JsonValue,
        version: CroissantVersion,
        issues: &Issues,
        ctx: &IssueContext,
    ) -> Extract {
        let object = match value {
            JsonValue::Object(object) => object,
            JsonValue::Array(items) => match items.first().and_then(JsonValue::as_object) {
                Some(object) => object,
                None => return Extract::default(),
            },
            other => {
                issues.add_error(ctx, format!("Malformed `extract`: {other}"));
                return Extract::default();
            }
        };
        let declared = object.keys().filter(|key| key.as_str() != "@id").count();
        if declared > 1 {
            issues.add_error(
                ctx,
                format!(
                    "{} should have one of the following properties: {}, {} or {}",
                    version.iri("extract"),
                    version.iri("column"),
                    version.iri("fileProperty"),
                    version.iri("jsonPath"),
                ),
            );
        }
        let file_property = match vocab::lookup_str(object, "fileProperty") {
            Some(raw) => {
                let property = FileProperty::parse(raw);
                if property.is_none() {
                    issues.add_error(
                        ctx,
                        format!(
                            "Property {} can only have values in `fullpath`, `filepath`, \
                             `filename`, `content`, `lines` and `lineNumbers`. Got: {raw}",
                            version.iri("fileProperty")
                        ),
                    );
                }
                property
            }
            None => None,
        };
        let json_path = vocab::lookup_str(object, "jsonPath").map(str::to_string);
        if let Some(path) = &json_path {
            check_json_path(path, issues, ctx);
        }
        Extract {
            column: vocab::lookup_str(object, "column").map(str::to_string),
            file_property,
            json_path,
        }
    }

    /// Name of the column holding the extracted values in the upstream table
    ///
    /// For field sources this is the last segment of the uid; the structure graph
    /// resolves it to the referenced field's name.
    pub fn column(&self) -> String {
        if let Some(column) = &self.extract.column {
            column.clone()
        } else if let Some(property) = self.extract.file_property {
            property.as_str().to_string()
        } else if let Some(path) = &self.extract.json_path {
            path.clone()
        } else {
            self.uid.rsplit('/').next().unwrap_or(&self.uid).to_string()
        }
    }

    /// Format declared among the transforms, used to parse dates
    pub fn format(&self) -> Option<&str> {
        self.transforms.iter().find_map(|t| t.format.as_deref())
    }

    /// Serialize back to JSON-LD
    pub fn to_json(&self) -> JsonValue {
        let mut object = Map::new();
        let reference = vocab::NodeRefs {
            uids: vec![self.uid.clone()],
            style: self.style,
            list: false,
        };
        object.insert(self.kind.key().into(), reference.to_json());
        if !self.extract.is_empty() {
            object.insert("extract".into(), self.extract.to_json());
        }
        if !self.transforms.is_empty() {
            let transforms = self.transforms.iter().map(Transform::to_json).collect();
            object.insert(
                "transform".into(),
                vocab::one_or_many(transforms, self.transforms_list),
            );
        }
        JsonValue::Object(object)
    }
}

/// JSON paths in manifests may omit the leading `$`
pub fn normalize_json_path(path: &str) -> String {
    if path.starts_with('$') {
        path.to_string()
    } else if path.starts_with('[') {
        format!("${path}")
    } else {
        format!("$.{path}")
    }
}

fn check_json_path(path: &str, issues: &Issues, ctx: &IssueContext) {
    if let Err(e) = serde_json_path::JsonPath::parse(&normalize_json_path(path)) {
        issues.add_error(
            ctx,
            format!("Wrong JSONPath (https://goessner.net/articles/JsonPath/): {e}"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: &JsonValue, version: CroissantVersion) -> (Option<Source>, Issues) {
        let issues = Issues::new();
        let source = Source::parse(value, version, &issues, &IssueContext::new());
        (source, issues)
    }

    #[test]
    fn test_v1_file_object_source() {
        let json = json!({
            "fileObject": {"@id": "ratings.csv"},
            "extract": {"column": "rating"},
            "transform": {"regex": "^(\\d+)$"}
        });
        let (source, issues) = parse(&json, CroissantVersion::V1_0);
        let source = source.unwrap();
        assert!(!issues.has_errors());
        assert_eq!(source.uid, "ratings.csv");
        assert_eq!(source.kind, SourceKind::FileObject);
        assert_eq!(source.column(), "rating");
        assert_eq!(source.transforms[0].regex.as_deref(), Some("^(\\d+)$"));
        assert_eq!(source.to_json(), json);
    }

    #[test]
    fn test_v0_field_source_column_defaults_to_last_segment() {
        let json = json!({"field": "movies/movie_id"});
        let (source, _) = parse(&json, CroissantVersion::V0_8);
        let source = source.unwrap();
        assert_eq!(source.kind, SourceKind::Field);
        assert_eq!(source.column(), "movie_id");
        assert_eq!(source.to_json(), json);
    }

    #[test]
    fn test_missing_origin_is_an_error() {
        let (source, issues) = parse(&json!({"extract": {"column": "a"}}), CroissantVersion::V1_0);
        assert!(source.is_none());
        let errors = issues.errors();
        assert!(errors[0].message.contains("should declare either"));
    }

    #[test]
    fn test_bad_extract() {
        let json = json!({
            "fileSet": "images",
            "extract": {"fileProperty": "size", "column": "x"}
        });
        let (source, issues) = parse(&json, CroissantVersion::V1_0);
        assert!(source.is_some());
        let messages: Vec<String> = issues.errors().into_iter().map(|i| i.message).collect();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().any(|m| m.contains("Got: size")));
    }

    #[test]
    fn test_invalid_json_path() {
        let json = json!({"fileObject": "a.json", "extract": {"jsonPath": "$[?"}});
        let (_, issues) = parse(&json, CroissantVersion::V1_0);
        assert!(issues.errors()[0].message.starts_with("Wrong JSONPath"));
    }

    #[test]
    fn test_normalize_json_path() {
        assert_eq!(normalize_json_path("$.a"), "$.a");
        assert_eq!(normalize_json_path("a.b"), "$.a.b");
        assert_eq!(normalize_json_path("[0]"), "$[0]");
    }
}

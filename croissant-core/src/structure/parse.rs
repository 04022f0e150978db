//! First pass of the structure graph builder: JSON-LD to typed nodes
//!
//! Every check that only needs the node itself runs here. Problems are recorded in
//! the issue ledger and parsing carries on, so that one run reports everything.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value as JsonValue};

use crate::data_type::DataType;
use crate::issues::{ContextKind, IssueContext, Issues};
use crate::structure::nodes::{
    Field, FileObject, FileSet, Metadata, Node, NodeId, NodeInfo, RecordSet,
};
use crate::structure::source::Source;
use crate::vocab::{
    self, extra_properties, lookup, lookup_str, schema_org, CroissantVersion, NodeRefs,
    StrList,
};

/// Maximum length of a node name
pub const MAX_NAME_LENGTH: usize = 255;

static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9\-_\.]+$").unwrap_or_else(|e| unreachable!("{e}"))
});

const COMMON_KEYS: &[&str] = &["@type", "@id", "name", "description"];
const METADATA_KEYS: &[&str] = &["@context", "distribution", "recordSet"];
const FILE_OBJECT_KEYS: &[&str] = &[
    "contentUrl",
    "encodingFormat",
    "md5",
    "sha256",
    "containedIn",
];
const FILE_SET_KEYS: &[&str] = &["includes", "excludes", "encodingFormat", "containedIn"];
const RECORD_SET_KEYS: &[&str] = &["field", "data", "key"];
const FIELD_KEYS: &[&str] = &[
    "dataType",
    "source",
    "references",
    "subField",
    "repeated",
];

fn known_keys(specific: &[&'static str]) -> Vec<&'static str> {
    COMMON_KEYS.iter().chain(specific).copied().collect()
}

/// Arena under construction
pub(crate) struct Parser<'a> {
    issues: &'a Issues,
    version: CroissantVersion,
    live_dataset: bool,
    pub(crate) nodes: Vec<Node>,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(issues: &'a Issues, live_dataset: bool) -> Self {
        Self {
            issues,
            version: CroissantVersion::default(),
            live_dataset,
            nodes: Vec::new(),
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn error(&self, ctx: &IssueContext, message: impl Into<String>) {
        self.issues.add_error(ctx, message);
    }

    fn mandatory(&self, ctx: &IssueContext, iri: &str) {
        self.error(ctx, format!("Property \"{iri}\" is mandatory, but does not exist."));
    }

    fn recommended(&self, ctx: &IssueContext, iri: &str) {
        self.issues
            .add_warning(ctx, format!("Property \"{iri}\" is recommended, but does not exist."));
    }

    fn check_name(&self, ctx: &IssueContext, name: &str) {
        if name.chars().count() > MAX_NAME_LENGTH {
            self.error(
                ctx,
                format!("The name \"{name}\" is too long (>{MAX_NAME_LENGTH} characters)."),
            );
        }
        // In 0.8 names double as identifiers and must be safe to join with `/`.
        if self.version.is_v0() && !NAME_REGEX.is_match(name) {
            self.error(
                ctx,
                format!(
                    "The name \"{name}\" contains forbidden characters. Accepted regex: {}",
                    NAME_REGEX.as_str()
                ),
            );
        }
    }

    /// Shared attributes; `fallback_uid` is used when no `@id` is declared
    fn info(
        &self,
        object: &Map<String, JsonValue>,
        ctx: IssueContext,
        fallback_uid: impl FnOnce(&str) -> String,
        known: &[&'static str],
    ) -> NodeInfo {
        let name = lookup_str(object, "name").unwrap_or_default().to_string();
        let id = object.get("@id").and_then(JsonValue::as_str).map(str::to_string);
        let uid = match (&id, self.version) {
            (Some(id), CroissantVersion::V1_0) => id.clone(),
            _ => fallback_uid(&name),
        };
        NodeInfo {
            uid,
            name,
            id,
            description: lookup_str(object, "description").map(str::to_string),
            raw_type: object.get("@type").and_then(vocab::as_single_str).map(str::to_string),
            context: ctx,
            extra: extra_properties(object, &known_keys(known)),
        }
    }

    fn type_of(object: &Map<String, JsonValue>) -> Option<&str> {
        object
            .get("@type")
            .and_then(vocab::as_single_str)
            .map(vocab::local_name)
    }

    /// Parse the whole manifest; returns the root node
    pub(crate) fn parse_manifest(&mut self, json: &JsonValue) -> NodeId {
        let empty = Map::new();
        let object = match json {
            JsonValue::Object(object) => object,
            other => {
                self.error(
                    &IssueContext::new(),
                    format!("The manifest should be a JSON object. Got: {other}"),
                );
                &empty
            }
        };

        let conforms_to = lookup_str(object, "conformsTo");
        self.version = match CroissantVersion::from_conforms_to(conforms_to) {
            Ok(version) => version,
            Err(message) => {
                self.error(&IssueContext::new(), message);
                CroissantVersion::V0_8
            }
        };

        let name = lookup_str(object, "name").unwrap_or_default();
        let ctx = IssueContext::new().child(ContextKind::Dataset, name);
        let info = self.info(object, ctx.clone(), str::to_string, METADATA_KEYS);
        if info.name.is_empty() {
            self.mandatory(&ctx, &schema_org("name"));
        }
        if Self::type_of(object) != Some("Dataset") {
            self.error(
                &ctx,
                "The current JSON-LD doesn't extend https://schema.org/Dataset.",
            );
        }
        if lookup(object, "license").is_none() {
            self.recommended(&ctx, &schema_org("license"));
        }
        if lookup(object, "url").is_none() {
            self.recommended(&ctx, &schema_org("url"));
        }
        let citation = if self.version.is_v0() { "citation" } else { "citeAs" };
        if lookup(object, "citeAs").is_none() && lookup(object, "citation").is_none() {
            let iri = if self.version.is_v0() {
                schema_org(citation)
            } else {
                self.version.iri(citation)
            };
            self.recommended(&ctx, &iri);
        }
        let is_live_dataset = lookup(object, "isLiveDataset")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);

        let root = self.push(Node::Metadata(Metadata {
            info,
            version: self.version,
            json_context: object.get("@context").cloned(),
            is_live_dataset,
            distribution: Vec::new(),
            record_sets: Vec::new(),
        }));

        let live = self.live_dataset || is_live_dataset;
        let mut distribution = Vec::new();
        if let Some(items) = lookup(object, "distribution") {
            for item in as_objects(items) {
                if let Some(id) = self.parse_distribution(item, &ctx, live) {
                    distribution.push(id);
                }
            }
        }
        let mut record_sets = Vec::new();
        if let Some(items) = lookup(object, "recordSet") {
            for item in as_objects(items) {
                record_sets.push(self.parse_record_set(item, &ctx));
            }
        }
        if let Node::Metadata(metadata) = &mut self.nodes[root.0] {
            metadata.distribution = distribution;
            metadata.record_sets = record_sets;
        }
        root
    }

    fn parse_distribution(
        &mut self,
        object: &Map<String, JsonValue>,
        parent: &IssueContext,
        live: bool,
    ) -> Option<NodeId> {
        match Self::type_of(object) {
            Some("FileObject") => Some(self.parse_file_object(object, parent, live)),
            Some("FileSet") => Some(self.parse_file_set(object, parent)),
            other => {
                let prefix = if self.version.is_v0() { "sc" } else { "cr" };
                self.error(
                    parent,
                    format!(
                        "\"distribution\" should have an attribute \"@type\": \
                         \"{prefix}:FileObject\" or \"{prefix}:FileSet\". Got {} instead.",
                        other.unwrap_or("nothing")
                    ),
                );
                None
            }
        }
    }

    fn parse_file_object(
        &mut self,
        object: &Map<String, JsonValue>,
        parent: &IssueContext,
        live: bool,
    ) -> NodeId {
        let name = lookup_str(object, "name").unwrap_or_default();
        let ctx = parent.child(ContextKind::FileObject, name);
        let info = self.info(object, ctx.clone(), str::to_string, FILE_OBJECT_KEYS);
        self.check_common(&info, &ctx);

        let encoding_formats = lookup(object, "encodingFormat")
            .map(StrList::parse)
            .unwrap_or_default();
        if encoding_formats.is_empty() {
            self.mandatory(&ctx, &schema_org("encodingFormat"));
        }
        let contained_in = self.parse_refs(object, "containedIn", &ctx);
        let content_url = lookup_str(object, "contentUrl").map(str::to_string);
        let md5 = lookup_str(object, "md5").map(str::to_string);
        let sha256 = lookup_str(object, "sha256").map(str::to_string);
        if contained_in.is_none() {
            if content_url.is_none() {
                self.mandatory(&ctx, &schema_org("contentUrl"));
            }
            if !live {
                match (&md5, &sha256) {
                    (None, None) => self.error(
                        &ctx,
                        format!(
                            "The node doesn't define any of the mandatory properties: \
                             {}, {}",
                            schema_org("md5"),
                            schema_org("sha256")
                        ),
                    ),
                    (Some(_), Some(_)) => self.error(
                        &ctx,
                        format!(
                            "The node defines both {} and {}, but only one checksum is allowed.",
                            schema_org("md5"),
                            schema_org("sha256")
                        ),
                    ),
                    _ => {}
                }
            }
        }

        self.push(Node::FileObject(FileObject {
            info,
            content_url,
            encoding_formats,
            md5,
            sha256,
            contained_in,
        }))
    }

    fn parse_file_set(&mut self, object: &Map<String, JsonValue>, parent: &IssueContext) -> NodeId {
        let name = lookup_str(object, "name").unwrap_or_default();
        let ctx = parent.child(ContextKind::FileSet, name);
        let info = self.info(object, ctx.clone(), str::to_string, FILE_SET_KEYS);
        self.check_common(&info, &ctx);

        let includes = lookup(object, "includes").map(StrList::parse).unwrap_or_default();
        if includes.is_empty() {
            self.mandatory(&ctx, &self.version.iri("includes"));
        }
        let encoding_formats = lookup(object, "encodingFormat")
            .map(StrList::parse)
            .unwrap_or_default();
        if encoding_formats.is_empty() {
            self.mandatory(&ctx, &schema_org("encodingFormat"));
        }
        let contained_in = self.parse_refs(object, "containedIn", &ctx);

        self.push(Node::FileSet(FileSet {
            info,
            includes,
            excludes: lookup(object, "excludes").map(StrList::parse).unwrap_or_default(),
            encoding_formats,
            contained_in,
        }))
    }

    fn parse_record_set(&mut self, object: &Map<String, JsonValue>, parent: &IssueContext) -> NodeId {
        let name = lookup_str(object, "name").unwrap_or_default();
        let ctx = parent.child(ContextKind::RecordSet, name);
        let info = self.info(object, ctx.clone(), str::to_string, RECORD_SET_KEYS);
        self.check_common(&info, &ctx);
        if info.description.is_none() {
            self.recommended(&ctx, &schema_org("description"));
        }
        if let Some(kind) = Self::type_of(object) {
            if kind != "RecordSet" {
                self.error(
                    &ctx,
                    format!("Expected @type {}:RecordSet. Got {kind}.", self.version.prefix()),
                );
            }
        }
        let rs_uid = info.uid.clone();
        let key = self.parse_refs(object, "key", &ctx);
        let data = lookup(object, "data").cloned();

        let id = self.push(Node::RecordSet(RecordSet {
            info,
            fields: Vec::new(),
            data,
            key,
        }));

        let mut fields = Vec::new();
        if let Some(items) = lookup(object, "field") {
            for item in as_objects(items) {
                fields.push(self.parse_field(item, &ctx, id, &rs_uid, None));
            }
        }
        if fields.is_empty() {
            self.mandatory(&ctx, &self.version.iri("field"));
        }
        if let Node::RecordSet(record_set) = &mut self.nodes[id.0] {
            record_set.fields = fields;
        }
        id
    }

    fn parse_field(
        &mut self,
        object: &Map<String, JsonValue>,
        parent_ctx: &IssueContext,
        record_set: NodeId,
        parent_uid: &str,
        parent_field: Option<NodeId>,
    ) -> NodeId {
        let name = lookup_str(object, "name").unwrap_or_default();
        let kind = if parent_field.is_some() {
            ContextKind::SubField
        } else {
            ContextKind::Field
        };
        let ctx = parent_ctx.child(kind, name);
        let info = self.info(
            object,
            ctx.clone(),
            |name| format!("{parent_uid}/{name}"),
            FIELD_KEYS,
        );
        self.check_common(&info, &ctx);
        if let Some(kind) = Self::type_of(object) {
            if kind != "Field" && kind != "SubField" {
                self.error(
                    &ctx,
                    format!("Expected @type {}:Field. Got {kind}.", self.version.prefix()),
                );
            }
        }

        let raw_data_type = lookup(object, "dataType").cloned();
        let data_types = raw_data_type
            .as_ref()
            .map(|value| {
                vocab::as_str_list(value)
                    .iter()
                    .map(|iri| DataType::from_iri(iri))
                    .collect()
            })
            .unwrap_or_default();
        let source = lookup(object, "source")
            .and_then(|value| Source::parse(value, self.version, self.issues, &ctx));
        let references = lookup(object, "references")
            .and_then(|value| Source::parse(value, self.version, self.issues, &ctx));
        let repeated = lookup(object, "repeated").and_then(JsonValue::as_bool);
        let uid = info.uid.clone();
        let has_source = source.is_some();

        let id = self.push(Node::Field(Field {
            info,
            record_set: Some(record_set),
            parent: parent_field,
            data_types,
            raw_data_type,
            source,
            references,
            sub_fields: Vec::new(),
            repeated,
            source_node: None,
            references_node: None,
        }));

        let mut sub_fields = Vec::new();
        if let Some(items) = lookup(object, "subField") {
            for item in as_objects(items) {
                sub_fields.push(self.parse_field(item, &ctx, record_set, &uid, Some(id)));
            }
        }
        if has_source && !sub_fields.is_empty() {
            self.error(
                &ctx,
                format!("Field \"{uid}\" has sub-fields and must not declare a source."),
            );
        }
        if let Node::Field(field) = &mut self.nodes[id.0] {
            field.sub_fields = sub_fields;
        }
        id
    }

    fn check_common(&self, info: &NodeInfo, ctx: &IssueContext) {
        if info.name.is_empty() {
            self.mandatory(ctx, &schema_org("name"));
        } else {
            self.check_name(ctx, &info.name);
        }
    }

    fn parse_refs(
        &self,
        object: &Map<String, JsonValue>,
        property: &str,
        ctx: &IssueContext,
    ) -> Option<NodeRefs> {
        let value = lookup(object, property)?;
        let refs = NodeRefs::parse(value);
        if refs.is_none() {
            self.error(ctx, format!("Malformed `{property}`: {value}"));
        }
        refs
    }
}

fn as_objects(value: &JsonValue) -> Vec<&Map<String, JsonValue>> {
    match value {
        JsonValue::Array(items) => items.iter().filter_map(JsonValue::as_object).collect(),
        JsonValue::Object(object) => vec![object],
        _ => Vec::new(),
    }
}

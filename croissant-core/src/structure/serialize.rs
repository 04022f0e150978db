//! Structure graph back to a JSON-LD manifest
//!
//! Modelled properties are written with their compact names; everything else is
//! copied from what was parsed, so that a parse/serialize round trip preserves the
//! manifest's meaning.

use serde_json::{Map, Value as JsonValue};

use crate::structure::graph::StructureGraph;
use crate::structure::nodes::{Field, FileObject, FileSet, Node, NodeId, NodeInfo, RecordSet};

fn insert_str(object: &mut Map<String, JsonValue>, key: &str, value: Option<&String>) {
    if let Some(value) = value {
        object.insert(key.to_string(), JsonValue::String(value.clone()));
    }
}

fn info_object(info: &NodeInfo) -> Map<String, JsonValue> {
    let mut object = info.extra.clone();
    insert_str(&mut object, "@type", info.raw_type.as_ref());
    insert_str(&mut object, "@id", info.id.as_ref());
    if !info.name.is_empty() {
        object.insert("name".into(), JsonValue::String(info.name.clone()));
    }
    insert_str(&mut object, "description", info.description.as_ref());
    object
}

impl StructureGraph {
    /// Serialize the dataset back to JSON-LD
    pub fn to_json(&self) -> JsonValue {
        let metadata = self.metadata();
        let mut object = info_object(&metadata.info);
        if let Some(context) = &metadata.json_context {
            object.insert("@context".into(), context.clone());
        }
        if !metadata.distribution.is_empty() {
            let items = metadata
                .distribution
                .iter()
                .filter_map(|id| self.resource_to_json(*id))
                .collect();
            object.insert("distribution".into(), JsonValue::Array(items));
        }
        if !metadata.record_sets.is_empty() {
            let items = metadata
                .record_sets
                .iter()
                .filter_map(|id| self.record_set(*id))
                .map(|record_set| self.record_set_to_json(record_set))
                .collect();
            object.insert("recordSet".into(), JsonValue::Array(items));
        }
        JsonValue::Object(object)
    }

    fn resource_to_json(&self, id: NodeId) -> Option<JsonValue> {
        match self.node(id) {
            Node::FileObject(file_object) => Some(file_object_to_json(file_object)),
            Node::FileSet(file_set) => Some(file_set_to_json(file_set)),
            _ => None,
        }
    }

    fn record_set_to_json(&self, record_set: &RecordSet) -> JsonValue {
        let mut object = info_object(&record_set.info);
        if let Some(key) = &record_set.key {
            object.insert("key".into(), key.to_json());
        }
        if let Some(data) = &record_set.data {
            object.insert("data".into(), data.clone());
        }
        if !record_set.fields.is_empty() {
            let fields = record_set
                .fields
                .iter()
                .filter_map(|id| self.field(*id))
                .map(|field| self.field_to_json(field))
                .collect();
            object.insert("field".into(), JsonValue::Array(fields));
        }
        JsonValue::Object(object)
    }

    fn field_to_json(&self, field: &Field) -> JsonValue {
        let mut object = info_object(&field.info);
        if let Some(data_type) = &field.raw_data_type {
            object.insert("dataType".into(), data_type.clone());
        }
        if let Some(source) = &field.source {
            object.insert("source".into(), source.to_json());
        }
        if let Some(references) = &field.references {
            object.insert("references".into(), references.to_json());
        }
        if let Some(repeated) = field.repeated {
            object.insert("repeated".into(), JsonValue::Bool(repeated));
        }
        if !field.sub_fields.is_empty() {
            let sub_fields = field
                .sub_fields
                .iter()
                .filter_map(|id| self.field(*id))
                .map(|sub_field| self.field_to_json(sub_field))
                .collect();
            object.insert("subField".into(), JsonValue::Array(sub_fields));
        }
        JsonValue::Object(object)
    }
}

fn file_object_to_json(file_object: &FileObject) -> JsonValue {
    let mut object = info_object(&file_object.info);
    insert_str(&mut object, "contentUrl", file_object.content_url.as_ref());
    if !file_object.encoding_formats.is_empty() {
        object.insert("encodingFormat".into(), file_object.encoding_formats.to_json());
    }
    insert_str(&mut object, "md5", file_object.md5.as_ref());
    insert_str(&mut object, "sha256", file_object.sha256.as_ref());
    if let Some(contained_in) = &file_object.contained_in {
        object.insert("containedIn".into(), contained_in.to_json());
    }
    JsonValue::Object(object)
}

fn file_set_to_json(file_set: &FileSet) -> JsonValue {
    let mut object = info_object(&file_set.info);
    if !file_set.includes.is_empty() {
        object.insert("includes".into(), file_set.includes.to_json());
    }
    if !file_set.excludes.is_empty() {
        object.insert("excludes".into(), file_set.excludes.to_json());
    }
    if !file_set.encoding_formats.is_empty() {
        object.insert("encodingFormat".into(), file_set.encoding_formats.to_json());
    }
    if let Some(contained_in) = &file_set.contained_in {
        object.insert("containedIn".into(), contained_in.to_json());
    }
    JsonValue::Object(object)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::config::DatasetConfig;
    use crate::issues::Issues;
    use crate::structure::graph::StructureGraph;

    fn round_trip(manifest: &serde_json::Value) -> serde_json::Value {
        let config = DatasetConfig::builder().cache_dir("/tmp/unused").build();
        let graph = StructureGraph::build(manifest, &config, Arc::new(Issues::new())).unwrap();
        graph.to_json()
    }

    #[test]
    fn test_round_trip_v1() {
        let manifest = json!({
            "@context": {"@language": "en", "@vocab": "https://schema.org/", "cr": "http://mlcommons.org/croissant/"},
            "@type": "sc:Dataset",
            "conformsTo": "http://mlcommons.org/croissant/1.0",
            "name": "images",
            "description": "Images in an archive",
            "url": "https://example.org",
            "license": "https://creativecommons.org/licenses/by/4.0/",
            "citeAs": "@misc{images}",
            "keywords": ["vision", "test"],
            "distribution": [
                {
                    "@type": "cr:FileObject",
                    "@id": "archive.zip",
                    "name": "archive.zip",
                    "contentUrl": "https://example.org/archive.zip",
                    "encodingFormat": "application/zip",
                    "md5": "d41d8cd98f00b204e9800998ecf8427e"
                },
                {
                    "@type": "cr:FileSet",
                    "@id": "image-files",
                    "name": "image-files",
                    "containedIn": {"@id": "archive.zip"},
                    "encodingFormat": "image/png",
                    "includes": ["train/*.png", "test/*.png"]
                }
            ],
            "recordSet": [{
                "@type": "cr:RecordSet",
                "@id": "default",
                "name": "default",
                "description": "Images and their split",
                "key": {"@id": "default/image"},
                "field": [
                    {
                        "@type": "cr:Field",
                        "@id": "default/image",
                        "name": "image",
                        "dataType": "sc:ImageObject",
                        "source": {"fileSet": {"@id": "image-files"}, "extract": {"fileProperty": "content"}}
                    },
                    {
                        "@type": "cr:Field",
                        "@id": "default/split",
                        "name": "split",
                        "dataType": ["sc:Text", "cr:Split"],
                        "source": {
                            "fileSet": {"@id": "image-files"},
                            "extract": {"fileProperty": "fullpath"},
                            "transform": [{"regex": "^(train|test)/.*$"}]
                        }
                    }
                ]
            }]
        });
        assert_eq!(round_trip(&manifest), manifest);
    }

    #[test]
    fn test_round_trip_v0_with_inline_data() {
        let manifest = json!({
            "@type": "sc:Dataset",
            "name": "splits",
            "url": "https://example.org",
            "license": "CC0",
            "citation": "none",
            "recordSet": [{
                "@type": "ml:RecordSet",
                "name": "split_enums",
                "description": "Maps split names to URLs",
                "field": [
                    {"@type": "ml:Field", "name": "name", "dataType": "sc:Text"},
                    {"@type": "ml:Field", "name": "url", "dataType": "sc:URL"}
                ],
                "data": [
                    {"name": "train", "url": "https://mlcommons.org/definitions/training_split"},
                    {"name": "test", "url": "https://mlcommons.org/definitions/test_split"}
                ]
            }]
        });
        assert_eq!(round_trip(&manifest), manifest);
    }
}

//! Public entry point: loading a dataset and iterating over its records

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use croissant_core::{
    DatasetConfig, ExecutionStrategy, Issues, Metadata, Record, StructureGraph,
};
use croissant_readers::{default_transport, Downloader, Extractor, Transport};

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::fields::Rows;
use crate::filters::apply_filters;
use crate::operation::OperationId;
use crate::plan::OperationGraph;
use crate::streaming::Stream;
use crate::{sequential, streaming};

/// A manifest document and where it was loaded from
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    json: serde_json::Value,
    folder: Option<PathBuf>,
}

impl Manifest {
    /// Manifest from an already parsed JSON document
    pub fn from_json(json: serde_json::Value) -> Self {
        Self { json, folder: None }
    }

    /// Manifest from raw JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let json = serde_json::from_slice(bytes).map_err(croissant_core::Error::from)?;
        Ok(Self::from_json(json))
    }

    /// Manifest read from a local file
    ///
    /// Relative paths in the manifest resolve against the file's directory unless
    /// the configuration sets another folder.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut manifest = Self::from_bytes(&fs::read(path)?)?;
        manifest.folder = path.parent().map(Path::to_path_buf);
        Ok(manifest)
    }

    /// Manifest fetched through the download cache
    pub fn from_url(url: &str, downloader: &Downloader) -> Result<Self> {
        let path = downloader.download(url)?;
        Self::from_bytes(&fs::read(path)?)
    }

    /// The JSON-LD document
    pub fn json(&self) -> &serde_json::Value {
        &self.json
    }

    /// Directory the manifest was loaded from
    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }
}

/// A validated dataset ready to produce records
#[derive(Debug)]
pub struct Dataset {
    graph: StructureGraph,
    plan: OperationGraph,
    config: DatasetConfig,
    downloader: Downloader,
    extractor: Extractor,
}

impl Dataset {
    /// Validate `manifest` and compile its operations
    ///
    /// Downloads go through the default transport: HTTP when the `http` feature is
    /// enabled, none otherwise.
    pub fn new(manifest: Manifest, config: DatasetConfig) -> Result<Self> {
        let transport = default_transport(config.basic_auth())?;
        Self::with_transport(manifest, config, transport)
    }

    /// Like [`Dataset::new`] with an explicit download transport
    pub fn with_transport(
        manifest: Manifest,
        config: DatasetConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let config = match manifest.folder() {
            Some(folder) => config.with_default_folder(folder),
            None => config,
        };
        let graph = StructureGraph::build(manifest.json(), &config, Arc::new(Issues::new()))?;
        let plan = OperationGraph::compile(&graph)?;
        info!(
            name = %graph.metadata().name(),
            record_sets = graph.metadata().record_sets.len(),
            operations = plan.len(),
            "dataset loaded"
        );
        Ok(Self {
            downloader: Downloader::new(transport, config.download_dir()),
            extractor: Extractor::new(config.extract_dir()),
            graph,
            plan,
            config,
        })
    }

    /// Dataset-level metadata
    pub fn metadata(&self) -> &Metadata {
        self.graph.metadata()
    }

    /// The validated structure graph
    pub fn structure(&self) -> &StructureGraph {
        &self.graph
    }

    /// The compiled operations
    pub fn operations(&self) -> &OperationGraph {
        &self.plan
    }

    /// Warnings collected during validation
    pub fn issues(&self) -> &Issues {
        self.graph.issues()
    }

    /// Configuration in effect
    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// The dataset serialized back to JSON-LD
    pub fn metadata_json(&self) -> serde_json::Value {
        self.graph.to_json()
    }

    fn target(&self, name: &str) -> Result<OperationId> {
        self.graph
            .record_set_by_name(name)
            .and_then(|id| self.plan.target(id))
            .ok_or_else(|| Error::UnknownRecordSet {
                name: name.to_string(),
                available: self.graph.record_set_names(),
            })
    }

    /// Records of the RecordSet called `name`
    ///
    /// Fails right away on an unknown name; generation errors surface while
    /// iterating.
    pub fn records(&self, name: &str) -> Result<Records<'_>> {
        let target = self.target(name)?;
        Ok(self.iterate(Cow::Borrowed(&self.plan), target))
    }

    /// Records of `name` restricted by filters on file-derived fields
    pub fn records_with_filters(
        &self,
        name: &str,
        filters: &BTreeMap<String, String>,
    ) -> Result<Records<'_>> {
        let target = self.target(name)?;
        if filters.is_empty() {
            return Ok(self.iterate(Cow::Borrowed(&self.plan), target));
        }
        let record_set = self.plan.operation(target).node;
        let plan = apply_filters(&self.graph, &self.plan, record_set, filters)?;
        Ok(self.iterate(Cow::Owned(plan), target))
    }

    fn iterate<'a>(&'a self, plan: Cow<'a, OperationGraph>, target: OperationId) -> Records<'a> {
        Records {
            executor: Executor::new(&self.graph, &self.config, plan, &self.downloader, &self.extractor),
            target,
            strategy: self.config.strategy(),
            state: State::Idle,
        }
    }
}

enum State {
    Idle,
    Sequential(Rows),
    Streaming(Stream),
    Done,
}

/// Lazy, forward-only iterator over the records of one RecordSet
///
/// Nothing is downloaded or read until the first call to `next`. After an error the
/// iterator is exhausted; call [`Dataset::records`] again to retry.
pub struct Records<'a> {
    executor: Executor<'a>,
    target: OperationId,
    strategy: ExecutionStrategy,
    state: State,
}

impl Records<'_> {
    fn start(&mut self) -> Result<State> {
        let plan = self.executor.plan();
        let relevant = plan.relevant(self.target);
        let streamable = plan.is_streamable(&relevant);
        let stream = match self.strategy {
            ExecutionStrategy::Auto => streamable,
            ExecutionStrategy::Sequential => false,
            ExecutionStrategy::Streaming if streamable => true,
            ExecutionStrategy::Streaming => {
                let error = Error::Unsupported(
                    "the operations of this RecordSet do not form a single chain".into(),
                );
                return Err(self.executor.failure(streaming::NAME, self.target, error));
            }
        };
        let name = if stream { streaming::NAME } else { sequential::NAME };
        debug!(strategy = name, operations = relevant.len(), "generating records");
        self.executor.download_all(name, &relevant)?;
        if stream {
            Ok(State::Streaming(Stream::new(relevant)))
        } else {
            sequential::run(&self.executor, &relevant, self.target).map(State::Sequential)
        }
    }
}

impl Iterator for Records<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.state, State::Idle) {
            match self.start() {
                Ok(state) => self.state = state,
                Err(e) => {
                    self.state = State::Done;
                    return Some(Err(e));
                }
            }
        }
        let next = match &mut self.state {
            State::Idle | State::Done => None,
            State::Sequential(rows) => rows
                .next()
                .map(|row| row.map_err(|e| self.executor.failure(sequential::NAME, self.target, e))),
            State::Streaming(stream) => stream.next(&self.executor),
        };
        if !matches!(next, Some(Ok(_))) {
            self.state = State::Done;
        }
        next
    }
}

impl std::fmt::Debug for Records<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Records")
            .field("target", &self.executor.plan().operation(self.target).to_string())
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use croissant_core::Value;
    use croissant_readers::NoTransport;
    use serde_json::json;

    mockall::mock! {
        Net {}
        impl Transport for Net {
            fn fetch(&self, url: &str, dest: &Path) -> croissant_readers::Result<()>;
        }
    }

    const RATINGS: &str = "movie,rating\n1,4.5\n2,3.0\n3,5\n";
    const RATINGS_MD5: &str = "9fec598c6c719091751d4de24e01fca0";
    const LABELS: &str = "id,label\n1,cat\n2,dog\n";
    const LABELS_SHA256: &str = "9a03b975919308b591c19fb67489870211037de2a75311afde4a46ecec5e0a2c";

    fn context() -> serde_json::Value {
        json!({"@vocab": "https://schema.org/", "cr": "http://mlcommons.org/croissant/", "sc": "https://schema.org/"})
    }

    fn config(cache: &Path, folder: &Path, strategy: ExecutionStrategy) -> DatasetConfig {
        DatasetConfig::builder()
            .cache_dir(cache)
            .folder(folder)
            .strategy(strategy)
            .build()
    }

    fn load(manifest: serde_json::Value, config: DatasetConfig) -> Dataset {
        Dataset::with_transport(Manifest::from_json(manifest), config, Arc::new(NoTransport)).unwrap()
    }

    fn collect(dataset: &Dataset, name: &str) -> Vec<Record> {
        dataset
            .records(name)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    fn write_files(root: &Path, files: &[(&str, &str)]) {
        for (name, content) in files {
            let path = root.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
    }

    fn splits_manifest() -> serde_json::Value {
        json!({
            "@context": context(),
            "@type": "sc:Dataset",
            "name": "splits",
            "conformsTo": "http://mlcommons.org/croissant/1.0",
            "recordSet": [{
                "@type": "cr:RecordSet", "@id": "splits", "name": "splits",
                "field": [
                    {"@type": "cr:Field", "@id": "splits/name", "name": "name", "dataType": "sc:Text"},
                    {"@type": "cr:Field", "@id": "splits/ratio", "name": "ratio", "dataType": "sc:Float"}
                ],
                "data": [
                    {"splits/name": "train", "splits/ratio": 0.8},
                    {"splits/name": "validation", "splits/ratio": 0.1},
                    {"splits/name": "test", "splits/ratio": 0.1}
                ]
            }]
        })
    }

    fn movies_manifest() -> serde_json::Value {
        json!({
            "@context": context(),
            "@type": "sc:Dataset",
            "name": "movies",
            "conformsTo": "http://mlcommons.org/croissant/1.0",
            "distribution": [
                {"@type": "cr:FileObject", "@id": "ratings.csv", "name": "ratings.csv",
                 "contentUrl": "ratings.csv", "encodingFormat": "text/csv", "md5": RATINGS_MD5}
            ],
            "recordSet": [
                {"@type": "cr:RecordSet", "@id": "movies", "name": "movies",
                 "field": [
                    {"@type": "cr:Field", "@id": "movies/id", "name": "id", "dataType": "sc:Integer"},
                    {"@type": "cr:Field", "@id": "movies/title", "name": "title", "dataType": "sc:Text"}
                 ],
                 "data": [
                    {"movies/id": 1, "movies/title": "Up"},
                    {"movies/id": 2, "movies/title": "Heat"}
                 ]},
                {"@type": "cr:RecordSet", "@id": "ratings", "name": "ratings",
                 "field": [
                    {"@type": "cr:Field", "@id": "ratings/movie", "name": "movie", "dataType": "sc:Integer",
                     "source": {"fileObject": {"@id": "ratings.csv"}, "extract": {"column": "movie"}},
                     "references": {"field": {"@id": "movies/id"}}},
                    {"@type": "cr:Field", "@id": "ratings/rating", "name": "rating", "dataType": "sc:Float",
                     "source": {"fileObject": {"@id": "ratings.csv"}, "extract": {"column": "rating"}}},
                    {"@type": "cr:Field", "@id": "ratings/title", "name": "title", "dataType": "sc:Text",
                     "source": {"field": {"@id": "movies/title"}}}
                 ]}
            ]
        })
    }

    fn docs_manifest() -> serde_json::Value {
        json!({
            "@context": context(),
            "@type": "sc:Dataset",
            "name": "docs",
            "conformsTo": "http://mlcommons.org/croissant/1.0",
            "distribution": [
                {"@type": "cr:FileSet", "@id": "texts", "name": "texts",
                 "includes": "*.txt", "encodingFormat": "text/plain"}
            ],
            "recordSet": [{
                "@type": "cr:RecordSet", "@id": "docs", "name": "docs",
                "field": [
                    {"@type": "cr:Field", "@id": "docs/split", "name": "split", "dataType": "sc:Text",
                     "source": {"fileSet": {"@id": "texts"}, "extract": {"fileProperty": "fullpath"},
                                "transform": {"regex": "^(train|test)/.*\\.txt$"}}},
                    {"@type": "cr:Field", "@id": "docs/name", "name": "name", "dataType": "sc:Text",
                     "source": {"fileSet": {"@id": "texts"}, "extract": {"fileProperty": "filename"}}},
                    {"@type": "cr:Field", "@id": "docs/text", "name": "text", "dataType": "sc:Text",
                     "source": {"fileSet": {"@id": "texts"}, "extract": {"fileProperty": "content"}}}
                ]
            }]
        })
    }

    fn docs_files(root: &Path) {
        write_files(
            root,
            &[
                ("train/a.txt", "first"),
                ("train/b.txt", "second"),
                ("test/c.txt", "third"),
                ("notes.md", "ignored"),
            ],
        );
    }

    fn texts(records: &[Record], field: &str) -> Vec<String> {
        records
            .iter()
            .map(|record| record[field].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_inline_data_records() {
        let cache = tempfile::tempdir().unwrap();
        let dataset = load(splits_manifest(), config(cache.path(), cache.path(), ExecutionStrategy::Auto));
        let records = collect(&dataset, "splits");
        assert_eq!(records.len(), 3);
        for record in &records {
            assert_eq!(record.keys().collect::<Vec<_>>(), vec!["name", "ratio"]);
        }
        assert_eq!(records[1]["name"], Value::from("validation"));
        assert_eq!(records[0]["ratio"], Value::Float(0.8));
    }

    #[test]
    fn test_unknown_record_set() {
        let cache = tempfile::tempdir().unwrap();
        let dataset = load(splits_manifest(), config(cache.path(), cache.path(), ExecutionStrategy::Auto));
        let message = dataset.records("users").unwrap_err().to_string();
        assert!(message.contains("`users`"));
        assert!(message.contains("\"splits\""));
    }

    #[test]
    fn test_local_file_set_streams_sorted_files() {
        let cache = tempfile::tempdir().unwrap();
        let folder = tempfile::tempdir().unwrap();
        docs_files(folder.path());
        let dataset = load(docs_manifest(), config(cache.path(), folder.path(), ExecutionStrategy::Auto));
        let docs = dataset.structure().record_set_by_name("docs").unwrap();
        let target = dataset.operations().target(docs).unwrap();
        let relevant = dataset.operations().relevant(target);
        assert!(dataset.operations().is_streamable(&relevant));

        let records = collect(&dataset, "docs");
        assert_eq!(texts(&records, "name"), vec!["c.txt", "a.txt", "b.txt"]);
        assert_eq!(texts(&records, "split"), vec!["test", "train", "train"]);
        assert_eq!(texts(&records, "text"), vec!["third", "first", "second"]);
    }

    #[test]
    fn test_strategies_agree() {
        let cache = tempfile::tempdir().unwrap();
        let folder = tempfile::tempdir().unwrap();
        docs_files(folder.path());
        let streamed = load(docs_manifest(), config(cache.path(), folder.path(), ExecutionStrategy::Streaming));
        let sequential = load(docs_manifest(), config(cache.path(), folder.path(), ExecutionStrategy::Sequential));
        assert_eq!(collect(&streamed, "docs"), collect(&sequential, "docs"));
    }

    #[test]
    fn test_streaming_yields_before_opening_next_file() {
        let cache = tempfile::tempdir().unwrap();
        let folder = tempfile::tempdir().unwrap();
        docs_files(folder.path());
        let dataset = load(docs_manifest(), config(cache.path(), folder.path(), ExecutionStrategy::Streaming));
        let mut records = dataset.records("docs").unwrap();

        let first = records.next().unwrap().unwrap();
        assert_eq!(first["name"], Value::from("c.txt"));
        fs::remove_file(folder.path().join("train/a.txt")).unwrap();

        let message = records.next().unwrap().unwrap_err().to_string();
        assert!(message.contains("streaming generation"));
        assert!(message.contains("Read(texts)"));
        assert!(records.next().is_none());
    }

    #[test]
    fn test_filter_restricts_files() {
        let cache = tempfile::tempdir().unwrap();
        let folder = tempfile::tempdir().unwrap();
        docs_files(folder.path());
        let dataset = load(docs_manifest(), config(cache.path(), folder.path(), ExecutionStrategy::Auto));
        let filters = BTreeMap::from([("split".to_string(), "train".to_string())]);
        let records = dataset
            .records_with_filters("docs", &filters)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(texts(&records, "name"), vec!["a.txt", "b.txt"]);

        let unknown = BTreeMap::from([("missing".to_string(), "x".to_string())]);
        assert!(dataset.records_with_filters("docs", &unknown).is_err());
    }

    #[test]
    fn test_join_with_referenced_record_set() {
        let cache = tempfile::tempdir().unwrap();
        let folder = tempfile::tempdir().unwrap();
        write_files(folder.path(), &[("ratings.csv", RATINGS)]);
        let dataset = load(movies_manifest(), config(cache.path(), folder.path(), ExecutionStrategy::Auto));
        let records = collect(&dataset, "ratings");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["movie"], Value::Int(1));
        assert_eq!(records[0]["rating"], Value::Float(4.5));
        assert_eq!(records[0]["title"], Value::from("Up"));
        assert_eq!(records[1]["title"], Value::from("Heat"));
        assert_eq!(records[2]["movie"], Value::Int(3));
        assert_eq!(records[2]["title"], Value::Null);
    }

    #[test]
    fn test_forced_streaming_rejects_join() {
        let cache = tempfile::tempdir().unwrap();
        let folder = tempfile::tempdir().unwrap();
        write_files(folder.path(), &[("ratings.csv", RATINGS)]);
        let dataset = load(movies_manifest(), config(cache.path(), folder.path(), ExecutionStrategy::Streaming));
        let mut records = dataset.records("ratings").unwrap();
        let message = records.next().unwrap().unwrap_err().to_string();
        assert!(message.contains("streaming generation"));
        assert!(message.contains("ReadFields(ratings)"));
        assert!(records.next().is_none());
    }

    #[test]
    fn test_generation_error_names_operation() {
        let cache = tempfile::tempdir().unwrap();
        let folder = tempfile::tempdir().unwrap();
        let dataset = load(movies_manifest(), config(cache.path(), folder.path(), ExecutionStrategy::Auto));
        let message = dataset.records("ratings").unwrap().next().unwrap().unwrap_err().to_string();
        assert!(message.contains("Download(ratings.csv)"));
        assert!(message.contains("invalid URL or an invalid path"));
    }

    #[test]
    fn test_download_through_transport_is_cached() {
        let cache = tempfile::tempdir().unwrap();
        let manifest = json!({
            "@context": context(),
            "@type": "sc:Dataset",
            "name": "remote",
            "conformsTo": "http://mlcommons.org/croissant/1.0",
            "distribution": [
                {"@type": "cr:FileObject", "@id": "labels.csv", "name": "labels.csv",
                 "contentUrl": "https://example.com/labels.csv", "encodingFormat": "text/csv",
                 "sha256": LABELS_SHA256}
            ],
            "recordSet": [{
                "@type": "cr:RecordSet", "@id": "labels", "name": "labels",
                "field": [
                    {"@type": "cr:Field", "@id": "labels/label", "name": "label", "dataType": "sc:Text",
                     "source": {"fileObject": {"@id": "labels.csv"}, "extract": {"column": "label"}}}
                ]
            }]
        });
        let mut transport = MockNet::new();
        transport
            .expect_fetch()
            .withf(|url, _| url.ends_with("/labels.csv"))
            .times(1)
            .returning(|_, dest| Ok(fs::write(dest, LABELS)?));
        let dataset = Dataset::with_transport(
            Manifest::from_json(manifest),
            config(cache.path(), cache.path(), ExecutionStrategy::Auto),
            Arc::new(transport),
        )
        .unwrap();
        let first = collect(&dataset, "labels");
        assert_eq!(texts(&first, "label"), vec!["cat", "dog"]);
        assert_eq!(collect(&dataset, "labels"), first);
    }

    #[test]
    fn test_manifest_from_path_sets_folder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        fs::write(&path, splits_manifest().to_string()).unwrap();
        let manifest = Manifest::from_path(&path).unwrap();
        assert_eq!(manifest.folder(), Some(dir.path()));
        assert!(Manifest::from_bytes(b"{not json").is_err());
    }
}

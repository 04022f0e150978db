//! Execution of single operations
//!
//! The strategies decide in which order operations run and how outputs flow; this
//! module knows what each operation does with its inputs.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use croissant_core::{
    Column, DatasetConfig, FilePath, FileProperty, Node, NodeId, Record, StructureGraph, Table,
    Value,
};
use croissant_readers::{
    cache_key, is_url, read_file, verify_declared, Downloader, EncodingFormat, Extractor,
    GlobFilter, ReadOptions, ReadingMethod,
};
use croissant_transforms::{left_join, orient, JoinKey, Orientation, TransformChain};

use crate::error::{Error, Result};
use crate::fields::{qualified, RecordSetReader};
use crate::operation::{Operation, OperationId, OperationKind, Output};
use crate::plan::OperationGraph;

/// Runs operations of a plan against the dataset's caches
pub(crate) struct Executor<'a> {
    graph: &'a StructureGraph,
    config: &'a DatasetConfig,
    plan: Cow<'a, OperationGraph>,
    downloader: &'a Downloader,
    extractor: &'a Extractor,
    downloads: HashMap<OperationId, FilePath>,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(
        graph: &'a StructureGraph,
        config: &'a DatasetConfig,
        plan: Cow<'a, OperationGraph>,
        downloader: &'a Downloader,
        extractor: &'a Extractor,
    ) -> Self {
        Self {
            graph,
            config,
            plan,
            downloader,
            extractor,
            downloads: HashMap::new(),
        }
    }

    pub(crate) fn plan(&self) -> &OperationGraph {
        &self.plan
    }

    /// Wrap a failure of `id` with the identity of the operation
    pub(crate) fn failure(&self, strategy: &'static str, id: OperationId, error: Error) -> Error {
        Error::Generation {
            strategy,
            operation: self.plan.operation(id).to_string(),
            source: Box::new(error),
        }
    }

    /// Resolve every `Download` among `relevant` on a bounded worker pool
    pub(crate) fn download_all(&mut self, strategy: &'static str, relevant: &[OperationId]) -> Result<()> {
        let pending: Vec<OperationId> = relevant
            .iter()
            .copied()
            .filter(|id| self.plan.operation(*id).kind == OperationKind::Download)
            .filter(|id| !self.downloads.contains_key(id))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        let workers = self
            .config
            .max_parallel_downloads()
            .unwrap_or_else(num_cpus::get)
            .max(1);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
        debug!(downloads = pending.len(), workers, "resolving downloads");
        let this = &*self;
        let resolved: Vec<(OperationId, Result<FilePath>)> = pool.install(|| {
            pending
                .par_iter()
                .map(|id| (*id, this.resolve_download(this.plan.operation(*id))))
                .collect()
        });
        for (id, result) in resolved {
            let path = result.map_err(|e| self.failure(strategy, id, e))?;
            self.downloads.insert(id, path);
        }
        Ok(())
    }

    fn resolve_download(&self, operation: &Operation) -> Result<FilePath> {
        let node = self.graph.node(operation.node);
        let Node::FileObject(file) = node else {
            return Err(Error::Plan(format!("{operation} does not point to a FileObject")));
        };
        if let Some(path) = self.mapped(node) {
            debug!(uid = %file.info.uid, path = %path.display(), "using mapped file");
            return Ok(FilePath::new(path.clone(), path_name(path)));
        }
        let url = file.content_url.as_deref().unwrap_or_default();
        let path = if is_url(url) {
            if EncodingFormat::select(&file.encoding_formats.items) == EncodingFormat::Git {
                return Err(Error::Unsupported(format!(
                    "cloning git repositories is not supported ({url})"
                )));
            }
            let path = self.downloader.download(url)?;
            FilePath::under_root(path, self.downloader.download_dir())
        } else {
            let local = self
                .config
                .folder()
                .map_or_else(|| PathBuf::from(url), |folder| folder.join(url));
            if !local.exists() {
                return Err(Error::Unsupported(format!(
                    "In node \"{}\", file \"{url}\" is either an invalid URL or an invalid path.",
                    file.info.uid
                )));
            }
            FilePath::new(local, url)
        };
        if let Err(e) = verify_declared(&path.filepath, file.md5.as_deref(), file.sha256.as_deref()) {
            if self.graph.version().is_v0() {
                warn!(uid = %file.info.uid, error = %e, "checksum mismatch");
            } else {
                return Err(e.into());
            }
        }
        Ok(path)
    }

    fn mapped(&self, node: &Node) -> Option<&'a PathBuf> {
        let mapping = self.config.mapping();
        mapping.get(node.name()).or_else(|| mapping.get(node.uid()))
    }

    /// Run a non-target operation on the outputs of its predecessors
    pub(crate) fn execute(&self, id: OperationId, inputs: Vec<(OperationId, Output)>) -> Result<Output> {
        let operation = self.plan.operation(id);
        debug!(operation = %operation, "executing operation");
        match &operation.kind {
            OperationKind::Init => Ok(Output::Nothing),
            OperationKind::Download => match self.downloads.get(&id) {
                Some(path) => Ok(Output::Files(vec![path.clone()])),
                None => Ok(Output::Files(vec![self.resolve_download(operation)?])),
            },
            OperationKind::Extract => self.extract(operation, files_of(inputs)?),
            OperationKind::LocalDirectory => self.local_directory(operation),
            OperationKind::FilterFiles { includes, excludes } => {
                let filter = GlobFilter::new(includes, excludes)?;
                Ok(Output::Files(filter.select(&files_of(inputs)?)?))
            }
            OperationKind::Concatenate => Ok(Output::Files(files_of(inputs)?)),
            OperationKind::Read => self.read(operation.node, files_of(inputs)?).map(Output::Table),
            OperationKind::Data => self.data(operation.node).map(Output::Table),
            OperationKind::Join => self.join(operation.node, inputs).map(Output::Table),
            OperationKind::ReadFields => {
                let table = table_of(inputs)?;
                self.reader(id)?.collect(table).map(Output::Table)
            }
        }
    }

    /// Field reader of a `ReadFields` operation
    pub(crate) fn reader(&self, id: OperationId) -> Result<RecordSetReader> {
        let joined = self
            .plan
            .predecessors(id)
            .any(|p| self.plan.operation(p).kind == OperationKind::Join);
        RecordSetReader::new(self.graph, self.plan.operation(id).node, joined)
    }

    /// Files of a resource among the outputs of its predecessors
    ///
    /// A FileObject contained in a directory is looked up under its `contentUrl`.
    fn locate(&self, node: NodeId, files: Vec<FilePath>) -> Vec<FilePath> {
        let Some(file) = self.graph.file_object(node) else {
            return files;
        };
        let Some(url) = file.content_url.as_deref().filter(|_| file.contained_in.is_some()) else {
            return files;
        };
        files
            .into_iter()
            .filter_map(|input| {
                if input.filepath.is_dir() {
                    Some(FilePath::new(input.filepath.join(url), url))
                } else if input.fullpath_str() == url {
                    Some(input)
                } else {
                    None
                }
            })
            .collect()
    }

    fn extract(&self, operation: &Operation, files: Vec<FilePath>) -> Result<Output> {
        let archives = self.locate(operation.node, files);
        let file = self.graph.file_object(operation.node);
        let url = file
            .and_then(|f| f.content_url.as_deref())
            .unwrap_or(operation.uid.as_str());
        let mut directories = Vec::with_capacity(archives.len());
        for archive in archives {
            let name = Path::new(url)
                .file_name()
                .map_or_else(|| archive.filename(), |name| name.to_string_lossy().into_owned());
            let dir = self
                .extractor
                .extract(&archive.filepath, &archive_key(url, &archive), &name)?;
            directories.push(FilePath::new(dir, PathBuf::new()));
        }
        Ok(Output::Files(directories))
    }

    fn local_directory(&self, operation: &Operation) -> Result<Output> {
        let node = self.graph.node(operation.node);
        let root = match self.mapped(node) {
            Some(path) => path.clone(),
            None => self.config.folder().map(Path::to_path_buf).ok_or_else(|| {
                Error::Unsupported(format!(
                    "FileSet \"{}\" is not contained in any archive: set a folder or a mapping for it",
                    operation.uid
                ))
            })?,
        };
        if !root.exists() {
            return Err(Error::Unsupported(format!(
                "local directory {} of \"{}\" does not exist",
                root.display(),
                operation.uid
            )));
        }
        let fullpath = if root.is_dir() {
            PathBuf::new()
        } else {
            PathBuf::from(path_name(&root))
        };
        Ok(Output::Files(vec![FilePath::new(root, fullpath)]))
    }

    /// Reading options derived from every field consuming `resource`
    fn read_options(&self, resource: NodeId) -> Result<ReadOptions> {
        let mut method = ReadingMethod::None;
        let mut json_paths = Vec::new();
        let mut line_numbers = false;
        for (_, node) in self.graph.nodes() {
            let Node::Field(field) = node else {
                continue;
            };
            let sources = [
                (field.source_node(), field.source.as_ref()),
                (field.references_node(), field.references.as_ref()),
            ];
            for (target, source) in sources {
                let Some(source) = source.filter(|_| target == Some(resource)) else {
                    continue;
                };
                let wanted = match (&source.extract.column, source.extract.file_property, &source.extract.json_path) {
                    (_, _, Some(path)) => {
                        if !json_paths.contains(path) {
                            json_paths.push(path.clone());
                        }
                        ReadingMethod::Json
                    }
                    (_, Some(FileProperty::Lines), _) => ReadingMethod::Lines,
                    (_, Some(FileProperty::LineNumbers), _) => {
                        line_numbers = true;
                        ReadingMethod::Lines
                    }
                    (_, Some(FileProperty::Content), _) => ReadingMethod::Content,
                    (_, Some(_), _) => ReadingMethod::None,
                    (_, None, _) => ReadingMethod::Content,
                };
                method = match (method, wanted) {
                    (current, ReadingMethod::None) => current,
                    (ReadingMethod::None, wanted) => wanted,
                    (current, wanted) if current == wanted => current,
                    (current, wanted) => {
                        return Err(Error::Unsupported(format!(
                            "fields read \"{}\" with different reading methods ({current} and {wanted})",
                            self.graph.node(resource).uid()
                        )))
                    }
                };
            }
        }
        let format = EncodingFormat::select(self.graph.node(resource).encoding_formats());
        Ok(ReadOptions::new(format, method)
            .json_paths(json_paths)
            .line_numbers(line_numbers))
    }

    /// Parse every file of `resource` and stack the results
    pub(crate) fn read(&self, resource: NodeId, files: Vec<FilePath>) -> Result<Table> {
        let files = self.locate(resource, files);
        let options = self.read_options(resource)?;
        let tables = files
            .iter()
            .map(|file| read_file(file, &options))
            .collect::<croissant_readers::Result<Vec<_>>>()?;
        debug!(
            uid = %self.graph.node(resource).uid(),
            files = tables.len(),
            "read resource"
        );
        Ok(Table::concat(tables))
    }

    /// Inline rows keyed by field name
    fn data(&self, node: NodeId) -> Result<Table> {
        let record_set = self
            .graph
            .record_set(node)
            .ok_or_else(|| Error::Plan(format!("{} is not a RecordSet", self.graph.node(node).uid())))?;
        let names: BTreeMap<&str, &str> = record_set
            .fields
            .iter()
            .filter_map(|id| self.graph.field(*id))
            .map(|field| (field.info.uid.as_str(), field.info.name.as_str()))
            .collect();
        let records: Vec<Record> = record_set
            .data_rows()
            .unwrap_or_default()
            .into_iter()
            .map(|row| {
                row.iter()
                    .map(|(key, value)| {
                        let name = names.get(key.as_str()).copied().unwrap_or(key.as_str());
                        (name.to_string(), Value::from_json(value))
                    })
                    .collect()
            })
            .collect();
        Ok(Table::from_records(&records))
    }

    /// Left-join the tables feeding `node` along the references of its fields
    fn join(&self, node: NodeId, inputs: Vec<(OperationId, Output)>) -> Result<Table> {
        let record_set = self
            .graph
            .record_set(node)
            .ok_or_else(|| Error::Plan(format!("{} is not a RecordSet", self.graph.node(node).uid())))?;

        let mut pending: Vec<(NodeId, Table)> = Vec::new();
        for (producer, output) in inputs {
            let operation = self.plan.operation(producer);
            if operation.kind == OperationKind::Init {
                continue;
            }
            let group = operation.node;
            let uid = self.graph.node(group).uid();
            let table = output.into_table()?;
            let columns = table
                .columns()
                .iter()
                .map(|column| Column::new(qualified(uid, column.name()), column.values().to_vec()))
                .collect();
            pending.push((group, Table::from_columns(columns)));
        }

        let mut pairs = Vec::new();
        for id in self.graph.all_fields(record_set) {
            let Some(field) = self.graph.field(id) else {
                continue;
            };
            let (Some(source), Some(references)) = (&field.source, &field.references) else {
                continue;
            };
            let (Some(source_node), Some(references_node)) = (field.source_node(), field.references_node()) else {
                continue;
            };
            let left_group = self.graph.group(source_node);
            let right_group = self.graph.group(references_node);
            pairs.push((
                left_group,
                qualified(self.graph.node(left_group).uid(), &self.graph.source_column(source)),
                right_group,
                qualified(self.graph.node(right_group).uid(), &self.graph.source_column(references)),
                TransformChain::new(&source.transforms)?,
            ));
        }

        let start = pairs
            .first()
            .and_then(|(left, ..)| pending.iter().position(|(group, _)| group == left))
            .unwrap_or(0);
        if pending.is_empty() {
            return Ok(Table::new());
        }
        let (first, mut joined) = pending.remove(start);
        let mut merged = vec![first];
        let mut progress = true;
        while progress && !pending.is_empty() {
            progress = false;
            for (left_group, left_column, right_group, right_column, chain) in &pairs {
                let left = JoinKey {
                    node: self.graph.node(*left_group).uid(),
                    column: left_column,
                };
                let right = JoinKey {
                    node: self.graph.node(*right_group).uid(),
                    column: right_column,
                };
                let (other, hint) = if merged.contains(left_group) {
                    (*right_group, Orientation::AsGiven)
                } else if merged.contains(right_group) {
                    (*left_group, Orientation::Swapped)
                } else {
                    continue;
                };
                let Some(position) = pending.iter().position(|(group, _)| *group == other) else {
                    continue;
                };
                let (group, table) = pending.remove(position);
                joined = match orient(&joined, &table, left, right, Some(hint))? {
                    Orientation::AsGiven => left_join(&joined, &table, left, right, chain)?,
                    Orientation::Swapped => left_join(&table, &joined, left, right, chain)?,
                };
                merged.push(group);
                progress = true;
            }
        }
        if !pending.is_empty() {
            let unjoined: Vec<&str> = pending
                .iter()
                .map(|(group, _)| self.graph.node(*group).uid())
                .collect();
            return Err(Error::Plan(format!(
                "RecordSet \"{}\" reads from {unjoined:?} without a reference joining them",
                record_set.info.uid
            )));
        }
        info!(uid = %record_set.info.uid, rows = joined.num_rows(), "joined inputs");
        Ok(joined)
    }
}

fn path_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Cache key of an extracted archive
///
/// Downloaded archives are keyed by their URL. Local ones are keyed by their
/// resolved path, so equal relative `contentUrl`s in different folders stay apart.
fn archive_key(url: &str, archive: &FilePath) -> String {
    if is_url(url) {
        return cache_key(url);
    }
    let path = fs::canonicalize(&archive.filepath).unwrap_or_else(|_| archive.filepath.clone());
    cache_key(&path.to_string_lossy())
}

/// Concatenated file lists of all inputs
pub(crate) fn files_of(inputs: Vec<(OperationId, Output)>) -> Result<Vec<FilePath>> {
    let mut files = Vec::new();
    for (_, output) in inputs {
        files.extend(output.into_files()?);
    }
    Ok(files)
}

/// Single table among the inputs
pub(crate) fn table_of(inputs: Vec<(OperationId, Output)>) -> Result<Table> {
    let mut tables: Vec<Table> = inputs
        .into_iter()
        .filter(|(_, output)| !matches!(output, Output::Nothing))
        .map(|(_, output)| output.into_table())
        .collect::<Result<_>>()?;
    match tables.len() {
        0 => Ok(Table::new()),
        1 => Ok(tables.remove(0)),
        n => Err(Error::Plan(format!("expected one table, got {n}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use croissant_core::Issues;
    use croissant_readers::NoTransport;
    use serde_json::json;
    use std::sync::Arc;

    struct Fixture {
        _dir: tempfile::TempDir,
        graph: StructureGraph,
        config: DatasetConfig,
        plan: OperationGraph,
        downloader: Downloader,
        extractor: Extractor,
    }

    fn fixture(manifest: serde_json::Value, files: &[(&str, &str)]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let config = DatasetConfig::builder()
            .cache_dir(dir.path().join("cache"))
            .folder(dir.path())
            .build();
        let graph = StructureGraph::build(&manifest, &config, Arc::new(Issues::new())).unwrap();
        let plan = OperationGraph::compile(&graph).unwrap();
        Fixture {
            downloader: Downloader::new(Arc::new(NoTransport), config.download_dir()),
            extractor: Extractor::new(config.extract_dir()),
            _dir: dir,
            graph,
            config,
            plan,
        }
    }

    impl Fixture {
        fn executor(&self) -> Executor<'_> {
            Executor::new(
                &self.graph,
                &self.config,
                Cow::Borrowed(&self.plan),
                &self.downloader,
                &self.extractor,
            )
        }

        fn op(&self, display: &str) -> OperationId {
            self.plan
                .operations()
                .find(|(_, op)| op.to_string() == display)
                .map(|(id, _)| id)
                .unwrap()
        }
    }

    fn csv_manifest(md5: &str) -> serde_json::Value {
        json!({
            "@context": {"@vocab": "https://schema.org/", "cr": "http://mlcommons.org/croissant/", "sc": "https://schema.org/"},
            "@type": "sc:Dataset",
            "name": "local",
            "conformsTo": "http://mlcommons.org/croissant/1.0",
            "distribution": [
                {"@type": "cr:FileObject", "@id": "data.csv", "name": "data.csv",
                 "contentUrl": "data.csv", "encodingFormat": "text/csv", "md5": md5}
            ],
            "recordSet": [{
                "@type": "cr:RecordSet", "@id": "rows", "name": "rows",
                "field": [{"@type": "cr:Field", "@id": "rows/id", "name": "id", "dataType": "sc:Integer",
                           "source": {"fileObject": {"@id": "data.csv"}, "extract": {"column": "id"}}}]
            }]
        })
    }

    const CSV: &str = "id\n1\n2\n";

    #[test]
    fn test_checksum_mismatch_fails_download() {
        let fixture = fixture(csv_manifest(&"0".repeat(32)), &[("data.csv", CSV)]);
        let executor = fixture.executor();
        let download = fixture.op("Download(data.csv)");
        let message = executor.execute(download, Vec::new()).unwrap_err().to_string();
        assert!(message.contains("does not match"));
    }

    #[test]
    fn test_invalid_local_path() {
        let fixture = fixture(csv_manifest("00"), &[]);
        let executor = fixture.executor();
        let download = fixture.op("Download(data.csv)");
        let message = executor.execute(download, Vec::new()).unwrap_err().to_string();
        assert!(message.contains("is either an invalid URL or an invalid path"));
    }

    #[test]
    fn test_read_local_csv() {
        let fixture = fixture(csv_manifest("00"), &[("data.csv", CSV)]);
        let executor = fixture.executor();
        let file = FilePath::new(fixture.config.folder().unwrap().join("data.csv"), "data.csv");
        let table = executor
            .read(fixture.graph.resolve("data.csv").unwrap(), vec![file])
            .unwrap();
        assert_eq!(table.num_rows(), 2);
        assert!(table.has_column("id"));
        assert!(table.has_column("filename"));
    }

    #[test]
    fn test_local_archives_keyed_by_location() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        for dir in [&first, &second] {
            fs::write(dir.path().join("archive.zip"), b"zip").unwrap();
        }
        let in_first = FilePath::new(first.path().join("archive.zip"), "archive.zip");
        let in_second = FilePath::new(second.path().join("archive.zip"), "archive.zip");
        assert_ne!(
            archive_key("archive.zip", &in_first),
            archive_key("archive.zip", &in_second)
        );
        assert_eq!(archive_key("archive.zip", &in_first), archive_key("archive.zip", &in_first));

        let url = "https://example.org/archive.zip";
        assert_eq!(archive_key(url, &in_first), cache_key(url));
        assert_eq!(archive_key(url, &in_second), cache_key(url));
    }

    #[test]
    fn test_table_of_skips_init() {
        let inputs = vec![
            (OperationId(0), Output::Nothing),
            (OperationId(1), Output::Table(Table::from_records(&[Record::new()]))),
        ];
        assert!(table_of(inputs).is_ok());
    }
}

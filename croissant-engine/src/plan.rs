//! Operation graph: compilation from the structure graph and traversal helpers
//!
//! Compilation walks resources in structure order, then RecordSets in dependency
//! order, and wires:
//!
//! - FileObject: `Download`, or the containing resource's output when contained
//! - archive containers: `Extract` after the archive's own operations
//! - FileSet: `LocalDirectory` or its containers, optionally `Concatenate`, then
//!   `FilterFiles`
//! - any resource consumed by a field: `Read`
//! - RecordSet: `Data` for inline rows, a `Join` when several tables feed it, then
//!   `ReadFields`
//!
//! Every operation without a predecessor is finally attached to a single `Init`.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use tracing::debug;

use croissant_core::{Node, NodeId, StructureGraph};
use croissant_readers::EncodingFormat;

use crate::error::{Error, Result};
use crate::operation::{Operation, OperationId, OperationKind};

/// Directed acyclic graph of operations
#[derive(Debug, Clone, Default)]
pub struct OperationGraph {
    operations: Vec<Operation>,
    successors: Vec<BTreeSet<OperationId>>,
    predecessors: Vec<BTreeSet<OperationId>>,
    init: OperationId,
    targets: BTreeMap<NodeId, OperationId>,
}

impl OperationGraph {
    /// Compile the operations needed to read every RecordSet of `graph`
    pub fn compile(graph: &StructureGraph) -> Result<Self> {
        let mut compiler = Compiler {
            graph,
            plan: OperationGraph::default(),
            files: HashMap::new(),
            directories: HashMap::new(),
            tables: HashMap::new(),
        };
        compiler.plan.init = compiler.add(OperationKind::Init, graph.root());
        compiler.compile_resources()?;
        compiler.compile_record_sets()?;
        compiler.attach_entry_points();
        let plan = compiler.plan;
        plan.check()?;
        debug!(operations = plan.operations.len(), "compiled operation graph");
        Ok(plan)
    }

    /// Number of operations
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the graph holds no operation
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operation by id
    pub fn operation(&self, id: OperationId) -> &Operation {
        &self.operations[id.0]
    }

    /// All operations with their ids
    pub fn operations(&self) -> impl Iterator<Item = (OperationId, &Operation)> {
        self.operations
            .iter()
            .enumerate()
            .map(|(i, operation)| (OperationId(i), operation))
    }

    /// The single entry point
    pub fn init(&self) -> OperationId {
        self.init
    }

    /// `ReadFields` operation of a RecordSet
    pub fn target(&self, record_set: NodeId) -> Option<OperationId> {
        self.targets.get(&record_set).copied()
    }

    /// Direct predecessors of an operation
    pub fn predecessors(&self, id: OperationId) -> impl Iterator<Item = OperationId> + '_ {
        self.predecessors[id.0].iter().copied()
    }

    /// Direct successors of an operation
    pub fn successors(&self, id: OperationId) -> impl Iterator<Item = OperationId> + '_ {
        self.successors[id.0].iter().copied()
    }

    pub(crate) fn operation_mut(&mut self, id: OperationId) -> &mut Operation {
        &mut self.operations[id.0]
    }

    /// Check internal invariants: no self-loop, no cycle, everything reachable from `Init`
    pub fn check(&self) -> Result<()> {
        let self_loops: Vec<String> = self
            .operations()
            .filter(|(id, _)| self.successors[id.0].contains(id))
            .map(|(_, operation)| operation.to_string())
            .collect();
        if !self_loops.is_empty() {
            return Err(Error::Plan(format!(
                "The following operations refered to themselves: {self_loops:?}"
            )));
        }
        if self.topological_order().len() != self.operations.len() {
            return Err(Error::Plan("the operation graph contains a cycle".into()));
        }
        let reachable = self.descendants(self.init);
        let orphans: Vec<String> = self
            .operations()
            .filter(|(id, _)| *id != self.init && !reachable.contains(id))
            .map(|(_, operation)| operation.to_string())
            .collect();
        if !orphans.is_empty() {
            return Err(Error::Plan(format!(
                "operations not connected to the entry point: {orphans:?}"
            )));
        }
        Ok(())
    }

    /// Every operation, each after its predecessors; ties broken by id
    pub fn topological_order(&self) -> Vec<OperationId> {
        let mut in_degree: Vec<usize> = self.predecessors.iter().map(BTreeSet::len).collect();
        let mut ready: BTreeSet<OperationId> = (0..self.operations.len())
            .filter(|i| in_degree[*i] == 0)
            .map(OperationId)
            .collect();
        let mut order = Vec::with_capacity(self.operations.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for next in &self.successors[id.0] {
                in_degree[next.0] -= 1;
                if in_degree[next.0] == 0 {
                    ready.insert(*next);
                }
            }
        }
        order
    }

    fn descendants(&self, start: OperationId) -> BTreeSet<OperationId> {
        self.reach(start, &self.successors)
    }

    fn ancestors(&self, start: OperationId) -> BTreeSet<OperationId> {
        self.reach(start, &self.predecessors)
    }

    fn reach(&self, start: OperationId, edges: &[BTreeSet<OperationId>]) -> BTreeSet<OperationId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            for next in &edges[id.0] {
                if seen.insert(*next) {
                    queue.push_back(*next);
                }
            }
        }
        seen
    }

    /// Operations lying on a path from `Init` to `target`, in execution order
    pub fn relevant(&self, target: OperationId) -> Vec<OperationId> {
        let mut keep = self.ancestors(target);
        keep.insert(target);
        let from_init = self.descendants(self.init);
        self.topological_order()
            .into_iter()
            .filter(|id| keep.contains(id) && (*id == self.init || from_init.contains(id)))
            .collect()
    }

    /// Whether the relevant operations form a single chain
    ///
    /// Degrees are counted inside the relevant sub-graph only: a download shared
    /// with an unrelated RecordSet does not prevent streaming.
    pub fn is_streamable(&self, relevant: &[OperationId]) -> bool {
        let members: BTreeSet<OperationId> = relevant.iter().copied().collect();
        relevant.iter().all(|id| {
            let inside = |edges: &BTreeSet<OperationId>| edges.iter().filter(|e| members.contains(e)).count();
            inside(&self.predecessors[id.0]) + inside(&self.successors[id.0]) <= 2
        })
    }

    fn push(&mut self, operation: Operation) -> OperationId {
        let id = OperationId(self.operations.len());
        self.operations.push(operation);
        self.successors.push(BTreeSet::new());
        self.predecessors.push(BTreeSet::new());
        id
    }

    fn connect(&mut self, from: OperationId, to: OperationId) {
        self.successors[from.0].insert(to);
        self.predecessors[to.0].insert(from);
    }
}

struct Compiler<'a> {
    graph: &'a StructureGraph,
    plan: OperationGraph,
    /// Operation producing the files of a resource
    files: HashMap<NodeId, OperationId>,
    /// Operation producing the directory a container exposes to contained resources
    directories: HashMap<NodeId, OperationId>,
    /// Operation producing the table of a resource or RecordSet
    tables: HashMap<NodeId, OperationId>,
}

impl Compiler<'_> {
    fn add(&mut self, kind: OperationKind, node: NodeId) -> OperationId {
        let graph = self.graph;
        let uid = graph.node(node).uid().to_string();
        let uid = if uid.is_empty() {
            graph.node(node).name().to_string()
        } else {
            uid
        };
        self.plan.push(Operation { kind, node, uid })
    }

    fn compile_resources(&mut self) -> Result<()> {
        let graph = self.graph;
        let resources: Vec<NodeId> = self
            .graph
            .topological_order()
            .iter()
            .copied()
            .filter(|id| graph.node(*id).is_resource())
            .collect();
        for id in resources {
            let files = self.files_of(id)?;
            self.files.insert(id, files);
            let consumed = self
                .graph
                .successors(id)
                .any(|next| matches!(graph.node(next), Node::Field(_)));
            if consumed {
                let read = self.add(OperationKind::Read, id);
                self.plan.connect(files, read);
                self.tables.insert(id, read);
            }
        }
        Ok(())
    }

    fn containers(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let graph = self.graph;
        let Some(refs) = graph.node(id).contained_in() else {
            return Ok(Vec::new());
        };
        refs.uids
            .iter()
            .map(|uid| {
                graph.resolve(uid).ok_or_else(|| {
                    Error::Plan(format!("unresolved container \"{uid}\" of {}", graph.node(id).uid()))
                })
            })
            .collect()
    }

    fn directory_of(&mut self, container: NodeId) -> Result<OperationId> {
        let graph = self.graph;
        if let Some(id) = self.directories.get(&container) {
            return Ok(*id);
        }
        let files = *self.files.get(&container).ok_or_else(|| {
            Error::Plan(format!(
                "container {} is compiled after its content",
                graph.node(container).uid()
            ))
        })?;
        let node = graph.node(container);
        let archive = matches!(node, Node::FileObject(_))
            && EncodingFormat::select(node.encoding_formats()).is_archive();
        let directory = if archive {
            let extract = self.add(OperationKind::Extract, container);
            self.plan.connect(files, extract);
            extract
        } else {
            files
        };
        self.directories.insert(container, directory);
        Ok(directory)
    }

    /// Merge several upstream file lists when there is more than one
    fn merge(&mut self, id: NodeId, upstream: Vec<OperationId>) -> OperationId {
        if let [single] = upstream.as_slice() {
            return *single;
        }
        let concatenate = self.add(OperationKind::Concatenate, id);
        for operation in upstream {
            self.plan.connect(operation, concatenate);
        }
        concatenate
    }

    fn files_of(&mut self, id: NodeId) -> Result<OperationId> {
        let graph = self.graph;
        let containers = self.containers(id)?;
        let upstream = containers
            .into_iter()
            .map(|container| self.directory_of(container))
            .collect::<Result<Vec<_>>>()?;
        match graph.node(id) {
            Node::FileObject(_) if upstream.is_empty() => Ok(self.add(OperationKind::Download, id)),
            Node::FileObject(_) => Ok(self.merge(id, upstream)),
            Node::FileSet(file_set) => {
                let root = if upstream.is_empty() {
                    self.add(OperationKind::LocalDirectory, id)
                } else {
                    self.merge(id, upstream)
                };
                let filter = self.add(
                    OperationKind::FilterFiles {
                        includes: file_set.includes.items.clone(),
                        excludes: file_set.excludes.items.clone(),
                    },
                    id,
                );
                self.plan.connect(root, filter);
                Ok(filter)
            }
            other => Err(Error::Plan(format!("{} is not a resource", other.uid()))),
        }
    }

    fn compile_record_sets(&mut self) -> Result<()> {
        let graph = self.graph;
        for id in graph.record_set_order() {
            let Some(record_set) = graph.record_set(id) else {
                continue;
            };
            let read_fields = self.add(OperationKind::ReadFields, id);
            if record_set.has_data() {
                let data = self.add(OperationKind::Data, id);
                self.plan.connect(data, read_fields);
            } else {
                let mut groups = graph.upstream_groups(record_set);
                let mut joined = false;
                for field in graph.all_fields(record_set) {
                    if let Some(reference) = graph.field(field).and_then(|f| f.references_node()) {
                        groups.insert(graph.group(reference));
                        joined = true;
                    }
                }
                groups.remove(&id);
                let producers = groups
                    .iter()
                    .map(|group| {
                        self.tables.get(group).copied().ok_or_else(|| {
                            Error::Plan(format!(
                                "no operation produces the data of {} for RecordSet {}",
                                graph.node(*group).uid(),
                                record_set.info.uid
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                if producers.len() > 1 || (joined && !producers.is_empty()) {
                    let join = self.add(OperationKind::Join, id);
                    for producer in producers {
                        self.plan.connect(producer, join);
                    }
                    self.plan.connect(join, read_fields);
                } else if let Some(producer) = producers.first() {
                    self.plan.connect(*producer, read_fields);
                }
            }
            self.tables.insert(id, read_fields);
            self.plan.targets.insert(id, read_fields);
        }
        Ok(())
    }

    fn attach_entry_points(&mut self) {
        let init = self.plan.init;
        let entries: Vec<OperationId> = self
            .plan
            .operations()
            .map(|(id, _)| id)
            .filter(|id| *id != init && self.plan.predecessors[id.0].is_empty())
            .collect();
        for entry in entries {
            self.plan.connect(init, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use croissant_core::{DatasetConfig, Issues};
    use serde_json::json;
    use std::sync::Arc;

    fn compile(manifest: &serde_json::Value) -> (StructureGraph, OperationGraph) {
        let config = DatasetConfig::builder()
            .cache_dir("/tmp/unused")
            .folder("/tmp/unused")
            .live_dataset(true)
            .build();
        let graph = StructureGraph::build(manifest, &config, Arc::new(Issues::new())).unwrap();
        let plan = OperationGraph::compile(&graph).unwrap();
        (graph, plan)
    }

    fn names(plan: &OperationGraph, ids: &[OperationId]) -> Vec<String> {
        ids.iter().map(|id| plan.operation(*id).to_string()).collect()
    }

    fn context() -> serde_json::Value {
        json!({"@vocab": "https://schema.org/", "cr": "http://mlcommons.org/croissant/", "sc": "https://schema.org/"})
    }

    fn movies_manifest() -> serde_json::Value {
        json!({
            "@context": context(),
            "@type": "sc:Dataset",
            "name": "movies",
            "conformsTo": "http://mlcommons.org/croissant/1.0",
            "distribution": [
                {"@type": "cr:FileObject", "@id": "archive.zip", "name": "archive.zip",
                 "contentUrl": "https://example.com/archive.zip", "encodingFormat": "application/zip"},
                {"@type": "cr:FileObject", "@id": "ratings.csv", "name": "ratings.csv",
                 "contentUrl": "ml/ratings.csv", "encodingFormat": "text/csv",
                 "containedIn": {"@id": "archive.zip"}},
                {"@type": "cr:FileSet", "@id": "posters", "name": "posters",
                 "includes": "*.jpg", "encodingFormat": "image/jpeg",
                 "containedIn": {"@id": "archive.zip"}}
            ],
            "recordSet": [
                {"@type": "cr:RecordSet", "@id": "movies", "name": "movies",
                 "field": [
                    {"@type": "cr:Field", "@id": "movies/id", "name": "id", "dataType": "sc:Text",
                     "source": {"fileSet": {"@id": "posters"}, "extract": {"fileProperty": "filename"}}}
                 ]},
                {"@type": "cr:RecordSet", "@id": "ratings", "name": "ratings",
                 "field": [
                    {"@type": "cr:Field", "@id": "ratings/movie", "name": "movie", "dataType": "sc:Text",
                     "source": {"fileObject": {"@id": "ratings.csv"}, "extract": {"column": "movie"}},
                     "references": {"field": {"@id": "movies/id"}}},
                    {"@type": "cr:Field", "@id": "ratings/rating", "name": "rating", "dataType": "sc:Float",
                     "source": {"fileObject": {"@id": "ratings.csv"}, "extract": {"column": "rating"}}}
                 ]}
            ]
        })
    }

    #[test]
    fn test_empty_plan() {
        let plan = OperationGraph::default();
        assert!(plan.is_empty());
        assert_eq!(plan.init(), OperationId::default());
        assert!(plan.topological_order().is_empty());
    }

    #[test]
    fn test_archive_chain() {
        let (graph, plan) = compile(&movies_manifest());
        let movies = graph.record_set_by_name("movies").unwrap();
        let relevant = plan.relevant(plan.target(movies).unwrap());
        assert_eq!(
            names(&plan, &relevant),
            vec![
                "Init(movies)",
                "Download(archive.zip)",
                "Extract(archive.zip)",
                "FilterFiles(posters)",
                "Read(posters)",
                "ReadFields(movies)",
            ]
        );
        assert!(plan.is_streamable(&relevant));
    }

    #[test]
    fn test_join_is_not_streamable() {
        let (graph, plan) = compile(&movies_manifest());
        let ratings = graph.record_set_by_name("ratings").unwrap();
        let relevant = plan.relevant(plan.target(ratings).unwrap());
        let names = names(&plan, &relevant);
        assert!(names.contains(&"Join(ratings)".to_string()));
        assert!(names.contains(&"ReadFields(movies)".to_string()));
        assert_eq!(names.last().map(String::as_str), Some("ReadFields(ratings)"));
        assert!(!plan.is_streamable(&relevant));
    }

    #[test]
    fn test_single_init_and_extract_shared() {
        let (_, plan) = compile(&movies_manifest());
        let extracts = plan
            .operations()
            .filter(|(_, op)| op.kind == OperationKind::Extract)
            .count();
        assert_eq!(extracts, 1);
        let entries = plan
            .operations()
            .filter(|(id, _)| plan.predecessors(*id).next().is_none())
            .count();
        assert_eq!(entries, 1);
        plan.check().unwrap();
    }

    #[test]
    fn test_inline_data() {
        let manifest = json!({
            "@context": context(),
            "@type": "sc:Dataset",
            "name": "splits",
            "conformsTo": "http://mlcommons.org/croissant/1.0",
            "recordSet": [{
                "@type": "cr:RecordSet", "@id": "splits", "name": "splits",
                "field": [{"@type": "cr:Field", "@id": "splits/name", "name": "name", "dataType": "sc:Text"}],
                "data": [{"splits/name": "train"}, {"splits/name": "test"}]
            }]
        });
        let (graph, plan) = compile(&manifest);
        let splits = graph.record_set_by_name("splits").unwrap();
        let relevant = plan.relevant(plan.target(splits).unwrap());
        assert_eq!(
            names(&plan, &relevant),
            vec!["Init(splits)", "Data(splits)", "ReadFields(splits)"]
        );
    }
}

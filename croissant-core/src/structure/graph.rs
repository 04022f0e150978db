//! Arena-backed structure graph and its second-pass checks
//!
//! Nodes live in a `Vec` and are addressed by [`NodeId`]. Edges point in the
//! direction data flows: a container precedes what it contains, a source precedes
//! the field reading from it, and a sub-field precedes its parent field.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::DatasetConfig;
use crate::data_type::DataType;
use crate::error::Result;
use crate::issues::{IssueContext, Issues};
use crate::structure::nodes::{Field, FileObject, FileSet, Metadata, Node, NodeId, RecordSet};
use crate::structure::parse::Parser;
use crate::structure::source::{Source, SourceKind};
use crate::vocab::CroissantVersion;

/// Validated graph of manifest nodes
#[derive(Debug)]
pub struct StructureGraph {
    nodes: Vec<Node>,
    root: NodeId,
    index: HashMap<String, NodeId>,
    successors: Vec<BTreeSet<NodeId>>,
    predecessors: Vec<BTreeSet<NodeId>>,
    order: Vec<NodeId>,
    data_types: HashMap<NodeId, DataType>,
    issues: Arc<Issues>,
}

impl StructureGraph {
    /// Parse, link and validate a manifest
    ///
    /// Every problem is recorded in `issues`; the call fails with
    /// [`Error::Validation`](crate::Error::Validation) once all checks have run if any
    /// of them is an error.
    pub fn build(
        manifest: &serde_json::Value,
        config: &DatasetConfig,
        issues: Arc<Issues>,
    ) -> Result<Self> {
        let mut parser = Parser::new(&issues, config.live_dataset());
        let root = parser.parse_manifest(manifest);
        let nodes = std::mem::take(&mut parser.nodes);
        let count = nodes.len();

        let mut graph = Self {
            nodes,
            root,
            index: HashMap::new(),
            successors: vec![BTreeSet::new(); count],
            predecessors: vec![BTreeSet::new(); count],
            order: Vec::new(),
            data_types: HashMap::new(),
            issues,
        };
        graph.index_nodes();
        graph.link();
        graph.check_sources();
        graph.sort();
        graph.check_record_sets();
        graph.resolve_data_types();
        graph.check_mapping(config);

        for warning in graph.issues.warnings() {
            warn!(%warning, "manifest validation warning");
        }
        graph.issues.check()?;
        debug!(
            nodes = graph.nodes.len(),
            record_sets = graph.metadata().record_sets.len(),
            "structure graph built"
        );
        Ok(graph)
    }

    fn index_nodes(&mut self) {
        for (i, node) in self.nodes.iter().enumerate() {
            if i == self.root.0 {
                continue;
            }
            let uid = node.uid();
            if self.index.insert(uid.to_string(), NodeId(i)).is_some() {
                self.issues.add_error(
                    &node.info().context,
                    format!("Duplicate nodes with the same identifier: {uid}"),
                );
            }
        }
    }

    fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.successors[from.0].insert(to);
        self.predecessors[to.0].insert(from);
    }

    fn dangling(&self, uid: &str, ctx: &IssueContext, holder: &str) {
        self.issues.add_error(
            ctx,
            format!(
                "There is a reference to node named \"{uid}\" in node \"{holder}\", but \
                 this node doesn't exist."
            ),
        );
    }

    fn link(&mut self) {
        let mut edges = Vec::new();
        let mut source_nodes = Vec::new();
        for (i, node) in self.nodes.iter().enumerate() {
            let id = NodeId(i);
            match node {
                Node::Metadata(_) => {}
                Node::FileObject(_) | Node::FileSet(_) => match node.contained_in() {
                    Some(refs) if !refs.is_empty() => {
                        for uid in &refs.uids {
                            match self.resolve(uid) {
                                Some(parent) if self.nodes[parent.0].is_resource() => {
                                    edges.push((parent, id));
                                }
                                Some(parent) => self.issues.add_error(
                                    &node.info().context,
                                    format!(
                                        "\"{}\" is contained in \"{uid}\", which is a {} and \
                                         not a FileObject or FileSet.",
                                        node.uid(),
                                        self.nodes[parent.0].kind()
                                    ),
                                ),
                                None => self.dangling(uid, &node.info().context, node.uid()),
                            }
                        }
                    }
                    _ => edges.push((self.root, id)),
                },
                Node::RecordSet(record_set) => {
                    edges.push((self.root, id));
                    if record_set.has_data() {
                        edges.extend(record_set.fields.iter().map(|field| (id, *field)));
                    }
                }
                Node::Field(field) => {
                    let ctx = &field.info.context;
                    let source = field.source.as_ref().and_then(|source| {
                        let target = self.resolve_source(source);
                        if target.is_none() {
                            self.dangling(&source.uid, ctx, &field.info.uid);
                        }
                        target
                    });
                    let references = field.references.as_ref().and_then(|reference| {
                        let target = self.resolve_source(reference);
                        if target.is_none() {
                            self.dangling(&reference.uid, ctx, &field.info.uid);
                        }
                        target
                    });
                    edges.extend(source.map(|source| (source, id)));
                    edges.extend(references.map(|reference| (reference, id)));
                    edges.extend(field.sub_fields.iter().map(|sub| (*sub, id)));
                    source_nodes.push((id, source, references));
                }
            }
        }
        for (from, to) in edges {
            self.add_edge(from, to);
        }
        for (id, source, references) in source_nodes {
            if let Node::Field(field) = &mut self.nodes[id.0] {
                field.source_node = source;
                field.references_node = references;
            }
        }
    }

    /// Every non-root node must be reachable from something
    fn check_sources(&self) {
        for (i, node) in self.nodes.iter().enumerate() {
            if i == self.root.0 || !self.predecessors[i].is_empty() {
                continue;
            }
            if let Node::Field(field) = node {
                if field.source.is_none() {
                    self.issues.add_error(
                        &field.info.context,
                        format!(
                            "Node \"{}\" is a field and has no source. Please, use {} to \
                             specify the source.",
                            field.info.uid,
                            self.version().iri("source")
                        ),
                    );
                }
            } else {
                self.issues.add_error(
                    &node.info().context,
                    format!("Node \"{}\" has no predecessor in the graph.", node.uid()),
                );
            }
        }
    }

    /// Kahn's algorithm, always picking the smallest ready id
    fn sort(&mut self) {
        let mut in_degree: Vec<usize> = self.predecessors.iter().map(BTreeSet::len).collect();
        let mut ready: BTreeSet<NodeId> = (0..self.nodes.len())
            .filter(|i| in_degree[*i] == 0)
            .map(NodeId)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for next in &self.successors[id.0] {
                in_degree[next.0] -= 1;
                if in_degree[next.0] == 0 {
                    ready.insert(*next);
                }
            }
        }
        if order.len() < self.nodes.len() {
            let cyclic: Vec<&str> = (0..self.nodes.len())
                .filter(|i| in_degree[*i] > 0)
                .map(|i| self.nodes[i].uid())
                .collect();
            self.issues.add_error(
                &self.metadata().info.context,
                format!("The structure graph contains a cycle involving: {cyclic:?}"),
            );
        }
        self.order = order;
    }

    fn check_record_sets(&self) {
        for id in &self.metadata().record_sets {
            let Some(record_set) = self.record_set(*id) else {
                continue;
            };
            if record_set.has_data() {
                self.check_data(record_set);
            } else {
                self.check_join(record_set);
            }
        }
    }

    fn check_data(&self, record_set: &RecordSet) {
        let ctx = &record_set.info.context;
        let Some(rows) = record_set.data_rows() else {
            self.issues.add_error(
                ctx,
                format!(
                    "{} should be a list of records. Got: {}",
                    self.version().iri("data"),
                    record_set.data.as_ref().map_or_else(String::new, ToString::to_string)
                ),
            );
            return;
        };
        let fields: Vec<&Field> = record_set
            .fields
            .iter()
            .filter_map(|id| self.field(*id))
            .collect();
        let names: BTreeSet<&str> = fields.iter().map(|f| f.info.name.as_str()).collect();
        let uids: BTreeSet<&str> = fields.iter().map(|f| f.info.uid.as_str()).collect();
        for (i, row) in rows.iter().enumerate() {
            let keys: BTreeSet<&str> = row.keys().map(String::as_str).collect();
            if keys != names && keys != uids {
                self.issues.add_error(
                    ctx,
                    format!(
                        "Line #{i} doesn't have the expected columns. Expected: {names:?}. \
                         Got: {keys:?}."
                    ),
                );
            }
        }
    }

    /// Upstream groups feeding a RecordSet: resources, or other RecordSets
    pub fn upstream_groups(&self, record_set: &RecordSet) -> BTreeSet<NodeId> {
        let mut groups = BTreeSet::new();
        let mut stack: Vec<NodeId> = record_set.fields.clone();
        while let Some(id) = stack.pop() {
            let Some(field) = self.field(id) else {
                continue;
            };
            stack.extend(field.sub_fields.iter().copied());
            if let Some(source) = field.source_node {
                groups.insert(self.group_of(source));
            }
        }
        groups
    }

    fn group_of(&self, id: NodeId) -> NodeId {
        match &self.nodes[id.0] {
            Node::Field(field) => field.record_set.unwrap_or(id),
            _ => id,
        }
    }

    fn check_join(&self, record_set: &RecordSet) {
        let groups = self.upstream_groups(record_set);
        if groups.len() <= 1 {
            return;
        }
        let has_references = self
            .all_fields(record_set)
            .into_iter()
            .any(|id| self.field(id).is_some_and(|f| f.references.is_some()));
        if !has_references {
            let names: Vec<&str> = groups.iter().map(|id| self.nodes[id.0].uid()).collect();
            self.issues.add_error(
                &record_set.info.context,
                format!(
                    "The RecordSet reads from several sources {names:?}, but no field declares \
                     {} to join them.",
                    self.version().iri("references")
                ),
            );
        }
    }

    fn resolve_data_types(&mut self) {
        let mut resolved = HashMap::new();
        for id in &self.order {
            let Node::Field(field) = &self.nodes[id.0] else {
                continue;
            };
            let declared = DataType::select(&field.data_types);
            let inherited = || {
                field
                    .source_node
                    .filter(|source| matches!(self.nodes[source.0], Node::Field(_)))
                    .and_then(|source| resolved.get(&source).cloned())
            };
            match declared.or_else(inherited) {
                Some(data_type) => {
                    resolved.insert(*id, data_type);
                }
                None if !field.sub_fields.is_empty() => {}
                None => self.issues.add_error(
                    &field.info.context,
                    format!(
                        "The field does not specify a valid {}, neither does any of its \
                         predecessor.",
                        self.version().iri("dataType")
                    ),
                ),
            }
        }
        self.data_types = resolved;
    }

    fn check_mapping(&self, config: &DatasetConfig) {
        let ctx = &self.metadata().info.context;
        for (key, path) in config.mapping() {
            let matched = self
                .nodes
                .iter()
                .any(|node| node.is_resource() && (node.uid() == key || node.name() == key));
            if !matched {
                self.issues.add_error(
                    ctx,
                    format!("Mapping \"{key}\" does not match any FileObject or FileSet."),
                );
            }
            if !path.exists() {
                self.issues.add_error(
                    ctx,
                    format!(
                        "Mapped path \"{}\" for \"{key}\" does not exist.",
                        path.display()
                    ),
                );
            }
        }
    }

    /// Node by uid; resources may also be referenced by name
    pub fn resolve(&self, uid: &str) -> Option<NodeId> {
        self.index.get(uid).copied().or_else(|| {
            self.nodes
                .iter()
                .position(|node| node.is_resource() && node.name() == uid)
                .map(NodeId)
        })
    }

    fn resolve_source(&self, source: &Source) -> Option<NodeId> {
        let target = self.resolve(&source.uid)?;
        let node = &self.nodes[target.0];
        let compatible = match source.kind {
            SourceKind::Field => matches!(node, Node::Field(_)),
            SourceKind::FileObject => matches!(node, Node::FileObject(_)),
            SourceKind::FileSet => matches!(node, Node::FileSet(_)),
            SourceKind::Distribution => node.is_resource(),
        };
        compatible.then_some(target)
    }

    /// Get a node by id
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// All nodes with their ids, in arena order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    /// Id of the root node
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The dataset node
    pub fn metadata(&self) -> &Metadata {
        match &self.nodes[self.root.0] {
            Node::Metadata(metadata) => metadata,
            _ => unreachable!("the root is always the metadata node"),
        }
    }

    /// Vocabulary revision of the manifest
    pub fn version(&self) -> CroissantVersion {
        self.metadata().version
    }

    /// Shared issue ledger
    pub fn issues(&self) -> &Arc<Issues> {
        &self.issues
    }

    /// Get a FileObject by id
    pub fn file_object(&self, id: NodeId) -> Option<&FileObject> {
        match &self.nodes[id.0] {
            Node::FileObject(node) => Some(node),
            _ => None,
        }
    }

    /// Get a FileSet by id
    pub fn file_set(&self, id: NodeId) -> Option<&FileSet> {
        match &self.nodes[id.0] {
            Node::FileSet(node) => Some(node),
            _ => None,
        }
    }

    /// Get a RecordSet by id
    pub fn record_set(&self, id: NodeId) -> Option<&RecordSet> {
        match &self.nodes[id.0] {
            Node::RecordSet(node) => Some(node),
            _ => None,
        }
    }

    /// Get a Field by id
    pub fn field(&self, id: NodeId) -> Option<&Field> {
        match &self.nodes[id.0] {
            Node::Field(node) => Some(node),
            _ => None,
        }
    }

    /// Find a RecordSet by name or uid
    pub fn record_set_by_name(&self, name: &str) -> Option<NodeId> {
        self.metadata().record_sets.iter().copied().find(|id| {
            let node = &self.nodes[id.0];
            node.name() == name || node.uid() == name
        })
    }

    /// Names of the declared RecordSets
    pub fn record_set_names(&self) -> Vec<String> {
        self.metadata()
            .record_sets
            .iter()
            .map(|id| self.nodes[id.0].name().to_string())
            .collect()
    }

    /// Top-level fields and all nested sub-fields, parents first
    pub fn all_fields(&self, record_set: &RecordSet) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = record_set.fields.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(field) = self.field(id) {
                stack.extend(field.sub_fields.iter().rev().copied());
            }
        }
        out
    }

    /// Nodes reached by an outgoing edge
    pub fn successors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.successors[id.0].iter().copied()
    }

    /// Nodes with an edge into `id`
    pub fn predecessors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.predecessors[id.0].iter().copied()
    }

    /// All nodes, every node after its predecessors
    pub fn topological_order(&self) -> &[NodeId] {
        &self.order
    }

    /// RecordSets ordered so that a RecordSet reading from another comes after it
    pub fn record_set_order(&self) -> Vec<NodeId> {
        let record_sets = &self.metadata().record_sets;
        let mut deps: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for id in record_sets {
            let upstream = self
                .record_set(*id)
                .map(|rs| {
                    let mut groups = self.upstream_groups(rs);
                    for field in self.all_fields(rs) {
                        if let Some(reference) = self.field(field).and_then(|f| f.references_node) {
                            groups.insert(self.group_of(reference));
                        }
                    }
                    groups
                })
                .unwrap_or_default();
            deps.insert(
                *id,
                upstream
                    .into_iter()
                    .filter(|g| *g != *id && record_sets.contains(g))
                    .collect(),
            );
        }
        let mut order = Vec::with_capacity(record_sets.len());
        let mut done = BTreeSet::new();
        while order.len() < record_sets.len() {
            let next = record_sets
                .iter()
                .find(|id| !done.contains(*id) && deps[*id].iter().all(|d| done.contains(d)));
            // Cycles were rejected during validation.
            let Some(next) = next else { break };
            done.insert(*next);
            order.push(*next);
        }
        order
    }

    /// Resolved data type of a field
    pub fn data_type(&self, id: NodeId) -> Option<&DataType> {
        self.data_types.get(&id)
    }

    /// Column of the upstream table holding a source's values
    ///
    /// Field sources are read from the upstream RecordSet's output, keyed by field name.
    pub fn source_column(&self, source: &Source) -> String {
        if source.kind == SourceKind::Field && source.extract.is_empty() {
            if let Some(field) = self.resolve(&source.uid).and_then(|id| self.field(id)) {
                return field.info.name.clone();
            }
        }
        source.column()
    }

    /// Owning RecordSet of a node; resources are their own group
    pub fn group(&self, id: NodeId) -> NodeId {
        self.group_of(id)
    }
}

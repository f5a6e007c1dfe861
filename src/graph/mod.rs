//! Editor-owned dataflow graph.
//!
//! The graph is the model the editor collaborator manipulates: block nodes,
//! data-source nodes and typed edges between them. The scheduler reads it on
//! every tick and recompiles the engine network whenever its topology changes.

pub mod history;
pub mod id;

pub use history::{GraphOperation, HistoryStack, DEFAULT_HISTORY_CAPACITY};
pub use id::{EdgeId, NodeId};

use crate::engine::{EngineHandle, ReadoutKind};
use crate::sources::{SourceId, SourceKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("node {0} already exists")]
    DuplicateNode(NodeId),

    #[error("edge {0} already exists")]
    DuplicateEdge(EdgeId),

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("unknown edge {0}")]
    UnknownEdge(EdgeId),

    #[error("edge {edge} references missing node {node}")]
    DanglingEdge { edge: EdgeId, node: NodeId },
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Kind of block a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockType {
    ScalarTransformer,
    DiscreteTransformer,
    PersistenceTransformer,
    PatternPooler,
    PatternClassifier,
    SequenceLearner,
    ContextLearner,
    /// Editor-side node bound to a data source; has no engine block
    DataSource,
}

impl BlockType {
    pub fn name(&self) -> &'static str {
        match self {
            BlockType::ScalarTransformer => "scalarTransformer",
            BlockType::DiscreteTransformer => "discreteTransformer",
            BlockType::PersistenceTransformer => "persistenceTransformer",
            BlockType::PatternPooler => "patternPooler",
            BlockType::PatternClassifier => "patternClassifier",
            BlockType::SequenceLearner => "sequenceLearner",
            BlockType::ContextLearner => "contextLearner",
            BlockType::DataSource => "dataSource",
        }
    }

    /// Which source values this block accepts over a `dataSourceLink`
    pub fn consumer_kind(&self) -> Option<SourceKind> {
        match self {
            BlockType::ScalarTransformer | BlockType::PersistenceTransformer => Some(SourceKind::Scalar),
            BlockType::DiscreteTransformer => Some(SourceKind::Discrete),
            _ => None,
        }
    }

    /// Needs `init_block` once before the first execute
    pub fn is_learning(&self) -> bool {
        matches!(
            self,
            BlockType::PatternPooler
                | BlockType::PatternClassifier
                | BlockType::SequenceLearner
                | BlockType::ContextLearner
        )
    }

    pub fn has_engine_block(&self) -> bool {
        !matches!(self, BlockType::DataSource)
    }

    pub fn readout(&self) -> ReadoutKind {
        match self {
            BlockType::PatternClassifier => ReadoutKind::Probability,
            BlockType::PatternPooler | BlockType::SequenceLearner | BlockType::ContextLearner => {
                ReadoutKind::Anomaly
            }
            _ => ReadoutKind::ActiveFraction,
        }
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeKind {
    Input,
    Context,
    DataSourceLink,
}

impl EdgeKind {
    pub fn name(&self) -> &'static str {
        match self {
            EdgeKind::Input => "input",
            EdgeKind::Context => "context",
            EdgeKind::DataSourceLink => "dataSourceLink",
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Free-form node payload. Block parameters ride along in `params`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<SourceId>,
    /// Assigned by compilation; never persisted
    #[serde(skip)]
    pub engine_handle: Option<EngineHandle>,
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub data: NodeData,
}

impl GraphNode {
    pub fn new(id: impl Into<NodeId>, block_type: BlockType) -> Self {
        Self {
            id: id.into(),
            block_type,
            position: Position::default(),
            data: NodeData::default(),
        }
    }

    /// Data-source node bound to `source`
    pub fn source(id: impl Into<NodeId>, source: SourceId) -> Self {
        let mut node = Self::new(id, BlockType::DataSource);
        node.data.source_id = Some(source);
        node
    }

    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.data.params.insert(key.to_string(), value.into());
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.data.params.get(key).and_then(serde_json::Value::as_f64)
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.data.params.get(key).and_then(serde_json::Value::as_u64)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        NodeId::new(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
}

impl GraphEdge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>, kind: EdgeKind) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: EdgeId::between(&source, &target, kind),
            source,
            target,
            kind,
        }
    }

    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source == node || &self.target == node
    }
}

/// A topology edit as requested by the editor.
///
/// Removals name only the id; [`Graph::apply_edit`] captures the full payload
/// so the edit can be undone.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEdit {
    AddNode(GraphNode),
    RemoveNode(NodeId),
    AddEdge(GraphEdge),
    RemoveEdge(EdgeId),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted parts, rejecting duplicates and dangling edges
    pub fn from_parts(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> GraphResult<Self> {
        let mut graph = Self::new();
        for node in nodes {
            graph.add_node(node)?;
        }
        for edge in edges {
            graph.add_edge(edge)?;
        }
        Ok(graph)
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut GraphNode> {
        self.nodes.iter_mut()
    }

    pub fn node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut GraphNode> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&GraphEdge> {
        self.edges.iter().find(|e| &e.id == id)
    }

    /// The data-source node bound to `source`, if any
    pub fn node_for_source(&self, source: &SourceId) -> Option<&GraphNode> {
        self.nodes
            .iter()
            .find(|n| n.data.source_id.as_ref() == Some(source))
    }

    pub fn outgoing<'a>(&'a self, node: &'a NodeId, kind: EdgeKind) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges
            .iter()
            .filter(move |e| &e.source == node && e.kind == kind)
    }

    pub fn incident_edges(&self, node: &NodeId) -> Vec<GraphEdge> {
        self.edges.iter().filter(|e| e.touches(node)).cloned().collect()
    }

    pub fn add_node(&mut self, mut node: GraphNode) -> GraphResult<()> {
        if self.node(&node.id).is_some() {
            return Err(GraphError::DuplicateNode(node.id));
        }
        node.data.engine_handle = None;
        node.data.params.remove("engineHandle");
        self.nodes.push(node);
        Ok(())
    }

    /// Remove a node together with every edge touching it
    pub fn remove_node(&mut self, id: &NodeId) -> GraphResult<(GraphNode, Vec<GraphEdge>)> {
        let index = self
            .nodes
            .iter()
            .position(|n| &n.id == id)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
        let edges = self.incident_edges(id);
        self.edges.retain(|e| !e.touches(id));
        Ok((self.nodes.remove(index), edges))
    }

    pub fn add_edge(&mut self, edge: GraphEdge) -> GraphResult<()> {
        if self.edge(&edge.id).is_some() {
            return Err(GraphError::DuplicateEdge(edge.id));
        }
        for endpoint in [&edge.source, &edge.target] {
            if self.node(endpoint).is_none() {
                return Err(GraphError::DanglingEdge {
                    edge: edge.id.clone(),
                    node: endpoint.clone(),
                });
            }
        }
        self.edges.push(edge);
        Ok(())
    }

    pub fn remove_edge(&mut self, id: &EdgeId) -> GraphResult<GraphEdge> {
        let index = self
            .edges
            .iter()
            .position(|e| &e.id == id)
            .ok_or_else(|| GraphError::UnknownEdge(id.clone()))?;
        Ok(self.edges.remove(index))
    }

    /// Apply an editor request and return the recorded operation
    pub fn apply_edit(&mut self, edit: GraphEdit) -> GraphResult<GraphOperation> {
        let op = match edit {
            GraphEdit::AddNode(node) => GraphOperation::AddNode {
                node,
                edges: Vec::new(),
            },
            GraphEdit::RemoveNode(id) => {
                let node = self
                    .node(&id)
                    .cloned()
                    .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
                GraphOperation::RemoveNode {
                    edges: self.incident_edges(&id),
                    node,
                }
            }
            GraphEdit::AddEdge(edge) => GraphOperation::AddEdge(edge),
            GraphEdit::RemoveEdge(id) => GraphOperation::RemoveEdge(
                self.edge(&id)
                    .cloned()
                    .ok_or_else(|| GraphError::UnknownEdge(id.clone()))?,
            ),
        };
        op.apply(self)?;
        Ok(op)
    }

    /// Drop every engine handle, e.g. before a recompile
    pub fn clear_handles(&mut self) {
        for node in &mut self.nodes {
            node.data.engine_handle = None;
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

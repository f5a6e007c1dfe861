//! Persisted network files.
//!
//! A network file is a version-tagged JSON document holding the graph and the
//! data-source configs. Engine handles are never written; they are recreated
//! by the next compilation after load. Sources keep their seed so a reloaded
//! network reproduces the same sequences.

use crate::error::{BlockFlowError, Result, ResultExt};
use crate::graph::{Graph, GraphEdge, GraphNode};
use crate::sources::DataSourceConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Newest file version this build can read
pub const NETWORK_FILE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkFile {
    #[serde(default = "default_version")]
    pub version: u32,

    /// When the file was written
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub nodes: Vec<GraphNode>,

    #[serde(default)]
    pub edges: Vec<GraphEdge>,

    #[serde(default, rename = "dataSources")]
    pub data_sources: Vec<DataSourceConfig>,
}

fn default_version() -> u32 {
    NETWORK_FILE_VERSION
}

impl Default for NetworkFile {
    fn default() -> Self {
        Self {
            version: NETWORK_FILE_VERSION,
            timestamp: Utc::now(),
            nodes: Vec::new(),
            edges: Vec::new(),
            data_sources: Vec::new(),
        }
    }
}

impl NetworkFile {
    pub fn new(graph: &Graph, data_sources: Vec<DataSourceConfig>) -> Self {
        Self {
            nodes: graph.nodes().to_vec(),
            edges: graph.edges().to_vec(),
            data_sources,
            ..Default::default()
        }
    }

    /// Rebuild the graph, rejecting duplicate ids and dangling edges
    pub fn to_graph(&self) -> Result<Graph> {
        Ok(Graph::from_parts(self.nodes.clone(), self.edges.clone())?)
    }

    /// Parse a network from a JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        let file: NetworkFile = serde_json::from_str(content)?;
        if file.version > NETWORK_FILE_VERSION {
            return Err(BlockFlowError::Config(format!(
                "Network file version {} is newer than supported version {}",
                file.version, NETWORK_FILE_VERSION
            )));
        }
        Ok(file)
    }

    /// Load a network file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BlockFlowError::Config(format!("Failed to read network file {:?}: {}", path, e))
        })?;

        Self::from_json(&content).with_context(|| format!("Failed to load {:?}", path))
    }

    /// Save the network to disk as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    BlockFlowError::Config(format!("Failed to create network directory: {}", e))
                })?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;

        std::fs::write(path, content).map_err(|e| {
            BlockFlowError::Config(format!("Failed to write network file {:?}: {}", path, e))
        })?;

        tracing::info!(
            "Saved network ({} nodes, {} edges, {} sources) to {:?}",
            self.nodes.len(),
            self.edges.len(),
            self.data_sources.len(),
            path
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineHandle;
    use crate::graph::{BlockType, EdgeKind};
    use crate::sources::{ScalarParams, SourceId, SourceParams};

    fn sample_graph() -> Graph {
        let mut graph = Graph::new();
        graph
            .add_node(GraphNode::source("src", SourceId::new("source-0")))
            .unwrap();
        graph
            .add_node(GraphNode::new("enc", BlockType::ScalarTransformer).with_param("numBits", 64))
            .unwrap();
        graph
            .add_edge(GraphEdge::new("src", "enc", EdgeKind::DataSourceLink))
            .unwrap();
        graph
    }

    #[test]
    fn test_handles_are_not_persisted() {
        let mut graph = sample_graph();
        for node in graph.nodes_mut() {
            node.data.engine_handle = Some(EngineHandle(7));
        }

        let json = serde_json::to_string(&NetworkFile::new(&graph, Vec::new())).unwrap();
        assert!(!json.contains("engineHandle"));

        let file = NetworkFile::from_json(&json).unwrap();
        let restored = file.to_graph().unwrap();
        assert!(restored.nodes().iter().all(|n| n.data.engine_handle.is_none()));
    }

    #[test]
    fn test_wire_shape() {
        let config = DataSourceConfig::scalar("sine", ScalarParams::default()).with_seed(42);
        let file = NetworkFile::new(&sample_graph(), vec![config]);
        let value = serde_json::to_value(&file).unwrap();

        assert_eq!(value["version"], 1);
        assert_eq!(value["nodes"][1]["type"], "scalarTransformer");
        assert_eq!(value["edges"][0]["type"], "dataSourceLink");
        assert_eq!(value["dataSources"][0]["type"], "scalar");
        assert_eq!(value["dataSources"][0]["seed"], 42);
    }

    #[test]
    fn test_minimal_document() {
        let file = NetworkFile::from_json(
            r#"{
                "nodes": [{"id": "a", "type": "dataSource", "data": {"sourceId": "s"}}],
                "dataSources": [{"id": "s", "type": "discrete", "numCategories": 3, "seed": 9}]
            }"#,
        )
        .unwrap();
        assert_eq!(file.version, NETWORK_FILE_VERSION);
        assert!(file.edges.is_empty());
        assert!(matches!(file.data_sources[0].params, SourceParams::Discrete(ref p) if p.num_categories == 3));
    }

    #[test]
    fn test_rejects_newer_version() {
        let err = NetworkFile::from_json(r#"{"version": 99}"#).unwrap_err();
        assert!(matches!(err, BlockFlowError::Config(_)));
    }

    #[test]
    fn test_dangling_edge_rejected_on_rebuild() {
        let file = NetworkFile::from_json(
            r#"{"edges": [{"id": "e", "source": "x", "target": "y", "type": "input"}]}"#,
        )
        .unwrap();
        assert!(file.to_graph().is_err());
    }
}

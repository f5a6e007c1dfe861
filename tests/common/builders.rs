//! Test data builders for creating networks

use blockflow_rs::config::NetworkFile;
use blockflow_rs::graph::{BlockType, EdgeKind, Graph, GraphEdge, GraphNode};
use blockflow_rs::sources::{DataSourceConfig, DiscreteParams, ScalarParams, SourceId};

/// Builder for persisted networks.
///
/// Every source gets a graph node named after it, so `scalar_source("a", ..)`
/// creates source `a` bound to node `a`.
#[derive(Default)]
pub struct NetworkBuilder {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    sources: Vec<DataSourceConfig>,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scalar_source(mut self, id: &str, seed: i64, params: ScalarParams) -> Self {
        let mut config = DataSourceConfig::scalar(id, params).with_seed(seed);
        config.id = Some(SourceId::new(id));
        self.sources.push(config);
        self.nodes.push(GraphNode::source(id, SourceId::new(id)));
        self
    }

    pub fn discrete_source(mut self, id: &str, seed: i64, params: DiscreteParams) -> Self {
        let mut config = DataSourceConfig::discrete(id, params).with_seed(seed);
        config.id = Some(SourceId::new(id));
        self.sources.push(config);
        self.nodes.push(GraphNode::source(id, SourceId::new(id)));
        self
    }

    pub fn block(mut self, id: &str, block_type: BlockType, num_bits: u32) -> Self {
        self.nodes
            .push(GraphNode::new(id, block_type).with_param("numBits", num_bits));
        self
    }

    pub fn node(mut self, node: GraphNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn link(mut self, source: &str, target: &str) -> Self {
        self.edges
            .push(GraphEdge::new(source, target, EdgeKind::DataSourceLink));
        self
    }

    pub fn input(mut self, source: &str, target: &str) -> Self {
        self.edges.push(GraphEdge::new(source, target, EdgeKind::Input));
        self
    }

    pub fn context(mut self, source: &str, target: &str) -> Self {
        self.edges.push(GraphEdge::new(source, target, EdgeKind::Context));
        self
    }

    pub fn build(self) -> NetworkFile {
        let graph = Graph::from_parts(self.nodes, self.edges).expect("builder produced an invalid graph");
        NetworkFile::new(&graph, self.sources)
    }
}

/// Sine and discrete sources feeding two encoders, a pooler, a sequence
/// learner and a classifier
pub fn demo_network() -> NetworkFile {
    NetworkBuilder::new()
        .scalar_source(
            "sine",
            42,
            ScalarParams {
                frequency: 0.1,
                ..Default::default()
            },
        )
        .discrete_source(
            "weather",
            7,
            DiscreteParams {
                num_categories: 4,
                change_every: 3,
                ..Default::default()
            },
        )
        .node(
            GraphNode::new("enc", BlockType::ScalarTransformer)
                .with_param("numBits", 128)
                .with_param("minVal", -1)
                .with_param("maxVal", 1),
        )
        .node(
            GraphNode::new("cat", BlockType::DiscreteTransformer)
                .with_param("numBits", 64)
                .with_param("numCategories", 4),
        )
        .block("pool", BlockType::PatternPooler, 256)
        .block("seq", BlockType::SequenceLearner, 256)
        .node(
            GraphNode::new("cls", BlockType::PatternClassifier)
                .with_param("numBits", 64)
                .with_param("numLabels", 4),
        )
        .link("sine", "enc")
        .link("weather", "cat")
        .input("enc", "pool")
        .input("cat", "pool")
        .input("pool", "seq")
        .context("cat", "seq")
        .input("seq", "cls")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_builder() {
        let file = demo_network();
        assert_eq!(file.nodes.len(), 7);
        assert_eq!(file.edges.len(), 7);
        assert_eq!(file.data_sources.len(), 2);
        assert_eq!(file.data_sources[0].seed, Some(42));
    }
}

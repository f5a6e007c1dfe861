use super::{BlockEngine, BlockSpec, EngineResult, HandleInfo, HandleRegistry};
use crate::graph::{EdgeKind, Graph, NodeId};
use std::collections::{HashMap, VecDeque};

/// Summary of one compilation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileStats {
    pub blocks: usize,
    pub connections: usize,
    /// `input`/`context` edges with an endpoint that has no engine block
    pub skipped_edges: usize,
    pub learning_blocks: usize,
    /// Nodes on an input cycle, created after the acyclic part
    pub cyclic_nodes: usize,
    pub compile_time_us: u64,
}

/// Result of pushing a graph into a fresh engine
#[derive(Debug, Clone, Default)]
pub struct CompiledNetwork {
    pub handles: HandleRegistry,
    pub stats: CompileStats,
    /// Graph generation this network was compiled from
    pub generation: u64,
}

/// Pushes a graph's topology into an engine
pub struct NetworkCompiler;

impl NetworkCompiler {
    /// Compile `graph` into `engine`.
    ///
    /// Blocks are created in topological order of their `input` edges, then
    /// `input`/`context` edges are connected, the network is built and every
    /// learning-capable block is initialized. Handles are written back into
    /// the graph nodes.
    pub fn compile(graph: &mut Graph, engine: &mut dyn BlockEngine, generation: u64) -> EngineResult<CompiledNetwork> {
        let start_time = std::time::Instant::now();
        graph.clear_handles();

        let (order, cyclic_nodes) = Self::topological_order(graph);
        let mut handles = HandleRegistry::new();
        let mut stats = CompileStats {
            cyclic_nodes,
            ..Default::default()
        };

        for id in &order {
            let Some(node) = graph.node_mut(id) else {
                continue;
            };
            let spec = BlockSpec::from_node(node);
            let handle = engine.add_block(node.id.as_str(), &spec)?;
            node.data.engine_handle = Some(handle);
            handles.register(
                handle,
                HandleInfo {
                    node: node.id.clone(),
                    block_type: spec.block_type,
                    num_bits: spec.num_bits,
                },
            );
            stats.blocks += 1;
        }

        for edge in graph.edges() {
            let connect = match edge.kind {
                EdgeKind::Input => true,
                EdgeKind::Context => false,
                EdgeKind::DataSourceLink => continue,
            };
            let (Some(source), Some(target)) = (handles.handle_for(&edge.source), handles.handle_for(&edge.target)) else {
                tracing::warn!("Edge {} has an endpoint without an engine block, skipping", edge.id);
                stats.skipped_edges += 1;
                continue;
            };
            if connect {
                engine.connect_to_input(source, target)?;
            } else {
                engine.connect_to_context(source, target)?;
            }
            stats.connections += 1;
        }

        engine.build()?;

        for (handle, info) in handles.iter() {
            if info.block_type.is_learning() {
                engine.init_block(handle)?;
                stats.learning_blocks += 1;
            }
        }

        stats.compile_time_us = start_time.elapsed().as_micros() as u64;
        tracing::info!(
            "Compiled network generation {}: {} blocks, {} connections, {} skipped edges ({} us)",
            generation,
            stats.blocks,
            stats.connections,
            stats.skipped_edges,
            stats.compile_time_us
        );

        Ok(CompiledNetwork {
            handles,
            stats,
            generation,
        })
    }

    /// Kahn's algorithm over `input` edges between engine blocks. Nodes left
    /// on cycles are appended in graph order. Returns the order and the
    /// number of cyclic nodes.
    fn topological_order(graph: &Graph) -> (Vec<NodeId>, usize) {
        let blocks: Vec<&NodeId> = graph
            .nodes()
            .iter()
            .filter(|n| n.block_type.has_engine_block())
            .map(|n| &n.id)
            .collect();
        let mut in_degree: HashMap<&NodeId, usize> = blocks.iter().map(|id| (*id, 0)).collect();
        let mut successors: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();

        for edge in graph.edges() {
            if edge.kind != EdgeKind::Input
                || !in_degree.contains_key(&edge.source)
                || !in_degree.contains_key(&edge.target)
            {
                continue;
            }
            successors.entry(&edge.source).or_default().push(&edge.target);
            if let Some(d) = in_degree.get_mut(&edge.target) {
                *d += 1;
            }
        }

        let mut queue: VecDeque<&NodeId> = blocks
            .iter()
            .copied()
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();
        let mut order = Vec::with_capacity(blocks.len());

        while let Some(id) = queue.pop_front() {
            order.push(id.clone());
            for &next in successors.get(id).into_iter().flatten() {
                if let Some(d) = in_degree.get_mut(next) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }

        let sorted = order.len();
        for id in blocks {
            if !order.contains(id) {
                order.push(id.clone());
            }
        }
        let cyclic = order.len() - sorted;
        if cyclic > 0 {
            tracing::warn!("{} blocks form an input cycle", cyclic);
        }
        (order, cyclic)
    }
}

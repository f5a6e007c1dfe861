//! Handle-based contract with the external block engine.
//!
//! The engine is a black box: blocks are created through [`BlockEngine`],
//! identified by opaque [`EngineHandle`]s, wired together, built, and then
//! stepped once per tick. [`HandleRegistry`] maps handles back to the graph
//! nodes that own them.

pub mod compiler;
pub mod sim;
pub mod state;

pub use compiler::{CompileStats, CompiledNetwork, NetworkCompiler};
pub use sim::SimEngine;
pub use state::{decode_state, BlockState, DecodedState};

use crate::graph::{BlockType, GraphNode, NodeId};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Bit width used when a node does not declare `numBits`
pub const DEFAULT_NUM_BITS: u32 = 1024;

/// Opaque reference to a block inside the engine
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineHandle(pub u32);

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EngineHandle({})", self.0)
    }
}

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid engine handle {0}")]
    InvalidHandle(EngineHandle),

    #[error("network must be built before it can execute")]
    NotBuilt,

    #[error("block {0} was not initialized")]
    NotInitialized(EngineHandle),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("engine failure: {0}")]
    Backend(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Scalar readout published for a block each tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadoutKind {
    /// `num_active / num_bits`
    ActiveFraction,
    /// `get_anomaly(handle)`
    Anomaly,
    /// Highest entry of `get_probabilities(handle)`
    Probability,
}

/// Everything the engine needs to create one block
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSpec {
    pub block_type: BlockType,
    pub num_bits: u32,
    /// Remaining node parameters, passed through untouched
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl BlockSpec {
    pub fn new(block_type: BlockType, num_bits: u32) -> Self {
        Self {
            block_type,
            num_bits,
            params: serde_json::Map::new(),
        }
    }

    pub fn from_node(node: &GraphNode) -> Self {
        let num_bits = node
            .param_u64("numBits")
            .filter(|&n| n > 0)
            .map_or(DEFAULT_NUM_BITS, |n| n.min(u32::MAX as u64) as u32);
        let mut params = node.data.params.clone();
        params.remove("numBits");
        Self {
            block_type: node.block_type,
            num_bits,
            params,
        }
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(serde_json::Value::as_f64)
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(serde_json::Value::as_u64)
    }
}

/// The external engine.
///
/// Topology calls (`add_block`, `connect_*`) invalidate the build; `build()`
/// must run again before `execute()`. Learning-capable blocks additionally
/// need `init_block()` once.
#[cfg_attr(test, mockall::automock)]
pub trait BlockEngine: Send {
    fn add_block(&mut self, name: &str, spec: &BlockSpec) -> EngineResult<EngineHandle>;

    fn connect_to_input(&mut self, source: EngineHandle, target: EngineHandle) -> EngineResult<()>;

    fn connect_to_context(&mut self, source: EngineHandle, target: EngineHandle) -> EngineResult<()>;

    fn build(&mut self) -> EngineResult<()>;

    fn init_block(&mut self, handle: EngineHandle) -> EngineResult<()>;

    /// Advance every block by one step
    fn execute(&mut self, learning: bool) -> EngineResult<()>;

    fn set_scalar_value(&mut self, handle: EngineHandle, value: f64) -> EngineResult<()>;

    fn set_discrete_value(&mut self, handle: EngineHandle, value: u32) -> EngineResult<()>;

    /// Snapshot of every block's active bits, see [`decode_state`]
    fn get_state_json(&self) -> EngineResult<String>;

    fn get_probabilities(&self, handle: EngineHandle) -> EngineResult<Vec<f64>>;

    fn get_anomaly(&self, handle: EngineHandle) -> EngineResult<f64>;
}

/// Creates fresh engine instances. A new instance is created for every
/// recompilation since blocks cannot be removed from a built engine.
pub trait EngineFactory: Send {
    fn create(&self) -> EngineResult<Box<dyn BlockEngine>>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> EngineResult<Box<dyn BlockEngine>> + Send,
{
    fn create(&self) -> EngineResult<Box<dyn BlockEngine>> {
        self()
    }
}

/// What a live handle refers to
#[derive(Debug, Clone, PartialEq)]
pub struct HandleInfo {
    pub node: NodeId,
    pub block_type: BlockType,
    pub num_bits: u32,
}

/// Handle ↔ node mapping for the current compilation.
///
/// Entries are dropped when their node is removed or the network is
/// recompiled; resolving a dropped handle fails with
/// [`EngineError::InvalidHandle`].
#[derive(Debug, Clone, Default)]
pub struct HandleRegistry {
    by_handle: HashMap<EngineHandle, HandleInfo>,
    by_node: HashMap<NodeId, EngineHandle>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handle: EngineHandle, info: HandleInfo) {
        if let Some(previous) = self.by_node.insert(info.node.clone(), handle) {
            self.by_handle.remove(&previous);
        }
        self.by_handle.insert(handle, info);
    }

    pub fn resolve(&self, handle: EngineHandle) -> EngineResult<&HandleInfo> {
        self.by_handle
            .get(&handle)
            .ok_or(EngineError::InvalidHandle(handle))
    }

    pub fn handle_for(&self, node: &NodeId) -> Option<EngineHandle> {
        self.by_node.get(node).copied()
    }

    /// Drop the handle owned by `node`
    pub fn invalidate_node(&mut self, node: &NodeId) -> Option<EngineHandle> {
        let handle = self.by_node.remove(node)?;
        self.by_handle.remove(&handle);
        Some(handle)
    }

    pub fn clear(&mut self) {
        self.by_handle.clear();
        self.by_node.clear();
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }

    /// Live handles in ascending order
    pub fn iter(&self) -> impl Iterator<Item = (EngineHandle, &HandleInfo)> {
        let mut handles: Vec<_> = self.by_handle.iter().map(|(h, info)| (*h, info)).collect();
        handles.sort_by_key(|(h, _)| *h);
        handles.into_iter()
    }
}

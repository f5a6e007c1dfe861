//! In-process reference engine.
//!
//! `SimEngine` implements [`BlockEngine`] without any learning algorithm so
//! the scheduler can run headless, in tests and in benches.
//!
//! # Block behavior
//!
//! - **Scalar transformer** - a contiguous window of `numActive` bits whose
//!   position tracks the value within `[minVal, maxVal]`
//! - **Persistence transformer** - same window, positioned by how many ticks
//!   the value has stayed unchanged (up to `maxSteps`)
//! - **Discrete transformer** - one block of `num_bits / numCategories` bits
//!   per category
//! - **Everything else** - the union of its inputs' active bits, folded into
//!   its own width
//!
//! Anomaly is the fraction of active bits that were not active on the
//! previous step. Classifier probabilities are uniform over `numLabels`.
//!
//! # Example
//!
//! ```ignore
//! use blockflow_rs::engine::{BlockEngine, BlockSpec, SimEngine};
//! use blockflow_rs::graph::BlockType;
//!
//! let mut engine = SimEngine::new();
//! let enc = engine.add_block("enc", &BlockSpec::new(BlockType::ScalarTransformer, 64))?;
//! engine.build()?;
//! engine.set_scalar_value(enc, 0.5)?;
//! engine.execute(true)?;
//! let json = engine.get_state_json()?;
//! ```

use super::{BlockEngine, BlockSpec, EngineError, EngineHandle, EngineResult};
use crate::graph::BlockType;
use serde_json::json;

const DEFAULT_CATEGORIES: u64 = 4;
const DEFAULT_LABELS: u64 = 4;
const DEFAULT_MAX_STEPS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pending {
    Scalar(f64),
    Discrete(u32),
}

#[derive(Debug, Clone)]
struct SimBlock {
    name: String,
    spec: BlockSpec,
    inputs: Vec<EngineHandle>,
    /// Last value written by the scheduler; held until overwritten
    value: Option<Pending>,
    /// Persistence transformer: ticks the value has been unchanged
    unchanged_for: u64,
    last_seen: Option<Pending>,
    active: Vec<u32>,
    previous: Vec<u32>,
    initialized: bool,
}

impl SimBlock {
    fn new(name: &str, spec: BlockSpec) -> Self {
        Self {
            name: name.to_string(),
            spec,
            inputs: Vec::new(),
            value: None,
            unchanged_for: 0,
            last_seen: None,
            active: Vec::new(),
            previous: Vec::new(),
            initialized: false,
        }
    }

    fn num_bits(&self) -> u32 {
        self.spec.num_bits.max(1)
    }

    fn window_width(&self) -> u32 {
        let default = (self.num_bits() / 8).max(1) as u64;
        self.spec
            .param_u64("numActive")
            .unwrap_or(default)
            .clamp(1, self.num_bits() as u64) as u32
    }

    /// Contiguous window placed at `position ∈ [0, 1]`
    fn window(&self, position: f64) -> Vec<u32> {
        let width = self.window_width();
        let span = (self.num_bits() - width) as f64;
        let position = if position.is_finite() { position.clamp(0.0, 1.0) } else { 0.0 };
        let start = (position * span).round() as u32;
        (start..start + width).collect()
    }

    fn anomaly(&self) -> f64 {
        if self.active.is_empty() {
            return 0.0;
        }
        let novel = self
            .active
            .iter()
            .filter(|bit| self.previous.binary_search(bit).is_err())
            .count();
        novel as f64 / self.active.len() as f64
    }
}

#[derive(Debug, Default)]
pub struct SimEngine {
    blocks: Vec<SimBlock>,
    connections: Vec<(EngineHandle, EngineHandle, &'static str)>,
    built: bool,
    steps: u64,
    last_learning: bool,
}

impl SimEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed `execute()` calls
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Learning flag passed to the most recent `execute()`
    pub fn last_learning(&self) -> bool {
        self.last_learning
    }

    fn block(&self, handle: EngineHandle) -> EngineResult<&SimBlock> {
        self.blocks
            .get(handle.0 as usize)
            .ok_or(EngineError::InvalidHandle(handle))
    }

    fn block_mut(&mut self, handle: EngineHandle) -> EngineResult<&mut SimBlock> {
        self.blocks
            .get_mut(handle.0 as usize)
            .ok_or(EngineError::InvalidHandle(handle))
    }

    fn compute_active(&self, block: &SimBlock) -> Vec<u32> {
        let spec = &block.spec;
        match spec.block_type {
            BlockType::ScalarTransformer => match block.value {
                Some(Pending::Scalar(v)) => {
                    let min = spec.param_f64("minVal").unwrap_or(0.0);
                    let max = spec.param_f64("maxVal").unwrap_or(1.0);
                    let range = max - min;
                    let position = if range.abs() > f64::EPSILON { (v - min) / range } else { 0.0 };
                    block.window(position)
                }
                _ => Vec::new(),
            },
            BlockType::PersistenceTransformer => match block.value {
                Some(_) => {
                    let max_steps = spec.param_u64("maxSteps").unwrap_or(DEFAULT_MAX_STEPS).max(1);
                    block.window(block.unchanged_for.min(max_steps) as f64 / max_steps as f64)
                }
                None => Vec::new(),
            },
            BlockType::DiscreteTransformer => match block.value {
                Some(Pending::Discrete(c)) => {
                    let categories = spec
                        .param_u64("numCategories")
                        .unwrap_or(DEFAULT_CATEGORIES)
                        .clamp(1, block.num_bits() as u64) as u32;
                    let width = block.num_bits() / categories;
                    let c = c.min(categories - 1);
                    (c * width..(c + 1) * width).collect()
                }
                _ => Vec::new(),
            },
            _ => {
                let bits = block.num_bits();
                block
                    .inputs
                    .iter()
                    .filter_map(|h| self.blocks.get(h.0 as usize))
                    .flat_map(|input| input.active.iter().map(move |b| b % bits))
                    .collect()
            }
        }
    }
}

impl BlockEngine for SimEngine {
    fn add_block(&mut self, name: &str, spec: &BlockSpec) -> EngineResult<EngineHandle> {
        if !spec.block_type.has_engine_block() {
            return Err(EngineError::Unsupported(format!(
                "{} nodes have no engine block",
                spec.block_type
            )));
        }
        let handle = EngineHandle(self.blocks.len() as u32);
        self.blocks.push(SimBlock::new(name, spec.clone()));
        self.built = false;
        Ok(handle)
    }

    fn connect_to_input(&mut self, source: EngineHandle, target: EngineHandle) -> EngineResult<()> {
        self.block(source)?;
        self.block_mut(target)?.inputs.push(source);
        self.connections.push((source, target, "input"));
        self.built = false;
        Ok(())
    }

    fn connect_to_context(&mut self, source: EngineHandle, target: EngineHandle) -> EngineResult<()> {
        // Context only shapes learning, which this engine does not model
        self.block(source)?;
        self.block(target)?;
        self.connections.push((source, target, "context"));
        self.built = false;
        Ok(())
    }

    fn build(&mut self) -> EngineResult<()> {
        self.built = true;
        Ok(())
    }

    fn init_block(&mut self, handle: EngineHandle) -> EngineResult<()> {
        self.block_mut(handle)?.initialized = true;
        Ok(())
    }

    fn execute(&mut self, learning: bool) -> EngineResult<()> {
        if !self.built {
            return Err(EngineError::NotBuilt);
        }
        if let Some(index) = self
            .blocks
            .iter()
            .position(|b| b.spec.block_type.is_learning() && !b.initialized)
        {
            return Err(EngineError::NotInitialized(EngineHandle(index as u32)));
        }

        // Blocks run in creation order, so inputs created earlier are
        // already up to date for this step
        for index in 0..self.blocks.len() {
            let block = &mut self.blocks[index];
            if block.value.is_some() && block.value == block.last_seen {
                block.unchanged_for += 1;
            } else {
                block.unchanged_for = 0;
            }
            block.last_seen = block.value;

            let mut active = self.compute_active(&self.blocks[index]);
            active.sort_unstable();
            active.dedup();

            let block = &mut self.blocks[index];
            block.previous = std::mem::replace(&mut block.active, active);
        }

        self.steps += 1;
        self.last_learning = learning;
        Ok(())
    }

    fn set_scalar_value(&mut self, handle: EngineHandle, value: f64) -> EngineResult<()> {
        let block = self.block_mut(handle)?;
        match block.spec.block_type {
            BlockType::ScalarTransformer | BlockType::PersistenceTransformer => {
                block.value = Some(Pending::Scalar(value));
                Ok(())
            }
            other => Err(EngineError::Unsupported(format!("{other} does not accept scalar values"))),
        }
    }

    fn set_discrete_value(&mut self, handle: EngineHandle, value: u32) -> EngineResult<()> {
        let block = self.block_mut(handle)?;
        match block.spec.block_type {
            BlockType::DiscreteTransformer => {
                block.value = Some(Pending::Discrete(value));
                Ok(())
            }
            other => Err(EngineError::Unsupported(format!("{other} does not accept discrete values"))),
        }
    }

    fn get_state_json(&self) -> EngineResult<String> {
        let blocks: serde_json::Map<String, serde_json::Value> = self
            .blocks
            .iter()
            .enumerate()
            .map(|(i, b)| {
                (
                    i.to_string(),
                    json!({
                        "name": b.name,
                        "type": b.spec.block_type.name(),
                        "num_bits": b.num_bits(),
                        "active_bits": b.active,
                        "num_active": b.active.len(),
                    }),
                )
            })
            .collect();
        let connections: Vec<_> = self
            .connections
            .iter()
            .map(|(s, t, kind)| json!({"source": s.0, "target": t.0, "kind": kind}))
            .collect();
        serde_json::to_string(&json!({"blocks": blocks, "connections": connections}))
            .map_err(|e| EngineError::Backend(e.to_string()))
    }

    fn get_probabilities(&self, handle: EngineHandle) -> EngineResult<Vec<f64>> {
        let block = self.block(handle)?;
        if block.spec.block_type != BlockType::PatternClassifier {
            return Err(EngineError::Unsupported(format!(
                "{} has no probabilities",
                block.spec.block_type
            )));
        }
        let labels = block.spec.param_u64("numLabels").unwrap_or(DEFAULT_LABELS).max(1);
        Ok(vec![1.0 / labels as f64; labels as usize])
    }

    fn get_anomaly(&self, handle: EngineHandle) -> EngineResult<f64> {
        let block = self.block(handle)?;
        if !block.spec.block_type.is_learning() {
            return Err(EngineError::Unsupported(format!(
                "{} has no anomaly score",
                block.spec.block_type
            )));
        }
        Ok(block.anomaly())
    }
}

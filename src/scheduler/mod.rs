//! Tick-driven execution of a block network.
//!
//! [`ExecutionScheduler`] owns the graph, the data sources and the
//! visualization buffers, and drives an external [`BlockEngine`] one tick at
//! a time. A tick runs synchronously, in order:
//!
//! 1. Recompile the network if the topology changed since the last tick
//! 2. Execute every enabled data source
//! 3. Dispatch source values along `dataSourceLink` edges into the engine
//! 4. Advance the engine by one step
//! 5. Decode the engine state and read one scalar per block
//! 6. Publish bitfields and readouts, then bump the step counter
//!
//! A failing source is isolated and reported. A kind mismatch on an edge is
//! skipped with a warning. Any engine failure stops the scheduler; nothing
//! published earlier in that tick is rolled back.
//!
//! Time comes from an injected [`Clock`], so tests can drive ticks
//! deterministically with a [`ManualClock`].

pub mod bridge;
pub mod clock;

pub use bridge::{run_scheduler_loop, SchedulerBridge, SchedulerCommand, SchedulerMessage};
pub use clock::{Clock, IntervalTimer, ManualClock, SystemClock};

use crate::config::{AppConfig, NetworkFile};
use crate::engine::{
    decode_state, BlockEngine, CompiledNetwork, EngineFactory, EngineHandle, EngineResult, NetworkCompiler,
    ReadoutKind,
};
use crate::error::{BlockFlowError, Result, TickStage};
use crate::graph::{BlockType, EdgeId, EdgeKind, Graph, GraphEdit, GraphOperation, HistoryStack, NodeId};
use crate::sources::{
    ConfigValue, DataSource, DataSourceConfig, DataSourceRegistry, SourceError, SourceId, SourceKind,
    SourcePlugin, SourceTickResult, SourceValue,
};
use crate::types::Sample;
use crate::visualization::VisualizationBuffer;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;

/// Global tick state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickState {
    pub running: bool,
    pub interval_ms: u64,
    pub learning_enabled: bool,
    /// Successful ticks since the network was loaded
    pub step_counter: u64,
}

/// Why a source value was not forwarded along an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    KindMismatch { expected: SourceKind, actual: SourceKind },
    /// The target block takes no source values at all
    NotAConsumer(BlockType),
    /// The target has no live engine block
    NoHandle,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::KindMismatch { expected, actual } => {
                write!(f, "target expects {} values, got {}", expected, actual)
            }
            SkipReason::NotAConsumer(block_type) => write!(f, "{} blocks take no source values", block_type),
            SkipReason::NoHandle => write!(f, "target has no engine block"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSkip {
    pub edge: EdgeId,
    pub source: SourceId,
    pub reason: SkipReason,
}

/// Everything one successful tick did
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Step counter after this tick
    pub step: u64,
    pub source_values: Vec<(SourceId, SourceValue)>,
    pub source_errors: Vec<(SourceId, SourceError)>,
    /// Values forwarded into the engine
    pub dispatched: usize,
    pub skipped: Vec<DispatchSkip>,
    /// Scalar readout per engine-backed node
    pub readouts: Vec<(NodeId, f64)>,
    /// Nodes whose state entry was missing or malformed
    pub degraded_nodes: Vec<NodeId>,
    pub duration: Duration,
}

impl TickReport {
    pub fn readout(&self, node: &NodeId) -> Option<f64> {
        self.readouts.iter().find(|(n, _)| n == node).map(|(_, v)| *v)
    }
}

/// Extracted state for one node, published after extraction succeeds
struct NodeOutput {
    node: NodeId,
    bitfield: Vec<u8>,
    readout: f64,
}

pub struct ExecutionScheduler {
    graph: Graph,
    history: HistoryStack,
    sources: DataSourceRegistry,
    visualization: VisualizationBuffer,

    factory: Option<Box<dyn EngineFactory>>,
    engine: Option<Box<dyn BlockEngine>>,
    network: Option<CompiledNetwork>,
    /// Bumped on every topology change
    graph_generation: u64,
    network_dirty: bool,

    clock: Box<dyn Clock>,
    timer: IntervalTimer,
    state: TickState,

    /// Edges already warned about during this run
    warned_edges: HashSet<EdgeId>,
    last_error: Option<String>,
}

impl ExecutionScheduler {
    pub fn new(config: &AppConfig, clock: Box<dyn Clock>) -> Self {
        let interval_ms = config.scheduler.interval_ms.max(1);
        Self {
            graph: Graph::new(),
            history: HistoryStack::new(config.history.capacity),
            sources: DataSourceRegistry::with_max_history(config.sources.max_history),
            visualization: VisualizationBuffer::new(config.visualization.max_points),
            factory: None,
            engine: None,
            network: None,
            graph_generation: 0,
            network_dirty: true,
            clock,
            timer: IntervalTimer::new(Duration::from_millis(interval_ms), config.scheduler.skip_missed_ticks),
            state: TickState {
                running: false,
                interval_ms,
                learning_enabled: config.scheduler.learning_enabled,
                step_counter: 0,
            },
            warned_edges: HashSet::new(),
            last_error: None,
        }
    }

    // ── Engine lifecycle ──

    /// Attach an engine. The network is compiled into a fresh instance
    /// before the next tick.
    pub fn attach_engine(&mut self, factory: Box<dyn EngineFactory>) {
        self.factory = Some(factory);
        self.drop_engine();
        tracing::info!("Engine attached");
    }

    /// Stop and release the engine
    pub fn detach_engine(&mut self) {
        if self.state.running {
            self.stop();
        }
        self.factory = None;
        self.drop_engine();
        tracing::info!("Engine detached");
    }

    pub fn has_engine(&self) -> bool {
        self.factory.is_some()
    }

    fn drop_engine(&mut self) {
        self.engine = None;
        self.network = None;
        self.network_dirty = true;
        self.graph.clear_handles();
    }

    // ── Run control ──

    /// Compile if needed and arm the tick timer
    pub fn start(&mut self) -> Result<()> {
        if self.factory.is_none() {
            return Err(BlockFlowError::EngineNotAttached);
        }
        if self.state.running {
            return Ok(());
        }

        if let Err(e) = self.recompile_if_needed() {
            self.fail(&e);
            return Err(e);
        }

        self.warned_edges.clear();
        self.last_error = None;
        self.timer.arm(self.clock.elapsed());
        self.state.running = true;
        tracing::info!(
            "Scheduler started (interval {} ms, learning {})",
            self.state.interval_ms,
            self.state.learning_enabled
        );
        Ok(())
    }

    pub fn stop(&mut self) {
        self.timer.disarm();
        if self.state.running {
            self.state.running = false;
            tracing::info!("Scheduler stopped at step {}", self.state.step_counter);
        }
    }

    /// Run a tick if the timer is due. Returns `None` when stopped or not due.
    pub fn poll(&mut self) -> Result<Option<TickReport>> {
        if !self.state.running {
            return Ok(None);
        }
        if !self.timer.poll(self.clock.elapsed()) {
            return Ok(None);
        }
        self.tick().map(Some)
    }

    /// Run exactly one tick now, regardless of the timer
    pub fn step(&mut self) -> Result<TickReport> {
        if self.factory.is_none() {
            return Err(BlockFlowError::EngineNotAttached);
        }
        self.tick()
    }

    /// Time until the next scheduled tick, `None` while stopped
    pub fn time_until_next_tick(&self) -> Option<Duration> {
        if !self.state.running {
            return None;
        }
        self.timer.time_until_due(self.clock.elapsed())
    }

    pub fn set_interval(&mut self, interval_ms: u64) {
        let interval_ms = interval_ms.max(1);
        self.state.interval_ms = interval_ms;
        self.timer
            .set_period(Duration::from_millis(interval_ms), self.clock.elapsed());
        tracing::debug!("Tick interval set to {} ms", interval_ms);
    }

    pub fn set_learning(&mut self, enabled: bool) {
        self.state.learning_enabled = enabled;
        tracing::debug!("Learning {}", if enabled { "enabled" } else { "disabled" });
    }

    // ── Tick ──

    fn tick(&mut self) -> Result<TickReport> {
        match self.run_tick() {
            Ok(report) => Ok(report),
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn fail(&mut self, err: &BlockFlowError) {
        self.state.running = false;
        self.timer.disarm();
        self.last_error = Some(err.to_string());
        tracing::error!("Scheduler stopped at step {}: {}", self.state.step_counter, err);
    }

    fn run_tick(&mut self) -> Result<TickReport> {
        let started = self.clock.elapsed();
        self.recompile_if_needed()?;

        let sources = self.sources.execute_all_sources();
        let (dispatched, skipped) = self.dispatch(&sources)?;

        let learning = self.state.learning_enabled;
        self.engine
            .as_mut()
            .ok_or(BlockFlowError::EngineNotAttached)?
            .execute(learning)
            .map_err(|e| BlockFlowError::engine_step(TickStage::Execute, e))?;

        let (outputs, degraded_nodes) = self.extract()?;
        let readouts = self.publish(&sources, outputs);

        self.state.step_counter += 1;
        let report = TickReport {
            step: self.state.step_counter,
            source_values: sources.values,
            source_errors: sources.errors,
            dispatched,
            skipped,
            readouts,
            degraded_nodes,
            duration: self.clock.elapsed().saturating_sub(started),
        };
        tracing::trace!(
            "Tick {}: {} values, {} dispatched, {} skipped",
            report.step,
            report.source_values.len(),
            report.dispatched,
            report.skipped.len()
        );
        Ok(report)
    }

    /// Create a fresh engine and compile the graph into it
    fn recompile_if_needed(&mut self) -> Result<()> {
        if !self.network_dirty && self.engine.is_some() {
            return Ok(());
        }
        self.engine = None;
        self.network = None;

        let factory = self.factory.as_ref().ok_or(BlockFlowError::EngineNotAttached)?;
        let mut engine = factory
            .create()
            .map_err(|e| BlockFlowError::engine_step(TickStage::Compile, e))?;
        let network = NetworkCompiler::compile(&mut self.graph, engine.as_mut(), self.graph_generation)
            .map_err(|e| BlockFlowError::engine_step(TickStage::Compile, e))?;

        self.engine = Some(engine);
        self.network = Some(network);
        self.network_dirty = false;
        Ok(())
    }

    fn dispatch(&mut self, sources: &SourceTickResult) -> Result<(usize, Vec<DispatchSkip>)> {
        let engine = self.engine.as_mut().ok_or(BlockFlowError::EngineNotAttached)?;
        let network = self.network.as_ref().ok_or(BlockFlowError::EngineNotAttached)?;
        let mut dispatched = 0;
        let mut skipped = Vec::new();

        for (source_id, value) in &sources.values {
            let Some(owner) = self.graph.node_for_source(source_id) else {
                continue;
            };
            for edge in self.graph.outgoing(&owner.id, EdgeKind::DataSourceLink) {
                let Some(target) = self.graph.node(&edge.target) else {
                    continue;
                };
                let reason = match target.block_type.consumer_kind() {
                    Some(expected) if expected != value.kind() => Some(SkipReason::KindMismatch {
                        expected,
                        actual: value.kind(),
                    }),
                    Some(_) => None,
                    None => Some(SkipReason::NotAConsumer(target.block_type)),
                };
                let handle = network.handles.handle_for(&target.id);

                match (reason, handle) {
                    (None, Some(handle)) => {
                        dispatch_value(&mut **engine, handle, *value)
                            .map_err(|e| BlockFlowError::engine_step(TickStage::Dispatch, e))?;
                        dispatched += 1;
                    }
                    (reason, _) => {
                        let reason = reason.unwrap_or(SkipReason::NoHandle);
                        if self.warned_edges.insert(edge.id.clone()) {
                            tracing::warn!("Skipping edge {} from source {}: {}", edge.id, source_id, reason);
                        }
                        skipped.push(DispatchSkip {
                            edge: edge.id.clone(),
                            source: source_id.clone(),
                            reason,
                        });
                    }
                }
            }
        }
        Ok((dispatched, skipped))
    }

    fn extract(&self) -> Result<(Vec<NodeOutput>, Vec<NodeId>)> {
        let engine = self.engine.as_ref().ok_or(BlockFlowError::EngineNotAttached)?;
        let network = self.network.as_ref().ok_or(BlockFlowError::EngineNotAttached)?;
        let extract_err = |e| BlockFlowError::engine_step(TickStage::Extract, e);

        let json = engine.get_state_json().map_err(extract_err)?;
        let decoded = decode_state(&json, &network.handles);

        let mut outputs = Vec::with_capacity(network.handles.len());
        for (handle, info) in network.handles.iter() {
            let Some(state) = decoded.block(handle) else {
                continue;
            };
            let readout = match info.block_type.readout() {
                ReadoutKind::ActiveFraction => state.active_fraction(),
                ReadoutKind::Anomaly => engine.get_anomaly(handle).map_err(extract_err)?,
                ReadoutKind::Probability => engine
                    .get_probabilities(handle)
                    .map_err(extract_err)?
                    .into_iter()
                    .fold(0.0, f64::max),
            };
            outputs.push(NodeOutput {
                node: info.node.clone(),
                bitfield: state.to_bitfield(),
                readout,
            });
        }

        let degraded = decoded
            .degraded
            .iter()
            .filter_map(|h| network.handles.resolve(*h).ok())
            .map(|info| info.node.clone())
            .collect();
        Ok((outputs, degraded))
    }

    fn publish(&mut self, sources: &SourceTickResult, outputs: Vec<NodeOutput>) -> Vec<(NodeId, f64)> {
        let timestamp = self.clock.wall_time();
        let mut readouts = Vec::with_capacity(outputs.len());

        for output in outputs {
            self.visualization.set_bitfield(&output.node, output.bitfield);
            self.visualization
                .push_sample(&output.node, Sample::new(timestamp, output.readout));
            readouts.push((output.node, output.readout));
        }

        for (source_id, value) in &sources.values {
            if let Some(owner) = self.graph.node_for_source(source_id) {
                self.visualization
                    .push_sample(&owner.id, Sample::new(timestamp, value.as_f64()));
            }
        }
        readouts
    }

    // ── Graph editing ──

    /// Apply an edit and record it for undo
    pub fn apply_edit(&mut self, edit: GraphEdit) -> Result<()> {
        let op = self.graph.apply_edit(edit)?;
        self.topology_changed(&op);
        self.history.push(op);
        Ok(())
    }

    /// Revert the latest edit. Returns `false` if there was nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        match self.history.undo(&mut self.graph)? {
            Some(applied) => {
                self.topology_changed(&applied);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Re-apply the latest undone edit. Returns `false` if there was nothing to redo.
    pub fn redo(&mut self) -> Result<bool> {
        match self.history.redo(&mut self.graph)? {
            Some(applied) => {
                self.topology_changed(&applied);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn topology_changed(&mut self, applied: &GraphOperation) {
        self.graph_generation += 1;
        self.network_dirty = true;
        if let GraphOperation::RemoveNode { node, .. } = applied {
            if let Some(network) = self.network.as_mut() {
                network.handles.invalidate_node(&node.id);
            }
            self.visualization.clear_node(&node.id);
        }
        tracing::debug!("{} (generation {})", applied.label(), self.graph_generation);
    }

    // ── Sources ──

    pub fn add_source(&mut self, config: DataSourceConfig) -> Result<SourceId> {
        let id = self.sources.add_source(config)?;
        tracing::info!("Added source {}", id);
        Ok(id)
    }

    pub fn add_source_plugin(&mut self, seed: i64, plugin: Box<dyn SourcePlugin>) -> Result<SourceId> {
        Ok(self.sources.add_plugin(seed, plugin)?)
    }

    /// Remove a source. Graph nodes bound to it stay and simply stop receiving values.
    pub fn remove_source(&mut self, id: &SourceId) -> Result<DataSource> {
        let source = self.sources.remove_source(id)?;
        if let Some(owner) = self.graph.node_for_source(id) {
            self.visualization.clear_node(&owner.id);
        }
        tracing::info!("Removed source {}", id);
        Ok(source)
    }

    /// Apply a parameter patch. Returns whether the source re-initialized.
    pub fn update_source_params(&mut self, id: &SourceId, patch: &[(String, ConfigValue)]) -> Result<bool> {
        self.sources.update_params(id, patch)
    }

    pub fn set_source_enabled(&mut self, id: &SourceId, enabled: bool) -> Result<()> {
        Ok(self.sources.set_enabled(id, enabled)?)
    }

    pub fn reset_sources(&mut self) {
        self.sources.reset_all();
    }

    // ── Persistence ──

    /// Replace the graph and sources with a loaded network.
    ///
    /// Stops the scheduler, clears undo history and visualization state, and
    /// resets the step counter. Nothing changes if the file is invalid.
    pub fn load_network(&mut self, file: NetworkFile) -> Result<()> {
        let graph = file.to_graph()?;
        self.sources.load_configs(file.data_sources)?;

        self.stop();
        self.graph = graph;
        self.history.clear();
        self.visualization.clear();
        self.warned_edges.clear();
        self.last_error = None;
        self.state.step_counter = 0;
        self.graph_generation += 1;
        self.drop_engine();
        tracing::info!(
            "Loaded network with {} nodes and {} sources",
            self.graph.len(),
            self.sources.len()
        );
        Ok(())
    }

    pub fn to_network_file(&self) -> NetworkFile {
        NetworkFile::new(&self.graph, self.sources.to_configs())
    }

    // ── Accessors ──

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    pub fn sources(&self) -> &DataSourceRegistry {
        &self.sources
    }

    pub fn visualization(&self) -> &VisualizationBuffer {
        &self.visualization
    }

    pub fn visualization_mut(&mut self) -> &mut VisualizationBuffer {
        &mut self.visualization
    }

    pub fn state(&self) -> TickState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn step_counter(&self) -> u64 {
        self.state.step_counter
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The current compilation, if any
    pub fn network(&self) -> Option<&CompiledNetwork> {
        self.network.as_ref()
    }

    pub fn missed_ticks(&self) -> u64 {
        self.timer.missed_ticks()
    }
}

fn dispatch_value(
    engine: &mut dyn BlockEngine,
    handle: EngineHandle,
    value: SourceValue,
) -> EngineResult<()> {
    match value {
        SourceValue::Scalar(v) => engine.set_scalar_value(handle, v),
        SourceValue::Discrete(c) => engine.set_discrete_value(handle, c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, EngineResult, MockBlockEngine, SimEngine};
    use crate::graph::{GraphEdge, GraphNode};
    use crate::sources::{DiscreteParams, ScalarParams, ScalarPattern};

    const MS: Duration = Duration::from_millis(1);

    fn sim_factory() -> Box<dyn EngineFactory> {
        Box::new(|| -> EngineResult<Box<dyn BlockEngine>> { Ok(Box::new(SimEngine::new())) })
    }

    /// Mock engine whose `execute` succeeds `ok_steps` times and then fails
    fn failing_factory(ok_steps: u32) -> Box<dyn EngineFactory> {
        Box::new(move || -> EngineResult<Box<dyn BlockEngine>> {
            let mut mock = MockBlockEngine::new();
            let mut next = 0;
            mock.expect_add_block().returning(move |_, _| {
                next += 1;
                Ok(EngineHandle(next - 1))
            });
            mock.expect_connect_to_input().returning(|_, _| Ok(()));
            mock.expect_connect_to_context().returning(|_, _| Ok(()));
            mock.expect_build().returning(|| Ok(()));
            mock.expect_init_block().returning(|_| Ok(()));
            mock.expect_set_scalar_value().returning(|_, _| Ok(()));
            mock.expect_set_discrete_value().returning(|_, _| Ok(()));
            let mut calls = 0;
            mock.expect_execute().returning(move |_| {
                calls += 1;
                if calls <= ok_steps {
                    Ok(())
                } else {
                    Err(EngineError::Backend("device lost".to_string()))
                }
            });
            mock.expect_get_state_json().returning(|| Ok("{}".to_string()));
            mock.expect_get_anomaly().returning(|_| Ok(0.0));
            mock.expect_get_probabilities().returning(|_| Ok(vec![]));
            Ok(Box::new(mock))
        })
    }

    /// One sine source feeding a scalar encoder feeding a pooler
    fn scheduler_with_network(clock: ManualClock) -> (ExecutionScheduler, SourceId) {
        let mut scheduler = ExecutionScheduler::new(&AppConfig::default(), Box::new(clock));
        let params = ScalarParams {
            pattern: ScalarPattern::Sine,
            frequency: 0.25,
            ..Default::default()
        };
        let source = scheduler
            .add_source(DataSourceConfig::scalar("sine", params).with_seed(1))
            .unwrap();

        let edits = [
            GraphEdit::AddNode(GraphNode::source("src", source.clone())),
            GraphEdit::AddNode(
                GraphNode::new("enc", BlockType::ScalarTransformer)
                    .with_param("numBits", 64)
                    .with_param("minVal", -1)
                    .with_param("maxVal", 1),
            ),
            GraphEdit::AddNode(GraphNode::new("pool", BlockType::PatternPooler).with_param("numBits", 64)),
            GraphEdit::AddEdge(GraphEdge::new("src", "enc", EdgeKind::DataSourceLink)),
            GraphEdit::AddEdge(GraphEdge::new("enc", "pool", EdgeKind::Input)),
        ];
        for edit in edits {
            scheduler.apply_edit(edit).unwrap();
        }
        (scheduler, source)
    }

    #[test]
    fn test_start_requires_engine() {
        let (mut scheduler, _) = scheduler_with_network(ManualClock::default());
        assert!(matches!(scheduler.start(), Err(BlockFlowError::EngineNotAttached)));
        assert!(matches!(scheduler.step(), Err(BlockFlowError::EngineNotAttached)));
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_poll_follows_timer() {
        let clock = ManualClock::default();
        let (mut scheduler, _) = scheduler_with_network(clock.clone());
        scheduler.attach_engine(sim_factory());
        scheduler.start().unwrap();

        assert!(scheduler.poll().unwrap().is_none());
        clock.advance(100 * MS);
        let report = scheduler.poll().unwrap().unwrap();
        assert_eq!(report.step, 1);
        assert!(scheduler.poll().unwrap().is_none());

        clock.advance(100 * MS);
        assert_eq!(scheduler.poll().unwrap().unwrap().step, 2);

        scheduler.stop();
        clock.advance(1000 * MS);
        assert!(scheduler.poll().unwrap().is_none());
        assert_eq!(scheduler.step_counter(), 2);
    }

    #[test]
    fn test_tick_dispatches_and_publishes() {
        let clock = ManualClock::default();
        let (mut scheduler, source) = scheduler_with_network(clock);
        scheduler.attach_engine(sim_factory());

        let report = scheduler.step().unwrap();
        assert_eq!(report.dispatched, 1);
        assert!(report.skipped.is_empty());
        // sin(2π · 0.25 · 1) = 1 lands at the top of the encoder range
        let value = report.source_values[0].1.as_f64();
        assert!((value - 1.0).abs() < 1e-9);
        assert_eq!(report.source_values[0].0, source);

        let enc = NodeId::new("enc");
        let pool = NodeId::new("pool");
        let bitfield = scheduler.visualization().bitfield(&enc).unwrap();
        assert_eq!(bitfield.len(), 64);
        assert_eq!(bitfield[63], 1);
        assert_eq!(bitfield[0], 0);
        assert!((report.readout(&enc).unwrap() - 8.0 / 64.0).abs() < 1e-9);
        // Pooler sees a brand new pattern
        assert_eq!(report.readout(&pool), Some(1.0));

        let src_series = scheduler.visualization().series(&NodeId::new("src")).unwrap();
        assert_eq!(src_series.len(), 1);
    }

    #[test]
    fn test_kind_mismatch_skipped_not_fatal() {
        let mut scheduler = ExecutionScheduler::new(&AppConfig::default(), Box::new(ManualClock::default()));
        let source = scheduler
            .add_source(DataSourceConfig::discrete("d", DiscreteParams::default()).with_seed(3))
            .unwrap();
        scheduler
            .apply_edit(GraphEdit::AddNode(GraphNode::source("src", source)))
            .unwrap();
        scheduler
            .apply_edit(GraphEdit::AddNode(GraphNode::new("enc", BlockType::ScalarTransformer)))
            .unwrap();
        scheduler
            .apply_edit(GraphEdit::AddEdge(GraphEdge::new("src", "enc", EdgeKind::DataSourceLink)))
            .unwrap();
        scheduler.attach_engine(sim_factory());

        for _ in 0..3 {
            let report = scheduler.step().unwrap();
            assert_eq!(report.dispatched, 0);
            assert_eq!(report.skipped.len(), 1);
            assert!(matches!(
                report.skipped[0].reason,
                SkipReason::KindMismatch {
                    expected: SourceKind::Scalar,
                    actual: SourceKind::Discrete
                }
            ));
        }
        assert_eq!(scheduler.step_counter(), 3);
    }

    #[test]
    fn test_engine_failure_stops_and_keeps_counter() {
        let clock = ManualClock::default();
        let (mut scheduler, _) = scheduler_with_network(clock.clone());
        scheduler.attach_engine(failing_factory(2));
        scheduler.start().unwrap();

        for expected in 1..=2 {
            clock.advance(100 * MS);
            assert_eq!(scheduler.poll().unwrap().unwrap().step, expected);
        }

        clock.advance(100 * MS);
        let err = scheduler.poll().unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            BlockFlowError::EngineStep {
                stage: TickStage::Execute,
                ..
            }
        ));
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.step_counter(), 2);
        assert!(scheduler.last_error().unwrap().contains("device lost"));

        // No retry until restarted
        clock.advance(100 * MS);
        assert!(scheduler.poll().unwrap().is_none());
    }

    #[test]
    fn test_malformed_state_degrades_to_zero_bitfield() {
        let (mut scheduler, _) = scheduler_with_network(ManualClock::default());
        scheduler.attach_engine(failing_factory(10));

        let report = scheduler.step().unwrap();
        assert_eq!(report.degraded_nodes.len(), 2);
        let bitfield = scheduler.visualization().bitfield(&NodeId::new("enc")).unwrap();
        assert_eq!(bitfield.len(), 64);
        assert!(bitfield.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_compile_failure_is_fatal() {
        let (mut scheduler, _) = scheduler_with_network(ManualClock::default());
        scheduler.attach_engine(Box::new(|| -> EngineResult<Box<dyn BlockEngine>> {
            Err(EngineError::Backend("no device".to_string()))
        }));

        let err = scheduler.start().unwrap_err();
        assert!(matches!(
            err,
            BlockFlowError::EngineStep {
                stage: TickStage::Compile,
                ..
            }
        ));
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_edit_recompiles_with_fresh_handles() {
        let (mut scheduler, _) = scheduler_with_network(ManualClock::default());
        scheduler.attach_engine(sim_factory());
        scheduler.step().unwrap();
        let generation = scheduler.network().unwrap().generation;
        assert_eq!(scheduler.network().unwrap().handles.len(), 2);

        scheduler
            .apply_edit(GraphEdit::RemoveNode(NodeId::new("pool")))
            .unwrap();
        assert!(scheduler
            .network()
            .unwrap()
            .handles
            .handle_for(&NodeId::new("pool"))
            .is_none());
        assert!(scheduler.visualization().series(&NodeId::new("pool")).is_none());

        scheduler.step().unwrap();
        let network = scheduler.network().unwrap();
        assert!(network.generation > generation);
        assert_eq!(network.handles.len(), 1);

        assert!(scheduler.undo().unwrap());
        let report = scheduler.step().unwrap();
        assert!(report.readout(&NodeId::new("pool")).is_some());
        assert!(scheduler.redo().unwrap());
        assert!(!scheduler.redo().unwrap());
    }

    #[test]
    fn test_learning_flag_reaches_engine() {
        let (mut scheduler, _) = scheduler_with_network(ManualClock::default());
        let mut mock = MockBlockEngine::new();
        let mut next = 0;
        mock.expect_add_block().returning(move |_, _| {
            next += 1;
            Ok(EngineHandle(next - 1))
        });
        mock.expect_connect_to_input().returning(|_, _| Ok(()));
        mock.expect_build().times(1).returning(|| Ok(()));
        mock.expect_init_block().times(1).returning(|_| Ok(()));
        mock.expect_set_scalar_value().returning(|_, _| Ok(()));
        mock.expect_execute()
            .withf(|learning| !*learning)
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_get_state_json().returning(|| Ok("{}".to_string()));
        mock.expect_get_anomaly().returning(|_| Ok(0.25));

        let engine = std::sync::Mutex::new(Some(mock));
        scheduler.attach_engine(Box::new(move || -> EngineResult<Box<dyn BlockEngine>> {
            engine
                .lock()
                .map_err(|e| EngineError::Backend(e.to_string()))?
                .take()
                .map(|m| Box::new(m) as Box<dyn BlockEngine>)
                .ok_or_else(|| EngineError::Backend("engine already taken".to_string()))
        }));
        scheduler.set_learning(false);

        let report = scheduler.step().unwrap();
        assert_eq!(report.readout(&NodeId::new("pool")), Some(0.25));
    }

    #[test]
    fn test_set_interval_reschedules() {
        let clock = ManualClock::default();
        let (mut scheduler, _) = scheduler_with_network(clock.clone());
        scheduler.attach_engine(sim_factory());
        scheduler.start().unwrap();
        scheduler.set_interval(10);
        assert_eq!(scheduler.state().interval_ms, 10);
        assert_eq!(scheduler.time_until_next_tick(), Some(10 * MS));

        clock.advance(10 * MS);
        assert!(scheduler.poll().unwrap().is_some());
    }

    #[test]
    fn test_load_network_resets_state() {
        let (mut scheduler, _) = scheduler_with_network(ManualClock::default());
        scheduler.attach_engine(sim_factory());
        scheduler.step().unwrap();
        let file = scheduler.to_network_file();

        scheduler.load_network(file.clone()).unwrap();
        assert_eq!(scheduler.step_counter(), 0);
        assert!(!scheduler.history().can_undo());
        assert!(scheduler.network().is_none());
        assert_eq!(scheduler.graph().len(), 3);

        // Seeds survive, so the first tick reproduces the same value
        let report = scheduler.step().unwrap();
        assert!((report.source_values[0].1.as_f64() - 1.0).abs() < 1e-9);
    }
}

//! End-to-end ticks against the reference engine

mod common;

use blockflow_rs::config::AppConfig;
use blockflow_rs::error::BlockFlowError;
use blockflow_rs::graph::{BlockType, EdgeKind, GraphEdge, GraphEdit, GraphNode, NodeId};
use blockflow_rs::scheduler::{ExecutionScheduler, ManualClock, SkipReason};
use blockflow_rs::sources::{DataSourceConfig, ScalarParams, ScalarPattern, SourceId, SourceValue};
use common::builders::{demo_network, NetworkBuilder};
use common::mock_helpers::{BrokenPlugin, FlakyPlugin};
use std::time::Duration;

fn loaded(clock: &ManualClock) -> ExecutionScheduler {
    let mut scheduler = common::sim_scheduler(clock);
    scheduler.load_network(demo_network()).unwrap();
    scheduler
}

#[test]
fn test_demo_network_runs() {
    let clock = ManualClock::default();
    let mut scheduler = loaded(&clock);
    scheduler.start().unwrap();

    for expected in 1..=10 {
        clock.advance(Duration::from_millis(100));
        let report = scheduler.poll().unwrap().expect("tick due");
        assert_eq!(report.step, expected);
        assert_eq!(report.source_values.len(), 2);
        assert_eq!(report.dispatched, 2);
        assert!(report.skipped.is_empty());
        assert!(report.degraded_nodes.is_empty());
        assert_eq!(report.readouts.len(), 5);
    }
    assert_eq!(scheduler.step_counter(), 10);

    let network = scheduler.network().unwrap();
    assert_eq!(network.stats.blocks, 5);
    assert_eq!(network.stats.connections, 5);
    assert_eq!(network.stats.learning_blocks, 3);

    let viz = scheduler.visualization();
    assert_eq!(viz.bitfield(&NodeId::new("pool")).unwrap().len(), 256);
    assert_eq!(viz.series(&NodeId::new("enc")).unwrap().len(), 10);
    // Source nodes chart their raw values
    assert_eq!(viz.series(&NodeId::new("sine")).unwrap().len(), 10);
    // Classifier readout is the top probability
    common::assert_float_eq(viz.latest(&NodeId::new("cls")).unwrap().value, 0.25, 1e-12);
}

#[test]
fn test_discrete_encoder_tracks_category() {
    let clock = ManualClock::default();
    let mut scheduler = loaded(&clock);

    let report = scheduler.step().unwrap();
    let category = match report.source_values.iter().find(|(id, _)| id.as_str() == "weather") {
        Some((_, SourceValue::Discrete(c))) => *c as usize,
        other => panic!("unexpected weather value {:?}", other),
    };

    let bits = scheduler.visualization().bitfield(&NodeId::new("cat")).unwrap();
    let active: Vec<usize> = bits
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == 1)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(active, (category * 16..(category + 1) * 16).collect::<Vec<_>>());
}

#[test]
fn test_failing_source_does_not_block_others() {
    let clock = ManualClock::default();
    let mut scheduler = loaded(&clock);
    let flaky = scheduler
        .add_source_plugin(1, Box::new(FlakyPlugin::new(vec![2, 3])))
        .unwrap();
    let broken = scheduler.add_source_plugin(1, Box::new(BrokenPlugin)).unwrap();

    for tick in 1..=4u64 {
        let report = scheduler.step().unwrap();
        assert!(report.source_values.iter().any(|(id, _)| id.as_str() == "sine"));
        assert!(report.source_values.iter().any(|(id, _)| id.as_str() == "weather"));
        assert!(report.source_errors.iter().any(|(id, _)| *id == broken));

        let flaky_failed = report.source_errors.iter().any(|(id, _)| *id == flaky);
        assert_eq!(flaky_failed, tick == 2 || tick == 3, "tick {}", tick);
    }

    // A failed execute does not advance the source
    let source = scheduler.sources().get(&flaky).unwrap();
    assert_eq!(source.step(), 2);
    assert_eq!(source.current_value(), Some(SourceValue::Scalar(2.0)));
    assert!(scheduler.last_error().is_none());
}

#[test]
fn test_mismatched_link_is_skipped() {
    let file = NetworkBuilder::new()
        .scalar_source("s", 1, ScalarParams::default())
        .block("cat", BlockType::DiscreteTransformer, 32)
        .block("pool", BlockType::PatternPooler, 32)
        .link("s", "cat")
        .link("s", "pool")
        .build();
    let clock = ManualClock::default();
    let mut scheduler = common::sim_scheduler(&clock);
    scheduler.load_network(file).unwrap();

    let report = scheduler.step().unwrap();
    assert_eq!(report.dispatched, 0);
    assert_eq!(report.skipped.len(), 2);
    assert!(report
        .skipped
        .iter()
        .any(|s| matches!(s.reason, SkipReason::KindMismatch { .. })));
    assert!(report
        .skipped
        .iter()
        .any(|s| s.reason == SkipReason::NotAConsumer(BlockType::PatternPooler)));
    assert_eq!(scheduler.step_counter(), 1);
}

#[test]
fn test_step_counter_monotonic_across_edits() {
    let clock = ManualClock::default();
    let mut scheduler = loaded(&clock);
    let mut last = 0;

    let edits = vec![
        GraphEdit::AddNode(GraphNode::new("extra", BlockType::PatternPooler).with_param("numBits", 32)),
        GraphEdit::AddEdge(GraphEdge::new("enc", "extra", EdgeKind::Input)),
        GraphEdit::RemoveNode(NodeId::new("seq")),
    ];
    for edit in edits {
        scheduler.apply_edit(edit).unwrap();
        let report = scheduler.step().unwrap();
        assert_eq!(report.step, last + 1);
        last = report.step;
    }

    assert!(scheduler.network().unwrap().handles.handle_for(&NodeId::new("seq")).is_none());
    // Classifier lost its input when `seq` went away
    let report = scheduler.step().unwrap();
    assert_eq!(report.readout(&NodeId::new("cls")), Some(0.25));

    while scheduler.undo().unwrap() {}
    assert!(scheduler.graph().node(&NodeId::new("extra")).is_none());
    assert!(scheduler.graph().node(&NodeId::new("seq")).is_some());
    let report = scheduler.step().unwrap();
    assert_eq!(report.step, last + 2);
    assert_eq!(report.readouts.len(), 5);
}

#[test]
fn test_removed_source_leaves_node() {
    let clock = ManualClock::default();
    let mut scheduler = loaded(&clock);
    scheduler.step().unwrap();

    scheduler.remove_source(&SourceId::new("sine")).unwrap();
    assert!(scheduler.graph().node(&NodeId::new("sine")).is_some());
    assert!(scheduler.visualization().series(&NodeId::new("sine")).is_none());

    let report = scheduler.step().unwrap();
    assert_eq!(report.source_values.len(), 1);
    assert_eq!(report.dispatched, 1);
}

#[test]
fn test_disabled_source_is_not_executed() {
    let clock = ManualClock::default();
    let mut scheduler = loaded(&clock);
    scheduler.set_source_enabled(&SourceId::new("sine"), false).unwrap();

    let report = scheduler.step().unwrap();
    assert_eq!(report.source_values.len(), 1);
    assert_eq!(scheduler.sources().get(&SourceId::new("sine")).unwrap().step(), 0);
}

#[test]
fn test_late_polls_skip_missed_ticks() {
    let clock = ManualClock::default();
    let mut scheduler = loaded(&clock);
    scheduler.start().unwrap();

    clock.advance(Duration::from_millis(450));
    assert!(scheduler.poll().unwrap().is_some());
    assert!(scheduler.poll().unwrap().is_none());
    assert_eq!(scheduler.missed_ticks(), 3);
    assert_eq!(scheduler.step_counter(), 1);
}

#[test]
fn test_detach_stops_and_blocks_ticks() {
    let clock = ManualClock::default();
    let mut scheduler = loaded(&clock);
    scheduler.start().unwrap();
    scheduler.detach_engine();

    assert!(!scheduler.is_running());
    assert!(matches!(scheduler.step(), Err(BlockFlowError::EngineNotAttached)));
    assert!(scheduler.graph().nodes().iter().all(|n| n.data.engine_handle.is_none()));
}

#[test]
fn test_buffers_respect_config() {
    let mut config = AppConfig::default();
    config.visualization.max_points = 4;
    config.history.capacity = 2;
    let mut scheduler = ExecutionScheduler::new(&config, Box::new(ManualClock::default()));
    scheduler.attach_engine(common::sim_factory());

    let source = scheduler
        .add_source(DataSourceConfig::scalar(
            "lin",
            ScalarParams {
                pattern: ScalarPattern::Linear,
                ..Default::default()
            },
        ))
        .unwrap();
    for i in 0..3 {
        scheduler
            .apply_edit(GraphEdit::AddNode(GraphNode::source(format!("n{i}"), source.clone())))
            .unwrap();
    }
    assert_eq!(scheduler.history().len(), 2);

    for _ in 0..10 {
        scheduler.step().unwrap();
    }
    let owner = scheduler.graph().node_for_source(&source).unwrap().id.clone();
    assert_eq!(scheduler.visualization().series(&owner).unwrap().len(), 4);
}

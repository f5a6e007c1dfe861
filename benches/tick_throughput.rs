//! Benchmarks for scheduler ticks and source execution
//!
//! Run with: cargo bench

use blockflow_rs::config::{AppConfig, NetworkFile};
use blockflow_rs::engine::{BlockEngine, EngineResult, SimEngine};
use blockflow_rs::graph::{BlockType, EdgeKind, Graph, GraphEdge, GraphNode};
use blockflow_rs::scheduler::{ExecutionScheduler, ManualClock};
use blockflow_rs::sources::{
    DataSourceConfig, DataSourceRegistry, DiscreteParams, DiscretePattern, ScalarParams, ScalarPattern, SourceId,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// `width` sine sources, each feeding its own encoder, all pooled into one learner
fn fan_in_network(width: usize) -> NetworkFile {
    let mut graph = Graph::new();
    let mut configs = Vec::with_capacity(width);

    graph
        .add_node(GraphNode::new("pool", BlockType::PatternPooler).with_param("numBits", 512))
        .unwrap();
    for i in 0..width {
        let id = format!("s{i}");
        let enc = format!("enc{i}");
        let mut config = DataSourceConfig::scalar(
            id.clone(),
            ScalarParams {
                pattern: ScalarPattern::Sine,
                frequency: 0.01 * (i + 1) as f64,
                noise: 0.1,
                ..Default::default()
            },
        )
        .with_seed(i as i64);
        config.id = Some(SourceId::new(id.clone()));
        configs.push(config);

        graph.add_node(GraphNode::source(id.clone(), SourceId::new(id.clone()))).unwrap();
        graph
            .add_node(
                GraphNode::new(enc.clone(), BlockType::ScalarTransformer)
                    .with_param("numBits", 128)
                    .with_param("minVal", -2)
                    .with_param("maxVal", 2),
            )
            .unwrap();
        graph
            .add_edge(GraphEdge::new(id, enc.clone(), EdgeKind::DataSourceLink))
            .unwrap();
        graph.add_edge(GraphEdge::new(enc, "pool", EdgeKind::Input)).unwrap();
    }

    NetworkFile::new(&graph, configs)
}

fn bench_scheduler_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_step");

    for width in [1, 8, 32].iter() {
        let clock = ManualClock::default();
        let mut scheduler = ExecutionScheduler::new(&AppConfig::default(), Box::new(clock));
        scheduler.load_network(fan_in_network(*width)).unwrap();
        scheduler.attach_engine(Box::new(|| -> EngineResult<Box<dyn BlockEngine>> {
            Ok(Box::new(SimEngine::new()))
        }));
        // First step pays for compilation
        scheduler.step().unwrap();

        group.throughput(Throughput::Elements(*width as u64));
        group.bench_with_input(BenchmarkId::new("fan_in", width), width, |b, _| {
            b.iter(|| black_box(scheduler.step().unwrap()))
        });
    }

    group.finish();
}

fn bench_execute_all_sources(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute_all_sources");

    for count in [10, 100, 1000].iter() {
        let mut registry = DataSourceRegistry::new();
        for i in 0..*count {
            let config = if i % 2 == 0 {
                let pattern = ScalarPattern::all()[i % ScalarPattern::all().len()];
                DataSourceConfig::scalar(
                    format!("scalar{i}"),
                    ScalarParams {
                        pattern,
                        noise: 0.2,
                        ..Default::default()
                    },
                )
            } else {
                DataSourceConfig::discrete(
                    format!("discrete{i}"),
                    DiscreteParams {
                        num_categories: 8,
                        pattern: DiscretePattern::Random,
                        ..Default::default()
                    },
                )
            };
            registry.add_source(config.with_seed(i as i64)).unwrap();
        }

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("mixed", count), count, |b, _| {
            b.iter(|| black_box(registry.execute_all_sources()))
        });
    }

    group.finish();
}

fn bench_recompile(c: &mut Criterion) {
    let mut group = c.benchmark_group("recompile");

    for width in [8, 32].iter() {
        let file = fan_in_network(*width);
        group.bench_with_input(BenchmarkId::new("load_and_step", width), &file, |b, file| {
            b.iter(|| {
                let mut scheduler =
                    ExecutionScheduler::new(&AppConfig::default(), Box::new(ManualClock::default()));
                scheduler.load_network(file.clone()).unwrap();
                scheduler.attach_engine(Box::new(|| -> EngineResult<Box<dyn BlockEngine>> {
                    Ok(Box::new(SimEngine::new()))
                }));
                black_box(scheduler.step().unwrap())
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_scheduler_step,
    bench_execute_all_sources,
    bench_recompile
);
criterion_main!(benches);

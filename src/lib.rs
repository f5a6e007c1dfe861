//! # BlockFlow-RS: Tick-based block network scheduler
//!
//! Runs a graph of computation blocks, fed by deterministic synthetic data
//! sources, tick by tick against an external block engine, and publishes the
//! engine's state back into per-node visualization buffers.
//!
//! ## Architecture
//!
//! - **Sources**: seeded pseudo-random streams and scalar/discrete pattern generators
//! - **Graph**: nodes, typed edges and a bounded undo/redo history
//! - **Engine**: the handle-based engine contract, network compiler and a reference `SimEngine`
//! - **Scheduler**: the tick loop, an injectable clock and a channel bridge to the UI thread
//! - **Visualization**: bounded time series and dense bitfields per node
//!
//! ## Configuration
//!
//! Runtime settings are read from `blockflow.toml` in the platform-appropriate
//! data directory under `dev.blockflow.blockflow-rs`:
//!
//! - **Linux**: `~/.local/share/dev.blockflow.blockflow-rs/`
//! - **macOS**: `~/Library/Application Support/dev.blockflow.blockflow-rs/`
//! - **Windows**: `%APPDATA%\dev.blockflow.blockflow-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use blockflow_rs::{
//!     config::{AppConfig, NetworkFile},
//!     engine::{BlockEngine, EngineResult, SimEngine},
//!     scheduler::{ExecutionScheduler, SystemClock},
//! };
//!
//! let config = AppConfig::load_or_default();
//! let mut scheduler = ExecutionScheduler::new(&config, Box::new(SystemClock::new()));
//! scheduler.load_network(NetworkFile::load("network.json")?)?;
//! scheduler.attach_engine(Box::new(|| -> EngineResult<Box<dyn BlockEngine>> {
//!     Ok(Box::new(SimEngine::new()))
//! }));
//!
//! for _ in 0..10 {
//!     let report = scheduler.step()?;
//!     println!("tick {}: {:?}", report.step, report.readouts);
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod scheduler;
pub mod sources;
pub mod types;
pub mod visualization;

// Re-export commonly used types
pub use config::{AppConfig, NetworkFile};
pub use engine::{BlockEngine, EngineFactory, EngineHandle, SimEngine};
pub use error::{BlockFlowError, Result};
pub use graph::{Graph, GraphEdge, GraphEdit, GraphNode, HistoryStack};
pub use scheduler::{ExecutionScheduler, SchedulerBridge, TickReport};
pub use sources::{DataSource, DataSourceConfig, DataSourceRegistry, PseudoRandomStream, SourceId, SourceValue};
pub use visualization::VisualizationBuffer;

//! BlockFlow-RS - Headless runner
//!
//! Loads a network file and runs it against the in-process `SimEngine` for a
//! fixed number of ticks.
//!
//! ```text
//! blockflow-rs <network.json> [--ticks N] [--config PATH] [--save PATH]
//! ```

use anyhow::{bail, Context};
use blockflow_rs::{
    config::{AppConfig, NetworkFile},
    engine::{BlockEngine, EngineResult, SimEngine},
    scheduler::{ExecutionScheduler, SchedulerBridge, SchedulerCommand, SchedulerMessage, SystemClock},
};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "blockflow-rs")]
#[command(about = "Run a block network against the in-process simulation engine")]
struct Args {
    /// Network file to load
    network: PathBuf,

    /// Number of ticks to run
    #[arg(long, default_value_t = 20)]
    ticks: u64,

    /// Config file (defaults to the app data directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save the network here after the run
    #[arg(long)]
    save: Option<PathBuf>,
}

/// Install the subscriber. The returned guard must live until exit so the
/// file writer flushes.
fn init_logging(config: &AppConfig) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let default_filter = config
        .logging
        .filter
        .clone()
        .unwrap_or_else(|| "info,blockflow_rs=debug".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (file_layer, guard) = match &config.logging.file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let name = path.file_name().context("logging.file has no file name")?;
            let appender = tracing_appender::rolling::never(dir.unwrap_or_else(|| std::path::Path::new(".")), name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(guard)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::load(path).with_context(|| format!("loading config {:?}", path))?,
        None => AppConfig::load_or_default(),
    };
    let _log_guard = init_logging(&config)?;

    tracing::info!("Starting BlockFlow-RS");

    let network = NetworkFile::load(&args.network).with_context(|| format!("loading network {:?}", args.network))?;

    let scheduler = ExecutionScheduler::new(&config, Box::new(SystemClock::new()));
    let (bridge, handle) = SchedulerBridge::spawn(scheduler).context("spawning scheduler thread")?;

    bridge.send_command(SchedulerCommand::LoadNetwork(network));
    bridge.send_command(SchedulerCommand::AttachEngine(Box::new(
        || -> EngineResult<Box<dyn BlockEngine>> { Ok(Box::new(SimEngine::new())) },
    )));
    bridge.start();

    // Generous upper bound so a stalled engine cannot hang the runner
    let deadline = Duration::from_millis(config.scheduler.interval_ms.max(1) * 4 + 1_000);
    let mut completed = 0;
    let mut failure = None;

    while completed < args.ticks {
        let Some(msg) = bridge.recv_timeout(deadline) else {
            failure = Some("timed out waiting for a tick".to_string());
            break;
        };
        match msg {
            SchedulerMessage::TickCompleted(report) => {
                completed += 1;
                for (node, value) in &report.readouts {
                    tracing::info!("tick {:>4} {:<24} {:.4}", report.step, node.as_str(), value);
                }
                for (source, err) in &report.source_errors {
                    tracing::warn!("tick {:>4} source {} failed: {}", report.step, source, err);
                }
            }
            SchedulerMessage::Stopped { error } => {
                failure = Some(error);
                break;
            }
            SchedulerMessage::Error(e) => tracing::warn!("{}", e),
            _ => {}
        }
    }

    bridge.stop();
    if let Some(path) = &args.save {
        bridge.send_command(SchedulerCommand::RequestNetwork);
        loop {
            match bridge.recv_timeout(deadline) {
                Some(SchedulerMessage::Network(file)) => {
                    file.save(path).with_context(|| format!("saving network {:?}", path))?;
                    break;
                }
                Some(_) => continue,
                None => bail!("scheduler did not return the network"),
            }
        }
    }

    tracing::info!("Shutting down...");
    bridge.shutdown();
    if handle.join().is_err() {
        bail!("scheduler thread panicked");
    }

    if let Some(error) = failure {
        bail!("run stopped after {} ticks: {}", completed, error);
    }
    tracing::info!("Completed {} ticks", completed);
    Ok(())
}

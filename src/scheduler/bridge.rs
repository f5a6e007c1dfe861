//! Thread boundary between the scheduler and the UI.
//!
//! The scheduler thread owns the [`ExecutionScheduler`] and therefore every
//! piece of mutable state. The UI only sends [`SchedulerCommand`]s and reads
//! [`SchedulerMessage`]s, so ticks never race with edits.

use crate::config::NetworkFile;
use crate::engine::EngineFactory;
use crate::graph::GraphEdit;
use crate::scheduler::{ExecutionScheduler, TickReport, TickState};
use crate::sources::{ConfigValue, DataSourceConfig, SourceId};
use crate::visualization::VisualizationSnapshot;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Commands sent from the UI thread to the scheduler.
pub enum SchedulerCommand {
    /// Attach an engine factory
    AttachEngine(Box<dyn EngineFactory>),
    DetachEngine,
    Start,
    Stop,
    /// Run one tick now
    Step,
    SetInterval(u64),
    SetLearning(bool),
    AddSource(DataSourceConfig),
    RemoveSource(SourceId),
    UpdateSourceParams {
        id: SourceId,
        patch: Vec<(String, ConfigValue)>,
    },
    ResetSources,
    ApplyEdit(GraphEdit),
    Undo,
    Redo,
    LoadNetwork(NetworkFile),
    /// Reply with `SchedulerMessage::Network`
    RequestNetwork,
    /// Reply with `SchedulerMessage::Snapshot`
    RequestSnapshot,
    /// Shut down the scheduler thread
    Shutdown,
}

impl std::fmt::Debug for SchedulerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerCommand::AttachEngine(_) => write!(f, "AttachEngine(..)"),
            SchedulerCommand::DetachEngine => write!(f, "DetachEngine"),
            SchedulerCommand::Start => write!(f, "Start"),
            SchedulerCommand::Stop => write!(f, "Stop"),
            SchedulerCommand::Step => write!(f, "Step"),
            SchedulerCommand::SetInterval(ms) => write!(f, "SetInterval({})", ms),
            SchedulerCommand::SetLearning(on) => write!(f, "SetLearning({})", on),
            SchedulerCommand::AddSource(config) => write!(f, "AddSource({:?})", config.name),
            SchedulerCommand::RemoveSource(id) => write!(f, "RemoveSource({})", id),
            SchedulerCommand::UpdateSourceParams { id, patch } => {
                write!(f, "UpdateSourceParams({}, {} keys)", id, patch.len())
            }
            SchedulerCommand::ResetSources => write!(f, "ResetSources"),
            SchedulerCommand::ApplyEdit(edit) => write!(f, "ApplyEdit({:?})", edit),
            SchedulerCommand::Undo => write!(f, "Undo"),
            SchedulerCommand::Redo => write!(f, "Redo"),
            SchedulerCommand::LoadNetwork(file) => write!(f, "LoadNetwork({} nodes)", file.nodes.len()),
            SchedulerCommand::RequestNetwork => write!(f, "RequestNetwork"),
            SchedulerCommand::RequestSnapshot => write!(f, "RequestSnapshot"),
            SchedulerCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Messages sent from the scheduler thread to the UI.
#[derive(Debug, Clone)]
pub enum SchedulerMessage {
    /// A tick completed
    TickCompleted(TickReport),

    /// Run state changed
    State(TickState),

    /// The scheduler stopped on its own after a fatal error
    Stopped { error: String },

    /// Undo/redo availability after an edit
    HistoryChanged { can_undo: bool, can_redo: bool },

    /// A source was added
    SourceAdded(SourceId),

    /// Response to `RequestSnapshot`
    Snapshot(VisualizationSnapshot),

    /// Response to `RequestNetwork`
    Network(NetworkFile),

    /// A command failed; the scheduler keeps its previous state
    Error(String),

    /// Scheduler thread is shutting down
    Shutdown,
}

/// Channel capacity for commands (UI → scheduler).
const CMD_CHANNEL_CAPACITY: usize = 256;
/// Channel capacity for messages (scheduler → UI).
const MSG_CHANNEL_CAPACITY: usize = 4_096;
/// Longest the loop blocks on the command channel while idle
const IDLE_WAIT: Duration = Duration::from_millis(50);

/// UI-side handle for communicating with the scheduler thread.
pub struct SchedulerBridge {
    pub cmd_tx: Sender<SchedulerCommand>,
    pub msg_rx: Receiver<SchedulerMessage>,
}

impl SchedulerBridge {
    /// Create a new bridge pair: `(bridge_for_ui, cmd_rx, msg_tx)`.
    ///
    /// The scheduler thread owns `cmd_rx` and `msg_tx`.
    pub fn new() -> (Self, Receiver<SchedulerCommand>, Sender<SchedulerMessage>) {
        let (cmd_tx, cmd_rx) = bounded(CMD_CHANNEL_CAPACITY);
        let (msg_tx, msg_rx) = bounded(MSG_CHANNEL_CAPACITY);
        (Self { cmd_tx, msg_rx }, cmd_rx, msg_tx)
    }

    /// Move `scheduler` onto its own thread and return the UI-side handle
    pub fn spawn(scheduler: ExecutionScheduler) -> std::io::Result<(Self, std::thread::JoinHandle<()>)> {
        let (bridge, cmd_rx, msg_tx) = Self::new();
        let handle = std::thread::Builder::new()
            .name("scheduler".to_string())
            .spawn(move || run_scheduler_loop(scheduler, cmd_rx, msg_tx))?;
        Ok((bridge, handle))
    }

    /// Drain all pending messages.
    pub fn drain(&self) -> Vec<SchedulerMessage> {
        let mut msgs = Vec::new();
        while let Ok(msg) = self.msg_rx.try_recv() {
            msgs.push(msg);
        }
        msgs
    }

    /// Try to receive a single message without blocking.
    pub fn try_recv(&self) -> Option<SchedulerMessage> {
        self.msg_rx.try_recv().ok()
    }

    /// Block until a message arrives or `timeout` elapses
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SchedulerMessage> {
        self.msg_rx.recv_timeout(timeout).ok()
    }

    pub fn send_command(&self, cmd: SchedulerCommand) -> bool {
        self.cmd_tx.send(cmd).is_ok()
    }

    pub fn start(&self) {
        let _ = self.cmd_tx.send(SchedulerCommand::Start);
    }

    pub fn stop(&self) {
        let _ = self.cmd_tx.send(SchedulerCommand::Stop);
    }

    pub fn apply_edit(&self, edit: GraphEdit) {
        let _ = self.cmd_tx.send(SchedulerCommand::ApplyEdit(edit));
    }

    pub fn undo(&self) {
        let _ = self.cmd_tx.send(SchedulerCommand::Undo);
    }

    pub fn redo(&self) {
        let _ = self.cmd_tx.send(SchedulerCommand::Redo);
    }

    pub fn request_snapshot(&self) {
        let _ = self.cmd_tx.send(SchedulerCommand::RequestSnapshot);
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(SchedulerCommand::Shutdown);
    }
}

/// Run the scheduler until `Shutdown` arrives or the UI side hangs up.
///
/// Commands are handled between ticks. While running, the loop waits on the
/// command channel only until the next tick is due.
pub fn run_scheduler_loop(
    mut scheduler: ExecutionScheduler,
    cmd_rx: Receiver<SchedulerCommand>,
    msg_tx: Sender<SchedulerMessage>,
) {
    tracing::info!("Scheduler thread started");

    loop {
        let wait = scheduler.time_until_next_tick().unwrap_or(IDLE_WAIT);
        match cmd_rx.recv_timeout(wait) {
            Ok(SchedulerCommand::Shutdown) => break,
            Ok(cmd) => {
                handle_command(&mut scheduler, cmd, &msg_tx);
                // Drain the backlog before ticking again
                let mut shutdown = false;
                while let Ok(cmd) = cmd_rx.try_recv() {
                    if matches!(cmd, SchedulerCommand::Shutdown) {
                        shutdown = true;
                        break;
                    }
                    handle_command(&mut scheduler, cmd, &msg_tx);
                }
                if shutdown {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!("Command channel closed");
                break;
            }
        }

        match scheduler.poll() {
            Ok(Some(report)) => {
                let _ = msg_tx.try_send(SchedulerMessage::TickCompleted(report));
            }
            Ok(None) => {}
            Err(e) => {
                let _ = msg_tx.send(SchedulerMessage::Stopped { error: e.to_string() });
                let _ = msg_tx.send(SchedulerMessage::State(scheduler.state()));
            }
        }
    }

    scheduler.stop();
    let _ = msg_tx.send(SchedulerMessage::Shutdown);
    tracing::info!("Scheduler thread exiting");
}

fn handle_command(scheduler: &mut ExecutionScheduler, cmd: SchedulerCommand, msg_tx: &Sender<SchedulerMessage>) {
    tracing::trace!("Scheduler command: {:?}", cmd);
    let result = match cmd {
        SchedulerCommand::AttachEngine(factory) => {
            scheduler.attach_engine(factory);
            Ok(())
        }
        SchedulerCommand::DetachEngine => {
            scheduler.detach_engine();
            send_state(scheduler, msg_tx);
            Ok(())
        }
        SchedulerCommand::Start => scheduler.start().map(|_| send_state(scheduler, msg_tx)),
        SchedulerCommand::Stop => {
            scheduler.stop();
            send_state(scheduler, msg_tx);
            Ok(())
        }
        SchedulerCommand::Step => scheduler.step().map(|report| {
            let _ = msg_tx.send(SchedulerMessage::TickCompleted(report));
        }),
        SchedulerCommand::SetInterval(ms) => {
            scheduler.set_interval(ms);
            send_state(scheduler, msg_tx);
            Ok(())
        }
        SchedulerCommand::SetLearning(enabled) => {
            scheduler.set_learning(enabled);
            send_state(scheduler, msg_tx);
            Ok(())
        }
        SchedulerCommand::AddSource(config) => scheduler.add_source(config).map(|id| {
            let _ = msg_tx.send(SchedulerMessage::SourceAdded(id));
        }),
        SchedulerCommand::RemoveSource(id) => scheduler.remove_source(&id).map(|_| ()),
        SchedulerCommand::UpdateSourceParams { id, patch } => {
            scheduler.update_source_params(&id, &patch).map(|_| ())
        }
        SchedulerCommand::ResetSources => {
            scheduler.reset_sources();
            Ok(())
        }
        SchedulerCommand::ApplyEdit(edit) => scheduler.apply_edit(edit).map(|_| send_history(scheduler, msg_tx)),
        SchedulerCommand::Undo => scheduler.undo().map(|_| send_history(scheduler, msg_tx)),
        SchedulerCommand::Redo => scheduler.redo().map(|_| send_history(scheduler, msg_tx)),
        SchedulerCommand::LoadNetwork(file) => scheduler.load_network(file).map(|_| {
            send_history(scheduler, msg_tx);
            send_state(scheduler, msg_tx);
        }),
        SchedulerCommand::RequestNetwork => {
            let _ = msg_tx.send(SchedulerMessage::Network(scheduler.to_network_file()));
            Ok(())
        }
        SchedulerCommand::RequestSnapshot => {
            let _ = msg_tx.send(SchedulerMessage::Snapshot(scheduler.visualization().snapshot()));
            Ok(())
        }
        SchedulerCommand::Shutdown => Ok(()),
    };

    if let Err(e) = result {
        tracing::warn!("Scheduler command failed: {}", e);
        if e.is_fatal() {
            let _ = msg_tx.send(SchedulerMessage::Stopped { error: e.to_string() });
            send_state(scheduler, msg_tx);
        } else {
            let _ = msg_tx.send(SchedulerMessage::Error(e.to_string()));
        }
    }
}

fn send_state(scheduler: &ExecutionScheduler, msg_tx: &Sender<SchedulerMessage>) {
    let _ = msg_tx.send(SchedulerMessage::State(scheduler.state()));
}

fn send_history(scheduler: &ExecutionScheduler, msg_tx: &Sender<SchedulerMessage>) {
    let history = scheduler.history();
    let _ = msg_tx.send(SchedulerMessage::HistoryChanged {
        can_undo: history.can_undo(),
        can_redo: history.can_redo(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::scheduler::ManualClock;

    #[test]
    fn test_bridge_creation() {
        let (bridge, cmd_rx, msg_tx) = SchedulerBridge::new();
        bridge.start();
        assert!(matches!(cmd_rx.try_recv(), Ok(SchedulerCommand::Start)));

        msg_tx.send(SchedulerMessage::Shutdown).unwrap();
        let msgs = bridge.drain();
        assert_eq!(msgs.len(), 1);
        assert!(bridge.try_recv().is_none());
    }

    #[test]
    fn test_start_without_engine_reports_error() {
        let scheduler = ExecutionScheduler::new(&AppConfig::default(), Box::new(ManualClock::default()));
        let (bridge, handle) = SchedulerBridge::spawn(scheduler).unwrap();

        bridge.start();
        bridge.shutdown();
        handle.join().unwrap();

        let msgs = bridge.drain();
        assert!(msgs
            .iter()
            .any(|m| matches!(m, SchedulerMessage::Stopped { error } if error.contains("No engine"))));
        assert!(matches!(msgs.last(), Some(SchedulerMessage::Shutdown)));
    }

    #[test]
    fn test_loop_exits_when_ui_hangs_up() {
        let scheduler = ExecutionScheduler::new(&AppConfig::default(), Box::new(ManualClock::default()));
        let (bridge, cmd_rx, msg_tx) = SchedulerBridge::new();
        drop(bridge.cmd_tx);
        run_scheduler_loop(scheduler, cmd_rx, msg_tx);
        assert!(matches!(bridge.msg_rx.try_recv(), Ok(SchedulerMessage::Shutdown)));
    }
}

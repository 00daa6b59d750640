//! Engine -> caller event stream and caller -> engine cancellation.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::error;

/// Target name used when the run fails before any target is touched.
pub const GLOBAL_TARGET_NAME: &str = "Global";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub targets_completed: usize,
    pub targets_total: usize,
    pub current_target_name: String,
    pub messages_deleted: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetError {
    pub message: String,
    pub target_name: String,
}

impl TargetError {
    pub fn new(target_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            target_name: target_name.into(),
        }
    }

    pub fn global(message: impl Into<String>) -> Self {
        Self::new(GLOBAL_TARGET_NAME, message)
    }

    pub fn is_global(&self) -> bool {
        self.target_name == GLOBAL_TARGET_NAME
    }
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target_name, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub targets_total: usize,
    pub targets_completed: usize,
    pub targets_failed: usize,
    pub messages_deleted: u64,
    pub deletes_failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Progress(ProgressEvent),
    TargetFailed(TargetError),
    Completed(RunSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Resolving,
    Processing,
    Completed,
    Aborted,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunSummary),
    Cancelled,
    Aborted,
}

/// Cooperative stop request, polled by the engine at target and page boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Callback-style consumer for [`RunHandle::observe`].
pub trait RunObserver: Send {
    fn on_progress(&mut self, _event: &ProgressEvent) {}
    fn on_target_error(&mut self, _error: &TargetError) {}
    fn on_completed(&mut self, _summary: &RunSummary) {}
}

/// Engine-side half of a run's event stream.
pub(crate) struct EventSink {
    events: mpsc::UnboundedSender<RunEvent>,
    state: watch::Sender<RunState>,
}

impl EventSink {
    pub(crate) fn new(
        events: mpsc::UnboundedSender<RunEvent>,
        state: watch::Sender<RunState>,
    ) -> Self {
        Self { events, state }
    }

    // A dropped receiver just means nobody is listening any more.
    pub(crate) fn emit(&self, event: RunEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn set_state(&self, state: RunState) {
        let _ = self.state.send(state);
    }
}

pub struct RunHandle {
    events: mpsc::UnboundedReceiver<RunEvent>,
    state: watch::Receiver<RunState>,
    cancel: CancelFlag,
    task: JoinHandle<RunOutcome>,
}

impl RunHandle {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<RunEvent>,
        state: watch::Receiver<RunState>,
        cancel: CancelFlag,
        task: JoinHandle<RunOutcome>,
    ) -> Self {
        Self {
            events,
            state,
            cancel,
            task,
        }
    }

    pub fn request_cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Next event, or `None` once the run has finished and the stream is drained.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Feeds every remaining event to `observer` until the run ends.
    pub async fn observe<O: RunObserver + ?Sized>(&mut self, observer: &mut O) {
        while let Some(event) = self.events.recv().await {
            match &event {
                RunEvent::Progress(progress) => observer.on_progress(progress),
                RunEvent::TargetFailed(err) => observer.on_target_error(err),
                RunEvent::Completed(summary) => observer.on_completed(summary),
            }
        }
    }

    pub async fn wait(self) -> RunOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("deletion run task failed: {err}");
                RunOutcome::Aborted
            }
        }
    }
}

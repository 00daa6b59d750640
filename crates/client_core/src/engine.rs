//! Deletion engine: resolves the acting account, then walks each target's history newest-first
//! and deletes the messages it authored.
//!
//! A run moves `Idle -> Resolving -> Processing -> {Completed, Aborted}`. Failing to resolve the
//! account aborts the run; every other fault is contained in the message, channel or target where
//! it happened. Network calls within a run are strictly sequential.

use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use shared::domain::{ChannelId, GuildId, MessageId, SelectableTarget, UserId};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::{
    api::PlatformApi,
    events::{
        CancelFlag, EventSink, ProgressEvent, RunEvent, RunHandle, RunOutcome, RunState,
        RunSummary, TargetError,
    },
    pacing::Sleeper,
    session::Session,
};

/// Pause after each delete attempt, on top of any 429 backoff.
pub const DEFAULT_DELETE_PACING: Duration = Duration::from_millis(1000);

/// What to do when fetching a history page fails below HTTP (timeout, DNS, reset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageFaultPolicy {
    /// Fail the target with a `TargetError`.
    #[default]
    Report,
    /// Treat the page as empty, ending that channel's history silently.
    TreatAsExhausted,
}

impl FromStr for PageFaultPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "report" => Ok(Self::Report),
            "treat_as_exhausted" | "exhausted" => Ok(Self::TreatAsExhausted),
            other => Err(format!(
                "unknown page fault policy '{other}' (expected 'report' or 'treat_as_exhausted')"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub delete_pacing: Duration,
    pub page_fault_policy: PageFaultPolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            delete_pacing: DEFAULT_DELETE_PACING,
            page_fault_policy: PageFaultPolicy::default(),
        }
    }
}

pub struct DeletionEngine {
    api: Arc<dyn PlatformApi>,
    sleeper: Arc<dyn Sleeper>,
    options: EngineOptions,
    active: Arc<AtomicBool>,
}

impl DeletionEngine {
    pub fn new(session: &Session, options: EngineOptions) -> Self {
        Self {
            api: session.api(),
            sleeper: session.sleeper(),
            options,
            active: session.run_slot(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Spawns a run over `targets` in the given order.
    ///
    /// Returns `None` without doing anything while another run from this session is still active,
    /// whichever engine started it.
    /// Must be called from within a tokio runtime.
    pub fn start_run(&self, targets: Vec<SelectableTarget>) -> Option<RunHandle> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("engine: a deletion run is already active; ignoring start request");
            return None;
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(RunState::Idle);
        let cancel = CancelFlag::new();

        let run = DeletionRun {
            api: Arc::clone(&self.api),
            sleeper: Arc::clone(&self.sleeper),
            options: self.options.clone(),
            cancel: cancel.clone(),
            sink: EventSink::new(events_tx, state_tx),
        };
        let active = ActiveRunGuard(Arc::clone(&self.active));
        let task = tokio::spawn(async move {
            let _active = active;
            run.execute(targets).await
        });

        Some(RunHandle::new(events_rx, state_rx, cancel, task))
    }
}

/// Clears the engine's active flag when the run task finishes, panics included.
struct ActiveRunGuard(Arc<AtomicBool>);

impl Drop for ActiveRunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Finished,
    Cancelled,
}

#[derive(Debug, Default)]
struct Tally {
    deleted: u64,
    failed: u64,
}

struct DeletionRun {
    api: Arc<dyn PlatformApi>,
    sleeper: Arc<dyn Sleeper>,
    options: EngineOptions,
    cancel: CancelFlag,
    sink: EventSink,
}

impl DeletionRun {
    async fn execute(self, targets: Vec<SelectableTarget>) -> RunOutcome {
        self.sink.set_state(RunState::Resolving);
        let account = match self.api.get_current_user().await {
            Ok(account) => account,
            Err(err) => {
                error!("engine: failed to resolve current user: {err}");
                self.sink.emit(RunEvent::TargetFailed(TargetError::global(format!(
                    "failed to resolve current user: {err}"
                ))));
                self.sink.set_state(RunState::Aborted);
                return RunOutcome::Aborted;
            }
        };

        info!(
            user_id = account.id.0,
            targets = targets.len(),
            "engine: deletion run started"
        );
        self.sink.set_state(RunState::Processing);

        let mut summary = RunSummary {
            targets_total: targets.len(),
            ..RunSummary::default()
        };

        for target in &targets {
            if self.cancel.is_cancelled() {
                return self.cancelled(&summary);
            }

            let name = target.display_name();
            let mut tally = Tally::default();
            let result = match target {
                SelectableTarget::Dm { channel_id, .. } => {
                    self.purge_channel(*channel_id, name, account.id, &mut tally)
                        .await
                }
                SelectableTarget::Guild { guild_id, .. } => {
                    self.purge_guild(*guild_id, name, account.id, &mut tally)
                        .await
                }
            };
            summary.messages_deleted += tally.deleted;
            summary.deletes_failed += tally.failed;

            match result {
                Ok(Flow::Cancelled) => return self.cancelled(&summary),
                Ok(Flow::Finished) => {
                    info!(
                        target_name = name,
                        deleted = tally.deleted,
                        skipped = tally.failed,
                        "engine: target finished"
                    );
                }
                Err(err) => {
                    warn!(target_name = name, "engine: target failed: {err:#}");
                    summary.targets_failed += 1;
                    self.sink.emit(RunEvent::TargetFailed(TargetError::new(
                        name,
                        format!("{err:#}"),
                    )));
                }
            }

            summary.targets_completed += 1;
            self.sink.emit(RunEvent::Progress(ProgressEvent {
                targets_completed: summary.targets_completed,
                targets_total: summary.targets_total,
                current_target_name: name.to_string(),
                messages_deleted: tally.deleted,
            }));
        }

        info!(
            deleted = summary.messages_deleted,
            failed_targets = summary.targets_failed,
            "engine: deletion run completed"
        );
        self.sink.set_state(RunState::Completed);
        self.sink.emit(RunEvent::Completed(summary.clone()));
        RunOutcome::Completed(summary)
    }

    fn cancelled(&self, summary: &RunSummary) -> RunOutcome {
        info!(
            completed = summary.targets_completed,
            total = summary.targets_total,
            "engine: deletion run cancelled"
        );
        self.sink.set_state(RunState::Aborted);
        RunOutcome::Cancelled
    }

    /// Purges every text channel of a guild. Channel failures are collected into one error for
    /// the guild after the remaining channels have been processed.
    async fn purge_guild(
        &self,
        guild_id: GuildId,
        guild_name: &str,
        author: UserId,
        tally: &mut Tally,
    ) -> Result<Flow> {
        let channels = self
            .api
            .list_guild_channels(guild_id)
            .await
            .with_context(|| format!("failed to list channels of {guild_name}"))?;

        let mut failures = Vec::new();
        for channel in channels.iter().filter(|channel| channel.kind.is_guild_text()) {
            let context = format!("{guild_name}/#{}", channel.display_name());
            match self.purge_channel(channel.id, &context, author, tally).await {
                Ok(Flow::Finished) => {}
                Ok(Flow::Cancelled) => return Ok(Flow::Cancelled),
                Err(err) => {
                    warn!(channel = %context, "engine: channel failed: {err:#}");
                    failures.push(format!("{err:#}"));
                }
            }
        }

        if failures.is_empty() {
            Ok(Flow::Finished)
        } else {
            Err(anyhow!(
                "{} channel(s) failed: {}",
                failures.len(),
                failures.join("; ")
            ))
        }
    }

    async fn purge_channel(
        &self,
        channel_id: ChannelId,
        context: &str,
        author: UserId,
        tally: &mut Tally,
    ) -> Result<Flow> {
        let mut before: Option<MessageId> = None;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Flow::Cancelled);
            }

            let page = match self.api.fetch_message_page(channel_id, before).await {
                Ok(page) => page,
                Err(err)
                    if err.is_transport()
                        && self.options.page_fault_policy == PageFaultPolicy::TreatAsExhausted =>
                {
                    warn!(
                        channel = context,
                        "engine: transport fault while paging, treating history as exhausted: {err}"
                    );
                    return Ok(Flow::Finished);
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("message fetch failed in {context}"))
                }
            };

            for message in page.authored_by(author) {
                match self.api.delete_message(channel_id, message.id).await {
                    Ok(()) => {
                        tally.deleted += 1;
                        debug!(
                            channel = context,
                            message_id = message.id.0,
                            "engine: deleted message"
                        );
                    }
                    Err(err) => {
                        tally.failed += 1;
                        warn!(
                            channel = context,
                            message_id = message.id.0,
                            "engine: skipping message: {err}"
                        );
                    }
                }
                self.sleeper.sleep(self.options.delete_pacing).await;
            }

            match page.next_cursor() {
                Some(cursor) => before = Some(cursor),
                None => return Ok(Flow::Finished),
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use client_core::{ProgressEvent, RunObserver, RunSummary, TargetError};
use shared::domain::SelectableTarget;

/// Prints run events as they arrive.
pub struct ConsoleObserver<W> {
    out: W,
}

impl<W: Write + Send> ConsoleObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

// Output failures (closed pipe) must not stop the run.
impl<W: Write + Send> RunObserver for ConsoleObserver<W> {
    fn on_progress(&mut self, event: &ProgressEvent) {
        let _ = writeln!(
            self.out,
            "[{}/{}] {}: {} message(s) deleted",
            event.targets_completed,
            event.targets_total,
            event.current_target_name,
            event.messages_deleted
        );
    }

    fn on_target_error(&mut self, error: &TargetError) {
        let _ = writeln!(self.out, "error in {}: {}", error.target_name, error.message);
    }

    fn on_completed(&mut self, summary: &RunSummary) {
        let _ = writeln!(
            self.out,
            "done: {} message(s) deleted across {} target(s); {} target(s) failed, {} delete(s) skipped",
            summary.messages_deleted,
            summary.targets_completed,
            summary.targets_failed,
            summary.deletes_failed
        );
    }
}

pub fn format_last_activity(recency_key: Option<u64>) -> String {
    recency_key
        .and_then(|ms| i64::try_from(ms).ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Writes the `purge list` table.
pub fn write_catalog(
    out: &mut impl Write,
    dms: &[SelectableTarget],
    guilds: &[SelectableTarget],
) -> io::Result<()> {
    writeln!(out, "Direct messages ({}):", dms.len())?;
    for target in dms {
        if let SelectableTarget::Dm {
            channel_id,
            display_name,
            recency_key,
        } = target
        {
            writeln!(
                out,
                "  {channel_id:>20}  {}  {display_name}",
                format_last_activity(Some(*recency_key))
            )?;
        }
    }

    writeln!(out, "Guilds ({}):", guilds.len())?;
    for target in guilds {
        if let SelectableTarget::Guild {
            guild_id,
            display_name,
        } = target
        {
            writeln!(out, "  {guild_id:>20}  {display_name}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/report_tests.rs"]
mod tests;

//! Notifications from the merge worker and the caller's replies
//!
//! The worker reports through a FIFO of [`MergeEvent`]s. The caller answers a
//! header conflict with a [`Decision`] and may request cancellation at any
//! time through a [`CancelToken`].

use crate::memory::{MemorySample, MemoryTier};
use crate::table::Row;
use crossbeam_channel::Sender;
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// First rows that disagree under the first-file-only header policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderConflict {
    /// Position of the offending file in the file list
    pub file_index: usize,
    #[serde(serialize_with = "lossy_path")]
    pub path: PathBuf,
    /// First row of the first file
    pub expected: Row,
    /// First row of the offending file
    pub found: Row,
}

impl HeaderConflict {
    /// Human-readable description for prompts
    pub fn message(&self) -> String {
        format!(
            "the first row of '{}' does not match the first row of the first file\n  first file: {}\n  {}: {}",
            display_name(&self.path),
            self.expected,
            display_name(&self.path),
            self.found
        )
    }
}

/// A notification emitted by the worker
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MergeEvent {
    /// Percent complete, 0 to 100
    Progress { percent: u8 },
    /// A memory reading
    Memory(MemorySample),
    /// A file could not be read; the run continues without it
    FileSkipped {
        #[serde(serialize_with = "lossy_path")]
        path: PathBuf,
        message: String,
    },
    /// The run is suspended until the caller answers
    Conflict(HeaderConflict),
    /// Terminal: the merged file was written
    Completed {
        #[serde(serialize_with = "lossy_path")]
        output_path: PathBuf,
    },
    /// Terminal: the caller aborted or cancelled; nothing was written
    Cancelled,
    /// Terminal: the run failed; nothing was written
    Failed { message: String },
}

impl MergeEvent {
    /// Whether this is the last event of a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MergeEvent::Completed { .. } | MergeEvent::Cancelled | MergeEvent::Failed { .. }
        )
    }
}

/// The caller's answer to a header conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Abort,
}

impl From<bool> for Decision {
    fn from(proceed: bool) -> Self {
        if proceed {
            Decision::Continue
        } else {
            Decision::Abort
        }
    }
}

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
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

/// Worker side of the notification channel.
///
/// Sends never block and never fail the run; if the caller stopped
/// listening, notifications are dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<MergeEvent>,
}

impl EventSink {
    pub fn new(tx: Sender<MergeEvent>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, event: MergeEvent) {
        let _ = self.tx.send(event);
    }

    pub fn progress(&self, done: usize, total: usize) {
        self.emit(MergeEvent::Progress {
            percent: percent(done, total),
        });
    }
}

/// Integer percentage of `done` out of `total`, clamped to 100
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = done.min(total) * 100 / total;
    u8::try_from(pct).unwrap_or(100)
}

/// Caller-side snapshot of a run, folded from its events
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunState {
    pub progress_percent: u8,
    pub memory_usage_bytes: Option<u64>,
    pub memory_tier: Option<MemoryTier>,
    pub last_error: Option<String>,
    pub pending_conflict: Option<HeaderConflict>,
    pub output_path: Option<PathBuf>,
    pub finished: bool,
}

impl RunState {
    /// Update the snapshot with one event
    pub fn apply(&mut self, event: &MergeEvent) {
        match event {
            MergeEvent::Progress { percent } => self.progress_percent = *percent,
            MergeEvent::Memory(sample) => {
                self.memory_usage_bytes = Some(sample.usage_bytes);
                self.memory_tier = Some(sample.tier);
            }
            MergeEvent::FileSkipped { message, .. } => self.last_error = Some(message.clone()),
            MergeEvent::Conflict(conflict) => self.pending_conflict = Some(conflict.clone()),
            MergeEvent::Completed { output_path } => {
                self.output_path = Some(output_path.clone());
                self.pending_conflict = None;
                self.finished = true;
            }
            MergeEvent::Cancelled => {
                self.pending_conflict = None;
                self.finished = true;
            }
            MergeEvent::Failed { message } => {
                self.last_error = Some(message.clone());
                self.pending_conflict = None;
                self.finished = true;
            }
        }
    }

    /// Clear the pending conflict once it has been answered
    pub fn conflict_answered(&mut self) {
        self.pending_conflict = None;
    }
}

/// Paths go out as strings even when they are not valid UTF-8
fn lossy_path<P: AsRef<Path>, S: Serializer>(path: &P, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&path.as_ref().to_string_lossy())
}

/// File name for messages, falling back to the full path
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

//! The merge worker
//!
//! A run executes on one dedicated thread: header reconciliation first, then
//! every file in list order through the reader into the accumulator, with a
//! memory checkpoint after each file and each chunked batch, and finally a
//! single write of the complete result. The caller keeps a [`MergeHandle`] to
//! drain notifications, answer a header conflict and cancel.

use crate::accumulator::MergeAccumulator;
use crate::error::{Error, Result};
use crate::headers::{find_first_conflict, ConflictGate, Reconciliation};
use crate::memory::{MemoryGovernor, MemoryProbe, SysinfoProbe};
use crate::options::MergeOptions;
use crate::progress::{CancelToken, Decision, EventSink, MergeEvent};
use crate::reader::{ReadMode, ReadPolicy, RowSource};
use crate::report::{MergeReport, SkippedFile};
use crate::writer::OutputWriter;
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// Everything a run needs, frozen when the worker starts
pub struct MergeRequest {
    pub files: Vec<PathBuf>,
    pub options: MergeOptions,
    probe: Option<Box<dyn MemoryProbe>>,
}

impl std::fmt::Debug for MergeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeRequest")
            .field("files", &self.files)
            .field("options", &self.options)
            .field("custom_probe", &self.probe.is_some())
            .finish()
    }
}

impl MergeRequest {
    pub fn new(files: Vec<PathBuf>, options: MergeOptions) -> Self {
        Self {
            files,
            options,
            probe: None,
        }
    }

    /// Replace the default `sysinfo` memory probe
    pub fn with_memory_probe(mut self, probe: Box<dyn MemoryProbe>) -> Self {
        self.probe = Some(probe);
        self
    }
}

/// Caller side of a running merge
#[derive(Debug)]
pub struct MergeHandle {
    events: Receiver<MergeEvent>,
    decisions: Sender<Decision>,
    cancel: CancelToken,
    worker: Option<JoinHandle<Result<MergeReport>>>,
}

impl MergeHandle {
    /// Notification stream, in the order the worker produced it.
    ///
    /// The stream closes after the terminal event.
    pub fn events(&self) -> &Receiver<MergeEvent> {
        &self.events
    }

    /// Answer a pending header conflict; the first answer wins
    pub fn resolve_conflict(&self, proceed: bool) {
        let _ = self.decisions.try_send(Decision::from(proceed));
    }

    /// Ask the worker to stop at the next file or batch boundary.
    ///
    /// A pending conflict wait ends immediately. Nothing is written after
    /// cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
        let _ = self.decisions.try_send(Decision::Abort);
    }

    /// Whether the worker thread has exited
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the worker and return its result
    pub fn join(mut self) -> Result<MergeReport> {
        match self.worker.take() {
            Some(worker) => worker.join().unwrap_or(Err(Error::WorkerPanicked)),
            None => Err(Error::WorkerPanicked),
        }
    }
}

/// Entry point for starting runs
#[derive(Debug, Clone, Copy, Default)]
pub struct MergePipeline;

impl MergePipeline {
    /// Start a run on a dedicated worker thread
    pub fn spawn(request: MergeRequest) -> Result<MergeHandle> {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (decision_tx, decision_rx) = crossbeam_channel::bounded(1);
        let cancel = CancelToken::new();

        let job = Job {
            governor: MemoryGovernor::new(
                request
                    .probe
                    .unwrap_or_else(|| Box::new(SysinfoProbe::new())),
                &request.options,
            ),
            files: request.files,
            options: request.options,
            sink: EventSink::new(event_tx),
            gate: ConflictGate::new(decision_rx, cancel.clone()),
            cancel: cancel.clone(),
        };

        let worker = thread::Builder::new()
            .name("tabmerge-worker".to_string())
            .spawn(move || job.run())?;

        Ok(MergeHandle {
            events: event_rx,
            decisions: decision_tx,
            cancel,
            worker: Some(worker),
        })
    }
}

enum RunOutcome {
    Completed(MergeReport),
    Cancelled,
}

enum FileOutcome {
    Merged,
    Cancelled,
}

/// State owned by the worker thread
struct Job {
    files: Vec<PathBuf>,
    options: MergeOptions,
    governor: MemoryGovernor,
    sink: EventSink,
    gate: ConflictGate,
    cancel: CancelToken,
}

impl Job {
    /// Run to completion and emit exactly one terminal event
    fn run(mut self) -> Result<MergeReport> {
        let sink = self.sink.clone();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute()));

        match outcome {
            Ok(Ok(RunOutcome::Completed(report))) => {
                sink.emit(MergeEvent::Completed {
                    output_path: report.output_path.clone(),
                });
                Ok(report)
            }
            Ok(Ok(RunOutcome::Cancelled)) => {
                info!("merge cancelled, nothing written");
                sink.emit(MergeEvent::Cancelled);
                Err(Error::Cancelled)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "merge failed");
                sink.emit(MergeEvent::Failed {
                    message: e.to_string(),
                });
                Err(e)
            }
            Err(_) => {
                sink.emit(MergeEvent::Failed {
                    message: Error::WorkerPanicked.to_string(),
                });
                Err(Error::WorkerPanicked)
            }
        }
    }

    fn execute(&mut self) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let files = std::mem::take(&mut self.files);
        let total = files.len();
        if total == 0 {
            return Err(Error::NoInputs);
        }

        let policy = self.options.header_policy;
        info!(files = total, %policy, "starting merge");

        let mut conflict_accepted = false;
        let reconciliation = find_first_conflict(&files, policy, self.options.delimiter_byte());
        if let Reconciliation::Conflict(conflict) = reconciliation {
            self.gate.discard_stale();
            self.sink.emit(MergeEvent::Conflict(conflict));
            match self.gate.wait() {
                Decision::Continue => {
                    info!("continuing past first-row mismatch");
                    conflict_accepted = true;
                }
                Decision::Abort => return Ok(RunOutcome::Cancelled),
            }
        }

        let read_policy = ReadPolicy::from_options(&self.options);
        let mut accumulator = MergeAccumulator::new(policy);
        let mut skipped_files = Vec::new();

        for (index, path) in files.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }
            self.sink.progress(index, total);

            match self.merge_file(index, path, &read_policy, &mut accumulator) {
                Ok(FileOutcome::Merged) => accumulator.commit_file(),
                Ok(FileOutcome::Cancelled) => {
                    accumulator.rollback_file();
                    return Ok(RunOutcome::Cancelled);
                }
                Err(e) if e.is_per_file() => {
                    let discarded = accumulator.rollback_file();
                    warn!(path = %path.display(), discarded, error = %e, "skipping file");
                    self.sink.emit(MergeEvent::FileSkipped {
                        path: path.clone(),
                        message: e.to_string(),
                    });
                    skipped_files.push(SkippedFile {
                        path: path.clone(),
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }

            if let Some(sample) = self.governor.checkpoint(&mut accumulator) {
                self.sink.emit(MergeEvent::Memory(sample));
            }
        }

        if self.cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        let files_merged = accumulator.files_merged();
        let rows = accumulator.finish()?;
        let output_path = OutputWriter::for_first_input(&files[0], &self.options).write(&rows)?;
        self.sink.progress(total, total);

        info!(
            path = %output_path.display(),
            rows = rows.len(),
            files_merged,
            skipped = skipped_files.len(),
            "merge complete"
        );

        Ok(RunOutcome::Completed(MergeReport {
            started_at,
            finished_at: Utc::now(),
            output_path,
            rows_written: rows.len(),
            files_merged,
            skipped_files,
            header_policy: policy,
            conflict_accepted,
            peak_memory_bytes: Some(self.governor.peak_bytes()).filter(|&b| b > 0),
        }))
    }

    /// Stream one file into the accumulator.
    ///
    /// On error the caller rolls back whatever this file staged.
    fn merge_file(
        &mut self,
        index: usize,
        path: &Path,
        read_policy: &ReadPolicy,
        accumulator: &mut MergeAccumulator,
    ) -> Result<FileOutcome> {
        let mut source = RowSource::open(path, read_policy)?;
        let chunked = matches!(source.mode(), ReadMode::Chunked { .. });
        accumulator.begin_file(index);

        while let Some(batch) = source.next_batch()? {
            accumulator.append(index, batch);

            if chunked {
                if let Some(sample) = self.governor.checkpoint(accumulator) {
                    self.sink.emit(MergeEvent::Memory(sample));
                }
                if self.cancel.is_cancelled() {
                    return Ok(FileOutcome::Cancelled);
                }
            }
        }

        Ok(FileOutcome::Merged)
    }
}

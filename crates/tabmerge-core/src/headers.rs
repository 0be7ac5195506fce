//! Header reconciliation for the first-file-only policy
//!
//! Before any rows are merged, the first row of every later file is compared
//! cell by cell with the first row of the first file. Only the first mismatch
//! is surfaced; the run then waits, without a timeout, for the caller to
//! decide whether to continue.

use crate::options::HeaderPolicy;
use crate::progress::{CancelToken, Decision, HeaderConflict};
use crate::reader::read_first_row;
use crate::table::Row;
use crossbeam_channel::Receiver;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Result of comparing first rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The policy keeps every first row, or there is only one file
    NotRequired,
    /// Every readable file starts with the same row as the first file
    Consistent,
    /// The first file whose first row differs
    Conflict(HeaderConflict),
}

/// Whether the policy calls for a first-row check over `file_count` files
pub fn reconciliation_required(policy: HeaderPolicy, file_count: usize) -> bool {
    policy.trims_headers() && file_count > 1
}

/// Compare first rows and report the first mismatch.
///
/// Files that cannot be read, or that have no rows, take no part in the
/// comparison; the merge phase reports their errors. If the first file
/// itself has no readable first row there is nothing to compare against.
pub fn find_first_conflict(files: &[PathBuf], policy: HeaderPolicy, delimiter: u8) -> Reconciliation {
    if !reconciliation_required(policy, files.len()) {
        return Reconciliation::NotRequired;
    }

    let expected = match first_row_of(&files[0], delimiter) {
        Some(row) => row,
        None => return Reconciliation::Consistent,
    };

    for (file_index, path) in files.iter().enumerate().skip(1) {
        let Some(found) = first_row_of(path, delimiter) else {
            continue;
        };
        if found != expected {
            warn!(path = %path.display(), file_index, "first row differs from the first file");
            return Reconciliation::Conflict(HeaderConflict {
                file_index,
                path: path.clone(),
                expected,
                found,
            });
        }
    }

    Reconciliation::Consistent
}

fn first_row_of(path: &Path, delimiter: u8) -> Option<Row> {
    match read_first_row(path, delimiter) {
        Ok(row) => row,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "first row unavailable, not compared");
            None
        }
    }
}

/// Worker-side wait for the caller's conflict decision
#[derive(Debug)]
pub struct ConflictGate {
    decisions: Receiver<Decision>,
    cancel: CancelToken,
}

impl ConflictGate {
    pub fn new(decisions: Receiver<Decision>, cancel: CancelToken) -> Self {
        Self { decisions, cancel }
    }

    /// Forget answers sent while no conflict was pending
    pub fn discard_stale(&self) {
        while self.decisions.try_recv().is_ok() {}
    }

    /// Block until the caller decides.
    ///
    /// There is no timeout. Cancellation, or the caller dropping its side of
    /// the channel, counts as an abort.
    pub fn wait(&self) -> Decision {
        if self.cancel.is_cancelled() {
            return Decision::Abort;
        }
        let decision = self.decisions.recv().unwrap_or(Decision::Abort);
        if self.cancel.is_cancelled() {
            Decision::Abort
        } else {
            decision
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_not_required_for_keep_all_or_single_file() {
        let files = vec![PathBuf::from("a.csv"), PathBuf::from("b.csv")];
        assert_eq!(
            find_first_conflict(&files, HeaderPolicy::KeepAllFirstRows, b','),
            Reconciliation::NotRequired
        );
        assert_eq!(
            find_first_conflict(&files[..1], HeaderPolicy::KeepFirstFileFirstRowOnly, b','),
            Reconciliation::NotRequired
        );
    }

    #[test]
    fn test_consistent_first_rows() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write_file(dir.path(), "a.csv", "ID,Name\n1,a\n"),
            write_file(dir.path(), "b.csv", "ID,Name\n2,b\n"),
        ];
        assert_eq!(
            find_first_conflict(&files, HeaderPolicy::KeepFirstFileFirstRowOnly, b','),
            Reconciliation::Consistent
        );
    }

    #[test]
    fn test_reports_only_first_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write_file(dir.path(), "a.csv", "ID,Name\n"),
            write_file(dir.path(), "b.csv", "ID,Name\n"),
            write_file(dir.path(), "c.csv", "ID,Title\n"),
            write_file(dir.path(), "d.csv", "Other\n"),
        ];

        match find_first_conflict(&files, HeaderPolicy::KeepFirstFileFirstRowOnly, b',') {
            Reconciliation::Conflict(conflict) => {
                assert_eq!(conflict.file_index, 2);
                assert_eq!(conflict.path, files[2]);
                assert_eq!(conflict.expected.cells, vec!["ID", "Name"]);
                assert_eq!(conflict.found.cells, vec!["ID", "Title"]);
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_unreadable_and_empty_files_are_not_compared() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write_file(dir.path(), "a.csv", "ID\n"),
            dir.path().join("missing.csv"),
            write_file(dir.path(), "empty.csv", ""),
            write_file(dir.path(), "b.csv", "ID\n"),
        ];
        assert_eq!(
            find_first_conflict(&files, HeaderPolicy::KeepFirstFileFirstRowOnly, b','),
            Reconciliation::Consistent
        );
    }

    #[test]
    fn test_gate_returns_decision() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let gate = ConflictGate::new(rx, CancelToken::new());
        tx.send(Decision::Continue).unwrap();
        assert_eq!(gate.wait(), Decision::Continue);
    }

    #[test]
    fn test_gate_discards_stale_answers() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let gate = ConflictGate::new(rx, CancelToken::new());
        tx.send(Decision::Continue).unwrap();
        gate.discard_stale();

        let waiter = std::thread::spawn(move || gate.wait());
        tx.send(Decision::Abort).unwrap();
        assert_eq!(waiter.join().unwrap(), Decision::Abort);
    }

    #[test]
    fn test_gate_aborts_when_caller_disconnects() {
        let (tx, rx) = crossbeam_channel::bounded::<Decision>(1);
        let gate = ConflictGate::new(rx, CancelToken::new());
        drop(tx);
        assert_eq!(gate.wait(), Decision::Abort);
    }

    #[test]
    fn test_gate_aborts_when_cancelled() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let cancel = CancelToken::new();
        let gate = ConflictGate::new(rx, cancel.clone());
        cancel.cancel();
        tx.send(Decision::Continue).unwrap();
        assert_eq!(gate.wait(), Decision::Abort);
    }
}

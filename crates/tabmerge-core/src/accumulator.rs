//! Merge accumulator: the growing combined result of a run

use crate::error::{Error, Result};
use crate::options::HeaderPolicy;
use crate::table::{Row, RowBatch};
use tracing::debug;

/// Bookkeeping for the file currently being appended
#[derive(Debug, Clone, Copy)]
struct FileCursor {
    index: usize,
    /// Result length before this file's first row was appended
    mark: usize,
    /// The file's first row has yet to be seen and must be dropped
    header_pending: bool,
}

/// Owns the merged rows, built strictly in file order.
///
/// Rows of a file are staged between [`begin_file`](Self::begin_file) and
/// [`commit_file`](Self::commit_file); [`rollback_file`](Self::rollback_file)
/// removes everything the file contributed so a failed file leaves no rows
/// behind.
#[derive(Debug)]
pub struct MergeAccumulator {
    policy: HeaderPolicy,
    rows: Vec<Row>,
    current: Option<FileCursor>,
    files_merged: usize,
}

impl MergeAccumulator {
    /// Create an empty accumulator for the given header policy
    pub fn new(policy: HeaderPolicy) -> Self {
        Self {
            policy,
            rows: Vec::new(),
            current: None,
            files_merged: 0,
        }
    }

    /// Start staging rows for file `file_index`
    pub fn begin_file(&mut self, file_index: usize) {
        if self.current.is_some() {
            self.commit_file();
        }
        self.current = Some(FileCursor {
            index: file_index,
            mark: self.rows.len(),
            header_pending: file_index > 0 && self.policy.trims_headers(),
        });
    }

    /// Append one batch of file `file_index`.
    ///
    /// Batches must arrive in file-list order, and in read order within a
    /// file. Returns the number of rows actually appended.
    pub fn append(&mut self, file_index: usize, batch: RowBatch) -> usize {
        if self.current.map(|c| c.index) != Some(file_index) {
            self.begin_file(file_index);
        }

        let mut skip = 0;
        if let Some(cursor) = self.current.as_mut() {
            if cursor.header_pending {
                cursor.header_pending = false;
                if batch.starts_file && !batch.rows.is_empty() {
                    skip = 1;
                }
            }
        }

        let before = self.rows.len();
        self.rows.extend(batch.rows.into_iter().skip(skip));
        let appended = self.rows.len() - before;
        debug!(file_index, appended, dropped_header = skip == 1, "appended batch");
        appended
    }

    /// Keep everything staged for the current file
    pub fn commit_file(&mut self) {
        if self.current.take().is_some() {
            self.files_merged += 1;
        }
    }

    /// Discard everything staged for the current file.
    ///
    /// Returns the number of rows removed.
    pub fn rollback_file(&mut self) -> usize {
        match self.current.take() {
            Some(cursor) => {
                let removed = self.rows.len() - cursor.mark;
                self.rows.truncate(cursor.mark);
                removed
            }
            None => 0,
        }
    }

    /// Release spare capacity left behind by growth or rollback.
    ///
    /// Returns the number of row slots released.
    pub fn reclaim(&mut self) -> usize {
        let slack = self.rows.capacity() - self.rows.len();
        // Keep a quarter of headroom so steady appends don't reallocate.
        let keep = self.rows.len() / 4;
        if slack > keep {
            self.rows.shrink_to(self.rows.len() + keep);
        }
        slack.saturating_sub(self.rows.capacity() - self.rows.len())
    }

    /// Get the number of rows accumulated so far
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of files committed so far
    pub fn files_merged(&self) -> usize {
        self.files_merged
    }

    /// Commit any staged file and hand over the merged rows.
    ///
    /// Fails with [`Error::EmptyResult`] if nothing was accumulated.
    pub fn finish(mut self) -> Result<Vec<Row>> {
        self.commit_file();
        if self.rows.is_empty() {
            return Err(Error::EmptyResult);
        }
        Ok(self.rows)
    }
}

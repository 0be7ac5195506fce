//! Summary of a finished merge run

use crate::error::Result;
use crate::options::HeaderPolicy;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// An input that was left out of the result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    /// Why it was skipped
    pub message: String,
}

/// Record of a successful run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Where the merged file was written
    pub output_path: PathBuf,
    pub rows_written: usize,
    /// Inputs that contributed their rows
    pub files_merged: usize,
    pub skipped_files: Vec<SkippedFile>,
    pub header_policy: HeaderPolicy,
    /// True when the caller chose to continue past a first-row mismatch
    pub conflict_accepted: bool,
    /// Highest process memory seen during the run, if sampling worked
    pub peak_memory_bytes: Option<u64>,
}

impl MergeReport {
    /// Wall-clock duration of the run
    pub fn duration(&self) -> Duration {
        self.finished_at - self.started_at
    }

    /// Save the report as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

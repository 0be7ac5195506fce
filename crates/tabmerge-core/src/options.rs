//! Merge options and the header policy

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Files above this size are read in batches
pub const DEFAULT_CHUNK_THRESHOLD_BYTES: u64 = 100 * 1024 * 1024;

/// Rows per batch in chunked mode
pub const DEFAULT_BATCH_ROWS: usize = 10_000;

/// Base name of the merged output file
pub const DEFAULT_OUTPUT_BASE_NAME: &str = "Merged Result";

const GIB: u64 = 1024 * 1024 * 1024;

/// Which first rows survive the merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderPolicy {
    /// Every file contributes all of its rows
    KeepAllFirstRows,
    /// Only the first file's first row is kept; later first rows are dropped
    #[default]
    KeepFirstFileFirstRowOnly,
}

impl HeaderPolicy {
    /// Map the caller's two option flags onto a policy.
    ///
    /// `keep_all_headers` wins when both are set; with neither set the
    /// first-file-only default applies.
    pub fn from_flags(keep_all_headers: bool, keep_first_header: bool) -> Self {
        match (keep_all_headers, keep_first_header) {
            (true, _) => HeaderPolicy::KeepAllFirstRows,
            (false, true) | (false, false) => HeaderPolicy::KeepFirstFileFirstRowOnly,
        }
    }

    /// Whether later files lose their first row
    pub fn trims_headers(self) -> bool {
        matches!(self, HeaderPolicy::KeepFirstFileFirstRowOnly)
    }
}

impl std::fmt::Display for HeaderPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeaderPolicy::KeepAllFirstRows => write!(f, "keep all first rows"),
            HeaderPolicy::KeepFirstFileFirstRowOnly => write!(f, "keep first file's first row only"),
        }
    }
}

/// Settings for one merge run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeOptions {
    pub header_policy: HeaderPolicy,
    /// Inputs strictly larger than this are read in batches
    pub chunk_threshold_bytes: u64,
    /// Rows per batch when chunking
    pub batch_rows: usize,
    pub output_base_name: String,
    pub output_extension: String,
    /// Cell delimiter for both input and output
    pub delimiter: char,
    pub elevated_memory_bytes: u64,
    pub high_memory_bytes: u64,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            header_policy: HeaderPolicy::default(),
            chunk_threshold_bytes: DEFAULT_CHUNK_THRESHOLD_BYTES,
            batch_rows: DEFAULT_BATCH_ROWS,
            output_base_name: DEFAULT_OUTPUT_BASE_NAME.to_string(),
            output_extension: "csv".to_string(),
            delimiter: ',',
            elevated_memory_bytes: GIB * 3 / 2,
            high_memory_bytes: GIB * 3,
        }
    }
}

impl MergeOptions {
    /// Load options from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save options to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Set the header policy
    pub fn with_header_policy(mut self, policy: HeaderPolicy) -> Self {
        self.header_policy = policy;
        self
    }

    /// Delimiter as the single byte the csv crate expects.
    ///
    /// Non-ASCII delimiters fall back to a comma.
    pub fn delimiter_byte(&self) -> u8 {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .unwrap_or(b',')
    }

    /// Batch size, never zero
    pub fn effective_batch_rows(&self) -> usize {
        self.batch_rows.max(1)
    }
}

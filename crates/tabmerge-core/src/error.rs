//! Error types for tabmerge-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while merging
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to open or stat an input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV decoding error from the csv crate
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Failed to create or persist the merged output
    #[error("failed to write output '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every input errored or was empty
    #[error("empty merge result: no rows were collected, check the input files and settings")]
    EmptyResult,

    /// The run was started without any input
    #[error("no input files were given")]
    NoInputs,

    /// The caller aborted at a header conflict or cancelled the run
    #[error("merge cancelled")]
    Cancelled,

    /// The worker thread ended without reporting a status
    #[error("merge worker terminated unexpectedly")]
    WorkerPanicked,

    /// Directory traversal error
    #[error("failed to traverse directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error only concerns a single input file.
    ///
    /// Per-file errors skip that file and let the run continue; anything else
    /// ends the run.
    pub fn is_per_file(&self) -> bool {
        matches!(self, Error::FileRead { .. } | Error::Csv { .. })
    }
}

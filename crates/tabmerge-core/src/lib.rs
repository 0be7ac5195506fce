//! tabmerge-core: Core library for merging tabular files into one
//!
//! This library provides functionality to:
//! - Collect CSV inputs from files and directories
//! - Read inputs whole or in bounded batches, depending on size
//! - Reconcile first rows across files and pause on the first mismatch
//! - Accumulate rows with per-file rollback and memory checkpoints
//! - Write the merged result next to the first input without overwriting
//!
//! A run executes on a worker thread started with [`MergePipeline::spawn`];
//! the returned [`MergeHandle`] streams [`MergeEvent`]s and accepts a conflict
//! decision or a cancellation.

pub mod accumulator;
pub mod error;
pub mod headers;
pub mod inputs;
pub mod memory;
pub mod options;
pub mod pipeline;
pub mod progress;
pub mod reader;
pub mod report;
pub mod table;
pub mod writer;

pub use accumulator::MergeAccumulator;
pub use error::{Error, Result};
pub use headers::{find_first_conflict, Reconciliation};
pub use inputs::collect_inputs;
pub use memory::{MemoryGovernor, MemoryProbe, MemorySample, MemoryTier, SysinfoProbe};
pub use options::{HeaderPolicy, MergeOptions};
pub use pipeline::{MergeHandle, MergePipeline, MergeRequest};
pub use progress::{CancelToken, Decision, HeaderConflict, MergeEvent, RunState};
pub use reader::{read_first_row, ReadMode, ReadPolicy, RowSource};
pub use report::{MergeReport, SkippedFile};
pub use table::{Row, RowBatch};
pub use writer::OutputWriter;

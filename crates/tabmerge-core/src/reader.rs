//! Row source reader for tabular input files
//!
//! Small files are read as a single batch. Files above the configured size
//! threshold are streamed as fixed-size batches so that only one batch of a
//! large file is held by the reader at a time. The first physical row is
//! always included; dropping it is the accumulator's job.

use crate::error::{Error, Result};
use crate::options::MergeOptions;
use crate::table::{Row, RowBatch};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How a file is delivered to the accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// The whole file in one batch
    Whole,
    /// Batches of at most `batch_rows` rows
    Chunked { batch_rows: usize },
}

/// Size-based choice between whole-file and chunked reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPolicy {
    pub chunk_threshold_bytes: u64,
    pub batch_rows: usize,
    pub delimiter: u8,
}

impl ReadPolicy {
    /// Build the policy from merge options
    pub fn from_options(options: &MergeOptions) -> Self {
        Self {
            chunk_threshold_bytes: options.chunk_threshold_bytes,
            batch_rows: options.effective_batch_rows(),
            delimiter: options.delimiter_byte(),
        }
    }

    /// Pick the read mode for a file of `size_bytes`
    pub fn mode_for(&self, size_bytes: u64) -> ReadMode {
        if size_bytes > self.chunk_threshold_bytes {
            ReadMode::Chunked {
                batch_rows: self.batch_rows.max(1),
            }
        } else {
            ReadMode::Whole
        }
    }
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self::from_options(&MergeOptions::default())
    }
}

/// An open input file yielding row batches in physical order.
///
/// Lines with no bytes at all are skipped by the csv parser and never become
/// rows; a line holding only a delimiter or `""` is kept as a row.
pub struct RowSource {
    path: PathBuf,
    mode: ReadMode,
    reader: csv::Reader<BufReader<File>>,
    record: csv::StringRecord,
    batches_read: usize,
    exhausted: bool,
}

impl std::fmt::Debug for RowSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowSource")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("batches_read", &self.batches_read)
            .finish_non_exhaustive()
    }
}

impl RowSource {
    /// Open a file, choosing the read mode from its size
    pub fn open<P: AsRef<Path>>(path: P, policy: &ReadPolicy) -> Result<Self> {
        let path = path.as_ref();
        let size = std::fs::metadata(path)
            .map_err(|e| Error::FileRead {
                path: path.to_path_buf(),
                source: e,
            })?
            .len();
        let mode = policy.mode_for(size);
        debug!(path = %path.display(), size, ?mode, "opening input");
        Self::open_with_mode(path, mode, policy.delimiter)
    }

    /// Open a file with an explicit read mode
    pub fn open_with_mode<P: AsRef<Path>>(path: P, mode: ReadMode, delimiter: u8) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true) // Ragged rows pass through as-is
            .delimiter(delimiter)
            .from_reader(BufReader::new(file));

        Ok(Self {
            path: path.to_path_buf(),
            mode,
            reader,
            record: csv::StringRecord::new(),
            batches_read: 0,
            exhausted: false,
        })
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    /// Read the next batch.
    ///
    /// The first call always yields a batch (empty for an empty file);
    /// later calls yield `None` once the file is exhausted.
    pub fn next_batch(&mut self) -> Result<Option<RowBatch>> {
        if self.exhausted {
            return Ok(None);
        }

        let limit = match self.mode {
            ReadMode::Whole => usize::MAX,
            ReadMode::Chunked { batch_rows } => batch_rows,
        };

        let mut rows = Vec::new();
        while rows.len() < limit {
            if !self.read_row()? {
                self.exhausted = true;
                break;
            }
            rows.push(Row::from(&self.record));
        }

        let starts_file = self.batches_read == 0;
        if rows.is_empty() && !starts_file {
            return Ok(None);
        }

        self.batches_read += 1;
        debug!(
            path = %self.path.display(),
            batch = self.batches_read,
            rows = rows.len(),
            "read batch"
        );
        Ok(Some(RowBatch::new(rows, starts_file)))
    }

    /// Read only the first row, if the file has one
    pub fn first_row(&mut self) -> Result<Option<Row>> {
        if self.read_row()? {
            Ok(Some(Row::from(&self.record)))
        } else {
            Ok(None)
        }
    }

    fn read_row(&mut self) -> Result<bool> {
        self.reader
            .read_record(&mut self.record)
            .map_err(|e| Error::Csv {
                path: self.path.clone(),
                source: e,
            })
    }
}

impl Iterator for RowSource {
    type Item = Result<RowBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => None,
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}

/// Read the first row of a file without loading the rest
pub fn read_first_row<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Option<Row>> {
    RowSource::open_with_mode(path, ReadMode::Whole, delimiter)?.first_row()
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

    fn read_all_rows(path: &Path, policy: &ReadPolicy) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        for batch in RowSource::open(path, policy)? {
            rows.extend(batch?.rows);
        }
        Ok(rows)
    }

    fn policy(threshold: u64, batch_rows: usize) -> ReadPolicy {
        ReadPolicy {
            chunk_threshold_bytes: threshold,
            batch_rows,
            delimiter: b',',
        }
    }

    #[test]
    fn test_mode_for_threshold() {
        let p = policy(100, 10);
        assert_eq!(p.mode_for(100), ReadMode::Whole);
        assert_eq!(p.mode_for(101), ReadMode::Chunked { batch_rows: 10 });
        assert_eq!(ReadPolicy::default().mode_for(100 * 1024 * 1024), ReadMode::Whole);
    }

    #[test]
    fn test_whole_file_single_batch_includes_first_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.csv", "ID,Name\n1,foo\n2,bar\n");

        let mut source = RowSource::open(&path, &policy(1024, 10)).unwrap();
        assert_eq!(source.mode(), ReadMode::Whole);

        let batch = source.next_batch().unwrap().unwrap();
        assert!(batch.starts_file);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.rows[0].get(0), Some("ID"));
        assert!(source.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_chunked_batches_preserve_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "big.csv", "h\n1\n2\n3\n4\n");

        let batches: Vec<RowBatch> = RowSource::open(&path, &policy(0, 2))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        let sizes: Vec<usize> = batches.iter().map(RowBatch::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(batches[0].starts_file);
        assert!(!batches[1].starts_file);

        let flat: Vec<&str> = batches
            .iter()
            .flat_map(|b| b.rows.iter())
            .filter_map(|r| r.get(0))
            .collect();
        assert_eq!(flat, vec!["h", "1", "2", "3", "4"]);
    }

    #[test]
    fn test_empty_file_yields_one_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "empty.csv", "");

        let batches: Vec<RowBatch> = RowSource::open(&path, &policy(0, 2))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].is_empty());
    }

    #[test]
    fn test_cells_are_not_reinterpreted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.csv", "007, 3.10 ,\"a,b\"\nshort\n");

        let rows = read_all_rows(&path, &policy(1024, 10)).unwrap();
        assert_eq!(rows[0].cells, vec!["007", " 3.10 ", "a,b"]);
        assert_eq!(rows[1].cells, vec!["short"]);
    }

    #[test]
    fn test_first_row_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.csv", "ID;Name\n1;foo\n");

        let first = read_first_row(&path, b';').unwrap().unwrap();
        assert_eq!(first.cells, vec!["ID", "Name"]);

        let empty = write_file(dir.path(), "e.csv", "");
        assert!(read_first_row(&empty, b',').unwrap().is_none());
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = RowSource::open("does/not/exist.csv", &ReadPolicy::default()).unwrap_err();
        assert!(err.is_per_file());
        assert!(err.to_string().contains("does/not/exist.csv"));
    }

    #[test]
    fn test_invalid_utf8_is_per_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, b"ok\n\xff\xfe\n").unwrap();

        let err = read_all_rows(&path, &policy(1024, 10)).unwrap_err();
        assert!(matches!(err, Error::Csv { .. }));
    }

    #[test]
    fn test_blank_lines_are_not_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.csv", "x\n\ny\n\"\"\n");
        let rows = read_all_rows(&path, &policy(1024, 10)).unwrap();
        let cells: Vec<&[String]> = rows.iter().map(|r| r.cells.as_slice()).collect();
        assert_eq!(cells, vec![&["x".to_string()][..], &["y".to_string()][..], &[String::new()][..]]);
    }
}

//! Output writer: one atomic write of the merged rows

use crate::error::{Error, Result};
use crate::options::MergeOptions;
use crate::table::Row;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Directory the merged file goes to: that of the first input
pub fn output_dir_for(first_input: &Path) -> PathBuf {
    match first_input.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// `<dir>/<base>.<ext>` for counter 0, `<dir>/<base>_<n>.<ext>` otherwise
pub fn candidate_path(dir: &Path, base_name: &str, extension: &str, counter: usize) -> PathBuf {
    let file_name = if counter == 0 {
        format!("{}.{}", base_name, extension)
    } else {
        format!("{}_{}.{}", base_name, counter, extension)
    };
    dir.join(file_name)
}

/// Serializes the merged result next to the first input
#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
    base_name: String,
    extension: String,
    delimiter: u8,
}

impl OutputWriter {
    /// Writer targeting the directory of `first_input`
    pub fn for_first_input(first_input: &Path, options: &MergeOptions) -> Self {
        Self::new(output_dir_for(first_input), options)
    }

    pub fn new(dir: PathBuf, options: &MergeOptions) -> Self {
        Self {
            dir,
            base_name: options.output_base_name.clone(),
            extension: options.output_extension.clone(),
            delimiter: options.delimiter_byte(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write all rows as one sheet with no added header.
    ///
    /// Rows are serialized to a temporary file in the target directory which
    /// is then moved onto the first free output path without overwriting
    /// anything. Either the complete file appears or nothing does.
    pub fn write(&self, rows: &[Row]) -> Result<PathBuf> {
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| Error::Write {
            path: self.dir.clone(),
            source: e,
        })?;
        let tmp_path = tmp.path().to_path_buf();

        self.serialize(rows, tmp.as_file_mut())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| Error::Write {
                path: tmp_path.clone(),
                source: e,
            })?;
        debug!(tmp = %tmp_path.display(), rows = rows.len(), "serialized merged rows");

        let mut counter = 0;
        loop {
            let candidate = candidate_path(&self.dir, &self.base_name, &self.extension, counter);
            if candidate.exists() {
                counter += 1;
                continue;
            }
            match tmp.persist_noclobber(&candidate) {
                Ok(_) => {
                    info!(path = %candidate.display(), rows = rows.len(), "wrote merged output");
                    return Ok(candidate);
                }
                // Lost a race for this name; try the next one.
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                    tmp = e.file;
                    counter += 1;
                }
                Err(e) => {
                    return Err(Error::Write {
                        path: candidate,
                        source: e.error,
                    })
                }
            }
        }
    }

    fn serialize<W: Write>(&self, rows: &[Row], out: W) -> io::Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_writer(out);

        for row in rows {
            writer.write_record(&row.cells)?;
        }
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn row(cells: &[&str]) -> Row {
        Row::new(cells.iter().map(|c| c.to_string()).collect())
    }

    #[test]
    fn test_output_dir_for() {
        assert_eq!(output_dir_for(Path::new("data/a.csv")), PathBuf::from("data"));
        assert_eq!(output_dir_for(Path::new("a.csv")), PathBuf::from("."));
    }

    #[test]
    fn test_candidate_paths() {
        let dir = Path::new("out");
        assert_eq!(
            candidate_path(dir, "Merged Result", "csv", 0),
            PathBuf::from("out/Merged Result.csv")
        );
        assert_eq!(
            candidate_path(dir, "Merged Result", "csv", 2),
            PathBuf::from("out/Merged Result_2.csv")
        );
    }

    #[test]
    fn test_write_skips_existing_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Merged Result.csv"), "x").unwrap();
        fs::write(dir.path().join("Merged Result_1.csv"), "x").unwrap();

        let writer = OutputWriter::new(dir.path().to_path_buf(), &MergeOptions::default());
        let path = writer.write(&[row(&["a"])]).unwrap();

        assert_eq!(path, dir.path().join("Merged Result_2.csv"));
        assert_eq!(fs::read_to_string(dir.path().join("Merged Result.csv")).unwrap(), "x");
        assert_eq!(fs::read_to_string(path).unwrap(), "a\n");
    }

    #[test]
    fn test_write_round_trips_cells() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path().to_path_buf(), &MergeOptions::default());

        let path = writer
            .write(&[row(&["ID", "Note"]), row(&["1", "a,b"]), row(&["2"])])
            .unwrap();

        assert_eq!(path, dir.path().join("Merged Result.csv"));
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "ID,Note\n1,\"a,b\"\n2\n");
    }

    #[test]
    fn test_second_write_gets_suffix_and_leaves_first_intact() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path().to_path_buf(), &MergeOptions::default());

        let first = writer.write(&[row(&["a"])]).unwrap();
        let second = writer.write(&[row(&["b"])]).unwrap();

        assert_eq!(second, dir.path().join("Merged Result_1.csv"));
        assert_eq!(fs::read_to_string(first).unwrap(), "a\n");
        assert_eq!(fs::read_to_string(second).unwrap(), "b\n");
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path().to_path_buf(), &MergeOptions::default());
        writer.write(&[row(&["a"])]).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Merged Result.csv".to_string()]);
    }

    #[test]
    fn test_missing_directory_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path().join("gone"), &MergeOptions::default());

        let err = writer.write(&[row(&["a"])]).unwrap_err();
        assert!(matches!(err, Error::Write { .. }));
        assert!(!err.is_per_file());
    }
}

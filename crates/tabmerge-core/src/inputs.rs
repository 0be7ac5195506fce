//! Expanding a caller's selection into the ordered file list

use crate::error::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions recognised as tabular input when expanding directories
pub const TABULAR_EXTENSIONS: &[&str] = &["csv"];

/// Check whether a path has a tabular file extension (case-insensitive)
pub fn is_tabular(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            TABULAR_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Build the file list from files and directories, in the given order.
///
/// Files are kept where they appear, whatever their extension; a directory is
/// replaced in place by the tabular files beneath it, sorted by path. Paths
/// that do not exist are passed through so the merge reports them. Repeated
/// paths keep their first position.
pub fn collect_inputs<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for path in paths {
        let path = path.as_ref();

        if path.is_dir() {
            let mut found = Vec::new();
            for entry in WalkDir::new(path).follow_links(true) {
                let entry = entry?;
                if entry.file_type().is_file() && is_tabular(entry.path()) {
                    found.push(entry.into_path());
                }
            }
            found.sort();

            for file in found {
                if seen.insert(file.clone()) {
                    files.push(file);
                }
            }
        } else if seen.insert(path.to_path_buf()) {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_tabular() {
        assert!(is_tabular(Path::new("a.csv")));
        assert!(is_tabular(Path::new("dir/B.CSV")));
        assert!(!is_tabular(Path::new("notes.txt")));
        assert!(!is_tabular(Path::new("csv")));
    }

    #[test]
    fn test_files_keep_given_order() {
        let inputs = collect_inputs(&["z.csv", "a.csv", "m.csv"]).unwrap();
        assert_eq!(
            inputs,
            vec![
                PathBuf::from("z.csv"),
                PathBuf::from("a.csv"),
                PathBuf::from("m.csv")
            ]
        );
    }

    #[test]
    fn test_directory_expands_in_place_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("batch");
        fs::create_dir_all(sub.join("nested")).unwrap();
        fs::write(sub.join("b.csv"), "x").unwrap();
        fs::write(sub.join("a.csv"), "x").unwrap();
        fs::write(sub.join("readme.txt"), "x").unwrap();
        fs::write(sub.join("nested").join("c.csv"), "x").unwrap();

        let first = dir.path().join("first.csv");
        let inputs = collect_inputs(&[first.clone(), sub.clone()]).unwrap();

        assert_eq!(
            inputs,
            vec![
                first,
                sub.join("a.csv"),
                sub.join("b.csv"),
                sub.join("nested").join("c.csv"),
            ]
        );
    }

    #[test]
    fn test_duplicates_keep_first_position() {
        let inputs = collect_inputs(&["a.csv", "b.csv", "a.csv"]).unwrap();
        assert_eq!(inputs, vec![PathBuf::from("a.csv"), PathBuf::from("b.csv")]);
    }
}

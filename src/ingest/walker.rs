use walkdir::WalkDir;
use std::path::{Path, PathBuf};
use crate::error::{IngestError, Result};

/// A candidate input file in the intake directory
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Bare file name; the corpus-wide identity of the file
    pub name: String,
    pub path: PathBuf,
    pub file_size: u64,
}

/// Discover candidate files directly inside the intake directory.
///
/// Only the top level is scanned, so processed/snapshot directories nested
/// under intake are never picked up again. Files are returned sorted by name
/// so runs are reproducible.
pub fn discover_files(root: &Path, extensions: &[&str]) -> Result<Vec<SourceFile>> {
    if !root.is_dir() {
        return Err(IngestError::Config(format!(
            "intake directory does not exist: {}",
            root.display()
        )));
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }

        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        if !extensions.contains(&extension.as_str()) {
            log::debug!("Ignoring {}", path.display());
            continue;
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            log::warn!("Skipping file with non UTF-8 name: {}", path.display());
            continue;
        };

        files.push(SourceFile {
            name: name.to_string(),
            path: path.to_path_buf(),
            file_size: entry.metadata().map(|m| m.len()).unwrap_or(0),
        });
    }

    // sort_by_file_name compares OsStr; make the order explicit on the String names
    files.sort_by(|a, b| a.name.cmp(&b.name));

    log::info!("Discovered {} files in {}", files.len(), root.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use std::fs;

    #[test]
    fn test_discover_files_sorted_top_level_only() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("processed")).unwrap();
        fs::write(root.join("R2.json"), "{}").unwrap();
        fs::write(root.join("R10.nc"), b"CDF").unwrap();
        fs::write(root.join("A1.JSON"), "{}").unwrap();
        fs::write(root.join("notes.txt"), "ignore me").unwrap();
        fs::write(root.join("processed/R0.json"), "{}").unwrap();

        let files = discover_files(root, &["nc", "json"]).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();

        assert_eq!(names, vec!["A1.JSON", "R10.nc", "R2.json"]);
        assert_eq!(files[1].file_size, 3);
    }

    #[test]
    fn test_discover_files_empty() {
        let temp_dir = TempDir::new().unwrap();
        let files = discover_files(temp_dir.path(), &["json"]).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_missing_intake_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = discover_files(&temp_dir.path().join("absent"), &["json"]);
        assert!(matches!(result, Err(IngestError::Config(_))));
    }
}

// src/util.rs

use anyhow::{Context, Result};
use std::path::Path;

/// Read a UTF-8 file into a String with a clear error message.
///
/// Used for source files, stdin files and config.
pub fn read_to_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read file {:?}", path))
}

/// Ensure a directory exists (create it if missing).
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory {:?}", path))
}

/// Write `contents` to `path`, creating parent directories as needed.
pub fn write_output_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }

    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write output file {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_into_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/nested/session.json");

        write_output_file(&path, "{}").unwrap();
        assert_eq!(read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn missing_file_error_names_the_path() {
        let err = read_to_string(Path::new("/no/such/file.py")).unwrap_err();
        assert!(err.to_string().contains("file.py"));
    }
}

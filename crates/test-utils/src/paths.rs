//! Locations of the shipped configuration and scratch copies of fixtures.

use std::fs;
use std::path::{Path, PathBuf};

/// Workspace `config/` directory, located from this crate's manifest.
fn config_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config")
}

/// The shipped `regional_fc_definitions.yaml`.
pub fn shipped_definitions_path() -> PathBuf {
    config_dir().join("regional_fc_definitions.yaml")
}

/// The shipped `retriever.yaml`.
pub fn retriever_config_path() -> PathBuf {
    config_dir().join("retriever.yaml")
}

/// Write a definitions document into `dir` and return its path.
pub fn write_definitions(dir: &Path, document: &str) -> PathBuf {
    let path = dir.join("definitions.yaml");
    fs::write(&path, document).expect("Failed to write definitions fixture");
    path
}

/// Temporary directory removed when dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::definitions::{MINIMAL, SHIPPED};

    #[test]
    fn test_shipped_files_exist() {
        assert_eq!(fs::read_to_string(shipped_definitions_path()).unwrap(), SHIPPED);
        assert!(retriever_config_path().exists());
    }

    #[test]
    fn test_write_definitions() {
        let dir = temp_test_dir();
        let path = write_definitions(dir.path(), MINIMAL);
        assert_eq!(fs::read_to_string(path).unwrap(), MINIMAL);
    }
}

//! Disk usage accounting for workflow directories.

use crate::error::{OrchestratorError, OrchestratorResult};
use std::path::Path;
use uuid::Uuid;
use walkdir::WalkDir;

/// Total size in bytes of the regular files under `root`.
///
/// Entries that vanish or cannot be read while walking are skipped.
pub fn directory_size(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

/// Checks that a write of `incoming` bytes may proceed.
///
/// Fails once the directory has reached the ceiling, or when the incoming
/// bytes would push it past the ceiling. `None` means unlimited.
pub fn ensure_capacity(
    workflow_id: Uuid,
    root: &Path,
    ceiling_bytes: Option<u64>,
    incoming: u64,
) -> OrchestratorResult<u64> {
    let used_bytes = directory_size(root);

    if let Some(ceiling_bytes) = ceiling_bytes {
        if used_bytes >= ceiling_bytes || used_bytes.saturating_add(incoming) > ceiling_bytes {
            return Err(OrchestratorError::QuotaExceeded {
                workflow_id,
                used_bytes,
                ceiling_bytes,
            });
        }
    }

    Ok(used_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_directory_size_counts_nested_files() {
        let dir = tempdir().expect("Failed to create temp dir");
        std::fs::create_dir_all(dir.path().join("md")).expect("mkdir");
        std::fs::write(dir.path().join("a.gro"), vec![0u8; 100]).expect("write");
        std::fs::write(dir.path().join("md/md.xtc"), vec![0u8; 250]).expect("write");

        assert_eq!(directory_size(dir.path()), 350);
    }

    #[test]
    fn test_ceiling_blocks_at_and_over_limit() {
        let dir = tempdir().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("big.trr"), vec![0u8; 1024]).expect("write");
        let id = Uuid::new_v4();

        assert!(ensure_capacity(id, dir.path(), None, 10_000).is_ok());
        assert!(ensure_capacity(id, dir.path(), Some(4096), 0).is_ok());
        assert!(matches!(
            ensure_capacity(id, dir.path(), Some(1024), 0),
            Err(OrchestratorError::QuotaExceeded { used_bytes: 1024, .. })
        ));
        assert!(ensure_capacity(id, dir.path(), Some(2048), 2000).is_err());
    }
}

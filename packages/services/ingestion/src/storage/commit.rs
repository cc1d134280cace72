use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::handlers::CsvHandler;
use crate::models::*;
use crate::storage::sync_dir;

#[cfg(unix)]
const EXDEV: i32 = 18;
// Mode for a dataset written where none existed before
#[cfg(unix)]
const NEW_DATASET_MODE: u32 = 0o644;

#[derive(Debug, Clone, PartialEq)]
pub struct CommitReport {
    pub path: PathBuf,
    pub rows: usize,
    pub columns: usize,
    pub bytes_written: u64,
}

/// Replaces the active dataset by writing a sibling temp file and renaming it into place.
/// Until the rename the previous file is untouched; output is always UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicCommit {
    csv: CsvHandler,
}

impl AtomicCommit {
    pub fn new(csv: CsvHandler) -> Self {
        Self { csv }
    }

    pub fn commit(&self, table: &Table, active_path: &Path) -> Result<CommitReport> {
        let dir = match active_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        // Same directory as the target, so the final rename stays on one volume
        let mut staged = tempfile::Builder::new()
            .prefix(".dataset-")
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        {
            let mut out = BufWriter::new(staged.as_file_mut());
            self.csv.write_table(table, &mut out)?;
            out.flush()?;
        }
        // The staged file starts out private; readers must see the same access as before
        if let Some(permissions) = target_permissions(active_path) {
            staged.as_file().set_permissions(permissions)?;
        }
        staged.as_file().sync_all()?;
        let bytes_written = staged.as_file().metadata()?.len();

        let staged_path = staged.path().to_path_buf();
        staged.persist(active_path).map_err(|e| {
            let err = e.error;
            if is_cross_device(&err) {
                IngestionError::Commit(format!(
                    "atomic rename is not possible from {} to {} (different volumes); the previous dataset was kept",
                    staged_path.display(),
                    active_path.display()
                ))
            } else {
                IngestionError::Commit(format!(
                    "failed to move new dataset into {}: {}",
                    active_path.display(),
                    err
                ))
            }
        })?;
        sync_dir(&dir)?;

        tracing::info!(
            path = %active_path.display(),
            rows = table.row_count(),
            columns = table.column_count(),
            bytes = bytes_written,
            "Committed new active dataset"
        );

        Ok(CommitReport {
            path: active_path.to_path_buf(),
            rows: table.row_count(),
            columns: table.column_count(),
            bytes_written,
        })
    }
}

fn target_permissions(active_path: &Path) -> Option<fs::Permissions> {
    match fs::metadata(active_path) {
        Ok(meta) if meta.is_file() => Some(meta.permissions()),
        _ => new_dataset_permissions(),
    }
}

#[cfg(unix)]
fn new_dataset_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(NEW_DATASET_MODE))
}

#[cfg(not(unix))]
fn new_dataset_permissions() -> Option<fs::Permissions> {
    None
}

fn is_cross_device(err: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(EXDEV)
    }
    #[cfg(not(unix))]
    {
        let _ = err;
        false
    }
}

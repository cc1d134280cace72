pub mod backup;
pub mod commit;

pub use backup::*;
pub use commit::*;

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::config::running_in_container;
use crate::handlers::{CsvHandler, ACTIVE_ENCODINGS};
use crate::models::*;

/// The active dataset slot plus the in-memory copy readers are served from.
#[derive(Clone)]
pub struct DatasetStore {
    active_path: PathBuf,
    container_marker: PathBuf,
    csv: CsvHandler,
    cache: Arc<RwLock<Option<Arc<Table>>>>,
}

impl DatasetStore {
    pub fn new(active_path: impl Into<PathBuf>, csv: CsvHandler) -> Self {
        Self {
            active_path: active_path.into(),
            container_marker: PathBuf::from("/.dockerenv"),
            csv,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_container_marker(mut self, marker: impl Into<PathBuf>) -> Self {
        self.container_marker = marker.into();
        self
    }

    pub fn active_path(&self) -> &Path {
        &self.active_path
    }

    pub fn exists(&self) -> bool {
        self.active_path.is_file()
    }

    /// Returns the cached table, reading the file on first use or after `invalidate`.
    pub fn load(&self) -> Result<Arc<Table>> {
        if let Ok(guard) = self.cache.read() {
            if let Some(table) = guard.as_ref() {
                return Ok(table.clone());
            }
        }
        let table = Arc::new(self.read_uncached()?);
        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(table.clone());
        }
        tracing::info!(
            path = %self.active_path.display(),
            rows = table.row_count(),
            columns = table.column_count(),
            "Loaded active dataset"
        );
        Ok(table)
    }

    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.cache.write() {
            *guard = None;
        }
    }

    pub fn is_cached(&self) -> bool {
        self.cache.read().map(|g| g.is_some()).unwrap_or(false)
    }

    pub fn read_uncached(&self) -> Result<Table> {
        let (table, _) = self.csv.read_path(&self.active_path, ACTIVE_ENCODINGS)?;
        Ok(table)
    }

    /// Metadata for the operator view. Read errors are reported in the status.
    pub fn status(&self, backups: &BackupManager) -> DatasetStatus {
        let filename = self
            .active_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let environment = if running_in_container(&self.container_marker) {
            DeploymentEnvironment::Container
        } else {
            DeploymentEnvironment::Local
        };
        let backup_count = match backups.list() {
            Ok(list) => list.len(),
            Err(e) => {
                tracing::warn!(dir = %backups.dir().display(), error = %e, "Failed to list backups");
                0
            }
        };

        let mut status = DatasetStatus {
            path: self.active_path.clone(),
            filename,
            exists: false,
            rows: None,
            columns: None,
            column_names: Vec::new(),
            size_bytes: None,
            modified_at: None,
            environment,
            backup_dir: backups.dir().to_path_buf(),
            backup_count,
            read_error: None,
        };

        let meta = match std::fs::metadata(&self.active_path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                status.read_error = Some("No data file found".to_string());
                return status;
            }
            Err(e) => {
                status.read_error = Some(e.to_string());
                return status;
            }
        };
        status.exists = true;
        status.size_bytes = Some(meta.len());
        status.modified_at = meta.modified().ok().map(DateTime::<Utc>::from);

        match self.read_uncached() {
            Ok(table) => {
                status.rows = Some(table.row_count());
                status.columns = Some(table.column_count());
                status.column_names = table.columns;
            }
            Err(e) => status.read_error = Some(e.to_string()),
        }
        status
    }
}

/// Flushes directory entries so a rename or new file survives a crash.
pub(crate) fn sync_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        std::fs::File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_is_refreshed_after_invalidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "Area,Value\nKenya,1\n").unwrap();
        let store = DatasetStore::new(&path, CsvHandler::new());

        assert_eq!(store.load().unwrap().row_count(), 1);
        std::fs::write(&path, "Area,Value\nKenya,1\nChad,2\n").unwrap();
        // still the cached copy
        assert_eq!(store.load().unwrap().row_count(), 1);

        store.invalidate();
        assert!(!store.is_cached());
        assert_eq!(store.load().unwrap().row_count(), 2);
    }

    #[test]
    fn status_of_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::new(dir.path().join("absent.csv"), CsvHandler::new());
        let backups = BackupManager::new(dir.path().join("backups"));
        let status = store.status(&backups);
        assert!(!status.exists);
        assert_eq!(status.rows, None);
        assert_eq!(status.read_error.as_deref(), Some("No data file found"));
        assert_eq!(status.backup_count, 0);
    }

    #[test]
    fn status_reports_shape_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("FS_selection.csv");
        let contents = "Area,Year,Value\nKenya,2020,1\nChad,2021,2\n";
        std::fs::write(&path, contents).unwrap();
        let store = DatasetStore::new(&path, CsvHandler::new())
            .with_container_marker(dir.path().join("no-marker"));
        let status = store.status(&BackupManager::new(dir.path().join("backups")));
        assert!(status.exists);
        assert_eq!(status.filename, "FS_selection.csv");
        assert_eq!(status.rows, Some(2));
        assert_eq!(status.columns, Some(3));
        assert_eq!(status.size_bytes, Some(contents.len() as u64));
        assert_eq!(status.environment, DeploymentEnvironment::Local);
        assert!(status.modified_at.is_some());
    }
}

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::models::*;
use crate::storage::sync_dir;

const BACKUP_PREFIX: &str = "backup_";
// Fixed width so that name order is time order
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";
const TIMESTAMP_LEN: usize = 22;
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Append-only store of copies of previous active datasets.
#[derive(Debug, Clone)]
pub struct BackupManager {
    backup_dir: PathBuf,
}

impl BackupManager {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self { backup_dir: backup_dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn backup_name(timestamp: DateTime<Utc>, source_filename: &str) -> String {
        format!("{}{}_{}", BACKUP_PREFIX, timestamp.format(TIMESTAMP_FORMAT), source_filename)
    }

    /// Copies the active file into the backup store and flushes it to disk.
    /// Returns `NothingToBackup` when there is no active file yet.
    pub fn backup(&self, active_path: &Path) -> Result<BackupId> {
        let source_meta = match fs::metadata(active_path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %active_path.display(), "No active dataset yet; nothing to back up");
                return Ok(BackupId::NothingToBackup);
            }
            Err(e) => return Err(e.into()),
        };
        if !source_meta.is_file() {
            return Err(IngestionError::Backup(format!(
                "{} is not a regular file",
                active_path.display()
            )));
        }
        let source_filename = active_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| IngestionError::Backup(format!("{} has no file name", active_path.display())))?;

        fs::create_dir_all(&self.backup_dir)?;
        let (created_at, name, path, mut target) = self.create_unique(&source_filename)?;

        let copied = (|| -> Result<u64> {
            let mut source = File::open(active_path)?;
            let copied = io::copy(&mut source, &mut target)?;
            if copied != source_meta.len() {
                return Err(IngestionError::Backup(format!(
                    "copied {} bytes but source has {}",
                    copied,
                    source_meta.len()
                )));
            }
            if let Ok(modified) = source_meta.modified() {
                target.set_modified(modified)?;
            }
            target.sync_all()?;
            Ok(copied)
        })();

        let size_bytes = match copied {
            Ok(n) => n,
            Err(e) => {
                // An incomplete copy is not a backup
                drop(target);
                let _ = fs::remove_file(&path);
                tracing::error!(backup = %name, error = %e, "Backup copy failed");
                return Err(e);
            }
        };
        drop(target);

        let mut perms = fs::metadata(&path)?.permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms)?;
        sync_dir(&self.backup_dir)?;

        tracing::info!(
            backup = %name,
            source = %active_path.display(),
            size_bytes = size_bytes,
            "Created dataset backup"
        );

        Ok(BackupId::Created(BackupRecord {
            name,
            path,
            source_filename,
            created_at,
            size_bytes,
        }))
    }

    /// Opens a fresh backup file. A name collision moves the timestamp forward one
    /// microsecond so ordering by name stays chronological and nothing is overwritten.
    fn create_unique(&self, source_filename: &str) -> Result<(DateTime<Utc>, String, PathBuf, File)> {
        let mut timestamp = Utc::now();
        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = Self::backup_name(timestamp, source_filename);
            let path = self.backup_dir.join(&name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((timestamp, name, path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    timestamp += Duration::microseconds(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(IngestionError::Backup(format!(
            "could not find a free backup name in {}",
            self.backup_dir.display()
        )))
    }

    /// Existing backups, oldest first.
    pub fn list(&self) -> Result<Vec<BackupRecord>> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some((created_at, source_filename)) = parse_backup_name(&name) else {
                continue;
            };
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            records.push(BackupRecord {
                path: entry.path(),
                name,
                source_filename,
                created_at,
                size_bytes: meta.len(),
            });
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    /// Existing backups, newest first, optionally capped at `limit`.
    pub fn list_recent(&self, limit: Option<usize>) -> Result<Vec<BackupRecord>> {
        let mut records = self.list()?;
        records.reverse();
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}

fn parse_backup_name(name: &str) -> Option<(DateTime<Utc>, String)> {
    let rest = name.strip_prefix(BACKUP_PREFIX)?;
    if rest.len() <= TIMESTAMP_LEN + 1 || !rest.is_char_boundary(TIMESTAMP_LEN) {
        return None;
    }
    let (stamp, tail) = rest.split_at(TIMESTAMP_LEN);
    let source_filename = tail.strip_prefix('_')?.to_string();

    // YYYYMMDD_HHMMSS_ffffff
    let date = NaiveDate::parse_from_str(stamp.get(0..8)?, "%Y%m%d").ok()?;
    let time = chrono::NaiveTime::parse_from_str(stamp.get(9..15)?, "%H%M%S").ok()?;
    let micros: i64 = stamp.get(16..22)?.parse().ok()?;
    let naive = NaiveDateTime::new(date, time) + Duration::microseconds(micros);
    Some((naive.and_utc(), source_filename))
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const NOTHING_TO_BACK_UP: &str = "No existing file to backup";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub name: String,
    pub path: PathBuf,
    pub source_filename: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BackupId {
    NothingToBackup,
    Created(BackupRecord),
}

impl BackupId {
    pub fn label(&self) -> &str {
        match self {
            BackupId::NothingToBackup => NOTHING_TO_BACK_UP,
            BackupId::Created(record) => &record.name,
        }
    }

    pub fn record(&self) -> Option<&BackupRecord> {
        match self {
            BackupId::NothingToBackup => None,
            BackupId::Created(record) => Some(record),
        }
    }
}

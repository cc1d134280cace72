use serde::{Deserialize, Serialize};

use crate::models::{BackupId, TextEncoding};

/// Linear ingestion state machine. An outcome records the last stage reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IngestionStage {
    Received,
    Authorized,
    Decoded,
    Validated,
    BackedUp,
    Committed,
    ReloadRequested,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionKind {
    Unauthorized,
    DecodeFailure,
    SchemaViolation,
    QualityViolation,
    BackupFailure,
    CommitFailure,
}

impl RejectionKind {
    /// Validation outcomes are the caller's fault; backup/commit faults are the environment's.
    pub fn is_environment_fault(&self) -> bool {
        matches!(self, RejectionKind::BackupFailure | RejectionKind::CommitFailure)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadStatus {
    pub coordinator: String,
    pub attempted: bool,
    pub succeeded: bool,
    pub message: String,
}

impl ReloadStatus {
    pub fn not_attempted(coordinator: &str, message: impl Into<String>) -> Self {
        Self {
            coordinator: coordinator.to_string(),
            attempted: false,
            succeeded: false,
            message: message.into(),
        }
    }

    pub fn requested(coordinator: &str, message: impl Into<String>) -> Self {
        Self {
            coordinator: coordinator.to_string(),
            attempted: true,
            succeeded: true,
            message: message.into(),
        }
    }

    pub fn failed(coordinator: &str, message: impl Into<String>) -> Self {
        Self {
            coordinator: coordinator.to_string(),
            attempted: true,
            succeeded: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub upload_id: String,
    pub filename: String,
    pub success: bool,
    pub stage: IngestionStage,
    pub rejection: Option<RejectionKind>,
    pub message: String,
    pub diagnostics: Vec<String>,
    pub encoding: Option<TextEncoding>,
    pub rows: Option<usize>,
    pub columns: Option<usize>,
    pub backup: Option<BackupId>,
    pub reload: Option<ReloadStatus>,
}

impl UploadOutcome {
    pub fn received(upload_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            upload_id: upload_id.into(),
            filename: filename.into(),
            success: false,
            stage: IngestionStage::Received,
            rejection: None,
            message: String::new(),
            diagnostics: Vec::new(),
            encoding: None,
            rows: None,
            columns: None,
            backup: None,
            reload: None,
        }
    }

    pub fn advance(&mut self, stage: IngestionStage) {
        debug_assert!(stage > self.stage, "ingestion stages only move forward");
        self.stage = stage;
    }

    pub fn reject(
        mut self,
        kind: RejectionKind,
        message: impl Into<String>,
        diagnostics: Vec<String>,
    ) -> Self {
        self.success = false;
        self.rejection = Some(kind);
        self.message = message.into();
        self.diagnostics.extend(diagnostics);
        self
    }

    pub fn finish(mut self, message: impl Into<String>) -> Self {
        self.stage = IngestionStage::Done;
        self.success = true;
        self.message = message.into();
        self
    }

    pub fn is_rejected(&self) -> bool {
        self.rejection.is_some()
    }
}

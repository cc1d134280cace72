use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::clients::*;
use crate::config::Config;
use crate::handlers::*;
use crate::models::*;
use crate::processing::*;
use crate::storage::*;

/// Runs one upload through gate, decode, validation, backup, commit and reload.
#[derive(Clone)]
pub struct IngestionEngine {
    gate: Arc<AccessGate>,
    csv: CsvHandler,
    validator: SchemaValidator,
    pub(crate) store: DatasetStore,
    pub(crate) backups: BackupManager,
    committer: AtomicCommit,
    reload: Arc<dyn ReloadCoordinator>,
    // Held from before the access check until the commit finishes or the upload is rejected
    writer_lock: Arc<Mutex<()>>,
}

impl IngestionEngine {
    pub fn new(cfg: &Config) -> Self {
        let csv = CsvHandler::with_delimiter(cfg.csv_delimiter);
        let store = DatasetStore::new(cfg.active_dataset_path.clone(), csv)
            .with_container_marker(cfg.container_marker.clone());
        let reload = coordinator_from_config(cfg, &store);
        Self {
            gate: Arc::new(AccessGate::new(&cfg.admin_password)),
            csv,
            validator: SchemaValidator::from_config(cfg),
            store,
            backups: BackupManager::new(cfg.backup_dir.clone()),
            committer: AtomicCommit::new(csv),
            reload,
            writer_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_reload_coordinator(mut self, reload: Arc<dyn ReloadCoordinator>) -> Self {
        self.reload = reload;
        self
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn status(&self) -> DatasetStatus {
        self.store.status(&self.backups)
    }

    pub async fn ingest(&self, request: UploadRequest) -> UploadOutcome {
        let upload_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("upload", upload_id = %upload_id, filename = %request.filename);
        self.run(upload_id, request).instrument(span).await
    }

    async fn run(&self, upload_id: String, request: UploadRequest) -> UploadOutcome {
        let start_time = Instant::now();
        let UploadRequest { filename, body, secret } = request;
        let writer_guard = self.writer_lock.lock().await;
        let mut outcome = UploadOutcome::received(upload_id, filename.clone());

        if !self.gate.authorize(&secret) {
            tracing::warn!("Upload rejected: incorrect password");
            return outcome.reject(RejectionKind::Unauthorized, "Incorrect password!", Vec::new());
        }
        outcome.advance(IngestionStage::Authorized);

        // STAGE: decode
        let payload = match body.into_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Upload payload could not be unwrapped");
                return outcome.reject(RejectionKind::DecodeFailure, "Error reading uploaded file.", vec![e.to_string()]);
            }
        };
        let (table, encoding) = match self.csv.decode(&payload.bytes, UPLOAD_ENCODINGS) {
            Ok(decoded) => decoded,
            Err(failure) => {
                tracing::warn!(error = %failure, "Upload could not be decoded");
                return outcome.reject(RejectionKind::DecodeFailure, failure.message(), failure.diagnostics());
            }
        };
        outcome.encoding = Some(encoding);
        outcome.rows = Some(table.row_count());
        outcome.columns = Some(table.column_count());
        outcome.advance(IngestionStage::Decoded);

        // STAGE: validate
        let mut candidate = CandidateDataset::new(filename, encoding, table);
        let validation = self.validator.validate(&candidate.table);
        candidate.validation = Some(validation.clone());
        if let Some(failure) = &validation.failure {
            tracing::warn!(reason = %validation.reason, "Upload failed validation");
            return outcome.reject(
                failure.kind(),
                format!("Validation Error: {}", validation.reason),
                failure.diagnostics(),
            );
        }
        if let Some(pct) = validation.max_missing_pct {
            outcome.diagnostics.push(format!("Highest missing-value ratio: {:.1}%", pct));
        }
        outcome.advance(IngestionStage::Validated);

        // STAGE: backup. No commit without a safety copy.
        let backup = match self.backups.backup(self.store.active_path()) {
            Ok(backup) => backup,
            Err(e) => {
                tracing::error!(error = %e, "Backup failed; active dataset left unchanged");
                return outcome.reject(
                    RejectionKind::BackupFailure,
                    "Backup of the current dataset failed; nothing was replaced.",
                    vec![e.to_string()],
                );
            }
        };
        outcome.diagnostics.push(format!("Backup created: {}", backup.label()));
        outcome.backup = Some(backup);
        outcome.advance(IngestionStage::BackedUp);

        // STAGE: commit
        if let Err(e) = self.committer.commit(&candidate.table, self.store.active_path()) {
            tracing::error!(error = %e, "Commit failed; previous dataset remains active");
            return outcome.reject(
                RejectionKind::CommitFailure,
                "Writing the new dataset failed; the previous dataset remains active.",
                vec![e.to_string()],
            );
        }
        outcome.advance(IngestionStage::Committed);
        drop(writer_guard);

        // STAGE: reload. The dataset is already safe, so this never fails the upload.
        let reload = self.reload.reload().await;
        if !reload.attempted {
            outcome.diagnostics.push(reload.message.clone());
        }
        tracing::info!(
            coordinator = %reload.coordinator,
            attempted = reload.attempted,
            succeeded = reload.succeeded,
            "Reload requested"
        );
        outcome.reload = Some(reload);
        outcome.advance(IngestionStage::ReloadRequested);

        tracing::info!(
            rows = candidate.table.row_count(),
            columns = candidate.table.column_count(),
            encoding = %candidate.encoding,
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Upload completed successfully"
        );
        outcome.finish("Upload Successful!")
    }

    /// Decode and validate without touching the active dataset.
    pub fn check(&self, filename: &str, bytes: &[u8]) -> UploadOutcome {
        let mut outcome = UploadOutcome::received(Uuid::new_v4().to_string(), filename);
        let (table, encoding) = match self.csv.decode(bytes, UPLOAD_ENCODINGS) {
            Ok(decoded) => decoded,
            Err(failure) => {
                return outcome.reject(RejectionKind::DecodeFailure, failure.message(), failure.diagnostics());
            }
        };
        outcome.encoding = Some(encoding);
        outcome.rows = Some(table.row_count());
        outcome.columns = Some(table.column_count());

        let validation = self.validator.validate(&table);
        match &validation.failure {
            Some(failure) => outcome.reject(
                failure.kind(),
                format!("Validation Error: {}", validation.reason),
                failure.diagnostics(),
            ),
            None => {
                outcome.stage = IngestionStage::Validated;
                outcome.success = true;
                outcome.message = validation.reason;
                outcome
            }
        }
    }
}

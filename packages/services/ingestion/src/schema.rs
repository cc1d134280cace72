use async_graphql::{Context, EmptySubscription, Json, Object, Result as GraphQLResult, Schema};
use chrono::{DateTime, Utc};

use crate::handlers::UploadRequest;
use crate::models::*;
use crate::pipeline::IngestionEngine;

pub type IngestionSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub fn build_schema(engine: IngestionEngine) -> IngestionSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(engine)
        .finish()
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Metadata about the dataset the dashboard currently serves
    async fn dataset_status(&self, ctx: &Context<'_>) -> GraphQLResult<DatasetStatus> {
        let engine = ctx.data::<IngestionEngine>()?;
        Ok(engine.status())
    }

    /// Backups of previous datasets, newest first
    async fn backups(&self, ctx: &Context<'_>, limit: Option<i32>) -> GraphQLResult<Vec<BackupRecord>> {
        let engine = ctx.data::<IngestionEngine>()?;
        let records = engine.backups().list_recent(limit.map(|l| l.max(0) as usize))?;
        Ok(records)
    }

    /// Health check
    async fn health(&self) -> GraphQLResult<String> {
        Ok("OK".to_string())
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Replace the active dataset. `contents` is base64 or a `data:` URL as produced by a browser upload widget.
    async fn upload_dataset(
        &self,
        ctx: &Context<'_>,
        filename: String,
        contents: String,
        password: String,
    ) -> GraphQLResult<UploadOutcome> {
        let engine = ctx.data::<IngestionEngine>()?;
        let outcome = engine
            .ingest(UploadRequest::encoded(filename, contents, password))
            .await;
        Ok(outcome)
    }
}

// Convert domain models to GraphQL objects

#[Object]
impl UploadOutcome {
    async fn upload_id(&self) -> &str {
        &self.upload_id
    }

    async fn filename(&self) -> &str {
        &self.filename
    }

    async fn success(&self) -> bool {
        self.success
    }

    async fn stage(&self) -> Json<serde_json::Value> {
        Json(serde_json::to_value(self.stage).unwrap_or(serde_json::Value::Null))
    }

    async fn rejection(&self) -> Option<Json<serde_json::Value>> {
        self.rejection
            .map(|kind| Json(serde_json::to_value(kind).unwrap_or(serde_json::Value::Null)))
    }

    async fn message(&self) -> &str {
        &self.message
    }

    async fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    async fn encoding(&self) -> Option<&str> {
        self.encoding.as_ref().map(|e| e.label())
    }

    async fn rows(&self) -> Option<i32> {
        self.rows.map(|r| r as i32)
    }

    async fn columns(&self) -> Option<i32> {
        self.columns.map(|c| c as i32)
    }

    /// Backup name, or "No existing file to backup"
    async fn backup(&self) -> Option<&str> {
        self.backup.as_ref().map(|b| b.label())
    }

    async fn reload(&self) -> Option<Json<serde_json::Value>> {
        self.reload
            .as_ref()
            .map(|r| Json(serde_json::to_value(r).unwrap_or(serde_json::Value::Null)))
    }
}

#[Object]
impl DatasetStatus {
    async fn path(&self) -> String {
        self.path.display().to_string()
    }

    async fn filename(&self) -> &str {
        &self.filename
    }

    async fn exists(&self) -> bool {
        self.exists
    }

    async fn rows(&self) -> Option<i32> {
        self.rows.map(|r| r as i32)
    }

    async fn columns(&self) -> Option<i32> {
        self.columns.map(|c| c as i32)
    }

    async fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[graphql(name = "sizeKb")]
    async fn gql_size_kb(&self) -> Option<f64> {
        self.size_kb()
    }

    async fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_at
    }

    async fn environment(&self) -> Json<serde_json::Value> {
        Json(serde_json::to_value(self.environment).unwrap_or(serde_json::Value::Null))
    }

    async fn backup_dir(&self) -> String {
        self.backup_dir.display().to_string()
    }

    async fn backup_count(&self) -> i32 {
        self.backup_count as i32
    }

    async fn read_error(&self) -> Option<&str> {
        self.read_error.as_deref()
    }
}

#[Object]
impl BackupRecord {
    async fn name(&self) -> &str {
        &self.name
    }

    async fn source_filename(&self) -> &str {
        &self.source_filename
    }

    async fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    async fn size_bytes(&self) -> i64 {
        self.size_bytes as i64
    }
}

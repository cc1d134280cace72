use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query},
    http::{header, HeaderMap, Method, Request, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};

use crate::config::Config;
use crate::handlers::{UploadBody, UploadRequest};
use crate::models::*;
use crate::pipeline::IngestionEngine;
use crate::schema::{build_schema, IngestionSchema};

pub const ADMIN_PASSWORD_HEADER: &str = "x-admin-password";
const DEFAULT_UPLOAD_NAME: &str = "upload.csv";
// Room for the query text and variables around the encoded file
const GRAPHQL_ENVELOPE_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub filename: Option<String>,
}

pub fn build_router(engine: IngestionEngine, cfg: &Config) -> Router {
    let schema = build_schema(engine.clone());

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route(
            "/graphql",
            get(graphql_playground)
                .post(graphql_handler)
                .layer(RequestBodyLimitLayer::new(graphql_body_limit(cfg))),
        )
        .route("/health", get(health_check))
        .route("/admin/dataset", post(upload_dataset))
        .route("/admin/dataset/status", get(dataset_status))
        .route("/admin/backups", get(list_backups))
        .layer(Extension(schema))
        .layer(Extension(engine))
        .layer(DefaultBodyLimit::max(cfg.max_upload_bytes()))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .on_request(DefaultOnRequest::new().level(tracing::Level::INFO))
                .on_response(DefaultOnResponse::new().level(tracing::Level::INFO))
                .make_span_with(|req: &Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.path = %req.uri().path(),
                    )
                }),
        )
}

/// `uploadDataset` carries the file base64-encoded, which is 4/3 of the raw size.
pub fn graphql_body_limit(cfg: &Config) -> usize {
    cfg.max_upload_bytes()
        .saturating_mul(4)
        .saturating_div(3)
        .saturating_add(GRAPHQL_ENVELOPE_BYTES)
}

async fn graphql_playground() -> Html<String> {
    Html(async_graphql::http::playground_source(
        async_graphql::http::GraphQLPlaygroundConfig::new("/graphql"),
    ))
}

async fn graphql_handler(
    Extension(schema): Extension<IngestionSchema>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}

async fn health_check() -> &'static str {
    "OK"
}

/// Raw CSV upload. The body is the file; the secret travels in a header.
async fn upload_dataset(
    Extension(engine): Extension<IngestionEngine>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let secret = headers
        .get(ADMIN_PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let filename = params
        .filename
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_string());

    let request = UploadRequest {
        filename,
        body: UploadBody::Raw { bytes: body.to_vec(), content_type },
        secret,
    };
    let outcome = engine.ingest(request).await;
    (status_for(&outcome), Json(outcome)).into_response()
}

async fn dataset_status(Extension(engine): Extension<IngestionEngine>) -> Json<DatasetStatus> {
    Json(engine.status())
}

async fn list_backups(Extension(engine): Extension<IngestionEngine>) -> Response {
    match engine.backups().list_recent(None) {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list backups");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub fn status_for(outcome: &UploadOutcome) -> StatusCode {
    match outcome.rejection {
        None => StatusCode::OK,
        Some(RejectionKind::Unauthorized) => StatusCode::UNAUTHORIZED,
        Some(kind) if kind.is_environment_fault() => StatusCode::INTERNAL_SERVER_ERROR,
        Some(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

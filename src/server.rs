//! HTTP API server.
//!
//! Exposes the compliance pipeline over a JSON HTTP API: file uploads,
//! background analysis jobs, job status polling, and report retrieval.
//!
//! # Endpoints
//!
//! | Method   | Path | Description |
//! |----------|------|-------------|
//! | `POST`   | `/api/analysis` | Start a background analysis job |
//! | `GET`    | `/api/analysis/status/{job_id}` | Poll a job's status |
//! | `POST`   | `/api/files/sop` | Upload SOP documents (multipart) |
//! | `POST`   | `/api/files/regulatory` | Upload regulatory documents (multipart) |
//! | `GET`    | `/api/files/sop` | List stored SOP documents |
//! | `GET`    | `/api/files/regulatory` | List stored regulatory documents |
//! | `GET`    | `/api/reports` | List report summaries, newest first |
//! | `GET`    | `/api/reports/{job_id}` | Fetch one full report |
//! | `DELETE` | `/api/reports/{job_id}` | Delete a report and its status |
//! | `GET`    | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one shape:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Job not found: job_17" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::analyze::{allocate_job_id, run_analysis};
use crate::config::Config;
use crate::document::now_epoch;
use crate::files::{list_files, store_upload, FileKind, StoredFile, UploadOutcome};
use crate::index::VectorIndex;
use crate::llm::LlmService;
use crate::models::{JobState, JobStatus, Report, ReportSummary};
use crate::report::{delete_report, list_reports, load_report};
use crate::status::StatusStore;

/// Shared application state passed to all route handlers via Axum's
/// `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    index: Arc<VectorIndex>,
    llm: Arc<LlmService>,
    status: Arc<StatusStore>,
}

/// Starts the HTTP server.
///
/// Binds to `[server].bind`, opens the vector index, and serves until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    config.storage.ensure_dirs()?;

    let index = Arc::new(VectorIndex::open(config).await?);
    let state = AppState {
        config: Arc::new(config.clone()),
        index,
        llm: Arc::new(LlmService::new(&config.llm, &config.retrieval)),
        status: Arc::new(StatusStore::new(config)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Leave headroom above the per-file cap for multipart framing.
    let body_limit = state.config.server.max_upload_bytes.saturating_add(64 * 1024);

    let app = Router::new()
        .route("/api/analysis", post(handle_start_analysis))
        .route("/api/analysis/status/{job_id}", get(handle_analysis_status))
        .route("/api/files/sop", post(handle_upload_sop).get(handle_list_sop))
        .route(
            "/api/files/regulatory",
            post(handle_upload_regulatory).get(handle_list_regulatory),
        )
        .route("/api/reports", get(handle_list_reports))
        .route(
            "/api/reports/{job_id}",
            get(handle_get_report).delete(handle_delete_report),
        )
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state);

    info!("compliance server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/analysis ============

#[derive(Deserialize)]
struct AnalysisRequest {
    sop_file: String,
    regulatory_files: Vec<String>,
}

#[derive(Serialize)]
struct AnalysisResponse {
    job_id: String,
    status: JobState,
    message: String,
}

/// Validates that all referenced paths exist, allocates a job id, and
/// spawns the pipeline in the background. The processing status is
/// durable before the response goes out, so an immediate status poll
/// never sees an unknown job.
async fn handle_start_analysis(
    State(state): State<AppState>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let sop_path = std::path::PathBuf::from(&request.sop_file);
    if !sop_path.exists() {
        return Err(not_found(format!("SOP file not found: {}", request.sop_file)));
    }
    if request.regulatory_files.is_empty() {
        return Err(bad_request("regulatory_files must not be empty"));
    }
    let mut regulatory_paths = Vec::with_capacity(request.regulatory_files.len());
    for file in &request.regulatory_files {
        let path = std::path::PathBuf::from(file);
        if !path.exists() {
            return Err(not_found(format!("Regulatory file not found: {}", file)));
        }
        regulatory_paths.push(path);
    }

    let job_id = allocate_job_id();
    state
        .status
        .put(&job_id, JobStatus::processing(now_epoch()))
        .await
        .map_err(|e| internal(e.to_string()))?;

    let task_state = state.clone();
    let task_job_id = job_id.clone();
    tokio::spawn(async move {
        // Terminal status handling lives inside run_analysis.
        let _ = run_analysis(
            &task_state.config,
            &task_state.index,
            &task_state.llm,
            &task_state.status,
            &task_job_id,
            &sop_path,
            &regulatory_paths,
        )
        .await;
    });

    Ok(Json(AnalysisResponse {
        job_id,
        status: JobState::Processing,
        message: "Analysis started in background".to_string(),
    }))
}

// ============ GET /api/analysis/status/{job_id} ============

#[derive(Serialize)]
struct AnalysisStatusResponse {
    job_id: String,
    status: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<Report>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn handle_analysis_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<AnalysisStatusResponse>, AppError> {
    let status = state
        .status
        .get(&job_id)
        .await
        .ok_or_else(|| not_found(format!("Job not found: {}", job_id)))?;

    Ok(Json(AnalysisStatusResponse {
        job_id,
        status: status.status,
        report: status.result,
        error: status.error,
    }))
}

// ============ POST /api/files/{sop,regulatory} ============

#[derive(Serialize)]
struct UploadResponse {
    files: Vec<UploadOutcome>,
}

async fn handle_upload_sop(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    handle_upload(state, FileKind::Sop, multipart).await
}

async fn handle_upload_regulatory(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    handle_upload(state, FileKind::Regulatory, multipart).await
}

/// Stores every file part of the multipart body, reporting each part's
/// outcome individually. A rejected part never aborts the batch.
async fn handle_upload(
    state: AppState,
    kind: FileKind,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut outcomes = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {}", e)))?
    {
        let filename = match field.file_name() {
            Some(name) => name.to_string(),
            None => continue, // Non-file form field.
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed reading upload {}: {}", filename, e)))?;

        let outcome = store_upload(&state.config, kind, &filename, &bytes)
            .map_err(|e| internal(e.to_string()))?;
        info!(kind = kind.as_str(), file = %filename, "processed upload");
        outcomes.push(outcome);
    }

    if outcomes.is_empty() {
        return Err(bad_request("no file parts in upload"));
    }
    Ok(Json(UploadResponse { files: outcomes }))
}

// ============ GET /api/files/{sop,regulatory} ============

async fn handle_list_sop(
    State(state): State<AppState>,
) -> Result<Json<Vec<StoredFile>>, AppError> {
    list_files(&state.config, FileKind::Sop)
        .map(Json)
        .map_err(|e| internal(e.to_string()))
}

async fn handle_list_regulatory(
    State(state): State<AppState>,
) -> Result<Json<Vec<StoredFile>>, AppError> {
    list_files(&state.config, FileKind::Regulatory)
        .map(Json)
        .map_err(|e| internal(e.to_string()))
}

// ============ /api/reports ============

async fn handle_list_reports(
    State(state): State<AppState>,
) -> Result<Json<Vec<ReportSummary>>, AppError> {
    list_reports(&state.config)
        .map(Json)
        .map_err(|e| internal(e.to_string()))
}

async fn handle_get_report(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Report>, AppError> {
    load_report(&state.config, &job_id)
        .map_err(|e| internal(e.to_string()))?
        .map(Json)
        .ok_or_else(|| not_found(format!("Report not found: {}", job_id)))
}

#[derive(Serialize)]
struct DeleteResponse {
    job_id: String,
    deleted: bool,
}

async fn handle_delete_report(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let deleted = delete_report(&state.config, &job_id).map_err(|e| internal(e.to_string()))?;
    if !deleted {
        return Err(not_found(format!("Report not found: {}", job_id)));
    }
    state
        .status
        .remove(&job_id)
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(DeleteResponse {
        job_id,
        deleted: true,
    }))
}

/*!
 * HTTP surface.
 *
 * `POST /api/translate-csv` takes the CSV as the raw request body and answers
 * with an `application/x-ndjson` body carrying one progress event per line.
 * The run itself happens on a spawned task that owns the only
 * `ProgressStream`; the response body drains the other end of the channel.
 * Dropping the response (client disconnect) closes the channel and the run
 * stops at the next batch boundary. A panic inside the run still ends the
 * stream with an `error` event.
 */

use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use log::{error, info, warn};
use serde::Serialize;
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::database::Repository;
use crate::errors::{PipelineError, UploadError};
use crate::progress::{CompletionPayload, DEFAULT_CHANNEL_CAPACITY, ProgressEvent, ProgressStream, encode_line};
use crate::translation::batch::{BatchCoordinator, RunReport};
use crate::translation::models::SentenceRecord;
use crate::upload::parse_upload;

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Shared state of the server and the in-process runner
#[derive(Debug, Clone)]
pub struct AppState {
    pub coordinator: Arc<BatchCoordinator>,
    pub repository: Option<Repository>,
    pub max_upload_bytes: usize,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(coordinator: BatchCoordinator, repository: Option<Repository>, max_upload_bytes: usize) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            repository,
            max_upload_bytes,
            started_at: Utc::now(),
        }
    }

    /// Run the pipeline, store the result when persistence is on and send
    /// the terminal event.
    ///
    /// A request-level failure is reported as an `error` event; a failure to
    /// store the run is logged and the run still completes.
    pub async fn execute(
        &self,
        records: &[SentenceRecord],
        progress: &mut ProgressStream,
    ) -> Result<RunReport, PipelineError> {
        let report = match self.coordinator.run(records, progress).await {
            Ok(report) => report,
            Err(PipelineError::Cancelled) => {
                warn!("Translation run cancelled by the consumer");
                return Err(PipelineError::Cancelled);
            }
            Err(e) => {
                error!("Translation run failed: {}", e);
                progress.error(e.to_string()).await;
                return Err(e);
            }
        };

        let upload_batch_id = match &self.repository {
            Some(repository) => {
                let provider = self.coordinator.client().provider();
                match repository
                    .save_run(&report.outcomes, provider.name(), provider.model())
                    .await
                {
                    Ok(summary) => Some(summary.upload_batch_id),
                    Err(e) => {
                        error!("Failed to store translation run: {:#}", e);
                        None
                    }
                }
            }
            None => None,
        };

        progress
            .complete(CompletionPayload {
                results: report.outcomes.clone(),
                statistics: report.statistics.clone(),
                upload_batch_id,
            })
            .await;

        Ok(report)
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/translate-csv", post(translate_csv))
        .route("/api/model-info", get(model_info))
        .route("/api/health", get(health_check))
        .route("/api/batches", delete(clear_all_batches))
        .route("/api/batches/:id", get(batch_details).delete(clear_batch))
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

/// Serve until the process is stopped
pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

fn ndjson_response(status: StatusCode, body: Body) -> Response {
    (status, [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)], body).into_response()
}

fn upload_error_response(err: &UploadError) -> Response {
    warn!("Rejected upload: {}", err);
    let event = ProgressEvent::Error { error: err.to_string() };
    match encode_line(&event) {
        Ok(line) => ndjson_response(StatusCode::BAD_REQUEST, Body::from(line)),
        Err(e) => {
            error!("Failed to encode error event: {}", e);
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

/// POST /api/translate-csv
async fn translate_csv(State(state): State<AppState>, body: Body) -> Response {
    let bytes: Bytes = match axum::body::to_bytes(body, state.max_upload_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return upload_error_response(&UploadError::TooLarge {
                limit: state.max_upload_bytes,
            });
        }
    };

    let parsed = match parse_upload(&bytes, state.max_upload_bytes) {
        Ok(parsed) => parsed,
        Err(e) => return upload_error_response(&e),
    };

    info!(
        "Accepted upload with {} sentences ({} rows skipped)",
        parsed.records.len(),
        parsed.skipped.len()
    );

    let (mut progress, receiver) = ProgressStream::channel(DEFAULT_CHANNEL_CAPACITY);
    let runner = state.clone();
    tokio::spawn(async move {
        // Outcome is reported through the stream; only a panic needs handling here
        let run = AssertUnwindSafe(runner.execute(&parsed.records, &mut progress)).catch_unwind();
        if let Err(panic) = run.await {
            let failure = PipelineError::Internal(panic_message(panic.as_ref()));
            error!("Translation run aborted: {}", failure);
            progress.error(failure.to_string()).await;
        }
    });

    let lines = futures::stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await.map(|event| (encode_line(&event), receiver))
    });

    ndjson_response(StatusCode::OK, Body::from_stream(lines))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "translation task panicked".to_string())
}

/// Model information response
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub success: bool,
    pub provider: String,
    pub model_id: String,
    pub model_type: String,
    pub is_fine_tuned: bool,
    pub display_name: String,
}

impl ModelInfo {
    pub fn describe(provider: &str, model_id: &str) -> Self {
        let is_fine_tuned = model_id.starts_with("ft:");
        let model_type = if is_fine_tuned {
            "Fine-tuned GPT"
        } else if model_id.contains("gpt-4") {
            "GPT-4"
        } else if model_id.contains("gpt-3.5") {
            "GPT-3.5"
        } else if model_id.contains("claude") {
            "Claude"
        } else {
            "Generic model"
        };

        Self {
            success: true,
            provider: provider.to_string(),
            model_id: model_id.to_string(),
            model_type: model_type.to_string(),
            is_fine_tuned,
            display_name: if is_fine_tuned {
                "Korean to KSL gloss model".to_string()
            } else {
                model_type.to_string()
            },
        }
    }
}

/// GET /api/model-info
async fn model_info(State(state): State<AppState>) -> Json<ModelInfo> {
    let provider = state.coordinator.client().provider();
    Json(ModelInfo::describe(provider.name(), provider.model()))
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub persistence: bool,
}

/// GET /api/health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.started_at);
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        persistence: state.repository.is_some(),
    })
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "success": false, "error": message.into() }))).into_response()
}

fn repository_or_404(state: &AppState) -> Result<&Repository, Response> {
    state
        .repository
        .as_ref()
        .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Persistence is disabled"))
}

/// GET /api/batches/:id
async fn batch_details(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let repository = match repository_or_404(&state) {
        Ok(repository) => repository,
        Err(response) => return response,
    };

    let batch = match repository.get_batch(&id).await {
        Ok(Some(batch)) => batch,
        Ok(None) => return json_error(StatusCode::NOT_FOUND, format!("Unknown batch: {}", id)),
        Err(e) => {
            error!("Failed to load batch {}: {:#}", id, e);
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load batch");
        }
    };

    match repository.batch_stats(&id).await {
        Ok(stats) => Json(json!({ "success": true, "batch": batch, "stats": stats })).into_response(),
        Err(e) => {
            error!("Failed to compute stats for batch {}: {:#}", id, e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load batch statistics")
        }
    }
}

/// DELETE /api/batches/:id
async fn clear_batch(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let repository = match repository_or_404(&state) {
        Ok(repository) => repository,
        Err(response) => return response,
    };

    match repository.clear_batch(&id).await {
        Ok(removed) => Json(json!({ "success": true, "removed": removed })).into_response(),
        Err(e) => {
            error!("Failed to clear batch {}: {:#}", id, e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to clear batch")
        }
    }
}

/// DELETE /api/batches
async fn clear_all_batches(State(state): State<AppState>) -> Response {
    let repository = match repository_or_404(&state) {
        Ok(repository) => repository,
        Err(response) => return response,
    };

    match repository.clear_all().await {
        Ok(removed) => Json(json!({ "success": true, "removed": removed })).into_response(),
        Err(e) => {
            error!("Failed to clear stored runs: {:#}", e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to clear stored runs")
        }
    }
}

//! Worker HTTP接口
//!
//! - `POST /api/v1/chunks/assign`：执行一个分块，返回 `ChunkResult`
//! - `GET /health`

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use analyzer_core::{AnalyzerError, AssignChunkRequest, ChunkResult};

use crate::processor::ChunkProcessor;

#[derive(Clone)]
pub struct WorkerState {
    pub worker_id: String,
    pub processor: Arc<ChunkProcessor>,
    active_chunks: Arc<AtomicUsize>,
    processed_chunks: Arc<AtomicU64>,
}

impl WorkerState {
    pub fn new(worker_id: String, processor: Arc<ChunkProcessor>) -> Self {
        Self {
            worker_id,
            processor,
            active_chunks: Arc::new(AtomicUsize::new(0)),
            processed_chunks: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// 分块执行失败时的HTTP错误
#[derive(Debug)]
pub struct ChunkError(pub AnalyzerError);

impl IntoResponse for ChunkError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self.0 {
            AnalyzerError::InvalidChunkRange { .. } => (StatusCode::BAD_REQUEST, "INVALID_CHUNK_RANGE"),
            AnalyzerError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AnalyzerError::FileNotFound { .. } => (StatusCode::NOT_FOUND, "FILE_NOT_FOUND"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(json!({
            "error": {
                "message": self.0.to_string(),
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub fn create_worker_routes(state: WorkerState) -> Router {
    Router::new()
        .route("/api/v1/chunks/assign", post(assign_chunk))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn assign_chunk(
    State(state): State<WorkerState>,
    Json(request): Json<AssignChunkRequest>,
) -> Result<Json<ChunkResult>, ChunkError> {
    info!(
        job_id = %request.job_id,
        chunk_id = request.chunk_id,
        attempt = request.attempt,
        start_offset = request.start_offset,
        length = request.length,
        "收到分块"
    );

    state.active_chunks.fetch_add(1, Ordering::SeqCst);
    let result = state.processor.process(&request).await;
    state.active_chunks.fetch_sub(1, Ordering::SeqCst);

    match result {
        Ok(result) => {
            state.processed_chunks.fetch_add(1, Ordering::Relaxed);
            Ok(Json(result))
        }
        Err(e) => {
            warn!(chunk_id = request.chunk_id, "分块处理失败: {}", e);
            Err(ChunkError(e))
        }
    }
}

async fn health_check(State(state): State<WorkerState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "worker_id": state.worker_id,
        "active_chunks": state.active_chunks.load(Ordering::SeqCst),
        "processed_chunks": state.processed_chunks.load(Ordering::Relaxed),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

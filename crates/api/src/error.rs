use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use analyzer_core::AnalyzerError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("分析器错误: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("请求体无效: {0}")]
    Json(#[from] JsonRejection),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("未找到资源")]
    NotFound,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, error_type, suggestions) = match &self {
            ApiError::Analyzer(AnalyzerError::WorkerNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("Worker {} 不存在", id),
                "WORKER_NOT_FOUND",
                vec![
                    "Worker可能已被判定为Dead，请重新注册".to_string(),
                    "使用 GET /api/v1/workers 查看已注册的Worker".to_string(),
                ],
            ),
            ApiError::Analyzer(AnalyzerError::JobNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("作业 {} 不存在", id),
                "JOB_NOT_FOUND",
                vec!["使用 GET /api/v1/jobs 查看所有作业".to_string()],
            ),
            ApiError::Analyzer(AnalyzerError::FileNotFound { path }) => (
                StatusCode::NOT_FOUND,
                format!("日志文件 {} 不存在", path),
                "FILE_NOT_FOUND",
                vec!["文件路径需要在协调器和所有Worker上都可访问".to_string()],
            ),
            ApiError::Analyzer(AnalyzerError::InvalidRequest(msg)) | ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数错误: {}", msg),
                "BAD_REQUEST",
                vec!["请检查请求格式和参数".to_string()],
            ),
            ApiError::Analyzer(e @ AnalyzerError::InvalidChunkRange { .. }) => (
                StatusCode::BAD_REQUEST,
                e.to_string(),
                "INVALID_CHUNK_RANGE",
                Vec::new(),
            ),
            ApiError::Json(rejection) => (
                rejection.status(),
                format!("请求数据格式错误: {}", rejection.body_text()),
                "SERIALIZATION_ERROR",
                vec![
                    "请检查JSON格式是否正确".to_string(),
                    "确保Content-Type为application/json".to_string(),
                ],
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "请求的资源不存在".to_string(),
                "NOT_FOUND",
                vec!["请检查请求URL是否正确".to_string()],
            ),
            ApiError::Analyzer(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统内部错误".to_string(),
                "INTERNAL_ERROR",
                vec![format!("错误详情: {}", e)],
            ),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type,
                "code": status.as_u16(),
                "suggestions": suggestions,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

use axum::{extract::State, http::header, response::IntoResponse};

use crate::{
    error::{ApiError, ApiResult},
    routes::AppState,
};

/// Prometheus文本格式指标，未启用时返回404
pub async fn render_metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let handle = state.metrics_handle.as_ref().ok_or(ApiError::NotFound)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    ))
}

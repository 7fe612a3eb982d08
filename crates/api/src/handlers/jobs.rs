use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use analyzer_core::{SubmitJobRequest, SubmitJobResponse};

use crate::{
    error::{ApiError, ApiResult},
    response::{accepted, success},
    routes::AppState,
};

/// 提交分析作业，立即返回202和作业id
pub async fn submit_job(
    State(state): State<AppState>,
    payload: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    if request.file_path.trim().is_empty() {
        return Err(ApiError::BadRequest("file_path不能为空".to_string()));
    }

    let job_id = state.job_controller.submit(&request.file_path).await?;
    Ok(accepted(SubmitJobResponse { job_id }, "作业已提交".to_string()))
}

pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.job_controller.list_jobs().await))
}

/// 查询作业状态与当前指标
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job_id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::BadRequest(format!("无效的作业id: {id}")))?;
    let status = state.job_controller.job_status(job_id).await?;
    Ok(success(status))
}

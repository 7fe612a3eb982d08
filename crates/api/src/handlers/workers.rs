use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};
use tracing::info;

use analyzer_core::{Ack, WorkerRegistration};

use crate::{
    error::{ApiError, ApiResult},
    response::success,
    routes::AppState,
};

/// 注册Worker；同一id重复注册时更新地址并恢复为Healthy
pub async fn register_worker(
    State(state): State<AppState>,
    payload: Result<Json<WorkerRegistration>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(registration) = payload?;
    if registration.worker_id.trim().is_empty() {
        return Err(ApiError::BadRequest("worker_id不能为空".to_string()));
    }
    if registration.address.trim().is_empty() {
        return Err(ApiError::BadRequest("address不能为空".to_string()));
    }

    let worker = state.registry.register(registration).await;
    info!(worker_id = %worker.id, address = %worker.address, "Worker注册请求已处理");
    Ok(success(Ack::ok()))
}

/// Worker心跳；未知或已判定Dead返回404，Worker据此重新注册
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.registry.heartbeat(&id).await?;
    Ok(success(Ack::ok()))
}

/// Worker主动注销
pub async fn unregister_worker(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.registry.unregister(&id).await?;
    Ok(success(Ack::ok()))
}

/// 获取Worker列表
pub async fn list_workers(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.registry.list().await))
}

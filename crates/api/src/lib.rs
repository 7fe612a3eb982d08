//! # Analyzer API
//!
//! 协调器的HTTP接口，基于Axum。
//!
//! ## API 端点
//!
//! ### Worker管理
//! - `POST /api/v1/workers/register` - 注册Worker（幂等）
//! - `POST /api/v1/workers/{id}/heartbeat` - Worker心跳，未知或Dead返回404
//! - `DELETE /api/v1/workers/{id}` - 注销Worker
//! - `GET /api/v1/workers` - 获取Worker列表
//!
//! ### 作业
//! - `POST /api/v1/jobs` - 提交作业，返回202和 `job_id`
//! - `GET /api/v1/jobs` - 作业列表
//! - `GET /api/v1/jobs/{id}` - 作业状态与指标
//!
//! ### 系统监控
//! - `GET /health` - 健康检查
//! - `GET /metrics` - Prometheus指标（启用时，路径可配置）
//!
//! ## 响应格式
//!
//! 成功响应：
//! ```json
//! {
//!   "success": true,
//!   "data": { "job_id": "5f0c..." },
//!   "message": "作业已提交",
//!   "timestamp": "2024-01-01T00:00:00Z"
//! }
//! ```
//!
//! 错误响应：
//! ```json
//! {
//!   "error": {
//!     "message": "作业 5f0c... 不存在",
//!     "type": "JOB_NOT_FOUND",
//!     "code": 404,
//!     "timestamp": "2024-01-01T00:00:00Z"
//!   }
//! }
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower::ServiceBuilder;

use analyzer_dispatcher::JobController;
use middleware::{cors_layer, request_logging, trace_layer};
pub use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(
    job_controller: Arc<JobController>,
    metrics_handle: Option<PrometheusHandle>,
    metrics_endpoint: &str,
) -> Router {
    let state = AppState {
        registry: job_controller.registry().clone(),
        job_controller,
        metrics_handle,
    };

    create_routes(state, metrics_endpoint).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(cors_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}

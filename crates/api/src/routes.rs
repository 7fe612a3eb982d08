use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tracing::warn;

use analyzer_core::check_metrics_endpoint;
use analyzer_dispatcher::{JobController, WorkerRegistry};

use crate::handlers::{
    health::health_check,
    jobs::{get_job, list_jobs, submit_job},
    metrics::render_metrics,
    workers::{heartbeat, list_workers, register_worker, unregister_worker},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub job_controller: Arc<JobController>,
    pub registry: Arc<WorkerRegistry>,
    /// 未启用指标时为空，`/metrics` 返回404
    pub metrics_handle: Option<PrometheusHandle>,
}

/// 创建API路由，`metrics_endpoint` 为Prometheus指标的挂载路径
///
/// 只有提供了 `PrometheusHandle` 时才挂载指标路由；端点不合法时跳过挂载。
pub fn create_routes(state: AppState, metrics_endpoint: &str) -> Router {
    let mut router = Router::new().route("/health", get(health_check));

    if state.metrics_handle.is_some() {
        match check_metrics_endpoint(metrics_endpoint) {
            Ok(()) => router = router.route(metrics_endpoint, get(render_metrics)),
            Err(e) => warn!("未挂载指标路由: {}", e),
        }
    }

    router
        // Worker管理API
        .route("/api/v1/workers", get(list_workers))
        .route("/api/v1/workers/register", post(register_worker))
        .route("/api/v1/workers/{id}/heartbeat", post(heartbeat))
        .route("/api/v1/workers/{id}", axum::routing::delete(unregister_worker))
        // 作业API
        .route("/api/v1/jobs", get(list_jobs).post(submit_job))
        .route("/api/v1/jobs/{id}", get(get_job))
        .with_state(state)
}

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::routes::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let workers = state.registry.list().await;
    let healthy = workers.iter().filter(|w| w.is_healthy()).count();

    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "log-analyzer-coordinator",
        "version": env!("CARGO_PKG_VERSION"),
        "workers": {
            "total": workers.len(),
            "healthy": healthy,
        },
        "jobs": state.job_controller.list_jobs().await.len(),
    }))
}

use axum::{extract::Request, http::Method, middleware::Next, response::Response};
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info};

pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    // 心跳请求量大，降为debug
    let is_heartbeat = uri.path().ends_with("/heartbeat");
    if !is_heartbeat {
        info!("开始处理请求: {} {}", method, uri);
    }

    let response = next.run(request).await;
    let duration = start.elapsed();

    if is_heartbeat {
        debug!(status = %response.status(), "心跳请求: {} 耗时 {:?}", uri, duration);
    } else {
        info!(
            "完成请求处理: {} {} - 状态: {} - 耗时: {:?}",
            method,
            uri,
            response.status(),
            duration
        );
    }

    response
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
}

pub fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
}

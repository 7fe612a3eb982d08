use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use analyzer_core::{AssignChunkRequest, ChunkResult, WorkerConfig};
use analyzer_worker::WorkerService;

/// 记录Worker调用的简易协调器
#[derive(Clone, Default)]
struct FakeCoordinator {
    events: Arc<Mutex<Vec<String>>>,
    known: Arc<AtomicBool>,
}

impl FakeCoordinator {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

async fn register(State(fake): State<FakeCoordinator>, Json(body): Json<Value>) -> Json<Value> {
    fake.events
        .lock()
        .unwrap()
        .push(format!("register:{}:{}", body["worker_id"].as_str().unwrap_or(""), body["address"].as_str().unwrap_or("")));
    fake.known.store(true, Ordering::SeqCst);
    Json(json!({"success": true, "data": {"ok": true}}))
}

async fn heartbeat(State(fake): State<FakeCoordinator>, Path(id): Path<String>) -> (StatusCode, Json<Value>) {
    if !fake.known.load(Ordering::SeqCst) {
        return (StatusCode::NOT_FOUND, Json(json!({"error": {"message": "unknown worker"}})));
    }
    fake.events.lock().unwrap().push(format!("heartbeat:{id}"));
    (StatusCode::OK, Json(json!({"success": true})))
}

async fn unregister(State(fake): State<FakeCoordinator>, Path(id): Path<String>) -> Json<Value> {
    fake.events.lock().unwrap().push(format!("unregister:{id}"));
    Json(json!({"success": true}))
}

async fn start_fake_coordinator() -> (FakeCoordinator, String) {
    let fake = FakeCoordinator::default();
    let app = Router::new()
        .route("/api/v1/workers/register", post(register))
        .route("/api/v1/workers/{id}/heartbeat", post(heartbeat))
        .route("/api/v1/workers/{id}", delete(unregister))
        .with_state(fake.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (fake, format!("http://{addr}"))
}

fn worker_config(coordinator_url: String) -> WorkerConfig {
    WorkerConfig {
        worker_id: "w-int".to_string(),
        listen_address: "127.0.0.1:0".to_string(),
        advertise_address: None,
        coordinator_url,
        heartbeat_interval_ms: 30,
        request_timeout_ms: 2_000,
        read_buffer_bytes: 4096,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_worker_lifecycle_against_coordinator() {
    let (fake, url) = start_fake_coordinator().await;
    let service = WorkerService::builder(worker_config(url))
        .hostname("127.0.0.1".to_string())
        .build()
        .unwrap();

    service.start().await.unwrap();
    let port = service.local_addr().await.unwrap().port();

    let events = fake.events();
    assert_eq!(events[0], format!("register:w-int:http://127.0.0.1:{port}"));

    wait_until(|| fake.count("heartbeat:w-int") >= 2).await;

    service.stop().await.unwrap();
    assert_eq!(fake.events().last().unwrap(), "unregister:w-int");
}

#[tokio::test]
async fn test_worker_reregisters_when_coordinator_forgets_it() {
    let (fake, url) = start_fake_coordinator().await;
    let service = WorkerService::builder(worker_config(url)).build().unwrap();
    service.start().await.unwrap();
    assert_eq!(fake.count("register:"), 1);

    // 模拟协调器重启
    fake.known.store(false, Ordering::SeqCst);
    wait_until(|| fake.count("register:") >= 2).await;
    wait_until(|| fake.count("heartbeat:") >= 1).await;

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_worker_serves_chunks_over_http() {
    let (_fake, url) = start_fake_coordinator().await;
    let service = WorkerService::builder(worker_config(url)).build().unwrap();
    service.start().await.unwrap();
    let addr = service.local_addr().await.unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "2024-01-01T10:00:00Z INFO Request processed in 120ms").unwrap();
    writeln!(file, "2024-01-01T10:00:01Z INFO Request processed in 80ms").unwrap();
    writeln!(file, "oops").unwrap();
    let length = file.as_file().metadata().unwrap().len();

    let request = AssignChunkRequest {
        job_id: uuid::Uuid::new_v4(),
        chunk_id: 0,
        attempt: 1,
        file_path: file.path().to_str().unwrap().to_string(),
        start_offset: 0,
        length,
    };
    let result: ChunkResult = reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/chunks/assign"))
        .json(&request)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(result.request_count, 2);
    assert_eq!(result.malformed_count, 1);
    assert_eq!(result.total_response_time, 200);

    service.stop().await.unwrap();
}

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use analyzer_core::{
    AnalyzerError, AnalyzerResult, AssignChunkRequest, ChunkResult, WorkerInfo, WorkerTransport,
};

/// 通过HTTP/JSON向Worker下发分块
pub struct HttpWorkerTransport {
    http_client: reqwest::Client,
}

impl HttpWorkerTransport {
    pub fn new(connect_timeout: Duration) -> AnalyzerResult<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| AnalyzerError::Network(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self { http_client })
    }
}

/// 从错误响应中取出 `error.message`，否则返回原始文本
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl WorkerTransport for HttpWorkerTransport {
    async fn assign_chunk(
        &self,
        worker: &WorkerInfo,
        request: AssignChunkRequest,
    ) -> AnalyzerResult<ChunkResult> {
        let url = format!("{}/api/v1/chunks/assign", worker.address.trim_end_matches('/'));
        debug!(
            worker_id = %worker.id,
            chunk_id = request.chunk_id,
            attempt = request.attempt,
            "发送分块请求: {}",
            url
        );

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalyzerError::Network(format!("连接Worker {} 失败: {e}", worker.id)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body);
            warn!(worker_id = %worker.id, chunk_id = request.chunk_id, "Worker返回错误: HTTP {} - {}", status, message);
            return Err(AnalyzerError::WorkerRejected(format!("HTTP {status}: {message}")));
        }

        let result: ChunkResult = response
            .json()
            .await
            .map_err(|e| AnalyzerError::Serialization(format!("解析Worker响应失败: {e}")))?;

        if result.chunk_id != request.chunk_id {
            return Err(AnalyzerError::WorkerRejected(format!(
                "Worker返回的分块id不匹配: 期望 {}, 实际 {}",
                request.chunk_id, result.chunk_id
            )));
        }

        Ok(result)
    }
}

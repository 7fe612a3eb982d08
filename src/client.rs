//! 协调器HTTP客户端，供 `submit` 和 `status` 子命令使用

use std::time::Duration;

use anyhow::{Context, Result};
use analyzer_api::response::ApiResponse;
use analyzer_core::{JobId, JobStatus, SubmitJobRequest, SubmitJobResponse};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use crate::common::CliError;

pub struct CoordinatorApi {
    base_url: String,
    http_client: reqwest::Client,
}

impl CoordinatorApi {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("创建HTTP客户端失败")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub async fn submit(&self, file_path: &str) -> Result<JobId> {
        let url = format!("{}/api/v1/jobs", self.base_url);
        let request = SubmitJobRequest {
            file_path: file_path.to_string(),
        };
        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CliError::Startup(format!("无法连接协调器 {}: {e}", self.base_url)))?;

        let body: SubmitJobResponse = read_data(response).await?;
        Ok(body.job_id)
    }

    pub async fn job_status(&self, job_id: JobId) -> Result<JobStatus> {
        let url = format!("{}/api/v1/jobs/{}", self.base_url, job_id);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("查询作业状态失败: {}", self.base_url))?;

        read_data(response).await
    }

    /// 轮询直到作业结束
    ///
    /// 提交之后的连接失败不算启动失败。
    pub async fn wait_for_job(&self, job_id: JobId, poll_interval: Duration) -> Result<JobStatus> {
        let mut interval = tokio::time::interval(poll_interval);
        let mut last_completed = usize::MAX;

        loop {
            interval.tick().await;
            let status = self.job_status(job_id).await?;
            if status.is_finished() {
                return Ok(status);
            }

            if status.completed_chunks != last_completed {
                last_completed = status.completed_chunks;
                info!(
                    job_id = %job_id,
                    state = %status.state,
                    completed = status.completed_chunks,
                    total = status.total_chunks,
                    in_flight = status.in_flight_chunks,
                    "作业进行中"
                );
            }
        }
    }
}

/// 解析 `{success, data}` 包装；非2xx时取出 `error.message`
async fn read_data<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let text = response.text().await.context("读取协调器响应失败")?;

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or(text);
        return Err(anyhow::anyhow!("协调器返回错误: HTTP {status} - {message}"));
    }

    let envelope: ApiResponse<T> = serde_json::from_str(&text).context("解析协调器响应失败")?;
    envelope
        .data
        .ok_or_else(|| anyhow::anyhow!("协调器响应缺少data字段"))
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoordinatorConfig {
    pub listen_address: String,
    /// 目标分块大小，实际边界会向后对齐到行尾
    pub chunk_size_bytes: u64,
    /// 每个分块最多分发次数
    pub max_attempts: u32,
    pub chunk_timeout_ms: u64,
    /// 作业启动后等待首个Worker的宽限期
    pub startup_grace_ms: u64,
    pub dispatch_interval_ms: u64,
    pub progress_interval_ms: u64,
    /// 保留的已结束作业数量，超出时淘汰最早结束的
    #[serde(default = "default_max_finished_jobs")]
    pub max_finished_jobs: usize,
}

fn default_max_finished_jobs() -> usize {
    100
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:7070".to_string(),
            chunk_size_bytes: 1024 * 1024,
            max_attempts: 3,
            chunk_timeout_ms: 60_000,
            startup_grace_ms: 30_000,
            dispatch_interval_ms: 200,
            progress_interval_ms: 5_000,
            max_finished_jobs: default_max_finished_jobs(),
        }
    }
}

impl CoordinatorConfig {
    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.chunk_timeout_ms)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.listen_address.is_empty() {
            return Err(anyhow::anyhow!("监听地址不能为空"));
        }

        if self.chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!("分块大小必须大于0"));
        }

        if self.max_attempts == 0 {
            return Err(anyhow::anyhow!("最大分发次数必须大于0"));
        }

        if self.chunk_timeout_ms == 0 {
            return Err(anyhow::anyhow!("分块超时时间必须大于0"));
        }

        if self.startup_grace_ms == 0 {
            return Err(anyhow::anyhow!("启动宽限期必须大于0"));
        }

        if self.dispatch_interval_ms == 0 || self.progress_interval_ms == 0 {
            return Err(anyhow::anyhow!("调度间隔和进度汇报间隔必须大于0"));
        }

        if self.max_finished_jobs == 0 {
            return Err(anyhow::anyhow!("已结束作业保留数量必须大于0"));
        }

        Ok(())
    }
}

/// Worker健康检测配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthConfig {
    pub check_interval_ms: u64,
    /// 心跳超过该时长：Healthy -> Suspected
    pub suspect_after_ms: u64,
    /// 心跳超过该时长：Suspected -> Dead
    pub dead_after_ms: u64,
    pub auto_cleanup_dead_workers: bool,
    /// Dead记录保留时长，超过后从表中移除
    pub cleanup_after_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 1_000,
            suspect_after_ms: 5_000,
            dead_after_ms: 15_000,
            auto_cleanup_dead_workers: true,
            cleanup_after_ms: 300_000,
        }
    }
}

impl HealthConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.check_interval_ms == 0 {
            return Err(anyhow::anyhow!("健康检测间隔必须大于0"));
        }

        if self.suspect_after_ms == 0 {
            return Err(anyhow::anyhow!("心跳怀疑阈值必须大于0"));
        }

        if self.dead_after_ms <= self.suspect_after_ms {
            return Err(anyhow::anyhow!(
                "死亡阈值({}ms)必须大于怀疑阈值({}ms)",
                self.dead_after_ms,
                self.suspect_after_ms
            ));
        }

        if self.auto_cleanup_dead_workers && self.cleanup_after_ms == 0 {
            return Err(anyhow::anyhow!("Dead Worker清理阈值必须大于0"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub listen_address: String,
    /// 注册时上报给协调器的地址，缺省时由主机名和监听端口推导
    pub advertise_address: Option<String>,
    pub coordinator_url: String,
    pub heartbeat_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub read_buffer_bytes: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker-001".to_string(),
            listen_address: "0.0.0.0:7071".to_string(),
            advertise_address: None,
            coordinator_url: "http://127.0.0.1:7070".to_string(),
            heartbeat_interval_ms: 1_000,
            request_timeout_ms: 10_000,
            read_buffer_bytes: 64 * 1024,
        }
    }
}

impl WorkerConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_id.is_empty() {
            return Err(anyhow::anyhow!("Worker ID不能为空"));
        }

        if self.listen_address.is_empty() {
            return Err(anyhow::anyhow!("监听地址不能为空"));
        }

        if !self.coordinator_url.starts_with("http://")
            && !self.coordinator_url.starts_with("https://")
        {
            return Err(anyhow::anyhow!(
                "协调器地址格式无效: {}",
                self.coordinator_url
            ));
        }

        if self.heartbeat_interval_ms == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }

        if self.request_timeout_ms == 0 {
            return Err(anyhow::anyhow!("请求超时时间必须大于0"));
        }

        if self.read_buffer_bytes == 0 {
            return Err(anyhow::anyhow!("读缓冲区大小必须大于0"));
        }

        Ok(())
    }
}

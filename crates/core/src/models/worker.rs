use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Assignment;

/// Worker节点信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerInfo {
    pub id: String,
    /// Worker RPC基础地址，例如 `http://10.0.0.5:7071`
    pub address: String,
    pub health: WorkerHealth,
    pub last_heartbeat: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
    pub current_chunk: Option<Assignment>,
    pub last_assigned_at: Option<DateTime<Utc>>,
}

/// Worker健康状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WorkerHealth {
    #[serde(rename = "HEALTHY")]
    Healthy,
    #[serde(rename = "SUSPECTED")]
    Suspected,
    #[serde(rename = "DEAD")]
    Dead,
}

/// Worker注册请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegistration {
    pub worker_id: String,
    pub address: String,
}

impl WorkerInfo {
    /// 创建新的Worker信息
    pub fn new(registration: WorkerRegistration, now: DateTime<Utc>) -> Self {
        Self {
            id: registration.worker_id,
            address: registration.address,
            health: WorkerHealth::Healthy,
            last_heartbeat: now,
            registered_at: now,
            current_chunk: None,
            last_assigned_at: None,
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.health, WorkerHealth::Healthy)
    }

    pub fn is_dead(&self) -> bool {
        matches!(self.health, WorkerHealth::Dead)
    }

    /// 健康且空闲的Worker才能接收新分块
    pub fn is_assignable(&self) -> bool {
        self.is_healthy() && self.current_chunk.is_none()
    }

    /// 距离上次心跳的时长，时钟回拨时视为0
    pub fn heartbeat_age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_heartbeat).to_std().unwrap_or_default()
    }

    /// 更新心跳信息
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_heartbeat = now;
        if self.health == WorkerHealth::Suspected {
            self.health = WorkerHealth::Healthy;
        }
    }
}

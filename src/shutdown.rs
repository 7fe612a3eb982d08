use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

/// 优雅关闭管理器
///
/// 协调器和Worker的长驻任务都订阅同一个信号。
/// 发送器在关闭时被取走，之后的订阅者会立即收到信号。
#[derive(Clone)]
pub struct ShutdownManager {
    sender: Arc<Mutex<Option<broadcast::Sender<()>>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
        }
    }

    pub async fn subscribe(&self) -> broadcast::Receiver<()> {
        match self.sender.lock().await.as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(1);
                let _ = sender.send(());
                receiver
            }
        }
    }

    /// 通知所有订阅者，重复调用无效果
    pub async fn shutdown(&self) {
        let Some(sender) = self.sender.lock().await.take() else {
            debug!("关闭信号已发送过");
            return;
        };

        let receivers = sender.receiver_count();
        // 没有订阅者时send返回错误
        let _ = sender.send(());
        info!(receivers = receivers, "关闭信号已发送");
    }

    pub async fn is_shutdown(&self) -> bool {
        self.sender.lock().await.is_none()
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

//! Worker节点
//!
//! 接收协调器下发的分块，按行分类并返回统计结果；定期发送心跳。

pub mod components;
pub mod processor;
pub mod server;
pub mod service;

pub use components::{CoordinatorClient, HeartbeatManager};
pub use processor::ChunkProcessor;
pub use server::{create_worker_routes, WorkerState};
pub use service::{WorkerService, WorkerServiceBuilder};

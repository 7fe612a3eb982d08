//! 协调器核心
//!
//! 分块规划、Worker注册表与健康检测、分块调度、指标聚合和作业控制。

pub mod aggregator;
pub mod chunk_table;
pub mod dispatcher;
pub mod health_monitor;
pub mod job_controller;
pub mod planner;
pub mod registry;
pub mod telemetry;
pub mod worker_client;

pub use aggregator::MetricsAggregator;
pub use chunk_table::{ChunkTable, DispatchProgress, FailureOutcome};
pub use dispatcher::{ChunkDispatcher, DispatchReport};
pub use health_monitor::{HealthMonitor, HealthMonitorService};
pub use job_controller::JobController;
pub use planner::ChunkPlanner;
pub use registry::{FailureEvent, FailureReason, SweepReport, WorkerRegistry};
pub use worker_client::HttpWorkerTransport;

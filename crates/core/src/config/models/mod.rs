pub mod app_config;
pub mod coordinator_worker;
pub mod observability;

// Re-export main types for easier imports
pub use app_config::AppConfig;
pub use coordinator_worker::{CoordinatorConfig, HealthConfig, WorkerConfig};
pub use observability::{check_metrics_endpoint, ObservabilityConfig};

//! 配置管理
//!
//! 配置按以下顺序合并，后者覆盖前者：内置默认值、TOML配置文件、
//! `ANALYZER__` 前缀的环境变量。命令行参数由二进制入口在加载后覆盖。

pub mod models;

#[cfg(test)]
mod tests;

pub use models::{
    check_metrics_endpoint, AppConfig, CoordinatorConfig, HealthConfig, ObservabilityConfig,
    WorkerConfig,
};

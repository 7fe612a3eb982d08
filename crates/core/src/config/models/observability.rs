use serde::{Deserialize, Serialize};

/// 协调器已占用的路径，指标端点不能与之重叠
pub const RESERVED_PATHS: &[&str] = &["/health", "/api"];

/// 指标端点须为以 `/` 开头的固定路径，且不落在保留路径之下
pub fn check_metrics_endpoint(endpoint: &str) -> anyhow::Result<()> {
    if !endpoint.starts_with('/') || endpoint.len() < 2 {
        return Err(anyhow::anyhow!("指标端点必须是以 '/' 开头的路径: {endpoint}"));
    }
    if endpoint.contains(['{', '}', '*', ' ']) {
        return Err(anyhow::anyhow!("指标端点不能包含路径参数或通配符: {endpoint}"));
    }

    let trimmed = endpoint.trim_end_matches('/');
    for reserved in RESERVED_PATHS {
        let nested = trimmed
            .strip_prefix(reserved)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
        if nested {
            return Err(anyhow::anyhow!("指标端点与保留路径 {reserved} 冲突: {endpoint}"));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// `json` 或 `pretty`
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_endpoint: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_endpoint: "/metrics".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志级别: {}，支持的级别: {:?}",
                self.log_level,
                valid_levels
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志格式: {}，支持的格式: {:?}",
                self.log_format,
                valid_formats
            ));
        }

        // 关闭指标时同样校验
        check_metrics_endpoint(&self.metrics_endpoint)

    }
}

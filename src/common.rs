use std::time::Duration;

use anyhow::{Context, Result};
use analyzer_core::{AppConfig, JobId, JobState, JobStatus};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app::{AppMode, Application};
use crate::shutdown::ShutdownManager;

/// 进程退出码
pub mod exit_code {
    pub const SUCCESS: u8 = 0;
    pub const FAILURE: u8 = 1;
    pub const PARTIALLY_FAILED: u8 = 2;
    pub const ABORTED: u8 = 3;
    /// 协调器不可达、端口绑定失败、首次注册失败
    pub const STARTUP_FAILURE: u8 = 4;
}

/// 需要映射为特定退出码的错误
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("启动失败: {0}")]
    Startup(String),

    #[error("作业 {job_id} 结束状态为 {state}")]
    JobNotCompleted { job_id: JobId, state: JobState },
}

/// 根据错误链计算退出码
pub fn exit_code_for(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<CliError>() {
        Some(CliError::Startup(_)) => exit_code::STARTUP_FAILURE,
        Some(CliError::JobNotCompleted { state, .. }) => job_state_exit_code(*state),
        None => exit_code::FAILURE,
    }
}

pub fn job_state_exit_code(state: JobState) -> u8 {
    match state {
        JobState::Completed => exit_code::SUCCESS,
        JobState::PartiallyFailed => exit_code::PARTIALLY_FAILED,
        JobState::Aborted => exit_code::ABORTED,
        JobState::Planning | JobState::Dispatching => exit_code::FAILURE,
    }
}

/// 作业未以Completed结束时返回 `JobNotCompleted`，退出码随结束状态
pub fn check_job_outcome(status: &JobStatus) -> Result<()> {
    if status.state == JobState::Completed {
        return Ok(());
    }

    warn!(
        job_id = %status.job_id,
        failed_chunks = ?status.failed_chunks,
        error = ?status.error,
        "作业未完全成功"
    );
    Err(CliError::JobNotCompleted {
        job_id: status.job_id,
        state: status.state,
    }
    .into())
}

/// 初始化日志系统
///
/// `RUST_LOG` 优先于 `log_level`。
pub fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

/// 加载应用配置，未指定路径时使用默认位置（若存在）
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    match config_path {
        Some(path) => {
            AppConfig::load(Some(path)).with_context(|| format!("加载配置文件失败: {path}"))
        }
        None => AppConfig::load(None).context("加载默认配置失败"),
    }
}

/// 运行长驻服务直到收到关闭信号
///
/// 启动阶段失败时服务任务会提前结束，此时直接返回其错误。
pub async fn run_service(config: AppConfig, mode: AppMode, service_name: &str) -> Result<()> {
    info!("启动 {} 服务", service_name);

    let shutdown_manager = ShutdownManager::new();
    let shutdown_rx = shutdown_manager.subscribe().await;
    let app = Application::new(config, mode);

    let mut app_handle = tokio::spawn(async move { app.run(shutdown_rx).await });

    tokio::select! {
        result = &mut app_handle => {
            return result.context("服务任务异常退出")?;
        }
        _ = wait_for_shutdown_signal() => {}
    }

    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    // 等待应用关闭，设置超时
    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(result)) => {
            result?;
            info!("{} 服务已优雅关闭", service_name);
        }
        Ok(Err(e)) => {
            error!("{} 服务关闭时发生错误: {}", service_name, e);
        }
        Err(_) => {
            warn!("{} 服务关闭超时，强制退出", service_name);
        }
    }

    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use analyzer::app::AppMode;
use analyzer::client::CoordinatorApi;
use analyzer::common::{
    check_job_outcome, exit_code, exit_code_for, init_logging, load_config, run_service,
};
use analyzer::generator::LogGenerator;
use analyzer_core::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "analyzer")]
#[command(version)]
#[command(about = "分布式日志分析系统")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 配置文件路径
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<String>,

    /// 日志级别，默认取配置文件
    #[arg(short = 'l', long, global = true, value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// 日志格式
    #[arg(long, global = true, value_parser = ["json", "pretty"])]
    log_format: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 运行协调器
    Coordinator {
        /// 监听地址，覆盖配置
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
    },
    /// 运行Worker
    Worker {
        #[arg(long, value_name = "ID")]
        worker_id: String,
        /// 协调器地址
        #[arg(long, value_name = "URL")]
        coordinator: Option<String>,
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
        /// 上报给协调器的地址
        #[arg(long, value_name = "URL")]
        advertise: Option<String>,
    },
    /// 提交分析作业
    Submit {
        #[arg(long, value_name = "URL")]
        coordinator: Option<String>,
        /// 日志文件，路径需要在协调器和Worker上可访问
        file: String,
        /// 只提交，不等待结果
        #[arg(long)]
        no_wait: bool,
        #[arg(long, default_value_t = 500)]
        poll_interval_ms: u64,
    },
    /// 查询作业状态
    Status {
        #[arg(long, value_name = "URL")]
        coordinator: Option<String>,
        job_id: String,
    },
    /// 生成合成日志文件
    Generate {
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        #[arg(long)]
        lines: u64,
        #[arg(long, default_value_t = 0.05)]
        error_ratio: f64,
        #[arg(long, default_value_t = 0.01)]
        malformed_ratio: f64,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(exit_code::FAILURE);
        }
    };

    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.observability.log_level.clone());
    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.observability.log_format.clone());
    if let Err(e) = init_logging(&log_level, &log_format) {
        eprintln!("{e:#}");
        return ExitCode::from(exit_code::FAILURE);
    }

    match run(cli.command, config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

async fn run(command: Commands, mut config: AppConfig) -> Result<u8> {
    match command {
        Commands::Coordinator { listen } => {
            if let Some(listen) = listen {
                config.coordinator.listen_address = listen;
            }
            config.validate()?;
            run_service(config, AppMode::Coordinator, "协调器").await?;
            Ok(exit_code::SUCCESS)
        }
        Commands::Worker {
            worker_id,
            coordinator,
            listen,
            advertise,
        } => {
            config.worker.worker_id = worker_id;
            if let Some(coordinator) = coordinator {
                config.worker.coordinator_url = coordinator;
            }
            if let Some(listen) = listen {
                config.worker.listen_address = listen;
            }
            if advertise.is_some() {
                config.worker.advertise_address = advertise;
            }
            config.validate()?;
            run_service(config, AppMode::Worker, "Worker").await?;
            Ok(exit_code::SUCCESS)
        }
        Commands::Submit {
            coordinator,
            file,
            no_wait,
            poll_interval_ms,
        } => {
            let url = coordinator.unwrap_or_else(|| config.worker.coordinator_url.clone());
            let api = CoordinatorApi::new(&url, config.worker.request_timeout())?;

            // 协调器和Worker的工作目录可能不同
            let file_path = std::fs::canonicalize(&file)
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or(file);

            let job_id = api.submit(&file_path).await.context("提交作业失败")?;
            info!(job_id = %job_id, file_path = %file_path, "作业已提交");

            if no_wait {
                println!("{job_id}");
                return Ok(exit_code::SUCCESS);
            }

            let status = api
                .wait_for_job(job_id, Duration::from_millis(poll_interval_ms.max(1)))
                .await?;
            println!("{}", serde_json::to_string_pretty(&status)?);

            check_job_outcome(&status)?;
            Ok(exit_code::SUCCESS)
        }
        Commands::Status {
            coordinator,
            job_id,
        } => {
            let url = coordinator.unwrap_or_else(|| config.worker.coordinator_url.clone());
            let job_id = uuid::Uuid::parse_str(&job_id)
                .with_context(|| format!("无效的作业id: {job_id}"))?;
            let api = CoordinatorApi::new(&url, config.worker.request_timeout())?;
            let status = api.job_status(job_id).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(exit_code::SUCCESS)
        }
        Commands::Generate {
            output,
            lines,
            error_ratio,
            malformed_ratio,
            seed,
        } => {
            let mut generator = LogGenerator::new(error_ratio, malformed_ratio, seed)?;
            let summary = generator.generate_file(&output, lines)?;
            info!(
                path = %output.display(),
                lines = summary.lines,
                requests = summary.requests,
                errors = summary.errors,
                malformed = summary.malformed,
                "日志文件已生成"
            );
            Ok(exit_code::SUCCESS)
        }
    }
}

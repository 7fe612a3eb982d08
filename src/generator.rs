//! 合成日志生成器
//!
//! 生成 `<timestamp> <LEVEL> <message>` 格式的日志，按比例混入ERROR行和
//! 格式错误的行，其余为带响应时间的请求行。用于本地压测和端到端验证。

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ERROR_MESSAGES: &[&str] = &[
    "Database connection timeout",
    "Upstream service unavailable",
    "Failed to acquire lock on session table",
    "Cache miss storm detected",
];

const MALFORMED_LINES: &[&str] = &["corrupted entry", "???", "INFO", "Request processed"];

/// 生成结果统计，与分类器的计数口径一致
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateSummary {
    pub lines: u64,
    pub requests: u64,
    pub errors: u64,
    pub malformed: u64,
    pub total_response_time: u64,
}

pub struct LogGenerator {
    error_ratio: f64,
    malformed_ratio: f64,
    rng: StdRng,
    start_time: DateTime<Utc>,
}

impl LogGenerator {
    pub fn new(error_ratio: f64, malformed_ratio: f64, seed: Option<u64>) -> Result<Self> {
        for (name, ratio) in [("error_ratio", error_ratio), ("malformed_ratio", malformed_ratio)] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(anyhow::anyhow!("{name} 必须在0到1之间: {ratio}"));
            }
        }
        if error_ratio + malformed_ratio > 1.0 {
            return Err(anyhow::anyhow!("error_ratio与malformed_ratio之和不能超过1"));
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let start_time = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .context("无效的起始时间")?;

        Ok(Self {
            error_ratio,
            malformed_ratio,
            rng,
            start_time,
        })
    }

    pub fn write_to<W: Write>(&mut self, writer: &mut W, lines: u64) -> Result<GenerateSummary> {
        let mut summary = GenerateSummary::default();

        for i in 0..lines {
            let timestamp = (self.start_time + chrono::Duration::milliseconds(i as i64 * 10))
                .format("%Y-%m-%dT%H:%M:%S%.3fZ");
            let roll: f64 = self.rng.random();

            if roll < self.error_ratio {
                let message = ERROR_MESSAGES[self.rng.random_range(0..ERROR_MESSAGES.len())];
                writeln!(writer, "{timestamp} ERROR {message}")?;
                summary.errors += 1;
            } else if roll < self.error_ratio + self.malformed_ratio {
                let line = MALFORMED_LINES[self.rng.random_range(0..MALFORMED_LINES.len())];
                writeln!(writer, "{line}")?;
                summary.malformed += 1;
            } else {
                let response_time: u64 = self.rng.random_range(10..=500);
                writeln!(writer, "{timestamp} INFO Request processed in {response_time}ms")?;
                summary.requests += 1;
                summary.total_response_time += response_time;
            }
            summary.lines += 1;
        }

        writer.flush()?;
        Ok(summary)
    }

    pub fn generate_file(&mut self, path: &Path, lines: u64) -> Result<GenerateSummary> {
        let file = File::create(path).with_context(|| format!("创建文件失败: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer, lines)
    }
}

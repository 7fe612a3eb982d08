//! 日志行分类
//!
//! 行格式为 `<timestamp> <LEVEL> <message...>`，以空白分隔。字段少于
//! [`MIN_FIELDS`] 的行视为格式错误。请求行的消息包含
//! `Request processed in`，最后一个字段为响应时间（如 `120ms`）。

use crate::models::ChunkResult;

/// 一行有效日志至少包含的字段数
pub const MIN_FIELDS: usize = 4;

pub const ERROR_LEVEL: &str = "ERROR";
pub const REQUEST_MARKER: &str = "Request processed in";

/// 单行日志的分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Error,
    Request { response_time_ms: u64 },
    Malformed,
    /// 格式正确但不参与统计的行（空行、普通INFO等）
    Other,
}

/// 对一行日志进行分类
pub fn classify_line(line: &str) -> LineClass {
    if line.trim().is_empty() {
        return LineClass::Other;
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < MIN_FIELDS {
        return LineClass::Malformed;
    }

    if fields[1] == ERROR_LEVEL {
        return LineClass::Error;
    }

    if line.contains(REQUEST_MARKER) {
        return match parse_response_time(fields[fields.len() - 1]) {
            Some(response_time_ms) => LineClass::Request { response_time_ms },
            None => LineClass::Malformed,
        };
    }

    LineClass::Other
}

/// 解析 `120ms` 或 `120` 形式的非负整数
fn parse_response_time(token: &str) -> Option<u64> {
    let digits = token.strip_suffix("ms").unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl ChunkResult {
    /// 将一行的分类计入结果
    pub fn record(&mut self, class: LineClass) {
        match class {
            LineClass::Error => self.error_count += 1,
            LineClass::Request { response_time_ms } => {
                self.request_count += 1;
                self.total_response_time += response_time_ms;
            }
            LineClass::Malformed => self.malformed_count += 1,
            LineClass::Other => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_line() {
        let class = classify_line("2024-01-01T10:00:00Z INFO Request processed in 120ms");
        assert_eq!(class, LineClass::Request { response_time_ms: 120 });
    }

    #[test]
    fn test_request_line_without_unit() {
        let class = classify_line("2024-01-01T10:00:00Z INFO Request processed in 87");
        assert_eq!(class, LineClass::Request { response_time_ms: 87 });
    }

    #[test]
    fn test_error_line() {
        let class = classify_line("2024-01-01T10:00:01Z ERROR Database connection lost");
        assert_eq!(class, LineClass::Error);
    }

    #[test]
    fn test_error_wins_over_request_marker() {
        let class = classify_line("2024-01-01T10:00:01Z ERROR Request processed in 5ms");
        assert_eq!(class, LineClass::Error);
    }

    #[test]
    fn test_too_few_fields_is_malformed() {
        assert_eq!(classify_line("garbage line"), LineClass::Malformed);
        assert_eq!(classify_line("2024-01-01T10:00:01Z ERROR boom"), LineClass::Malformed);
    }

    #[test]
    fn test_bad_response_time_is_malformed() {
        for line in [
            "2024-01-01T10:00:00Z INFO Request processed in fastms",
            "2024-01-01T10:00:00Z INFO Request processed in -5ms",
            "2024-01-01T10:00:00Z INFO Request processed in 12.5ms",
            "2024-01-01T10:00:00Z INFO Request processed in ms",
        ] {
            assert_eq!(classify_line(line), LineClass::Malformed, "{line}");
        }
    }

    #[test]
    fn test_other_lines_are_not_counted() {
        assert_eq!(
            classify_line("2024-01-01T10:00:00Z INFO Server started on 8080"),
            LineClass::Other
        );
        assert_eq!(classify_line("   "), LineClass::Other);
        assert_eq!(classify_line(""), LineClass::Other);
    }

    #[test]
    fn test_record_accumulates() {
        let mut result = ChunkResult::empty(0);
        result.record(LineClass::Request { response_time_ms: 100 });
        result.record(LineClass::Request { response_time_ms: 150 });
        result.record(LineClass::Error);
        result.record(LineClass::Malformed);
        result.record(LineClass::Other);

        assert_eq!(result.request_count, 2);
        assert_eq!(result.total_response_time, 250);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.malformed_count, 1);
    }
}

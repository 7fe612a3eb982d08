//! 分块处理
//!
//! 读取指定字节区间并逐行分类。区间会调整到整行：起点前一字节不是换行符
//! 时跳过开头的残行（它属于上一个分块），区间在行中间结束时读到该行行尾。
//! 对已按行对齐的区间两种调整都不生效。

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::debug;

use analyzer_core::{classify_line, AnalyzerError, AnalyzerResult, AssignChunkRequest, ChunkId, ChunkResult};

#[derive(Debug, Clone)]
pub struct ChunkProcessor {
    read_buffer_bytes: usize,
}

impl Default for ChunkProcessor {
    fn default() -> Self {
        Self::new(64 * 1024)
    }
}

impl ChunkProcessor {
    pub fn new(read_buffer_bytes: usize) -> Self {
        Self {
            read_buffer_bytes: read_buffer_bytes.max(1),
        }
    }

    /// 处理一个分块请求，文件读取在阻塞线程池中执行
    pub async fn process(&self, request: &AssignChunkRequest) -> AnalyzerResult<ChunkResult> {
        let processor = self.clone();
        let path = request.file_path.clone();
        let (chunk_id, start_offset, length) = (request.chunk_id, request.start_offset, request.length);

        tokio::task::spawn_blocking(move || processor.process_file(Path::new(&path), chunk_id, start_offset, length))
            .await
            .map_err(|e| AnalyzerError::Internal(format!("分块处理任务失败: {e}")))?
    }

    pub fn process_file(
        &self,
        path: &Path,
        chunk_id: ChunkId,
        start_offset: u64,
        length: u64,
    ) -> AnalyzerResult<ChunkResult> {
        let mut file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AnalyzerError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => AnalyzerError::Io(e),
        })?;
        let file_size = file.metadata()?.len();
        self.process_range(&mut file, file_size, chunk_id, start_offset, length)
    }

    /// 处理可定位读取器中的一段区间
    pub fn process_range<R: Read + Seek>(
        &self,
        reader: &mut R,
        file_size: u64,
        chunk_id: ChunkId,
        start_offset: u64,
        length: u64,
    ) -> AnalyzerResult<ChunkResult> {
        let end_offset = start_offset
            .checked_add(length)
            .filter(|end| *end <= file_size)
            .ok_or(AnalyzerError::InvalidChunkRange {
                start_offset,
                length,
                file_size,
            })?;

        let mut result = ChunkResult::empty(chunk_id);
        if length == 0 {
            return Ok(result);
        }

        let seek_to = start_offset.saturating_sub(1);
        reader.seek(SeekFrom::Start(seek_to))?;
        let mut buffered = BufReader::with_capacity(self.read_buffer_bytes, reader);
        let mut line = Vec::new();
        let mut position = start_offset;

        if start_offset > 0 {
            let mut previous = [0u8; 1];
            buffered.read_exact(&mut previous)?;
            if previous[0] != b'\n' {
                let skipped = buffered.read_until(b'\n', &mut line)?;
                position += skipped as u64;
                debug!(chunk_id = chunk_id, skipped = skipped, "跳过开头的残行");
            }
        }

        let mut lines = 0u64;
        while position < end_offset {
            line.clear();
            let read = buffered.read_until(b'\n', &mut line)?;
            if read == 0 {
                break;
            }
            position += read as u64;
            lines += 1;

            let mut content: &[u8] = &line;
            if let Some(stripped) = content.strip_suffix(b"\n") {
                content = stripped;
            }
            if let Some(stripped) = content.strip_suffix(b"\r") {
                content = stripped;
            }
            result.record(classify_line(&String::from_utf8_lossy(content)));
        }

        debug!(
            chunk_id = chunk_id,
            lines = lines,
            requests = result.request_count,
            errors = result.error_count,
            malformed = result.malformed_count,
            "分块处理完成"
        );

        Ok(result)
    }
}

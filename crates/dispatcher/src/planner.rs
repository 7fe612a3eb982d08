//! 分块规划
//!
//! 按目标大小切分文件，边界向后对齐到下一个换行符之后。所有分块按序
//! 拼接恰好覆盖 `[0, file_size)`，没有空隙也没有重叠。

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tracing::debug;

use analyzer_core::{AnalyzerError, AnalyzerResult, Chunk};

const SCAN_BUFFER_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    chunk_size: u64,
}

impl ChunkPlanner {
    pub fn new(chunk_size: u64) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// 对可定位的读取器规划分块
    ///
    /// `file_size` 在作业开始时确定，之后文件增长的部分不会被规划。
    pub fn plan<R: Read + Seek>(
        &self,
        reader: &mut R,
        file_size: u64,
    ) -> AnalyzerResult<Vec<Chunk>> {
        if file_size == 0 {
            return Ok(vec![Chunk::new(0, 0, 0)]);
        }

        let mut boundaries = vec![0u64];
        let mut provisional = self.chunk_size;

        while provisional < file_size {
            let previous = boundaries[boundaries.len() - 1];
            if provisional > previous {
                let snapped = snap_to_line_end(reader, provisional, file_size)?;
                if snapped >= file_size {
                    break;
                }
                boundaries.push(snapped);
            }
            provisional += self.chunk_size;
        }
        boundaries.push(file_size);

        let chunks: Vec<Chunk> = boundaries
            .windows(2)
            .enumerate()
            .map(|(i, w)| Chunk::new(i as u64, w[0], w[1] - w[0]))
            .collect();

        debug!(
            file_size = file_size,
            chunk_size = self.chunk_size,
            chunks = chunks.len(),
            "分块规划完成"
        );

        Ok(chunks)
    }

    /// 规划磁盘文件，返回文件大小和分块列表
    pub async fn plan_file(&self, path: impl AsRef<Path>) -> AnalyzerResult<(u64, Vec<Chunk>)> {
        let path = path.as_ref().to_path_buf();
        let file_size = tokio::fs::metadata(&path)
            .await
            .map_err(|e| open_error(&path, e))?
            .len();
        let chunks = self.plan_file_with_size(path, file_size).await?;
        Ok((file_size, chunks))
    }

    /// 按提交时记录的文件大小规划，之后追加的内容不参与本次作业
    pub async fn plan_file_with_size(
        &self,
        path: impl AsRef<Path>,
        file_size: u64,
    ) -> AnalyzerResult<Vec<Chunk>> {
        let path = path.as_ref().to_path_buf();
        let planner = self.clone();

        tokio::task::spawn_blocking(move || {
            let mut file = std::fs::File::open(&path).map_err(|e| open_error(&path, e))?;
            planner.plan(&mut file, file_size)
        })
        .await
        .map_err(|e| AnalyzerError::Internal(format!("分块规划任务失败: {e}")))?
    }
}

fn open_error(path: &Path, e: std::io::Error) -> AnalyzerError {
    match e.kind() {
        std::io::ErrorKind::NotFound => AnalyzerError::FileNotFound {
            path: path.display().to_string(),
        },
        _ => AnalyzerError::Io(e),
    }
}

/// 返回 `provisional` 之后（含前一字节）第一个换行符的下一个位置
///
/// 若 `provisional - 1` 处已是换行符，边界保持不变。扫描到 `file_size`
/// 仍未找到换行符时返回 `file_size`。
fn snap_to_line_end<R: Read + Seek>(
    reader: &mut R,
    provisional: u64,
    file_size: u64,
) -> AnalyzerResult<u64> {
    let scan_start = provisional - 1;
    reader.seek(SeekFrom::Start(scan_start))?;

    let mut limited = reader.by_ref().take(file_size - scan_start);
    let mut buffer = [0u8; SCAN_BUFFER_BYTES];
    let mut position = scan_start;

    loop {
        let read = limited.read(&mut buffer)?;
        if read == 0 {
            return Ok(file_size);
        }
        if let Some(index) = buffer[..read].iter().position(|&b| b == b'\n') {
            return Ok(position + index as u64 + 1);
        }
        position += read as u64;
    }
}

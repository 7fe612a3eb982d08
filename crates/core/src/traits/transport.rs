//! Dispatcher到Worker的传输接口
//!
//! Dispatcher只要求到每个Worker有一条可靠的请求/响应通道。具体传输
//! （HTTP、进程内调用、测试桩）实现该trait即可。

use async_trait::async_trait;

use crate::models::{AssignChunkRequest, ChunkResult, WorkerInfo};
use crate::AnalyzerResult;

#[async_trait]
pub trait WorkerTransport: Send + Sync {
    /// 在指定Worker上执行一个分块，返回其解析结果
    ///
    /// 返回错误表示本次尝试失败（网络错误、Worker显式拒绝等），由
    /// Dispatcher决定是否重新分配。超时由调用方控制。
    async fn assign_chunk(
        &self,
        worker: &WorkerInfo,
        request: AssignChunkRequest,
    ) -> AnalyzerResult<ChunkResult>;
}

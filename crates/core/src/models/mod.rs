pub mod chunk;
pub mod job;
pub mod message;
pub mod metrics;
pub mod worker;

pub use chunk::{Assignment, Chunk, ChunkId, ChunkResult, ChunkState};
pub use job::{JobId, JobState, JobStatus};
pub use message::{Ack, AssignChunkRequest, SubmitJobRequest, SubmitJobResponse};
pub use metrics::{AggregateMetrics, MetricsSnapshot};
pub use worker::{WorkerHealth, WorkerInfo, WorkerRegistration};

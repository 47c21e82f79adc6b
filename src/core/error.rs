//! Error types for the streaming engine

use thiserror::Error;

use crate::voxel::chunk::ChunkKey;

/// Main error type for the engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Chunk {key} failed to build: {reason}")]
    Build { key: ChunkKey, reason: String },

    #[error("Join timed out with {pending} job(s) still running")]
    JoinTimeout { pending: usize },

    #[error("Join was interrupted")]
    Interrupted,

    #[error("Job panicked: {0}")]
    JobPanicked(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

impl Error {
    /// True for errors raised by the fork-join barrier rather than by a job.
    pub fn is_join_failure(&self) -> bool {
        matches!(self, Error::JoinTimeout { .. } | Error::Interrupted)
    }
}

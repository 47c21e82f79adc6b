//! Chunk streaming around a moving viewpoint
//!
//! Key concepts:
//! - Cached set: chunks built and resident in the world octree
//! - Visible set: the cached chunks listeners currently care about
//! - Fork-join: builds and notifications fan out to a worker pool and are
//!   joined before either map changes

pub mod jobs;
pub mod manager;

pub use jobs::{Interrupter, JobHandle, JobSystem};
pub use manager::{ChunkListener, ChunkManager, ChunkUpdate, ChunkUpdateKind, RefreshReport};

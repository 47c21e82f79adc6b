//! Voxel data structures and operations

pub mod voxel;
pub mod chunk;
pub mod world;
pub mod svo;
pub mod streaming;

pub use chunk::{Chunk, ChunkKey, CHUNK_LEVELS, CHUNK_SIZE};
pub use voxel::{Face, FaceSet, Material, Voxel};
pub use world::World;
pub use streaming::{ChunkListener, ChunkManager, ChunkUpdate, ChunkUpdateKind, RefreshReport};

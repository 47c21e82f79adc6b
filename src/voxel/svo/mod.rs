//! Sparse Voxel Octree implementation

pub mod node;
pub mod octree;
pub mod context;
pub mod traversal;
pub mod oracle;
pub mod builder;

pub use node::{Children, Node, NodeId, NodeKind};
pub use octree::{Octree, OctreeId};
pub use context::{ContextPool, PooledContext, TraversalContext};
pub use traversal::{Hit, LevelSet, NodeFilter, Recorder, SurfaceHit, SurfaceNormal, TraversalSettings};
pub use oracle::{HeightBands, MaterialPolicy, RegionHint, UniformMaterial, VoxelOracle};
pub use builder::{build_chunk, BuiltChunk, ChunkBuilder};

//! Chunk grid: fixed 16³ cubes of world space, each the root of a small octree

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use glam::{IVec3, Vec3};

use crate::math::Aabb;
use crate::voxel::svo::NodeId;

/// Edge length of a chunk in cells
pub const CHUNK_SIZE: i32 = 16;

/// Octree levels inside a chunk (16 -> 8 -> 4 -> 2 -> 1)
pub const CHUNK_LEVELS: u8 = 4;

/// Identifies a chunk by its minimum corner, always a multiple of [`CHUNK_SIZE`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkKey {
    /// Key of the chunk at grid cell `(cx, cy, cz)`
    pub fn from_cell(cell: IVec3) -> Self {
        let origin = cell * CHUNK_SIZE;
        Self { x: origin.x, y: origin.y, z: origin.z }
    }

    /// Key of the chunk containing `pos`
    pub fn from_world_pos(pos: Vec3) -> Self {
        Self::from_cell((pos / CHUNK_SIZE as f32).floor().as_ivec3())
    }

    /// World-space minimum corner
    pub fn origin(&self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }

    /// Grid cell coordinate (origin divided by the chunk size)
    pub fn cell(&self) -> IVec3 {
        self.origin().div_euclid(IVec3::splat(CHUNK_SIZE))
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::cube(self.origin().as_vec3(), CHUNK_SIZE as f32)
    }

    /// Every chunk overlapping `volume`, in x, y, z order.
    ///
    /// The max faces are open, so a volume ending exactly on a chunk
    /// boundary does not pull in the next chunk. A volume with no extent
    /// on some axis covers nothing.
    pub fn covering(volume: &Aabb) -> Vec<ChunkKey> {
        if volume.max.cmple(volume.min).any() {
            return Vec::new();
        }
        let size = CHUNK_SIZE as f32;
        let lo = (volume.min / size).floor().as_ivec3();
        let hi = (volume.max / size).ceil().as_ivec3() - IVec3::ONE;

        let mut keys = Vec::with_capacity(((hi - lo + IVec3::ONE).element_product()).max(0) as usize);
        for x in lo.x..=hi.x {
            for y in lo.y..=hi.y {
                for z in lo.z..=hi.z {
                    keys.push(Self::from_cell(IVec3::new(x, y, z)));
                }
            }
        }
        keys
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A chunk resident in the world octree.
///
/// Created by a build job once its nodes have been grafted in; shared between
/// the manager's maps and listeners.
#[derive(Debug)]
pub struct Chunk {
    key: ChunkKey,
    root: NodeId,
    voxel_count: usize,
    build_time: Duration,
    valid: AtomicBool,
}

impl Chunk {
    pub fn new(key: ChunkKey, root: NodeId, voxel_count: usize, build_time: Duration) -> Self {
        Self { key, root, voxel_count, build_time, valid: AtomicBool::new(true) }
    }

    pub fn key(&self) -> ChunkKey {
        self.key
    }

    pub fn bounds(&self) -> Aabb {
        self.key.bounds()
    }

    /// Chunk root in the world octree
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Leaf entities created by the build
    pub fn voxel_count(&self) -> usize {
        self.voxel_count
    }

    pub fn build_time(&self) -> Duration {
        self.build_time
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Mark the chunk stale so the next refresh rebuilds it
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

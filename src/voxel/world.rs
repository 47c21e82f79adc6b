//! Shared world: the voxel octree plus what build and query tasks need to use it

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use glam::Vec3;

use super::chunk::{Chunk, ChunkKey, CHUNK_LEVELS};
use super::svo::builder::{build_chunk, BuiltChunk};
use super::svo::traversal::{self, Hit, Recorder, SurfaceHit, TraversalSettings};
use super::svo::{ContextPool, MaterialPolicy, Octree, VoxelOracle};
use super::voxel::Voxel;
use crate::math::{Aabb, Ray};

/// Container for the world octree, shared between the manager, build jobs
/// and listeners as `Arc<World>`.
///
/// Readers hold the read lock for the length of one query; chunk inserts and
/// removals take the write lock, which also guards the node pool.
pub struct World {
    octree: RwLock<Octree<Voxel>>,
    contexts: ContextPool,
    oracle: Arc<dyn VoxelOracle>,
    materials: Arc<dyn MaterialPolicy>,
}

impl World {
    /// Create an empty world with `context_pool_size` prewarmed traversal contexts
    pub fn new(
        oracle: Arc<dyn VoxelOracle>,
        materials: Arc<dyn MaterialPolicy>,
        context_pool_size: usize,
    ) -> Self {
        Self {
            octree: RwLock::new(Octree::new(CHUNK_LEVELS)),
            contexts: ContextPool::new(context_pool_size),
            oracle,
            materials,
        }
    }

    pub fn oracle(&self) -> &dyn VoxelOracle {
        self.oracle.as_ref()
    }

    pub fn materials(&self) -> &dyn MaterialPolicy {
        self.materials.as_ref()
    }

    pub fn contexts(&self) -> &ContextPool {
        &self.contexts
    }

    /// Read access to the octree. Node ids from it stay meaningful only while
    /// the guard is held.
    pub fn read(&self) -> RwLockReadGuard<'_, Octree<Voxel>> {
        self.octree.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Octree<Voxel>> {
        self.octree.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build a chunk fragment without touching the shared octree
    pub fn build_chunk(&self, key: ChunkKey) -> BuiltChunk {
        let mut ctx = self.contexts.acquire();
        build_chunk(key, self.oracle.as_ref(), self.materials.as_ref(), &mut ctx)
    }

    /// Graft a built chunk into the octree, replacing any chunk at the same key
    pub fn insert_chunk(&self, built: BuiltChunk) -> Arc<Chunk> {
        let BuiltChunk { key, octree, voxel_count, build_time } = built;
        let root = self.write().insert_chunk(octree);
        Arc::new(Chunk::new(key, root, voxel_count, build_time))
    }

    /// Remove the chunk at `key` and return its nodes to the pool
    pub fn remove_chunk(&self, key: ChunkKey) -> bool {
        self.write().remove_chunk(&key.bounds())
    }

    pub fn has_chunk(&self, key: ChunkKey) -> bool {
        self.read().find_chunk(&key.bounds()).is_some()
    }

    pub fn chunk_count(&self) -> usize {
        self.read().chunk_count()
    }

    /// Live octree nodes
    pub fn node_count(&self) -> usize {
        self.read().len()
    }

    /// Freed nodes waiting for reuse
    pub fn free_nodes(&self) -> usize {
        self.read().free_slots()
    }

    /// Voxel whose cell contains `point`
    pub fn voxel_at(&self, point: Vec3) -> Option<Voxel> {
        let octree = self.read();
        let mut ctx = self.contexts.acquire();
        ctx.bind(&octree);
        let (leaf, _) = traversal::locate_from_root(&octree, point, &mut ctx)?;
        octree.get(leaf).value().copied()
    }

    /// Every recorded hit along `ray`
    pub fn raycast(&self, ray: &Ray, settings: &TraversalSettings<Voxel>) -> Recorder<Voxel> {
        let octree = self.read();
        let mut ctx = self.contexts.acquire();
        ctx.bind(&octree);
        traversal::intersect_ray(&octree, ray, settings, &mut ctx)
    }

    pub fn nearest_hit(&self, ray: &Ray, settings: &TraversalSettings<Voxel>) -> Option<Hit> {
        let octree = self.read();
        let mut ctx = self.contexts.acquire();
        ctx.bind(&octree);
        traversal::nearest_hit(&octree, ray, settings, &mut ctx)
    }

    pub fn hit_normal(&self, ray: &Ray, settings: &TraversalSettings<Voxel>) -> Option<SurfaceHit> {
        let octree = self.read();
        let mut ctx = self.contexts.acquire();
        ctx.bind(&octree);
        traversal::hit_normal(&octree, ray, settings, &mut ctx)
    }

    /// Nodes overlapping `volume` at the recorded levels
    pub fn query_box(&self, volume: &Aabb, settings: &TraversalSettings<Voxel>) -> Recorder<Voxel> {
        let octree = self.read();
        let mut ctx = self.contexts.acquire();
        ctx.bind(&octree);
        traversal::intersect_box(&octree, volume, settings, &mut ctx)
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let octree = self.read();
        f.debug_struct("World")
            .field("chunks", &octree.chunk_count())
            .field("nodes", &octree.len())
            .field("root_bounds", &octree.root_bounds())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::svo::{SurfaceNormal, UniformMaterial};
    use crate::voxel::voxel::{Face, Material};
    use glam::IVec3;

    fn slab_world() -> World {
        World::new(
            Arc::new(|p: IVec3| (0..16).contains(&p.y)),
            Arc::new(UniformMaterial(Material::Stone)),
            2,
        )
    }

    fn origin() -> ChunkKey {
        ChunkKey::from_world_pos(Vec3::ZERO)
    }

    #[test]
    fn test_slab_scenario() {
        let world = slab_world();
        let chunk = world.insert_chunk(world.build_chunk(origin()));
        assert!(chunk.is_valid());
        assert_eq!(chunk.voxel_count(), 4096);

        for y in 0..16 {
            let voxel = world.voxel_at(Vec3::new(3.5, y as f32 + 0.5, 9.5));
            assert_eq!(voxel.map(|v| v.material), Some(Material::Stone));
        }
        assert!(world.voxel_at(Vec3::new(1.0, 1.0, 1.0)).is_some());
        assert!(world.voxel_at(Vec3::new(1.0, 20.0, 1.0)).is_none());
    }

    #[test]
    fn test_raycast_from_above() {
        let world = slab_world();
        world.insert_chunk(world.build_chunk(origin()));

        let ray = Ray::new(Vec3::new(4.5, 40.0, 4.5), -Vec3::Y);
        let all = world.raycast(&ray, &TraversalSettings::default());
        assert_eq!(all.len(), 16);

        let surface = world.hit_normal(&ray, &TraversalSettings::default()).unwrap();
        assert_eq!(surface.normal, SurfaceNormal::Face(Face::PosY));
        assert_eq!(surface.hit.bounds.min, Vec3::new(4.0, 15.0, 4.0));
        assert_eq!(world.nearest_hit(&ray, &TraversalSettings::default()), Some(surface.hit));

        let away = Ray::new(Vec3::new(4.5, 40.0, 4.5), Vec3::Y);
        let recorder = world.raycast(&away, &TraversalSettings::default());
        assert!(recorder.is_empty());
        assert_eq!(recorder.nodes_visited, 0);
        assert!(world.nearest_hit(&away, &TraversalSettings::default()).is_none());
    }

    #[test]
    fn test_query_box_spans_chunks() {
        let world = slab_world();
        let east = ChunkKey { x: 16, y: 0, z: 0 };
        world.insert_chunk(world.build_chunk(origin()));
        world.insert_chunk(world.build_chunk(east));

        let volume = Aabb::new(Vec3::new(14.5, 0.5, 0.5), Vec3::new(17.5, 0.9, 0.9));
        let hits = world.query_box(&volume, &TraversalSettings::default());
        assert_eq!(hits.len(), 4);

        let chunks = world.query_box(&volume, &TraversalSettings::at_level(CHUNK_LEVELS));
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_remove_returns_nodes_to_pool() {
        let world = slab_world();
        let east = ChunkKey { x: 16, y: 0, z: 0 };
        world.insert_chunk(world.build_chunk(origin()));
        world.insert_chunk(world.build_chunk(east));
        let nodes = world.node_count();

        assert!(world.remove_chunk(east));
        assert!(!world.has_chunk(east));
        assert!(world.has_chunk(origin()));
        assert!(world.free_nodes() > 4096);
        assert!(world.voxel_at(Vec3::new(20.0, 1.0, 1.0)).is_none());

        world.insert_chunk(world.build_chunk(east));
        assert_eq!(world.node_count(), nodes);
        assert_eq!(world.chunk_count(), 2);
        assert!(!world.remove_chunk(ChunkKey { x: 64, y: 0, z: 0 }));
    }

    #[test]
    fn test_contexts_return_to_pool() {
        let world = slab_world();
        world.insert_chunk(world.build_chunk(origin()));
        for _ in 0..10 {
            world.voxel_at(Vec3::splat(1.5));
        }
        assert_eq!(world.contexts().created(), 2);
        assert_eq!(world.contexts().available(), 2);
    }
}

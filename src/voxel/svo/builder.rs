//! Chunk construction: samples the oracle into a dense scratch volume and
//! assembles a sparse octree fragment from it.

use std::time::{Duration, Instant};

use glam::IVec3;

use super::context::TraversalContext;
use super::node::{Node, NodeId};
use super::octree::Octree;
use super::oracle::{MaterialPolicy, RegionHint, VoxelOracle};
use crate::math::Aabb;
use crate::voxel::chunk::{ChunkKey, CHUNK_LEVELS, CHUNK_SIZE};
use crate::voxel::voxel::{Face, Material, Voxel};

/// Scratch edge: the chunk plus a one-cell border on every side
const PADDED: i32 = CHUNK_SIZE + 2;

/// Output of a chunk build, ready for [`Octree::insert_chunk`]
#[derive(Debug)]
pub struct BuiltChunk {
    pub key: ChunkKey,
    pub octree: Octree<Voxel>,
    /// Leaf entities created
    pub voxel_count: usize,
    pub build_time: Duration,
}

/// Dense materials for a chunk and its border, x varying fastest
struct Scratch {
    origin: IVec3,
    cells: Vec<Option<Material>>,
}

impl Scratch {
    fn sample(origin: IVec3, oracle: &dyn VoxelOracle, materials: &dyn MaterialPolicy) -> Self {
        let region = Aabb::new(
            (origin - IVec3::ONE).as_vec3(),
            (origin + IVec3::splat(CHUNK_SIZE + 1)).as_vec3(),
        );
        let hint = oracle.classify_region(&region);

        let mut cells = Vec::with_capacity((PADDED * PADDED * PADDED) as usize);
        for z in -1..=CHUNK_SIZE {
            for y in -1..=CHUNK_SIZE {
                for x in -1..=CHUNK_SIZE {
                    let pos = origin + IVec3::new(x, y, z);
                    let solid = match hint {
                        RegionHint::Empty => false,
                        RegionHint::Solid => true,
                        RegionHint::Mixed | RegionHint::Unknown => oracle.is_solid(pos),
                    };
                    cells.push(materials.material_at(pos, solid));
                }
            }
        }
        Self { origin, cells }
    }

    fn get(&self, pos: IVec3) -> Option<Material> {
        let local = pos - self.origin + IVec3::ONE;
        debug_assert!(local.cmpge(IVec3::ZERO).all() && local.cmplt(IVec3::splat(PADDED)).all());
        self.cells[(local.z * PADDED * PADDED + local.y * PADDED + local.x) as usize]
    }

    /// Leaf entity at `pos`, with faces and connections from its six neighbours
    fn voxel(&self, pos: IVec3, material: Material) -> Voxel {
        let mut voxel = Voxel::new(material);
        for face in Face::ALL {
            let Some(neighbour) = self.get(pos + face.offset()) else {
                continue;
            };
            voxel.add_connection(face);
            if !neighbour.is_fluid() || material.is_fluid() {
                voxel.remove_face(face);
            }
        }
        voxel
    }
}

/// Builds chunk fragments from an oracle and a material policy
pub struct ChunkBuilder<'a> {
    oracle: &'a dyn VoxelOracle,
    materials: &'a dyn MaterialPolicy,
}

impl<'a> ChunkBuilder<'a> {
    pub fn new(oracle: &'a dyn VoxelOracle, materials: &'a dyn MaterialPolicy) -> Self {
        Self { oracle, materials }
    }

    /// Build the chunk at `key`. `ctx` is rebound to the new fragment.
    pub fn build(&self, key: ChunkKey, ctx: &mut TraversalContext) -> BuiltChunk {
        let start = Instant::now();
        let bounds = key.bounds();
        let scratch = Scratch::sample(key.origin(), self.oracle, self.materials);

        let mut octree = Octree::detached(bounds, CHUNK_LEVELS);
        ctx.bind(&octree);
        let mut voxel_count = 0;
        let root = octree.root();
        self.build_node(&mut octree, root, bounds, CHUNK_LEVELS, &scratch, ctx, &mut voxel_count);
        drop(scratch);

        let build_time = start.elapsed();
        log::trace!(
            "Built chunk {} with {} voxels ({} nodes) in {:?}",
            key,
            voxel_count,
            octree.len(),
            build_time
        );
        BuiltChunk { key, octree, voxel_count, build_time }
    }

    /// Fill the children of the node covering `node_box` at `level`.
    ///
    /// `node` is `None` for interior nodes that do not exist yet; one is only
    /// allocated once a child turns out to be non-empty.
    #[allow(clippy::too_many_arguments)]
    fn build_node(
        &self,
        octree: &mut Octree<Voxel>,
        mut node: Option<NodeId>,
        node_box: Aabb,
        level: u8,
        scratch: &Scratch,
        ctx: &mut TraversalContext,
        voxel_count: &mut usize,
    ) -> Option<NodeId> {
        ctx.enter(node_box);
        for octant in 0..8u8 {
            let child_box = ctx.descend(octant);
            ctx.reset();

            let child = if level == 1 {
                let pos = child_box.min.as_ivec3();
                scratch.get(pos).map(|material| {
                    *voxel_count += 1;
                    octree.alloc(Node::leaf(scratch.voxel(pos, material)))
                })
            } else {
                let child = self.build_node(octree, None, child_box, level - 1, scratch, ctx, voxel_count);
                ctx.enter(node_box);
                child
            };

            if let Some(child) = child {
                let parent = *node.get_or_insert_with(|| octree.alloc(Node::internal()));
                octree.set_child(parent, octant, Some(child));
            }
        }
        node
    }
}

/// Build the chunk at `key` into a detached fragment
pub fn build_chunk(
    key: ChunkKey,
    oracle: &dyn VoxelOracle,
    materials: &dyn MaterialPolicy,
    ctx: &mut TraversalContext,
) -> BuiltChunk {
    ChunkBuilder::new(oracle, materials).build(key, ctx)
}

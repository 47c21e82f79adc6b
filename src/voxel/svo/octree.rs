//! Sparse voxel octree arena
//!
//! Nodes live in a single `Vec` of generational slots. Freed slots go onto a
//! free list and are handed out again by [`Octree::alloc`], so the free list
//! doubles as the node pool for evicted chunks.

use std::sync::atomic::{AtomicU64, Ordering};

use super::context::TraversalContext;
use super::node::{Node, NodeId, NodeKind};
use crate::math::Aabb;

/// Root doublings beyond this are a coordinate blow-up, not a real world
const MAX_LEVEL: u8 = 40;

static NEXT_OCTREE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an octree, used to bind traversal contexts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OctreeId(u64);

impl OctreeId {
    fn next() -> Self {
        Self(NEXT_OCTREE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    node: Option<Node<T>>,
}

/// Sparse octree over leaf entities of type `T`
#[derive(Debug)]
pub struct Octree<T> {
    id: OctreeId,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
    root: Option<NodeId>,
    root_bounds: Aabb,
    /// Halvings from the root down to the leaves
    cur_level: u8,
    /// Level at which chunk roots sit
    chunk_level: u8,
}

impl<T> Octree<T> {
    /// Create an empty world octree whose chunks are `chunk_level` halvings deep
    pub fn new(chunk_level: u8) -> Self {
        Self {
            id: OctreeId::next(),
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            root: None,
            root_bounds: Aabb::default(),
            cur_level: chunk_level,
            chunk_level,
        }
    }

    /// Create a standalone tree rooted at a chunk root covering `bounds`.
    ///
    /// Build tasks fill one of these privately and hand it to
    /// [`Octree::insert_chunk`].
    pub fn detached(bounds: Aabb, level: u8) -> Self {
        let mut octree = Self::new(level);
        let root = octree.alloc(Node::chunk_root(bounds));
        octree.root = Some(root);
        octree.root_bounds = bounds;
        octree
    }

    pub fn id(&self) -> OctreeId {
        self.id
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn root_bounds(&self) -> Aabb {
        self.root_bounds
    }

    pub fn cur_level(&self) -> u8 {
        self.cur_level
    }

    pub fn chunk_level(&self) -> u8 {
        self.chunk_level
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Slots waiting on the free list
    pub fn free_slots(&self) -> usize {
        self.free.len()
    }

    /// Allocate a node, reusing a freed slot when one is available
    pub fn alloc(&mut self, node: Node<T>) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId { index, generation: slot.generation };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, node: Some(node) });
        NodeId { index, generation: 0 }
    }

    /// Return a single node to the pool. Freeing a stale id is a contract violation.
    pub fn free(&mut self, id: NodeId) -> Node<T> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation && s.node.is_some());
        let Some(slot) = slot else {
            panic!("octree node {id:?} freed twice or never allocated");
        };
        let node = slot.node.take().unwrap_or_else(|| unreachable!());
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        node
    }

    /// Look up a node; `None` for ids whose slot has since been freed
    pub fn node(&self, id: NodeId) -> Option<&Node<T>> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node<T>> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
    }

    /// Like [`Octree::node`] but a stale id is a contract violation
    pub fn get(&self, id: NodeId) -> &Node<T> {
        match self.node(id) {
            Some(node) => node,
            None => panic!("stale octree node {id:?}"),
        }
    }

    fn get_mut(&mut self, id: NodeId) -> &mut Node<T> {
        match self.node_mut(id) {
            Some(node) => node,
            None => panic!("stale octree node {id:?}"),
        }
    }

    /// Attach `child` under `parent` at `octant`, returning the previous occupant.
    /// The previous occupant is detached but not freed.
    pub fn set_child(&mut self, parent: NodeId, octant: u8, child: Option<NodeId>) -> Option<NodeId> {
        let Some(children) = self.get_mut(parent).children_mut() else {
            panic!("leaf node {parent:?} cannot hold children");
        };
        let previous = children.set(octant, child);
        if let Some(child) = child {
            self.get_mut(child).parent = Some(parent);
        }
        if let Some(previous) = previous.filter(|p| Some(*p) != child) {
            if let Some(node) = self.node_mut(previous) {
                node.parent = None;
            }
        }
        previous
    }

    /// Ids of `id` and all its descendants, parents before children
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(children) = self.get(next).children() {
                stack.extend(children.iter().map(|(_, c)| c).rev());
            }
        }
        out
    }

    /// Free `id` and everything below it. Returns the number of nodes released.
    pub fn free_subtree(&mut self, id: NodeId) -> usize {
        let ids = self.subtree(id);
        let count = ids.len();
        for id in ids {
            self.free(id);
        }
        count
    }

    /// Number of leaf entities below `id`
    pub fn leaf_count(&self, id: NodeId) -> usize {
        self.subtree(id)
            .into_iter()
            .filter(|&n| matches!(self.get(n).kind, NodeKind::Leaf(_)))
            .count()
    }

    /// Number of chunk roots in the whole tree
    pub fn chunk_count(&self) -> usize {
        self.slots
            .iter()
            .filter_map(|s| s.node.as_ref())
            .filter(|n| n.is_chunk_root())
            .count()
    }

    /// Derive the bounding box of any node by walking parent links up to a
    /// node with a known box and descending back down through `ctx`.
    pub fn bounds_of(&self, id: NodeId, ctx: &mut TraversalContext) -> Aabb {
        ctx.assert_bound(self);
        let mut path = Vec::new();
        let mut current = id;
        let base = loop {
            let node = self.get(current);
            if let Some(bounds) = node.explicit_bounds() {
                break bounds;
            }
            match node.parent {
                Some(parent) => {
                    let octant = self
                        .get(parent)
                        .children()
                        .and_then(|c| c.octant_of(current))
                        .unwrap_or_else(|| panic!("node {current:?} missing from its parent"));
                    path.push(octant);
                    current = parent;
                }
                None => break self.root_bounds,
            }
        };

        ctx.enter(base);
        for &octant in path.iter().rev() {
            ctx.descend(octant);
        }
        let bounds = ctx.current();
        ctx.reset();
        bounds
    }

    /// Find the chunk root whose box is exactly `bounds`
    pub fn find_chunk(&self, bounds: &Aabb) -> Option<NodeId> {
        let root = self.root?;
        let center = bounds.center();
        if !self.root_bounds.contains_point_half_open(center) {
            return None;
        }

        let mut node = root;
        let mut node_box = self.root_bounds;
        for _ in self.chunk_level..self.cur_level {
            let octant = node_box.octant_of(center);
            node = self.get(node).child(octant)?;
            node_box = node_box.child_octant(octant);
        }

        match self.get(node).explicit_bounds() {
            Some(found) if found == *bounds => Some(node),
            _ => None,
        }
    }

    /// Move every node of `fragment` into this arena. Returns the new id of the
    /// fragment's root, with no parent set.
    fn graft(&mut self, mut fragment: Octree<T>) -> Option<NodeId> {
        let fragment_root = fragment.root?;
        let order = fragment.subtree(fragment_root);

        let mut remap: Vec<Option<NodeId>> = vec![None; fragment.slots.len()];
        for &old in &order {
            remap[old.index as usize] = Some(self.alloc(Node::internal()));
        }
        let lookup = |remap: &[Option<NodeId>], old: NodeId| {
            remap[old.index as usize].unwrap_or_else(|| panic!("fragment node {old:?} not in subtree"))
        };

        for old in order {
            let mut node = fragment.free(old);
            node.parent = node.parent.map(|p| lookup(&remap, p));
            if let Some(children) = node.children_mut() {
                *children = children.map(|c| lookup(&remap, c));
            }
            *self.get_mut(lookup(&remap, old)) = node;
        }

        let new_root = lookup(&remap, fragment_root);
        self.get_mut(new_root).parent = None;
        Some(new_root)
    }

    /// Double the root box toward `bounds` until it is covered
    fn grow_to_contain(&mut self, bounds: &Aabb) {
        while !self.root_bounds.contains_aabb(bounds) {
            assert!(self.cur_level < MAX_LEVEL, "octree root grew past {MAX_LEVEL} levels");
            let old = self.root_bounds;
            let size = old.size();
            let mut octant = 0u8;
            let mut min = old.min;
            let mut max = old.max;
            for axis in 0..3 {
                if bounds.min[axis] < old.min[axis] {
                    min[axis] -= size[axis];
                    octant |= 1 << axis;
                } else {
                    max[axis] += size[axis];
                }
            }

            let new_root = self.alloc(Node::internal());
            if let Some(old_root) = self.root {
                self.set_child(new_root, octant, Some(old_root));
            }
            self.root = Some(new_root);
            self.root_bounds = Aabb::new(min, max);
            self.cur_level += 1;
            log::debug!(
                "Octree root grew to level {} covering {:?}..{:?}",
                self.cur_level,
                min,
                max
            );
        }
    }

    /// Graft a built chunk into the tree, replacing whatever chunk was there.
    ///
    /// `fragment` must come from [`Octree::detached`] with this tree's chunk level.
    pub fn insert_chunk(&mut self, fragment: Octree<T>) -> NodeId {
        assert_eq!(fragment.cur_level, self.chunk_level, "chunk fragment has the wrong depth");
        let bounds = fragment.root_bounds;

        let Some(root) = self.root else {
            let new_root = self.graft(fragment).unwrap_or_else(|| panic!("empty chunk fragment"));
            self.root = Some(new_root);
            self.root_bounds = bounds;
            self.cur_level = self.chunk_level;
            return new_root;
        };

        self.grow_to_contain(&bounds);
        if self.cur_level == self.chunk_level {
            // The root is the chunk being replaced
            self.free_subtree(root);
            let new_root = self.graft(fragment).unwrap_or_else(|| panic!("empty chunk fragment"));
            self.root = Some(new_root);
            return new_root;
        }
        let root = self.root.unwrap_or(root);

        let center = bounds.center();
        let mut node = root;
        let mut node_box = self.root_bounds;
        for _ in (self.chunk_level + 1)..self.cur_level {
            let octant = node_box.octant_of(center);
            node = match self.get(node).child(octant) {
                Some(child) => child,
                None => {
                    let child = self.alloc(Node::internal());
                    self.set_child(node, octant, Some(child));
                    child
                }
            };
            node_box = node_box.child_octant(octant);
        }

        let octant = node_box.octant_of(center);
        debug_assert_eq!(node_box.child_octant(octant), bounds, "chunk is not grid aligned");
        let chunk_root = self.graft(fragment).unwrap_or_else(|| panic!("empty chunk fragment"));
        if let Some(previous) = self.set_child(node, octant, Some(chunk_root)) {
            self.free_subtree(previous);
        }
        chunk_root
    }

    /// Remove the chunk covering `bounds`, freeing its nodes and pruning
    /// interior ancestors left without children.
    pub fn remove_chunk(&mut self, bounds: &Aabb) -> bool {
        let Some(chunk) = self.find_chunk(bounds) else {
            return false;
        };

        let mut parent = self.get(chunk).parent;
        self.free_subtree(chunk);

        if parent.is_none() {
            self.root = None;
            self.root_bounds = Aabb::default();
            self.cur_level = self.chunk_level;
            return true;
        }

        let mut child = chunk;
        while let Some(p) = parent {
            if let Some(children) = self.get_mut(p).children_mut() {
                if let Some(octant) = children.octant_of(child) {
                    children.set(octant, None);
                }
            }
            let node = self.get(p);
            let prunable = Some(p) != self.root && matches!(&node.kind, NodeKind::Internal(c) if c.is_empty());
            if !prunable {
                break;
            }
            parent = node.parent;
            child = p;
            self.free(p);
        }
        true
    }

    /// Iterate live chunk roots and their boxes
    pub fn chunks(&self) -> impl Iterator<Item = (NodeId, Aabb)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let node = slot.node.as_ref()?;
            let bounds = node.explicit_bounds()?;
            Some((NodeId { index: index as u32, generation: slot.generation }, bounds))
        })
    }

    /// Edge length of a chunk in this tree, if any chunk has been inserted
    pub fn chunk_edge(&self) -> Option<f32> {
        self.root?;
        let scale = (1u64 << (self.cur_level - self.chunk_level)) as f32;
        Some(self.root_bounds.size().x / scale)
    }

    /// Interior node count, for diagnostics
    pub fn internal_count(&self) -> usize {
        self.slots
            .iter()
            .filter_map(|s| s.node.as_ref())
            .filter(|n| matches!(n.kind, NodeKind::Internal(_)))
            .count()
    }
}

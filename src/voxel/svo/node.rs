//! Sparse octree node

use crate::math::Aabb;

/// Stable handle to a node in an [`Octree`](super::Octree) arena.
///
/// The generation changes every time a slot is freed, so a handle kept past
/// its chunk's eviction never aliases a newer node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    pub fn index(self) -> u32 {
        self.index
    }
}

/// Up to eight child slots, indexed by octant (bit 0=x, bit 1=y, bit 2=z).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Children([Option<NodeId>; 8]);

impl Children {
    pub fn get(&self, octant: u8) -> Option<NodeId> {
        self.0[octant as usize]
    }

    pub fn set(&mut self, octant: u8, child: Option<NodeId>) -> Option<NodeId> {
        std::mem::replace(&mut self.0[octant as usize], child)
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    pub fn count(&self) -> usize {
        self.0.iter().filter(|c| c.is_some()).count()
    }

    /// Present children as (octant, id), in octant order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (u8, NodeId)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.map(|id| (i as u8, id)))
    }

    /// Octant holding `id`, if it is a child here
    pub fn octant_of(&self, id: NodeId) -> Option<u8> {
        self.0.iter().position(|c| *c == Some(id)).map(|i| i as u8)
    }

    pub(crate) fn map(&self, mut f: impl FnMut(NodeId) -> NodeId) -> Children {
        Children(self.0.map(|c| c.map(&mut f)))
    }
}

/// What a node is. Traversal code matches on this exhaustively.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind<T> {
    /// Interior node; its box is derived from its parent's
    Internal(Children),
    /// Root of a chunk's subtree; keeps its box so range queries skip the derivation
    ChunkRoot { bounds: Aabb, children: Children },
    /// Entity at depth 0
    Leaf(T),
}

/// A node in the arena, with a non-owning back-reference to its parent.
#[derive(Clone, Debug, PartialEq)]
pub struct Node<T> {
    pub parent: Option<NodeId>,
    pub kind: NodeKind<T>,
}

impl<T> Node<T> {
    pub fn internal() -> Self {
        Self { parent: None, kind: NodeKind::Internal(Children::default()) }
    }

    pub fn chunk_root(bounds: Aabb) -> Self {
        Self { parent: None, kind: NodeKind::ChunkRoot { bounds, children: Children::default() } }
    }

    pub fn leaf(value: T) -> Self {
        Self { parent: None, kind: NodeKind::Leaf(value) }
    }

    pub fn children(&self) -> Option<&Children> {
        match &self.kind {
            NodeKind::Internal(children) | NodeKind::ChunkRoot { children, .. } => Some(children),
            NodeKind::Leaf(_) => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Children> {
        match &mut self.kind {
            NodeKind::Internal(children) | NodeKind::ChunkRoot { children, .. } => Some(children),
            NodeKind::Leaf(_) => None,
        }
    }

    pub fn child(&self, octant: u8) -> Option<NodeId> {
        self.children().and_then(|c| c.get(octant))
    }

    /// Leaf entities, and interior nodes with no children, end a descent
    pub fn is_leaf(&self) -> bool {
        self.children().is_none_or(Children::is_empty)
    }

    /// Bounding box stored on the node itself (chunk roots only)
    pub fn explicit_bounds(&self) -> Option<Aabb> {
        match self.kind {
            NodeKind::ChunkRoot { bounds, .. } => Some(bounds),
            NodeKind::Internal(_) | NodeKind::Leaf(_) => None,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match &self.kind {
            NodeKind::Leaf(value) => Some(value),
            NodeKind::Internal(_) | NodeKind::ChunkRoot { .. } => None,
        }
    }

    pub fn value_mut(&mut self) -> Option<&mut T> {
        match &mut self.kind {
            NodeKind::Leaf(value) => Some(value),
            NodeKind::Internal(_) | NodeKind::ChunkRoot { .. } => None,
        }
    }

    pub fn is_chunk_root(&self) -> bool {
        matches!(self.kind, NodeKind::ChunkRoot { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn id(index: u32) -> NodeId {
        NodeId { index, generation: 0 }
    }

    #[test]
    fn test_children_sparse() {
        let mut children = Children::default();
        assert!(children.is_empty());

        children.set(0, Some(id(4)));
        children.set(3, Some(id(9)));
        children.set(7, Some(id(2)));

        assert_eq!(children.count(), 3);
        assert_eq!(children.get(1), None);
        assert_eq!(children.octant_of(id(9)), Some(3));
        let octants: Vec<u8> = children.iter().map(|(o, _)| o).collect();
        assert_eq!(octants, vec![0, 3, 7]);
        let reversed: Vec<u8> = children.iter().rev().map(|(o, _)| o).collect();
        assert_eq!(reversed, vec![7, 3, 0]);

        assert_eq!(children.set(3, None), Some(id(9)));
        assert_eq!(children.count(), 2);
    }

    #[test]
    fn test_leaf_flag() {
        let leaf: Node<u8> = Node::leaf(1);
        assert!(leaf.is_leaf());
        assert_eq!(leaf.value(), Some(&1));

        let mut internal: Node<u8> = Node::internal();
        assert!(internal.is_leaf());
        internal.children_mut().unwrap().set(2, Some(id(1)));
        assert!(!internal.is_leaf());
        assert_eq!(internal.child(2), Some(id(1)));
    }

    #[test]
    fn test_chunk_root_bounds() {
        let bounds = Aabb::cube(Vec3::ZERO, 16.0);
        let root: Node<u8> = Node::chunk_root(bounds);
        assert!(root.is_chunk_root());
        assert_eq!(root.explicit_bounds(), Some(bounds));
        assert_eq!(Node::<u8>::internal().explicit_bounds(), None);
    }
}

//! Traversal context: derives child boxes on demand during a descent.
//!
//! Interior nodes do not store their bounding box. A context is bound to one
//! octree, entered at the box of the node a traversal call starts from, and
//! then asked for the box of each child octant in turn. Contexts are checked
//! out of a [`ContextPool`] and go back on drop.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::octree::{Octree, OctreeId};
use crate::math::Aabb;

/// Mutable cursor over octree boxes
#[derive(Debug, Default)]
pub struct TraversalContext {
    octree: Option<OctreeId>,
    /// Box of the node the current traversal call started at
    origin: Aabb,
    current: Aabb,
    depth: u8,
}

impl TraversalContext {
    /// New unbound context
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to `octree` and enter its root box
    pub fn bind<T>(&mut self, octree: &Octree<T>) {
        self.octree = Some(octree.id());
        self.origin = octree.root_bounds();
        self.current = self.origin;
        self.depth = 0;
    }

    pub fn unbind(&mut self) {
        *self = Self::default();
    }

    pub fn is_bound(&self) -> bool {
        self.octree.is_some()
    }

    /// Panics unless bound to exactly this octree
    pub fn assert_bound<T>(&self, octree: &Octree<T>) {
        assert!(
            self.octree == Some(octree.id()),
            "traversal context used while unbound or bound to another octree"
        );
    }

    /// Start from the box of the node a traversal call was handed
    pub fn enter(&mut self, node_box: Aabb) {
        assert!(self.is_bound(), "traversal context used while unbound");
        self.origin = node_box;
        self.current = node_box;
        self.depth = 0;
    }

    /// Move one level down into `octant` of the current box and return the child box
    pub fn descend(&mut self, octant: u8) -> Aabb {
        assert!(self.is_bound(), "traversal context used while unbound");
        self.current = self.current.child_octant(octant);
        self.depth += 1;
        self.current
    }

    /// Go back to the box passed to [`TraversalContext::enter`], so siblings can be probed
    pub fn reset(&mut self) {
        self.current = self.origin;
        self.depth = 0;
    }

    pub fn current(&self) -> Aabb {
        self.current
    }

    /// Levels descended since the last enter/reset
    pub fn depth(&self) -> u8 {
        self.depth
    }
}

/// Thread-safe pool of traversal contexts
#[derive(Debug, Default)]
pub struct ContextPool {
    free: Mutex<Vec<TraversalContext>>,
    created: AtomicUsize,
}

impl ContextPool {
    /// Create a pool with `prewarm` contexts ready
    pub fn new(prewarm: usize) -> Self {
        Self {
            free: Mutex::new((0..prewarm).map(|_| TraversalContext::new()).collect()),
            created: AtomicUsize::new(prewarm),
        }
    }

    /// Check out a context. It is returned to the pool when the guard drops,
    /// including during unwinding.
    pub fn acquire(&self) -> PooledContext<'_> {
        let ctx = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let ctx = ctx.unwrap_or_else(|| {
            let total = self.created.fetch_add(1, Ordering::Relaxed) + 1;
            log::trace!("Context pool grew to {} contexts", total);
            TraversalContext::new()
        });
        PooledContext { pool: self, ctx }
    }

    /// Contexts currently sitting in the pool
    pub fn available(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Contexts ever created by this pool
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    fn release(&self, mut ctx: TraversalContext) {
        ctx.unbind();
        self.free.lock().unwrap_or_else(PoisonError::into_inner).push(ctx);
    }
}

/// Checked-out context; derefs to [`TraversalContext`]
#[derive(Debug)]
pub struct PooledContext<'a> {
    pool: &'a ContextPool,
    ctx: TraversalContext,
}

impl Deref for PooledContext<'_> {
    type Target = TraversalContext;

    fn deref(&self) -> &TraversalContext {
        &self.ctx
    }
}

impl DerefMut for PooledContext<'_> {
    fn deref_mut(&mut self) -> &mut TraversalContext {
        &mut self.ctx
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.ctx));
    }
}

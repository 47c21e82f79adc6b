//! Octree traversal: point location, ray and range queries, nearest hit and
//! surface normal.
//!
//! All functions are stateless; box derivation goes through a caller-supplied
//! [`TraversalContext`] bound to the octree being walked.

use std::fmt;
use std::sync::Arc;

use glam::Vec3;

use super::context::TraversalContext;
use super::node::{Node, NodeId};
use super::octree::Octree;
use crate::math::{Aabb, Ray};
use crate::voxel::voxel::Face;

/// Set of octree levels (0 = leaves) to record hits at
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LevelSet(u64);

impl LevelSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn only(level: u8) -> Self {
        Self::empty().with(level)
    }

    pub fn with(mut self, level: u8) -> Self {
        self.insert(level);
        self
    }

    pub fn insert(&mut self, level: u8) {
        debug_assert!(level < 64);
        self.0 |= 1 << level;
    }

    pub fn contains(&self, level: u8) -> bool {
        level < 64 && self.0 & (1 << level) != 0
    }
}

/// Candidate filter for ray hits. Returning `false` drops the candidate.
pub type NodeFilter<T> = Arc<dyn Fn(&Node<T>) -> bool + Send + Sync>;

/// Controls how deep a query descends and which levels it records
pub struct TraversalSettings<T> {
    /// Stop descending once this level is reached
    pub max_level: Option<u8>,
    pub record_levels: LevelSet,
    pub filter: Option<NodeFilter<T>>,
}

impl<T> TraversalSettings<T> {
    /// Record only at `level`
    pub fn at_level(level: u8) -> Self {
        Self { max_level: None, record_levels: LevelSet::only(level), filter: None }
    }

    pub fn with_filter(mut self, filter: impl Fn(&Node<T>) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    fn accepts(&self, node: &Node<T>) -> bool {
        self.filter.as_ref().is_none_or(|f| f(node))
    }
}

impl<T> Default for TraversalSettings<T> {
    fn default() -> Self {
        Self::at_level(0)
    }
}

impl<T> Clone for TraversalSettings<T> {
    fn clone(&self) -> Self {
        Self {
            max_level: self.max_level,
            record_levels: self.record_levels,
            filter: self.filter.clone(),
        }
    }
}

impl<T> fmt::Debug for TraversalSettings<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraversalSettings")
            .field("max_level", &self.max_level)
            .field("record_levels", &self.record_levels)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// A recorded node. `point` is the ray entry point (absent for box queries).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    pub node: NodeId,
    pub bounds: Aabb,
    pub level: u8,
    pub point: Option<Vec3>,
}

/// Collects hits during a query
#[derive(Debug)]
pub struct Recorder<T> {
    pub settings: TraversalSettings<T>,
    pub hits: Vec<Hit>,
    /// Recursive descent calls made
    pub nodes_visited: usize,
}

impl<T> Recorder<T> {
    pub fn new(settings: TraversalSettings<T>) -> Self {
        Self { settings, hits: Vec::new(), nodes_visited: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }
}

/// Face of the hit box the ray entered through
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceNormal {
    Face(Face),
    /// The hit point gives no direction (it sits on the box center)
    Undefined,
}

impl SurfaceNormal {
    pub fn face(self) -> Option<Face> {
        match self {
            SurfaceNormal::Face(face) => Some(face),
            SurfaceNormal::Undefined => None,
        }
    }
}

/// Nearest hit plus the normal of the face it landed on
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceHit {
    pub hit: Hit,
    pub normal: SurfaceNormal,
}

/// Box of `child` sitting at `octant` below the context's current box
fn child_bounds<T>(octree: &Octree<T>, child: NodeId, octant: u8, ctx: &mut TraversalContext) -> Aabb {
    let bounds = match octree.get(child).explicit_bounds() {
        Some(bounds) => bounds,
        None => ctx.descend(octant),
    };
    ctx.reset();
    bounds
}

/// One step of point location: the child of `node` whose box claims `point`.
///
/// Boxes are closed on their min faces and open on their max faces, so a
/// boundary point belongs to exactly one octant.
pub fn locate<T>(
    octree: &Octree<T>,
    node: NodeId,
    node_box: Aabb,
    point: Vec3,
    ctx: &mut TraversalContext,
) -> Option<(NodeId, Aabb)> {
    ctx.enter(node_box);
    if !node_box.contains_point_half_open(point) {
        return None;
    }
    let children = octree.get(node).children()?;
    for octant in 0..8u8 {
        let Some(child) = children.get(octant) else {
            continue;
        };
        let child_box = child_bounds(octree, child, octant, ctx);
        if child_box.contains_point_half_open(point) {
            return Some((child, child_box));
        }
    }
    None
}

/// Descend `levels` times from `node`, stopping at the first miss
pub fn locate_from<T>(
    octree: &Octree<T>,
    node: NodeId,
    node_box: Aabb,
    levels: u8,
    point: Vec3,
    ctx: &mut TraversalContext,
) -> Option<(NodeId, Aabb)> {
    ctx.assert_bound(octree);
    let mut current = (node, node_box);
    for _ in 0..levels {
        current = locate(octree, current.0, current.1, point, ctx)?;
    }
    Some(current)
}

/// Find the leaf containing `point`, walking `cur_level` levels down from the root
pub fn locate_from_root<T>(
    octree: &Octree<T>,
    point: Vec3,
    ctx: &mut TraversalContext,
) -> Option<(NodeId, Aabb)> {
    let root = octree.root()?;
    locate_from(octree, root, octree.root_bounds(), octree.cur_level(), point, ctx)
}

/// Record ray hits below `node` (which sits at `level`).
///
/// Children at a level in `record_levels` are recorded with their entry
/// point; other children the ray touches are descended into.
pub fn collect_ray_hits<T>(
    octree: &Octree<T>,
    node: NodeId,
    node_box: Aabb,
    level: u8,
    ray: &Ray,
    recorder: &mut Recorder<T>,
    ctx: &mut TraversalContext,
) {
    recorder.nodes_visited += 1;
    if recorder.settings.max_level == Some(level) || level == 0 {
        return;
    }
    let current = octree.get(node);
    if current.is_leaf() {
        return;
    }
    let Some(&children) = current.children() else {
        return;
    };

    ctx.enter(node_box);
    for octant in 0..8u8 {
        let Some(child) = children.get(octant) else {
            continue;
        };
        let child_box = child_bounds(octree, child, octant, ctx);
        if !ray.hits_aabb(&child_box) {
            continue;
        }

        if recorder.settings.record_levels.contains(level - 1) {
            let Some(point) = ray.intersection_point(&child_box) else {
                continue;
            };
            if recorder.settings.accepts(octree.get(child)) {
                recorder.hits.push(Hit { node: child, bounds: child_box, level: level - 1, point: Some(point) });
            }
        } else {
            collect_ray_hits(octree, child, child_box, level - 1, ray, recorder, ctx);
            ctx.enter(node_box);
        }
    }
}

/// Record every node overlapping `query` at the requested levels, starting at `node`
pub fn collect_box_hits<T>(
    octree: &Octree<T>,
    node: NodeId,
    node_box: Aabb,
    level: u8,
    query: &Aabb,
    recorder: &mut Recorder<T>,
    ctx: &mut TraversalContext,
) {
    recorder.nodes_visited += 1;
    if recorder.settings.record_levels.contains(level) {
        recorder.hits.push(Hit { node, bounds: node_box, level, point: None });
    }
    if recorder.settings.max_level == Some(level) || level == 0 {
        return;
    }
    let Some(&children) = octree.get(node).children() else {
        return;
    };

    ctx.enter(node_box);
    for octant in 0..8u8 {
        let Some(child) = children.get(octant) else {
            continue;
        };
        let child_box = child_bounds(octree, child, octant, ctx);
        if query.intersects(&child_box) {
            collect_box_hits(octree, child, child_box, level - 1, query, recorder, ctx);
            ctx.enter(node_box);
        }
    }
}

/// All ray hits in the tree. A ray that misses the root box returns an empty
/// recorder without descending.
pub fn intersect_ray<T>(
    octree: &Octree<T>,
    ray: &Ray,
    settings: &TraversalSettings<T>,
    ctx: &mut TraversalContext,
) -> Recorder<T> {
    ctx.assert_bound(octree);
    let mut recorder = Recorder::new(settings.clone());
    let Some(root) = octree.root() else {
        return recorder;
    };
    let root_box = octree.root_bounds();
    if !ray.hits_aabb(&root_box) {
        return recorder;
    }
    collect_ray_hits(octree, root, root_box, octree.cur_level(), ray, &mut recorder, ctx);
    recorder
}

/// All nodes overlapping `query` at the recorded levels
pub fn intersect_box<T>(
    octree: &Octree<T>,
    query: &Aabb,
    settings: &TraversalSettings<T>,
    ctx: &mut TraversalContext,
) -> Recorder<T> {
    ctx.assert_bound(octree);
    let mut recorder = Recorder::new(settings.clone());
    let Some(root) = octree.root() else {
        return recorder;
    };
    let root_box = octree.root_bounds();
    if !query.intersects(&root_box) {
        return recorder;
    }
    collect_box_hits(octree, root, root_box, octree.cur_level(), query, &mut recorder, ctx);
    recorder
}

/// Recorded hit closest to the ray origin
pub fn nearest_hit<T>(
    octree: &Octree<T>,
    ray: &Ray,
    settings: &TraversalSettings<T>,
    ctx: &mut TraversalContext,
) -> Option<Hit> {
    let mut recorder = intersect_ray(octree, ray, settings, ctx);
    if recorder.hits.len() == 1 {
        return recorder.hits.pop();
    }
    recorder
        .hits
        .into_iter()
        .filter_map(|hit| hit.point.map(|p| (p.distance_squared(ray.origin), hit)))
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, hit)| hit)
}

/// Face of `bounds` whose normal best matches the direction from the box
/// center to `point`. Ties go to the earlier face in [`Face::ALL`].
pub fn surface_normal(bounds: &Aabb, point: Vec3) -> SurfaceNormal {
    let offset = point - bounds.center();
    if offset == Vec3::ZERO {
        return SurfaceNormal::Undefined;
    }

    let mut best: Option<(Face, f32)> = None;
    for face in Face::ALL {
        let dot = face.normal().dot(offset);
        if dot < 0.0 {
            continue;
        }
        if best.is_none_or(|(_, best_dot)| dot > best_dot) {
            best = Some((face, dot));
        }
    }
    best.map_or(SurfaceNormal::Undefined, |(face, _)| SurfaceNormal::Face(face))
}

/// Nearest hit and the normal of the face the ray struck
pub fn hit_normal<T>(
    octree: &Octree<T>,
    ray: &Ray,
    settings: &TraversalSettings<T>,
    ctx: &mut TraversalContext,
) -> Option<SurfaceHit> {
    let hit = nearest_hit(octree, ray, settings, ctx)?;
    let point = hit.point?;
    Some(SurfaceHit { hit, normal: surface_normal(&hit.bounds, point) })
}

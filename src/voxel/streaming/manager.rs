//! Chunk Manager - keeps the world octree populated around a viewpoint
//!
//! Each refresh runs two passes. The cache pass builds every chunk inside the
//! cached volume on the job system, joins, evicts chunks that fell outside and
//! swaps the cached map. A cache pass whose join fails leaves the cached map
//! exactly as it was.
//!
//! The visibility pass diffs the narrower visible volume against the previous
//! one and commits the new visible map as soon as the notifications are
//! dispatched. Each transition is delivered exactly once: if the join fails,
//! the outstanding notifications are collected at the start of the next pass.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{IVec3, Vec3};

use super::jobs::{Interrupter, JobHandle, JobSystem};
use crate::core::{Error, Result, StreamingConfig};
use crate::math::Aabb;
use crate::voxel::chunk::{Chunk, ChunkKey, CHUNK_SIZE};
use crate::voxel::world::World;

/// What happened to a chunk
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChunkUpdateKind {
    /// Entered the visible set
    Added,
    /// Left the visible set
    Removed,
}

/// Event delivered to listeners
#[derive(Clone, Debug)]
pub struct ChunkUpdate {
    pub kind: ChunkUpdateKind,
    pub chunk: Arc<Chunk>,
    pub world: Arc<World>,
}

/// Receives visibility changes. Called from worker threads.
pub trait ChunkListener: Send + Sync {
    fn on_chunk_update(&self, update: &ChunkUpdate);
}

impl<F> ChunkListener for F
where
    F: Fn(&ChunkUpdate) + Send + Sync,
{
    fn on_chunk_update(&self, update: &ChunkUpdate) {
        self(update)
    }
}

/// Outcome of a refresh
#[derive(Clone, Debug, Default)]
pub struct RefreshReport {
    /// Cells enumerated in the cached volume
    pub cells: usize,
    /// Valid cached chunks kept as they were
    pub reused: usize,
    /// Build jobs submitted this cycle
    pub submitted: usize,
    /// Build jobs that landed this cycle, including leftovers from failed cycles
    pub built: usize,
    /// Chunks removed from the world because they left the cached volume
    pub evicted: usize,
    /// Per-cell failures; those cells stay absent until the next cycle
    pub failed: Vec<(ChunkKey, String)>,
    pub added: usize,
    pub removed: usize,
    pub elapsed: Duration,
}

/// Streams chunks in and out of a shared [`World`]
pub struct ChunkManager {
    config: StreamingConfig,
    world: Arc<World>,
    jobs: JobSystem,
    cached_bounds: Aabb,
    visible_bounds: Aabb,
    cached: HashMap<ChunkKey, Arc<Chunk>>,
    visible: HashMap<ChunkKey, Arc<Chunk>>,
    /// Build jobs not yet collected by a successful join
    building: HashMap<ChunkKey, JobHandle<Arc<Chunk>>>,
    /// Listener jobs not yet collected by a successful join
    notifying: Vec<(ChunkKey, JobHandle<()>)>,
    listeners: Vec<Arc<dyn ChunkListener>>,
}

/// Volume `extent` chunks wide on each axis around the chunk containing `pos`
fn volume_around(pos: Vec3, extent: [u32; 3]) -> Aabb {
    let extent = IVec3::from_array(extent.map(|e| e as i32));
    let lo = ChunkKey::from_world_pos(pos).cell() - extent / 2;
    let hi = lo + extent;
    Aabb::new((lo * CHUNK_SIZE).as_vec3(), (hi * CHUNK_SIZE).as_vec3())
}

impl ChunkManager {
    pub fn new(world: Arc<World>, config: StreamingConfig) -> Result<Self> {
        config.validate()?;
        let jobs = JobSystem::new(config.worker_threads)?;
        Ok(Self {
            config,
            world,
            jobs,
            cached_bounds: Aabb::default(),
            visible_bounds: Aabb::default(),
            cached: HashMap::new(),
            visible: HashMap::new(),
            building: HashMap::new(),
            notifying: Vec::new(),
            listeners: Vec::new(),
        })
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Centre both volumes on `pos` using the configured extents
    pub fn set_viewpoint(&mut self, pos: Vec3) {
        self.cached_bounds = volume_around(pos, self.config.cached_chunks);
        self.visible_bounds = volume_around(pos, self.config.visible_chunks);
        log::trace!("Viewpoint {pos} -> cached {:?}, visible {:?}", self.cached_bounds, self.visible_bounds);
    }

    pub fn set_cached_bounds(&mut self, bounds: Aabb) {
        self.cached_bounds = bounds;
    }

    pub fn set_visible_bounds(&mut self, bounds: Aabb) {
        self.visible_bounds = bounds;
    }

    pub fn cached_bounds(&self) -> Aabb {
        self.cached_bounds
    }

    pub fn visible_bounds(&self) -> Aabb {
        self.visible_bounds
    }

    /// Register a listener. There is no removal.
    pub fn add_listener(&mut self, listener: Arc<dyn ChunkListener>) {
        self.listeners.push(listener);
    }

    /// Handle that aborts the join of the running (or next) pass
    pub fn interrupter(&self) -> Interrupter {
        self.jobs.interrupter()
    }

    pub fn cached_chunk(&self, key: ChunkKey) -> Option<&Arc<Chunk>> {
        self.cached.get(&key)
    }

    pub fn visible_chunk(&self, key: ChunkKey) -> Option<&Arc<Chunk>> {
        self.visible.get(&key)
    }

    pub fn cached_keys(&self) -> impl Iterator<Item = ChunkKey> + '_ {
        self.cached.keys().copied()
    }

    pub fn visible_keys(&self) -> impl Iterator<Item = ChunkKey> + '_ {
        self.visible.keys().copied()
    }

    pub fn cached_len(&self) -> usize {
        self.cached.len()
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    /// Builds still outstanding from a cycle whose join failed
    pub fn building_len(&self) -> usize {
        self.building.len()
    }

    /// Listener jobs still outstanding from a visibility pass whose join failed
    pub fn notifying_len(&self) -> usize {
        self.notifying.len()
    }

    /// Mark the cached chunk at `key` stale so the next refresh rebuilds it
    pub fn invalidate(&mut self, key: ChunkKey) -> bool {
        match self.cached.get(&key) {
            Some(chunk) => {
                chunk.invalidate();
                true
            }
            None => false,
        }
    }

    /// Run the cache pass, then the visibility pass
    pub fn refresh(&mut self) -> Result<RefreshReport> {
        let start = Instant::now();
        let mut report = self.refresh_cached()?;
        let visible = self.refresh_visible()?;
        report.added = visible.added;
        report.removed = visible.removed;
        report.failed.extend(visible.failed);
        report.elapsed = start.elapsed();

        log::info!(
            "Refresh: {} cells, {} built, {} reused, {} evicted, {} failed, +{} -{} visible in {:.1}ms",
            report.cells,
            report.built,
            report.reused,
            report.evicted,
            report.failed.len(),
            report.added,
            report.removed,
            report.elapsed.as_secs_f64() * 1000.0
        );
        Ok(report)
    }

    /// Cache pass. On a failed join the cached map is untouched and the
    /// outstanding builds are picked up by the next call.
    pub fn refresh_cached(&mut self) -> Result<RefreshReport> {
        let start = Instant::now();
        let cells = ChunkKey::covering(&self.cached_bounds);
        let wanted: HashSet<ChunkKey> = cells.iter().copied().collect();
        let mut report = RefreshReport { cells: cells.len(), ..Default::default() };
        let mut next = HashMap::with_capacity(cells.len());

        for key in cells {
            if let Some(chunk) = self.cached.get(&key).filter(|c| c.is_valid()) {
                next.insert(key, Arc::clone(chunk));
                report.reused += 1;
                continue;
            }
            if self.building.contains_key(&key) {
                continue;
            }
            let world = Arc::clone(&self.world);
            let handle = self.jobs.submit(move || {
                let built = world.build_chunk(key);
                Ok(world.insert_chunk(built))
            });
            self.building.insert(key, handle);
            report.submitted += 1;
        }

        log::debug!(
            "Cache pass: {} cells, {} reused, {} submitted, {} in flight",
            report.cells,
            report.reused,
            report.submitted,
            self.building.len()
        );
        if let Err(e) = self.jobs.join_all(self.building.values(), self.config.join_timeout()) {
            log::warn!("Cache pass aborted, keeping {} cached chunks: {}", self.cached.len(), e);
            return Err(e);
        }

        for (key, handle) in self.building.drain() {
            match handle.take() {
                Some(Ok(chunk)) => {
                    report.built += 1;
                    if wanted.contains(&key) {
                        next.insert(key, chunk);
                    } else if self.world.remove_chunk(key) {
                        report.evicted += 1;
                    }
                }
                Some(Err(e)) => {
                    let e = Error::Build { key, reason: e.to_string() };
                    log::warn!("{}", e);
                    report.failed.push((key, e.to_string()));
                }
                None => {
                    log::warn!("Chunk {} finished without a result", key);
                    report.failed.push((key, "missing job result".into()));
                }
            }
        }

        // Stale chunks of failed cells go too, so queries never see them
        for key in self.cached.keys() {
            if !next.contains_key(key) && self.world.remove_chunk(*key) && !wanted.contains(key) {
                report.evicted += 1;
            }
        }

        self.cached = next;
        report.elapsed = start.elapsed();
        log::debug!(
            "Cache pass done: {} cached, {} built, {} evicted, {} failed",
            self.cached.len(),
            report.built,
            report.evicted,
            report.failed.len()
        );
        Ok(report)
    }

    /// Deliver `updates` to every listener, in order, on one job
    fn dispatch(&mut self, key: ChunkKey, updates: Vec<ChunkUpdate>) {
        let listeners = self.listeners.clone();
        let handle = self.jobs.submit(move || {
            for update in &updates {
                for listener in &listeners {
                    listener.on_chunk_update(update);
                }
            }
            Ok(())
        });
        self.notifying.push((key, handle));
    }

    fn update(&self, kind: ChunkUpdateKind, chunk: &Arc<Chunk>) -> ChunkUpdate {
        ChunkUpdate { kind, chunk: Arc::clone(chunk), world: Arc::clone(&self.world) }
    }

    /// Visibility pass. A chunk rebuilt since it became visible is reported
    /// as removed and then added again, on the same job.
    pub fn refresh_visible(&mut self) -> Result<RefreshReport> {
        let start = Instant::now();
        let mut report = RefreshReport::default();
        if !self.notifying.is_empty() {
            self.join_notifications(&mut report)?;
        }

        let mut next = HashMap::new();
        let mut transitions = Vec::new();
        for key in ChunkKey::covering(&self.visible_bounds) {
            let Some(chunk) = self.cached.get(&key).filter(|c| c.is_valid()) else {
                continue;
            };
            let mut updates = Vec::new();
            match self.visible.get(&key) {
                Some(old) if Arc::ptr_eq(old, chunk) => {}
                Some(old) => {
                    updates.push(self.update(ChunkUpdateKind::Removed, old));
                    updates.push(self.update(ChunkUpdateKind::Added, chunk));
                }
                None => updates.push(self.update(ChunkUpdateKind::Added, chunk)),
            }
            if !updates.is_empty() {
                transitions.push((key, updates));
            }
            next.insert(key, Arc::clone(chunk));
        }
        for (key, old) in &self.visible {
            if !next.contains_key(key) {
                transitions.push((*key, vec![self.update(ChunkUpdateKind::Removed, old)]));
            }
        }

        for (key, updates) in transitions {
            for update in &updates {
                match update.kind {
                    ChunkUpdateKind::Added => report.added += 1,
                    ChunkUpdateKind::Removed => report.removed += 1,
                }
            }
            self.dispatch(key, updates);
        }
        self.visible = next;
        self.join_notifications(&mut report)?;

        report.elapsed = start.elapsed();
        log::debug!(
            "Visibility pass: {} visible, +{} -{}",
            self.visible.len(),
            report.added,
            report.removed
        );
        Ok(report)
    }

    /// Join outstanding listener jobs. On failure they stay queued for the
    /// next pass.
    fn join_notifications(&mut self, report: &mut RefreshReport) -> Result<()> {
        let pending = self.notifying.iter().map(|(_, h)| h);
        if let Err(e) = self.jobs.join_all(pending, self.config.join_timeout()) {
            log::warn!("Visibility pass aborted with {} notification job(s) outstanding: {}", self.notifying.len(), e);
            return Err(e);
        }
        for (key, handle) in self.notifying.drain(..) {
            if let Some(Err(e)) = handle.take() {
                log::warn!("Listener failed for chunk {}: {}", key, e);
                report.failed.push((key, e.to_string()));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChunkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkManager")
            .field("cached", &self.cached.len())
            .field("visible", &self.visible.len())
            .field("building", &self.building.len())
            .field("notifying", &self.notifying.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::svo::{UniformMaterial, VoxelOracle};
    use crate::voxel::voxel::Material;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::thread;

    fn slab(p: IVec3) -> bool {
        (0..16).contains(&p.y)
    }

    fn world_with(oracle: Arc<dyn VoxelOracle>) -> Arc<World> {
        Arc::new(World::new(oracle, Arc::new(UniformMaterial(Material::Stone)), 2))
    }

    fn config() -> StreamingConfig {
        StreamingConfig {
            cached_chunks: [2, 1, 2],
            visible_chunks: [1, 1, 1],
            worker_threads: 2,
            ..Default::default()
        }
    }

    fn manager() -> ChunkManager {
        crate::core::logging::init_for_tests();
        let mut manager = ChunkManager::new(world_with(Arc::new(slab)), config()).unwrap();
        manager.set_viewpoint(Vec3::new(1.0, 1.0, 1.0));
        manager
    }

    type Events = Arc<Mutex<Vec<(ChunkUpdateKind, ChunkKey)>>>;

    fn record_events(manager: &mut ChunkManager) -> Events {
        let events: Events = Arc::default();
        let sink = Arc::clone(&events);
        manager.add_listener(Arc::new(move |update: &ChunkUpdate| {
            sink.lock().unwrap().push((update.kind, update.chunk.key()));
        }));
        events
    }

    #[test]
    fn test_viewpoint_volumes() {
        let manager = manager();
        assert_eq!(
            manager.cached_bounds(),
            Aabb::new(Vec3::new(-16.0, 0.0, -16.0), Vec3::new(16.0, 16.0, 16.0))
        );
        assert_eq!(manager.visible_bounds(), Aabb::cube(Vec3::ZERO, 16.0));
    }

    #[test]
    fn test_refresh_builds_then_reuses() {
        let mut manager = manager();
        let first = manager.refresh_cached().unwrap();
        assert_eq!(first.cells, 4);
        assert_eq!(first.submitted, 4);
        assert_eq!(first.built, 4);
        assert_eq!(manager.cached_len(), 4);
        assert_eq!(manager.world().chunk_count(), 4);

        let before: Vec<_> = manager.cached_keys().map(|k| Arc::clone(manager.cached_chunk(k).unwrap())).collect();
        let second = manager.refresh_cached().unwrap();
        assert_eq!(second.submitted, 0);
        assert_eq!(second.reused, 4);
        assert_eq!(manager.cached_len(), 4);
        for chunk in before {
            assert!(Arc::ptr_eq(&chunk, manager.cached_chunk(chunk.key()).unwrap()));
        }
    }

    #[test]
    fn test_single_chunk_scenario() {
        let mut manager = manager();
        let origin = ChunkKey::from_world_pos(Vec3::ZERO);
        manager.set_cached_bounds(origin.bounds());
        manager.set_visible_bounds(origin.bounds());
        manager.refresh().unwrap();

        let chunk = manager.cached_chunk(origin).unwrap();
        assert!(chunk.is_valid());
        assert_eq!(chunk.voxel_count(), 16 * 16 * 16);
        let world = manager.world();
        for y in 0..16 {
            assert!(world.voxel_at(Vec3::new(5.5, y as f32 + 0.5, 2.5)).is_some());
        }
        assert!(world.voxel_at(Vec3::new(1.0, 1.0, 1.0)).is_some());
        assert!(world.voxel_at(Vec3::new(1.0, 20.0, 1.0)).is_none());
    }

    #[test]
    fn test_eviction() {
        let mut manager = manager();
        manager.refresh_cached().unwrap();
        let old: Vec<ChunkKey> = manager.cached_keys().collect();

        manager.set_viewpoint(Vec3::new(200.0, 1.0, 1.0));
        let report = manager.refresh_cached().unwrap();
        assert_eq!(report.evicted, 4);
        assert_eq!(report.submitted, 4);
        for key in old {
            assert!(manager.cached_chunk(key).is_none());
            assert!(!manager.world().has_chunk(key));
        }
        assert_eq!(manager.world().chunk_count(), 4);
        assert!(manager.world().voxel_at(Vec3::new(1.0, 1.0, 1.0)).is_none());
    }

    #[test]
    fn test_visibility_notifications() {
        let mut manager = manager();
        let events = record_events(&mut manager);

        let report = manager.refresh().unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(manager.visible_len(), 1);
        assert_eq!(events.lock().unwrap().as_slice(), &[(ChunkUpdateKind::Added, ChunkKey { x: 0, y: 0, z: 0 })]);

        // Nothing changed: no notifications
        let report = manager.refresh().unwrap();
        assert_eq!((report.added, report.removed), (0, 0));

        manager.set_visible_bounds(ChunkKey { x: -16, y: 0, z: 0 }.bounds());
        let report = manager.refresh_visible().unwrap();
        assert_eq!((report.added, report.removed), (1, 1));
        let events = events.lock().unwrap();
        assert!(events.contains(&(ChunkUpdateKind::Removed, ChunkKey { x: 0, y: 0, z: 0 })));
        assert!(events.contains(&(ChunkUpdateKind::Added, ChunkKey { x: -16, y: 0, z: 0 })));
    }

    #[test]
    fn test_no_bounds_streams_nothing() {
        crate::core::logging::init_for_tests();
        let mut manager = ChunkManager::new(world_with(Arc::new(slab)), config()).unwrap();
        let report = manager.refresh().unwrap();
        assert_eq!((report.cells, report.submitted), (0, 0));
        assert_eq!(manager.cached_len(), 0);
        assert_eq!(manager.world().chunk_count(), 0);
    }

    #[test]
    fn test_zero_visible_extent() {
        crate::core::logging::init_for_tests();
        let config = StreamingConfig { visible_chunks: [0, 0, 0], ..config() };
        let mut manager = ChunkManager::new(world_with(Arc::new(slab)), config).unwrap();
        let events = record_events(&mut manager);
        manager.set_viewpoint(Vec3::new(1.0, 1.0, 1.0));
        manager.refresh().unwrap();
        assert_eq!(manager.cached_len(), 4);
        assert_eq!(manager.visible_len(), 0);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_interrupted_visibility_pass_delivers_once() {
        let mut manager = manager();
        let events = record_events(&mut manager);
        let interrupter = manager.interrupter();
        let fired = AtomicBool::new(false);
        manager.add_listener(Arc::new(move |update: &ChunkUpdate| {
            if update.kind == ChunkUpdateKind::Removed && !fired.swap(true, Ordering::SeqCst) {
                interrupter.interrupt();
            }
        }));
        manager.refresh().unwrap();

        manager.set_visible_bounds(ChunkKey { x: -16, y: 0, z: 0 }.bounds());
        let err = manager.refresh_visible().unwrap_err();
        assert!(matches!(err, Error::Interrupted));
        // The diff is committed once its notifications are dispatched
        assert!(manager.visible_chunk(ChunkKey { x: -16, y: 0, z: 0 }).is_some());
        assert!(manager.visible_chunk(ChunkKey { x: 0, y: 0, z: 0 }).is_none());

        let report = manager.refresh().unwrap();
        assert_eq!((report.added, report.removed), (0, 0));
        assert_eq!(manager.notifying_len(), 0);

        let mut events = events.lock().unwrap().clone();
        events.sort_by_key(|(kind, key)| (*key, *kind == ChunkUpdateKind::Added));
        assert_eq!(
            events,
            vec![
                (ChunkUpdateKind::Added, ChunkKey { x: -16, y: 0, z: 0 }),
                (ChunkUpdateKind::Removed, ChunkKey { x: 0, y: 0, z: 0 }),
                (ChunkUpdateKind::Added, ChunkKey { x: 0, y: 0, z: 0 }),
            ]
        );
    }

    #[test]
    fn test_replaced_chunk_removed_before_added() {
        let mut manager = manager();
        let events = record_events(&mut manager);
        manager.refresh().unwrap();
        let origin = ChunkKey { x: 0, y: 0, z: 0 };
        manager.invalidate(origin);
        manager.refresh().unwrap();
        assert_eq!(
            events.lock().unwrap().as_slice(),
            &[
                (ChunkUpdateKind::Added, origin),
                (ChunkUpdateKind::Removed, origin),
                (ChunkUpdateKind::Added, origin),
            ]
        );
    }

    #[test]
    fn test_visible_requires_cached_chunk() {
        let mut manager = manager();
        manager.set_visible_bounds(ChunkKey { x: 160, y: 0, z: 0 }.bounds());
        manager.refresh().unwrap();
        assert_eq!(manager.visible_len(), 0);
    }

    #[test]
    fn test_invalidate_rebuilds() {
        let mut manager = manager();
        let events = record_events(&mut manager);
        manager.refresh().unwrap();
        let origin = ChunkKey { x: 0, y: 0, z: 0 };
        let old = Arc::clone(manager.cached_chunk(origin).unwrap());

        assert!(manager.invalidate(origin));
        assert!(!manager.invalidate(ChunkKey { x: 320, y: 0, z: 0 }));
        let report = manager.refresh().unwrap();
        assert_eq!(report.submitted, 1);
        assert_eq!(report.evicted, 0);
        assert_eq!((report.added, report.removed), (1, 1));

        let new = manager.cached_chunk(origin).unwrap();
        assert!(new.is_valid());
        assert!(!Arc::ptr_eq(&old, new));
        assert_eq!(manager.world().chunk_count(), 4);
        assert_eq!(events.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_build_failure_leaves_cell_absent() {
        let oracle = |p: IVec3| {
            assert!(p.x > -8, "oracle failure at {p}");
            slab(p)
        };
        let mut manager = ChunkManager::new(world_with(Arc::new(oracle)), config()).unwrap();
        manager.set_viewpoint(Vec3::new(1.0, 1.0, 1.0));

        let report = manager.refresh_cached().unwrap();
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed.iter().all(|(key, reason)| {
            key.x == -16 && reason.contains("failed to build") && reason.contains("oracle failure")
        }));
        assert_eq!(manager.cached_len(), 2);
        assert_eq!(manager.building_len(), 0);

        // Failed cells are retried on the next cycle
        let retry = manager.refresh_cached().unwrap();
        assert_eq!(retry.submitted, 2);
        assert_eq!(retry.failed.len(), 2);
    }

    #[test]
    fn test_interrupted_cycle_keeps_maps() {
        let mut manager = manager();
        manager.interrupter().interrupt();
        let err = manager.refresh().unwrap_err();
        assert!(matches!(err, Error::Interrupted));
        assert_eq!(manager.cached_len(), 0);
        assert_eq!(manager.visible_len(), 0);
        assert_eq!(manager.building_len(), 4);

        // Outstanding builds are collected instead of resubmitted
        let report = manager.refresh().unwrap();
        assert_eq!(report.submitted, 0);
        assert_eq!(report.built, 4);
        assert_eq!(manager.cached_len(), 4);
        assert_eq!(manager.visible_len(), 1);
    }

    #[test]
    fn test_join_timeout_keeps_previous_maps() {
        let release = Arc::new(AtomicBool::new(false));
        let gate = Arc::clone(&release);
        let oracle = move |p: IVec3| {
            if p.x >= 32 {
                while !gate.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(1));
                }
            }
            slab(p)
        };
        let config = StreamingConfig { join_timeout_ms: 500, ..config() };
        let mut manager = ChunkManager::new(world_with(Arc::new(oracle)), config).unwrap();
        manager.set_viewpoint(Vec3::new(1.0, 1.0, 1.0));
        manager.refresh().unwrap();
        let before: HashSet<ChunkKey> = manager.cached_keys().collect();

        manager.set_viewpoint(Vec3::new(40.0, 1.0, 1.0));
        let err = manager.refresh_cached().unwrap_err();
        assert!(matches!(err, Error::JoinTimeout { .. }));
        assert_eq!(manager.cached_keys().collect::<HashSet<_>>(), before);

        release.store(true, Ordering::Release);
        let report = manager.refresh_cached().unwrap();
        assert_eq!(report.submitted, 0);
        assert!(manager.cached_chunk(ChunkKey { x: 32, y: 0, z: 0 }).is_some());
        assert!(manager.cached_chunk(ChunkKey { x: -16, y: 0, z: 0 }).is_none());
    }
}

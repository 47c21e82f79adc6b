//! Streaming demo: walks a viewpoint across procedural terrain.
//!
//! Usage: cargo run --release --bin stream_demo -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>   JSON file with `streaming` and `terrain` sections
//!   --steps <N>       Number of viewpoint steps (default: from config)
//!   --seed <SEED>     Override the terrain seed

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use voxstream::core::{Error, Result, StreamingConfig};
use voxstream::math::Ray;
use voxstream::terrain::{NoiseTerrain, TerrainParams};
use voxstream::voxel::svo::TraversalSettings;
use voxstream::voxel::{ChunkManager, ChunkUpdate, ChunkUpdateKind, World};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
struct DemoConfig {
    streaming: StreamingConfig,
    terrain: TerrainParams,
    /// Viewpoint start position
    start: Vec3,
    /// Viewpoint movement per step
    step: Vec3,
    steps: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            streaming: StreamingConfig::default(),
            terrain: TerrainParams::default(),
            start: Vec3::new(0.0, 24.0, 0.0),
            step: Vec3::new(24.0, 0.0, 8.0),
            steps: 8,
        }
    }
}

impl DemoConfig {
    fn load(path: &PathBuf) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json).map_err(|e| Error::Config(e.to_string()))?;
        config.streaming.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config = match parse_str_arg(&args, "--config") {
        Some(path) => DemoConfig::load(&PathBuf::from(path))?,
        None => DemoConfig::default(),
    };
    if let Some(steps) = parse_u32_arg(&args, "--steps") {
        config.steps = steps;
    }
    if let Some(seed) = parse_u32_arg(&args, "--seed") {
        config.terrain.seed = seed;
    }

    println!("=== Chunk Streaming Demo ===");
    println!("Seed:    {}", config.terrain.seed);
    println!("Cached:  {:?} chunks", config.streaming.cached_chunks);
    println!("Visible: {:?} chunks", config.streaming.visible_chunks);
    println!("Steps:   {}", config.steps);
    println!();

    let terrain = NoiseTerrain::new(config.terrain.clone());
    let bands = terrain.material_bands();
    let world = Arc::new(World::new(
        Arc::new(terrain),
        Arc::new(bands),
        config.streaming.context_pool_size,
    ));

    let mut manager = ChunkManager::new(Arc::clone(&world), config.streaming.clone())?;
    let shown = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&shown);
    manager.add_listener(Arc::new(move |update: &ChunkUpdate| {
        match update.kind {
            ChunkUpdateKind::Added => counter.fetch_add(1, Ordering::Relaxed),
            ChunkUpdateKind::Removed => counter.fetch_sub(1, Ordering::Relaxed),
        };
        log::debug!("{:?} chunk {}", update.kind, update.chunk.key());
    }));

    let start = Instant::now();
    let step = config.step;
    let mut viewpoint = config.start;
    for i in 0..config.steps {
        manager.set_viewpoint(viewpoint);
        let report = match manager.refresh() {
            Ok(report) => report,
            Err(e) if e.is_join_failure() => {
                log::warn!("Step {}: refresh incomplete ({}), keeping previous chunks", i, e);
                continue;
            }
            Err(e) => return Err(e),
        };

        let down = Ray::new(viewpoint + Vec3::Y * 64.0, -Vec3::Y);
        let ground = world.hit_normal(&down, &TraversalSettings::default());
        match ground {
            Some(surface) => log::info!(
                "Step {}: at {:?}, {} built, {} evicted, ground at y={:.0} ({:?})",
                i,
                viewpoint,
                report.built,
                report.evicted,
                surface.hit.bounds.max.y,
                surface.normal
            ),
            None => log::info!("Step {}: at {:?}, no ground below", i, viewpoint),
        }
        viewpoint += step;
    }

    println!();
    println!("=== Done in {:.2}s ===", start.elapsed().as_secs_f64());
    println!("Chunks in world:  {}", world.chunk_count());
    println!("Visible chunks:   {}", shown.load(Ordering::Relaxed));
    println!("Octree nodes:     {} live, {} pooled", world.node_count(), world.free_nodes());
    Ok(())
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

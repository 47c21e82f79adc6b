//! Procedural terrain generation

pub mod generator;
pub use generator::{NoiseTerrain, TerrainParams};

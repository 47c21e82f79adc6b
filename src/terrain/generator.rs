//! Noise-based heightmap terrain used as a voxel oracle

use glam::IVec3;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

use crate::math::Aabb;
use crate::voxel::svo::oracle::{HeightBands, RegionHint, VoxelOracle};

/// Parameters controlling terrain generation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainParams {
    pub seed: u32,
    pub scale: f32,        // Horizontal scale (larger = smoother)
    pub height_scale: f32, // Vertical scale (max height)
    pub octaves: u32,      // FBM octaves (detail levels)
    pub persistence: f32,  // FBM persistence (0.5 typical)
    pub lacunarity: f32,   // FBM lacunarity (2.0 typical)
    pub sea_level: i32,    // Empty cells at or below this fill with water
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            scale: 100.0,
            height_scale: 48.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
            sea_level: 16,
        }
    }
}

/// Procedural heightmap terrain using fractal Brownian motion (FBM).
///
/// A cell is solid when it lies below the terrain height at its column.
pub struct NoiseTerrain {
    params: TerrainParams,
    noise: Fbm<Perlin>,
}

impl NoiseTerrain {
    /// Create a new terrain with the given parameters
    pub fn new(params: TerrainParams) -> Self {
        let noise = Fbm::<Perlin>::new(params.seed)
            .set_octaves(params.octaves as usize)
            .set_persistence(params.persistence as f64)
            .set_lacunarity(params.lacunarity as f64);

        Self { params, noise }
    }

    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    /// Get terrain height at world position (x, z)
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        let nx = (x / self.params.scale) as f64;
        let nz = (z / self.params.scale) as f64;

        // Noise is roughly [-1, 1]; map to [0, height_scale]
        let normalized = (self.noise.get([nx, nz]) + 1.0) / 2.0;
        (normalized * self.params.height_scale as f64) as f32
    }

    /// Sampled min/max height over an XZ rectangle (corners and centre)
    pub fn height_bounds(&self, min_x: f32, max_x: f32, min_z: f32, max_z: f32) -> (f32, f32) {
        let heights = [
            self.height_at(min_x, min_z),
            self.height_at(max_x, min_z),
            self.height_at(min_x, max_z),
            self.height_at(max_x, max_z),
            self.height_at((min_x + max_x) / 2.0, (min_z + max_z) / 2.0),
        ];

        let min_h = heights.iter().copied().fold(f32::INFINITY, f32::min);
        let max_h = heights.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        (min_h, max_h)
    }

    /// Material bands matching this terrain: sand along the shore, water up to sea level
    pub fn material_bands(&self) -> HeightBands {
        HeightBands {
            sand_below: self.params.sea_level + 2,
            fluid_at_or_below: Some(self.params.sea_level),
        }
    }
}

impl VoxelOracle for NoiseTerrain {
    fn is_solid(&self, pos: IVec3) -> bool {
        (pos.y as f32) < self.height_at(pos.x as f32, pos.z as f32)
    }

    fn classify_region(&self, region: &Aabb) -> RegionHint {
        let (min_h, max_h) = self.height_bounds(region.min.x, region.max.x, region.min.z, region.max.z);
        // Corner sampling can miss peaks and pits between samples
        let margin = self.params.height_scale * 0.25 + region.size().x * 0.5;

        if region.min.y > max_h + margin {
            return RegionHint::Empty;
        }
        if region.max.y < min_h - margin {
            return RegionHint::Solid;
        }
        RegionHint::Mixed
    }
}

impl std::fmt::Debug for NoiseTerrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseTerrain").field("params", &self.params).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_terrain_params_default() {
        let params = TerrainParams::default();
        assert_eq!(params.seed, 12345);
        assert_eq!(params.scale, 100.0);
        assert_eq!(params.octaves, 4);
        assert_eq!(params.sea_level, 16);
    }

    #[test]
    fn test_height_at() {
        let terrain = NoiseTerrain::new(TerrainParams::default());

        let height = terrain.height_at(0.0, 0.0);
        assert!((0.0..=48.0).contains(&height));
        assert_eq!(height, terrain.height_at(0.0, 0.0));

        let far = terrain.height_at(100.0, 100.0);
        assert!((0.0..=48.0).contains(&far));
    }

    #[test]
    fn test_different_seeds() {
        let a = NoiseTerrain::new(TerrainParams { seed: 1, ..Default::default() });
        let b = NoiseTerrain::new(TerrainParams { seed: 2, ..Default::default() });
        assert_ne!(a.height_at(50.0, 50.0), b.height_at(50.0, 50.0));
    }

    #[test]
    fn test_height_bounds() {
        let terrain = NoiseTerrain::new(TerrainParams::default());
        let (min_h, max_h) = terrain.height_bounds(0.0, 10.0, 0.0, 10.0);
        assert!(min_h <= max_h);
        for (x, z) in [(0.0, 0.0), (10.0, 10.0), (5.0, 5.0)] {
            let h = terrain.height_at(x, z);
            assert!(h >= min_h && h <= max_h);
        }
    }

    #[test]
    fn test_is_solid_follows_height() {
        let terrain = NoiseTerrain::new(TerrainParams::default());
        let h = terrain.height_at(7.0, -3.0);
        assert!(terrain.is_solid(IVec3::new(7, h.floor() as i32 - 1, -3)));
        assert!(!terrain.is_solid(IVec3::new(7, h.ceil() as i32 + 1, -3)));
    }

    #[test]
    fn test_classify_region() {
        let terrain = NoiseTerrain::new(TerrainParams::default());
        let sky = Aabb::new(Vec3::new(0.0, 200.0, 0.0), Vec3::new(18.0, 218.0, 18.0));
        assert_eq!(terrain.classify_region(&sky), RegionHint::Empty);

        let deep = Aabb::new(Vec3::new(0.0, -100.0, 0.0), Vec3::new(18.0, -82.0, 18.0));
        assert_eq!(terrain.classify_region(&deep), RegionHint::Solid);

        let surface = Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(18.0, 48.0, 18.0));
        assert_eq!(terrain.classify_region(&surface), RegionHint::Mixed);
    }

    #[test]
    fn test_params_json() {
        let params: TerrainParams = serde_json::from_str(r#"{ "seed": 7, "sea_level": 4 }"#).unwrap();
        assert_eq!(params.seed, 7);
        assert_eq!(params.octaves, 4);
        let terrain = NoiseTerrain::new(params);
        assert_eq!(terrain.material_bands().fluid_at_or_below, Some(4));
    }
}

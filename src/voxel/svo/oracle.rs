//! Voxel presence and material selection used while building chunks.
//!
//! Both traits are called concurrently from build jobs and must not rely on
//! shared mutable state.

use glam::IVec3;
use serde::{Deserialize, Serialize};

use crate::math::aabb::Aabb;
use crate::voxel::voxel::Material;

/// Hint about a whole region, so a build can skip per-cell oracle calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionHint {
    /// No solid cell in the region
    Empty,
    /// Every cell in the region is solid
    Solid,
    /// Has both; evaluate cell by cell
    Mixed,
    /// Classification is expensive or unknown
    Unknown,
}

/// Decides whether the cell at an absolute integer coordinate is solid.
pub trait VoxelOracle: Send + Sync {
    fn is_solid(&self, pos: IVec3) -> bool;

    /// Classify a region for early-out. The default always evaluates per cell.
    fn classify_region(&self, _region: &Aabb) -> RegionHint {
        RegionHint::Unknown
    }
}

impl<F> VoxelOracle for F
where
    F: Fn(IVec3) -> bool + Send + Sync,
{
    fn is_solid(&self, pos: IVec3) -> bool {
        self(pos)
    }
}

/// Picks the material for a cell, or `None` to leave it empty.
pub trait MaterialPolicy: Send + Sync {
    fn material_at(&self, pos: IVec3, solid: bool) -> Option<Material>;
}

/// Every solid cell gets the same material
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniformMaterial(pub Material);

impl Default for UniformMaterial {
    fn default() -> Self {
        Self(Material::Stone)
    }
}

impl MaterialPolicy for UniformMaterial {
    fn material_at(&self, _pos: IVec3, solid: bool) -> Option<Material> {
        solid.then_some(self.0)
    }
}

/// Height-banded terrain look: sand low, grass high, and optional water
/// filling empty cells up to a sea level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightBands {
    /// Solid cells below this height are sand
    pub sand_below: i32,
    /// Empty cells at or below this height are water
    pub fluid_at_or_below: Option<i32>,
}

impl Default for HeightBands {
    fn default() -> Self {
        Self { sand_below: 18, fluid_at_or_below: Some(16) }
    }
}

impl MaterialPolicy for HeightBands {
    fn material_at(&self, pos: IVec3, solid: bool) -> Option<Material> {
        if solid {
            return Some(if pos.y < self.sand_below { Material::Sand } else { Material::Grass });
        }
        match self.fluid_at_or_below {
            Some(level) if pos.y <= level => Some(Material::Water),
            _ => None,
        }
    }
}

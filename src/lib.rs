//! Voxstream - sparse voxel octree with chunk streaming around a viewpoint

pub mod core;
pub mod math;
pub mod voxel;
pub mod terrain;

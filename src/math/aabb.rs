//! Axis-aligned bounding box

use crate::core::types::Vec3;

/// Axis-aligned bounding box defined by min and max corners
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create a cube from its min corner and edge length
    pub fn cube(min: Vec3, edge: f32) -> Self {
        Self { min, max: min + Vec3::splat(edge) }
    }

    /// Get center point
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get size (max - min)
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Get half-extents
    pub fn half_extent(&self) -> Vec3 {
        self.size() * 0.5
    }

    /// Check if point is inside AABB (all faces closed)
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x && p.x <= self.max.x &&
        p.y >= self.min.y && p.y <= self.max.y &&
        p.z >= self.min.z && p.z <= self.max.z
    }

    /// Check if point is inside AABB, closed on the min faces and open on the max faces.
    ///
    /// Sibling octants share faces; with this test every point of the parent
    /// is claimed by exactly one of them.
    pub fn contains_point_half_open(&self, p: Vec3) -> bool {
        p.x >= self.min.x && p.x < self.max.x &&
        p.y >= self.min.y && p.y < self.max.y &&
        p.z >= self.min.z && p.z < self.max.z
    }

    /// Check if `other` lies entirely inside this AABB
    pub fn contains_aabb(&self, other: &Aabb) -> bool {
        other.min.x >= self.min.x && other.max.x <= self.max.x &&
        other.min.y >= self.min.y && other.max.y <= self.max.y &&
        other.min.z >= self.min.z && other.max.z <= self.max.z
    }

    /// Check if two AABBs intersect
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Get child octant AABB for octree subdivision
    /// index: 0-7 representing xyz octant (bit 0=x, bit 1=y, bit 2=z)
    pub fn child_octant(&self, index: u8) -> Aabb {
        debug_assert!(index < 8);
        let mid = self.center();
        let pick = |bit: u8, lo: f32, mid: f32, hi: f32| {
            if index & bit != 0 { (mid, hi) } else { (lo, mid) }
        };
        let (min_x, max_x) = pick(1, self.min.x, mid.x, self.max.x);
        let (min_y, max_y) = pick(2, self.min.y, mid.y, self.max.y);
        let (min_z, max_z) = pick(4, self.min.z, mid.z, self.max.z);
        Aabb::new(Vec3::new(min_x, min_y, min_z), Vec3::new(max_x, max_y, max_z))
    }

    /// Octant index of the child that claims `p` (same bit order as `child_octant`)
    pub fn octant_of(&self, p: Vec3) -> u8 {
        let mid = self.center();
        (p.x >= mid.x) as u8 | ((p.y >= mid.y) as u8) << 1 | ((p.z >= mid.z) as u8) << 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_accessors() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert_eq!(aabb.center(), Vec3::splat(0.5));
        assert_eq!(aabb.size(), Vec3::ONE);
        assert_eq!(Aabb::cube(Vec3::ONE, 2.0).max, Vec3::splat(3.0));
    }

    #[test]
    fn test_contains_point() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(aabb.contains_point(Vec3::splat(0.5)));
        assert!(aabb.contains_point(Vec3::ONE));
        assert!(!aabb.contains_point(Vec3::splat(2.0)));
    }

    #[test]
    fn test_contains_point_half_open() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(aabb.contains_point_half_open(Vec3::ZERO));
        assert!(!aabb.contains_point_half_open(Vec3::new(1.0, 0.5, 0.5)));
    }

    #[test]
    fn test_contains_aabb() {
        let outer = Aabb::new(Vec3::ZERO, Vec3::splat(4.0));
        assert!(outer.contains_aabb(&Aabb::new(Vec3::ONE, Vec3::splat(2.0))));
        assert!(outer.contains_aabb(&outer));
        assert!(!outer.contains_aabb(&Aabb::new(Vec3::ONE, Vec3::splat(5.0))));
    }

    #[test]
    fn test_intersects() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::splat(0.5), Vec3::splat(1.5));
        let c = Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_child_octant() {
        let parent = Aabb::new(Vec3::ZERO, Vec3::splat(2.0));
        let child0 = parent.child_octant(0); // -x, -y, -z
        assert_eq!(child0.min, Vec3::ZERO);
        assert_eq!(child0.max, Vec3::ONE);

        let child6 = parent.child_octant(6); // -x, +y, +z
        assert_eq!(child6.min, Vec3::new(0.0, 1.0, 1.0));
        assert_eq!(child6.max, Vec3::new(1.0, 2.0, 2.0));
    }

    #[test]
    fn test_octants_partition_parent() {
        let parent = Aabb::new(Vec3::splat(-8.0), Vec3::splat(8.0));
        let samples = [-8.0, -3.5, 0.0, 2.0, 7.5];
        for &x in &samples {
            for &y in &samples {
                for &z in &samples {
                    let p = Vec3::new(x, y, z);
                    let claims: Vec<u8> = (0..8)
                        .filter(|&i| parent.child_octant(i).contains_point_half_open(p))
                        .collect();
                    assert_eq!(claims, vec![parent.octant_of(p)], "point {p}");
                }
            }
        }
    }
}

//! Voxel entity stored at the leaves of the octree

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

/// One of the six axis-aligned faces of a voxel cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Face {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl Face {
    /// All faces in normal-comparison order.
    pub const ALL: [Face; 6] = [
        Face::PosX,
        Face::NegX,
        Face::PosY,
        Face::NegY,
        Face::PosZ,
        Face::NegZ,
    ];

    /// Unit outward normal
    pub fn normal(self) -> Vec3 {
        self.offset().as_vec3()
    }

    /// Integer step to the neighbouring cell across this face
    pub fn offset(self) -> IVec3 {
        match self {
            Face::PosX => IVec3::X,
            Face::NegX => IVec3::NEG_X,
            Face::PosY => IVec3::Y,
            Face::NegY => IVec3::NEG_Y,
            Face::PosZ => IVec3::Z,
            Face::NegZ => IVec3::NEG_Z,
        }
    }

    pub fn opposite(self) -> Face {
        match self {
            Face::PosX => Face::NegX,
            Face::NegX => Face::PosX,
            Face::PosY => Face::NegY,
            Face::NegY => Face::PosY,
            Face::PosZ => Face::NegZ,
            Face::NegZ => Face::PosZ,
        }
    }

    fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Compact set of faces (one bit per direction)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceSet(u8);

impl FaceSet {
    pub const EMPTY: FaceSet = FaceSet(0);
    pub const ALL: FaceSet = FaceSet(0b11_1111);

    pub fn insert(&mut self, face: Face) {
        self.0 |= face.bit();
    }

    pub fn remove(&mut self, face: Face) {
        self.0 &= !face.bit();
    }

    pub fn contains(self, face: Face) -> bool {
        self.0 & face.bit() != 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn iter(self) -> impl Iterator<Item = Face> {
        Face::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

/// Surface look of a voxel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Material {
    Grass,
    Sand,
    Water,
    Stone,
}

impl Material {
    /// Fluids do not hide the faces of neighbouring cells
    pub fn is_fluid(self) -> bool {
        matches!(self, Material::Water)
    }
}

/// Leaf entity: material plus visible faces and neighbour connections.
///
/// Only written while its chunk is being built, before the chunk is grafted
/// into the shared octree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Voxel {
    pub material: Material,
    /// Faces whose neighbour cell does not hide them
    pub faces: FaceSet,
    /// Directions in which the neighbour cell is occupied
    pub connections: FaceSet,
}

impl Voxel {
    /// New voxel with every face visible and no connections
    pub fn new(material: Material) -> Self {
        Self {
            material,
            faces: FaceSet::ALL,
            connections: FaceSet::EMPTY,
        }
    }

    pub fn add_face(&mut self, face: Face) {
        self.faces.insert(face);
    }

    pub fn remove_face(&mut self, face: Face) {
        self.faces.remove(face);
    }

    pub fn has_face(&self, face: Face) -> bool {
        self.faces.contains(face)
    }

    pub fn add_connection(&mut self, face: Face) {
        self.connections.insert(face);
    }

    pub fn remove_connection(&mut self, face: Face) {
        self.connections.remove(face);
    }

    /// True when no face is visible (fully enclosed)
    pub fn is_hidden(&self) -> bool {
        self.faces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_set() {
        let mut set = FaceSet::EMPTY;
        set.insert(Face::PosY);
        set.insert(Face::NegZ);
        assert!(set.contains(Face::PosY));
        assert!(!set.contains(Face::NegY));
        assert_eq!(set.len(), 2);

        set.remove(Face::PosY);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Face::NegZ]);
        assert_eq!(FaceSet::ALL.len(), 6);
    }

    #[test]
    fn test_opposite_normals_cancel() {
        for face in Face::ALL {
            assert_eq!(face.normal() + face.opposite().normal(), Vec3::ZERO);
            assert_eq!(face.opposite().opposite(), face);
        }
    }

    #[test]
    fn test_voxel_faces_and_connections() {
        let mut voxel = Voxel::new(Material::Stone);
        assert!(voxel.has_face(Face::PosX));
        voxel.remove_face(Face::PosX);
        voxel.add_connection(Face::PosX);
        assert!(!voxel.has_face(Face::PosX));
        assert!(voxel.connections.contains(Face::PosX));
        assert!(!voxel.is_hidden());

        for face in Face::ALL {
            voxel.remove_face(face);
        }
        assert!(voxel.is_hidden());
        voxel.add_face(Face::NegY);
        voxel.remove_connection(Face::PosX);
        assert!(voxel.connections.is_empty());
    }
}

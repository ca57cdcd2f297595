use crate::ChildIndex;

use glam::{BVec3, UVec3};
use ndshape::{ConstPow2Shape3u32, ConstShape};

/// The shape of one [`Leaf`](crate::Leaf) chunk: 2<sup>5</sup> x 2<sup>5</sup> x 2<sup>3</sup> positions.
///
/// Every axis must be a power of two so that a chunk anchor is `position & !(size - 1)`.
pub type ChunkShape = ConstPow2Shape3u32<5, 5, 3>;

/// Per-axis extent of a [`ChunkShape`].
pub const CHUNK_SIZE: UVec3 = UVec3::new(
    ChunkShape::ARRAY[0],
    ChunkShape::ARRAY[1],
    ChunkShape::ARRAY[2],
);

pub(crate) const CHUNK_VOLUME: usize = ChunkShape::SIZE as usize;
pub(crate) const CHUNK_X: usize = ChunkShape::ARRAY[0] as usize;
pub(crate) const CHUNK_Y: usize = ChunkShape::ARRAY[1] as usize;
pub(crate) const CHUNK_Z: usize = ChunkShape::ARRAY[2] as usize;

/// Which axes a tree node subdivides.
///
/// Nodes only split the axes whose half-extent is still at least the chunk size on that axis, so the floor axis
/// usually bottoms out long before `x` and `y`. [`NodeKind::Leaf`] splits nothing.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum NodeKind {
    Leaf = 0b000,
    X = 0b001,
    Y = 0b010,
    XY = 0b011,
    Z = 0b100,
    XZ = 0b101,
    YZ = 0b110,
    XYZ = 0b111,
}

impl NodeKind {
    /// The maximum number of children of any node kind.
    pub const MAX_CHILDREN: usize = 8;

    /// Bit 0 is `x`, bit 1 is `y`, bit 2 is `z`.
    #[inline]
    pub fn from_split_mask(mask: u8) -> Self {
        match mask & 0b111 {
            0b000 => Self::Leaf,
            0b001 => Self::X,
            0b010 => Self::Y,
            0b011 => Self::XY,
            0b100 => Self::Z,
            0b101 => Self::XZ,
            0b110 => Self::YZ,
            _ => Self::XYZ,
        }
    }

    #[inline]
    pub fn from_splits(splits: BVec3) -> Self {
        Self::from_split_mask(splits.bitmask() as u8)
    }

    #[inline]
    pub fn split_mask(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn splits(self) -> BVec3 {
        let mask = self.split_mask();
        BVec3::new(mask & 0b001 != 0, mask & 0b010 != 0, mask & 0b100 != 0)
    }

    #[inline]
    pub fn is_leaf(self) -> bool {
        self == Self::Leaf
    }

    /// 2, 4 or 8 for branches, 0 for leaves.
    #[inline]
    pub fn child_count(self) -> usize {
        match self {
            Self::Leaf => 0,
            kind => 1 << kind.split_mask().count_ones(),
        }
    }

    /// Packs one "upper half" bit per split axis, in `x`, `y`, `z` order, into a [`ChildIndex`].
    ///
    /// # Panics
    ///
    /// Leaves have no children.
    #[inline]
    pub fn linearize_child(self, upper: BVec3) -> ChildIndex {
        assert!(!self.is_leaf(), "leaf nodes have no child index");
        let splits = self.splits();
        let mut index = 0;
        let mut shift = 0;
        for (split, up) in [(splits.x, upper.x), (splits.y, upper.y), (splits.z, upper.z)] {
            if split {
                index |= (up as ChildIndex) << shift;
                shift += 1;
            }
        }
        index
    }

    /// Inverse of [`Self::linearize_child`]. Axes this kind does not split are reported as lower halves.
    #[inline]
    pub fn delinearize_child(self, index: ChildIndex) -> BVec3 {
        assert!(!self.is_leaf(), "leaf nodes have no child index");
        let splits = self.splits();
        let mut upper = [false; 3];
        let mut shift = 0;
        for (axis, split) in [splits.x, splits.y, splits.z].into_iter().enumerate() {
            if split {
                upper[axis] = (index >> shift) & 1 == 1;
                shift += 1;
            }
        }
        BVec3::from_array(upper)
    }
}

/// Row-major offset of a chunk-local coordinate.
#[inline]
pub(crate) fn linearize_local(local: UVec3) -> usize {
    ChunkShape::linearize(local.to_array()) as usize
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn chunk_constants() {
        assert_eq!(CHUNK_SIZE, UVec3::new(32, 32, 8));
        assert_eq!(CHUNK_VOLUME, 32 * 32 * 8);
        assert!(CHUNK_SIZE.to_array().iter().all(|s| s.is_power_of_two()));
    }

    #[test]
    fn local_offsets_are_row_major() {
        assert_eq!(linearize_local(UVec3::new(0, 0, 0)), 0);
        assert_eq!(linearize_local(UVec3::new(1, 0, 0)), 1);
        assert_eq!(linearize_local(UVec3::new(0, 1, 0)), CHUNK_X);
        assert_eq!(linearize_local(UVec3::new(0, 0, 1)), CHUNK_X * CHUNK_Y);
        assert_eq!(linearize_local(UVec3::new(31, 31, 7)), CHUNK_VOLUME - 1);
    }

    #[test]
    fn child_counts() {
        assert_eq!(NodeKind::Leaf.child_count(), 0);
        assert_eq!(NodeKind::Z.child_count(), 2);
        assert_eq!(NodeKind::XY.child_count(), 4);
        assert_eq!(NodeKind::XYZ.child_count(), 8);
        for mask in 0..8 {
            assert_eq!(NodeKind::from_split_mask(mask).split_mask(), mask);
        }
    }

    #[test]
    fn child_index_only_uses_split_axes() {
        let upper = BVec3::new(true, false, true);
        assert_eq!(NodeKind::XYZ.linearize_child(upper), 0b101);
        assert_eq!(NodeKind::XZ.linearize_child(upper), 0b11);
        assert_eq!(NodeKind::Y.linearize_child(upper), 0);
        assert_eq!(NodeKind::YZ.linearize_child(upper), 0b10);
        assert_eq!(NodeKind::YZ.delinearize_child(0b10), BVec3::new(false, false, true));
        for i in 0..4 {
            assert_eq!(NodeKind::XY.linearize_child(NodeKind::XY.delinearize_child(i)), i);
        }
    }

    #[test]
    #[should_panic(expected = "leaf nodes have no child index")]
    fn leaf_has_no_children() {
        NodeKind::Leaf.linearize_child(BVec3::TRUE);
    }
}

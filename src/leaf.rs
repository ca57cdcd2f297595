use crate::node::ParentPtr;
use crate::shape::{linearize_local, CHUNK_SIZE, CHUNK_VOLUME, CHUNK_X, CHUNK_Y, CHUNK_Z};
use crate::{BoundingBox, Position};

use glam::UVec3;

const WORDS: usize = CHUNK_VOLUME.div_ceil(64);

/// What a [`Leaf`] mutation did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct LeafChange {
    /// The position was inserted or removed.
    pub membership: bool,
    /// The leaf's absolute bounding box moved. Implies `membership`.
    pub bounds: bool,
}

/// One [`ChunkShape`](crate::ChunkShape)-sized chunk of the map.
///
/// Presence is a bit per chunk-local coordinate. The `xs`, `ys` and `zs` histograms count how many stored
/// positions have each local coordinate, which lets the local bounding box shrink with a scan bounded by the chunk
/// size instead of a rescan of every bit.
#[derive(Clone)]
pub struct Leaf {
    /// Chunk-aligned absolute corner.
    anchor: UVec3,
    bits: [u64; WORDS],
    xs: [u16; CHUNK_X],
    ys: [u16; CHUNK_Y],
    zs: [u16; CHUNK_Z],
    /// Local bounding corners. Meaningless while `len == 0`.
    low: UVec3,
    high: UVec3,
    len: u32,
    pub(crate) parent: ParentPtr,
}

impl Leaf {
    pub(crate) fn new(anchor: UVec3, parent: ParentPtr) -> Self {
        debug_assert_eq!(anchor % CHUNK_SIZE, UVec3::ZERO);
        Self {
            anchor,
            bits: [0; WORDS],
            xs: [0; CHUNK_X],
            ys: [0; CHUNK_Y],
            zs: [0; CHUNK_Z],
            low: UVec3::ZERO,
            high: UVec3::ZERO,
            len: 0,
            parent,
        }
    }

    /// The chunk-aligned corner with the smallest coordinates.
    #[inline]
    pub fn anchor(&self) -> Position {
        Position::from_uvec3(self.anchor)
    }

    /// Number of stored positions in this chunk.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True iff `position` falls inside this chunk, whether or not it is stored.
    #[inline]
    pub fn covers(&self, position: Position) -> bool {
        position.x >= 0 && position.y >= 0 && position.z >= 0 && self.covers_absolute(position.to_uvec3())
    }

    #[inline]
    pub(crate) fn covers_absolute(&self, p: UVec3) -> bool {
        p.cmpge(self.anchor).all() && p.cmplt(self.anchor + CHUNK_SIZE).all()
    }

    #[inline]
    pub fn contains(&self, position: Position) -> bool {
        self.covers(position) && self.contains_local(position.to_uvec3() - self.anchor)
    }

    #[inline]
    pub(crate) fn contains_local(&self, local: UVec3) -> bool {
        let i = linearize_local(local);
        self.bits[i / 64] & (1u64 << (i % 64)) != 0
    }

    /// The union of all stored positions, in absolute coordinates.
    #[inline]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        (self.len > 0).then(|| {
            BoundingBox::new(
                Position::from_uvec3(self.anchor + self.low),
                Position::from_uvec3(self.anchor + self.high),
            )
        })
    }

    /// Iterates the stored positions inside this leaf's own bounding box, `x` slowest and `z` fastest.
    pub fn iter(&self) -> LeafPositions<'_> {
        LeafPositions {
            leaf: self,
            next: (self.len > 0).then_some(self.low),
        }
    }

    pub(crate) fn add(&mut self, local: UVec3) -> LeafChange {
        let i = linearize_local(local);
        let (word, bit) = (i / 64, 1u64 << (i % 64));
        if self.bits[word] & bit != 0 {
            return LeafChange::default();
        }
        self.bits[word] |= bit;
        self.xs[local.x as usize] += 1;
        self.ys[local.y as usize] += 1;
        self.zs[local.z as usize] += 1;
        self.len += 1;

        if self.len == 1 {
            self.low = local;
            self.high = local;
            return LeafChange {
                membership: true,
                bounds: true,
            };
        }

        // Only a coordinate outside the current range can move a corner.
        let low = self.low.min(local);
        let high = self.high.max(local);
        let bounds = low != self.low || high != self.high;
        self.low = low;
        self.high = high;
        LeafChange {
            membership: true,
            bounds,
        }
    }

    pub(crate) fn remove(&mut self, local: UVec3) -> LeafChange {
        let i = linearize_local(local);
        let (word, bit) = (i / 64, 1u64 << (i % 64));
        if self.bits[word] & bit == 0 {
            return LeafChange::default();
        }
        self.bits[word] &= !bit;
        self.xs[local.x as usize] -= 1;
        self.ys[local.y as usize] -= 1;
        self.zs[local.z as usize] -= 1;
        self.len -= 1;

        if self.len == 0 {
            self.low = UVec3::ZERO;
            self.high = UVec3::ZERO;
            return LeafChange {
                membership: true,
                bounds: true,
            };
        }

        let mut bounds = false;
        bounds |= shrink_axis(&self.xs, local.x, &mut self.low.x, &mut self.high.x);
        bounds |= shrink_axis(&self.ys, local.y, &mut self.low.y, &mut self.high.y);
        bounds |= shrink_axis(&self.zs, local.z, &mut self.low.z, &mut self.high.z);
        LeafChange {
            membership: true,
            bounds,
        }
    }
}

/// After removing a position at `removed` on one axis, moves `low`/`high` inward past buckets that dropped to zero.
///
/// The leaf must still hold at least one position, so some bucket in `[low, high]` is nonzero.
#[inline]
fn shrink_axis(counts: &[u16], removed: u32, low: &mut u32, high: &mut u32) -> bool {
    if counts[removed as usize] != 0 {
        return false;
    }
    let mut changed = false;
    if removed == *low {
        while counts[*low as usize] == 0 {
            *low += 1;
        }
        changed = true;
    }
    if removed == *high {
        while counts[*high as usize] == 0 {
            *high -= 1;
        }
        changed = true;
    }
    changed
}

impl std::fmt::Debug for Leaf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Leaf")
            .field("anchor", &self.anchor())
            .field("len", &self.len)
            .field("bounding_box", &self.bounding_box())
            .finish()
    }
}

/// Positions stored in one [`Leaf`], restricted to the leaf's bounding box.
#[derive(Clone, Debug)]
pub struct LeafPositions<'a> {
    leaf: &'a Leaf,
    next: Option<UVec3>,
}

impl LeafPositions<'_> {
    /// Steps `z`, then `y`, then `x` through the local box. Returns `None` past the last cell.
    #[inline]
    fn step(&self, mut cursor: UVec3) -> Option<UVec3> {
        let (low, high) = (self.leaf.low, self.leaf.high);
        if cursor.z < high.z {
            cursor.z += 1;
        } else if cursor.y < high.y {
            cursor.z = low.z;
            cursor.y += 1;
        } else if cursor.x < high.x {
            cursor.z = low.z;
            cursor.y = low.y;
            cursor.x += 1;
        } else {
            return None;
        }
        Some(cursor)
    }
}

impl Iterator for LeafPositions<'_> {
    type Item = Position;

    fn next(&mut self) -> Option<Position> {
        while let Some(cursor) = self.next {
            self.next = self.step(cursor);
            if self.leaf.contains_local(cursor) {
                return Some(Position::from_uvec3(self.leaf.anchor + cursor));
            }
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn leaf() -> Leaf {
        Leaf::new(UVec3::new(64, 32, 8), ParentPtr::Root)
    }

    fn bbox(min: (i32, i32, i8), max: (i32, i32, i8)) -> Option<BoundingBox> {
        Some(BoundingBox::new(min.into(), max.into()))
    }

    #[test]
    fn add_is_idempotent() {
        let mut leaf = leaf();
        let change = leaf.add(UVec3::new(1, 2, 3));
        assert!(change.membership && change.bounds);
        assert_eq!(leaf.add(UVec3::new(1, 2, 3)), LeafChange::default());
        assert_eq!(leaf.len(), 1);
        assert!(leaf.contains(Position::new(65, 34, 11)));
        assert!(!leaf.contains(Position::new(65, 34, 12)));
        assert_eq!(leaf.bounding_box(), bbox((65, 34, 11), (65, 34, 11)));
    }

    #[test]
    fn add_inside_box_keeps_bounds() {
        let mut leaf = leaf();
        leaf.add(UVec3::new(0, 0, 0));
        assert!(leaf.add(UVec3::new(10, 10, 4)).bounds);
        let change = leaf.add(UVec3::new(5, 5, 2));
        assert!(change.membership);
        assert!(!change.bounds);
        assert_eq!(leaf.bounding_box(), bbox((64, 32, 8), (74, 42, 12)));
    }

    #[test]
    fn remove_shrinks_to_next_occupied_bucket() {
        let mut leaf = leaf();
        for p in [UVec3::new(2, 2, 0), UVec3::new(5, 9, 1), UVec3::new(20, 9, 7), UVec3::new(20, 3, 7)] {
            leaf.add(p);
        }
        assert_eq!(leaf.bounding_box(), bbox((66, 34, 8), (84, 41, 15)));

        // The other position at x = 20 keeps the x range.
        let change = leaf.remove(UVec3::new(20, 9, 7));
        assert!(change.membership);
        assert!(!change.bounds);

        let change = leaf.remove(UVec3::new(20, 3, 7));
        assert!(change.bounds);
        assert_eq!(leaf.bounding_box(), bbox((66, 34, 8), (69, 41, 9)));

        assert!(leaf.remove(UVec3::new(2, 2, 0)).bounds);
        assert_eq!(leaf.bounding_box(), bbox((69, 41, 9), (69, 41, 9)));
    }

    #[test]
    fn removing_last_clears_box() {
        let mut leaf = leaf();
        leaf.add(UVec3::new(3, 3, 3));
        assert_eq!(leaf.remove(UVec3::new(4, 4, 4)), LeafChange::default());
        let change = leaf.remove(UVec3::new(3, 3, 3));
        assert!(change.membership && change.bounds);
        assert!(leaf.is_empty());
        assert_eq!(leaf.bounding_box(), None);
        assert_eq!(leaf.iter().next(), None);
    }

    #[test]
    fn iter_skips_holes_within_box() {
        let mut leaf = leaf();
        let stored = [UVec3::new(1, 1, 1), UVec3::new(1, 4, 0), UVec3::new(3, 1, 1), UVec3::new(31, 31, 7)];
        for p in stored {
            leaf.add(p);
        }
        let positions: Vec<_> = leaf.iter().collect();
        assert_eq!(
            positions,
            vec![
                Position::new(65, 33, 9),
                Position::new(65, 36, 8),
                Position::new(67, 33, 9),
                Position::new(95, 63, 15),
            ]
        );
    }

    #[test]
    fn covers_chunk_extent() {
        let leaf = leaf();
        assert!(leaf.covers(Position::new(64, 32, 8)));
        assert!(leaf.covers(Position::new(95, 63, 15)));
        assert!(!leaf.covers(Position::new(96, 63, 15)));
        assert!(!leaf.covers(Position::new(63, 32, 8)));
        assert!(!leaf.covers(Position::new(-1, 32, 8)));
    }
}

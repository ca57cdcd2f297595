//! The split schedule of a [`Tree`](crate::Tree) and the cursor used to descend it.
//!
//! A map of extent `E` (rounded up to a power of two, and at least one chunk) on some axis is split on that axis at
//! depths `0..end`, where `end = log2(E / chunk)`. The node kind at a depth depends only on the depth, so every level
//! of the tree has a uniform branching factor and the upper levels can be laid out in one flat array.

use crate::shape::{NodeKind, CHUNK_SIZE};
use crate::{ChildIndex, MapSize};

use glam::UVec3;

/// The most entries (cached nodes plus boundary slots) the flat cache may hold.
pub const CACHE_NODE_BUDGET: u64 = 1 << 16;

/// Layout of a [`Tree`](crate::Tree), derived once from its [`MapSize`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CacheInitInfo {
    extent: UVec3,
    axis_end: UVec3,
    depth: u8,
    cached_levels: u8,
    cached_node_count: u32,
    boundary_slot_count: u32,
    schedule_node_count: u64,
}

impl CacheInitInfo {
    pub fn new(map_size: MapSize) -> Self {
        let extent = map_size.as_uvec3().map(u32::next_power_of_two).max(CHUNK_SIZE);
        let axis_end = (extent / CHUNK_SIZE).map(u32::trailing_zeros);
        let depth = axis_end.max_element() as u8;

        let kind_at = |d: u8| NodeKind::from_splits(axis_end.cmpgt(UVec3::splat(d as u32)));
        let mut level_counts = Vec::with_capacity(depth as usize + 1);
        let mut count = 1u64;
        for d in 0..=depth {
            level_counts.push(count);
            count = count.saturating_mul(kind_at(d).child_count() as u64);
        }
        let schedule_node_count = level_counts.iter().fold(0u64, |sum, &c| sum.saturating_add(c));

        let cache_entries = |levels: u8| -> u64 {
            level_counts[..=levels as usize]
                .iter()
                .fold(0u64, |sum, &c| sum.saturating_add(c))
        };
        let mut cached_levels = if depth == 0 {
            0
        } else {
            (axis_end.min_element() as u8).clamp(1, depth)
        };
        while cached_levels > 1 && cache_entries(cached_levels) > CACHE_NODE_BUDGET {
            cached_levels -= 1;
        }

        let boundary_slot_count = level_counts[cached_levels as usize] as u32;
        let cached_node_count = (cache_entries(cached_levels) - boundary_slot_count as u64) as u32;

        Self {
            extent,
            axis_end,
            depth,
            cached_levels,
            cached_node_count,
            boundary_slot_count,
            schedule_node_count,
        }
    }

    /// The addressed extent on each axis: the map size rounded up to a power of two and to at least one chunk.
    #[inline]
    pub fn extent(&self) -> UVec3 {
        self.extent
    }

    /// Per axis, the first depth at which that axis is no longer split.
    #[inline]
    pub fn axis_end(&self) -> UVec3 {
        self.axis_end
    }

    /// The depth of the leaves. Zero if the whole map fits in one chunk.
    #[inline]
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Number of levels stored in the flat cache. Level `cached_levels` is the first heap-allocated level.
    #[inline]
    pub fn cached_levels(&self) -> u8 {
        self.cached_levels
    }

    #[inline]
    pub fn cached_node_count(&self) -> u32 {
        self.cached_node_count
    }

    /// Child slots of the deepest cached level, each holding a heap node once it is needed.
    #[inline]
    pub fn boundary_slot_count(&self) -> u32 {
        self.boundary_slot_count
    }

    /// How many nodes (leaves included) a completely full tree would have.
    #[inline]
    pub fn schedule_node_count(&self) -> u64 {
        self.schedule_node_count
    }

    /// The kind of every node at `depth`.
    #[inline]
    pub fn kind_at(&self, depth: u8) -> NodeKind {
        NodeKind::from_splits(self.axis_end.cmpgt(UVec3::splat(depth as u32)))
    }
}

/// A cursor over one root-to-leaf descent.
///
/// `midpoint` is the split plane of the current node and `step` is how far the child midpoints lie from it. Both are
/// only meaningful on the axes `kind` splits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct TraversalState {
    pub depth: u8,
    pub kind: NodeKind,
    pub midpoint: UVec3,
    pub step: UVec3,
}

impl TraversalState {
    pub fn root(info: &CacheInitInfo) -> Self {
        Self {
            depth: 0,
            kind: info.kind_at(0),
            midpoint: info.extent / 2,
            step: info.extent / 4,
        }
    }

    /// Moves the cursor to the child of the current node that covers `position` and returns its index.
    ///
    /// An axis stays split in the child only while the child's half-extent, which is the current `step`, still
    /// reaches the chunk size on that axis.
    #[inline]
    pub fn update(&mut self, position: UVec3) -> ChildIndex {
        let splits = self.kind.splits();
        let upper = position.cmpge(self.midpoint) & splits;
        let child = self.kind.linearize_child(upper);

        let shifted = UVec3::select(upper, self.midpoint + self.step, self.midpoint - self.step);
        self.midpoint = UVec3::select(splits, shifted, self.midpoint);
        let child_splits = splits & self.step.cmpge(CHUNK_SIZE);
        self.step = UVec3::select(splits, self.step / 2, self.step);
        self.kind = NodeKind::from_splits(child_splits);
        self.depth += 1;

        child
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn info(width: u32, height: u32, floors: u32) -> CacheInitInfo {
        CacheInitInfo::new(MapSize::new(width, height, floors).unwrap())
    }

    #[test]
    fn asymmetric_schedule() {
        let info = info(4096, 4096, 16);
        assert_eq!(info.extent(), UVec3::new(4096, 4096, 16));
        assert_eq!(info.axis_end(), UVec3::new(7, 7, 1));
        assert_eq!(info.depth(), 7);
        assert_eq!(info.kind_at(0), NodeKind::XYZ);
        assert_eq!(info.kind_at(1), NodeKind::XY);
        assert_eq!(info.kind_at(6), NodeKind::XY);
        assert_eq!(info.kind_at(7), NodeKind::Leaf);
        assert_eq!(info.cached_levels(), 1);
        assert_eq!(info.cached_node_count(), 1);
        assert_eq!(info.boundary_slot_count(), 8);
        assert_eq!(
            info.schedule_node_count(),
            1 + 8 + 32 + 128 + 512 + 2048 + 8192 + 32768
        );
    }

    #[test]
    fn rounds_up_to_powers_of_two_and_chunks() {
        let info = info(1000, 70, 3);
        assert_eq!(info.extent(), UVec3::new(1024, 128, 8));
        assert_eq!(info.axis_end(), UVec3::new(5, 2, 0));
        assert_eq!(info.kind_at(0), NodeKind::XY);
        assert_eq!(info.kind_at(2), NodeKind::X);
        // The floor axis never splits, but one cached level is always kept.
        assert_eq!(info.cached_levels(), 1);
        assert_eq!(info.boundary_slot_count(), 4);
    }

    #[test]
    fn single_chunk_map_has_no_cache() {
        let info = info(20, 20, 4);
        assert_eq!(info.depth(), 0);
        assert_eq!(info.kind_at(0), NodeKind::Leaf);
        assert_eq!(info.cached_levels(), 0);
        assert_eq!(info.cached_node_count(), 0);
        assert_eq!(info.boundary_slot_count(), 1);
        assert_eq!(info.schedule_node_count(), 1);
    }

    #[test]
    fn cache_stops_where_floors_stop_splitting() {
        let info = info(65536, 65536, 128);
        assert_eq!(info.axis_end(), UVec3::new(11, 11, 4));
        // The floor axis stops splitting first, which bounds the cached region.
        assert_eq!(info.cached_levels(), 4);
        assert_eq!(info.cached_node_count(), 1 + 8 + 64 + 512);
        assert_eq!(info.boundary_slot_count(), 4096);
    }

    #[test]
    fn descent_follows_schedule() {
        let info = info(4096, 4096, 16);
        let target = UVec3::new(4000, 17, 9);
        let mut state = TraversalState::root(&info);
        let mut min = UVec3::ZERO;
        let mut size = info.extent();
        while state.depth < info.depth() {
            assert_eq!(state.kind, info.kind_at(state.depth));
            // The midpoint is the center of the node covering `target`.
            let splits = state.kind.splits();
            assert_eq!(
                UVec3::select(splits, state.midpoint, UVec3::ZERO),
                UVec3::select(splits, min + size / 2, UVec3::ZERO)
            );
            let child = state.update(target);
            let upper = info.kind_at(state.depth - 1).delinearize_child(child);
            let half = UVec3::select(splits, size / 2, size);
            min += UVec3::select(upper, half, UVec3::ZERO);
            size = half;
        }
        assert_eq!(state.kind, NodeKind::Leaf);
        assert_eq!(size, CHUNK_SIZE);
        assert_eq!(min, target - target % CHUNK_SIZE);
    }
}

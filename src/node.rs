use crate::allocator::{AllocPtr, EMPTY_ALLOC_PTR};
use crate::shape::NodeKind;
use crate::traversal::TraversalState;
use crate::BoundingBox;

use glam::UVec3;

/// Index into the flat cache array.
pub(crate) type CacheIndex = u32;

pub(crate) const NO_CACHE_PARENT: CacheIndex = CacheIndex::MAX;

/// A non-owning link from a heap node to its owner. Ownership always flows from the root down.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ParentPtr {
    /// The node is the root of the tree (only when nothing is cached).
    Root,
    /// The node sits in a boundary slot owned by this cached node.
    Cached(CacheIndex),
    Branch(AllocPtr),
}

/// A heap-allocated internal node below the cached levels.
#[derive(Clone, Debug)]
pub(crate) struct Branch {
    pub kind: NodeKind,
    pub depth: u8,
    pub midpoint: UVec3,
    pub step: UVec3,
    pub bounding_box: Option<BoundingBox>,
    pub parent: ParentPtr,
    /// Only the first `kind.child_count()` entries are used. Children at the leaf depth point into the leaf slab.
    pub children: [AllocPtr; NodeKind::MAX_CHILDREN],
}

impl Branch {
    /// Creates the node the cursor `state` currently points at.
    pub fn new(state: &TraversalState, parent: ParentPtr) -> Self {
        debug_assert!(!state.kind.is_leaf());
        Self {
            kind: state.kind,
            depth: state.depth,
            midpoint: state.midpoint,
            step: state.step,
            bounding_box: None,
            parent,
            children: [EMPTY_ALLOC_PTR; NodeKind::MAX_CHILDREN],
        }
    }

    /// A cursor positioned at this node.
    #[inline]
    pub fn state(&self) -> TraversalState {
        TraversalState {
            depth: self.depth,
            kind: self.kind,
            midpoint: self.midpoint,
            step: self.step,
        }
    }

    #[inline]
    pub fn children(&self) -> &[AllocPtr] {
        &self.children[..self.kind.child_count()]
    }
}

/// A node of the upper levels, stored by value in the flat cache array.
///
/// Its children occupy `child_cache_offset..child_cache_offset + kind.child_count()`. Offsets past the end of the
/// cache array address boundary slots that hold heap nodes.
#[derive(Clone, Debug)]
pub(crate) struct CachedNode {
    pub kind: NodeKind,
    pub cache_index: CacheIndex,
    pub child_cache_offset: u32,
    pub parent: CacheIndex,
    pub bounding_box: Option<BoundingBox>,
    /// Set once the node has been given a bounding box, so `clear` can find it again.
    pub touched: bool,
}

impl CachedNode {
    pub fn new(kind: NodeKind, cache_index: CacheIndex, child_cache_offset: u32, parent: CacheIndex) -> Self {
        Self {
            kind,
            cache_index,
            child_cache_offset,
            parent,
            bounding_box: None,
            touched: false,
        }
    }

    #[inline]
    pub fn child_slots(&self) -> std::ops::Range<u32> {
        self.child_cache_offset..self.child_cache_offset + self.kind.child_count() as u32
    }
}

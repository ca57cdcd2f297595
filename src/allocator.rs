use crate::bounding_box::{include_optional, union_all};
use crate::leaf::Leaf;
use crate::node::{Branch, ParentPtr};
use crate::shape::CHUNK_SIZE;
use crate::traversal::TraversalState;
use crate::BoundingBox;

use glam::UVec3;
use slab::Slab;
use smallvec::SmallVec;

/// Points to a node owned by [`NodeAllocator`]. Whether it is a branch or a leaf follows from its depth.
pub(crate) type AllocPtr = u32;

/// An [`AllocPtr`] that doesn't point to anything.
pub(crate) const EMPTY_ALLOC_PTR: AllocPtr = AllocPtr::MAX;

/// Owns every node below the cached levels.
///
/// Branches and leaves live in separate slabs. A node at the leaf depth is always a leaf and every other heap node is
/// a branch, so an [`AllocPtr`] plus its depth identifies the node.
#[derive(Clone, Debug, Default)]
pub(crate) struct NodeAllocator {
    branches: Slab<Branch>,
    leaves: Slab<Leaf>,
}

impl NodeAllocator {
    #[inline]
    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    #[inline]
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Creates the node the cursor `state` points at, as a leaf covering `position` if `state` is at the leaf depth.
    #[inline]
    pub fn insert_node(&mut self, state: &TraversalState, position: UVec3, parent: ParentPtr) -> AllocPtr {
        if state.kind.is_leaf() {
            let anchor = position - position % CHUNK_SIZE;
            self.leaves.insert(Leaf::new(anchor, parent)) as AllocPtr
        } else {
            self.branches.insert(Branch::new(state, parent)) as AllocPtr
        }
    }

    /// Descends one level from `parent_ptr` towards `position`, creating the child if needed.
    ///
    /// `state` must be positioned at `parent_ptr`. On return it is positioned at the returned child.
    #[inline]
    pub fn get_or_create_child(
        &mut self,
        parent_ptr: AllocPtr,
        state: &mut TraversalState,
        position: UVec3,
    ) -> AllocPtr {
        debug_assert_eq!(*state, self.branch(parent_ptr).state());
        let child_index = state.update(position) as usize;
        let existing = self.branch(parent_ptr).children[child_index];
        if existing != EMPTY_ALLOC_PTR {
            return existing;
        }
        let child_ptr = self.insert_node(state, position, ParentPtr::Branch(parent_ptr));
        self.branch_mut(parent_ptr).children[child_index] = child_ptr;
        child_ptr
    }

    /// Same as [`Self::get_or_create_child`] but never allocates.
    #[inline]
    pub fn find_child(&self, parent_ptr: AllocPtr, state: &mut TraversalState, position: UVec3) -> Option<AllocPtr> {
        let child_index = state.update(position) as usize;
        let child_ptr = self.branch(parent_ptr).children[child_index];
        (child_ptr != EMPTY_ALLOC_PTR).then_some(child_ptr)
    }

    #[inline]
    pub fn branch(&self, ptr: AllocPtr) -> &Branch {
        &self.branches[ptr as usize]
    }

    #[inline]
    pub fn branch_mut(&mut self, ptr: AllocPtr) -> &mut Branch {
        &mut self.branches[ptr as usize]
    }

    #[inline]
    pub fn leaf(&self, ptr: AllocPtr) -> &Leaf {
        &self.leaves[ptr as usize]
    }

    #[inline]
    pub fn leaf_mut(&mut self, ptr: AllocPtr) -> &mut Leaf {
        &mut self.leaves[ptr as usize]
    }

    #[inline]
    pub fn bounding_box(&self, ptr: AllocPtr, is_leaf: bool) -> Option<BoundingBox> {
        if is_leaf {
            self.leaf(ptr).bounding_box()
        } else {
            self.branch(ptr).bounding_box
        }
    }

    /// Grows the box of branch `ptr` to cover `child_box`. Returns true iff it changed.
    #[inline]
    pub fn include_child_box(&mut self, ptr: AllocPtr, child_box: Option<BoundingBox>) -> bool {
        include_optional(&mut self.branch_mut(ptr).bounding_box, child_box)
    }

    /// Recomputes the box of branch `ptr` from its children. Returns true iff it changed.
    pub fn recompute_bounding_box(&mut self, ptr: AllocPtr, leaf_depth: u8) -> bool {
        let branch = self.branch(ptr);
        let children_are_leaves = branch.depth + 1 == leaf_depth;
        let child_boxes: SmallVec<[Option<BoundingBox>; 8]> = branch
            .children()
            .iter()
            .filter(|&&child| child != EMPTY_ALLOC_PTR)
            .map(|&child| self.bounding_box(child, children_are_leaves))
            .collect();
        let union = union_all(child_boxes);
        let branch = self.branch_mut(ptr);
        let changed = branch.bounding_box != union;
        branch.bounding_box = union;
        changed
    }

    /// Drops every heap node. Any [`AllocPtr`] handed out before is invalid afterwards.
    pub fn clear(&mut self) {
        self.branches.clear();
        self.leaves.clear();
    }
}

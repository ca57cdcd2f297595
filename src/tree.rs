use crate::allocator::{AllocPtr, NodeAllocator, EMPTY_ALLOC_PTR};
use crate::bounding_box::union_all;
use crate::iter::{Iter, LeafIter, NodeRef};
use crate::leaf::Leaf;
use crate::node::{CacheIndex, CachedNode, ParentPtr, NO_CACHE_PARENT};
use crate::shape::CHUNK_SIZE;
use crate::traversal::{CacheInitInfo, TraversalState};
use crate::{BoundingBox, MapSize, Position};

use glam::UVec3;
use std::cell::Cell;
use std::fmt;

/// The most recently reached leaf and the deepest cached node above it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct LeafMemo {
    leaf: AllocPtr,
    anchor: UVec3,
    cached_ancestor: CacheIndex,
}

impl LeafMemo {
    #[inline]
    fn covers(&self, p: UVec3) -> bool {
        p.cmpge(self.anchor).all() && p.cmplt(self.anchor + CHUNK_SIZE).all()
    }
}

/// A sparse set of [`Position`]s inside a fixed [`MapSize`].
///
/// The upper levels of the tree are stored by value in one flat array whose shape never changes for a given map size.
/// Deeper levels are allocated as positions arrive. Every node keeps the bounding box of the positions below it, so
/// [`Tree::bounding_box`] is O(1) and iteration never visits empty subtrees.
///
/// Even read-only queries update an internal "last leaf" memo, which makes the tree `!Sync`.
pub struct Tree {
    map_size: MapSize,
    info: CacheInitInfo,
    /// The cached levels, breadth-first.
    cache: Vec<CachedNode>,
    /// Heap nodes hanging off the deepest cached level. Slot `i` has cache-wide offset `cache.len() + i`.
    boundary: Vec<AllocPtr>,
    touched_cache: Vec<CacheIndex>,
    touched_boundary: Vec<u32>,
    alloc: NodeAllocator,
    size: usize,
    only_position: Option<Position>,
    last_leaf: Cell<Option<LeafMemo>>,
}

impl Tree {
    /// Builds the cached levels for `map_size`. The map size cannot change afterwards.
    pub fn new(map_size: MapSize) -> Self {
        let info = CacheInitInfo::new(map_size);

        let mut cache = Vec::with_capacity(info.cached_node_count() as usize);
        let mut level_start = 0;
        let mut level_len = 1;
        let mut parent_start = NO_CACHE_PARENT;
        let mut parent_branching = 1;
        for level in 0..info.cached_levels() {
            let kind = info.kind_at(level);
            let branching = kind.child_count() as u32;
            let next_start = level_start + level_len;
            for i in 0..level_len {
                let parent = if level == 0 {
                    NO_CACHE_PARENT
                } else {
                    parent_start + i / parent_branching
                };
                cache.push(CachedNode::new(kind, level_start + i, next_start + i * branching, parent));
            }
            parent_start = level_start;
            parent_branching = branching;
            level_start = next_start;
            level_len *= branching;
        }
        debug_assert_eq!(cache.len(), info.cached_node_count() as usize);
        debug_assert_eq!(level_len, info.boundary_slot_count());

        tracing::debug!(
            width = map_size.width(),
            height = map_size.height(),
            floors = map_size.floors(),
            depth = info.depth(),
            cached_levels = info.cached_levels(),
            cached_nodes = info.cached_node_count(),
            boundary_slots = info.boundary_slot_count(),
            "created position tree"
        );

        Self {
            map_size,
            info,
            cache,
            boundary: vec![EMPTY_ALLOC_PTR; info.boundary_slot_count() as usize],
            touched_cache: Vec::new(),
            touched_boundary: Vec::new(),
            alloc: NodeAllocator::default(),
            size: 0,
            only_position: None,
            last_leaf: Cell::new(None),
        }
    }

    #[inline]
    pub fn map_size(&self) -> MapSize {
        self.map_size
    }

    /// The layout derived from [`Self::map_size`].
    #[inline]
    pub fn cache_info(&self) -> &CacheInitInfo {
        &self.info
    }

    /// Number of stored positions.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The stored position iff exactly one is stored.
    #[inline]
    pub fn only_position(&self) -> Option<Position> {
        self.only_position
    }

    /// The smallest box covering every stored position, or `None` if the tree is empty.
    #[inline]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.slot_bounding_box(0)
    }

    /// Inserts `position`. Returns false if it was already present.
    ///
    /// # Panics
    ///
    /// If `position` is outside the map.
    pub fn add(&mut self, position: Position) -> bool {
        let p = self.map_size.check(position);
        let (leaf_ptr, cached_ancestor) = self.get_or_create_leaf(p);
        let change = self.alloc.leaf_mut(leaf_ptr).add(p % CHUNK_SIZE);
        if !change.membership {
            return false;
        }

        self.size += 1;
        match self.size {
            1 => self.only_position = Some(position),
            2 => self.only_position = None,
            _ => {}
        }
        if change.bounds {
            self.propagate_bounding_box(leaf_ptr, cached_ancestor, true);
        }
        true
    }

    /// Removes `position`. Returns false if it was not present.
    ///
    /// # Panics
    ///
    /// If `position` is outside the map.
    pub fn remove(&mut self, position: Position) -> bool {
        let p = self.map_size.check(position);
        let Some((leaf_ptr, cached_ancestor)) = self.find_leaf(p) else {
            return false;
        };
        let change = self.alloc.leaf_mut(leaf_ptr).remove(p % CHUNK_SIZE);
        if !change.membership {
            return false;
        }

        self.size -= 1;
        if change.bounds {
            self.propagate_bounding_box(leaf_ptr, cached_ancestor, false);
        }
        match self.size {
            0 => self.only_position = None,
            1 => {
                // Iteration prunes by bounding box, so this must run after propagation.
                self.only_position = self.iter().next();
                tracing::trace!(survivor = ?self.only_position, "rescanned for the only remaining position");
            }
            _ => {}
        }
        true
    }

    /// # Panics
    ///
    /// If `position` is outside the map.
    pub fn contains(&self, position: Position) -> bool {
        let p = self.map_size.check(position);
        self.find_leaf(p)
            .is_some_and(|(leaf_ptr, _)| self.alloc.leaf(leaf_ptr).contains_local(p % CHUNK_SIZE))
    }

    /// The leaf covering `position`, if one was ever created. Never allocates.
    ///
    /// # Panics
    ///
    /// If `position` is outside the map.
    pub fn get_leaf(&self, position: Position) -> Option<&Leaf> {
        let p = self.map_size.check(position);
        self.find_leaf(p).map(|(leaf_ptr, _)| self.alloc.leaf(leaf_ptr))
    }

    /// Removes every position. Returns true iff the tree was non-empty.
    ///
    /// The cached levels are kept and only the entries that were ever given a bounding box are reset. Heap nodes are
    /// dropped.
    pub fn clear(&mut self) -> bool {
        let changed = self.size > 0;

        let reset_cached = self.touched_cache.len();
        for index in self.touched_cache.drain(..) {
            let node = &mut self.cache[index as usize];
            node.bounding_box = None;
            node.touched = false;
        }
        let reset_slots = self.touched_boundary.len();
        for slot in self.touched_boundary.drain(..) {
            self.boundary[slot as usize] = EMPTY_ALLOC_PTR;
        }
        let dropped_branches = self.alloc.branch_count();
        let dropped_leaves = self.alloc.leaf_count();
        self.alloc.clear();

        self.size = 0;
        self.only_position = None;
        self.last_leaf.set(None);

        tracing::debug!(
            reset_cached,
            reset_slots,
            dropped_branches,
            dropped_leaves,
            "cleared position tree"
        );
        changed
    }

    /// Every non-empty leaf, breadth-first from the root.
    #[inline]
    pub fn leaf_iter(&self) -> LeafIter<'_> {
        LeafIter::new(self)
    }

    /// Every stored position exactly once. Leaves are visited breadth-first and positions within a leaf in `x`, `y`,
    /// `z` order.
    #[inline]
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(self.leaf_iter())
    }

    #[inline]
    fn remember(&self, leaf: AllocPtr, p: UVec3, cached_ancestor: CacheIndex) {
        self.last_leaf.set(Some(LeafMemo {
            leaf,
            anchor: p - p % CHUNK_SIZE,
            cached_ancestor,
        }));
    }

    /// Walks the cached levels towards `p`. Returns the cursor at the boundary level, the boundary slot, and the
    /// deepest cached node on the way (if any).
    #[inline]
    fn descend_cache(&self, p: UVec3) -> (TraversalState, usize, CacheIndex) {
        let mut state = TraversalState::root(&self.info);
        let mut slot = 0;
        let mut cached_ancestor = NO_CACHE_PARENT;
        while state.depth < self.info.cached_levels() {
            let node = &self.cache[slot as usize];
            debug_assert_eq!(node.kind, state.kind);
            cached_ancestor = node.cache_index;
            slot = node.child_cache_offset + state.update(p) as u32;
        }
        (state, slot as usize - self.cache.len(), cached_ancestor)
    }

    fn get_or_create_leaf(&mut self, p: UVec3) -> (AllocPtr, CacheIndex) {
        if let Some(memo) = self.last_leaf.get() {
            if memo.covers(p) {
                return (memo.leaf, memo.cached_ancestor);
            }
        }

        let (mut state, slot, cached_ancestor) = self.descend_cache(p);
        let mut ptr = self.boundary[slot];
        if ptr == EMPTY_ALLOC_PTR {
            let parent = if cached_ancestor == NO_CACHE_PARENT {
                ParentPtr::Root
            } else {
                ParentPtr::Cached(cached_ancestor)
            };
            ptr = self.alloc.insert_node(&state, p, parent);
            self.boundary[slot] = ptr;
            self.touched_boundary.push(slot as u32);
        }
        while state.depth < self.info.depth() {
            ptr = self.alloc.get_or_create_child(ptr, &mut state, p);
        }

        self.remember(ptr, p, cached_ancestor);
        (ptr, cached_ancestor)
    }

    fn find_leaf(&self, p: UVec3) -> Option<(AllocPtr, CacheIndex)> {
        if let Some(memo) = self.last_leaf.get() {
            if memo.covers(p) {
                return Some((memo.leaf, memo.cached_ancestor));
            }
        }

        let (mut state, slot, cached_ancestor) = self.descend_cache(p);
        let mut ptr = self.boundary[slot];
        if ptr == EMPTY_ALLOC_PTR {
            return None;
        }
        while state.depth < self.info.depth() {
            ptr = self.alloc.find_child(ptr, &mut state, p)?;
        }

        self.remember(ptr, p, cached_ancestor);
        Some((ptr, cached_ancestor))
    }

    /// Pushes a change of the box of leaf `leaf_ptr` up to the root, stopping at the first ancestor whose box stays
    /// the same. A leaf box that only `grew` is merged in, a shrunk one forces a recomputation from the children.
    ///
    /// The heap chain above the leaf always ends at `cached_ancestor`, where the flat recomputation takes over.
    fn propagate_bounding_box(&mut self, leaf_ptr: AllocPtr, cached_ancestor: CacheIndex, grew: bool) {
        let leaf = self.alloc.leaf(leaf_ptr);
        let mut child_box = leaf.bounding_box();
        let mut parent = leaf.parent;
        loop {
            match parent {
                ParentPtr::Root => return,
                ParentPtr::Cached(index) => {
                    debug_assert_eq!(index, cached_ancestor);
                    self.update_bounding_box_cached(index);
                    return;
                }
                ParentPtr::Branch(ptr) => {
                    let changed = if grew {
                        self.alloc.include_child_box(ptr, child_box)
                    } else {
                        self.alloc.recompute_bounding_box(ptr, self.info.depth())
                    };
                    if !changed {
                        return;
                    }
                    let branch = self.alloc.branch(ptr);
                    child_box = branch.bounding_box;
                    parent = branch.parent;
                }
            }
        }
    }

    /// Recomputes the box of cached node `index` as the union of its children, then does the same for its cached
    /// ancestors until one does not change.
    fn update_bounding_box_cached(&mut self, mut index: CacheIndex) {
        loop {
            let slots = self.cache[index as usize].child_slots();
            let union = union_all(slots.map(|slot| self.slot_bounding_box(slot as usize)));

            let node = &mut self.cache[index as usize];
            if node.bounding_box == union {
                return;
            }
            node.bounding_box = union;
            if !node.touched {
                node.touched = true;
                self.touched_cache.push(index);
            }
            if node.parent == NO_CACHE_PARENT {
                return;
            }
            index = node.parent;
        }
    }

    #[inline]
    fn boundary_holds_leaves(&self) -> bool {
        self.info.cached_levels() == self.info.depth()
    }

    /// The box of the node at cache-wide `slot`, which is either a cached node or a boundary slot.
    #[inline]
    fn slot_bounding_box(&self, slot: usize) -> Option<BoundingBox> {
        match self.cache.get(slot) {
            Some(node) => node.bounding_box,
            None => {
                let ptr = self.boundary[slot - self.cache.len()];
                if ptr == EMPTY_ALLOC_PTR {
                    None
                } else {
                    self.alloc.bounding_box(ptr, self.boundary_holds_leaves())
                }
            }
        }
    }

    /// The node at cache-wide `slot`, or `None` if it holds no positions.
    pub(crate) fn resolve_slot(&self, slot: usize) -> Option<NodeRef> {
        self.slot_bounding_box(slot)?;
        if slot < self.cache.len() {
            Some(NodeRef::Cached(slot as CacheIndex))
        } else if self.boundary_holds_leaves() {
            Some(NodeRef::Leaf(self.boundary[slot - self.cache.len()]))
        } else {
            Some(NodeRef::Branch(self.boundary[slot - self.cache.len()]))
        }
    }

    /// Non-empty children of `node`, in child index order.
    pub(crate) fn visit_children(&self, node: NodeRef, mut visitor: impl FnMut(NodeRef)) {
        match node {
            NodeRef::Cached(index) => {
                for slot in self.cache[index as usize].child_slots() {
                    if let Some(child) = self.resolve_slot(slot as usize) {
                        visitor(child);
                    }
                }
            }
            NodeRef::Branch(ptr) => {
                let branch = self.alloc.branch(ptr);
                let children_are_leaves = branch.depth + 1 == self.info.depth();
                for &child in branch.children() {
                    if child == EMPTY_ALLOC_PTR || self.alloc.bounding_box(child, children_are_leaves).is_none() {
                        continue;
                    }
                    visitor(if children_are_leaves {
                        NodeRef::Leaf(child)
                    } else {
                        NodeRef::Branch(child)
                    });
                }
            }
            NodeRef::Leaf(_) => {}
        }
    }

    #[inline]
    pub(crate) fn leaf_node(&self, ptr: AllocPtr) -> &Leaf {
        self.alloc.leaf(ptr)
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("map_size", &self.map_size)
            .field("size", &self.size)
            .field("bounding_box", &self.bounding_box())
            .field("branches", &self.alloc.branch_count())
            .field("leaves", &self.alloc.leaf_count())
            .finish()
    }
}

impl<'a> IntoIterator for &'a Tree {
    type Item = Position;
    type IntoIter = Iter<'a>;

    #[inline]
    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl Extend<Position> for Tree {
    fn extend<I: IntoIterator<Item = Position>>(&mut self, positions: I) {
        for position in positions {
            self.add(position);
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

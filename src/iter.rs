use crate::allocator::AllocPtr;
use crate::leaf::{Leaf, LeafPositions};
use crate::node::CacheIndex;
use crate::{Position, Tree};

use std::collections::VecDeque;
use std::iter::FusedIterator;

/// A node reached during iteration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum NodeRef {
    Cached(CacheIndex),
    Branch(AllocPtr),
    Leaf(AllocPtr),
}

/// Breadth-first walk over the non-empty [`Leaf`]s of a [`Tree`]. Subtrees without a bounding box are skipped.
#[derive(Clone, Debug)]
pub struct LeafIter<'a> {
    tree: &'a Tree,
    queue: VecDeque<NodeRef>,
}

impl<'a> LeafIter<'a> {
    pub(crate) fn new(tree: &'a Tree) -> Self {
        let mut queue = VecDeque::new();
        queue.extend(tree.resolve_slot(0));
        Self { tree, queue }
    }
}

impl<'a> Iterator for LeafIter<'a> {
    type Item = &'a Leaf;

    fn next(&mut self) -> Option<&'a Leaf> {
        while let Some(node) = self.queue.pop_front() {
            if let NodeRef::Leaf(ptr) = node {
                return Some(self.tree.leaf_node(ptr));
            }
            let queue = &mut self.queue;
            self.tree.visit_children(node, |child| queue.push_back(child));
        }
        None
    }
}

impl FusedIterator for LeafIter<'_> {}

/// Every [`Position`] of a [`Tree`]: the positions of each leaf from [`LeafIter`], restricted to that leaf's own
/// bounding box.
#[derive(Clone, Debug)]
pub struct Iter<'a> {
    leaves: LeafIter<'a>,
    current: Option<LeafPositions<'a>>,
}

impl<'a> Iter<'a> {
    pub(crate) fn new(leaves: LeafIter<'a>) -> Self {
        Self {
            leaves,
            current: None,
        }
    }
}

impl Iterator for Iter<'_> {
    type Item = Position;

    fn next(&mut self) -> Option<Position> {
        loop {
            if let Some(position) = self.current.as_mut().and_then(Iterator::next) {
                return Some(position);
            }
            self.current = Some(self.leaves.next()?.iter());
        }
    }
}

impl FusedIterator for Iter<'_> {}

#[cfg(test)]
mod test {
    use crate::{MapSize, Position, Tree};

    #[test]
    fn restarts_from_scratch() {
        let mut tree = Tree::new(MapSize::new(2000, 1000, 7).unwrap());
        let positions = [
            Position::new(3, 900, 6),
            Position::new(1999, 999, 0),
            Position::new(4, 900, 6),
            Position::new(1024, 0, 3),
        ];
        tree.extend(positions);

        let mut first = tree.iter();
        assert!(first.next().is_some());
        let all: Vec<_> = tree.iter().collect();
        assert_eq!(all.len(), positions.len());
        assert_eq!(tree.iter().collect::<Vec<_>>(), all);
        assert_eq!(first.count(), positions.len() - 1);
    }

    #[test]
    fn leaves_are_never_empty() {
        let mut tree = Tree::new(MapSize::new(256, 256, 8).unwrap());
        for x in 0..256 {
            tree.add(Position::new(x, x, (x % 8) as i8));
        }
        for x in (0..256).filter(|x| x % 64 != 0) {
            tree.remove(Position::new(x, x, (x % 8) as i8));
        }
        let leaves: Vec<_> = tree.leaf_iter().collect();
        assert_eq!(leaves.len(), 4);
        assert!(leaves.iter().all(|leaf| leaf.len() == 1));
        assert_eq!(tree.iter().count(), 4);
    }
}

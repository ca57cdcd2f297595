//! A sparse set of 3D map positions.
//!
//! A [`Tree`] stores which `(x, y, floor)` cells of a fixed-size map are occupied. The map may be tens of thousands of
//! cells wide with dozens of floors while only a handful of cells are in use, so storage and iteration scale with the
//! occupied volume instead of the addressable one.
//!
//! ```
//! use position_tree::{MapSize, Position, Tree};
//!
//! let mut tree = Tree::new(MapSize::new(4096, 4096, 16).unwrap());
//! assert!(tree.add(Position::new(10, 10, 7)));
//! assert!(!tree.add(Position::new(10, 10, 7)));
//! assert!(tree.add(Position::new(4000, 4000, 0)));
//!
//! let bbox = tree.bounding_box().unwrap();
//! assert_eq!(bbox.min(), Position::new(10, 10, 0));
//! assert_eq!(bbox.max(), Position::new(4000, 4000, 7));
//!
//! tree.remove(Position::new(10, 10, 7));
//! assert_eq!(tree.only_position(), Some(Position::new(4000, 4000, 0)));
//! ```
//!
//! # Structure
//!
//! Each internal node only splits the axes whose half-extent is still at least one [`ChunkShape`] wide, so a map with
//! few floors stops splitting `z` near the root while `x` and `y` keep going. The top levels live in one flat array
//! that never reallocates. Everything below is allocated on demand and ends in [`Leaf`] chunks holding one bit per
//! position.
//!
//! # Performance
//!
//! - `add`, `remove`, `contains`: O(depth), or O(1) when the position falls in the same chunk as the previous call
//! - `bounding_box`, `size`, `only_position`: O(1)
//! - iteration: O(non-empty nodes + volume of each leaf's bounding box)
//!
//! Positions outside the [`MapSize`] are a caller bug and panic.

mod allocator;
mod bounding_box;
mod iter;
mod leaf;
mod node;
mod position;
mod shape;
mod traversal;
mod tree;

pub use bounding_box::BoundingBox;
pub use iter::{Iter, LeafIter};
pub use leaf::{Leaf, LeafPositions};
pub use position::{MapSize, MapSizeError, Position, MAX_FLOORS, MAX_MAP_EXTENT};
pub use shape::{ChunkShape, NodeKind, CHUNK_SIZE};
pub use traversal::{CacheInitInfo, CACHE_NODE_BUDGET};
pub use tree::Tree;

pub use glam;

/// A linear index of a node relative to its parent.
pub type ChildIndex = u8;

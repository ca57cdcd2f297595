use glam::UVec3;
use std::fmt;
use thiserror::Error;

/// The largest supported `width` or `height` of a [`MapSize`].
///
/// Extents are rounded up to a power of two internally, so this keeps the rounded extent in `u32` range.
pub const MAX_MAP_EXTENT: u32 = 1 << 30;

/// The largest supported floor count. Floors are addressed with an `i8`.
pub const MAX_FLOORS: u32 = i8::MAX as u32 + 1;

/// One addressable map cell: `(x, y)` plus a floor index `z`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i8,
}

impl Position {
    #[inline]
    pub const fn new(x: i32, y: i32, z: i8) -> Self {
        Self { x, y, z }
    }

    /// Only call this after the position was checked against a [`MapSize`].
    #[inline]
    pub(crate) fn to_uvec3(self) -> UVec3 {
        UVec3::new(self.x as u32, self.y as u32, self.z as u32)
    }

    #[inline]
    pub(crate) fn from_uvec3(v: UVec3) -> Self {
        Self {
            x: v.x as i32,
            y: v.y as i32,
            z: v.z as i8,
        }
    }
}

impl From<(i32, i32, i8)> for Position {
    #[inline]
    fn from((x, y, z): (i32, i32, i8)) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Rejected [`MapSize`] dimensions.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum MapSizeError {
    #[error("map extent must be non-zero, got {width}x{height}x{floors}")]
    ZeroExtent { width: u32, height: u32, floors: u32 },
    #[error("map has {floors} floors but at most {} are addressable", MAX_FLOORS)]
    TooManyFloors { floors: u32 },
    #[error("map is {width}x{height} but neither side may exceed {}", MAX_MAP_EXTENT)]
    TooLarge { width: u32, height: u32 },
}

/// The maximum extent a [`Tree`](crate::Tree) addresses. Fixed for the lifetime of the tree.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct MapSize {
    width: u32,
    height: u32,
    floors: u32,
}

impl MapSize {
    pub fn new(width: u32, height: u32, floors: u32) -> Result<Self, MapSizeError> {
        if width == 0 || height == 0 || floors == 0 {
            return Err(MapSizeError::ZeroExtent {
                width,
                height,
                floors,
            });
        }
        if floors > MAX_FLOORS {
            return Err(MapSizeError::TooManyFloors { floors });
        }
        if width > MAX_MAP_EXTENT || height > MAX_MAP_EXTENT {
            return Err(MapSizeError::TooLarge { width, height });
        }
        Ok(Self {
            width,
            height,
            floors,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn floors(&self) -> u32 {
        self.floors
    }

    #[inline]
    pub(crate) fn as_uvec3(&self) -> UVec3 {
        UVec3::new(self.width, self.height, self.floors)
    }

    /// Returns true iff `position` lies inside `[0, width) x [0, height) x [0, floors)`.
    #[inline]
    pub fn contains(&self, position: Position) -> bool {
        position.x >= 0
            && position.y >= 0
            && position.z >= 0
            && (position.x as u32) < self.width
            && (position.y as u32) < self.height
            && (position.z as u32) < self.floors
    }

    /// Panics unless `position` is inside the map. Indexing outside the map is a caller bug and would corrupt the
    /// bounding boxes if it were clamped.
    #[inline]
    #[track_caller]
    pub(crate) fn check(&self, position: Position) -> UVec3 {
        assert!(
            self.contains(position),
            "position {} is outside the map ({}x{}x{})",
            position,
            self.width,
            self.height,
            self.floors
        );
        position.to_uvec3()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_bad_dimensions() {
        assert_eq!(
            MapSize::new(0, 10, 1),
            Err(MapSizeError::ZeroExtent {
                width: 0,
                height: 10,
                floors: 1
            })
        );
        assert_eq!(
            MapSize::new(10, 10, 129),
            Err(MapSizeError::TooManyFloors { floors: 129 })
        );
        assert_eq!(
            MapSize::new(MAX_MAP_EXTENT + 1, 10, 1),
            Err(MapSizeError::TooLarge {
                width: MAX_MAP_EXTENT + 1,
                height: 10
            })
        );
        assert!(MapSize::new(65536, 65536, 128).is_ok());
    }

    #[test]
    fn contains_is_half_open() {
        let size = MapSize::new(100, 50, 16).unwrap();
        assert!(size.contains(Position::new(0, 0, 0)));
        assert!(size.contains(Position::new(99, 49, 15)));
        assert!(!size.contains(Position::new(100, 0, 0)));
        assert!(!size.contains(Position::new(0, 50, 0)));
        assert!(!size.contains(Position::new(0, 0, 16)));
        assert!(!size.contains(Position::new(-1, 0, 0)));
        assert!(!size.contains(Position::new(0, 0, -1)));
    }

    #[test]
    #[should_panic(expected = "outside the map")]
    fn check_panics_outside() {
        let size = MapSize::new(100, 50, 16).unwrap();
        size.check(Position::new(5, 50, 0));
    }

    #[test]
    fn display() {
        assert_eq!(Position::new(1, -2, 3).to_string(), "(1, -2, 3)");
        assert_eq!(Position::from((4, 5, 6)), Position::new(4, 5, 6));
    }
}

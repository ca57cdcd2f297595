use crate::Position;

/// An inclusive axis-aligned box over [`Position`]s.
///
/// Emptiness is not representable; an empty region is `Option::<BoundingBox>::None`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct BoundingBox {
    min: Position,
    max: Position,
}

impl BoundingBox {
    /// # Panics
    ///
    /// If `min` exceeds `max` on any axis.
    pub fn new(min: Position, max: Position) -> Self {
        assert!(
            min.x <= max.x && min.y <= max.y && min.z <= max.z,
            "bounding box min {} exceeds max {}",
            min,
            max
        );
        Self { min, max }
    }

    #[inline]
    pub fn from_position(position: Position) -> Self {
        Self {
            min: position,
            max: position,
        }
    }

    #[inline]
    pub fn min(&self) -> Position {
        self.min
    }

    #[inline]
    pub fn max(&self) -> Position {
        self.max
    }

    #[inline]
    pub fn width(&self) -> u32 {
        (self.max.x - self.min.x) as u32 + 1
    }

    #[inline]
    pub fn height(&self) -> u32 {
        (self.max.y - self.min.y) as u32 + 1
    }

    #[inline]
    pub fn depth(&self) -> u32 {
        (self.max.z as i32 - self.min.z as i32) as u32 + 1
    }

    /// Grows the box to cover `position`. Returns true iff `min` or `max` moved.
    #[inline]
    pub fn include(&mut self, position: Position) -> bool {
        self.include_box(&Self::from_position(position))
    }

    /// Grows the box to cover `other`. Returns true iff `min` or `max` moved.
    #[inline]
    pub fn include_box(&mut self, other: &BoundingBox) -> bool {
        let min = Position {
            x: self.min.x.min(other.min.x),
            y: self.min.y.min(other.min.y),
            z: self.min.z.min(other.min.z),
        };
        let max = Position {
            x: self.max.x.max(other.max.x),
            y: self.max.y.max(other.max.y),
            z: self.max.z.max(other.max.z),
        };
        let changed = min != self.min || max != self.max;
        self.min = min;
        self.max = max;
        changed
    }

    /// True iff every axis range of `self` covers the same axis range of `other`.
    #[inline]
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    #[inline]
    pub fn contains_point(&self, position: Position) -> bool {
        self.contains(&Self::from_position(position))
    }
}

/// Includes `other` into `target`, treating `None` as the empty box. Returns true iff `target` changed.
#[inline]
pub(crate) fn include_optional(target: &mut Option<BoundingBox>, other: Option<BoundingBox>) -> bool {
    let Some(other) = other else {
        return false;
    };
    match target {
        Some(bbox) => bbox.include_box(&other),
        None => {
            *target = Some(other);
            true
        }
    }
}

/// Union of all `boxes`, or `None` if every one is empty.
pub(crate) fn union_all(boxes: impl IntoIterator<Item = Option<BoundingBox>>) -> Option<BoundingBox> {
    let mut union = None;
    for bbox in boxes {
        include_optional(&mut union, bbox);
    }
    union
}

#[cfg(test)]
mod test {
    use super::*;

    fn bbox(min: (i32, i32, i8), max: (i32, i32, i8)) -> BoundingBox {
        BoundingBox::new(min.into(), max.into())
    }

    #[test]
    fn include_reports_change() {
        let mut b = BoundingBox::from_position(Position::new(5, 5, 2));
        assert!(!b.include(Position::new(5, 5, 2)));
        assert!(b.include(Position::new(7, 3, 2)));
        assert_eq!(b, bbox((5, 3, 2), (7, 5, 2)));
        assert!(!b.include(Position::new(6, 4, 2)));
        assert!(b.include(Position::new(6, 4, 0)));
        assert_eq!(b.depth(), 3);
        assert_eq!(b.width(), 3);
        assert_eq!(b.height(), 3);
    }

    #[test]
    fn include_box_reports_change() {
        let mut b = bbox((0, 0, 0), (10, 10, 1));
        assert!(!b.include_box(&bbox((2, 2, 0), (3, 3, 1))));
        assert!(b.include_box(&bbox((2, 2, 0), (11, 3, 1))));
        assert_eq!(b.max(), Position::new(11, 10, 1));
    }

    #[test]
    fn contains_is_per_axis() {
        let outer = bbox((0, 0, 0), (10, 10, 3));
        assert!(outer.contains(&bbox((0, 0, 0), (10, 10, 3))));
        assert!(outer.contains(&bbox((4, 4, 1), (5, 5, 2))));
        assert!(!outer.contains(&bbox((4, 4, 1), (11, 5, 2))));
        assert!(!outer.contains(&bbox((4, 4, 1), (5, 5, 4))));
        assert!(outer.contains_point(Position::new(10, 0, 3)));
        assert!(!outer.contains_point(Position::new(-1, 0, 3)));
    }

    #[test]
    fn optional_union() {
        let mut target = None;
        assert!(!include_optional(&mut target, None));
        assert!(include_optional(&mut target, Some(bbox((1, 1, 1), (1, 1, 1)))));
        assert!(!include_optional(&mut target, Some(bbox((1, 1, 1), (1, 1, 1)))));
        assert_eq!(
            union_all([None, Some(bbox((1, 1, 0), (2, 2, 0))), Some(bbox((0, 5, 3), (0, 5, 3)))]),
            Some(bbox((0, 1, 0), (2, 5, 3)))
        );
        assert_eq!(union_all([None, None]), None);
    }

    #[test]
    #[should_panic]
    fn inverted_box_panics() {
        bbox((2, 0, 0), (1, 0, 0));
    }
}

//! Byte-range algebra: boundaries, ranges, prefix arithmetic and intersection.
//!
//! A [`Range`] is a pair of optional [`Boundary`] values over lexicographically
//! ordered byte keys. A missing boundary means the range is unbounded on that
//! side. Ranges are immutable values; every operation returns a new range.

use std::{cmp::Ordering, ops::Bound};

/// One inclusive or exclusive edge of a byte range.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Boundary {
    value: Vec<u8>,
    inclusive: bool,
}

impl Boundary {
    /// Create a boundary at `value`.
    pub fn new(value: impl Into<Vec<u8>>, inclusive: bool) -> Self {
        Self {
            value: value.into(),
            inclusive,
        }
    }

    /// Inclusive boundary at `value`.
    pub fn inclusive(value: impl Into<Vec<u8>>) -> Self {
        Self::new(value, true)
    }

    /// Exclusive boundary at `value`.
    pub fn exclusive(value: impl Into<Vec<u8>>) -> Self {
        Self::new(value, false)
    }

    /// Boundary key.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Whether a key equal to the boundary is inside the range.
    pub fn is_inclusive(&self) -> bool {
        self.inclusive
    }

    fn prepend(&self, prefix: &[u8]) -> Self {
        let mut value = Vec::with_capacity(prefix.len() + self.value.len());
        value.extend_from_slice(prefix);
        value.extend_from_slice(&self.value);
        Self::new(value, self.inclusive)
    }
}

/// A set of byte keys described by two optional boundaries.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Range {
    left: Option<Boundary>,
    right: Option<Boundary>,
}

impl Range {
    /// Create a range from explicit boundaries.
    pub fn new(left: Option<Boundary>, right: Option<Boundary>) -> Self {
        Self { left, right }
    }

    /// `[left, right]`
    pub fn segment(left: impl Into<Vec<u8>>, right: impl Into<Vec<u8>>) -> Self {
        Self::new(
            Some(Boundary::inclusive(left)),
            Some(Boundary::inclusive(right)),
        )
    }

    /// `(left, right]`
    pub fn left_open_segment(left: impl Into<Vec<u8>>, right: impl Into<Vec<u8>>) -> Self {
        Self::new(
            Some(Boundary::exclusive(left)),
            Some(Boundary::inclusive(right)),
        )
    }

    /// `[left, right)`
    pub fn right_open_segment(left: impl Into<Vec<u8>>, right: impl Into<Vec<u8>>) -> Self {
        Self::new(
            Some(Boundary::inclusive(left)),
            Some(Boundary::exclusive(right)),
        )
    }

    /// `(left, right)`
    pub fn interval(left: impl Into<Vec<u8>>, right: impl Into<Vec<u8>>) -> Self {
        Self::new(
            Some(Boundary::exclusive(left)),
            Some(Boundary::exclusive(right)),
        )
    }

    /// `[left, +inf)`
    pub fn positive_ray(left: impl Into<Vec<u8>>) -> Self {
        Self::new(Some(Boundary::inclusive(left)), None)
    }

    /// `(left, +inf)`
    pub fn positive_open_ray(left: impl Into<Vec<u8>>) -> Self {
        Self::new(Some(Boundary::exclusive(left)), None)
    }

    /// `(-inf, right]`
    pub fn negative_ray(right: impl Into<Vec<u8>>) -> Self {
        Self::new(None, Some(Boundary::inclusive(right)))
    }

    /// `(-inf, right)`
    pub fn negative_open_ray(right: impl Into<Vec<u8>>) -> Self {
        Self::new(None, Some(Boundary::exclusive(right)))
    }

    /// The whole key line.
    pub fn line() -> Self {
        Self::new(None, None)
    }

    /// A range containing no keys: `({1}, {1})`.
    pub fn empty() -> Self {
        Self::interval([1u8], [1u8])
    }

    /// All keys starting with `prefix`: `[prefix, increment(prefix))`.
    ///
    /// When `prefix` consists only of `0xFF` bytes there is no finite upper
    /// bound and the range is open to the right.
    pub fn prefix(prefix: impl Into<Vec<u8>>) -> Self {
        let prefix = prefix.into();
        Self::prefix_between(prefix.clone(), &prefix)
    }

    /// Keys from `left` (inclusive) up to every key starting with `right`.
    pub fn prefix_between(left: impl Into<Vec<u8>>, right: &[u8]) -> Self {
        Self::new(
            Some(Boundary::inclusive(left)),
            increment_bytes(right).map(Boundary::exclusive),
        )
    }

    /// Lower boundary; `None` is unbounded.
    pub fn left(&self) -> Option<&Boundary> {
        self.left.as_ref()
    }

    /// Upper boundary; `None` is unbounded.
    pub fn right(&self) -> Option<&Boundary> {
        self.right.as_ref()
    }

    /// Prepend `prefix` to both boundaries; unbounded sides stay unbounded.
    pub fn prepend(&self, prefix: &[u8]) -> Self {
        Self::new(
            self.left.as_ref().map(|b| b.prepend(prefix)),
            self.right.as_ref().map(|b| b.prepend(prefix)),
        )
    }

    /// The tightest range bounded by both `self` and `other`.
    pub fn intersect_with(&self, other: &Range) -> Self {
        let left = if cmp_left(self.left.as_ref(), other.left.as_ref()) == Ordering::Greater {
            self.left.clone()
        } else {
            other.left.clone()
        };
        let right = if cmp_right(self.right.as_ref(), other.right.as_ref()) == Ordering::Less {
            self.right.clone()
        } else {
            other.right.clone()
        };
        Self::new(left, right)
    }

    /// Whether no key can satisfy both boundaries.
    pub fn is_empty(&self) -> bool {
        match (&self.left, &self.right) {
            (Some(left), Some(right)) => match compare_bytes(&left.value, &right.value) {
                Ordering::Equal => !(left.inclusive && right.inclusive),
                other => other == Ordering::Greater,
            },
            _ => false,
        }
    }

    /// Whether `key` lies within the range.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.within_left(key) && self.within_right(key)
    }

    /// Whether `key` satisfies the left boundary.
    pub fn within_left(&self, key: &[u8]) -> bool {
        match &self.left {
            None => true,
            Some(b) if b.inclusive => key >= b.value.as_slice(),
            Some(b) => key > b.value.as_slice(),
        }
    }

    /// Whether `key` satisfies the right boundary.
    pub fn within_right(&self, key: &[u8]) -> bool {
        match &self.right {
            None => true,
            Some(b) if b.inclusive => key <= b.value.as_slice(),
            Some(b) => key < b.value.as_slice(),
        }
    }

    /// Borrowed view of the boundaries as standard library bounds.
    pub fn as_bounds(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        (to_bound(self.left.as_ref()), to_bound(self.right.as_ref()))
    }
}

/// Big-endian carrying increment; `None` when every byte is `0xFF`.
pub fn increment_bytes(source: &[u8]) -> Option<Vec<u8>> {
    let mut result = source.to_vec();
    for byte in result.iter_mut().rev() {
        if *byte == u8::MAX {
            *byte = 0;
        } else {
            *byte += 1;
            return Some(result);
        }
    }
    None
}

/// Lexicographic byte order; a proper prefix sorts first.
pub fn compare_bytes(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

fn to_bound(boundary: Option<&Boundary>) -> Bound<&[u8]> {
    match boundary {
        None => Bound::Unbounded,
        Some(b) if b.inclusive => Bound::Included(b.value.as_slice()),
        Some(b) => Bound::Excluded(b.value.as_slice()),
    }
}

// Left comparator: unbounded < bounded, and Included(x) < Excluded(x).
fn cmp_left(a: Option<&Boundary>, b: Option<&Boundary>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, _) => Ordering::Less,
        (_, None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_bytes(&a.value, &b.value).then(
            match (a.inclusive, b.inclusive) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => Ordering::Equal,
            },
        ),
    }
}

// Right comparator: bounded < unbounded, and Excluded(x) < Included(x).
fn cmp_right(a: Option<&Boundary>, b: Option<&Boundary>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, _) => Ordering::Greater,
        (_, None) => Ordering::Less,
        (Some(a), Some(b)) => compare_bytes(&a.value, &b.value).then(
            match (a.inclusive, b.inclusive) {
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                _ => Ordering::Equal,
            },
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_carries_and_overflows() {
        assert_eq!(increment_bytes(&[1, 2]), Some(vec![1, 3]));
        assert_eq!(increment_bytes(&[1, 255]), Some(vec![2, 0]));
        assert_eq!(increment_bytes(&[255, 255]), None);
        assert_eq!(increment_bytes(&[]), None);
    }

    #[test]
    fn prefix_of_max_bytes_has_no_upper_bound() {
        let range = Range::prefix([255u8, 255]);
        assert_eq!(range.left(), Some(&Boundary::inclusive([255u8, 255])));
        assert!(range.right().is_none());

        let range = Range::prefix([1u8]);
        assert_eq!(range.right(), Some(&Boundary::exclusive([2u8])));
        assert!(range.contains(&[1, 11]));
        assert!(!range.contains(&[2]));
    }

    #[test]
    fn emptiness_respects_inclusivity() {
        assert!(Range::empty().is_empty());
        assert!(!Range::segment([1u8], [1u8]).is_empty());
        assert!(Range::right_open_segment([1u8], [1u8]).is_empty());
        assert!(Range::left_open_segment([1u8], [1u8]).is_empty());
        assert!(Range::segment([2u8], [1u8]).is_empty());
        assert!(!Range::line().is_empty());
        assert!(!Range::positive_ray([9u8]).is_empty());
        assert!(!Range::negative_open_ray([0u8]).is_empty());
    }

    #[test]
    fn intersection_picks_tightest_boundaries() {
        let a = Range::segment([1u8], [5u8]);
        let b = Range::interval([1u8], [3u8]);
        let both = a.intersect_with(&b);
        assert_eq!(both, Range::interval([1u8], [3u8]));
        assert_eq!(b.intersect_with(&a), both);

        let ray = Range::positive_ray([2u8]);
        assert_eq!(
            ray.intersect_with(&Range::negative_ray([4u8])),
            Range::segment([2u8], [4u8])
        );
        assert_eq!(Range::line().intersect_with(&ray), ray);
        assert!(Range::segment([1u8], [2u8])
            .intersect_with(&Range::segment([3u8], [4u8]))
            .is_empty());
    }

    #[test]
    fn prepend_keeps_inclusivity_and_unbounded_sides() {
        let range = Range::left_open_segment([1u8], [2u8]).prepend(&[9]);
        assert_eq!(range, Range::left_open_segment([9u8, 1], [9u8, 2]));
        assert_eq!(Range::line().prepend(&[9]), Range::line());
        assert_eq!(
            Range::positive_ray([3u8]).prepend(&[7, 7]),
            Range::positive_ray([7u8, 7, 3])
        );
    }

    #[test]
    fn bounds_follow_boundaries() {
        let range = Range::right_open_segment([1u8], [4u8]);
        let (start, end) = range.as_bounds();
        assert_eq!(start, Bound::Included(&[1u8][..]));
        assert_eq!(end, Bound::Excluded(&[4u8][..]));
        assert!(range.within_left(&[1]));
        assert!(!range.within_right(&[4]));
        assert!(range.within_right(&[3, 255]));
    }
}

//! Query descriptions and the record readers behind cursors and fetches.
//!
//! A [`MultiRangeQuery`] names what to read. The readers in this module turn it
//! into a stream of records copied into caller-owned slots: [`reader`] walks one
//! range, [`merge`] interleaves several of them and [`fetch`] drains either into
//! a [`BytesTable`](crate::table::BytesTable) while growing column capacities.

pub(crate) mod fetch;
pub(crate) mod merge;
pub(crate) mod reader;

use std::cmp::Ordering;

use crate::{engine::EngineError, error::Error, range::Range};

/// Traversal order of a read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    #[default]
    /// Smallest key first.
    Ascending,
    /// Largest key first.
    Descending,
}

impl Direction {
    /// Apply the direction to an ascending key comparison.
    pub(crate) fn order(self, ordering: Ordering) -> Ordering {
        match self {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    }

    pub(crate) fn is_ascending(self) -> bool {
        matches!(self, Direction::Ascending)
    }
}

/// Columns materialized by a fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Projection {
    /// Keys only.
    Keys,
    /// Values only.
    Values,
    /// Key cell then value cell per row.
    KeysAndValues,
}

impl Projection {
    /// Whether keys are materialized.
    pub fn has_keys(self) -> bool {
        matches!(self, Projection::Keys | Projection::KeysAndValues)
    }

    /// Whether values are materialized.
    pub fn has_values(self) -> bool {
        matches!(self, Projection::Values | Projection::KeysAndValues)
    }

    /// Cells per row in the produced table.
    pub fn columns_count(self) -> usize {
        match self {
            Projection::KeysAndValues => 2,
            Projection::Keys | Projection::Values => 1,
        }
    }
}

/// Upper bound on the records yielded by a read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Take {
    #[default]
    /// Every record.
    All,
    /// At most this many records.
    First(usize),
}

impl Take {
    /// Interpret a signed count where negative values and the maximum
    /// representable integers mean unbounded.
    pub fn from_raw(raw: i64) -> Self {
        if raw < 0 || raw == i64::from(i32::MAX) || raw == i64::MAX {
            Take::All
        } else {
            Take::First(raw as usize)
        }
    }

    /// Record bound, or `None` when unbounded. `First(usize::MAX)` is unbounded.
    pub fn limit(self) -> Option<usize> {
        match self {
            Take::First(n) if n != usize::MAX => Some(n),
            _ => None,
        }
    }
}

impl From<usize> for Take {
    /// `usize::MAX` becomes [`Take::All`].
    fn from(n: usize) -> Self {
        if n == usize::MAX {
            Take::All
        } else {
            Take::First(n)
        }
    }
}

/// Read over several ranges merged into one ordered stream.
///
/// `skip` and `take` apply to the merged stream. `key_suffix_offset` makes the
/// merge compare keys from that byte onwards, so ranges living under different
/// key prefixes interleave by the rest of their keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiRangeQuery {
    pub(crate) ranges: Vec<Range>,
    pub(crate) direction: Direction,
    pub(crate) skip: usize,
    pub(crate) take: Take,
    pub(crate) key_suffix_offset: usize,
}

impl MultiRangeQuery {
    /// Query over `ranges` in `direction`, without skip, take or suffix offset.
    pub fn new(ranges: impl IntoIterator<Item = Range>, direction: Direction) -> Self {
        MultiRangeQuery {
            ranges: ranges.into_iter().collect(),
            direction,
            skip: 0,
            take: Take::All,
            key_suffix_offset: 0,
        }
    }

    /// Discard this many leading merged records.
    pub fn skip(self, skip: usize) -> Self {
        MultiRangeQuery { skip, ..self }
    }

    /// Stop after this many merged records.
    pub fn take(self, take: impl Into<Take>) -> Self {
        MultiRangeQuery {
            take: take.into(),
            ..self
        }
    }

    /// Order merged records by key bytes from this offset on.
    pub fn key_suffix_offset(self, key_suffix_offset: usize) -> Self {
        MultiRangeQuery {
            key_suffix_offset,
            ..self
        }
    }

    /// Ranges in merge tie-break order.
    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    /// Shared traversal order.
    pub fn direction(&self) -> Direction {
        self.direction
    }
}

/// Outcome of asking a reader for its next record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReadStatus {
    /// The record was copied into the slots.
    Record { key_len: usize, value_len: usize },
    /// No record is left.
    Exhausted,
    /// The next record does not fit the slots. Nothing was consumed, so the
    /// same read may be repeated with larger slots.
    Insufficient { key_len: usize, value_len: usize },
}

/// Engine failure tagged with the call that produced it. Readers do not know
/// which resource they belong to; the owner attaches that context.
#[derive(Debug)]
pub(crate) struct ReadError {
    api: &'static str,
    source: EngineError,
}

impl ReadError {
    pub(crate) fn into_error(self, context: &str) -> Error {
        Error::store(self.api, self.source, context)
    }
}

pub(crate) fn engine_call(api: &'static str) -> impl FnOnce(EngineError) -> ReadError {
    move |source| ReadError { api, source }
}

/// Ordered source of records that copies each one into caller slots.
pub(crate) trait RecordSource {
    /// Copy the next record. Without a value slot only the key is copied.
    fn read(
        &mut self,
        key: &mut [u8],
        value: Option<&mut [u8]>,
    ) -> Result<ReadStatus, ReadError>;

    /// Records left to read, if the store can count them without reading.
    fn remaining(&mut self) -> Result<Option<usize>, ReadError>;
}

/// Compare keys from `offset` onwards; keys shorter than `offset` compare as empty.
pub(crate) fn compare_suffix(a: &[u8], b: &[u8], offset: usize) -> Ordering {
    let a = a.get(offset..).unwrap_or_default();
    let b = b.get(offset..).unwrap_or_default();
    a.cmp(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_take_sentinels_are_unbounded() {
        assert_eq!(Take::from_raw(-1), Take::All);
        assert_eq!(Take::from_raw(i64::from(i32::MAX)), Take::All);
        assert_eq!(Take::from_raw(i64::MAX), Take::All);
        assert_eq!(Take::from_raw(0), Take::First(0));
        assert_eq!(Take::from_raw(3).limit(), Some(3));
    }

    #[test]
    fn maximal_take_is_unbounded() {
        assert_eq!(Take::from(usize::MAX), Take::All);
        assert_eq!(Take::First(usize::MAX).limit(), None);
        assert_eq!(Take::from(7usize), Take::First(7));
    }

    #[test]
    fn suffix_comparison_ignores_prefix() {
        assert_eq!(compare_suffix(&[1, 7], &[2, 4], 1), Ordering::Greater);
        assert_eq!(compare_suffix(&[2, 4], &[1, 4], 1), Ordering::Equal);
        assert_eq!(compare_suffix(&[9], &[1, 0], 1), Ordering::Less);
        assert_eq!(compare_suffix(&[9], &[1], 3), Ordering::Equal);
        assert_eq!(
            Direction::Descending.order(compare_suffix(&[1], &[2], 0)),
            Ordering::Greater
        );
    }

    #[test]
    fn projection_columns() {
        assert_eq!(Projection::KeysAndValues.columns_count(), 2);
        assert!(!Projection::Values.has_keys());
        assert!(Projection::Keys.has_keys());
    }
}

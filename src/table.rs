//! Flat table: one byte store plus an offset/length index per cell.

use crate::{bytes::BytesSegment, error::Error};

/// Offset and length of one cell inside [`BytesTable::store`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SegmentPosition {
    /// Offset of the first byte.
    pub start: u32,
    /// Content length in bytes.
    pub length: u32,
}

impl SegmentPosition {
    /// Cell at `start` of `length` bytes.
    pub fn new(start: u32, length: u32) -> Self {
        Self { start, length }
    }
}

/// Rows materialized by a fetch.
///
/// `positions` holds `rows_count * columns_count` valid cells in row-major
/// order (key cell before value cell when both are fetched). Both `store` and
/// `positions` may be longer than what the rows use; cells past `rows_count`
/// are unspecified.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BytesTable {
    store: Vec<u8>,
    positions: Vec<SegmentPosition>,
    rows_count: usize,
    columns_count: usize,
}

impl BytesTable {
    pub(crate) fn new(
        store: Vec<u8>,
        positions: Vec<SegmentPosition>,
        rows_count: usize,
        columns_count: usize,
    ) -> Self {
        Self {
            store,
            positions,
            rows_count,
            columns_count,
        }
    }

    /// Valid rows.
    pub fn rows_count(&self) -> usize {
        self.rows_count
    }

    /// Cells per row: 1 or 2.
    pub fn columns_count(&self) -> usize {
        self.columns_count
    }

    /// Backing bytes, including unused tail.
    pub fn store(&self) -> &[u8] {
        &self.store
    }

    /// Cell index, including unused tail.
    pub fn positions(&self) -> &[SegmentPosition] {
        &self.positions
    }

    /// Store, positions, rows and columns.
    pub fn into_parts(self) -> (Vec<u8>, Vec<SegmentPosition>, usize, usize) {
        (self.store, self.positions, self.rows_count, self.columns_count)
    }

    /// View of the cell at `(row, column)`.
    pub fn segment(&self, row: usize, column: usize) -> Result<BytesSegment<'_>, Error> {
        if row >= self.rows_count || column >= self.columns_count {
            return Err(Error::out_of_bounds(format!(
                "invalid arguments, row [{row}], column [{column}], RowsCount [{}], ColumnsCount \
                 [{}]",
                self.rows_count, self.columns_count
            )));
        }
        let index = row * self.columns_count + column;
        let position = *self.positions.get(index).ok_or_else(|| {
            Error::out_of_bounds(format!(
                "invalid position index [{index}], PositionsCount [{}]",
                self.positions.len()
            ))
        })?;
        BytesSegment::with_range(
            &self.store,
            position.start as usize,
            position.length as usize,
        )
    }

    /// Every valid cell of `column`.
    pub fn column(&self, column: usize) -> Result<Vec<BytesSegment<'_>>, Error> {
        self.map_column(column, |segment| segment)
    }

    /// Map every valid cell of `column`.
    pub fn map_column<'t, T>(
        &'t self,
        column: usize,
        mut parser: impl FnMut(BytesSegment<'t>) -> T,
    ) -> Result<Vec<T>, Error> {
        (0..self.rows_count)
            .map(|row| self.segment(row, column).map(&mut parser))
            .collect()
    }

    /// Parse every row from its key and value cells; requires two columns.
    pub fn map_rows<'t, T>(
        &'t self,
        mut parser: impl FnMut(BytesSegment<'t>, BytesSegment<'t>) -> T,
    ) -> Result<Vec<T>, Error> {
        (0..self.rows_count)
            .map(|row| Ok(parser(self.segment(row, 0)?, self.segment(row, 1)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_column_table() -> BytesTable {
        BytesTable::new(
            vec![1, 0, 10, 11, 2, 0, 20, 0, 9, 9],
            vec![
                SegmentPosition::new(0, 1),
                SegmentPosition::new(2, 2),
                SegmentPosition::new(4, 1),
                SegmentPosition::new(6, 1),
                SegmentPosition::new(0, 0),
                SegmentPosition::new(0, 0),
            ],
            2,
            2,
        )
    }

    #[test]
    fn cells_resolve_through_positions() {
        let table = two_column_table();
        assert_eq!(table.segment(0, 1).expect("cell").as_slice(), &[10, 11]);
        let keys = table
            .map_column(0, |segment| segment.to_vec())
            .expect("keys");
        assert_eq!(keys, vec![vec![1], vec![2]]);
        let rows = table
            .map_rows(|key, value| (key.get(0), value.len()))
            .expect("rows");
        assert_eq!(rows, vec![(Some(1), 2), (Some(2), 1)]);
    }

    #[test]
    fn cells_past_rows_count_are_rejected() {
        let table = BytesTable::new(vec![0; 10], vec![SegmentPosition::default(); 10], 0, 1);
        let err = table.segment(0, 0).expect_err("no rows");
        assert_eq!(
            err.to_string(),
            "invalid arguments, row [0], column [0], RowsCount [0], ColumnsCount [1]"
        );
        assert!(two_column_table().segment(1, 2).is_err());
        assert!(table.column(0).expect("empty column").is_empty());
    }

    #[test]
    fn short_position_index_is_out_of_bounds() {
        let table = BytesTable::new(vec![7, 8], vec![SegmentPosition::new(0, 1)], 2, 1);
        assert_eq!(table.segment(0, 0).expect("first cell").as_slice(), &[7]);
        let err = table.segment(1, 0).expect_err("missing position");
        assert!(matches!(err, Error::OutOfBounds { .. }));
        assert_eq!(
            err.to_string(),
            "invalid position index [1], PositionsCount [1]"
        );
        assert!(table.column(0).is_err());
    }
}

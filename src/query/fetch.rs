//! Adaptive bulk fetch: drains a record source into a [`BytesTable`] while
//! growing column capacities to fit the records it meets.
//!
//! Every row is written into a slot whose column widths are the capacities in
//! force when the row was committed. A record that does not fit leaves nothing
//! behind; the column grows to exactly the reported length and the same record
//! is read again. Rows committed before a growth keep their slot widths.

use crate::{
    bytes::BytesRecord,
    error::{Error, Side},
    logging::{rangefetch_log, FETCH_LOG_CTX},
    option::BufferConfig,
    query::{Projection, ReadStatus, RecordSource},
    table::{BytesTable, SegmentPosition},
};

/// Configured buffer of one column of a database.
#[derive(Debug)]
pub(crate) struct ColumnBuffer {
    side: Side,
    config: BufferConfig,
    description: String,
}

impl ColumnBuffer {
    pub(crate) fn new(side: Side, config: BufferConfig, database: &str) -> Self {
        let description = match side {
            Side::Key => format!("keys, {database}"),
            Side::Value => format!("values, {database}"),
        };
        ColumnBuffer {
            side,
            config,
            description,
        }
    }

    pub(crate) fn side(&self) -> Side {
        self.side
    }

    pub(crate) fn config(&self) -> BufferConfig {
        self.config
    }

    pub(crate) fn description(&self) -> &str {
        &self.description
    }

    /// Fresh growth state starting at the configured size.
    pub(crate) fn session(&self) -> ColumnCapacity<'_> {
        ColumnCapacity {
            column: self,
            current: self.config.size(),
        }
    }
}

/// Capacity of one column for the life of a single read session.
#[derive(Debug)]
pub(crate) struct ColumnCapacity<'a> {
    column: &'a ColumnBuffer,
    current: usize,
}

impl ColumnCapacity<'_> {
    pub(crate) fn current(&self) -> usize {
        self.current
    }

    /// Check that `required` bytes may be made to fit.
    fn admit(&self, required: usize) -> Result<(), Error> {
        match self.column.config {
            BufferConfig::Fixed(size) if required > size => Err(Error::CapacityExceeded {
                side: self.column.side,
                required,
                size,
                context: self.column.description.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Grow to exactly `required` bytes.
    fn grow(&mut self, required: usize) -> Result<(), Error> {
        self.admit(required)?;
        if required <= self.current {
            return Ok(());
        }
        rangefetch_log!(
            log::Level::Warn,
            ctx: FETCH_LOG_CTX,
            "buffer_grown",
            "side={} old={} new={} context=\"{}\"",
            self.column.side,
            self.current,
            required,
            self.column.description,
        );
        self.current = required;
        Ok(())
    }
}

/// Growth state and limits of one cursor read or one fetch.
pub(crate) struct ReadSession<'a> {
    key: ColumnCapacity<'a>,
    value: ColumnCapacity<'a>,
    max_retries: usize,
    context: &'a str,
    growths: usize,
}

impl<'a> ReadSession<'a> {
    pub(crate) fn new(
        keys: &'a ColumnBuffer,
        values: &'a ColumnBuffer,
        max_retries: usize,
        context: &'a str,
    ) -> Self {
        ReadSession {
            key: keys.session(),
            value: values.session(),
            max_retries,
            context,
            growths: 0,
        }
    }

    pub(crate) fn value_capacity(&self) -> usize {
        self.value.current()
    }

    /// Column that must grow for a record of the given lengths. A fixed column
    /// that overflows is reported first so it fails before anything grows.
    fn shortfall(
        &self,
        key_len: usize,
        value_len: usize,
        with_value: bool,
    ) -> Result<(Side, usize), Error> {
        let key_short = key_len > self.key.current;
        let value_short = with_value && value_len > self.value.current;
        if key_short {
            self.key.admit(key_len)?;
        }
        if value_short {
            self.value.admit(value_len)?;
        }
        match (key_short, value_short) {
            (true, _) => Ok((Side::Key, key_len)),
            (false, true) => Ok((Side::Value, value_len)),
            (false, false) => Err(Error::Protocol {
                message: format!(
                    "engine reported short buffers for key length [{key_len}] and value length \
                     [{value_len}] within capacities [{}] and [{}]",
                    self.key.current, self.value.current
                ),
                context: self.context.to_owned(),
            }),
        }
    }

    /// Grow the short column; `attempt` counts growths for the same record.
    fn grow(&mut self, side: Side, required: usize, attempt: usize) -> Result<(), Error> {
        if attempt > self.max_retries {
            return Err(Error::Protocol {
                message: format!(
                    "buffer growth retries exceeded [{}], requested {side} length [{required}]",
                    self.max_retries
                ),
                context: self.context.to_owned(),
            });
        }
        self.growths += 1;
        match side {
            Side::Key => self.key.grow(required),
            Side::Value => self.value.grow(required),
        }
    }

    /// Make room for a record the engine reported as not fitting.
    pub(crate) fn accommodate(
        &mut self,
        key_len: usize,
        value_len: usize,
        attempt: usize,
    ) -> Result<(), Error> {
        let (side, required) = self.shortfall(key_len, value_len, true)?;
        self.grow(side, required, attempt)
    }

    /// Read the next record into `record`, growing its buffers as needed.
    /// Returns `false` once the source is exhausted.
    pub(crate) fn read_record<R: RecordSource>(
        &mut self,
        source: &mut R,
        record: &mut BytesRecord,
    ) -> Result<bool, Error> {
        let mut attempt = 0;
        loop {
            record.key.ensure_capacity(self.key.current());
            record.value.ensure_capacity(self.value.current());
            let key = &mut record.key.raw_mut()[..self.key.current];
            let value = &mut record.value.raw_mut()[..self.value.current];
            let status = source
                .read(key, Some(value))
                .map_err(|err| err.into_error(self.context))?;
            match status {
                ReadStatus::Record { key_len, value_len } => {
                    record.key.set_len(key_len);
                    record.value.set_len(value_len);
                    return Ok(true);
                }
                ReadStatus::Exhausted => {
                    record.key.set_len(0);
                    record.value.set_len(0);
                    return Ok(false);
                }
                ReadStatus::Insufficient { key_len, value_len } => {
                    attempt += 1;
                    self.accommodate(key_len, value_len, attempt)?;
                }
            }
        }
    }

    /// Drain `source` into a table of at most `take` rows.
    ///
    /// The store is pre-sized for the record count when the source can count,
    /// otherwise for at most `batch_rows` rows, and doubled whenever that
    /// proves too small. On a countable source the count also bounds `take`.
    pub(crate) fn fetch<R: RecordSource>(
        mut self,
        source: &mut R,
        projection: Projection,
        take: Option<usize>,
        batch_rows: usize,
    ) -> Result<BytesTable, Error> {
        let counted = source
            .remaining()
            .map_err(|err| err.into_error(self.context))?;
        let limit = match (take, counted) {
            (Some(take), Some(counted)) => Some(take.min(counted)),
            (take, counted) => take.or(counted),
        };
        let budget = counted.unwrap_or(batch_rows);
        let budget = limit.map_or(budget, |limit| limit.min(budget));
        let mut table = TableBuilder::new(projection, budget);
        let mut key_scratch = Vec::new();
        let mut attempt = 0;
        loop {
            let wanted = limit.map(|limit| limit.saturating_sub(table.rows));
            if wanted == Some(0) {
                break;
            }
            let (committed, chunk) = self.read_chunk(source, &mut table, &mut key_scratch, wanted)?;
            match chunk {
                Chunk::Complete | Chunk::Exhausted => break,
                Chunk::Insufficient { side, required } => {
                    if committed > 0 {
                        attempt = 0;
                    }
                    attempt += 1;
                    self.grow(side, required, attempt)?;
                }
            }
        }
        rangefetch_log!(
            log::Level::Debug,
            ctx: FETCH_LOG_CTX,
            "fetch_completed",
            "rows={} columns={} retries={} context=\"{}\"",
            table.rows,
            projection.columns_count(),
            self.growths,
            self.context,
        );
        Ok(table.finish())
    }

    /// Commit records at the current capacities until `wanted` rows were
    /// committed, the source ends or a record does not fit.
    fn read_chunk<R: RecordSource>(
        &mut self,
        source: &mut R,
        table: &mut TableBuilder,
        key_scratch: &mut Vec<u8>,
        wanted: Option<usize>,
    ) -> Result<(usize, Chunk), Error> {
        let projection = table.projection;
        let key_width = if projection.has_keys() {
            self.key.current
        } else {
            0
        };
        let value_width = if projection.has_values() {
            self.value.current
        } else {
            0
        };
        if !projection.has_keys() {
            key_scratch.resize(self.key.current, 0);
        }
        let mut committed = 0;
        loop {
            if wanted.is_some_and(|wanted| committed >= wanted) {
                return Ok((committed, Chunk::Complete));
            }
            let slot = table.slot(key_width + value_width);
            let (key_slot, value_slot) = slot.split_at_mut(key_width);
            let key: &mut [u8] = if projection.has_keys() {
                key_slot
            } else {
                key_scratch.as_mut_slice()
            };
            let value = projection.has_values().then_some(value_slot);
            let status = source
                .read(key, value)
                .map_err(|err| err.into_error(self.context))?;
            match status {
                ReadStatus::Record { key_len, value_len } => {
                    table.commit(key_len, value_len, key_width, value_width)?;
                    committed += 1;
                }
                ReadStatus::Exhausted => {
                    table.clear_slot(key_width + value_width);
                    return Ok((committed, Chunk::Exhausted));
                }
                ReadStatus::Insufficient { key_len, value_len } => {
                    let (side, required) =
                        self.shortfall(key_len, value_len, projection.has_values())?;
                    return Ok((committed, Chunk::Insufficient { side, required }));
                }
            }
        }
    }
}

/// How a bulk read at fixed capacities ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Chunk {
    Complete,
    Exhausted,
    Insufficient { side: Side, required: usize },
}

/// Flat store under construction: rows are appended at `offset` and never moved.
struct TableBuilder {
    projection: Projection,
    store: Vec<u8>,
    positions: Vec<SegmentPosition>,
    rows: usize,
    offset: usize,
    budget: usize,
}

impl TableBuilder {
    fn new(projection: Projection, budget: usize) -> Self {
        TableBuilder {
            projection,
            store: Vec::new(),
            positions: Vec::new(),
            rows: 0,
            offset: 0,
            budget,
        }
    }

    /// Slot of the next row, sizing the store for the whole row budget at `width`.
    fn slot(&mut self, width: usize) -> &mut [u8] {
        if self.rows >= self.budget {
            self.budget = self.budget.saturating_mul(2).max(self.rows + 1);
        }
        let store_len = self.budget.saturating_mul(width).max(self.offset + width);
        if self.store.len() < store_len {
            self.store.resize(store_len, 0);
        }
        let positions_len = self.budget.saturating_mul(self.projection.columns_count());
        if self.positions.len() < positions_len {
            self.positions.resize(positions_len, SegmentPosition::default());
        }
        &mut self.store[self.offset..self.offset + width]
    }

    fn commit(
        &mut self,
        key_len: usize,
        value_len: usize,
        key_width: usize,
        value_width: usize,
    ) -> Result<(), Error> {
        let mut cell = self.rows * self.projection.columns_count();
        if self.projection.has_keys() {
            self.positions[cell] = position(self.offset, key_len)?;
            cell += 1;
        }
        if self.projection.has_values() {
            self.positions[cell] = position(self.offset + key_width, value_len)?;
        }
        self.offset += key_width + value_width;
        self.rows += 1;
        Ok(())
    }

    /// Zero whatever a rejected record left in the next slot.
    fn clear_slot(&mut self, width: usize) {
        let end = (self.offset + width).min(self.store.len());
        if self.offset < end {
            self.store[self.offset..end].fill(0);
        }
    }

    fn finish(self) -> BytesTable {
        BytesTable::new(
            self.store,
            self.positions,
            self.rows,
            self.projection.columns_count(),
        )
    }
}

fn position(start: usize, length: usize) -> Result<SegmentPosition, Error> {
    match (u32::try_from(start), u32::try_from(length)) {
        (Ok(start), Ok(length)) => Ok(SegmentPosition::new(start, length)),
        _ => Err(Error::out_of_bounds(format!(
            "cell at offset [{start}] with length [{length}] exceeds the table index range"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ReadError;

    /// Source replaying fixed records and reporting short slots like the engine.
    struct Replay {
        records: Vec<(Vec<u8>, Vec<u8>)>,
        next: usize,
    }

    impl Replay {
        fn new(records: &[(&[u8], &[u8])]) -> Self {
            Replay {
                records: records
                    .iter()
                    .map(|(key, value)| (key.to_vec(), value.to_vec()))
                    .collect(),
                next: 0,
            }
        }
    }

    impl RecordSource for Replay {
        fn read(
            &mut self,
            key: &mut [u8],
            value: Option<&mut [u8]>,
        ) -> Result<ReadStatus, ReadError> {
            let Some((k, v)) = self.records.get(self.next) else {
                return Ok(ReadStatus::Exhausted);
            };
            let value_len = if value.is_some() { v.len() } else { 0 };
            let fits_value = value.as_ref().map_or(true, |slot| v.len() <= slot.len());
            if k.len() > key.len() || !fits_value {
                return Ok(ReadStatus::Insufficient {
                    key_len: k.len(),
                    value_len,
                });
            }
            key[..k.len()].copy_from_slice(k);
            if let Some(slot) = value {
                slot[..v.len()].copy_from_slice(v);
            }
            self.next += 1;
            Ok(ReadStatus::Record {
                key_len: k.len(),
                value_len,
            })
        }

        fn remaining(&mut self) -> Result<Option<usize>, ReadError> {
            Ok(Some(self.records.len() - self.next))
        }
    }

    fn columns(key: BufferConfig, value: BufferConfig) -> (ColumnBuffer, ColumnBuffer) {
        (
            ColumnBuffer::new(Side::Key, key, "db"),
            ColumnBuffer::new(Side::Value, value, "db"),
        )
    }

    #[test]
    fn growth_freezes_committed_slot_widths() {
        let (keys, values) = columns(BufferConfig::growable(4), BufferConfig::growable(4));
        let mut source = Replay::new(&[
            (&[1], &[1]),
            (&[2], &[2; 5]),
            (&[3], &[3; 6]),
            (&[4], &[4; 7]),
        ]);
        let table = ReadSession::new(&keys, &values, 5, "db")
            .fetch(&mut source, Projection::Values, None, 2)
            .expect("fetch");

        assert_eq!(table.rows_count(), 4);
        let starts: Vec<_> = table.positions()[..4].iter().map(|p| p.start).collect();
        assert_eq!(starts, vec![0, 4, 9, 15]);
        assert_eq!(&table.store()[..4], &[1, 0, 0, 0]);
        assert_eq!(
            table
                .map_column(0, |cell| cell.to_vec())
                .expect("values"),
            vec![vec![1], vec![2; 5], vec![3; 6], vec![4; 7]]
        );
    }

    #[test]
    fn fixed_overflow_fails_before_growth() {
        let (keys, values) = columns(BufferConfig::growable(4), BufferConfig::fixed(4));
        let mut source = Replay::new(&[(&[1], &[1]), (&[2; 6], &[2; 6])]);
        let err = ReadSession::new(&keys, &values, 5, "values, db")
            .fetch(&mut source, Projection::KeysAndValues, None, 4)
            .expect_err("fixed");
        match err {
            Error::CapacityExceeded {
                side,
                required,
                size,
                ..
            } => {
                assert_eq!(side, Side::Value);
                assert_eq!(required, 6);
                assert_eq!(size, 4);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn retry_ceiling_is_enforced() {
        struct AlwaysShort(usize);

        impl RecordSource for AlwaysShort {
            fn read(
                &mut self,
                key: &mut [u8],
                _value: Option<&mut [u8]>,
            ) -> Result<ReadStatus, ReadError> {
                self.0 = key.len() + 1;
                Ok(ReadStatus::Insufficient {
                    key_len: self.0,
                    value_len: 0,
                })
            }

            fn remaining(&mut self) -> Result<Option<usize>, ReadError> {
                Ok(None)
            }
        }

        let (keys, values) = columns(BufferConfig::growable(4), BufferConfig::growable(4));
        let err = ReadSession::new(&keys, &values, 3, "db")
            .fetch(&mut AlwaysShort(0), Projection::Keys, Some(1), 1)
            .expect_err("ceiling");
        assert!(matches!(err, Error::Protocol { .. }), "{err:?}");
    }

    #[test]
    fn read_record_reuses_and_grows_buffers() {
        let (keys, values) = columns(BufferConfig::growable(4), BufferConfig::growable(4));
        let mut source = Replay::new(&[(&[1], &[9; 10]), (&[2], &[8])]);
        let mut session = ReadSession::new(&keys, &values, 5, "db");
        let mut record = BytesRecord::default();

        assert!(session.read_record(&mut source, &mut record).expect("read"));
        assert_eq!(record.value.as_slice(), &[9; 10]);
        assert_eq!(session.value_capacity(), 10);
        assert!(session.read_record(&mut source, &mut record).expect("read"));
        assert_eq!(record.key.as_slice(), &[2]);
        assert_eq!(record.value.as_slice(), &[8]);
        assert!(!session.read_record(&mut source, &mut record).expect("read"));
    }
}

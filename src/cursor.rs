//! Public cursor over one range of a database.

use crate::{
    bytes::BytesRecord,
    engine::Backend,
    env::DatabaseInner,
    error::Error,
    query::{fetch::ReadSession, reader::RangeReader, Direction, Projection, Take},
    range::Range,
    table::BytesTable,
};

/// Lazy read of one range, created by [`Database::query`](crate::Database::query).
///
/// Records come back one at a time through [`Cursor::read`] or in bulk through
/// [`Cursor::fetch`]. The cursor is released on [`Cursor::close`] or when
/// dropped, whichever happens first.
pub struct Cursor<'db, B: Backend> {
    database: &'db DatabaseInner<B>,
    reader: RangeReader<'db, B::Store>,
    session: ReadSession<'db>,
    take: Take,
    record: BytesRecord,
    closed: bool,
}

impl<'db, B: Backend> Cursor<'db, B> {
    pub(crate) fn open(
        database: &'db DatabaseInner<B>,
        range: Range,
        direction: Direction,
        skip: usize,
        take: Take,
    ) -> Result<Self, Error> {
        let reader = RangeReader::open(
            &database.store,
            &database.description,
            range,
            direction,
            skip,
            take.limit(),
        )
        .map_err(|err| err.into_error(&database.cursor_description))?;
        Ok(Cursor {
            database,
            reader,
            session: database.session(),
            take,
            record: BytesRecord::default(),
            closed: false,
        })
    }

    /// `cursor for <database description>`
    pub fn description(&self) -> &str {
        &self.database.cursor_description
    }

    fn check_open(&self) -> Result<(), Error> {
        self.database.check_open()?;
        if self.closed {
            return Err(Error::disposed(&self.database.cursor_description));
        }
        Ok(())
    }

    /// Next record, or `None` once the range is exhausted.
    ///
    /// The returned record borrows buffers that are reused by the next read.
    pub fn read(&mut self) -> Result<Option<&BytesRecord>, Error> {
        self.check_open()?;
        if self.session.read_record(&mut self.reader, &mut self.record)? {
            Ok(Some(&self.record))
        } else {
            Ok(None)
        }
    }

    /// Records still to be read, without moving the cursor.
    pub fn total_count(&mut self) -> Result<usize, Error> {
        self.check_open()?;
        self.database.require_record_numbers()?;
        self.reader
            .remaining_count()
            .map_err(|err| err.into_error(&self.database.cursor_description))
    }

    /// Read every remaining record into a flat table.
    pub fn fetch(&mut self, projection: Projection) -> Result<BytesTable, Error> {
        self.check_open()?;
        let limit = self
            .take
            .limit()
            .map(|take| take.saturating_sub(self.reader.read_count()));
        self.database.session().fetch(
            &mut self.reader,
            projection,
            limit,
            self.database.option.default_batch_rows,
        )
    }

    /// Map every remaining record through `parser`, then close the cursor.
    pub fn collect_with<T>(
        mut self,
        mut parser: impl FnMut(&BytesRecord) -> T,
    ) -> Result<Vec<T>, Error> {
        let mut parsed = Vec::new();
        while let Some(record) = self.read()? {
            parsed.push(parser(record));
        }
        self.close();
        Ok(parsed)
    }

    /// Release the engine cursor. Calling it again is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.reader.release();
    }
}

impl<B: Backend> Drop for Cursor<'_, B> {
    fn drop(&mut self) {
        self.close();
    }
}

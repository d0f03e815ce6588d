//! Directional traversal of one range over a raw engine cursor.

use crate::{
    engine::{Load, RawCursor, RawStore, Seek},
    logging::{rangefetch_log, LIFECYCLE_LOG_CTX},
    query::{engine_call, Direction, ReadError, ReadStatus, RecordSource},
    range::Range,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    NotStarted,
    Skip,
    /// Step off the record delivered last.
    Advance,
    /// Load the record under the cursor and test the closing boundary.
    Check,
    Finished,
}

/// Lazy, non-restartable read of the records of one range in one direction.
///
/// The reader starts at the boundary that anchors the direction, discards
/// `skip` records positionally and then yields records until the opposite
/// boundary fails or `take` records were delivered. Only the record being
/// delivered is ever copied out of the engine.
pub(crate) struct RangeReader<'s, S: RawStore> {
    store: &'s S,
    cursor: S::Cursor,
    context: &'s str,
    range: Range,
    direction: Direction,
    skip: usize,
    take: Option<usize>,
    state: State,
    read: usize,
    probe: Vec<u8>,
    released: bool,
}

impl<'s, S: RawStore> RangeReader<'s, S> {
    pub(crate) fn open(
        store: &'s S,
        context: &'s str,
        range: Range,
        direction: Direction,
        skip: usize,
        take: Option<usize>,
    ) -> Result<Self, ReadError> {
        let cursor = store.cursor().map_err(engine_call("db.cursor"))?;
        Ok(RangeReader {
            store,
            cursor,
            context,
            range,
            direction,
            skip,
            take,
            state: State::NotStarted,
            read: 0,
            probe: Vec::new(),
            released: false,
        })
    }

    /// Records delivered so far.
    pub(crate) fn read_count(&self) -> usize {
        self.read
    }

    /// Records of the range not yet delivered and not skipped, counted on a
    /// separate engine cursor so the traversal position is untouched.
    ///
    /// Needs record numbers; callers check the capability first.
    pub(crate) fn remaining_count(&mut self) -> Result<usize, ReadError> {
        let mut counter = self.store.cursor().map_err(engine_call("db.cursor"))?;
        let total = count_range(&mut counter, &self.range, &mut self.probe);
        counter.close().map_err(engine_call("cursor.close"))?;
        Ok(total?.saturating_sub(self.skip + self.read))
    }

    /// Close the engine cursor. Failures are logged, never returned.
    pub(crate) fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.state = State::Finished;
        if let Err(err) = self.cursor.close() {
            rangefetch_log!(
                log::Level::Error,
                ctx: LIFECYCLE_LOG_CTX,
                "dispose_failed",
                "api=cursor.close {} context=\"cursor for {}\"",
                err,
                self.context,
            );
        }
    }

    /// Copy the record delivered by the last read once more, usually with a
    /// value slot after a key-only read. The traversal does not move.
    pub(crate) fn reload(
        &mut self,
        key: &mut [u8],
        value: Option<&mut [u8]>,
    ) -> Result<ReadStatus, ReadError> {
        let load = self
            .cursor
            .load(key, value)
            .map_err(engine_call("cursor.get"))?;
        Ok(match load {
            Load::Loaded { key_len, value_len } => ReadStatus::Record { key_len, value_len },
            Load::BufferSmall { key_len, value_len } => {
                ReadStatus::Insufficient { key_len, value_len }
            }
        })
    }

    fn start(&mut self) -> Result<State, ReadError> {
        if self.take == Some(0) {
            return Ok(State::Finished);
        }
        let positioned = match self.direction {
            Direction::Ascending => seek_left(&mut self.cursor, &self.range, &mut self.probe)?,
            Direction::Descending => seek_right(&mut self.cursor, &self.range, &mut self.probe)?,
        };
        Ok(match (positioned, self.skip) {
            (false, _) => State::Finished,
            (true, 0) => State::Check,
            (true, _) => State::Skip,
        })
    }

    fn skip_records(&mut self) -> Result<State, ReadError> {
        let landed = if self.store.record_numbers_enabled() {
            let current = i64::from(
                self.cursor
                    .record_number()
                    .map_err(engine_call("cursor.get_recno"))?,
            );
            let skip = i64::try_from(self.skip).unwrap_or(i64::MAX);
            let target = match self.direction {
                Direction::Ascending => current.saturating_add(skip),
                Direction::Descending => current.saturating_sub(skip),
            };
            match u32::try_from(target) {
                Ok(target) if target > 0 => seek(&mut self.cursor, Seek::RecordNumber(target))?,
                _ => false,
            }
        } else {
            let mut landed = true;
            for _ in 0..self.skip {
                if !seek(&mut self.cursor, step(self.direction))? {
                    landed = false;
                    break;
                }
            }
            landed
        };
        Ok(if landed { State::Check } else { State::Finished })
    }
}

impl<S: RawStore> RecordSource for RangeReader<'_, S> {
    fn read(
        &mut self,
        key: &mut [u8],
        mut value: Option<&mut [u8]>,
    ) -> Result<ReadStatus, ReadError> {
        loop {
            self.state = match self.state {
                State::NotStarted => self.start()?,
                State::Skip => self.skip_records()?,
                State::Advance => {
                    if seek(&mut self.cursor, step(self.direction))? {
                        State::Check
                    } else {
                        State::Finished
                    }
                }
                State::Check => {
                    let load = self
                        .cursor
                        .load(key, value.as_deref_mut())
                        .map_err(engine_call("cursor.get"))?;
                    let (key_len, value_len) = match load {
                        Load::BufferSmall { key_len, value_len } => {
                            return Ok(ReadStatus::Insufficient { key_len, value_len });
                        }
                        Load::Loaded { key_len, value_len } => (key_len, value_len),
                    };
                    let loaded = &key[..key_len];
                    let within = match self.direction {
                        Direction::Ascending => self.range.within_right(loaded),
                        Direction::Descending => self.range.within_left(loaded),
                    };
                    if !within {
                        self.state = State::Finished;
                        continue;
                    }
                    self.read += 1;
                    self.state = if self.take.is_some_and(|take| self.read >= take) {
                        State::Finished
                    } else {
                        State::Advance
                    };
                    return Ok(ReadStatus::Record { key_len, value_len });
                }
                State::Finished => return Ok(ReadStatus::Exhausted),
            };
        }
    }

    fn remaining(&mut self) -> Result<Option<usize>, ReadError> {
        if !self.store.record_numbers_enabled() {
            return Ok(None);
        }
        let remaining = self.remaining_count()?;
        Ok(Some(match self.take {
            Some(take) => remaining.min(take.saturating_sub(self.read)),
            None => remaining,
        }))
    }
}

impl<S: RawStore> Drop for RangeReader<'_, S> {
    fn drop(&mut self) {
        self.release();
    }
}

fn step(direction: Direction) -> Seek<'static> {
    if direction.is_ascending() {
        Seek::Next
    } else {
        Seek::Prev
    }
}

fn seek<C: RawCursor>(cursor: &mut C, to: Seek<'_>) -> Result<bool, ReadError> {
    cursor.seek(to).map_err(engine_call("cursor.get"))
}

/// Whether the current key equals `target`. The key is loaded into a buffer of
/// exactly `target.len()` bytes, so a longer key reports a short buffer and is
/// known to differ without being copied.
fn at_key<C: RawCursor>(
    cursor: &mut C,
    probe: &mut Vec<u8>,
    target: &[u8],
) -> Result<bool, ReadError> {
    probe.clear();
    probe.resize(target.len(), 0);
    match cursor.load(probe, None).map_err(engine_call("cursor.get"))? {
        Load::Loaded { key_len, .. } => Ok(key_len == target.len() && probe[..] == *target),
        Load::BufferSmall { .. } => Ok(false),
    }
}

/// Position on the first record at or after the left boundary.
fn seek_left<C: RawCursor>(
    cursor: &mut C,
    range: &Range,
    probe: &mut Vec<u8>,
) -> Result<bool, ReadError> {
    let Some(left) = range.left() else {
        return seek(cursor, Seek::First);
    };
    if !seek(cursor, Seek::AtLeast(left.value()))? {
        return Ok(false);
    }
    if !left.is_inclusive() && at_key(cursor, probe, left.value())? {
        return seek(cursor, Seek::Next);
    }
    Ok(true)
}

/// Position on the last record at or before the right boundary.
fn seek_right<C: RawCursor>(
    cursor: &mut C,
    range: &Range,
    probe: &mut Vec<u8>,
) -> Result<bool, ReadError> {
    let Some(right) = range.right() else {
        return seek(cursor, Seek::Last);
    };
    if !seek(cursor, Seek::AtLeast(right.value()))? {
        return seek(cursor, Seek::Last);
    }
    if right.is_inclusive() && at_key(cursor, probe, right.value())? {
        return Ok(true);
    }
    seek(cursor, Seek::Prev)
}

/// Records inside `range`, from the record numbers of its first and last record.
fn count_range<C: RawCursor>(
    cursor: &mut C,
    range: &Range,
    probe: &mut Vec<u8>,
) -> Result<usize, ReadError> {
    if range.is_empty() || !seek_left(cursor, range, probe)? {
        return Ok(0);
    }
    let first = cursor
        .record_number()
        .map_err(engine_call("cursor.get_recno"))?;
    if !seek_right(cursor, range, probe)? {
        return Ok(0);
    }
    let last = cursor
        .record_number()
        .map_err(engine_call("cursor.get_recno"))?;
    Ok(if last >= first {
        (last - first) as usize + 1
    } else {
        0
    })
}

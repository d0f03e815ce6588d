//! K-way merge of several range readers into one ordered stream.

use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
};

use crate::{
    bytes::BytesBuffer,
    engine::RawStore,
    query::{
        compare_suffix, reader::RangeReader, Direction, ReadError, ReadStatus, RecordSource,
    },
};

/// Reads of one child key before its short-buffer report is passed on.
const SCRATCH_ATTEMPTS: usize = 3;

/// Reader that merges the output of one [`RangeReader`] per input range.
///
/// Every reader contributes the key of its current record to a heap. Records
/// are ordered by key suffix in the merge direction; equal suffixes come out in
/// the order of their ranges in the input list. Values are copied only for the
/// record being delivered, straight from the engine cursor of its reader, so
/// skipped records never have their values read. That reader is only advanced
/// on the next read, so a read that reports short slots can be repeated without
/// losing a record.
pub(crate) struct MergeReader<'s, S: RawStore> {
    readers: Vec<Option<RangeReader<'s, S>>>,
    /// Readers below this index have contributed to the heap at least once.
    started: usize,
    peeked: BinaryHeap<Reverse<HeapEntry>>,
    /// Entry whose reader must produce its next record before selecting again.
    refill: Option<HeapEntry>,
    direction: Direction,
    key_suffix_offset: usize,
    skip: usize,
    limit: Option<usize>,
}

impl<'s, S: RawStore> MergeReader<'s, S> {
    pub(crate) fn new(
        readers: Vec<RangeReader<'s, S>>,
        direction: Direction,
        key_suffix_offset: usize,
        skip: usize,
        limit: Option<usize>,
    ) -> Self {
        let peeked = BinaryHeap::with_capacity(readers.len());
        MergeReader {
            readers: readers.into_iter().map(Some).collect(),
            started: 0,
            peeked,
            refill: None,
            direction,
            key_suffix_offset,
            skip,
            limit,
        }
    }

    /// Close every reader still open.
    pub(crate) fn release(&mut self) {
        self.peeked.clear();
        self.refill = None;
        for reader in self.readers.iter_mut() {
            if let Some(mut reader) = reader.take() {
                reader.release();
            }
        }
    }

    /// Pull the key of the next record of `entry`'s reader and queue it.
    ///
    /// The entry's key buffer grows to whatever the key needs; the caller slots
    /// only bound the copy of a delivered record.
    fn fill(
        &mut self,
        mut entry: HeapEntry,
        key_capacity: usize,
    ) -> Result<Option<ReadStatus>, ReadError> {
        let Some(reader) = self.readers[entry.reader_idx].as_mut() else {
            return Ok(None);
        };
        entry.key.ensure_capacity(key_capacity);
        let mut status = ReadStatus::Exhausted;
        for _ in 0..SCRATCH_ATTEMPTS {
            status = reader.read(entry.key.raw_mut(), None)?;
            match status {
                ReadStatus::Insufficient { key_len, .. } => entry.key.ensure_capacity(key_len),
                _ => break,
            }
        }
        match status {
            ReadStatus::Record { key_len, .. } => {
                entry.key.set_len(key_len);
                self.peeked.push(Reverse(entry));
                Ok(None)
            }
            ReadStatus::Exhausted => {
                if let Some(mut reader) = self.readers[entry.reader_idx].take() {
                    reader.release();
                }
                Ok(None)
            }
            ReadStatus::Insufficient { .. } => {
                self.refill = Some(entry);
                Ok(Some(status))
            }
        }
    }
}

impl<S: RawStore> RecordSource for MergeReader<'_, S> {
    fn read(
        &mut self,
        key: &mut [u8],
        value: Option<&mut [u8]>,
    ) -> Result<ReadStatus, ReadError> {
        if self.limit == Some(0) {
            self.release();
            return Ok(ReadStatus::Exhausted);
        }
        let key_capacity = key.len();
        loop {
            if let Some(entry) = self.refill.take() {
                if let Some(short) = self.fill(entry, key_capacity)? {
                    return Ok(short);
                }
            }
            while self.started < self.readers.len() {
                let entry = HeapEntry::new(
                    self.started,
                    self.direction,
                    self.key_suffix_offset,
                );
                self.started += 1;
                if let Some(short) = self.fill(entry, key_capacity)? {
                    return Ok(short);
                }
            }

            let Some(Reverse(winner)) = self.peeked.pop() else {
                return Ok(ReadStatus::Exhausted);
            };
            if self.skip > 0 {
                self.skip -= 1;
                self.refill = Some(winner);
                continue;
            }

            // The winner's reader still sits on the record it queued.
            let Some(reader) = self.readers[winner.reader_idx].as_mut() else {
                return Ok(ReadStatus::Exhausted);
            };
            let status = reader.reload(key, value)?;
            if let ReadStatus::Record { .. } = status {
                if let Some(limit) = self.limit.as_mut() {
                    *limit -= 1;
                }
                self.refill = Some(winner);
            } else {
                self.peeked.push(Reverse(winner));
            }
            return Ok(status);
        }
    }

    fn remaining(&mut self) -> Result<Option<usize>, ReadError> {
        if self.started > 0 {
            return Ok(None);
        }
        let mut total = 0usize;
        for reader in self.readers.iter_mut().flatten() {
            match reader.remaining()? {
                Some(count) => total += count,
                None => return Ok(None),
            }
        }
        let total = total.saturating_sub(self.skip);
        Ok(Some(match self.limit {
            Some(limit) => total.min(limit),
            None => total,
        }))
    }
}

impl<S: RawStore> Drop for MergeReader<'_, S> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Key of the current record of one reader.
struct HeapEntry {
    reader_idx: usize,
    key: BytesBuffer,
    direction: Direction,
    key_suffix_offset: usize,
}

impl HeapEntry {
    fn new(reader_idx: usize, direction: Direction, key_suffix_offset: usize) -> Self {
        HeapEntry {
            reader_idx,
            key: BytesBuffer::default(),
            direction,
            key_suffix_offset,
        }
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Key order follows the direction, ties always go to the earlier range.
        let key_cmp = compare_suffix(
            self.key.as_slice(),
            other.key.as_slice(),
            self.key_suffix_offset,
        );
        self.direction
            .order(key_cmp)
            .then(self.reader_idx.cmp(&other.reader_idx))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

//! Byte views and owned byte buffers produced by reads.

use std::fmt;

use crate::error::Error;

/// Immutable, non-owning view `(backing, offset, length)` into a byte array.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BytesSegment<'a> {
    bytes: &'a [u8],
    offset: usize,
    len: usize,
}

impl<'a> BytesSegment<'a> {
    /// View over the whole of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            len: bytes.len(),
        }
    }

    /// View over `bytes[offset..offset + len]`.
    pub fn with_range(bytes: &'a [u8], offset: usize, len: usize) -> Result<Self, Error> {
        match offset.checked_add(len) {
            Some(end) if end <= bytes.len() => Ok(Self { bytes, offset, len }),
            _ => Err(Error::out_of_bounds(format!(
                "invalid arguments, bytes length [{}], offset [{offset}], length [{len}]",
                bytes.len()
            ))),
        }
    }

    /// Start of the view in the backing array.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the length is zero.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte at index `i` of the view.
    pub fn get(&self, i: usize) -> Option<u8> {
        self.as_slice().get(i).copied()
    }

    /// The viewed bytes.
    pub fn as_slice(&self) -> &'a [u8] {
        &self.bytes[self.offset..self.offset + self.len]
    }

    /// The full backing array, ignoring offset and length.
    pub fn backing(&self) -> &'a [u8] {
        self.bytes
    }

    /// Owned copy of the viewed bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Copy `count` bytes starting at `source_offset` of the view into `target`.
    pub fn copy_to(
        &self,
        source_offset: usize,
        target: &mut [u8],
        target_offset: usize,
        count: usize,
    ) -> Result<(), Error> {
        let source_end = source_offset.checked_add(count).filter(|end| *end <= self.len);
        let target_end = target_offset
            .checked_add(count)
            .filter(|end| *end <= target.len());
        match (source_end, target_end) {
            (Some(source_end), Some(target_end)) => {
                target[target_offset..target_end]
                    .copy_from_slice(&self.as_slice()[source_offset..source_end]);
                Ok(())
            }
            _ => Err(Error::out_of_bounds(format!(
                "invalid arguments, sourceOffset [{source_offset}], bytesToCopy [{count}], {self}"
            ))),
        }
    }
}

impl AsRef<[u8]> for BytesSegment<'_> {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Display for BytesSegment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BytesSegment, bytes length [{}], Offset [{}], Length: [{}]",
            self.bytes.len(),
            self.offset,
            self.len
        )
    }
}

impl fmt::Debug for BytesSegment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BytesSegment")
            .field("offset", &self.offset)
            .field("bytes", &self.as_slice())
            .finish()
    }
}

/// Owned byte array plus the length of its valid prefix.
///
/// The array is the read buffer for one column; its length is the column
/// capacity and only `len` leading bytes belong to the current record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BytesBuffer {
    bytes: Vec<u8>,
    len: usize,
}

impl BytesBuffer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity],
            len: 0,
        }
    }

    pub(crate) fn from_parts(bytes: Vec<u8>, len: usize) -> Self {
        debug_assert!(len <= bytes.len());
        Self { bytes, len }
    }

    /// Grow the backing array to at least `capacity`, keeping current content.
    pub(crate) fn ensure_capacity(&mut self, capacity: usize) {
        if self.bytes.len() < capacity {
            self.bytes.resize(capacity, 0);
        }
    }

    pub(crate) fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub(crate) fn set_len(&mut self, len: usize) {
        debug_assert!(len <= self.bytes.len());
        self.len = len;
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the length is zero.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the backing array.
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// The valid bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Owned copy of the valid bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Take the valid bytes, reusing the allocation when no copy is needed.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.bytes.truncate(self.len);
        self.bytes
    }

    /// View over the valid bytes.
    pub fn segment(&self) -> BytesSegment<'_> {
        BytesSegment::new(self.as_slice())
    }
}

impl AsRef<[u8]> for BytesBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

/// One decoded row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BytesRecord {
    /// Key bytes.
    pub key: BytesBuffer,
    /// Value bytes; empty when values were not read.
    pub value: BytesBuffer,
}

impl BytesRecord {
    /// Record of the given key and value.
    pub fn new(key: BytesBuffer, value: BytesBuffer) -> Self {
        Self { key, value }
    }
}

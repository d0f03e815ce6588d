//! Contract required from the embedded, sorted, byte-keyed storage engine.
//!
//! The engine is a black box: it owns transactions, page cache and the on-disk
//! format. This crate only needs positional cursors whose current record can be
//! copied into caller-supplied buffers of a fixed capacity. A copy that does not
//! fit is reported as [`Load::BufferSmall`] instead of being resized.

/// In-memory engine.
pub mod memory;

use std::fmt;

/// Failure reported by the engine: a numeric code plus a human string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineError {
    /// Engine error number.
    pub code: i32,
    /// Engine error text.
    pub message: String,
}

impl EngineError {
    /// Error with the given code and text.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error code [{}], {}", self.code, self.message)
    }
}

impl std::error::Error for EngineError {}

/// Settings the engine applies when an environment is opened over it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvironmentSettings {
    /// Page cache size in bytes.
    pub cache_size: u64,
    /// Flush stores when they close. Without it, unflushed records may be lost.
    pub persistent: bool,
}

/// Options the engine needs when opening one named store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Maintain record numbers so cursors can seek by position and count cheaply.
    pub record_numbers: bool,
    /// Refuse writes.
    pub read_only: bool,
    /// Cache priority hint, `0` meaning unchanged.
    pub cache_priority: u8,
}

/// Cursor positioning request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Seek<'a> {
    /// First record of the store.
    First,
    /// Last record of the store.
    Last,
    /// Record after the current one.
    Next,
    /// Record before the current one.
    Prev,
    /// Smallest key greater than or equal to the given one.
    AtLeast(&'a [u8]),
    /// 1-based record number; requires record numbers.
    RecordNumber(u32),
}

/// Outcome of copying the current record into caller buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Load {
    /// The record was copied; lengths are the actual content lengths.
    Loaded {
        /// Key length.
        key_len: usize,
        /// Value length, zero when no value buffer was given.
        value_len: usize,
    },
    /// At least one side does not fit. Nothing was written and the cursor did not move.
    BufferSmall {
        /// Key length.
        key_len: usize,
        /// Value length, zero when no value buffer was given.
        value_len: usize,
    },
}

/// Environment-level engine handle.
pub trait Backend {
    /// Store opened by [`Backend::open_store`].
    type Store: RawStore;

    /// Open the environment. Called once, before any store is opened.
    fn open(&self, settings: &EnvironmentSettings) -> Result<(), EngineError>;

    /// Open the named store, creating it when missing.
    fn open_store(&self, name: &str, options: &StoreOptions) -> Result<Self::Store, EngineError>;

    /// Release the environment. Must tolerate being called more than once.
    fn close(&self) -> Result<(), EngineError>;
}

/// One named sorted store (a database in engine terms).
pub trait RawStore {
    /// Cursor returned by [`RawStore::cursor`].
    type Cursor: RawCursor;

    /// New cursor, not positioned yet.
    fn cursor(&self) -> Result<Self::Cursor, EngineError>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), EngineError>;

    /// Returns whether a record was removed.
    fn delete(&self, key: &[u8]) -> Result<bool, EngineError>;

    /// Copy the value stored under `key` into `value`, `None` when absent.
    fn get(&self, key: &[u8], value: &mut [u8]) -> Result<Option<Load>, EngineError>;

    /// Whether cursors can seek by and report record numbers.
    fn record_numbers_enabled(&self) -> bool;

    /// Release the store. Calling it again is a no-op.
    fn close(&self) -> Result<(), EngineError>;
}

/// Positional cursor over a [`RawStore`].
pub trait RawCursor {
    /// Move the cursor; `false` when no record exists at the requested place,
    /// in which case the position is unspecified.
    fn seek(&mut self, to: Seek<'_>) -> Result<bool, EngineError>;

    /// Copy the current record. Without a value buffer only the key is copied
    /// and the reported value length is zero.
    fn load(&mut self, key: &mut [u8], value: Option<&mut [u8]>) -> Result<Load, EngineError>;

    /// 1-based record number of the current record.
    fn record_number(&mut self) -> Result<u32, EngineError>;

    /// Release the cursor. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), EngineError>;
}

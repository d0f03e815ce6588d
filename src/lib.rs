//! Range reads over an embedded, sorted, byte-keyed store.
//!
//! The crate sits between callers and a storage engine that only offers
//! positional cursors copying records into fixed-size buffers. On top of that
//! it provides byte-range algebra, directional range cursors, k-way merges of
//! several ranges, and bulk fetches into a flat [`BytesTable`] whose column
//! buffers grow to fit the records they meet.
//!
//! ```
//! use rangefetch::{
//!     Direction, Environment, EnvironmentOption, DatabaseOption, MemoryBackend,
//!     MultiRangeQuery, Projection, Range,
//! };
//!
//! let env = Environment::open(MemoryBackend::new(), EnvironmentOption::from("data.db")).unwrap();
//! let db = env.attach_database(DatabaseOption::from("main")).unwrap();
//! db.put(&[1, 2], &[10]).unwrap();
//! db.put(&[2, 1], &[20]).unwrap();
//!
//! let query = MultiRangeQuery::new([Range::prefix([1u8]), Range::prefix([2u8])], Direction::Ascending)
//!     .key_suffix_offset(1);
//! let table = db.fetch(&query, Projection::Values).unwrap();
//! let values = table.map_column(0, |cell| cell.to_vec()).unwrap();
//! assert_eq!(values, vec![vec![20], vec![10]]);
//! ```

#![deny(missing_docs)]

mod logging;

/// Byte views and owned byte buffers.
pub mod bytes;

/// Public cursor over one range.
pub mod cursor;

/// Storage engine contract and the in-memory engine.
pub mod engine;

/// Environments and databases.
pub mod env;

/// Crate error type.
pub mod error;

/// Environment and database configuration.
pub mod option;

/// Query descriptions and record readers.
pub mod query;

/// Byte-range algebra.
pub mod range;

/// Flat table produced by fetches.
pub mod table;

pub use crate::{
    bytes::{BytesBuffer, BytesRecord, BytesSegment},
    cursor::Cursor,
    engine::{
        memory::{MemoryBackend, MemoryCursor, MemoryStore},
        Backend, EngineError, EnvironmentSettings, Load, RawCursor, RawStore, Seek,
        StoreOptions,
    },
    env::{Database, Environment},
    error::{Error, Side},
    option::{BufferConfig, CachePriority, DatabaseOption, EnvironmentOption, MIN_BUFFER_SIZE},
    query::{Direction, MultiRangeQuery, Projection, Take},
    range::{compare_bytes, increment_bytes, Boundary, Range},
    table::{BytesTable, SegmentPosition},
};

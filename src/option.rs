use std::path::PathBuf;

use crate::engine::{EnvironmentSettings, StoreOptions};

/// Smallest usable column buffer: the size of an unsigned 32-bit record number.
pub const MIN_BUFFER_SIZE: usize = std::mem::size_of::<u32>();

/// Capacity policy of one column (key or value) buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferConfig {
    /// Immutable size; a record that does not fit is an error.
    Fixed(usize),
    /// Initial size; grows to fit larger records.
    Growable(usize),
}

impl BufferConfig {
    /// Fixed buffer of `size` bytes, validated when the database is attached.
    pub fn fixed(size: usize) -> Self {
        BufferConfig::Fixed(size)
    }

    /// Growable buffer starting at `size` bytes (at least [`MIN_BUFFER_SIZE`]).
    pub fn growable(size: usize) -> Self {
        BufferConfig::Growable(size.max(MIN_BUFFER_SIZE))
    }

    /// Fixed buffer of [`MIN_BUFFER_SIZE`] bytes.
    pub fn min_fixed() -> Self {
        BufferConfig::Fixed(MIN_BUFFER_SIZE)
    }

    /// Configured size in bytes.
    pub fn size(&self) -> usize {
        match self {
            BufferConfig::Fixed(size) | BufferConfig::Growable(size) => *size,
        }
    }

    /// Whether records larger than the size are an error.
    pub fn is_fixed(&self) -> bool {
        matches!(self, BufferConfig::Fixed(_))
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig::Growable(100)
    }
}

/// Cache priority hint forwarded to the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CachePriority {
    #[default]
    /// Leave the engine default.
    Unchanged = 0,
    /// Evict first.
    VeryLow = 1,
    /// Evict early.
    Low = 2,
    /// Normal eviction.
    Default = 3,
    /// Keep longer.
    High = 4,
    /// Evict last.
    VeryHigh = 5,
}

/// Options of an [`Environment`](crate::Environment), built from its path.
#[derive(Debug, Clone)]
pub struct EnvironmentOption {
    pub(crate) path: PathBuf,
    pub(crate) cache_size: u64,
    pub(crate) persistent: bool,
}

impl<P> From<P> for EnvironmentOption
where
    P: Into<PathBuf>,
{
    fn from(path: P) -> Self {
        EnvironmentOption {
            path: path.into(),
            cache_size: 64 * 1024 * 1024,
            persistent: false,
        }
    }
}

impl EnvironmentOption {
    /// Backing file path, shown in resource descriptions.
    pub fn path(self, path: impl Into<PathBuf>) -> Self {
        EnvironmentOption {
            path: path.into(),
            ..self
        }
    }

    /// Engine page cache size in bytes. Defaults to 64 MiB.
    pub fn cache_size(self, cache_size: u64) -> Self {
        EnvironmentOption { cache_size, ..self }
    }

    /// Flush stores when they close. Defaults to `false`.
    pub fn persistent(self, persistent: bool) -> Self {
        EnvironmentOption { persistent, ..self }
    }

    pub(crate) fn describe(&self) -> String {
        format!("environment (file name [{}])", self.path.display())
    }

    pub(crate) fn engine_settings(&self) -> EnvironmentSettings {
        EnvironmentSettings {
            cache_size: self.cache_size,
            persistent: self.persistent,
        }
    }
}

/// Options of a [`Database`](crate::Database), built from its name.
#[derive(Debug, Clone)]
pub struct DatabaseOption {
    pub(crate) name: String,
    pub(crate) cache_priority: CachePriority,
    pub(crate) record_numbers: bool,
    pub(crate) read_only: bool,
    pub(crate) key_buffer: BufferConfig,
    pub(crate) value_buffer: BufferConfig,
    pub(crate) max_read_retries: usize,
    pub(crate) default_batch_rows: usize,
}

impl<S> From<S> for DatabaseOption
where
    S: Into<String>,
{
    fn from(name: S) -> Self {
        DatabaseOption {
            name: name.into(),
            cache_priority: CachePriority::Unchanged,
            record_numbers: false,
            read_only: false,
            key_buffer: BufferConfig::default(),
            value_buffer: BufferConfig::default(),
            max_read_retries: 5,
            default_batch_rows: 64,
        }
    }
}

impl DatabaseOption {
    /// Name of the store inside the environment.
    pub fn name(self, name: impl Into<String>) -> Self {
        DatabaseOption {
            name: name.into(),
            ..self
        }
    }

    /// Cache priority hint for the store's pages.
    pub fn cache_priority(self, cache_priority: CachePriority) -> Self {
        DatabaseOption {
            cache_priority,
            ..self
        }
    }

    /// Maintain record numbers; needed for counting and positional skips.
    pub fn record_numbers(self, record_numbers: bool) -> Self {
        DatabaseOption {
            record_numbers,
            ..self
        }
    }

    /// Refuse writes.
    pub fn read_only(self, read_only: bool) -> Self {
        DatabaseOption { read_only, ..self }
    }

    /// Key column buffer. Defaults to growable from 100 bytes.
    pub fn key_buffer(self, key_buffer: BufferConfig) -> Self {
        DatabaseOption { key_buffer, ..self }
    }

    /// Value column buffer. Defaults to growable from 100 bytes.
    pub fn value_buffer(self, value_buffer: BufferConfig) -> Self {
        DatabaseOption {
            value_buffer,
            ..self
        }
    }

    /// Ceiling on consecutive buffer growths for a single record.
    ///
    /// Exact-fit growth needs at most one retry per column, so hitting the
    /// ceiling means the engine is misreporting lengths.
    pub fn max_read_retries(self, max_read_retries: usize) -> Self {
        DatabaseOption {
            max_read_retries: max_read_retries.max(1),
            ..self
        }
    }

    /// Rows pre-sized by a fetch that has neither a `take` nor record numbers.
    pub fn default_batch_rows(self, default_batch_rows: usize) -> Self {
        DatabaseOption {
            default_batch_rows: default_batch_rows.max(1),
            ..self
        }
    }

    /// Configured store name.
    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub(crate) fn store_options(&self) -> StoreOptions {
        StoreOptions {
            record_numbers: self.record_numbers,
            read_only: self.read_only,
            cache_priority: self.cache_priority as u8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growable_is_clamped_but_fixed_is_kept() {
        assert_eq!(BufferConfig::growable(1), BufferConfig::Growable(MIN_BUFFER_SIZE));
        assert_eq!(BufferConfig::fixed(1), BufferConfig::Fixed(1));
        assert_eq!(BufferConfig::min_fixed().size(), 4);
    }

    #[test]
    fn builder_overrides_defaults() {
        let option = DatabaseOption::from("main")
            .record_numbers(true)
            .key_buffer(BufferConfig::fixed(8))
            .max_read_retries(0);
        assert_eq!(option.get_name(), "main");
        assert!(option.store_options().record_numbers);
        assert_eq!(option.key_buffer, BufferConfig::Fixed(8));
        assert_eq!(option.value_buffer, BufferConfig::Growable(100));
        assert_eq!(option.max_read_retries, 1);

        let env = EnvironmentOption::from("/tmp/data.db").cache_size(1024);
        assert_eq!(env.describe(), "environment (file name [/tmp/data.db])");
        assert_eq!(env.cache_size, 1024);
    }
}

//! In-memory engine backed by a lock-free skiplist.
//!
//! Serves as the reference implementation of the engine contract: cursors copy
//! into caller buffers and report `BufferSmall` without side effects, record
//! numbers are only available when enabled for the store.

use std::{
    collections::{HashMap, VecDeque},
    ops::Bound,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use crossbeam_skiplist::{map::Entry, SkipMap};

use super::{
    Backend, EngineError, EnvironmentSettings, Load, RawCursor, RawStore, Seek, StoreOptions,
};

/// Error code of an I/O failure, used for injected close failures.
pub const ERR_IO: i32 = 5;
/// Error code of a call on a closed backend, store or cursor.
pub const ERR_CLOSED: i32 = 9;
/// Error code of a write to a read-only store.
pub const ERR_READ_ONLY: i32 = 13;
/// Error code of an invalid argument or cursor state.
pub const ERR_INVALID: i32 = 22;

type Records = SkipMap<Vec<u8>, Vec<u8>>;

#[derive(Debug, Default)]
struct Shared {
    stores: Mutex<HashMap<String, Arc<Records>>>,
    failing_closes: Mutex<VecDeque<String>>,
    settings: Mutex<Option<EnvironmentSettings>>,
    closed: AtomicBool,
}

impl Shared {
    fn injected_close_failure(&self) -> Option<EngineError> {
        let mut queue = self
            .failing_closes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        queue.pop_front().map(|message| EngineError::new(ERR_IO, message))
    }
}

/// Engine keeping every named store in memory.
///
/// Clones share the same stores. Closing a persistent environment keeps them,
/// so re-opening an environment over a clone sees previously written records;
/// closing any other environment discards them.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl MemoryBackend {
    /// Backend without any store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `close` of any store or of the backend fail with `message`.
    pub fn fail_next_close(&self, message: impl Into<String>) {
        self.shared
            .failing_closes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(message.into());
    }

    /// Cache size of the environment opened last, if any.
    pub fn cache_size(&self) -> Option<u64> {
        self.settings().map(|settings| settings.cache_size)
    }

    fn settings(&self) -> Option<EnvironmentSettings> {
        self.shared
            .settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Backend for MemoryBackend {
    type Store = MemoryStore;

    fn open(&self, settings: &EnvironmentSettings) -> Result<(), EngineError> {
        if settings.cache_size == 0 {
            return Err(EngineError::new(ERR_INVALID, "cache size must be positive"));
        }
        *self
            .shared
            .settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(settings.clone());
        self.shared.closed.store(false, Ordering::Release);
        Ok(())
    }

    fn open_store(&self, name: &str, options: &StoreOptions) -> Result<MemoryStore, EngineError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(EngineError::new(ERR_CLOSED, "backend is closed"));
        }
        let records = {
            let mut stores = self
                .shared
                .stores
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(stores.entry(name.to_owned()).or_default())
        };
        Ok(MemoryStore {
            records,
            options: options.clone(),
            closed: Arc::new(AtomicBool::new(false)),
            shared: Arc::clone(&self.shared),
        })
    }

    fn close(&self) -> Result<(), EngineError> {
        if let Some(err) = self.shared.injected_close_failure() {
            return Err(err);
        }
        let persistent = self.settings().is_some_and(|settings| settings.persistent);
        if !persistent {
            self.shared
                .stores
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clear();
        }
        self.shared.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// One named store of a [`MemoryBackend`].
#[derive(Debug)]
pub struct MemoryStore {
    records: Arc<Records>,
    options: StoreOptions,
    closed: Arc<AtomicBool>,
    shared: Arc<Shared>,
}

impl MemoryStore {
    fn check_open(&self) -> Result<(), EngineError> {
        if self.closed.load(Ordering::Acquire) {
            Err(EngineError::new(ERR_CLOSED, "store is closed"))
        } else {
            Ok(())
        }
    }

    fn check_writable(&self) -> Result<(), EngineError> {
        self.check_open()?;
        if self.options.read_only {
            return Err(EngineError::new(ERR_READ_ONLY, "store is read only"));
        }
        Ok(())
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no record.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Cache priority the store was opened with.
    pub fn cache_priority(&self) -> u8 {
        self.options.cache_priority
    }
}

impl RawStore for MemoryStore {
    type Cursor = MemoryCursor;

    fn cursor(&self) -> Result<MemoryCursor, EngineError> {
        self.check_open()?;
        Ok(MemoryCursor {
            records: Arc::clone(&self.records),
            record_numbers: self.options.record_numbers,
            current: None,
            closed: false,
            store_closed: Arc::clone(&self.closed),
        })
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), EngineError> {
        self.check_writable()?;
        self.records.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<bool, EngineError> {
        self.check_writable()?;
        Ok(self.records.remove(key).is_some())
    }

    fn get(&self, key: &[u8], value: &mut [u8]) -> Result<Option<Load>, EngineError> {
        self.check_open()?;
        let Some(entry) = self.records.get(key) else {
            return Ok(None);
        };
        let stored = entry.value();
        if stored.len() > value.len() {
            return Ok(Some(Load::BufferSmall {
                key_len: key.len(),
                value_len: stored.len(),
            }));
        }
        value[..stored.len()].copy_from_slice(stored);
        Ok(Some(Load::Loaded {
            key_len: key.len(),
            value_len: stored.len(),
        }))
    }

    fn record_numbers_enabled(&self) -> bool {
        self.options.record_numbers
    }

    fn close(&self) -> Result<(), EngineError> {
        if let Some(err) = self.shared.injected_close_failure() {
            return Err(err);
        }
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Cursor over a [`MemoryStore`]. The position is the key of the current record.
#[derive(Debug)]
pub struct MemoryCursor {
    records: Arc<Records>,
    record_numbers: bool,
    current: Option<Vec<u8>>,
    closed: bool,
    store_closed: Arc<AtomicBool>,
}

impl MemoryCursor {
    fn check_open(&self) -> Result<(), EngineError> {
        if self.closed {
            return Err(EngineError::new(ERR_CLOSED, "cursor is closed"));
        }
        if self.store_closed.load(Ordering::Acquire) {
            return Err(EngineError::new(ERR_CLOSED, "store is closed"));
        }
        Ok(())
    }

    fn check_record_numbers(&self) -> Result<(), EngineError> {
        if self.record_numbers {
            Ok(())
        } else {
            Err(EngineError::new(ERR_INVALID, "record numbers are not enabled"))
        }
    }

    fn current(&self) -> Result<&[u8], EngineError> {
        self.current
            .as_deref()
            .ok_or_else(|| EngineError::new(ERR_INVALID, "cursor is not positioned"))
    }

    fn land(&mut self, entry: Option<Entry<'_, Vec<u8>, Vec<u8>>>) -> bool {
        match entry {
            Some(entry) => {
                self.current = Some(entry.key().clone());
                true
            }
            None => false,
        }
    }
}

impl RawCursor for MemoryCursor {
    fn seek(&mut self, to: Seek<'_>) -> Result<bool, EngineError> {
        self.check_open()?;
        let records = Arc::clone(&self.records);
        let entry = match to {
            Seek::First => records.front(),
            Seek::Last => records.back(),
            Seek::Next => {
                let current = self.current()?;
                records.lower_bound(Bound::Excluded(current))
            }
            Seek::Prev => {
                let current = self.current()?;
                records.upper_bound(Bound::Excluded(current))
            }
            Seek::AtLeast(key) => records.lower_bound(Bound::Included(key)),
            Seek::RecordNumber(number) => {
                self.check_record_numbers()?;
                if number == 0 {
                    None
                } else {
                    records.iter().nth(number as usize - 1)
                }
            }
        };
        Ok(self.land(entry))
    }

    fn load(&mut self, key: &mut [u8], value: Option<&mut [u8]>) -> Result<Load, EngineError> {
        self.check_open()?;
        let current = self.current()?;
        let entry = self
            .records
            .get(current)
            .ok_or_else(|| EngineError::new(ERR_INVALID, "current record was removed"))?;
        let stored_key = entry.key();
        let stored_value = entry.value();
        let value_len = if value.is_some() { stored_value.len() } else { 0 };
        let fits_value = value.as_ref().map_or(true, |buf| stored_value.len() <= buf.len());
        if stored_key.len() > key.len() || !fits_value {
            return Ok(Load::BufferSmall {
                key_len: stored_key.len(),
                value_len,
            });
        }
        key[..stored_key.len()].copy_from_slice(stored_key);
        if let Some(value) = value {
            value[..stored_value.len()].copy_from_slice(stored_value);
        }
        Ok(Load::Loaded {
            key_len: stored_key.len(),
            value_len,
        })
    }

    fn record_number(&mut self) -> Result<u32, EngineError> {
        self.check_open()?;
        self.check_record_numbers()?;
        let current = self.current()?;
        let before = self
            .records
            .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(current)))
            .count();
        u32::try_from(before + 1)
            .map_err(|_| EngineError::new(ERR_INVALID, "record number overflows u32"))
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.closed = true;
        self.current = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(record_numbers: bool) -> MemoryStore {
        let backend = MemoryBackend::new();
        let store = backend
            .open_store(
                "main",
                &StoreOptions {
                    record_numbers,
                    ..Default::default()
                },
            )
            .expect("open store");
        for key in [[1u8], [3], [5]] {
            store.put(&key, &[key[0] * 10]).expect("put");
        }
        store
    }

    #[test]
    fn seek_moves_in_key_order() {
        let store = store(false);
        let mut cursor = store.cursor().expect("cursor");
        let mut key = [0u8; 4];

        assert!(cursor.seek(Seek::AtLeast(&[2])).expect("seek"));
        assert_eq!(
            cursor.load(&mut key, None).expect("load"),
            Load::Loaded {
                key_len: 1,
                value_len: 0
            }
        );
        assert_eq!(key[0], 3);

        assert!(cursor.seek(Seek::Prev).expect("prev"));
        cursor.load(&mut key, None).expect("load");
        assert_eq!(key[0], 1);
        assert!(!cursor.seek(Seek::Prev).expect("prev"));

        assert!(cursor.seek(Seek::Last).expect("last"));
        assert!(!cursor.seek(Seek::Next).expect("next"));
        assert!(!cursor.seek(Seek::AtLeast(&[6])).expect("seek"));
    }

    #[test]
    fn short_buffer_leaves_target_untouched() {
        let store = store(false);
        store.put(&[7], &[1, 2, 3, 4, 5]).expect("put");
        let mut cursor = store.cursor().expect("cursor");
        assert!(cursor.seek(Seek::Last).expect("last"));

        let mut key = [0u8; 4];
        let mut value = [0u8; 4];
        assert_eq!(
            cursor.load(&mut key, Some(&mut value)).expect("load"),
            Load::BufferSmall {
                key_len: 1,
                value_len: 5
            }
        );
        assert_eq!(key, [0; 4]);
        assert_eq!(value, [0; 4]);

        let mut value = [0u8; 5];
        assert_eq!(
            cursor.load(&mut key, Some(&mut value)).expect("load"),
            Load::Loaded {
                key_len: 1,
                value_len: 5
            }
        );
        assert_eq!(value, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn record_numbers_require_capability() {
        let mut cursor = store(false).cursor().expect("cursor");
        assert!(cursor.seek(Seek::First).expect("first"));
        let err = cursor.record_number().expect_err("disabled");
        assert_eq!(err.code, ERR_INVALID);

        let store = store(true);
        let mut cursor = store.cursor().expect("cursor");
        assert!(cursor.seek(Seek::RecordNumber(2)).expect("recno"));
        assert_eq!(cursor.record_number().expect("recno"), 2);
        assert!(!cursor.seek(Seek::RecordNumber(4)).expect("recno"));
        assert!(!cursor.seek(Seek::RecordNumber(0)).expect("recno"));
    }

    #[test]
    fn closed_store_rejects_cursors() {
        let store = store(false);
        let mut cursor = store.cursor().expect("cursor");
        store.close().expect("close");
        assert_eq!(store.cursor().expect_err("closed").code, ERR_CLOSED);
        assert_eq!(cursor.seek(Seek::First).expect_err("closed").code, ERR_CLOSED);
    }

    #[test]
    fn injected_close_failure_fires_once() {
        let backend = MemoryBackend::new();
        let store = backend
            .open_store("main", &StoreOptions::default())
            .expect("open");
        backend.fail_next_close("disk on fire");
        assert_eq!(store.close().expect_err("injected").message, "disk on fire");
        store.close().expect("second close");
    }

    #[test]
    fn only_persistent_environments_keep_stores() {
        let backend = MemoryBackend::new();
        let settings = EnvironmentSettings {
            cache_size: 1 << 20,
            persistent: true,
        };
        backend.open(&settings).expect("open");
        assert_eq!(backend.cache_size(), Some(1 << 20));
        let store = backend
            .open_store("main", &StoreOptions::default())
            .expect("open store");
        store.put(&[1], &[1]).expect("put");
        backend.close().expect("close");

        backend
            .open(&EnvironmentSettings {
                persistent: false,
                ..settings
            })
            .expect("reopen");
        let store = backend
            .open_store("main", &StoreOptions::default())
            .expect("open store");
        assert_eq!(store.len(), 1);
        backend.close().expect("close");

        backend.open(&settings).expect("reopen");
        let store = backend
            .open_store("main", &StoreOptions::default())
            .expect("open store");
        assert!(store.is_empty());

        let err = backend
            .open(&EnvironmentSettings {
                cache_size: 0,
                persistent: true,
            })
            .expect_err("empty cache");
        assert_eq!(err.code, ERR_INVALID);
    }
}

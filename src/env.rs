//! Environments and databases: the owning handles around engine resources.
//!
//! An [`Environment`] tracks every [`Database`] attached through it and closes
//! them before closing the engine. Handles are cheap clones of shared state.
//! Closing twice is a no-op, and any operation on a closed handle fails with
//! [`Error::Disposed`] naming the resource.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, Weak,
};

use crate::{
    bytes::BytesBuffer,
    cursor::Cursor,
    engine::{Backend, EngineError, Load, RawStore},
    error::{Error, Side},
    logging::{rangefetch_log, LIFECYCLE_LOG_CTX},
    option::{BufferConfig, DatabaseOption, EnvironmentOption, MIN_BUFFER_SIZE},
    query::{
        fetch::{ColumnBuffer, ReadSession},
        merge::MergeReader,
        reader::RangeReader,
        Direction, MultiRangeQuery, Projection, Take,
    },
    range::Range,
    table::BytesTable,
};

/// Shared open/closed state of an environment, visible to its databases.
#[derive(Debug)]
struct EnvironmentState {
    description: String,
    closed: AtomicBool,
}

struct EnvironmentInner<B: Backend> {
    backend: B,
    option: EnvironmentOption,
    state: Arc<EnvironmentState>,
    databases: Mutex<Vec<Database<B>>>,
}

impl<B: Backend> EnvironmentInner<B> {
    fn close(&self) {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let databases = std::mem::take(
            &mut *self
                .databases
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for database in databases {
            database.inner.close();
        }
        if let Err(err) = self.backend.close() {
            log_dispose_failed("env.close", &err, &self.state.description);
        }
    }
}

impl<B: Backend> Drop for EnvironmentInner<B> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Handle to an opened storage environment.
pub struct Environment<B: Backend> {
    inner: Arc<EnvironmentInner<B>>,
}

impl<B: Backend> Clone for Environment<B> {
    fn clone(&self) -> Self {
        Environment {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> Environment<B> {
    /// Open `backend` as the environment at `option.path`, applying the cache
    /// size and persistence of `option`.
    pub fn open(backend: B, option: EnvironmentOption) -> Result<Self, Error> {
        let description = option.describe();
        backend
            .open(&option.engine_settings())
            .map_err(|err| Error::store("env.open", err, &description))?;
        let state = Arc::new(EnvironmentState {
            description,
            closed: AtomicBool::new(false),
        });
        Ok(Environment {
            inner: Arc::new(EnvironmentInner {
                backend,
                option,
                state,
                databases: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Options the environment was opened with.
    pub fn option(&self) -> &EnvironmentOption {
        &self.inner.option
    }

    /// `environment (file name [<path>])`
    pub fn description(&self) -> &str {
        &self.inner.state.description
    }

    /// Whether [`Environment::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.inner.state.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::disposed(&self.inner.state.description));
        }
        Ok(())
    }

    /// Open the named store and track it for closing with the environment.
    pub fn attach_database(&self, option: DatabaseOption) -> Result<Database<B>, Error> {
        self.check_open()?;
        let description = format!(
            "database (file name [{}], database name [{}])",
            self.inner.option.path.display(),
            option.name
        );
        let keys = ColumnBuffer::new(Side::Key, option.key_buffer, &description);
        let values = ColumnBuffer::new(Side::Value, option.value_buffer, &description);
        for column in [&keys, &values] {
            if let BufferConfig::Fixed(size) = column.config() {
                if size < MIN_BUFFER_SIZE {
                    return Err(Error::configuration(
                        format!(
                            "fixed buffer size [{size}] is less than minimum size \
                             [{MIN_BUFFER_SIZE}]"
                        ),
                        column.description(),
                    ));
                }
            }
        }
        let store = self
            .inner
            .backend
            .open_store(&option.name, &option.store_options())
            .map_err(|err| Error::store("db.open", err, &description))?;

        let database = Database {
            inner: Arc::new(DatabaseInner {
                store,
                cursor_description: format!("cursor for {description}"),
                description,
                keys,
                values,
                option,
                closed: AtomicBool::new(false),
                environment: Arc::clone(&self.inner.state),
                tracker: Arc::downgrade(&self.inner),
            }),
        };
        self.inner
            .databases
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(database.clone());
        Ok(database)
    }

    /// First tracked database with the given name.
    pub fn database_by_name(&self, name: &str) -> Option<Database<B>> {
        self.inner
            .databases
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .find(|database| database.name() == name)
            .cloned()
    }

    /// Every open database attached through this environment.
    pub fn databases(&self) -> Vec<Database<B>> {
        self.inner
            .databases
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Forward a diagnostic reported by the engine to the log.
    pub fn log_engine_error(&self, prefix: &str, message: &str) {
        rangefetch_log!(
            log::Level::Error,
            "engine_error",
            "prefix=\"{}\" message=\"{}\" context=\"{}\"",
            prefix,
            message,
            self.inner.state.description,
        );
    }

    /// Close every tracked database, then the engine. Failures are logged.
    pub fn close(&self) {
        self.inner.close();
    }
}

pub(crate) struct DatabaseInner<B: Backend> {
    pub(crate) store: B::Store,
    pub(crate) option: DatabaseOption,
    pub(crate) description: String,
    pub(crate) cursor_description: String,
    pub(crate) keys: ColumnBuffer,
    pub(crate) values: ColumnBuffer,
    closed: AtomicBool,
    environment: Arc<EnvironmentState>,
    tracker: Weak<EnvironmentInner<B>>,
}

impl<B: Backend> DatabaseInner<B> {
    pub(crate) fn check_open(&self) -> Result<(), Error> {
        if self.environment.closed.load(Ordering::Acquire) {
            return Err(Error::disposed(&self.environment.description));
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::disposed(&self.description));
        }
        Ok(())
    }

    pub(crate) fn session(&self) -> ReadSession<'_> {
        ReadSession::new(
            &self.keys,
            &self.values,
            self.option.max_read_retries,
            &self.description,
        )
    }

    pub(crate) fn require_record_numbers(&self) -> Result<(), Error> {
        if self.store.record_numbers_enabled() {
            Ok(())
        } else {
            Err(Error::configuration(
                "record numbers are not enabled, open the database with \
                 DatabaseOption::record_numbers",
                &self.description,
            ))
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(environment) = self.tracker.upgrade() {
            environment
                .databases
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .retain(|database| !std::ptr::eq(Arc::as_ptr(&database.inner), self));
        }
        if let Err(err) = self.store.close() {
            log_dispose_failed("db.close", &err, &self.description);
        }
    }
}

impl<B: Backend> Drop for DatabaseInner<B> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Handle to one named, sorted store of an environment.
pub struct Database<B: Backend> {
    inner: Arc<DatabaseInner<B>>,
}

impl<B: Backend> Clone for Database<B> {
    fn clone(&self) -> Self {
        Database {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> Database<B> {
    /// Name the database was attached under.
    pub fn name(&self) -> &str {
        self.inner.option.get_name()
    }

    /// Options the database was attached with.
    pub fn option(&self) -> &DatabaseOption {
        &self.inner.option
    }

    /// `database (file name [<path>], database name [<name>])`
    pub fn description(&self) -> &str {
        &self.inner.description
    }

    /// Whether the database was closed, directly or with its environment.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Direct access to the engine store.
    pub fn store(&self) -> &B::Store {
        &self.inner.store
    }

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// Fails with [`Error::CapacityExceeded`] when a fixed column could never
    /// read the record back.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.inner.check_open()?;
        check_fits(&self.inner.keys, key.len())?;
        check_fits(&self.inner.values, value.len())?;
        self.inner
            .store
            .put(key, value)
            .map_err(|err| Error::store("db.put", err, &self.inner.description))
    }

    /// Remove `key`; returns whether it existed.
    pub fn remove(&self, key: &[u8]) -> Result<bool, Error> {
        self.inner.check_open()?;
        self.inner
            .store
            .delete(key)
            .map_err(|err| Error::store("db.del", err, &self.inner.description))
    }

    /// Remove `key`, then store `value` under it.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.remove(key)?;
        self.put(key, value)
    }

    /// Store `value` under every key.
    pub fn put_batch<K>(
        &self,
        keys: impl IntoIterator<Item = K>,
        value: &[u8],
    ) -> Result<(), Error>
    where
        K: AsRef<[u8]>,
    {
        for key in keys {
            self.put(key.as_ref(), value)?;
        }
        Ok(())
    }

    /// Remove every key; returns how many existed.
    pub fn remove_batch<K>(&self, keys: impl IntoIterator<Item = K>) -> Result<usize, Error>
    where
        K: AsRef<[u8]>,
    {
        let mut removed = 0;
        for key in keys {
            if self.remove(key.as_ref())? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Value stored under `key`.
    pub fn find(&self, key: &[u8]) -> Result<Option<BytesBuffer>, Error> {
        self.inner.check_open()?;
        let mut session = self.inner.session();
        let mut value = BytesBuffer::default();
        let mut attempt = 0;
        loop {
            let capacity = session.value_capacity();
            value.ensure_capacity(capacity);
            let loaded = self
                .inner
                .store
                .get(key, &mut value.raw_mut()[..capacity])
                .map_err(|err| Error::store("db.get", err, &self.inner.description))?;
            match loaded {
                None => return Ok(None),
                Some(Load::Loaded { value_len, .. }) => {
                    value.set_len(value_len);
                    return Ok(Some(value));
                }
                Some(Load::BufferSmall { value_len, .. }) => {
                    attempt += 1;
                    session.accommodate(0, value_len, attempt)?;
                }
            }
        }
    }

    /// Cursor over `range` in `direction`, skipping `skip` records and
    /// yielding at most `take`.
    pub fn query(
        &self,
        range: Range,
        direction: Direction,
        skip: usize,
        take: Take,
    ) -> Result<Cursor<'_, B>, Error> {
        self.inner.check_open()?;
        Cursor::open(&self.inner, range, direction, skip, take)
    }

    /// Ascending cursor over every record.
    pub fn query_all(&self) -> Result<Cursor<'_, B>, Error> {
        self.query(Range::line(), Direction::Ascending, 0, Take::All)
    }

    /// Number of records inside `range`. Needs record numbers.
    pub fn get_count(&self, range: Range) -> Result<usize, Error> {
        let mut cursor = self.query(range, Direction::Ascending, 0, Take::All)?;
        let count = cursor.total_count();
        cursor.close();
        count
    }

    /// Merge the records of every range of `query` into one table.
    pub fn fetch(
        &self,
        query: &MultiRangeQuery,
        projection: Projection,
    ) -> Result<BytesTable, Error> {
        self.inner.check_open()?;
        let inner = &*self.inner;
        if query.ranges.is_empty() {
            return Err(Error::configuration(
                "multi range query has no ranges",
                &inner.description,
            ));
        }
        let limit = query.take.limit();
        let per_range = limit.map(|limit| limit.saturating_add(query.skip));
        let mut readers = Vec::with_capacity(query.ranges.len());
        for range in &query.ranges {
            let reader = RangeReader::open(
                &inner.store,
                &inner.description,
                range.clone(),
                query.direction,
                0,
                per_range,
            )
            .map_err(|err| err.into_error(&inner.description))?;
            readers.push(reader);
        }
        let mut merge = MergeReader::new(
            readers,
            query.direction,
            query.key_suffix_offset,
            query.skip,
            limit,
        );
        let table = inner.session().fetch(
            &mut merge,
            projection,
            limit,
            inner.option.default_batch_rows,
        );
        merge.release();
        table
    }

    /// Close the store and stop tracking it in the environment. Failures are
    /// logged; closing twice is a no-op.
    pub fn close(&self) {
        self.inner.close();
    }
}

fn check_fits(column: &ColumnBuffer, len: usize) -> Result<(), Error> {
    match column.config() {
        BufferConfig::Fixed(size) if len > size => Err(Error::CapacityExceeded {
            side: column.side(),
            required: len,
            size,
            context: column.description().to_owned(),
        }),
        _ => Ok(()),
    }
}

pub(crate) fn log_dispose_failed(api: &str, err: &EngineError, context: &str) {
    rangefetch_log!(
        log::Level::Error,
        ctx: LIFECYCLE_LOG_CTX,
        "dispose_failed",
        "api={} {} context=\"{}\"",
        api,
        err,
        context,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::MemoryBackend;

    fn environment() -> Environment<MemoryBackend> {
        Environment::open(MemoryBackend::new(), EnvironmentOption::from("/data/main.db"))
            .expect("open environment")
    }

    #[test]
    fn descriptions_name_file_and_database() {
        let env = environment();
        let db = env
            .attach_database(DatabaseOption::from("users"))
            .expect("attach");
        assert_eq!(env.description(), "environment (file name [/data/main.db])");
        assert_eq!(
            db.description(),
            "database (file name [/data/main.db], database name [users])"
        );
        assert!(env.database_by_name("users").is_some());
        assert!(env.database_by_name("orders").is_none());
    }

    #[test]
    fn fixed_buffer_below_minimum_is_rejected() {
        let env = environment();
        let err = env
            .attach_database(DatabaseOption::from("tiny").value_buffer(BufferConfig::fixed(3)))
            .err()
            .expect("too small");
        assert!(matches!(err, Error::Configuration { .. }), "{err:?}");
        assert!(err.to_string().contains("values, database"));
    }

    #[test]
    fn find_grows_value_buffer() {
        let env = environment();
        let db = env
            .attach_database(DatabaseOption::from("main").value_buffer(BufferConfig::growable(4)))
            .expect("attach");
        db.put(&[1], &[7; 9]).expect("put");
        let found = db.find(&[1]).expect("find").expect("present");
        assert_eq!(found.as_slice(), &[7; 9]);
        assert!(db.find(&[2]).expect("find").is_none());
    }
}

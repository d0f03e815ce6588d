//! Common test utilities for integration tests.
#![allow(dead_code)]

use std::sync::{Mutex, Once};

use log::{LevelFilter, Log, Metadata, Record};
use rangefetch::{
    BytesTable, Database, DatabaseOption, Environment, EnvironmentOption, MemoryBackend,
};
use tempfile::TempDir;

/// Environment over a fresh in-memory backend whose description points into a
/// temporary directory.
pub struct TestEnv {
    pub dir: TempDir,
    pub backend: MemoryBackend,
    pub env: Environment<MemoryBackend>,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let backend = MemoryBackend::new();
        let env = Environment::open(
            backend.clone(),
            EnvironmentOption::from(dir.path().join("data.db")),
        )
        .expect("open environment");
        TestEnv { dir, backend, env }
    }

    pub fn attach(&self, option: DatabaseOption) -> Database<MemoryBackend> {
        self.env.attach_database(option).expect("attach database")
    }

    pub fn attach_with(
        &self,
        option: DatabaseOption,
        records: &[(&[u8], &[u8])],
    ) -> Database<MemoryBackend> {
        let db = self.attach(option);
        for (key, value) in records {
            db.put(key, value).expect("put record");
        }
        db
    }
}

/// Every valid cell of `column`, copied out.
pub fn column(table: &BytesTable, column: usize) -> Vec<Vec<u8>> {
    table
        .map_column(column, |cell| cell.to_vec())
        .expect("column cells")
}

/// `(start, length)` of every valid cell of `column`.
pub fn positions(table: &BytesTable, column: usize) -> Vec<(u32, u32)> {
    let columns = table.columns_count();
    table.positions()[..table.rows_count() * columns]
        .iter()
        .skip(column)
        .step_by(columns)
        .map(|position| (position.start, position.length))
        .collect()
}

struct CaptureLogger {
    lines: Mutex<Vec<String>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target() == "rangefetch"
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.lines
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(format!("{} {}", record.level(), record.args()));
        }
    }

    fn flush(&self) {}
}

static CAPTURE: CaptureLogger = CaptureLogger {
    lines: Mutex::new(Vec::new()),
};

/// Route crate logs into an in-process buffer. Safe to call from every test.
pub fn capture_logs() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        log::set_logger(&CAPTURE).expect("logger installed once");
        log::set_max_level(LevelFilter::Trace);
    });
}

/// Captured lines containing every fragment.
pub fn logged(fragments: &[&str]) -> Vec<String> {
    CAPTURE
        .lines
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .iter()
        .filter(|line| fragments.iter().all(|fragment| line.contains(fragment)))
        .cloned()
        .collect()
}

use std::iter::repeat_with;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rangefetch::{
    BufferConfig, Database, DatabaseOption, Direction, Environment, EnvironmentOption,
    MemoryBackend, MultiRangeQuery, Projection, Range,
};

const PREFIXES: u8 = 8;
const RECORDS_PER_PREFIX: usize = 2048;

fn populate(value_buffer: BufferConfig) -> (Environment<MemoryBackend>, Database<MemoryBackend>) {
    let env = Environment::open(MemoryBackend::new(), EnvironmentOption::from("/tmp/rangefetch"))
        .unwrap();
    let db = env
        .attach_database(
            DatabaseOption::from("bench")
                .record_numbers(true)
                .value_buffer(value_buffer),
        )
        .unwrap();
    for prefix in 0..PREFIXES {
        for _ in 0..RECORDS_PER_PREFIX {
            let mut key = vec![prefix];
            key.extend(repeat_with(|| fastrand::u8(..)).take(8));
            let len = fastrand::usize(1..64);
            let value: Vec<u8> = repeat_with(|| fastrand::u8(..)).take(len).collect();
            db.put(&key, &value).unwrap();
        }
    }
    (env, db)
}

fn merged_fetch(c: &mut Criterion) {
    let mut group = c.benchmark_group("merged_fetch");

    for (name, buffer) in [
        ("growable", BufferConfig::growable(4)),
        ("presized", BufferConfig::fixed(64)),
    ] {
        let (_env, db) = populate(buffer);
        for ranges in [1u8, 4, PREFIXES] {
            let query = MultiRangeQuery::new(
                (0..ranges).map(|prefix| Range::prefix([prefix])),
                Direction::Ascending,
            )
            .key_suffix_offset(1)
            .take(4096);
            group.bench_with_input(BenchmarkId::new(name, ranges), &query, |b, query| {
                b.iter(|| db.fetch(query, Projection::KeysAndValues).unwrap())
            });
        }
    }
    group.finish();
}

fn cursor_reads(c: &mut Criterion) {
    let (_env, db) = populate(BufferConfig::growable(4));
    c.bench_function("cursor_read_all", |b| {
        b.iter(|| {
            let mut cursor = db.query_all().unwrap();
            let mut bytes = 0usize;
            while let Some(record) = cursor.read().unwrap() {
                bytes += record.value.len();
            }
            bytes
        })
    });
    c.bench_function("get_count", |b| {
        b.iter(|| db.get_count(Range::prefix([3u8])).unwrap())
    });
}

criterion_group!(benches, merged_fetch, cursor_reads);
criterion_main!(benches);

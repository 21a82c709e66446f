//! Criterion benchmarks for rust_db_migrator

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_db_migrator::core::migration::migration_name;
use rust_db_migrator::prelude::*;
use std::sync::Arc;

fn sqlite_registry() -> Arc<ConnectionRegistry> {
    let registry = Arc::new(ConnectionRegistry::new());
    registry
        .add_database("sqlite", DEFAULT_CONNECTION)
        .expect("Failed to add connection");
    registry
}

// ============================================================================
// Cursor Navigation Benchmarks
// ============================================================================

fn bench_cursor_navigation(c: &mut Criterion) {
    let registry = sqlite_registry();
    let connection = registry.connection(DEFAULT_CONNECTION).unwrap();
    connection
        .unprepared("CREATE TABLE numbers (n INTEGER NOT NULL)")
        .unwrap();
    connection.transaction();
    for n in 0..1000 {
        connection
            .statement("INSERT INTO numbers (n) VALUES (?)", &[n.into()])
            .unwrap();
    }
    connection.commit();

    let mut group = c.benchmark_group("cursor_navigation");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("select_and_iterate", |b| {
        b.iter(|| {
            let mut query = connection.select("SELECT n FROM numbers", &[]).unwrap();
            let mut sum = 0i64;
            while query.next() {
                sum += query.value(0).as_long().unwrap_or_default();
            }
            black_box(sum)
        });
    });

    let mut query = connection.select("SELECT n FROM numbers", &[]).unwrap();

    group.bench_function("forward_then_backward", |b| {
        b.iter(|| {
            let mut visited = 0;
            while query.next() {
                visited += 1;
            }
            while query.previous() {
                visited += 1;
            }
            black_box(visited)
        });
    });

    for offset in [1i64, 10, 100] {
        group.bench_with_input(BenchmarkId::new("relative_seek", offset), &offset, |b, &offset| {
            b.iter(|| {
                query.first();
                while query.seek(black_box(offset), true) {}
                black_box(query.at())
            });
        });
    }

    group.finish();
}

// ============================================================================
// Migrator Benchmarks
// ============================================================================

fn migrations(count: usize) -> Vec<Arc<dyn Migration>> {
    (0..count)
        .map(|i| {
            Arc::new(SqlMigration::new(
                format!("2024_01_01_{:06}_create_table_{}", i, i),
                format!("CREATE TABLE table_{} (id INTEGER PRIMARY KEY, name TEXT)", i),
                format!("DROP TABLE table_{}", i),
            )) as Arc<dyn Migration>
        })
        .collect()
}

fn bench_migrator(c: &mut Criterion) {
    let mut group = c.benchmark_group("migrator");

    group.bench_function("migration_name", |b| {
        b.iter(|| migration_name(black_box("_2024_01_01_000000_create_users_table")))
    });

    for count in [10usize, 50] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("run_and_reset", count), &count, |b, &count| {
            let registry = sqlite_registry();
            let repository = MigrationRepository::new(Arc::clone(&registry));
            let migrator =
                Migrator::new(repository, Arc::clone(&registry), migrations(count)).unwrap();
            migrator.install().unwrap();

            b.iter(|| {
                migrator.run(MigrateOptions::default()).unwrap();
                migrator.reset(false).unwrap();
                migrator.take_notes();
            });
        });

        group.bench_with_input(BenchmarkId::new("pretend_run", count), &count, |b, &count| {
            let registry = sqlite_registry();
            let repository = MigrationRepository::new(Arc::clone(&registry));
            let migrator =
                Migrator::new(repository, Arc::clone(&registry), migrations(count)).unwrap();
            migrator.install().unwrap();

            b.iter(|| {
                black_box(migrator.run(MigrateOptions::pretend()).unwrap());
                migrator.take_notes();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_cursor_navigation, bench_migrator);
criterion_main!(benches);

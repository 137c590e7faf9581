#![allow(missing_docs)]

//! Benchmarks for the identity engine hot paths.
//!
//! Renumbering and duplicate scans run over a full collection snapshot on
//! every mutation, so their cost over realistic collection sizes is what
//! bounds API latency.

use case_registry::dedup::find_duplicates;
use case_registry::renumber::plan_renumber;
use case_registry::slug::slugify;
use case_registry::{CaseRecord, CaseType, StoredCase};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// Builds a drifted collection: imported keys, no derived identity, with
/// every tenth case sharing a client and year with its predecessor.
fn synthetic_cases(count: usize) -> Vec<StoredCase> {
    (0..count)
        .map(|i| {
            let duplicate_of_previous = i > 0 && i % 10 == 0;
            let base = if duplicate_of_previous { i - 1 } else { i };
            let record = CaseRecord {
                name: format!("Cliente {base}"),
                year: Some(2000 + (base % 25) as i32),
                month: Some((base % 12) as u32 + 1),
                case_type: Some(CaseType::Antigo),
                ..Default::default()
            };
            StoredCase::new(format!("import-{i:05}"), record)
        })
        .collect()
}

fn slugify_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("slugify");

    group.bench_function("accented_name", |b| {
        b.iter(|| black_box(slugify(black_box("Ação Declaratória São João & Cia."))));
    });

    group.bench_function("plain_name", |b| {
        b.iter(|| black_box(slugify(black_box("Silva"))));
    });

    group.finish();
}

fn plan_renumber_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_renumber");

    for case_count in [100_usize, 1_000, 5_000] {
        let cases = synthetic_cases(case_count);
        group.bench_function(format!("drifted_{case_count}"), |b| {
            b.iter(|| {
                let plan = plan_renumber(1, CaseType::Antigo, black_box(&cases), false);
                black_box(plan.changes.len());
            });
        });
    }

    group.finish();
}

fn find_duplicates_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_duplicates");

    for case_count in [100_usize, 1_000, 5_000] {
        let cases = synthetic_cases(case_count);
        group.bench_function(format!("ten_percent_dup_{case_count}"), |b| {
            b.iter(|| {
                let report = find_duplicates(black_box(&cases));
                black_box(report.group_count());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    slugify_benchmark,
    plan_renumber_benchmark,
    find_duplicates_benchmark
);
criterion_main!(benches);

//! Criterion benchmarks for slicer setup and bundle execution
//!
//! Run with: cargo bench -p maf_core

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use maf_core::{
    ColumnData, ColumnSet, InMemorySource, MetricBundle, Runner, SimpleMetric, SlicerSpec, Table,
    standard_summary,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn create_visits(n: usize) -> Table {
    let mut rng = StdRng::seed_from_u64(42);
    let ra: Vec<f64> = (0..n).map(|_| rng.random_range(0.0..360.0)).collect();
    let dec: Vec<f64> = (0..n)
        .map(|_| rng.random_range(-1.0f64..0.3).asin().to_degrees())
        .collect();
    Table::from_columns([
        ("fieldRA", ColumnData::Float(ra)),
        ("fieldDec", ColumnData::Float(dec)),
        (
            "airmass",
            ColumnData::Float((0..n).map(|_| rng.random_range(1.0..2.5)).collect()),
        ),
        (
            "fivesigma_modified",
            ColumnData::Float((0..n).map(|_| rng.random_range(23.0..25.0)).collect()),
        ),
    ])
    .expect("benchmark table")
}

fn bench_healpix_setup(c: &mut Criterion) {
    let mut group = c.benchmark_group("healpix_setup");
    let table = create_visits(100_000);

    for nside in [16u32, 32, 64].iter() {
        let spec = SlicerSpec::healpix(*nside, "fieldRA", "fieldDec");
        group.bench_with_input(BenchmarkId::from_parameter(nside), nside, |b, _| {
            b.iter(|| {
                let mut slicer = spec.build().expect("valid slicer");
                slicer.setup(black_box(&table)).expect("setup");
                slicer
            })
        });
    }

    group.finish();
}

fn bench_one_d_setup(c: &mut Criterion) {
    let table = create_visits(100_000);
    let spec = SlicerSpec::one_d("airmass", 50, None);
    c.bench_function("one_d_setup_100k", |b| {
        b.iter(|| {
            let mut slicer = spec.build().expect("valid slicer");
            slicer.setup(black_box(&table)).expect("setup");
            slicer
        })
    });
}

fn bench_bundle_run(c: &mut Criterion) {
    let table = create_visits(50_000);
    let available: ColumnSet = table.column_names().collect();
    let source = InMemorySource::new(table);
    let slicer = SlicerSpec::healpix(32, "fieldRA", "fieldDec");

    let template = vec![
        MetricBundle::builder(SimpleMetric::count("airmass").into_arc(), slicer.clone())
            .summary_metrics(standard_summary())
            .build(&available)
            .expect("bundle"),
        MetricBundle::builder(
            SimpleMetric::coaddm5("fivesigma_modified").into_arc(),
            slicer,
        )
        .summary_metrics(standard_summary())
        .build(&available)
        .expect("bundle"),
    ];

    c.bench_function("healpix_32_two_metrics", |b| {
        b.iter(|| {
            let mut bundles = template.clone();
            Runner::new(black_box(&source)).run(&mut bundles)
        })
    });
}

criterion_group!(
    benches,
    bench_healpix_setup,
    bench_one_d_setup,
    bench_bundle_run
);

criterion_main!(benches);

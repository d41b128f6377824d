//! Benchmarks for time-base rescaling.

use avbind_core::{rescale_rnd, Rounding, TimeBase};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_rescale(c: &mut Criterion) {
    let mut group = c.benchmark_group("rescale");

    group.bench_function("rescale_rnd", |b| {
        b.iter(|| {
            let mut acc = 0i64;
            for v in 0..1024i64 {
                acc = acc.wrapping_add(rescale_rnd(
                    black_box(v * 3003),
                    black_box(90_000),
                    black_box(30_000),
                    Rounding::NearInf,
                ));
            }
            acc
        })
    });

    let from = TimeBase::MPEG;
    let to = TimeBase::new(1, 48_000).unwrap();
    group.bench_function("time_base_rescale", |b| {
        b.iter(|| {
            let mut acc = 0i64;
            for v in 0..1024i64 {
                acc = acc.wrapping_add(from.rescale(black_box(v * 1920), to));
            }
            acc
        })
    });

    group.finish();
}

criterion_group!(benches, bench_rescale);
criterion_main!(benches);

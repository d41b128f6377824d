//! Benchmarks for audio reassembly.

use avbind_codecs::AudioFifo;
use avbind_core::TimeBase;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn bench_fifo(c: &mut Criterion) {
    let mut group = c.benchmark_group("audio_fifo");
    let time_base = TimeBase::from_sample_rate(48_000).unwrap();
    // Stereo s16: 4 bytes per sample.
    let input = vec![0u8; 4 * 4800];

    for frame in [576usize, 1024, 2048] {
        group.throughput(Throughput::Bytes(input.len() as u64 * 10));
        group.bench_with_input(BenchmarkId::new("push_pop", frame), &frame, |b, &frame| {
            b.iter(|| {
                let mut fifo = AudioFifo::new(4, 48_000, time_base);
                let mut frames = 0;
                for i in 0..10 {
                    fifo.push(black_box(&input), i * 4800);
                    while let Some(chunk) = fifo.pop_frame(frame) {
                        frames += chunk.valid_samples;
                    }
                }
                frames
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fifo);
criterion_main!(benches);

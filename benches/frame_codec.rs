//! Benchmarks for the probe frame hot path
//!
//! Covers per-packet encode (scratch-buffer encoder and one-shot), decode,
//! and the latency/jitter computation the receiver runs for each frame.

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use lan_audio_probe::codec::{self, FrameDecoder, FrameEncoder};
use lan_audio_probe::network::receiver::measure;
use std::hint::black_box;

/// 48 kHz, 256 frames, stereo 16-bit minus the header
const PAYLOAD_LEN: usize = 1012;

fn bench_encode(c: &mut Criterion) {
    let payload = vec![0u8; PAYLOAD_LEN];

    let mut group = c.benchmark_group("frame_encode");
    group.throughput(Throughput::Bytes((PAYLOAD_LEN + codec::HEADER_SIZE) as u64));

    let mut encoder = FrameEncoder::new(PAYLOAD_LEN);
    group.bench_function("frame_encoder", |b| {
        let mut index = 1u32;
        b.iter(|| {
            index = index.wrapping_add(1).max(1);
            black_box(encoder.encode(black_box(index), black_box(1_700_000_000_000_000_000), &payload))
        })
    });

    group.bench_function("one_shot", |b| {
        b.iter(|| black_box(codec::encode(black_box(7), black_box(1_700_000_000_000_000_000), &payload)))
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let frame = codec::encode(42, 1_700_000_000_000_000_000, &vec![0u8; PAYLOAD_LEN]);

    let mut group = c.benchmark_group("frame_decode");
    group.throughput(Throughput::Bytes(frame.len() as u64));

    let mut decoder = FrameDecoder::new();
    group.bench_function("frame_decoder", |b| {
        b.iter(|| black_box(decoder.decode(black_box(&frame))))
    });

    group.bench_function("peek_index", |b| {
        b.iter(|| black_box(codec::peek_index(black_box(&frame))))
    });

    group.finish();
}

fn bench_measure(c: &mut Criterion) {
    c.bench_function("latency_jitter", |b| {
        b.iter(|| {
            black_box(measure(
                black_box(1_700_000_000_004_000_000),
                black_box(1_700_000_000_000_000_000),
                black_box(0.0019),
            ))
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_measure);
criterion_main!(benches);

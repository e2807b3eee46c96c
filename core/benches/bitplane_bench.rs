//! Bit-plane throughput: embedding into and extracting from raw RGBA frames.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stego_core::stego::{embed_stream, BitEmbedder, BitExtractor, FrameTransform, PayloadEnvelope};

const WIDTH: usize = 640;
const HEIGHT: usize = 480;
const FRAME: usize = WIDTH * HEIGHT * 4;

fn carrier(frames: usize) -> Vec<u8> {
    (0..frames * FRAME).map(|i| (i * 31 % 251) as u8).collect()
}

fn bench_embed_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("embed_frame");
    group.throughput(Throughput::Bytes(FRAME as u64));

    for payload_len in [1_024usize, 16 * 1024, FRAME / 8 - 64] {
        let payload = vec![0xA5u8; payload_len];
        let frame = carrier(1);
        group.bench_with_input(BenchmarkId::from_parameter(payload_len), &payload, |b, payload| {
            b.iter(|| {
                let mut embedder = BitEmbedder::new(PayloadEnvelope::new(payload));
                let mut buf = frame.clone();
                embedder.apply(black_box(&mut buf)).unwrap();
                black_box(buf);
            });
        });
    }
    group.finish();
}

fn bench_embed_stream(c: &mut Criterion) {
    let raw = carrier(8);
    let payload = vec![0x3Cu8; 64 * 1024];
    let mut group = c.benchmark_group("embed_stream");
    group.throughput(Throughput::Bytes(raw.len() as u64));
    group.bench_function("8_frames_vga", |b| {
        b.iter(|| {
            let mut embedder = BitEmbedder::new(PayloadEnvelope::new(&payload));
            let mut out = Vec::with_capacity(raw.len());
            embed_stream(&mut raw.as_slice(), &mut out, &mut embedder, FRAME).unwrap();
            black_box(out);
        });
    });
    group.finish();
}

fn bench_extract(c: &mut Criterion) {
    let payload = vec![0x5Au8; 64 * 1024];
    let mut stego = carrier(8);
    let mut embedder = BitEmbedder::new(PayloadEnvelope::new(&payload));
    embedder.apply(&mut stego).unwrap();

    let mut group = c.benchmark_group("extract");
    group.throughput(Throughput::Bytes(((payload.len() + 12) * 8) as u64));
    group.bench_function("64k_payload", |b| {
        b.iter(|| {
            let mut extractor = BitExtractor::new();
            for chunk in stego.chunks(64 * 1024) {
                if extractor.push(black_box(chunk)).is_some() {
                    break;
                }
            }
            black_box(extractor.into_payload().unwrap());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_embed_frame, bench_embed_stream, bench_extract);
criterion_main!(benches);

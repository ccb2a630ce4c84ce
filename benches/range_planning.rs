//! Benchmarks for range planning and chunk streaming.
//!
//! Measures header parsing plus chunk math, boundary trimming, and an
//! end-to-end stream over the in-memory backend.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use futures::StreamExt;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use streamgate::backend::MemoryBackend;
use streamgate::streaming::{plan_range, ByteStreamer, ChunkPlan, ChunkStream, StreamSettings};
use streamgate_common::DcId;

const MIB: u64 = 1024 * 1024;

fn bench_plan_range(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_range");

    let headers = [
        ("none", None),
        ("prefix", Some("bytes=0-1023999")),
        ("open_ended", Some("bytes=5242880-")),
        ("unaligned", Some("bytes=1048577-734003199")),
        ("invalid", Some("bytes=9999999-5")),
    ];

    for (label, header) in headers {
        group.bench_function(label, |b| {
            b.iter(|| black_box(plan_range(black_box(800 * MIB), header, MIB)))
        });
    }

    group.finish();
}

fn bench_trim(c: &mut Criterion) {
    let mut group = c.benchmark_group("trim");
    let chunk = Bytes::from(vec![0u8; MIB as usize]);
    let plan = ChunkPlan {
        offset: 0,
        first_cut: 1234,
        last_cut: 999_000,
        part_count: 3,
        chunk_size: MIB,
    };

    group.throughput(Throughput::Bytes(MIB));
    for part in [1u64, 2, 3] {
        group.bench_function(format!("part_{part}"), |b| {
            b.iter(|| black_box(plan.trim(part, chunk.clone())))
        });
    }

    group.finish();
}

fn bench_stream(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("stream");

    for chunk_size in [64 * 1024u64, 256 * 1024, MIB] {
        let size = 8 * MIB;
        let backend = MemoryBackend::new();
        backend.insert_object(1, 2, DcId(2), None, None, vec![7u8; size as usize]);

        let settings = StreamSettings {
            chunk_size,
            ..StreamSettings::default()
        };
        let engine = rt.block_on(async {
            let identity = Arc::new(backend.identity("bench", DcId(2)));
            Arc::new(ByteStreamer::new(
                identity,
                Arc::new(AtomicUsize::new(0)),
                &settings,
            ))
        });
        let descriptor = rt.block_on(engine.resolve(1, 2)).unwrap();
        let plan = plan_range(size, Some("bytes=1000-8000000"), chunk_size).unwrap();

        group.throughput(Throughput::Bytes(plan.requested_length()));
        group.bench_function(format!("chunk_{chunk_size}"), |b| {
            b.to_async(&rt).iter(|| {
                let stream = engine.stream(descriptor.clone(), 0, plan.chunks);
                drain(stream)
            })
        });
    }

    group.finish();
}

async fn drain(mut stream: ChunkStream) -> usize {
    let mut total = 0;
    while let Some(Ok(chunk)) = stream.next().await {
        total += chunk.len();
    }
    black_box(total)
}

criterion_group!(benches, bench_plan_range, bench_trim, bench_stream);
criterion_main!(benches);

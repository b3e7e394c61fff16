//! Throughput Benchmark for ringpoll
//!
//! This benchmark measures the buffer and registry hot paths that run on
//! every readiness event.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use ringpoll::buffer::CircularBuffer;
use ringpoll::registry::{EventMask, Registry};
use std::io;

/// Benchmark appending then draining through a fixed-size buffer
fn bench_append_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_drain");

    for size in [64usize, 1024, 16 * 1024] {
        let payload = vec![b'x'; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("contiguous_{size}"), |b| {
            let mut buffer = CircularBuffer::with_capacity(64 * 1024).unwrap();
            let mut sink = io::sink();
            b.iter(|| {
                buffer.append(black_box(&payload), false).unwrap();
                black_box(buffer.drain_to(&mut sink).unwrap());
            });
        });

        group.bench_function(format!("wrapped_{size}"), |b| {
            // Start each pending range just short of the storage end
            let capacity = (2 * size).next_power_of_two();
            let lead = capacity - size / 2;
            let filler = vec![b'y'; lead];
            let mut buffer = CircularBuffer::with_capacity(capacity).unwrap();
            let mut sink = io::sink();
            b.iter(|| {
                buffer.append(&filler, false).unwrap();
                buffer.consume(lead);
                buffer.append(black_box(&payload), false).unwrap();
                black_box(buffer.drain_to(&mut sink).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark growth from a small buffer
fn bench_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("growth");
    let payload = vec![b'x'; 64 * 1024];
    group.throughput(Throughput::Bytes(payload.len() as u64));

    group.bench_function("grow_64_to_64k", |b| {
        b.iter(|| {
            let mut buffer = CircularBuffer::with_capacity(64).unwrap();
            buffer.append(black_box(&payload), true).unwrap();
            black_box(buffer.capacity());
        });
    });

    group.bench_function("grow_in_chunks", |b| {
        b.iter(|| {
            let mut buffer = CircularBuffer::with_capacity(64).unwrap();
            for chunk in payload.chunks(1500) {
                buffer.append(chunk, true).unwrap();
            }
            black_box(buffer.len());
        });
    });

    group.finish();
}

/// Benchmark copying pending bytes out
fn bench_read_side(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_side");
    let payload = vec![b'x'; 4096];
    group.throughput(Throughput::Bytes(payload.len() as u64));

    group.bench_function("take", |b| {
        let mut buffer = CircularBuffer::with_capacity(8192).unwrap();
        b.iter(|| {
            buffer.append(&payload, false).unwrap();
            black_box(buffer.take(usize::MAX));
        });
    });

    group.bench_function("read_into", |b| {
        let mut buffer = CircularBuffer::with_capacity(8192).unwrap();
        let mut dst = vec![0u8; payload.len()];
        b.iter(|| {
            buffer.append(&payload, false).unwrap();
            black_box(buffer.read_into(&mut dst));
        });
    });

    group.finish();
}

/// Benchmark registry churn: connections joining and leaving mid-list
fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");
    group.throughput(Throughput::Elements(1));

    for watched in [16usize, 1024] {
        group.bench_function(format!("remove_add_{watched}"), |b| {
            let mut registry = Registry::with_capacity(watched + 1).unwrap();
            for fd in 0..watched as i32 {
                registry.add_or_update(fd, EventMask::CONNECTION).unwrap();
            }
            let middle = watched as i32 / 2;
            b.iter(|| {
                registry.remove(black_box(middle));
                registry.add_or_update(middle, EventMask::CONNECTION).unwrap();
            });
        });

        group.bench_function(format!("update_{watched}"), |b| {
            let mut registry = Registry::with_capacity(watched).unwrap();
            for fd in 0..watched as i32 {
                registry.add_or_update(fd, EventMask::CONNECTION).unwrap();
            }
            let last = watched as i32 - 1;
            b.iter(|| {
                registry.add_or_update(black_box(last), EventMask::READABLE).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_append_drain,
    bench_growth,
    bench_read_side,
    bench_registry,
);

criterion_main!(benches);

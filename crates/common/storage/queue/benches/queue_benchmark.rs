// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Benchmarks for the disk queue.
//!
//! Measures:
//! - Single put latency at different payload sizes
//! - Put throughput with count-based syncing
//! - Put-then-drain throughput through the read channel

use std::{hint::black_box, time::Duration};

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use queue::{DiskQueue, QueueBuilder};
use tempfile::TempDir;

/// Payload sizes to benchmark (bytes)
const MESSAGE_SIZES: &[usize] = &[64, 256, 1024, 4096, 16384];

/// Number of records for throughput tests
const BATCH_SIZE: usize = 10_000;

fn create_queue(temp_dir: &TempDir, sync_every: u64) -> DiskQueue {
    QueueBuilder::new("bench", temp_dir.path())
        .max_bytes_per_file(256 * 1024 * 1024)
        .max_msg_size(1024 * 1024)
        .sync_every(sync_every)
        .sync_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

fn generate_message(size: usize) -> Vec<u8> { vec![0xABu8; size] }

// =============================================================================
// Single Put Latency
// =============================================================================

fn bench_put_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_latency");

    for &size in MESSAGE_SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let queue = create_queue(&temp_dir, 2500);
            let msg = generate_message(size);

            b.iter(|| {
                queue.put(black_box(&msg)).unwrap();
            });

            queue.delete().unwrap();
        });
    }

    group.finish();
}

/// Every put persists metadata and fsyncs the segment.
fn bench_put_latency_sync_every(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_latency_sync_every");
    group.sample_size(20);

    for &size in &[64, 1024] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let queue = create_queue(&temp_dir, 1);
            let msg = generate_message(size);

            b.iter(|| {
                queue.put(black_box(&msg)).unwrap();
            });

            queue.delete().unwrap();
        });
    }

    group.finish();
}

// =============================================================================
// Throughput
// =============================================================================

fn bench_put_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_throughput");
    group.sample_size(20);

    for &size in MESSAGE_SIZES {
        group.throughput(Throughput::Bytes((size * BATCH_SIZE) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let temp_dir = TempDir::new().unwrap();
                    let queue = create_queue(&temp_dir, 2500);
                    (temp_dir, queue, generate_message(size))
                },
                |(temp_dir, queue, msg)| {
                    for _ in 0..BATCH_SIZE {
                        queue.put(black_box(&msg)).unwrap();
                    }
                    queue.close().unwrap();
                    drop(temp_dir);
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

fn bench_put_then_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_then_drain");
    group.sample_size(10);

    for &size in &[64, 1024] {
        group.throughput(Throughput::Elements(BATCH_SIZE as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let temp_dir = TempDir::new().unwrap();
                    let queue = create_queue(&temp_dir, 2500);
                    let msg = generate_message(size);
                    for _ in 0..BATCH_SIZE {
                        queue.put(&msg).unwrap();
                    }
                    (temp_dir, queue)
                },
                |(temp_dir, queue)| {
                    let rx = queue.read_chan();
                    for _ in 0..BATCH_SIZE {
                        black_box(rx.recv().unwrap());
                    }
                    queue.close().unwrap();
                    drop(temp_dir);
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_put_latency,
    bench_put_latency_sync_every,
    bench_put_throughput,
    bench_put_then_drain,
);
criterion_main!(benches);

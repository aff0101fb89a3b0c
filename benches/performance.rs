use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shardlist::SkipList;
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

const DATASET_SIZE: u64 = 100_000;

/// Pre-populates the list with a fixed set of keys.
fn setup_list() -> Arc<SkipList> {
    let list = Arc::new(SkipList::new());
    for i in 0..DATASET_SIZE {
        list.insert(format!("key{:08}", i), format!("value{}", i), i + 1);
    }
    list
}

/// --- Concurrent Reads Benchmark ---
fn bench_concurrent_reads(c: &mut Criterion) {
    let list = setup_list();
    let mut group = c.benchmark_group("Concurrent Reads (contain)");

    for &num_threads in &[1usize, 2, 4, 8] {
        let ops_per_thread = 10_000 / num_threads;
        group.throughput(Throughput::Elements((num_threads * ops_per_thread) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_threads),
            &num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let handles: Vec<_> = (0..num_threads)
                        .map(|t| {
                            let list = Arc::clone(&list);
                            thread::spawn(move || {
                                let mut rng = StdRng::seed_from_u64(t as u64);
                                for _ in 0..ops_per_thread {
                                    let key =
                                        format!("key{:08}", rng.gen_range(0..DATASET_SIZE));
                                    black_box(list.contain(key.as_bytes(), u64::MAX));
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }
    group.finish();
}

/// --- Concurrent Writes Benchmark ---
fn bench_concurrent_writes(c: &mut Criterion) {
    let list = Arc::new(SkipList::new());
    let next_seq = Arc::new(AtomicU64::new(1));
    let mut group = c.benchmark_group("Concurrent Writes (insert)");

    for &num_threads in &[1usize, 2, 4, 8] {
        let ops_per_thread = 5_000 / num_threads;
        group.throughput(Throughput::Elements((num_threads * ops_per_thread) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_threads),
            &num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let handles: Vec<_> = (0..num_threads)
                        .map(|t| {
                            let list = Arc::clone(&list);
                            let next_seq = Arc::clone(&next_seq);
                            thread::spawn(move || {
                                let mut rng = StdRng::seed_from_u64(t as u64);
                                for _ in 0..ops_per_thread {
                                    let key =
                                        format!("key{:08}", rng.gen_range(0..DATASET_SIZE));
                                    let seq = next_seq.fetch_add(1, Ordering::Relaxed);
                                    black_box(list.insert(key, "payload", seq));
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }
    group.finish();
}

/// --- Flush Benchmark ---
fn bench_flush(c: &mut Criterion) {
    let list = setup_list();
    c.bench_function("Flush (100k keys)", |b| {
        b.iter(|| black_box(list.flush()));
    });
}

criterion_group!(
    benches,
    bench_concurrent_reads,
    bench_concurrent_writes,
    bench_flush
);
criterion_main!(benches);

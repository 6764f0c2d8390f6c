use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use token_cache_core::cache::engine::CacheEngine;
use token_cache_core::cache::OptimizationAdmission;
use token_cache_core::compression::CompressionCodec;
use token_cache_core::token_counter::TokenCounter;

fn bench_cache_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_engine");

    group.bench_function("set_small_entry", |b| {
        let dir = tempfile::tempdir().unwrap();
        let engine = CacheEngine::open(dir.path(), 64 * 1024 * 1024).unwrap();
        let mut i: u64 = 0;
        b.iter(|| {
            i += 1;
            engine.set(format!("key-{i}").into_bytes(), b"a small cached value".to_vec(), 21, 21).unwrap();
        });
    });

    group.bench_function("get_hot_tier_hit", |b| {
        let dir = tempfile::tempdir().unwrap();
        let engine = CacheEngine::open(dir.path(), 64 * 1024 * 1024).unwrap();
        engine.set(b"warm-key".to_vec(), b"cached payload".to_vec(), 14, 14).unwrap();
        b.iter(|| black_box(engine.get(b"warm-key").unwrap()));
    });

    for size in [1_000usize, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("evict_lru", size), &size, |b, &size| {
            let dir = tempfile::tempdir().unwrap();
            let engine = CacheEngine::open(dir.path(), 4 * 1024 * 1024).unwrap();
            for i in 0..size {
                engine.set(format!("evict-key-{i}").into_bytes(), vec![0u8; 64], 64, 64).unwrap();
            }
            b.iter(|| engine.evict_lru(1024).unwrap());
        });
    }

    group.finish();
}

fn bench_compression_admission(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimization_admission");

    let repetitive = "the quick brown fox jumps over the lazy dog ".repeat(500);
    let mut random_text = String::new();
    let mut x: u32 = 0xC0FF_EE11;
    for _ in 0..20_000 {
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        random_text.push(char::from(b'a' + (x % 26) as u8));
    }

    group.bench_function("compress_highly_repetitive_text", |b| {
        let codec = CompressionCodec::new();
        b.iter(|| black_box(codec.compress(repetitive.as_bytes(), Some(11)).unwrap()));
    });

    group.bench_function("compress_high_entropy_text", |b| {
        let codec = CompressionCodec::new();
        b.iter(|| black_box(codec.compress(random_text.as_bytes(), Some(11)).unwrap()));
    });

    group.bench_function("admit_repetitive_text_end_to_end", |b| {
        let dir = tempfile::tempdir().unwrap();
        let engine = CacheEngine::open(dir.path(), 64 * 1024 * 1024).unwrap();
        let codec = Arc::new(CompressionCodec::new());
        let tokens = Arc::new(TokenCounter::new(1_000, Duration::from_secs(60)).unwrap());
        let admission = OptimizationAdmission::new(engine, codec, tokens, 500, 11);
        let mut i: u64 = 0;
        b.iter(|| {
            i += 1;
            black_box(admission.optimize_with_key(format!("admit-{i}").into_bytes(), &repetitive).unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_cache_engine, bench_compression_admission);
criterion_main!(benches);

//! Throughput of the hot cache paths: compiling fresh scripts, resolving an
//! `EVALSHA` hit, and running a cached script (which touches its LRU
//! position). Grounded on the teacher's `benches/pyexec_bench.rs` layout:
//! one Criterion group per operation, a shared fixture builder, black-boxed
//! inputs.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use script_core::{CacheConfig, EngineOwner, EngineRegistry, FlagSet, ReclamationPool, ScriptCache, SubsystemMode};
use script_core::DemoEngine;

fn fixture() -> (ScriptCache, EngineRegistry) {
    let registry = EngineRegistry::new();
    registry
        .register("demo", EngineOwner::Builtin, Arc::new(DemoEngine::new()), false)
        .expect("register demo engine");
    let cache = ScriptCache::new(CacheConfig::default(), Arc::new(ReclamationPool::new(1)));
    (cache, registry)
}

fn bench_compile_fresh_script(c: &mut Criterion) {
    let (cache, registry) = fixture();
    let mut i: u64 = 0;
    c.bench_function("compile_fresh_script", |b| {
        b.iter(|| {
            i += 1;
            let body = format!("#!demo\nset x {i}");
            black_box(
                cache
                    .compile_and_store(&registry, body.as_bytes(), SubsystemMode::AdHoc, false)
                    .expect("compile"),
            )
        })
    });
}

fn bench_evalsha_hit(c: &mut Criterion) {
    let (cache, registry) = fixture();
    let digest = cache
        .compile_and_store(&registry, b"#!demo\nset x 1", SubsystemMode::AdHoc, false)
        .expect("compile");
    c.bench_function("evalsha_pre_resolve_hit", |b| {
        b.iter(|| black_box(cache.pre_resolve(black_box(&digest), None, FlagSet::COMPAT_MODE)))
    });
}

fn bench_run_cached_script(c: &mut Criterion) {
    let (cache, registry) = fixture();
    let digest = cache
        .compile_and_store(&registry, b"#!demo\nset x 1\nget x", SubsystemMode::AdHoc, false)
        .expect("compile");
    c.bench_function("run_cached_script", |b| {
        b.iter(|| black_box(cache.run(&registry, black_box(&digest), &[], &[]).expect("run")))
    });
}

criterion_group!(benches, bench_compile_fresh_script, bench_evalsha_hit, bench_run_cached_script);
criterion_main!(benches);

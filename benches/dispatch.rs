use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};

use mountreg::storage::MemoryStorage;
use mountreg::{Mount, Registry, RegistryConfig, RegistryContext, Resource};

fn gen_indices(n: usize, count: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count).map(|_| rng.gen_range(0..n)).collect()
}

fn seeded(n: usize, cache_enabled: bool) -> Registry {
    let config = RegistryConfig { cache_enabled, ..RegistryConfig::default() }
        .with_mount(Mount::symlink("/alias", "/data"))
        .with_mount(Mount::symlink("/nested", "/alias"));
    let ctx = RegistryContext::new(config, Arc::new(MemoryStorage::new()));
    let reg = ctx.system_registry().expect("registry");
    for i in 0..n {
        reg.put(&format!("/data/doc{i}"), Resource::new().with_content(format!("body {i}"))).expect("seed");
    }
    reg
}

fn bench_dispatch(c: &mut Criterion) {
    let ns = [1_000usize, 10_000usize];
    let lookups = 1_000usize;
    let mut group = c.benchmark_group("dispatch_get");
    group.sample_size(20);

    for &n in &ns {
        let reg = seeded(n, false);
        let cached = seeded(n, true);
        let idxs = gen_indices(n, lookups, 0xBEEF_CAFE);
        group.throughput(Throughput::Elements(lookups as u64));

        for (label, root, registry) in [
            ("direct", "/data", &reg),
            ("one_link", "/alias", &reg),
            ("two_links", "/nested", &reg),
            ("two_links_cached", "/nested", &cached),
        ] {
            group.bench_with_input(BenchmarkId::new(label, n.to_string()), &n, |b, _| {
                b.iter(|| {
                    let mut bytes = 0usize;
                    for &i in &idxs {
                        if let Ok(r) = registry.get(&format!("{root}/doc{i}")) {
                            bytes += r.content.map(|c| c.len()).unwrap_or(0);
                        }
                    }
                    criterion::black_box(bytes);
                });
            });
        }
    }
    group.finish();

    let mut group = c.benchmark_group("dispatch_put");
    group.sample_size(20);
    let reg = seeded(0, false);
    group.bench_function("put_through_link", |b| {
        let mut rng = StdRng::seed_from_u64(0xFACE_FEED);
        b.iter(|| {
            let i: u32 = rng.gen_range(0..10_000);
            let _ = reg.put(&format!("/alias/w{i}"), Resource::new().with_content("x"));
        });
    });
    group.finish();
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);

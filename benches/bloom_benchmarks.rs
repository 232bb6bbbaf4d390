use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::{Rng, distr::Alphanumeric};
use serde_json::json;
use tiered_bloom::{
    BloomFilter, Codec, FilterConfigBuilder, HashStrategy, StateStore, bloom::canonical_form,
};

// Helper function to generate random string data
fn generate_random_string(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn generate_test_data(count: usize) -> Vec<String> {
    (0..count).map(|_| generate_random_string(32)).collect()
}

fn create_bloom_filter(capacity: usize, strategy: HashStrategy) -> BloomFilter {
    let config = FilterConfigBuilder::default()
        .expected_elements(capacity)
        .false_positive_rate(0.01)
        .hash_strategy(strategy)
        .build()
        .expect("Failed to build filter config");
    BloomFilter::new(config).expect("Failed to create Bloom filter")
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_operations");

    for capacity in [100, 1_000, 10_000] {
        let test_data = generate_test_data(capacity);

        let strategies = [("murmur", HashStrategy::Murmur), ("digest", HashStrategy::Digest)];
        for (name, strategy) in strategies {
            group.bench_with_input(
                BenchmarkId::new(name, capacity),
                &test_data,
                |b, data| {
                    b.iter_batched(
                        || create_bloom_filter(capacity, strategy),
                        |mut filter| {
                            for item in data.iter() {
                                filter.add(item.as_str()).expect("insert failed");
                            }
                        },
                        criterion::BatchSize::SmallInput,
                    )
                },
            );
        }
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_operations");
    let capacity = 10_000;
    let members = generate_test_data(capacity);
    let strangers = generate_test_data(1_000);

    let mut filter = create_bloom_filter(capacity, HashStrategy::Murmur);
    for item in &members {
        filter.add(item.as_str()).expect("insert failed");
    }

    group.bench_function("members", |b| {
        b.iter(|| {
            for item in members.iter().take(1_000) {
                criterion::black_box(filter.has(item.as_str()).expect("query failed"));
            }
        })
    });

    group.bench_function("strangers", |b| {
        b.iter(|| {
            for item in &strangers {
                criterion::black_box(filter.has(item.as_str()).expect("query failed"));
            }
        })
    });

    group.finish();
}

fn bench_canonical_form(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonical_form");
    let record = json!({
        "email": "alice@example.com",
        "tags": ["admin", "ops"],
        "profile": {"age": 30, "active": true}
    });

    group.bench_function("string", |b| {
        b.iter(|| canonical_form(criterion::black_box("alice@example.com")))
    });
    group.bench_function("object", |b| {
        b.iter(|| canonical_form(criterion::black_box(&record)))
    });

    group.finish();
}

fn bench_persistence(c: &mut Criterion) {
    let mut group = c.benchmark_group("persistence");
    group.sample_size(10);

    let mut filter = create_bloom_filter(100_000, HashStrategy::Murmur);
    for item in generate_test_data(10_000) {
        filter.add(item.as_str()).expect("insert failed");
    }
    let payload = filter
        .export_state()
        .to_bytes()
        .expect("Failed to serialize state");

    let codec = Codec::new();
    let blob = codec
        .encrypt(&payload, "bench-password")
        .expect("Failed to encrypt");

    group.bench_function("encrypt", |b| {
        b.iter(|| codec.encrypt(&payload, "bench-password"))
    });
    group.bench_function("decrypt", |b| {
        b.iter(|| codec.decrypt(&blob, "bench-password"))
    });

    let path = std::env::temp_dir().join(format!("bench_state_{}.state", rand::random::<u64>()));
    let location = path.to_string_lossy().to_string();
    let store = StateStore::file();
    let state = filter.export_state();

    group.bench_function("save_file", |b| {
        b.iter(|| store.save(&state, &location, "bench-password"))
    });
    group.bench_function("load_file", |b| {
        b.iter(|| store.load(&location, "bench-password"))
    });

    group.finish();
    let _ = std::fs::remove_file(&path);
}

criterion_group!(
    benches,
    bench_insert,
    bench_query,
    bench_canonical_form,
    bench_persistence
);
criterion_main!(benches);

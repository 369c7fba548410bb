use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pokespeare::{
    build_mediator, CacheConfig, CacheStore, GetTranslatedDescription, InMemoryCache,
    PokemonDataProvider, Translation, TranslationProvider, UpstreamError,
};
use rand::{seq::SliceRandom, thread_rng};
use tokio::runtime::Runtime;

struct FixedPokemon;

#[async_trait]
impl PokemonDataProvider for FixedPokemon {
    async fn fetch_species_description(&self, name: &str) -> Result<String, UpstreamError> {
        Ok(format!("{} can freely recombine its own cells", name))
    }
}

struct EchoTranslator;

#[async_trait]
impl TranslationProvider for EchoTranslator {
    async fn translate(&self, text: &str) -> Result<Translation, UpstreamError> {
        Ok(Translation::Translated(text.to_uppercase()))
    }
}

// Cached dispatch through the full decorator chain
pub fn dispatch_benchmark(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("mediator_dispatch");

    for distinct_names in [1usize, 100, 1000].iter() {
        let cache_config = CacheConfig::default();
        let mediator = build_mediator(
            Arc::new(FixedPokemon),
            Arc::new(EchoTranslator),
            Arc::new(InMemoryCache::new(cache_config.clone())),
            &cache_config,
        )
        .unwrap();
        let names: Vec<String> = (0..*distinct_names).map(|i| format!("pokemon{}", i)).collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(distinct_names),
            distinct_names,
            |b, _| {
                b.to_async(&runtime).iter(|| {
                    let name = names.choose(&mut thread_rng()).unwrap().clone();
                    let mediator = mediator.clone();
                    async move {
                        let query = GetTranslatedDescription::new(&name).unwrap();
                        black_box(mediator.send(query).await.unwrap())
                    }
                });
            },
        );
    }

    group.finish();
}

// Raw store throughput with a 70/30 read/write mix
pub fn cache_benchmark(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("in_memory_cache");

    for max_entries in [100usize, 10_000].iter() {
        let cache = Arc::new(InMemoryCache::new(CacheConfig {
            max_entries: *max_entries,
            ..CacheConfig::default()
        }));
        let keys: Vec<String> = (0..1000).map(|i| format!("GetTranslatedDescription:{}", i)).collect();
        let data = Bytes::from(vec![7u8; 256]);

        group.bench_with_input(BenchmarkId::from_parameter(max_entries), max_entries, |b, _| {
            b.to_async(&runtime).iter(|| {
                let cache = cache.clone();
                let key = keys.choose(&mut thread_rng()).unwrap().clone();
                let data = data.clone();
                async move {
                    if rand::random::<f64>() < 0.3 {
                        cache.set(&key, data, None).await;
                    } else {
                        black_box(cache.get(&key).await);
                    }
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, dispatch_benchmark, cache_benchmark);
criterion_main!(benches);

// Translated Pokemon descriptions served through a decorated query pipeline

pub mod api;
pub mod cache;
pub mod config;
pub mod decorators;
pub mod error;
pub mod mediator;
pub mod pokemon;
pub mod queries;
pub mod retry;
pub mod translation;

use std::sync::Arc;

// Re-export key types for convenience
pub use api::{build_router, AppState};
pub use cache::{CacheConfig, CacheStore, InMemoryCache};
pub use config::{AppConfig, ClientConfig};
pub use decorators::Decorator;
pub use error::{ConfigError, PipelineError, UpstreamError};
pub use mediator::{Mediator, Query, QueryHandler};
pub use pokemon::{PokeApiClient, PokemonDataProvider};
pub use queries::{GetTranslatedDescription, PokemonQueryHandler, PokemonTranslation};
pub use retry::{RetryConfig, RetryPolicy};
pub use translation::{ShakespeareTranslationClient, Translation, TranslationProvider};

/// Wires the aggregation handler behind logging (outermost) and caching, then
/// verifies the registry so wiring faults surface before the first request.
pub fn build_mediator(
    pokemon: Arc<dyn PokemonDataProvider>,
    translator: Arc<dyn TranslationProvider>,
    cache: Arc<dyn CacheStore>,
    cache_config: &CacheConfig,
) -> Result<Mediator, PipelineError> {
    let mediator = Mediator::builder()
        .with_decorators([Decorator::Logging, Decorator::caching(cache, cache_config)])
        .register::<GetTranslatedDescription, _>(PokemonQueryHandler::new(pokemon, translator))
        .expect::<GetTranslatedDescription>()
        .build();

    mediator.verify()?;
    Ok(mediator)
}

// Cross-cutting decorators wrapped around every query handler

use std::any::type_name;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheConfig, CacheStore};
use crate::error::PipelineError;
use crate::mediator::{query_name, Query, QueryHandler};

/// Log target for the per-query start/completed/error records.
pub const PIPELINE_TARGET: &str = "pokespeare::pipeline";

/// One link of the decorator chain, applied by the mediator at registration.
#[derive(Clone)]
pub enum Decorator {
    Logging,
    Caching(CachingOptions),
}

#[derive(Clone)]
pub struct CachingOptions {
    pub store: Arc<dyn CacheStore>,
    pub ttl: Option<Duration>,
    pub single_flight: bool,
}

impl Decorator {
    pub fn caching(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Decorator::Caching(CachingOptions {
            store,
            ttl: Some(config.default_ttl()),
            single_flight: config.single_flight,
        })
    }

    pub fn apply<Q: Query>(&self, inner: Arc<dyn QueryHandler<Q>>) -> Arc<dyn QueryHandler<Q>> {
        match self {
            Decorator::Logging => Arc::new(LoggingDecorator::new(inner)),
            Decorator::Caching(options) => Arc::new(CachingDecorator::new(inner, options.clone())),
        }
    }
}

pub struct LoggingDecorator<Q: Query> {
    inner: Arc<dyn QueryHandler<Q>>,
}

impl<Q: Query> LoggingDecorator<Q> {
    pub fn new(inner: Arc<dyn QueryHandler<Q>>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<Q: Query> QueryHandler<Q> for LoggingDecorator<Q> {
    async fn handle(&self, query: &Q) -> Result<Q::Output, PipelineError> {
        let name = query_name::<Q>();
        let fields = serde_json::to_string(query).unwrap_or_default();
        let started = Instant::now();

        info!(target: PIPELINE_TARGET, event = "start", query = name, fields = %fields, "Handling query");

        match self.inner.handle(query).await {
            Ok(output) => {
                info!(
                    target: PIPELINE_TARGET,
                    event = "completed",
                    query = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Query completed"
                );
                Ok(output)
            }
            Err(err) => {
                error!(
                    target: PIPELINE_TARGET,
                    event = "error",
                    query = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %err,
                    "Query failed"
                );
                Err(err)
            }
        }
    }
}

/// Stable key for equivalent queries: fully qualified type name plus
/// serialized fields.
pub fn cache_key<Q: Query>(query: &Q) -> Result<String, serde_json::Error> {
    Ok(format!("{}:{}", type_name::<Q>(), serde_json::to_string(query)?))
}

// Outcome of one fill, shared with every caller that joined it
type Flight<Q> = Arc<OnceCell<Result<<Q as Query>::Output, PipelineError>>>;

pub struct CachingDecorator<Q: Query> {
    inner: Arc<dyn QueryHandler<Q>>,
    options: CachingOptions,
    in_flight: DashMap<String, Flight<Q>>,
}

impl<Q: Query> CachingDecorator<Q> {
    pub fn new(inner: Arc<dyn QueryHandler<Q>>, options: CachingOptions) -> Self {
        Self {
            inner,
            options,
            in_flight: DashMap::new(),
        }
    }

    async fn lookup(&self, key: &str) -> Option<Q::Output> {
        let bytes = self.options.store.get(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(output) => {
                debug!(cache_key = key, "Cache hit");
                Some(output)
            }
            Err(err) => {
                warn!(cache_key = key, error = %err, "Discarding unreadable cache entry");
                None
            }
        }
    }

    // Invokes the inner handler and stores only successful results
    async fn fill(&self, key: &str, query: &Q) -> Result<Q::Output, PipelineError> {
        debug!(cache_key = key, "Cache miss");
        let output = self.inner.handle(query).await?;

        match serde_json::to_vec(&output) {
            Ok(bytes) => self.options.store.set(key, Bytes::from(bytes), self.options.ttl).await,
            Err(err) => warn!(cache_key = key, error = %err, "Result not cacheable"),
        }
        Ok(output)
    }
}

#[async_trait]
impl<Q: Query> QueryHandler<Q> for CachingDecorator<Q> {
    async fn handle(&self, query: &Q) -> Result<Q::Output, PipelineError> {
        let key = match cache_key(query) {
            Ok(key) => key,
            Err(err) => {
                warn!(query = query_name::<Q>(), error = %err, "Query has no cache key, bypassing cache");
                return self.inner.handle(query).await;
            }
        };

        if let Some(output) = self.lookup(&key).await {
            return Ok(output);
        }
        if !self.options.single_flight {
            return self.fill(&key, query).await;
        }

        // Concurrent misses on one key join a single fill and share its
        // outcome, failures included; only successes reach the store
        let flight = self.in_flight.entry(key.clone()).or_default().clone();
        let result = flight
            .get_or_init(|| async {
                match self.lookup(&key).await {
                    Some(output) => Ok(output),
                    None => self.fill(&key, query).await,
                }
            })
            .await
            .clone();

        self.in_flight
            .remove_if(&key, |_, current| Arc::ptr_eq(current, &flight));
        result
    }
}

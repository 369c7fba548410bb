// Query mediator: routes each query type to its single decorated handler

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::decorators::Decorator;
use crate::error::PipelineError;

/// An immutable request routed to exactly one handler. Its serialized fields
/// identify equivalent queries for logging and caching.
pub trait Query: Serialize + Send + Sync + 'static {
    type Output: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;
}

#[async_trait]
pub trait QueryHandler<Q: Query>: Send + Sync + 'static {
    async fn handle(&self, query: &Q) -> Result<Q::Output, PipelineError>;
}

// Short type name, e.g. `GetTranslatedDescription`
pub fn query_name<Q: Query>() -> &'static str {
    let full = type_name::<Q>();
    full.rsplit("::").next().unwrap_or(full)
}

struct Registration {
    query: &'static str,
    // Each element is an `Arc<dyn QueryHandler<Q>>` for the keyed `Q`
    handlers: Vec<Box<dyn Any + Send + Sync>>,
}

struct Registry {
    handlers: HashMap<TypeId, Registration>,
    expected: Vec<(TypeId, &'static str)>,
}

/// Builds the handler registry once at startup. Decorators are listed
/// outermost first and wrapped around every handler registered afterwards.
#[derive(Default)]
pub struct MediatorBuilder {
    decorators: Vec<Decorator>,
    registry: HashMap<TypeId, Registration>,
    expected: Vec<(TypeId, &'static str)>,
}

impl MediatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decorators(mut self, decorators: impl IntoIterator<Item = Decorator>) -> Self {
        self.decorators.extend(decorators);
        self
    }

    pub fn register<Q, H>(mut self, handler: H) -> Self
    where
        Q: Query,
        H: QueryHandler<Q>,
    {
        let handler: Arc<dyn QueryHandler<Q>> = Arc::new(handler);
        let decorated = self
            .decorators
            .iter()
            .rev()
            .fold(handler, |inner, decorator| decorator.apply(inner));

        self.registry
            .entry(TypeId::of::<Q>())
            .or_insert_with(|| Registration {
                query: query_name::<Q>(),
                handlers: Vec::new(),
            })
            .handlers
            .push(Box::new(decorated));
        self
    }

    /// Declares a query type that must have exactly one handler when verified.
    pub fn expect<Q: Query>(mut self) -> Self {
        self.expected.push((TypeId::of::<Q>(), query_name::<Q>()));
        self
    }

    pub fn build(self) -> Mediator {
        Mediator {
            registry: Arc::new(Registry {
                handlers: self.registry,
                expected: self.expected,
            }),
        }
    }
}

#[derive(Clone)]
pub struct Mediator {
    registry: Arc<Registry>,
}

impl Mediator {
    pub fn builder() -> MediatorBuilder {
        MediatorBuilder::new()
    }

    /// Checks every registration eagerly: expected query types must have a
    /// handler and no query type may have more than one.
    pub fn verify(&self) -> Result<(), PipelineError> {
        for &(type_id, query) in &self.registry.expected {
            if !self.registry.handlers.contains_key(&type_id) {
                return Err(PipelineError::HandlerNotFound(query));
            }
        }

        for registration in self.registry.handlers.values() {
            if registration.handlers.len() > 1 {
                return Err(PipelineError::HandlerAmbiguity {
                    query: registration.query,
                    count: registration.handlers.len(),
                });
            }
        }

        info!(
            query_types = self.registry.handlers.len(),
            "Mediator registrations verified"
        );
        Ok(())
    }

    pub async fn send<Q: Query>(&self, query: Q) -> Result<Q::Output, PipelineError> {
        let handler = self.resolve::<Q>()?;
        handler.handle(&query).await
    }

    fn resolve<Q: Query>(&self) -> Result<Arc<dyn QueryHandler<Q>>, PipelineError> {
        let query = query_name::<Q>();
        let registration = self
            .registry
            .handlers
            .get(&TypeId::of::<Q>())
            .ok_or(PipelineError::HandlerNotFound(query))?;

        match registration.handlers.as_slice() {
            [handler] => handler
                .downcast_ref::<Arc<dyn QueryHandler<Q>>>()
                .cloned()
                .ok_or(PipelineError::HandlerNotFound(query)),
            [] => Err(PipelineError::HandlerNotFound(query)),
            many => Err(PipelineError::HandlerAmbiguity {
                query,
                count: many.len(),
            }),
        }
    }
}

// The translated-description query and its aggregation handler

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PipelineError, UpstreamError};
use crate::mediator::{Query, QueryHandler};
use crate::pokemon::PokemonDataProvider;
use crate::translation::{Translation, TranslationProvider};

const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetTranslatedDescription {
    name: String,
}

impl GetTranslatedDescription {
    /// Normalizes the name to lowercase so lookups are case-insensitive.
    pub fn new(name: &str) -> Result<Self, PipelineError> {
        let name = name.trim().to_lowercase();

        if name.is_empty() {
            return Err(PipelineError::InvalidQuery("pokemon name is empty".to_string()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(PipelineError::InvalidQuery(format!(
                "pokemon name exceeds {} characters",
                MAX_NAME_LEN
            )));
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '\'')))
        {
            return Err(PipelineError::InvalidQuery(format!(
                "pokemon name contains invalid character {:?}",
                c
            )));
        }

        Ok(Self { name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokemonTranslation {
    pub name: String,
    pub translation: String,
}

impl Query for GetTranslatedDescription {
    type Output = PokemonTranslation;
}

/// Combines the description from the data provider with its translation,
/// keeping the original text whenever translation is unavailable.
pub struct PokemonQueryHandler {
    pokemon: Arc<dyn PokemonDataProvider>,
    translator: Arc<dyn TranslationProvider>,
}

impl PokemonQueryHandler {
    pub fn new(
        pokemon: Arc<dyn PokemonDataProvider>,
        translator: Arc<dyn TranslationProvider>,
    ) -> Self {
        Self {
            pokemon,
            translator,
        }
    }
}

#[async_trait]
impl QueryHandler<GetTranslatedDescription> for PokemonQueryHandler {
    async fn handle(
        &self,
        query: &GetTranslatedDescription,
    ) -> Result<PokemonTranslation, PipelineError> {
        let description = self
            .pokemon
            .fetch_species_description(query.name())
            .await
            .map_err(|err| match err {
                UpstreamError::NotFound(name) => PipelineError::PokemonNotFound(name),
                other => PipelineError::UpstreamFailure(other),
            })?;

        // The one place a fault becomes a successful result
        let translation = match self.translator.translate(&description).await {
            Ok(Translation::Translated(text)) => text,
            Ok(Translation::Unavailable { reason }) => {
                info!(name = query.name(), reason = %reason, "Translation unavailable, using original description");
                description
            }
            Err(err) => {
                warn!(name = query.name(), error = %err, "Translation failed, using original description");
                description
            }
        };

        Ok(PokemonTranslation {
            name: query.name().to_string(),
            translation,
        })
    }
}

// Pokemon data provider backed by PokeAPI

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::UpstreamError;
use crate::retry::RetryPolicy;

// Data structures for the PokeAPI JSON responses
#[derive(Debug, Deserialize, Serialize)]
pub struct PokemonResponse {
    pub species: NamedResource,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NamedResource {
    #[serde(default)]
    pub name: Option<String>,
    pub url: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SpeciesResponse {
    #[serde(default)]
    pub flavor_text_entries: Vec<FlavorTextEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FlavorTextEntry {
    pub flavor_text: String,
    #[serde(default)]
    pub language: Option<NamedResource>,
}

impl FlavorTextEntry {
    // Entries without a language tag are treated as English
    fn is_english(&self) -> bool {
        self.language
            .as_ref()
            .and_then(|language| language.name.as_deref())
            .map_or(true, |name| name == "en")
    }
}

impl SpeciesResponse {
    /// Picks the canonical description: the first English entry, or the first
    /// entry of any language when none is English. Whitespace runs (including
    /// the form feeds PokeAPI embeds) collapse to single spaces.
    pub fn canonical_description(&self) -> Option<String> {
        self.flavor_text_entries
            .iter()
            .find(|entry| entry.is_english())
            .or_else(|| self.flavor_text_entries.first())
            .map(|entry| normalize_whitespace(&entry.flavor_text))
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
pub trait PokemonDataProvider: Send + Sync + 'static {
    /// Fails with `UpstreamError::NotFound` when the name is unknown.
    async fn fetch_species_description(&self, name: &str) -> Result<String, UpstreamError>;
}

pub struct PokeApiClient {
    http: Client,
    base_url: Url,
    retry_policy: RetryPolicy,
}

impl PokeApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, UpstreamError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| UpstreamError::MalformedPayload(format!("invalid base url: {}", e)))?;
        let http = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            http,
            base_url,
            retry_policy: config.retry_policy(),
        })
    }

    async fn get_json<T>(&self, url: Url, name: &str) -> Result<T, UpstreamError>
    where
        T: DeserializeOwned + Send,
    {
        self.retry_policy
            .execute("pokeapi", || send_json(self.http.get(url.clone()), name))
            .await
    }
}

// Single attempt; a 404 is terminal for the requested name
async fn send_json<T>(request: RequestBuilder, name: &str) -> Result<T, UpstreamError>
where
    T: DeserializeOwned,
{
    let response = request.send().await?;
    match response.status() {
        status if status.is_success() => Ok(response.json::<T>().await?),
        StatusCode::NOT_FOUND => Err(UpstreamError::NotFound(name.to_string())),
        status => Err(UpstreamError::from_status(
            status.as_u16(),
            response.text().await.unwrap_or_default(),
        )),
    }
}

#[async_trait]
impl PokemonDataProvider for PokeApiClient {
    async fn fetch_species_description(&self, name: &str) -> Result<String, UpstreamError> {
        let pokemon_url = self
            .base_url
            .join(&format!("pokemon/{}", name))
            .map_err(|e| UpstreamError::MalformedPayload(e.to_string()))?;
        let pokemon: PokemonResponse = self.get_json(pokemon_url, name).await?;

        let species_url = Url::parse(&pokemon.species.url)
            .map_err(|e| UpstreamError::MalformedPayload(format!("invalid species url: {}", e)))?;
        debug!(name, species_url = %species_url, "Fetching species");
        let species: SpeciesResponse = self.get_json(species_url, name).await?;

        species.canonical_description().ok_or_else(|| {
            UpstreamError::MalformedPayload(format!("no flavor text entries for {}", name))
        })
    }
}

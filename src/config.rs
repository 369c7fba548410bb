// Process configuration, loaded once at startup

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::cache::CacheConfig;
use crate::error::ConfigError;
use crate::retry::{RetryConfig, RetryPolicy};

// Outbound client configuration, one per upstream dependency
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub retry_config: RetryConfig,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: 10_000,
            retry_config: RetryConfig::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_config.clone(), self.timeout())
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub pokemon_api: ClientConfig,
    pub translation_api: ClientConfig,
    pub cache: CacheConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            pokemon_api: ClientConfig::new(Self::DEFAULT_POKEMON_API_URL),
            translation_api: ClientConfig::new(Self::DEFAULT_TRANSLATION_API_URL),
            cache: CacheConfig::default(),
        }
    }
}

impl AppConfig {
    const DEFAULT_POKEMON_API_URL: &'static str = "https://pokeapi.co/api/v2/";
    const DEFAULT_TRANSLATION_API_URL: &'static str = "https://api.funtranslations.com/translate/";

    /// Reads `POKESPEARE_*` variables (after loading a `.env` file if one
    /// exists). Absent values keep their defaults; unparsable ones fail.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => info!("Loaded environment variables from {}", path.display()),
            Err(_) => info!("No .env file found, using system environment variables"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let retry_defaults = RetryConfig::default();

        let retry_config = RetryConfig {
            max_retries: parse_or(&lookup, "POKESPEARE_RETRY_MAX_RETRIES", retry_defaults.max_retries)?,
            initial_backoff_ms: parse_or(
                &lookup,
                "POKESPEARE_RETRY_INITIAL_BACKOFF_MS",
                retry_defaults.initial_backoff_ms,
            )?,
            max_backoff_ms: parse_or(&lookup, "POKESPEARE_RETRY_MAX_BACKOFF_MS", retry_defaults.max_backoff_ms)?,
            ..retry_defaults
        };
        let timeout_ms = parse_or(&lookup, "POKESPEARE_UPSTREAM_TIMEOUT_MS", defaults.pokemon_api.timeout_ms)?;

        let client = |key: &str, default_url: &str| ClientConfig {
            base_url: with_trailing_slash(lookup(key).unwrap_or_else(|| default_url.to_string())),
            timeout_ms,
            retry_config: retry_config.clone(),
        };

        Ok(Self {
            bind_addr: parse_or(&lookup, "POKESPEARE_BIND_ADDR", defaults.bind_addr)?,
            pokemon_api: client("POKESPEARE_POKEMON_API_URL", Self::DEFAULT_POKEMON_API_URL),
            translation_api: client("POKESPEARE_TRANSLATION_API_URL", Self::DEFAULT_TRANSLATION_API_URL),
            cache: CacheConfig {
                max_entries: parse_or(&lookup, "POKESPEARE_CACHE_MAX_ENTRIES", defaults.cache.max_entries)?,
                default_ttl_seconds: parse_or(
                    &lookup,
                    "POKESPEARE_CACHE_TTL_SECONDS",
                    defaults.cache.default_ttl_seconds,
                )?,
                cleanup_interval_seconds: parse_or(
                    &lookup,
                    "POKESPEARE_CACHE_CLEANUP_INTERVAL_SECONDS",
                    defaults.cache.cleanup_interval_seconds,
                )?,
                single_flight: parse_or(&lookup, "POKESPEARE_CACHE_SINGLE_FLIGHT", defaults.cache.single_flight)?,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

// Relative joins drop the last path segment unless the base ends in '/'
fn with_trailing_slash(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.pokemon_api.base_url, "https://pokeapi.co/api/v2/");
        assert_eq!(config.translation_api.retry_config.max_retries, 3);
        assert_eq!(config.cache.default_ttl_seconds, 3600);
        assert!(config.cache.single_flight);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("POKESPEARE_BIND_ADDR", "127.0.0.1:9000"),
            ("POKESPEARE_POKEMON_API_URL", "http://localhost:5000"),
            ("POKESPEARE_RETRY_MAX_RETRIES", "5"),
            ("POKESPEARE_UPSTREAM_TIMEOUT_MS", "2500"),
            ("POKESPEARE_CACHE_TTL_SECONDS", "60"),
            ("POKESPEARE_CACHE_SINGLE_FLIGHT", "false"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.pokemon_api.base_url, "http://localhost:5000/");
        assert_eq!(config.pokemon_api.retry_config.max_retries, 5);
        assert_eq!(config.translation_api.timeout_ms, 2500);
        assert_eq!(config.cache.default_ttl_seconds, 60);
        assert!(!config.cache.single_flight);
    }

    #[test]
    fn test_malformed_value_fails_fast() {
        let result = AppConfig::from_lookup(lookup_from(&[("POKESPEARE_CACHE_TTL_SECONDS", "soon")]));

        match result {
            Err(ConfigError::InvalidValue { key, value }) => {
                assert_eq!(key, "POKESPEARE_CACHE_TTL_SECONDS");
                assert_eq!(value, "soon");
            }
            other => panic!("Expected invalid value error, got {:?}", other.map(|_| ())),
        }
    }
}

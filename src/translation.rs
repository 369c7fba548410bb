// Shakespeare translation provider backed by FunTranslations

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::UpstreamError;
use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize, Serialize)]
pub struct TranslationResponse {
    pub success: TranslationSuccess,
    pub contents: Option<TranslationContents>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TranslationSuccess {
    pub total: u32,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TranslationContents {
    pub translated: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub translation: String,
}

/// Outcome of a translation request that reached the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    Translated(String),
    /// The upstream answered but declined or could not translate.
    Unavailable { reason: String },
}

impl From<TranslationResponse> for Translation {
    fn from(response: TranslationResponse) -> Self {
        match response.contents.and_then(|contents| contents.translated) {
            Some(translated) if response.success.total > 0 => Translation::Translated(translated),
            _ => Translation::Unavailable {
                reason: format!("upstream reported {} translations", response.success.total),
            },
        }
    }
}

#[async_trait]
pub trait TranslationProvider: Send + Sync + 'static {
    /// Errors are reserved for transport failures; a structured refusal from
    /// the upstream is `Ok(Translation::Unavailable)`.
    async fn translate(&self, text: &str) -> Result<Translation, UpstreamError>;
}

pub struct ShakespeareTranslationClient {
    http: Client,
    endpoint: Url,
    retry_policy: RetryPolicy,
}

impl ShakespeareTranslationClient {
    pub fn new(config: &ClientConfig) -> Result<Self, UpstreamError> {
        let endpoint = Url::parse(&config.base_url)
            .and_then(|base| base.join("shakespeare.json"))
            .map_err(|e| UpstreamError::MalformedPayload(format!("invalid base url: {}", e)))?;
        let http = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            http,
            endpoint,
            retry_policy: config.retry_policy(),
        })
    }
}

#[async_trait]
impl TranslationProvider for ShakespeareTranslationClient {
    async fn translate(&self, text: &str) -> Result<Translation, UpstreamError> {
        debug!(text_len = text.len(), "Requesting shakespeare translation");

        self.retry_policy
            .execute("funtranslations", || {
                send_translation(self.http.get(self.endpoint.clone()).query(&[("text", text)]))
            })
            .await
    }
}

// Single attempt; only transient statuses become errors
async fn send_translation(request: RequestBuilder) -> Result<Translation, UpstreamError> {
    let response = request.send().await?;
    let status = response.status();

    if status.is_success() {
        let body: TranslationResponse = response.json().await?;
        return Ok(Translation::from(body));
    }

    let message = response.text().await.unwrap_or_default();
    match UpstreamError::from_status(status.as_u16(), message) {
        error if error.is_retryable() => Err(error),
        error => {
            warn!(status = status.as_u16(), error = %error, "Translation declined by upstream");
            Ok(Translation::Unavailable {
                reason: error.to_string(),
            })
        }
    }
}

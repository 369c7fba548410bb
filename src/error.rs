// Error taxonomy for the upstream providers and the query pipeline

use thiserror::Error;

// Faults raised by the outbound provider clients
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Upstream error: {status_code} - {message}")]
    Status {
        status_code: u16,
        message: String,
        is_retryable: bool,
    },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),
}

impl UpstreamError {
    /// Transient faults are worth another attempt; everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::NetworkError(_) => true,
            UpstreamError::Status { is_retryable, .. } => *is_retryable,
            UpstreamError::NotFound(_)
            | UpstreamError::MalformedPayload(_)
            | UpstreamError::Timeout(_) => false,
        }
    }

    /// Builds a status error, classifying 5xx, 408 and 429 as transient.
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let is_retryable = status_code >= 500 || status_code == 408 || status_code == 429;
        UpstreamError::Status {
            status_code,
            message: message.into(),
            is_retryable,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            UpstreamError::MalformedPayload(err.to_string())
        } else if let Some(status) = err.status() {
            UpstreamError::from_status(status.as_u16(), err.to_string())
        } else {
            UpstreamError::NetworkError(err.to_string())
        }
    }
}

// Faults surfaced by the mediator to its callers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("No handler registered for query type {0}")]
    HandlerNotFound(&'static str),

    #[error("{count} handlers registered for query type {query}")]
    HandlerAmbiguity { query: &'static str, count: usize },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Pokemon not found: {0}")]
    PokemonNotFound(String),

    #[error("Upstream failure: {0}")]
    UpstreamFailure(UpstreamError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

// HTTP surface: GET /pokemon/{name} dispatched through the mediator

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{PipelineError, UpstreamError};
use crate::mediator::Mediator;
use crate::queries::{GetTranslatedDescription, PokemonTranslation};

/// Server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub mediator: Mediator,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/pokemon/{name}", get(get_translated_description))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /pokemon/{name}
async fn get_translated_description(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<PokemonTranslation>, ApiError> {
    info!("GET: pokemon={}", name);

    let query = GetTranslatedDescription::new(&name)?;
    let translation = state.mediator.send(query).await?;
    Ok(Json(translation))
}

pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            PipelineError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            PipelineError::PokemonNotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::UpstreamFailure(UpstreamError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            PipelineError::HandlerNotFound(_) | PipelineError::HandlerAmbiguity { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

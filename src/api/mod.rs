// HTTP API: read side for the rendering layer plus operator endpoints

pub mod operations;
pub mod query;

pub use operations::create_operations_router;
pub use query::{create_query_router, EntityResponse};

use crate::control::{ControlError, ControlService};
use crate::probe::LivenessProber;
use crate::state::EntityStore;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared state for every API route
pub struct AppState {
    pub store: Arc<EntityStore>,
    pub prober: Arc<LivenessProber>,
    pub control: Arc<ControlService>,
}

/// Complete API router with permissive CORS for the browser frontend
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(create_query_router(Arc::clone(&state)))
        .merge(create_operations_router(state))
        .layer(CorsLayer::permissive())
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// API error types
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Upstream(String),
}

impl From<ControlError> for ApiError {
    fn from(e: ControlError) -> Self {
        match e {
            ControlError::UnsupportedCommand(_) => ApiError::BadRequest(e.to_string()),
            ControlError::UnknownEntity(_) => ApiError::NotFound(e.to_string()),
            ControlError::Publish(_) => ApiError::Upstream(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

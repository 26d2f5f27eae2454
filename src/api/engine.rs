//! HTTP routing and the JSON result envelope.
//!
//! Every response carries a `result` field; failures serialize as
//! `{"result": "error", "message": ...}` with status 400, including
//! unsupported methods (legacy wire behavior).

use std::sync::Arc;

use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::api::version::VersionModel;
use crate::api::{session, version};
use crate::error::MusicError;
use crate::session::SessionRegistry;

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<SessionRegistry>,
    pub version: VersionModel,
}

pub type ApiResult = Result<Json<Value>, ApiError>;

pub struct ApiError(pub MusicError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "result": "error", "message": self.0.to_string() });
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

impl From<MusicError> for ApiError {
    fn from(err: MusicError) -> Self {
        Self(err)
    }
}

/// Method name in the capitalized wire spelling clients match against
pub fn method_name(method: &Method) -> String {
    let lower = method.as_str().to_ascii_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => lower,
    }
}

pub fn method_not_implemented(method: &Method, view: &str) -> ApiError {
    ApiError(MusicError::MethodNotAllowed {
        method: method_name(method),
        view: view.to_string(),
    })
}

/// Assemble the service router under `base_path`.
pub fn build_router(state: ApiState, base_path: &str) -> Router {
    let api = Router::new()
        .route(
            "/version",
            get(version::get_version).fallback(version::method_fallback),
        )
        .route(
            "/session",
            post(session::create_session).fallback(session::collection_fallback),
        )
        .route(
            "/session/{token}",
            get(session::get_session)
                .post(session::push_samples)
                .put(session::push_samples)
                .delete(session::delete_session)
                .fallback(session::method_fallback),
        )
        .with_state(state)
        // A nested router answers unmatched sub-paths itself; it needs
        // its own fallback to keep the JSON envelope on unknown routes
        .fallback(unknown_route);

    let trimmed = base_path.trim_end_matches('/');
    if trimmed.is_empty() {
        api
    } else {
        Router::new().nest(trimmed, api).fallback(unknown_route)
    }
}

async fn unknown_route(method: Method, uri: Uri) -> ApiError {
    ApiError(MusicError::MethodNotAllowed {
        method: method_name(&method),
        view: uri.path().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_name_spelling() {
        assert_eq!(method_name(&Method::GET), "Get");
        assert_eq!(method_name(&Method::POST), "Post");
        assert_eq!(method_name(&Method::PUT), "Put");
        assert_eq!(method_name(&Method::DELETE), "Delete");
    }
}

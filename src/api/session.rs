//! Session lifecycle and streaming endpoints.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::Method;
use axum::Json;
use serde_json::Value;

use crate::api::engine::{method_name, method_not_implemented, ApiError, ApiResult, ApiState};
use crate::error::MusicError;

pub const VIEW_NAME: &str = "SessionApiView";

/// POST /session — create a session from its JSON definition.
pub async fn create_session(State(state): State<ApiState>, body: Bytes) -> ApiResult {
    // An unparseable body degrades to an empty definition, which then
    // fails sample-type validation with the canonical message
    let session_info: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state
        .registry
        .create_session(&session_info)
        .map(Json)
        .map_err(ApiError)
}

/// GET /session/{token} — snapshot of the published search result.
pub async fn get_session(State(state): State<ApiState>, Path(token): Path<String>) -> ApiResult {
    state
        .registry
        .get_session_info(&token)
        .map(Json)
        .map_err(ApiError)
}

/// POST or PUT /session/{token} — append raw PCM to the session.
pub async fn push_samples(
    State(state): State<ApiState>,
    Path(token): Path<String>,
    body: Bytes,
) -> ApiResult {
    state
        .registry
        .append_session_samples(&token, &body)
        .map(Json)
        .map_err(ApiError)
}

pub async fn delete_session(State(state): State<ApiState>, Path(token): Path<String>) -> ApiResult {
    state
        .registry
        .delete_session(&token)
        .map(Json)
        .map_err(ApiError)
}

/// Tokenless GET/PUT/DELETE carry no meaning on the collection route.
pub async fn collection_fallback(method: Method) -> ApiError {
    ApiError(MusicError::MalformedRequest(format!(
        "Invalid {} request - malformed query path",
        method_name(&method).to_uppercase()
    )))
}

pub async fn method_fallback(method: Method) -> ApiError {
    method_not_implemented(&method, VIEW_NAME)
}

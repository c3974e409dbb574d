//! Optional API-key authentication for `/ad` and the admin endpoints.
//!
//! Checked by an `axum::middleware::from_fn` layer rather than an extractor,
//! since there is no per-request state to thread through beyond the header.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

const API_KEY_HEADER: &str = "x-api-key";

/// Checks `X-Api-Key` against the configured key when one is set. With no
/// key configured, every request passes — matches local-dev and test
/// defaults where auth is opt-in.
pub async fn require_api_key(
    State(api_key): State<Arc<Option<String>>>,
    request: Request,
    next: Next,
) -> Response {
    match api_key.as_deref() {
        None => next.run(request).await,
        Some(expected) => {
            let provided = request.headers().get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
            if provided == Some(expected) {
                next.run(request).await
            } else {
                (StatusCode::UNAUTHORIZED, "unauthorized").into_response()
            }
        }
    }
}

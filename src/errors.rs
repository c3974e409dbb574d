//! Error taxonomy for the ad server.
//!
//! Each component owns a `thiserror` enum; [`AdServerError`] wraps the ones
//! that can reach the HTTP layer and maps them to the status codes in the
//! spec's error taxonomy. `anyhow` is reserved for the bootstrap sequence in
//! `main`, where the exact error chain matters more than a typed variant.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("unknown placement: {0}")]
    UnknownPlacement(String),
    #[error("unknown publisher: {0}")]
    UnknownPublisher(String),
    #[error("referential integrity violation: {0}")]
    Invalid(String),
    #[error("catalogue source error: {0}")]
    Source(String),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NoFillReason {
    #[error("no eligible ad")]
    NoEligibleAd,
    #[error("pacing limit reached")]
    PacingLimitReached,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("too many custom params: {0} > max {1}")]
    TooManyCustomParams(usize, usize),
    #[error("custom param key invalid length: {0:?}")]
    KeyLength(String),
    #[error("custom param value too long for key {0:?}")]
    ValueLength(String),
    #[error("malformed token")]
    Malformed,
    #[error("token signature mismatch")]
    BadMac,
    #[error("token expired")]
    Expired,
    #[error("token exceeds {0} byte size budget")]
    TooLarge(usize),
}

#[derive(Debug, Error)]
pub enum MacroError {
    #[error("macro {0} failed to resolve")]
    ResolutionFailed(String),
}

/// Errors surfaced to HTTP handlers. No-fill is *not* an error (it is a 200
/// response with an empty seatbid); this enum is strictly the 4xx/5xx
/// taxonomy.
#[derive(Debug, Error)]
pub enum AdServerError {
    #[error("missing or invalid token")]
    InvalidToken,
    #[error(transparent)]
    Catalogue(#[from] CatalogueError),
    #[error("malformed request: {0}")]
    BadRequest(String),
    #[error("analytics sink unavailable")]
    SinkUnavailable,
    #[error("catalogue uninitialised")]
    Uninitialised,
    #[error("reload failed: {0}")]
    ReloadFailed(String),
    #[error("unauthorized")]
    Unauthorized,
}

impl From<TokenError> for AdServerError {
    fn from(_: TokenError) -> Self {
        AdServerError::InvalidToken
    }
}

impl IntoResponse for AdServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdServerError::InvalidToken => StatusCode::UNAUTHORIZED,
            AdServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            AdServerError::Catalogue(CatalogueError::UnknownPlacement(_)) => StatusCode::BAD_REQUEST,
            AdServerError::Catalogue(CatalogueError::UnknownPublisher(_)) => StatusCode::BAD_REQUEST,
            AdServerError::Catalogue(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AdServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AdServerError::SinkUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            AdServerError::Uninitialised => StatusCode::INTERNAL_SERVER_ERROR,
            AdServerError::ReloadFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

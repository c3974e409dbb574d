//! Admin/operational endpoints: `/reload`, `/health`, `/metrics`, `/testbid`.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::errors::AdServerError;
use crate::state::AppState;

pub async fn handle_reload(State(state): State<AppState>) -> Result<StatusCode, AdServerError> {
    let data = state
        .catalogue_source
        .load()
        .await
        .map_err(|err| AdServerError::ReloadFailed(err.to_string()))?;
    state
        .catalogue
        .reload_all(data)
        .await
        .map_err(|err| AdServerError::ReloadFailed(err.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics_handle.render()
}

/// Stub bidder used by integration tests and load-testing tools; always
/// returns a trivial fixed-price seatbid rather than running the real
/// selection pipeline.
pub async fn handle_testbid(Json(req): Json<super::ad::AdRequest>) -> impl IntoResponse {
    let imp = req.imp.first();
    Json(json!({
        "id": req.id,
        "seatbid": [{
            "bid": [{
                "id": "testbid-1",
                "impid": imp.map(|i| i.id.as_str()).unwrap_or(""),
                "price": 1.0,
                "adm": "<div>test creative</div>",
            }]
        }]
    }))
}

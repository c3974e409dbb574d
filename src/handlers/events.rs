//! `GET /impression` and `GET /click` — event ingestion endpoints.

use std::collections::HashMap;
use std::net::IpAddr;

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::analytics::{AnalyticsEvent, AnalyticsEventKind};
use crate::catalogue::CatalogueSnapshot;
use crate::errors::AdServerError;
use crate::macro_expand::{select_click_url, ExpansionContext, MacroRegistry};
use crate::state::AppState;
use crate::token::{self, EventTokenPayload};

/// 1x1 transparent GIF, served for impression pixels and as the click
/// fallback when there is no redirect URL.
const PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00,
    0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02,
    0x02, 0x44, 0x01, 0x00, 0x3b,
];

fn pixel_response() -> Response {
    ([(header::CONTENT_TYPE, "image/gif")], PIXEL_GIF).into_response()
}

fn verify_token(state: &AppState, params: &HashMap<String, String>) -> Result<EventTokenPayload, AdServerError> {
    let raw = params.get("t").ok_or(AdServerError::InvalidToken)?;
    let now = token::now();
    state.token_codec.verify(raw, now).map_err(AdServerError::from)
}

async fn record_billing(state: &AppState, payload: &EventTokenPayload, is_click: bool) {
    let line_item_id = &payload.line_item_id;
    let result = if is_click {
        state.counters.increment(&format!("{line_item_id}:clicks"), token::now(), 86400).await
    } else {
        state.counters.increment(&format!("{line_item_id}:impressions"), token::now(), 86400).await
    };
    if let Err(err) = result {
        tracing::warn!(error = %err, line_item_id = %line_item_id, "billing counter increment failed");
    }

    let ctr_result = if is_click {
        state.counters.record_ctr_event(line_item_id, 1, 0).await
    } else {
        state.counters.record_ctr_event(line_item_id, 0, 1).await
    };
    if let Err(err) = ctr_result {
        tracing::warn!(error = %err, line_item_id = %line_item_id, "CTR counter increment failed");
    }
}

/// Increments the per-user frequency counter the cascade's frequency stage
/// reads back as `"{line_item_id}:{user_id}"`. Skipped when `user_id` is
/// empty, matching the stage's own skip condition.
async fn record_frequency(state: &AppState, snapshot: &CatalogueSnapshot, payload: &EventTokenPayload) {
    if payload.user_id.is_empty() {
        return;
    }
    let Some(line_item) = snapshot.line_item_by_id(&payload.line_item_id) else {
        return;
    };
    let subject = format!("{}:{}", line_item.id, payload.user_id);
    let result = state.counters.increment(&subject, token::now(), line_item.frequency_window_secs).await;
    if let Err(err) = result {
        tracing::warn!(error = %err, line_item_id = %line_item.id, "frequency counter increment failed");
    }
}

pub async fn handle_impression(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AdServerError> {
    let payload = verify_token(&state, &params)?;

    let snapshot = state.catalogue.current();
    if snapshot.publisher_by_id(&payload.publisher_id).is_none() {
        return Err(AdServerError::BadRequest("unknown publisher".into()));
    }

    let event = AnalyticsEvent {
        kind: AnalyticsEventKind::Impression,
        request_id: payload.request_id.clone(),
        creative_id: payload.creative_id.clone(),
        line_item_id: payload.line_item_id.clone(),
        campaign_id: payload.campaign_id.clone(),
        publisher_id: payload.publisher_id.clone(),
        placement_id: payload.placement_id.clone(),
        user_id: payload.user_id.clone(),
        price: payload.price,
        timestamp: token::now(),
    };
    state.analytics.record(event).await.map_err(|_| AdServerError::SinkUnavailable)?;

    record_billing(&state, &payload, false).await;
    record_frequency(&state, &snapshot, &payload).await;

    Ok(pixel_response())
}

pub async fn handle_click(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    connect_info: Option<ConnectInfo<std::net::SocketAddr>>,
) -> Result<Response, AdServerError> {
    let _ = connect_info.map(|ConnectInfo(addr)| addr.ip()).unwrap_or_else(|| IpAddr::from([0, 0, 0, 0]));
    let payload = verify_token(&state, &params)?;

    let snapshot = state.catalogue.current();
    if snapshot.publisher_by_id(&payload.publisher_id).is_none() {
        return Err(AdServerError::BadRequest("unknown publisher".into()));
    }

    let event = AnalyticsEvent {
        kind: AnalyticsEventKind::Click,
        request_id: payload.request_id.clone(),
        creative_id: payload.creative_id.clone(),
        line_item_id: payload.line_item_id.clone(),
        campaign_id: payload.campaign_id.clone(),
        publisher_id: payload.publisher_id.clone(),
        placement_id: payload.placement_id.clone(),
        user_id: payload.user_id.clone(),
        price: payload.price,
        timestamp: token::now(),
    };
    state.analytics.record(event).await.map_err(|_| AdServerError::SinkUnavailable)?;

    record_billing(&state, &payload, true).await;

    let creative_click_url = snapshot.creative_by_id(&payload.creative_id).map(|c| c.click_url.as_str()).unwrap_or("");
    let line_item_click_url = snapshot.line_item_by_id(&payload.line_item_id).map(|l| l.click_url.as_str()).unwrap_or("");
    let template = select_click_url(creative_click_url, line_item_click_url);

    if template.is_empty() {
        return Ok(pixel_response());
    }

    let registry: &MacroRegistry = &state.macros;
    let ctx = ExpansionContext {
        token: &payload,
        auction_id: &payload.request_id,
        timestamp: token::now(),
    };
    let destination = registry.expand(template, &ctx);

    let is_http = destination.starts_with("http://") || destination.starts_with("https://");
    if is_http {
        Ok((StatusCode::FOUND, [(header::LOCATION, destination)]).into_response())
    } else {
        Ok(pixel_response())
    }
}

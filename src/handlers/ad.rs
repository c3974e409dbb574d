//! `POST /ad` — select an ad for an OpenRTB-shaped request.

use std::collections::HashMap;
use std::net::IpAddr;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::errors::AdServerError;
use crate::filters::{self, CascadeRequest};
use crate::models::{AdSize, DeviceType, RequestContext};
use crate::selector::{self, ScoringConfig, SelectionStrategy};
use crate::state::AppState;
use crate::token::{self, EventTokenPayload};

#[derive(Debug, Deserialize)]
pub struct AdRequest {
    pub id: String,
    pub imp: Vec<Imp>,
    #[serde(default)]
    pub user: Option<UserObj>,
    #[serde(default)]
    pub device: Option<DeviceObj>,
    #[serde(default)]
    pub ext: ExtObj,
}

#[derive(Debug, Deserialize)]
pub struct Imp {
    pub id: String,
    pub tagid: String,
    #[serde(default)]
    pub banner: Option<SizeObj>,
    #[serde(default)]
    pub video: Option<SizeObj>,
    #[serde(default)]
    pub native: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct SizeObj {
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Deserialize, Default)]
pub struct UserObj {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct DeviceObj {
    #[serde(default)]
    pub ua: String,
    #[serde(default)]
    pub ip: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ExtObj {
    #[serde(default)]
    pub publisher_id: String,
    #[serde(default)]
    pub custom_params: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct AdResponse {
    pub id: String,
    pub seatbid: Vec<SeatBid>,
}

#[derive(Debug, Serialize)]
pub struct SeatBid {
    pub bid: Vec<Bid>,
}

#[derive(Debug, Serialize)]
pub struct Bid {
    pub id: String,
    pub impid: String,
    pub price: f64,
    pub adm: String,
    pub crid: String,
    pub impression_url: String,
    pub click_url: String,
}

fn classify_device(ua: &str) -> DeviceType {
    let ua_lower = ua.to_lowercase();
    if ua_lower.contains("tablet") || ua_lower.contains("ipad") {
        DeviceType::Tablet
    } else if ua_lower.contains("mobile") || ua_lower.contains("android") || ua_lower.contains("iphone") {
        DeviceType::Mobile
    } else if ua_lower.contains("smarttv") || ua_lower.contains("roku") || ua_lower.contains("appletv") {
        DeviceType::Ctv
    } else if ua_lower.is_empty() {
        DeviceType::Unknown
    } else {
        DeviceType::Desktop
    }
}

fn render_adm(creative: &crate::models::Creative) -> (String, Option<serde_json::Value>) {
    match &creative.render {
        crate::models::CreativeRender::Banner { html } => (html.clone(), None),
        crate::models::CreativeRender::RawHtml(html) => (html.clone(), None),
        crate::models::CreativeRender::Native { fields } => {
            (String::new(), Some(serde_json::to_value(fields).unwrap_or_default()))
        }
    }
}

pub async fn handle_ad(State(state): State<AppState>, Json(req): Json<AdRequest>) -> Result<Json<AdResponse>, AdServerError> {
    let imp = req
        .imp
        .first()
        .ok_or_else(|| AdServerError::BadRequest("imp[] must contain at least one entry".into()))?;

    let requested_size = imp
        .banner
        .as_ref()
        .or(imp.video.as_ref())
        .map(|s| AdSize { w: s.w, h: s.h })
        .unwrap_or(AdSize::ANY);

    let ua = req.device.as_ref().map(|d| d.ua.as_str()).unwrap_or("");
    let device_type = classify_device(ua);
    let client_ip: Option<IpAddr> = req.device.as_ref().and_then(|d| d.ip.as_ref()).and_then(|ip| ip.parse().ok());
    let country = client_ip.and_then(|ip| state.geo.resolve_country(ip));

    let context = RequestContext {
        device_type,
        country: country.clone(),
        custom_params: req.ext.custom_params.clone(),
    };

    let user_id = req.user.as_ref().map(|u| u.id.as_str()).unwrap_or("");
    let now = token::now();

    let snapshot = state.catalogue.current();
    let cascade_req = CascadeRequest {
        placement_id: &imp.tagid,
        requested_size,
        context,
        user_id,
        client_ip,
    };
    let outcome = filters::run(&snapshot, &state.counters, &state.pacing, &cascade_req, now).await?;

    if outcome.survivors.is_empty() {
        metrics::counter!("ad_no_fill", 1, "reason" => outcome.no_fill_reason.map(|r| r.to_string()).unwrap_or_default());
        return Ok(Json(AdResponse {
            id: req.id,
            seatbid: vec![],
        }));
    }

    let scoring = ScoringConfig {
        default_ctr: state.config.default_ctr,
        ctr_weight: state.config.ctr_weight,
        ctr_optimisation_enabled: state.config.predictor_url.is_some(),
    };

    let hour_of_day = ((now / 3600) % 24) as u8;
    let day_of_week = (((now / 86400) + 4) % 7) as u8;

    let Some((winner, price)) = selector::select(
        &snapshot,
        outcome.survivors,
        &state.counters,
        &state.predictor,
        device_type_label(device_type),
        country.as_deref().unwrap_or(""),
        hour_of_day,
        day_of_week,
        &scoring,
        SelectionStrategy::RuleBased,
    )
    .await
    else {
        metrics::counter!("ad_no_fill", 1, "reason" => "no_eligible_ad");
        return Ok(Json(AdResponse {
            id: req.id,
            seatbid: vec![],
        }));
    };

    let line_item = snapshot
        .line_item_by_id(&winner.line_item_id)
        .ok_or_else(|| AdServerError::BadRequest("selected creative references a missing line-item".into()))?;

    let impression_id = format!("{}-{}", req.id, imp.id);
    let payload = EventTokenPayload {
        request_id: req.id.clone(),
        impression_id,
        creative_id: winner.id.clone(),
        campaign_id: line_item.campaign_id.clone(),
        line_item_id: line_item.id.clone(),
        user_id: user_id.to_string(),
        publisher_id: line_item.publisher_id.clone(),
        placement_id: imp.tagid.clone(),
        price,
        currency: "USD".to_string(),
        custom_params: req.ext.custom_params.into_iter().collect(),
        issued_at: now,
    };

    let token = state.token_codec.mint(payload, now).map_err(|_| AdServerError::BadRequest("token minting failed".into()))?;

    let impression_url = format!("/impression?t={token}");
    let click_url = format!("/click?t={token}");
    let (adm, native) = render_adm(winner);
    let adm = native.map(|v| v.to_string()).unwrap_or(adm);

    metrics::counter!("ad_fill", 1);

    Ok(Json(AdResponse {
        id: req.id,
        seatbid: vec![SeatBid {
            bid: vec![Bid {
                id: winner.id.clone(),
                impid: imp.id.clone(),
                price,
                adm,
                crid: winner.id.clone(),
                impression_url,
                click_url,
            }],
        }],
    }))
}

fn device_type_label(device_type: DeviceType) -> &'static str {
    match device_type {
        DeviceType::Desktop => "desktop",
        DeviceType::Mobile => "mobile",
        DeviceType::Tablet => "tablet",
        DeviceType::Ctv => "ctv",
        DeviceType::Unknown => "unknown",
    }
}

//! Online advertising decision server.
//!
//! The hot path: `catalogue` holds the current snapshot; `filters` runs the
//! elimination cascade over it; `selector` ranks survivors; `token` mints
//! the bearer that binds the outcome to later `handlers::events` calls;
//! `macro_expand` resolves click-URL templates at redirect time. `pacing`
//! and `counters` back the cascade's frequency/pacing stages. `predictor`
//! is the CTR boost client. Everything else is ambient: `config`, `errors`,
//! `metrics`, `middleware`, `state`.

pub mod analytics;
pub mod catalogue;
pub mod config;
pub mod counters;
pub mod errors;
pub mod filters;
pub mod geo;
pub mod handlers;
pub mod macro_expand;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod pacing;
pub mod predictor;
pub mod selector;
pub mod state;
pub mod token;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use state::AppState;

pub fn build_router(state: AppState) -> Router {
    let api_key = Arc::new(state.config.api_key.clone());

    let protected = Router::new()
        .route("/ad", post(handlers::ad::handle_ad))
        .route("/reload", post(handlers::admin::handle_reload))
        .layer(axum::middleware::from_fn_with_state(api_key, middleware::auth::require_api_key));

    let open = Router::new()
        .route("/impression", get(handlers::events::handle_impression))
        .route("/click", get(handlers::events::handle_click))
        .route("/health", get(handlers::admin::handle_health))
        .route("/metrics", get(handlers::admin::handle_metrics))
        .route("/testbid", post(handlers::admin::handle_testbid));

    protected
        .merge(open)
        .layer(axum::middleware::from_fn(middleware::logging::request_logging))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

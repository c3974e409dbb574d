//! Shared application state handed to every handler via `axum::State`.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::analytics::AnalyticsSink;
use crate::catalogue::{CatalogueSource, CatalogueStore};
use crate::config::Config;
use crate::counters::CounterStore;
use crate::geo::GeoResolver;
use crate::macro_expand::MacroRegistry;
use crate::pacing::PacingRegistry;
use crate::predictor::CtrPredictorClient;
use crate::token::TokenCodec;

#[derive(Clone)]
pub struct AppState(pub Arc<AppStateInner>);

pub struct AppStateInner {
    pub catalogue: CatalogueStore,
    pub catalogue_source: Arc<dyn CatalogueSource>,
    pub counters: Arc<dyn CounterStore>,
    pub pacing: PacingRegistry,
    pub predictor: CtrPredictorClient,
    pub token_codec: TokenCodec,
    pub macros: MacroRegistry,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub geo: Arc<dyn GeoResolver>,
    pub config: Config,
    pub metrics_handle: PrometheusHandle,
}

impl std::ops::Deref for AppState {
    type Target = AppStateInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

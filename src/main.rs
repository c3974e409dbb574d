use std::sync::Arc;
use std::time::Duration;

use adserver::analytics::LoggingAnalyticsSink;
use adserver::catalogue::{CatalogueData, CatalogueStore, StaticCatalogueSource};
use adserver::config::{Config, CounterBackend};
use adserver::counters::{CounterStore, InMemoryCounterStore};
#[cfg(feature = "counter-redis")]
use adserver::counters::RedisCounterStore;
use adserver::geo::NullGeoResolver;
use adserver::macro_expand::MacroRegistry;
use adserver::pacing::PacingRegistry;
use adserver::predictor::CtrPredictorClient;
use adserver::state::{AppState, AppStateInner};
use adserver::token::TokenCodec;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    let metrics_handle = adserver::metrics::install()?;

    let counters: Arc<dyn CounterStore> = match config.counter_backend {
        CounterBackend::Memory => Arc::new(InMemoryCounterStore::new()),
        #[cfg(feature = "counter-redis")]
        CounterBackend::Redis => Arc::new(RedisCounterStore::new(&config.redis_url)?),
        #[cfg(not(feature = "counter-redis"))]
        CounterBackend::Redis => {
            anyhow::bail!("COUNTER_BACKEND=redis requires building with --features counter-redis")
        }
    };

    let state = AppState(Arc::new(AppStateInner {
        catalogue: CatalogueStore::new(),
        catalogue_source: Arc::new(StaticCatalogueSource::new(CatalogueData::default())),
        counters: counters.clone(),
        pacing: PacingRegistry::with_counters(counters.clone()),
        predictor: CtrPredictorClient::new(config.predictor_url.clone(), config.predictor_timeout, config.predictor_cache_ttl),
        token_codec: TokenCodec::new(config.token_secret.clone(), config.token_ttl.as_secs() as i64),
        macros: MacroRegistry::new(),
        analytics: Arc::new(LoggingAnalyticsSink::new(config.event_log_sample_rate)),
        geo: Arc::new(NullGeoResolver),
        config: config.clone(),
        metrics_handle,
    }));

    spawn_maintenance_tasks(state.clone());

    let app = adserver::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "ad server listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>()).await?;

    Ok(())
}

fn spawn_maintenance_tasks(state: AppState) {
    let predictor_sweep_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            predictor_sweep_state.predictor.sweep_expired();
        }
    });

    let counter_sweep_state = state;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let cutoff = adserver::token::now() - 2 * 86_400;
            if let Err(err) = counter_sweep_state.counters.sweep(cutoff).await {
                tracing::warn!(error = %err, "counter store sweep failed");
            }
        }
    });
}

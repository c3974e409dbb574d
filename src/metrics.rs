//! Prometheus exposition.
//!
//! Installs the global recorder once at startup; every `metrics::counter!`/
//! `histogram!` call elsewhere in the crate records into it. Trimmed to the
//! handle-based API since this crate exposes `/metrics` itself rather than
//! running the exporter's own HTTP listener.

use std::sync::{Mutex, OnceLock};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static INSTALL_LOCK: Mutex<()> = Mutex::new(());

/// Installs the global recorder on first call. Later calls — multiple
/// integration test binaries' `build_test_app` helpers in particular, which
/// each build a fresh `AppState` in the same process — return the cached
/// handle instead of erroring on an already-installed recorder.
pub fn install() -> anyhow::Result<PrometheusHandle> {
    if let Some(handle) = HANDLE.get() {
        return Ok(handle.clone());
    }
    let _guard = INSTALL_LOCK.lock().unwrap();
    if let Some(handle) = HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = HANDLE.set(handle.clone());
    Ok(handle)
}

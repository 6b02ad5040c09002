// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod bootstrap;
pub mod cancel;
pub mod config;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod rank;
pub mod score;
pub mod store;
pub mod text;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::cancel::{CancelToken, Cancelled};
pub use crate::pipeline::{Curator, RunOutcome, RunSettings};

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tracing::info;

use crate::api::AppState;
use crate::bootstrap::{BuildOptions, Runtime};

/// Build the full HTTP app from the environment: config, secrets, optional
/// `/metrics` (`METRICS_ENABLED=1`), run timeout (`CURATOR_RUN_TIMEOUT_SECS`).
pub async fn app() -> anyhow::Result<Router> {
    let rt = Runtime::from_env(BuildOptions::default()).await?;

    let timeout = std::env::var("CURATOR_RUN_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
        .unwrap_or(api::DEFAULT_RUN_TIMEOUT);

    let mut app = router(AppState::new(Arc::new(rt.curator)).with_run_timeout(timeout));

    let metrics_on = std::env::var("METRICS_ENABLED")
        .ok()
        .is_some_and(|v| v == "1");
    if metrics_on {
        let m = crate::metrics::Metrics::init()?;
        app = app.merge(m.router());
        info!("metrics exposed at /metrics");
    }

    info!(run_timeout_secs = timeout.as_secs(), "curator app ready");
    Ok(app)
}

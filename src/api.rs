// src/api.rs
//! HTTP trigger: health check plus a POST that runs one curation pass.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::cancel::CancelToken;
use crate::pipeline::Curator;

/// A run that outlives this is cancelled.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(540);

#[derive(Clone)]
pub struct AppState {
    curator: Arc<Curator>,
    // Runs share one retention store; never overlap them.
    run_lock: Arc<Mutex<()>>,
    run_timeout: Duration,
}

impl AppState {
    pub fn new(curator: Arc<Curator>) -> Self {
        Self {
            curator,
            run_lock: Arc::new(Mutex::new(())),
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/run", post(run))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn run(State(state): State<AppState>) -> (StatusCode, String) {
    let _guard = state.run_lock.lock().await;
    let cancel = CancelToken::with_timeout(state.run_timeout);
    let label = chrono::Utc::now().format("%Y-%m-%d").to_string();

    match state.curator.run_once(&label, &cancel).await {
        Ok(outcome) => (StatusCode::OK, outcome.message()),
        // Details stay in the logs.
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "curation run failed".to_string(),
        ),
    }
}

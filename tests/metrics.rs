// tests/metrics.rs
//
// The Prometheus recorder is process-global, so this file holds a single test.

mod common;

use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use feed_curator::api::AppState;
use feed_curator::ingest::feed::FixtureFeed;
use feed_curator::metrics::Metrics;
use feed_curator::score::Scorer;
use feed_curator::{router, Curator, RunSettings};

use common::{eval_json, rss, RecordingNotifier, ScriptedModel, StubContent};

#[tokio::test]
async fn run_counters_show_up_on_metrics_endpoint() {
    let metrics = Metrics::init().expect("install recorder once per process");

    let clock = common::clock();
    let model = ScriptedModel::new()
        .answer("Async Rust", eval_json(90, &["Rust"]))
        .answer("Gardening", eval_json(0, &[]));
    let curator = Curator::new(
        vec![Box::new(FixtureFeed::new(
            "Blog",
            rss(&[
                ("Async Rust", "https://blog.test/async"),
                ("Gardening", "https://blog.test/garden"),
            ]),
        ))],
        Arc::new(StubContent::ok()),
        Scorer::new(Arc::new(model)),
        RecordingNotifier::ok(),
        common::memory_store(&clock),
        RunSettings {
            topics: vec!["Rust".into()],
            with_overview: false,
            ..Default::default()
        },
    );
    let app = router(AppState::new(Arc::new(curator))).merge(metrics.router());

    let resp = app
        .clone()
        .oneshot(Request::post("/run").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        r#"curator_runs_total{outcome="delivered"} 1"#,
        "curator_items_fetched_total 2",
        "curator_scored_total 2",
        r#"curator_rejected_total{reason="no_topic_match"} 1"#,
        "curator_delivered_items_total 1",
        "curator_run_duration_ms",
    ] {
        assert!(
            text.contains(needle),
            "metrics exposition missing '{needle}'\n{text}"
        );
    }
}

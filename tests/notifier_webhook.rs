// tests/notifier_webhook.rs
//
// HttpTransport + DiscordNotifier against a local axum stand-in for the
// webhook endpoint. Each test scripts the responses the stub hands back.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use feed_curator::error::NotifyError;
use feed_curator::model::{CandidateItem, Overview, RankedBatch, RelevanceAssessment, ScoredItem};
use feed_curator::notify::discord::{DiscordNotifier, HttpTransport, NO_CONTENT_ID};
use feed_curator::notify::Notifier;
use feed_curator::CancelToken;

#[derive(Clone, Default)]
struct Stub {
    replies: Arc<Mutex<VecDeque<(u16, String)>>>,
    hits: Arc<AtomicUsize>,
    last_body: Arc<Mutex<Option<Value>>>,
}

async fn webhook(State(stub): State<Stub>, Json(body): Json<Value>) -> (StatusCode, String) {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    *stub.last_body.lock() = Some(body);
    let (status, text) = stub
        .replies
        .lock()
        .pop_front()
        .unwrap_or((500, r#"{"message":"no reply scripted","code":0}"#.to_string()));
    (StatusCode::from_u16(status).unwrap(), text)
}

async fn spawn_stub(replies: Vec<(u16, &str)>) -> (String, Stub) {
    let stub = Stub::default();
    stub.replies
        .lock()
        .extend(replies.into_iter().map(|(s, b)| (s, b.to_string())));

    let app = Router::new()
        .route("/api/webhooks/1/token", post(webhook))
        .with_state(stub.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api/webhooks/1/token"), stub)
}

fn notifier(url: String) -> DiscordNotifier {
    DiscordNotifier::new(Arc::new(HttpTransport::new(url).with_timeout(5)))
        .with_backoff_base(Duration::from_millis(10))
}

fn scored(i: usize) -> ScoredItem {
    let ts = Utc.with_ymd_and_hms(2025, 3, 1, 6, 0, 0).unwrap();
    let url = format!("https://blog.test/{i}");
    ScoredItem {
        item: CandidateItem {
            title: format!("Post {i}"),
            url: url.clone(),
            source: "Blog".into(),
            published_at: ts,
            fetched_at: ts,
        },
        title: format!("Post {i}"),
        assessment: RelevanceAssessment {
            url,
            score: 80,
            matching_topics: vec!["Rust".into()],
            summary: "A practical walkthrough with runnable code and measured results.".into(),
            reasoning: String::new(),
            is_relevant: true,
            evaluated_at: ts,
        },
    }
}

fn batch(n: usize) -> RankedBatch {
    RankedBatch::new((0..n).map(scored).collect())
}

#[tokio::test]
async fn posts_discord_payload_and_returns_message_id() {
    let (url, stub) = spawn_stub(vec![(200, r#"{"id":"1234567890"}"#)]).await;

    let id = notifier(url)
        .deliver(&batch(2), "2025-03-01", &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(id, "1234567890");
    assert_eq!(stub.hits.load(Ordering::SeqCst), 1);

    let body = stub.last_body.lock().clone().unwrap();
    assert!(body["content"].as_str().unwrap().contains("2025-03-01"));
    let embeds = body["embeds"].as_array().unwrap();
    assert_eq!(embeds.len(), 2);
    assert_eq!(embeds[0]["title"], "Post 0");
    assert_eq!(embeds[0]["url"], "https://blog.test/0");
}

#[tokio::test]
async fn no_content_reply_is_success() {
    let (url, _stub) = spawn_stub(vec![(204, "")]).await;
    let id = notifier(url)
        .deliver(&batch(1), "x", &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(id, NO_CONTENT_ID);
}

#[tokio::test]
async fn rate_limit_is_waited_out_then_resent() {
    let (url, stub) = spawn_stub(vec![
        (
            429,
            r#"{"message":"You are being rate limited.","retry_after":0.1,"global":false,"code":0}"#,
        ),
        (200, r#"{"id":"after-wait"}"#),
    ])
    .await;

    let n = notifier(url).with_retries(0);
    let report = n
        .send_payload(
            &feed_curator::notify::format::build_payload(&batch(1), "x"),
            &CancelToken::new(),
        )
        .await;
    // A rate-limit wait does not spend a retry.
    assert_eq!(report.outcome.unwrap(), "after-wait");
    assert_eq!(report.rate_limit_waits, 1);
    assert_eq!(report.backoffs, 0);
    assert_eq!(stub.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn server_errors_are_retried_with_backoff() {
    let (url, stub) = spawn_stub(vec![
        (502, "bad gateway"),
        (500, r#"{"message":"oops","code":0}"#),
        (200, r#"{"id":"third-time"}"#),
    ])
    .await;

    let id = notifier(url)
        .deliver(&batch(1), "x", &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(id, "third-time");
    assert_eq!(stub.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retries_run_out() {
    let (url, stub) = spawn_stub(vec![
        (500, "a"),
        (500, "b"),
        (500, "c"),
        (500, "d"),
    ])
    .await;

    let err = notifier(url)
        .deliver(&batch(1), "x", &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, NotifyError::Exhausted { retries: 3, .. }));
    assert_eq!(stub.hits.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn unknown_webhook_is_not_retried() {
    let (url, stub) = spawn_stub(vec![(404, r#"{"message":"Unknown Webhook","code":10015}"#)]).await;

    let err = notifier(url)
        .deliver(&batch(1), "x", &CancelToken::new())
        .await
        .unwrap_err();
    match err {
        NotifyError::Api { status, code, .. } => {
            assert_eq!(status, 404);
            assert_eq!(code, 10015);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(stub.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn oversized_batch_never_reaches_the_wire() {
    let (url, stub) = spawn_stub(vec![(200, r#"{"id":"nope"}"#)]).await;

    let over = batch(10).with_overview(Some(Overview {
        overall_summary: "eleven cards".into(),
        ..Default::default()
    }));
    let err = notifier(url)
        .deliver(&over, "x", &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, NotifyError::TooManyCards { count: 11, max: 10 }));
    assert_eq!(stub.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancellation_interrupts_backoff() {
    let (url, _stub) = spawn_stub(vec![(500, "a"), (500, "b")]).await;

    let n = DiscordNotifier::new(Arc::new(HttpTransport::new(url)))
        .with_backoff_base(Duration::from_secs(30));
    let cancel = CancelToken::with_timeout(Duration::from_millis(200));
    let err = n.deliver(&batch(1), "x", &cancel).await.unwrap_err();
    assert!(matches!(err, NotifyError::Cancelled));
}

//! End-to-end daily limit behaviour: interceptor → bridge → SQLite, with a
//! local stand-in for the compression service.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{routing::get, routing::post, Json, Router};
use chrono::NaiveDate;
use serde_json::{json, Value};
use tempfile::TempDir;

use sequoia_bridge::{BridgeConfig, OracleConfig};
use sequoia_core::notifications::{Notice, NotificationResult, Notifier};
use sequoia_core::Provider;
use sequoia_proxy::{InterceptedRequest, Interceptor, Outcome};
use sequoia_storage::Database;

fn day_one() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, 3).unwrap()
}

fn day_two() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, 4).unwrap()
}

#[derive(Default)]
struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) -> NotificationResult {
        self.notices.lock().unwrap().push(notice.clone());
        NotificationResult::Sent
    }
}

impl RecordingNotifier {
    fn limit_notices(&self) -> usize {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter(|n| matches!(n, Notice::DailyLimitReached { .. }))
            .count()
    }
}

async fn oracle() -> String {
    let app = Router::new()
        .route(
            "/log-message",
            post(|Json(body): Json<Value>| async move {
                let message = body["message"].as_str().unwrap_or_default();
                Json(json!({
                    "compression": {
                        "success": true,
                        "compressed": message.replace("please ", ""),
                        "original_tokens": 12,
                        "compressed_tokens": 10,
                        "method": "stopwords"
                    }
                }))
            }),
        )
        .route(
            "/health",
            get(|| async { Json(json!({"status": "healthy", "total_messages": 0})) }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn config(oracle_url: &str) -> BridgeConfig {
    BridgeConfig::default()
        .with_oracle(OracleConfig::default().with_base_url(oracle_url))
        .with_health_interval(Duration::from_secs(3600))
}

fn send(prompt: &str) -> InterceptedRequest {
    InterceptedRequest::new(
        "POST",
        "https://chatgpt.com/backend-api/conversation",
        json!({
            "action": "next",
            "messages": [{
                "author": {"role": "user"},
                "content": {"content_type": "text", "parts": [prompt]}
            }]
        })
        .to_string(),
    )
}

#[tokio::test]
async fn limit_of_two_allows_two_then_blocks() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::with_path(temp_dir.path().join("sequoia.db")).unwrap();
    db.initialize_defaults(day_one()).unwrap();

    let oracle_url = oracle().await;
    let (client, handle) =
        sequoia_bridge::spawn_with_clock(db.clone(), config(&oracle_url), day_one).unwrap();
    assert_eq!(client.set_daily_limit(2).await.unwrap(), 2);

    let notifier = Arc::new(RecordingNotifier::default());
    let interceptor = Interceptor::new(client.clone(), notifier.clone());

    for n in 1..=2 {
        let interception = interceptor
            .intercept(send("please summarise this article for me"))
            .await;
        assert_eq!(
            interception.outcome,
            Outcome::Compressed {
                provider: Provider::ChatGpt,
                original_chars: 36,
                compressed_chars: 29,
            },
            "message {n}"
        );
        assert_eq!(db.check_daily_limit(day_one()).unwrap().daily_message_count, n);
    }
    assert_eq!(notifier.limit_notices(), 0);

    let blocked = send("please summarise this article for me");
    let interception = interceptor.intercept(blocked.clone()).await;
    assert!(matches!(
        interception.outcome,
        Outcome::LimitExceeded { status } if status.is_exceeded && status.daily_limit == 2
    ));
    assert_eq!(interception.request, blocked);
    assert_eq!(notifier.limit_notices(), 1);

    let status = db.check_daily_limit(day_one()).unwrap();
    assert_eq!(status.daily_message_count, 2);
    assert!(status.is_exceeded);

    // Two compressions, two tokens each.
    let savings = client.savings().await.unwrap().total;
    assert!((savings.water_saved - 2.0).abs() < 1e-9);
    assert!((savings.co2_saved - 0.16).abs() < 1e-9);
    assert_eq!(db.count_compressions().unwrap(), 2);

    handle.stop().await;
}

#[tokio::test]
async fn count_rolls_over_on_a_new_day() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sequoia.db");
    let oracle_url = oracle().await;

    {
        let db = Database::with_path(&path).unwrap();
        db.initialize_defaults(day_one()).unwrap();
        db.set_daily_limit(1).unwrap();

        let (client, handle) =
            sequoia_bridge::spawn_with_clock(db, config(&oracle_url), day_one).unwrap();
        let interceptor = Interceptor::new(client, Arc::new(RecordingNotifier::default()));

        let first = interceptor.intercept(send("please translate this sentence")).await;
        assert!(first.is_modified());
        let second = interceptor.intercept(send("please translate this sentence")).await;
        assert!(matches!(second.outcome, Outcome::LimitExceeded { .. }));

        handle.stop().await;
    }

    let db = Database::with_path(&path).unwrap();
    let (client, handle) =
        sequoia_bridge::spawn_with_clock(db.clone(), config(&oracle_url), day_two).unwrap();
    let interceptor = Interceptor::new(client, Arc::new(RecordingNotifier::default()));

    let next_day = interceptor.intercept(send("please translate this sentence")).await;
    assert!(next_day.is_modified());
    assert_eq!(db.check_daily_limit(day_two()).unwrap().daily_message_count, 1);

    handle.stop().await;
}

#[tokio::test]
async fn unlimited_never_blocks_or_counts() {
    let db = Database::in_memory().unwrap();
    db.initialize_defaults(day_one()).unwrap();

    let oracle_url = oracle().await;
    let (client, handle) =
        sequoia_bridge::spawn_with_clock(db.clone(), config(&oracle_url), day_one).unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let interceptor = Interceptor::new(client, notifier.clone());

    for _ in 0..5 {
        let interception = interceptor.intercept(send("please explain lifetimes")).await;
        assert!(interception.is_modified());
    }
    assert_eq!(notifier.limit_notices(), 0);
    assert_eq!(db.check_daily_limit(day_one()).unwrap().daily_message_count, 0);

    handle.stop().await;
}

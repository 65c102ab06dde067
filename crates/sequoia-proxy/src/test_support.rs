//! Shared fixtures for the unit tests.

use std::sync::Mutex;
use std::time::Duration;

use axum::{routing::get, routing::post, Json, Router};
use chrono::NaiveDate;
use serde_json::{json, Value};

use sequoia_bridge::{BridgeClient, BridgeConfig, BridgeHandle, OracleConfig};
use sequoia_core::notifications::{Notice, NotificationResult, Notifier};
use sequoia_storage::Database;

pub(crate) fn fixed_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, 3).unwrap()
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn with_health(app: Router) -> Router {
    app.route("/health", get(|| async { Json(json!({"status": "healthy"})) }))
}

/// Oracle that answers every prompt with `reply` after `delay`.
pub(crate) async fn fixed_oracle(reply: Value, delay: Duration) -> String {
    let app = Router::new().route(
        "/log-message",
        post(move || {
            let reply = reply.clone();
            async move {
                tokio::time::sleep(delay).await;
                Json(reply)
            }
        }),
    );
    serve(with_health(app)).await
}

/// Oracle that shortens "are you" to "r u" and leaves everything else.
pub(crate) async fn shortening_oracle() -> String {
    let app = Router::new().route(
        "/log-message",
        post(|Json(body): Json<Value>| async move {
            let message = body["message"].as_str().unwrap_or_default().to_string();
            let compressed = message.replace("are you", "r u");
            let saved = if compressed == message { 0 } else { 2 };
            Json(json!({
                "compression": {
                    "success": true,
                    "compressed": compressed,
                    "original_tokens": 10,
                    "compressed_tokens": 10 - saved,
                    "method": "fake"
                }
            }))
        }),
    );
    serve(with_health(app)).await
}

pub(crate) fn bridge_with(oracle_url: &str, db: Database) -> (BridgeClient, BridgeHandle) {
    let config = BridgeConfig::default()
        .with_oracle(OracleConfig::default().with_base_url(oracle_url))
        .with_health_interval(Duration::from_secs(3600));
    sequoia_bridge::spawn_with_clock(db, config, fixed_day).unwrap()
}

pub(crate) fn bridge(oracle_url: &str) -> (BridgeClient, BridgeHandle) {
    let db = Database::in_memory().unwrap();
    db.initialize_defaults(fixed_day()).unwrap();
    bridge_with(oracle_url, db)
}

/// Notifier that keeps every notice it is given.
#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub(crate) fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) -> NotificationResult {
        self.notices.lock().unwrap().push(notice.clone());
        NotificationResult::Sent
    }
}

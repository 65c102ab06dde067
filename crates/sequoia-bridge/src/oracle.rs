//! HTTP client for the compression oracle.

use serde::{Deserialize, Serialize};

use crate::config::OracleConfig;
use crate::error::OracleError;
use crate::protocol::CompressionResult;

#[derive(Debug, Serialize)]
struct LogMessageRequest<'a> {
    message: &'a str,
    url: &'a str,
}

/// Body of a `POST /log-message` reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogMessageReply {
    #[serde(default)]
    pub compression: Option<CompressionResult>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of a `GET /health` reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthReply {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total_messages: Option<u64>,
    #[serde(default)]
    pub compression_method: Option<String>,
}

/// Talks to the compression oracle.
#[derive(Debug, Clone)]
pub struct OracleClient {
    config: OracleConfig,
    client: reqwest::Client,
}

impl OracleClient {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("Sequoia/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// Sends a prompt and returns the oracle's compression result.
    ///
    /// A reply without a `compression` object yields a failed result; an
    /// `{error}` reply is an error.
    pub async fn log_message(
        &self,
        message: &str,
        url: &str,
    ) -> Result<CompressionResult, OracleError> {
        let response = self
            .client
            .post(self.config.endpoint("/log-message"))
            .json(&LogMessageRequest { message, url })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status(status.as_u16()));
        }

        let reply: LogMessageReply = response.json().await?;
        if let Some(error) = reply.error {
            return Err(OracleError::Service(error));
        }

        Ok(reply.compression.unwrap_or_else(CompressionResult::failed))
    }

    /// Probes `GET /health`.
    pub async fn health(&self) -> Result<HealthReply, OracleError> {
        let response = self.client.get(self.config.endpoint("/health")).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status(status.as_u16()));
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::time::Duration;

    async fn serve(app: Router) -> OracleClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = OracleConfig::default()
            .with_base_url(format!("http://{}", addr))
            .with_timeout(Duration::from_millis(500));
        OracleClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_log_message_success() {
        let app = Router::new().route(
            "/log-message",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["url"], json!("https://claude.ai/api/x"));
                Json(json!({
                    "status": "success",
                    "compression": {
                        "success": true,
                        "compressed": "short prompt",
                        "original_tokens": 20,
                        "compressed_tokens": 8,
                        "compression_ratio": 40.0,
                        "method": "SCCompressor"
                    }
                }))
            }),
        );
        let oracle = serve(app).await;

        let result = oracle
            .log_message("a rather long prompt", "https://claude.ai/api/x")
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.compressed_text(), Some("short prompt"));
        assert_eq!(result.tokens_saved(), Some(12));
        assert_eq!(result.method.as_deref(), Some("SCCompressor"));
    }

    #[tokio::test]
    async fn test_log_message_without_compression_is_failure() {
        let app = Router::new().route("/log-message", post(|| async { Json(json!({})) }));
        let oracle = serve(app).await;

        let result = oracle.log_message("whatever it is", "u").await.unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_log_message_http_error() {
        let app = Router::new().route(
            "/log-message",
            post(|| async { (StatusCode::BAD_REQUEST, Json(json!({"error": "No message provided"}))) }),
        );
        let oracle = serve(app).await;

        let err = oracle.log_message("", "u").await.unwrap_err();
        assert!(matches!(err, OracleError::Status(400)));
    }

    #[tokio::test]
    async fn test_log_message_timeout() {
        let app = Router::new().route(
            "/log-message",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({}))
            }),
        );
        let oracle = serve(app).await;

        let err = oracle.log_message("slow prompt text", "u").await.unwrap_err();
        assert!(matches!(err, OracleError::Http(_)));
    }

    #[tokio::test]
    async fn test_health() {
        let app = Router::new().route(
            "/health",
            get(|| async { Json(json!({"status": "healthy", "total_messages": 42})) }),
        );
        let oracle = serve(app).await;

        let health = oracle.health().await.unwrap();
        assert_eq!(health.status.as_deref(), Some("healthy"));
        assert_eq!(health.total_messages, Some(42));
    }

    #[tokio::test]
    async fn test_unreachable() {
        let config = OracleConfig::default()
            .with_base_url("http://127.0.0.1:1")
            .with_timeout(Duration::from_millis(200));
        let oracle = OracleClient::new(config).unwrap();

        assert!(oracle.health().await.is_err());
    }
}

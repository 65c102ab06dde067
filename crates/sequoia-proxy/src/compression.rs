//! Prompt compression over the bridge.

use std::time::Duration;

use tracing::{debug, warn};

use sequoia_bridge::{BridgeClient, BridgeError};

/// How long the interceptor waits for a compressed prompt.
pub const DEFAULT_COMPRESSION_TIMEOUT: Duration = Duration::from_secs(3);

/// Asks the oracle (through the bridge) for a shorter prompt.
#[derive(Clone)]
pub struct Compressor {
    client: BridgeClient,
    timeout: Duration,
}

impl Compressor {
    pub fn new(client: BridgeClient) -> Self {
        Self {
            client,
            timeout: DEFAULT_COMPRESSION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the compressed prompt, or `text` unchanged when compression
    /// is unavailable for any reason.
    pub async fn compress(&self, text: &str, page_url: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        match self.client.log_message(text, page_url, self.timeout).await {
            Ok(result) => match result.compressed_text() {
                Some(compressed) => compressed.to_string(),
                None => {
                    debug!(
                        method = result.method.as_deref().unwrap_or("unknown"),
                        "Compression unsuccessful, keeping original"
                    );
                    text.to_string()
                }
            },
            Err(BridgeError::Timeout(after)) => {
                warn!(?after, "Compression timed out, keeping original");
                text.to_string()
            }
            Err(e) => {
                warn!(error = %e, "Compression failed, keeping original");
                text.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bridge, fixed_oracle};
    use serde_json::json;

    #[tokio::test]
    async fn returns_compressed_text() {
        let url = fixed_oracle(
            json!({"compression": {
                "success": true,
                "compressed": "how r u man",
                "original_tokens": 5,
                "compressed_tokens": 4,
                "method": "fake"
            }}),
            Duration::ZERO,
        )
        .await;
        let (client, handle) = bridge(&url);

        let compressor = Compressor::new(client);
        let out = compressor
            .compress("how are you man", "https://gemini.google.com/app")
            .await;
        assert_eq!(out, "how r u man");

        handle.stop().await;
    }

    #[tokio::test]
    async fn unsuccessful_result_keeps_original() {
        let url = fixed_oracle(
            json!({"compression": {"success": false, "compressed": "x", "method": "none"}}),
            Duration::ZERO,
        )
        .await;
        let (client, handle) = bridge(&url);

        let out = Compressor::new(client)
            .compress("please keep this prompt", "https://claude.ai/new")
            .await;
        assert_eq!(out, "please keep this prompt");

        handle.stop().await;
    }

    #[tokio::test]
    async fn missing_success_keeps_original() {
        let url = fixed_oracle(
            json!({"compression": {"compressed": "x", "method": "none"}}),
            Duration::ZERO,
        )
        .await;
        let (client, handle) = bridge(&url);

        let out = Compressor::new(client)
            .compress("please keep this prompt", "https://claude.ai/new")
            .await;
        assert_eq!(out, "please keep this prompt");

        handle.stop().await;
    }

    #[tokio::test]
    async fn empty_compressed_text_keeps_original() {
        let url = fixed_oracle(
            json!({"compression": {"success": true, "compressed": "", "method": "fake"}}),
            Duration::ZERO,
        )
        .await;
        let (client, handle) = bridge(&url);

        let out = Compressor::new(client)
            .compress("please keep this prompt", "https://claude.ai/new")
            .await;
        assert_eq!(out, "please keep this prompt");

        handle.stop().await;
    }

    #[tokio::test]
    async fn slow_oracle_times_out_to_original() {
        let url = fixed_oracle(
            json!({"compression": {"success": true, "compressed": "short", "method": "fake"}}),
            Duration::from_millis(800),
        )
        .await;
        let (client, handle) = bridge(&url);

        let compressor = Compressor::new(client).with_timeout(Duration::from_millis(100));
        let out = compressor
            .compress("a prompt that is slow to compress", "https://chatgpt.com/")
            .await;
        assert_eq!(out, "a prompt that is slow to compress");

        handle.stop().await;
    }

    #[tokio::test]
    async fn unreachable_oracle_keeps_original() {
        let (client, handle) = bridge("http://127.0.0.1:1");

        let out = Compressor::new(client)
            .compress("nobody is listening here", "https://grok.com/")
            .await;
        assert_eq!(out, "nobody is listening here");

        handle.stop().await;
    }

    #[tokio::test]
    async fn stopped_bridge_keeps_original() {
        let (client, handle) = bridge("http://127.0.0.1:1");
        handle.stop().await;

        let out = Compressor::new(client)
            .compress("the bridge has gone away", "https://grok.com/")
            .await;
        assert_eq!(out, "the bridge has gone away");
    }
}

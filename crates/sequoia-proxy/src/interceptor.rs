//! The per-request interception pipeline.
//!
//! classify → extract → limit check → count → (paused?) → compress →
//! rewrite. Any step that cannot proceed leaves the request as it was; the
//! caller always dispatches whatever [`Interception::request`] holds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sequoia_bridge::{BridgeClient, BridgeEvent};
use sequoia_core::notifications::{Notice, Notifier};
use sequoia_core::{classify, extract, rewrite, DailyLimitStatus, Provider, RequestBody};

use crate::compression::{Compressor, DEFAULT_COMPRESSION_TIMEOUT};
use crate::hooks::HookRegistry;

/// How long to wait for the daily limit check and the increment.
pub const DEFAULT_LIMIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Interceptor timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterceptorConfig {
    pub limit_timeout: Duration,
    pub compression_timeout: Duration,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            limit_timeout: DEFAULT_LIMIT_TIMEOUT,
            compression_timeout: DEFAULT_COMPRESSION_TIMEOUT,
        }
    }
}

impl InterceptorConfig {
    pub fn with_limit_timeout(mut self, timeout: Duration) -> Self {
        self.limit_timeout = timeout;
        self
    }

    pub fn with_compression_timeout(mut self, timeout: Duration) -> Self {
        self.compression_timeout = timeout;
        self
    }
}

/// An outgoing request as seen by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct InterceptedRequest {
    pub url: String,
    pub method: String,
    pub body: RequestBody,
    /// Page the request was issued from; relative URLs resolve against it.
    pub origin: Option<String>,
}

impl InterceptedRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>, body: impl Into<RequestBody>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            body: body.into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    fn is_post(&self) -> bool {
        self.method.eq_ignore_ascii_case("POST")
    }

    /// URL reported to the oracle alongside the prompt.
    fn page_url(&self) -> &str {
        self.origin.as_deref().unwrap_or(&self.url)
    }
}

/// What the pipeline did with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Not a POST, or not a provider endpoint.
    Skipped,
    /// Provider endpoint, but no user prompt long enough to touch.
    NoMessage { provider: Provider },
    /// The daily limit was reached; nothing was counted or rewritten.
    LimitExceeded { status: DailyLimitStatus },
    /// Counted, but compression is paused.
    Paused { provider: Provider },
    /// The oracle had nothing shorter to offer.
    Unchanged { provider: Provider },
    /// The prompt was replaced.
    Compressed {
        provider: Provider,
        original_chars: usize,
        compressed_chars: usize,
    },
    /// A compressed prompt came back but could not be written into the body.
    RewriteFailed { provider: Provider },
}

/// The request to dispatch, plus what happened to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Interception {
    pub request: InterceptedRequest,
    pub outcome: Outcome,
}

impl Interception {
    pub fn is_modified(&self) -> bool {
        matches!(self.outcome, Outcome::Compressed { .. })
    }
}

/// Runs the pipeline against a bridge. Cheap to clone; clones share the
/// cached pause flag and the hook registry.
#[derive(Clone)]
pub struct Interceptor {
    client: BridgeClient,
    compressor: Compressor,
    notifier: Arc<dyn Notifier>,
    config: InterceptorConfig,
    paused: Arc<AtomicBool>,
    hooks: HookRegistry,
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("config", &self.config)
            .field("paused", &self.is_paused())
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl Interceptor {
    pub fn new(client: BridgeClient, notifier: Arc<dyn Notifier>) -> Self {
        let config = InterceptorConfig::default();
        Self {
            compressor: Compressor::new(client.clone()).with_timeout(config.compression_timeout),
            client,
            notifier,
            config,
            paused: Arc::new(AtomicBool::new(false)),
            hooks: HookRegistry::default(),
        }
    }

    pub fn with_config(mut self, config: InterceptorConfig) -> Self {
        self.compressor = self.compressor.with_timeout(config.compression_timeout);
        self.config = config;
        self
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> InterceptorConfig {
        self.config
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn client(&self) -> &BridgeClient {
        &self.client
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Reads the stored pause flag into the local cache.
    pub async fn sync_pause_state(&self) -> bool {
        match self.client.settings().await {
            Ok(settings) => {
                self.paused.store(settings.is_paused, Ordering::SeqCst);
                settings.is_paused
            }
            Err(e) => {
                warn!("Could not read pause state, assuming active: {}", e);
                self.is_paused()
            }
        }
    }

    /// Follows `PauseStateUpdate` events until the event channel closes.
    pub fn spawn_pause_listener(&self) -> JoinHandle<()> {
        let mut events = self.client.subscribe();
        let paused = self.paused.clone();
        let notifier = self.notifier.clone();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(BridgeEvent::PauseStateUpdate { paused: now }) => {
                        paused.store(now, Ordering::SeqCst);
                        info!(paused = now, "Pause state updated");
                        notifier.notify(&Notice::PauseChanged { paused: now });
                    }
                    Err(RecvError::Lagged(missed)) => {
                        debug!(missed, "Pause listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Pause listener stopped");
        })
    }

    /// Runs the pipeline. Never fails: the returned request is always safe
    /// to dispatch.
    pub async fn intercept(&self, mut request: InterceptedRequest) -> Interception {
        let outcome = self.run(&mut request).await;
        Interception { request, outcome }
    }

    async fn run(&self, request: &mut InterceptedRequest) -> Outcome {
        if !request.is_post() {
            return Outcome::Skipped;
        }

        let Some(provider) = classify(&request.url, request.origin.as_deref()) else {
            return Outcome::Skipped;
        };

        let Some(message) = extract(provider, &request.body) else {
            debug!(provider = provider.as_str(), url = %request.url, "No user message found");
            return Outcome::NoMessage { provider };
        };

        debug!(
            provider = provider.as_str(),
            chars = message.char_count(),
            "Intercepted user message"
        );

        let status = self.check_limit().await;
        if status.is_exceeded {
            self.limit_reached(status);
            return Outcome::LimitExceeded { status };
        }

        if status.daily_limit > 0 {
            match self
                .client
                .increment_daily_count(self.config.limit_timeout)
                .await
            {
                Ok(outcome) if outcome.capped => {
                    let status = DailyLimitStatus {
                        daily_limit: status.daily_limit,
                        daily_message_count: outcome.count,
                        is_exceeded: true,
                    };
                    self.limit_reached(status);
                    return Outcome::LimitExceeded { status };
                }
                Ok(outcome) => debug!(
                    count = outcome.count,
                    limit = status.daily_limit,
                    "Message counted"
                ),
                Err(e) => warn!("Failed to count message: {}", e),
            }
        }

        if self.is_paused() {
            debug!(provider = provider.as_str(), "Compression paused, sending original");
            return Outcome::Paused { provider };
        }

        let compressed = self
            .compressor
            .compress(&message.original_text, request.page_url())
            .await;
        if compressed == message.original_text {
            return Outcome::Unchanged { provider };
        }

        let original_chars = message.char_count();
        let compressed_chars = compressed.chars().count();

        match rewrite(message, &compressed) {
            Ok(body) => {
                request.body = RequestBody::Text(body);
                info!(
                    provider = provider.as_str(),
                    original_chars, compressed_chars, "Prompt compressed"
                );
                self.notifier.notify(&Notice::Compressed {
                    provider,
                    original_chars,
                    compressed_chars,
                });
                Outcome::Compressed {
                    provider,
                    original_chars,
                    compressed_chars,
                }
            }
            Err(e) => {
                warn!(provider = provider.as_str(), "Rewrite failed, sending original: {}", e);
                Outcome::RewriteFailed { provider }
            }
        }
    }

    async fn check_limit(&self) -> DailyLimitStatus {
        self.client
            .check_daily_limit(self.config.limit_timeout)
            .await
            .unwrap_or_else(|e| {
                warn!("Daily limit check failed, allowing: {}", e);
                DailyLimitStatus::permissive()
            })
    }

    fn limit_reached(&self, status: DailyLimitStatus) {
        info!(
            limit = status.daily_limit,
            count = status.daily_message_count,
            "Daily limit reached, sending original"
        );
        self.notifier.notify(&Notice::DailyLimitReached {
            limit: status.daily_limit,
            count: status.daily_message_count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bridge_with, fixed_day, shortening_oracle, RecordingNotifier};
    use sequoia_storage::Database;
    use serde_json::json;

    const GEMINI_SAMPLE: &str =
        include_str!("../../sequoia-core/src/provider/testdata/gemini_stream_generate.form");

    fn chatgpt_request(prompt: &str) -> InterceptedRequest {
        InterceptedRequest::new(
            "POST",
            "https://chatgpt.com/backend-api/conversation",
            json!({
                "action": "next",
                "messages": [{
                    "id": "m1",
                    "author": {"role": "user"},
                    "content": {"content_type": "text", "parts": [prompt]}
                }],
                "model": "auto"
            }),
        )
    }

    async fn setup(limit: i64) -> (Interceptor, Arc<RecordingNotifier>, sequoia_bridge::BridgeHandle, Database) {
        let oracle = shortening_oracle().await;
        let db = Database::in_memory().unwrap();
        db.initialize_defaults(fixed_day()).unwrap();
        db.set_daily_limit(limit).unwrap();
        let (client, handle) = bridge_with(&oracle, db.clone());
        let notifier = Arc::new(RecordingNotifier::default());
        let interceptor = Interceptor::new(client, notifier.clone());
        (interceptor, notifier, handle, db)
    }

    #[tokio::test]
    async fn get_requests_are_skipped() {
        let (interceptor, notifier, handle, _db) = setup(0).await;
        let mut request = chatgpt_request("how are you doing today");
        request.method = "GET".into();

        let interception = interceptor.intercept(request.clone()).await;
        assert_eq!(interception.outcome, Outcome::Skipped);
        assert_eq!(interception.request, request);
        assert!(notifier.notices().is_empty());

        handle.stop().await;
    }

    #[tokio::test]
    async fn unknown_endpoints_are_skipped() {
        let (interceptor, _notifier, handle, _db) = setup(0).await;
        let request = InterceptedRequest::new("POST", "https://example.com/api", "{}");

        let interception = interceptor.intercept(request).await;
        assert_eq!(interception.outcome, Outcome::Skipped);

        handle.stop().await;
    }

    #[tokio::test]
    async fn short_prompts_are_left_alone() {
        let (interceptor, _notifier, handle, db) = setup(5).await;

        let interception = interceptor.intercept(chatgpt_request("hi there")).await;
        assert_eq!(
            interception.outcome,
            Outcome::NoMessage {
                provider: Provider::ChatGpt
            }
        );
        assert_eq!(db.check_daily_limit(fixed_day()).unwrap().daily_message_count, 0);

        handle.stop().await;
    }

    #[tokio::test]
    async fn chatgpt_prompt_is_compressed_and_other_fields_kept() {
        let (interceptor, notifier, handle, _db) = setup(0).await;

        let interception = interceptor
            .intercept(chatgpt_request("hello, how are you doing today"))
            .await;
        assert!(interception.is_modified());

        let body = interception.request.body.to_json().unwrap();
        assert_eq!(body["messages"][0]["content"]["parts"], json!(["hello, how r u doing today"]));
        assert_eq!(body["action"], json!("next"));
        assert_eq!(body["model"], json!("auto"));
        assert_eq!(body["messages"][0]["id"], json!("m1"));

        assert_eq!(
            notifier.notices(),
            vec![Notice::Compressed {
                provider: Provider::ChatGpt,
                original_chars: 30,
                compressed_chars: 26,
            }]
        );

        handle.stop().await;
    }

    #[tokio::test]
    async fn gemini_sample_is_rewritten() {
        let (interceptor, _notifier, handle, _db) = setup(0).await;
        let request = InterceptedRequest::new(
            "POST",
            "https://gemini.google.com/_/BardChatUi/data/assistant.lamda.BardFrontendService/StreamGenerate",
            GEMINI_SAMPLE,
        );

        let interception = interceptor.intercept(request).await;
        assert!(interception.is_modified());

        let message = extract(Provider::Gemini, &interception.request.body).unwrap();
        assert_eq!(message.original_text, "how r u man");

        handle.stop().await;
    }

    #[tokio::test]
    async fn unchanged_prompt_keeps_body() {
        let (interceptor, notifier, handle, _db) = setup(0).await;
        let request = chatgpt_request("nothing to shorten in here");

        let interception = interceptor.intercept(request.clone()).await;
        assert_eq!(
            interception.outcome,
            Outcome::Unchanged {
                provider: Provider::ChatGpt
            }
        );
        assert_eq!(interception.request, request);
        assert!(notifier.notices().is_empty());

        handle.stop().await;
    }

    #[tokio::test]
    async fn paused_still_counts_but_does_not_compress() {
        let (interceptor, _notifier, handle, db) = setup(5).await;
        interceptor.client().set_paused(true).await.unwrap();
        assert!(interceptor.sync_pause_state().await);

        let request = chatgpt_request("hello, how are you doing today");
        let interception = interceptor.intercept(request.clone()).await;
        assert_eq!(
            interception.outcome,
            Outcome::Paused {
                provider: Provider::ChatGpt
            }
        );
        assert_eq!(interception.request, request);
        assert_eq!(db.check_daily_limit(fixed_day()).unwrap().daily_message_count, 1);

        handle.stop().await;
    }

    #[tokio::test]
    async fn unlimited_does_not_count() {
        let (interceptor, _notifier, handle, db) = setup(0).await;

        interceptor
            .intercept(chatgpt_request("hello, how are you doing today"))
            .await;
        assert_eq!(db.check_daily_limit(fixed_day()).unwrap().daily_message_count, 0);

        handle.stop().await;
    }

    #[tokio::test]
    async fn exceeded_limit_sends_original_and_notifies() {
        let (interceptor, notifier, handle, db) = setup(1).await;
        db.increment_daily_count(fixed_day()).unwrap();

        let request = chatgpt_request("hello, how are you doing today");
        let interception = interceptor.intercept(request.clone()).await;
        assert!(matches!(interception.outcome, Outcome::LimitExceeded { .. }));
        assert_eq!(interception.request, request);
        assert_eq!(
            notifier.notices(),
            vec![Notice::DailyLimitReached { limit: 1, count: 1 }]
        );

        handle.stop().await;
    }

    #[tokio::test]
    async fn pause_listener_follows_events() {
        let (interceptor, notifier, handle, _db) = setup(0).await;
        let listener = interceptor.spawn_pause_listener();

        interceptor.client().set_paused(true).await.unwrap();
        for _ in 0..50 {
            if interceptor.is_paused() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(interceptor.is_paused());
        assert_eq!(notifier.notices(), vec![Notice::PauseChanged { paused: true }]);

        listener.abort();
        handle.stop().await;
    }

    #[tokio::test]
    async fn stopped_bridge_passes_through() {
        let (interceptor, _notifier, handle, _db) = setup(3).await;
        handle.stop().await;

        let request = chatgpt_request("hello, how are you doing today");
        let interception = interceptor.intercept(request.clone()).await;
        assert_eq!(
            interception.outcome,
            Outcome::Unchanged {
                provider: Provider::ChatGpt
            }
        );
        assert_eq!(interception.request, request);
    }
}

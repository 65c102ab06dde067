//! Request primitives and their intercepting wrappers.
//!
//! A host exposes two ways to send a request: a fetch-style call that takes
//! everything at once, and an XHR-style object that is opened first and sent
//! later. [`Interceptor::wrap_fetch`] and [`Interceptor::wrap_xhr`] put the
//! pipeline in front of either one. Each kind is wrapped at most once per
//! [`HookRegistry`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use sequoia_core::RequestBody;

use crate::interceptor::{InterceptedRequest, Interceptor};

/// The two request primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Fetch,
    Xhr,
}

/// Records which primitives already carry the interceptor.
#[derive(Debug, Clone, Default)]
pub struct HookRegistry {
    fetch: Arc<AtomicBool>,
    xhr: Arc<AtomicBool>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, kind: PrimitiveKind) -> &AtomicBool {
        match kind {
            PrimitiveKind::Fetch => &self.fetch,
            PrimitiveKind::Xhr => &self.xhr,
        }
    }

    /// Claims `kind`. Returns false if it was already claimed.
    pub fn try_install(&self, kind: PrimitiveKind) -> bool {
        !self.flag(kind).swap(true, Ordering::SeqCst)
    }

    pub fn is_installed(&self, kind: PrimitiveKind) -> bool {
        self.flag(kind).load(Ordering::SeqCst)
    }
}

/// Options for a fetch-style call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOptions {
    pub method: String,
    pub body: Option<RequestBody>,
    pub headers: Vec<(String, String)>,
    /// Page issuing the request.
    pub referrer: Option<String>,
}

impl FetchOptions {
    pub fn post(body: impl Into<RequestBody>) -> Self {
        Self {
            method: "POST".to_string(),
            body: Some(body.into()),
            ..Self::default()
        }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }
}

/// A fetch-style primitive: `(url, options) -> output`.
#[async_trait]
pub trait FetchPrimitive: Send + Sync {
    type Output: Send;

    async fn fetch(&self, url: &str, options: FetchOptions) -> Self::Output;
}

/// An XHR-style primitive: `open` records the target, `send` dispatches.
#[async_trait]
pub trait XhrPrimitive: Send {
    type Output: Send;

    fn open(&mut self, method: &str, url: &str);

    /// Page the object belongs to; relative URLs resolve against it.
    fn page_origin(&self) -> Option<String> {
        None
    }

    async fn send(&mut self, body: Option<RequestBody>) -> Self::Output;
}

struct InterceptedFetch<F> {
    inner: F,
    interceptor: Interceptor,
}

#[async_trait]
impl<F: FetchPrimitive> FetchPrimitive for InterceptedFetch<F> {
    type Output = F::Output;

    async fn fetch(&self, url: &str, mut options: FetchOptions) -> F::Output {
        if let Some(body) = options.body.take() {
            let mut request = InterceptedRequest::new(options.method.clone(), url, body);
            request.origin = options.referrer.clone();

            let interception = self.interceptor.intercept(request).await;
            options.body = Some(interception.request.body);
        }
        self.inner.fetch(url, options).await
    }
}

struct InterceptedXhr<X> {
    inner: X,
    interceptor: Interceptor,
    target: Option<(String, String)>,
}

#[async_trait]
impl<X: XhrPrimitive> XhrPrimitive for InterceptedXhr<X> {
    type Output = X::Output;

    fn open(&mut self, method: &str, url: &str) {
        self.target = Some((method.to_string(), url.to_string()));
        self.inner.open(method, url);
    }

    fn page_origin(&self) -> Option<String> {
        self.inner.page_origin()
    }

    async fn send(&mut self, body: Option<RequestBody>) -> X::Output {
        let body = match (body, &self.target) {
            (Some(body), Some((method, url))) => {
                let mut request = InterceptedRequest::new(method.clone(), url.clone(), body);
                request.origin = self.inner.page_origin();
                Some(self.interceptor.intercept(request).await.request.body)
            }
            (body, _) => body,
        };
        self.inner.send(body).await
    }
}

impl Interceptor {
    /// Puts the pipeline in front of a fetch-style primitive.
    ///
    /// A second wrap through the same registry hands `original` back as is.
    pub fn wrap_fetch<F>(&self, original: F) -> Box<dyn FetchPrimitive<Output = F::Output>>
    where
        F: FetchPrimitive + 'static,
    {
        if !self.hooks().try_install(PrimitiveKind::Fetch) {
            warn!("Fetch interceptor already installed");
            return Box::new(original);
        }
        debug!("Fetch interceptor installed");
        Box::new(InterceptedFetch {
            inner: original,
            interceptor: self.clone(),
        })
    }

    /// Puts the pipeline in front of an XHR-style primitive.
    pub fn wrap_xhr<X>(&self, original: X) -> Box<dyn XhrPrimitive<Output = X::Output>>
    where
        X: XhrPrimitive + 'static,
    {
        if !self.hooks().try_install(PrimitiveKind::Xhr) {
            warn!("XHR interceptor already installed");
            return Box::new(original);
        }
        debug!("XHR interceptor installed");
        Box::new(InterceptedXhr {
            inner: original,
            interceptor: self.clone(),
            target: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bridge_with, fixed_day, shortening_oracle, RecordingNotifier};
    use sequoia_storage::Database;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Fetch fake that records what it was asked to send.
    #[derive(Clone, Default)]
    struct RecordingFetch {
        sent: Arc<Mutex<Vec<(String, Option<RequestBody>)>>>,
    }

    #[async_trait]
    impl FetchPrimitive for RecordingFetch {
        type Output = usize;

        async fn fetch(&self, url: &str, options: FetchOptions) -> usize {
            let mut sent = self.sent.lock().unwrap();
            sent.push((url.to_string(), options.body));
            sent.len()
        }
    }

    #[derive(Default)]
    struct RecordingXhr {
        page: Option<String>,
        opened: Option<(String, String)>,
        sent: Arc<Mutex<Vec<Option<RequestBody>>>>,
    }

    #[async_trait]
    impl XhrPrimitive for RecordingXhr {
        type Output = Option<(String, String)>;

        fn open(&mut self, method: &str, url: &str) {
            self.opened = Some((method.to_string(), url.to_string()));
        }

        fn page_origin(&self) -> Option<String> {
            self.page.clone()
        }

        async fn send(&mut self, body: Option<RequestBody>) -> Self::Output {
            self.sent.lock().unwrap().push(body);
            self.opened.clone()
        }
    }

    async fn interceptor() -> (Interceptor, sequoia_bridge::BridgeHandle) {
        let oracle = shortening_oracle().await;
        let db = Database::in_memory().unwrap();
        db.initialize_defaults(fixed_day()).unwrap();
        let (client, handle) = bridge_with(&oracle, db);
        let notifier = Arc::new(RecordingNotifier::default());
        (Interceptor::new(client, notifier), handle)
    }

    fn grok_body() -> Value {
        json!({"message": "so how are you feeling", "modelName": "grok-3"})
    }

    fn sent_message(body: &RequestBody) -> Value {
        body.to_json().unwrap()["message"].clone()
    }

    #[test]
    fn registry_installs_once_per_kind() {
        let registry = HookRegistry::new();
        assert!(!registry.is_installed(PrimitiveKind::Fetch));
        assert!(registry.try_install(PrimitiveKind::Fetch));
        assert!(!registry.try_install(PrimitiveKind::Fetch));
        assert!(registry.is_installed(PrimitiveKind::Fetch));

        // Kinds are independent; clones share state.
        let clone = registry.clone();
        assert!(clone.try_install(PrimitiveKind::Xhr));
        assert!(registry.is_installed(PrimitiveKind::Xhr));
    }

    #[tokio::test]
    async fn wrapped_fetch_sends_compressed_body() {
        let (interceptor, handle) = interceptor().await;
        let fake = RecordingFetch::default();
        let fetch = interceptor.wrap_fetch(fake.clone());

        let n = fetch
            .fetch(
                "https://grok.com/rest/app-chat/conversations/new",
                FetchOptions::post(grok_body()).with_referrer("https://grok.com/"),
            )
            .await;
        assert_eq!(n, 1);

        let sent = fake.sent.lock().unwrap();
        let body = sent[0].1.as_ref().unwrap();
        assert_eq!(sent_message(body), json!("so how r u feeling"));
        assert_eq!(body.to_json().unwrap()["modelName"], json!("grok-3"));

        drop(sent);
        handle.stop().await;
    }

    #[tokio::test]
    async fn wrapped_fetch_without_body_passes_through() {
        let (interceptor, handle) = interceptor().await;
        let fake = RecordingFetch::default();
        let fetch = interceptor.wrap_fetch(fake.clone());

        fetch
            .fetch("https://grok.com/rest/app-chat/x", FetchOptions::default())
            .await;
        assert_eq!(fake.sent.lock().unwrap()[0].1, None);

        handle.stop().await;
    }

    #[tokio::test]
    async fn second_fetch_wrap_returns_original() {
        let (interceptor, handle) = interceptor().await;
        let _first = interceptor.wrap_fetch(RecordingFetch::default());

        let fake = RecordingFetch::default();
        let second = interceptor.wrap_fetch(fake.clone());
        second
            .fetch(
                "https://grok.com/rest/app-chat/conversations/new",
                FetchOptions::post(grok_body()),
            )
            .await;

        // Untouched: the original primitive was returned unwrapped.
        let sent = fake.sent.lock().unwrap();
        assert_eq!(sent_message(sent[0].1.as_ref().unwrap()), json!("so how are you feeling"));

        drop(sent);
        handle.stop().await;
    }

    #[tokio::test]
    async fn wrapped_xhr_applies_same_pipeline() {
        let (interceptor, handle) = interceptor().await;
        let fake = RecordingXhr::default();
        let sent = fake.sent.clone();
        let mut xhr = interceptor.wrap_xhr(fake);

        xhr.open("POST", "https://grok.com/rest/app-chat/conversations/new");
        let opened = xhr.send(Some(RequestBody::Json(grok_body()))).await;
        assert_eq!(
            opened,
            Some((
                "POST".to_string(),
                "https://grok.com/rest/app-chat/conversations/new".to_string()
            ))
        );

        let sent = sent.lock().unwrap();
        assert_eq!(
            sent_message(sent[0].as_ref().unwrap()),
            json!("so how r u feeling")
        );

        drop(sent);
        handle.stop().await;
    }

    #[tokio::test]
    async fn second_xhr_wrap_returns_original() {
        let (interceptor, handle) = interceptor().await;
        let _first = interceptor.wrap_xhr(RecordingXhr::default());

        let fake = RecordingXhr::default();
        let sent = fake.sent.clone();
        let mut xhr = interceptor.wrap_xhr(fake);
        xhr.open("POST", "https://grok.com/rest/app-chat/conversations/new");
        xhr.send(Some(RequestBody::Json(grok_body()))).await;

        assert_eq!(
            sent_message(sent.lock().unwrap()[0].as_ref().unwrap()),
            json!("so how are you feeling")
        );

        handle.stop().await;
    }

    #[tokio::test]
    async fn relative_urls_resolve_the_same_through_both_hooks() {
        let (interceptor, handle) = interceptor().await;
        let path = "/api/organizations/o/chat_conversations/c/completion";
        let body = || RequestBody::Json(json!({"prompt": "tell me how are you today"}));

        let fetch_fake = RecordingFetch::default();
        let fetch = interceptor.wrap_fetch(fetch_fake.clone());
        fetch
            .fetch(path, FetchOptions::post(body()).with_referrer("https://claude.ai/chat/c"))
            .await;

        let xhr_fake = RecordingXhr {
            page: Some("https://claude.ai/chat/c".to_string()),
            ..RecordingXhr::default()
        };
        let xhr_sent = xhr_fake.sent.clone();
        let mut xhr = interceptor.wrap_xhr(xhr_fake);
        assert_eq!(xhr.page_origin().as_deref(), Some("https://claude.ai/chat/c"));
        xhr.open("POST", path);
        xhr.send(Some(body())).await;

        let fetched = fetch_fake.sent.lock().unwrap()[0].1.clone().unwrap();
        let sent = xhr_sent.lock().unwrap()[0].clone().unwrap();
        assert_eq!(fetched.to_json().unwrap()["prompt"], json!("tell me how r u today"));
        assert_eq!(sent, fetched);

        handle.stop().await;
    }

    #[tokio::test]
    async fn relative_xhr_url_without_page_is_left_alone() {
        let (interceptor, handle) = interceptor().await;
        let fake = RecordingXhr::default();
        let sent = fake.sent.clone();
        let mut xhr = interceptor.wrap_xhr(fake);

        xhr.open("POST", "/api/organizations/o/chat_conversations/c/completion");
        xhr.send(Some(RequestBody::Json(json!({"prompt": "tell me how are you today"}))))
            .await;

        let body = sent.lock().unwrap()[0].clone().unwrap();
        assert_eq!(body.to_json().unwrap()["prompt"], json!("tell me how are you today"));

        handle.stop().await;
    }
}

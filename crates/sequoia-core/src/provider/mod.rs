//! Chat provider request shapes.
//!
//! Every supported chat service is a [`Provider`] variant backed by one
//! [`ProviderShape`] implementation. A shape knows three things:
//!
//! - which request URLs belong to the service (literal substrings)
//! - where the user's prompt sits inside a send-message body
//! - how to put a replacement prompt back without touching any other field
//!
//! ```text
//! URL ──classify──▶ Provider ──extract──▶ ExtractedMessage ──rewrite──▶ body
//!  │                    │                        │
//!  └─ None: pass        └─ None: pass            └─ Err: send original
//! ```
//!
//! Adding a service means adding a variant and a shape module; the shared
//! control flow in the interceptor does not change.

mod chatgpt;
mod claude;
mod gemini;
mod grok;
mod messages;

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

pub use crate::error::RewriteError;
pub use messages::ContentSlot;

/// Prompts must be longer than this many characters to be touched.
///
/// Shorter payloads are titles, pings or system traffic.
pub const MIN_MESSAGE_CHARS: usize = 10;

// =============================================================================
// Provider
// =============================================================================

/// A supported chat service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// ChatGPT web app and the OpenAI API.
    ChatGpt,
    /// Claude web app.
    Claude,
    /// Gemini (and the older Bard host).
    Gemini,
    /// Grok web app.
    Grok,
}

impl Provider {
    /// All providers in classification order.
    pub const ALL: [Provider; 4] = [
        Provider::ChatGpt,
        Provider::Claude,
        Provider::Gemini,
        Provider::Grok,
    ];

    /// Returns the provider id as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::ChatGpt => "chatgpt",
            Provider::Claude => "claude",
            Provider::Gemini => "gemini",
            Provider::Grok => "grok",
        }
    }

    /// Parses a provider id.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "chatgpt" => Some(Provider::ChatGpt),
            "claude" => Some(Provider::Claude),
            "gemini" => Some(Provider::Gemini),
            "grok" => Some(Provider::Grok),
            _ => None,
        }
    }

    /// Human readable service name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::ChatGpt => "ChatGPT",
            Provider::Claude => "Claude",
            Provider::Gemini => "Gemini",
            Provider::Grok => "Grok",
        }
    }

    /// Literal URL substrings owned by this provider.
    pub fn url_patterns(&self) -> &'static [&'static str] {
        self.shape().url_patterns()
    }

    /// Returns true if the (absolute) URL belongs to this provider.
    pub fn matches(&self, url: &str) -> bool {
        self.shape().matches(url)
    }

    /// Extracts the user's prompt from a request body.
    pub fn extract(&self, body: &RequestBody) -> Option<ExtractedMessage> {
        extract(*self, body)
    }

    fn shape(&self) -> &'static dyn ProviderShape {
        match self {
            Provider::ChatGpt => &chatgpt::ChatGptShape,
            Provider::Claude => &claude::ClaudeShape,
            Provider::Gemini => &gemini::GeminiShape,
            Provider::Grok => &grok::GrokShape,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Per-provider request shape.
pub trait ProviderShape: Send + Sync {
    /// Literal URL substrings that identify the provider.
    fn url_patterns(&self) -> &'static [&'static str];

    /// Returns true if any pattern occurs in the URL.
    fn matches(&self, url: &str) -> bool {
        self.url_patterns().iter().any(|pattern| url.contains(pattern))
    }

    /// Tries each known body shape in priority order.
    fn extract(&self, body: &RequestBody) -> Option<Extraction>;

    /// Writes `text` at `locator` and serialises the whole document.
    fn rewrite(
        &self,
        document: Document,
        locator: &Locator,
        text: &str,
    ) -> Result<String, RewriteError> {
        match document {
            Document::Json(mut value) => {
                write_json(&mut value, locator, text)?;
                Ok(serde_json::to_string(&value)?)
            }
            Document::Form { .. } => Err(RewriteError::MissingField(
                "expected a JSON document".to_string(),
            )),
        }
    }
}

// =============================================================================
// Bodies, locators and extracted messages
// =============================================================================

/// A request body as handed to the interceptor.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Raw body text (JSON or form-encoded).
    Text(String),
    /// An already-parsed JSON object.
    Json(Value),
}

impl RequestBody {
    /// Returns the raw text, if the body is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RequestBody::Text(text) => Some(text),
            RequestBody::Json(_) => None,
        }
    }

    /// Returns the body as a JSON value, parsing text bodies.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            RequestBody::Text(text) => serde_json::from_str(text).ok(),
            RequestBody::Json(value) => Some(value.clone()),
        }
    }

    /// Serialises the body to the string that goes on the wire.
    pub fn to_wire(&self) -> String {
        match self {
            RequestBody::Text(text) => text.clone(),
            RequestBody::Json(value) => value.to_string(),
        }
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Text(text.to_string())
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        RequestBody::Json(value)
    }
}

/// The parsed document a locator points into.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    /// A JSON object body.
    Json(Value),
    /// A form-encoded body carrying a doubly encoded JSON request.
    Form {
        /// Original form string; every other parameter is kept verbatim.
        raw: String,
        /// Decoded outer array of the request parameter.
        outer: Vec<Value>,
        /// Parsed nested request array.
        inner: Value,
    },
}

/// Where the prompt was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    /// A top-level string field.
    Field(&'static str),
    /// `messages[index].content`, in the given content layout.
    Message {
        /// Index into the `messages` array.
        index: usize,
        /// How the content is laid out.
        slot: ContentSlot,
    },
    /// Element `[0][0]` of the nested request inside a form parameter.
    FormRequest,
}

/// What a shape hands back before the length gate is applied.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    pub locator: Locator,
    pub document: Document,
}

/// A user prompt located inside a request body.
///
/// Consumed by [`rewrite`].
#[derive(Debug, Clone)]
pub struct ExtractedMessage {
    /// Which provider the body belongs to.
    pub provider: Provider,
    /// The prompt exactly as it appears in the body.
    pub original_text: String,
    /// Where the prompt sits in [`ExtractedMessage::document`].
    pub locator: Locator,
    document: Document,
}

impl ExtractedMessage {
    /// The parsed body the locator points into.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Prompt length in characters.
    pub fn char_count(&self) -> usize {
        self.original_text.chars().count()
    }
}

// =============================================================================
// Operations
// =============================================================================

/// Decides which provider owns a request URL.
///
/// Relative URLs are resolved against `origin` (the page the request came
/// from) before matching. Pure and idempotent.
pub fn classify(url: &str, origin: Option<&str>) -> Option<Provider> {
    let resolved = resolve_url(url, origin);
    Provider::ALL
        .into_iter()
        .find(|provider| provider.matches(&resolved))
}

/// Locates the user's prompt in a request body.
///
/// `None` is the normal outcome for anything that is not a chat send.
pub fn extract(provider: Provider, body: &RequestBody) -> Option<ExtractedMessage> {
    let extraction = provider.shape().extract(body)?;
    if !is_long_enough(&extraction.text) {
        return None;
    }

    Some(ExtractedMessage {
        provider,
        original_text: extraction.text,
        locator: extraction.locator,
        document: extraction.document,
    })
}

/// Replaces the located prompt with `new_text` and serialises the body.
pub fn rewrite(extracted: ExtractedMessage, new_text: &str) -> Result<String, RewriteError> {
    extracted
        .provider
        .shape()
        .rewrite(extracted.document, &extracted.locator, new_text)
}

/// Returns true if the text passes the minimum length gate.
pub fn is_long_enough(text: &str) -> bool {
    text.chars().count() > MIN_MESSAGE_CHARS
}

fn resolve_url<'a>(url: &'a str, origin: Option<&str>) -> Cow<'a, str> {
    if Url::parse(url).is_ok() {
        return Cow::Borrowed(url);
    }

    origin
        .and_then(|origin| Url::parse(origin).ok())
        .and_then(|base| base.join(url).ok())
        .map(|resolved| Cow::Owned(String::from(resolved)))
        .unwrap_or(Cow::Borrowed(url))
}

/// Reads a top-level string field that passes the length gate.
fn long_field(document: &Value, field: &str) -> Option<String> {
    document
        .get(field)
        .and_then(Value::as_str)
        .filter(|text| is_long_enough(text))
        .map(str::to_string)
}

fn write_json(document: &mut Value, locator: &Locator, text: &str) -> Result<(), RewriteError> {
    match *locator {
        Locator::Field(field) => {
            let slot = document
                .get_mut(field)
                .filter(|value| value.is_string())
                .ok_or_else(|| RewriteError::MissingField(field.to_string()))?;
            *slot = Value::String(text.to_string());
            Ok(())
        }
        Locator::Message { index, slot } => {
            let message = document
                .get_mut("messages")
                .and_then(|messages| messages.get_mut(index))
                .ok_or_else(|| RewriteError::MissingField(format!("messages[{}]", index)))?;
            messages::write_content(message, slot, text)
        }
        Locator::FormRequest => Err(RewriteError::MissingField(
            "form request in a JSON document".to_string(),
        )),
    }
}

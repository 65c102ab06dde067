//! Claude web app.
//!
//! Claude's client has sent several body layouts over time. They are tried
//! in a fixed order and the first one carrying a long enough prompt wins:
//!
//! 1. `prompt` string
//! 2. `messages` list, most recent user entry
//! 3. `input` string
//! 4. `text` string

use serde_json::Value;

use super::messages::{last_user_message, read_content, ContentSlot};
use super::{is_long_enough, long_field, Document, Extraction, Locator, ProviderShape, RequestBody};

const URL_PATTERNS: &[&str] = &["claude.ai/api"];

const CONTENT_SLOTS: &[ContentSlot] = &[
    ContentSlot::Plain,
    ContentSlot::Text,
    ContentSlot::Parts,
    ContentSlot::TextBlocks,
];

pub(super) struct ClaudeShape;

fn is_user(message: &Value) -> bool {
    message.get("role").and_then(Value::as_str) == Some("user")
        || message.get("type").and_then(Value::as_str) == Some("user")
}

fn from_messages(document: &Value) -> Option<(Locator, String)> {
    let messages = document.get("messages")?.as_array()?;
    let (index, message) = last_user_message(messages, is_user)?;
    let (slot, text) = read_content(message.get("content")?, CONTENT_SLOTS)?;
    if !is_long_enough(&text) {
        return None;
    }
    Some((Locator::Message { index, slot }, text))
}

impl ProviderShape for ClaudeShape {
    fn url_patterns(&self) -> &'static [&'static str] {
        URL_PATTERNS
    }

    fn extract(&self, body: &RequestBody) -> Option<Extraction> {
        let document = body.to_json()?;

        let (locator, text) = long_field(&document, "prompt")
            .map(|text| (Locator::Field("prompt"), text))
            .or_else(|| from_messages(&document))
            .or_else(|| long_field(&document, "input").map(|text| (Locator::Field("input"), text)))
            .or_else(|| long_field(&document, "text").map(|text| (Locator::Field("text"), text)))?;

        Some(Extraction {
            text,
            locator,
            document: Document::Json(document),
        })
    }
}

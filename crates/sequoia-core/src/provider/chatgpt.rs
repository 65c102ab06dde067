//! ChatGPT web app and OpenAI chat completions.

use serde_json::Value;

use super::messages::{last_user_message, read_content, ContentSlot};
use super::{is_long_enough, Document, Extraction, Locator, ProviderShape, RequestBody};

const URL_PATTERNS: &[&str] = &[
    "backend-api",
    "api.openai.com",
    "chatgpt.com/api",
    "chat.openai.com/api",
];

const CONTENT_SLOTS: &[ContentSlot] = &[
    ContentSlot::Plain,
    ContentSlot::Parts,
    ContentSlot::TextBlocks,
];

pub(super) struct ChatGptShape;

/// The web app nests the role under `author`; the API puts it at the top.
fn is_user(message: &Value) -> bool {
    message.get("role").and_then(Value::as_str) == Some("user")
        || message.pointer("/author/role").and_then(Value::as_str) == Some("user")
}

impl ProviderShape for ChatGptShape {
    fn url_patterns(&self) -> &'static [&'static str] {
        URL_PATTERNS
    }

    fn extract(&self, body: &RequestBody) -> Option<Extraction> {
        let document = body.to_json()?;

        let (index, slot, text) = {
            let messages = document.get("messages")?.as_array()?;
            let (index, message) = last_user_message(messages, is_user)?;
            let (slot, text) = read_content(message.get("content")?, CONTENT_SLOTS)?;
            (index, slot, text)
        };

        if !is_long_enough(&text) {
            return None;
        }

        Some(Extraction {
            text,
            locator: Locator::Message { index, slot },
            document: Document::Json(document),
        })
    }
}

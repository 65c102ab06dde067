//! Chat-style `messages` arrays shared by the OpenAI and Claude shapes.

use serde_json::{Map, Value};

use super::RewriteError;

/// Layout of a message's `content`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSlot {
    /// `content` is a plain string.
    Plain,
    /// `content.parts` is a list of strings.
    Parts,
    /// `content.text` is a string.
    Text,
    /// `content` is a list of `{type: "text", text}` blocks.
    TextBlocks,
}

/// Finds the most recent message accepted by `is_user`.
///
/// Only that message is considered; an earlier user turn is never picked up
/// just because the latest one is too short.
pub(super) fn last_user_message(
    messages: &[Value],
    is_user: impl Fn(&Value) -> bool,
) -> Option<(usize, &Value)> {
    messages
        .iter()
        .enumerate()
        .rev()
        .find(|(_, message)| is_user(message))
}

/// Reads the message text, trying `slots` in order.
pub(super) fn read_content(content: &Value, slots: &[ContentSlot]) -> Option<(ContentSlot, String)> {
    slots
        .iter()
        .find_map(|slot| read_slot(content, *slot).map(|text| (*slot, text)))
}

fn read_slot(content: &Value, slot: ContentSlot) -> Option<String> {
    match slot {
        ContentSlot::Plain => content.as_str().map(str::to_string),
        ContentSlot::Parts => {
            let parts = content.get("parts")?.as_array()?;
            join_strings(parts.iter().map(Value::as_str))
        }
        ContentSlot::Text => content.get("text")?.as_str().map(str::to_string),
        ContentSlot::TextBlocks => {
            let blocks = content.as_array()?;
            join_strings(blocks.iter().map(text_block))
        }
    }
}

/// Joins with single spaces; any non-text element rejects the whole list.
fn join_strings<'a>(items: impl Iterator<Item = Option<&'a str>>) -> Option<String> {
    let parts: Option<Vec<&str>> = items.collect();
    let parts = parts?;
    if parts.is_empty() {
        return None;
    }
    Some(parts.join(" "))
}

fn text_block(block: &Value) -> Option<&str> {
    if block.get("type")?.as_str()? != "text" {
        return None;
    }
    block.get("text")?.as_str()
}

/// Writes `text` into `message.content` using the layout it was read from.
pub(super) fn write_content(
    message: &mut Value,
    slot: ContentSlot,
    text: &str,
) -> Result<(), RewriteError> {
    let content = message
        .get_mut("content")
        .ok_or_else(|| RewriteError::MissingField("content".to_string()))?;

    match slot {
        ContentSlot::Plain => {
            if !content.is_string() {
                return Err(RewriteError::MissingField("content".to_string()));
            }
            *content = Value::String(text.to_string());
        }
        ContentSlot::Parts => {
            let parts = content
                .get_mut("parts")
                .filter(|parts| parts.is_array())
                .ok_or_else(|| RewriteError::MissingField("content.parts".to_string()))?;
            *parts = Value::Array(vec![Value::String(text.to_string())]);
        }
        ContentSlot::Text => {
            let field = content
                .get_mut("text")
                .filter(|field| field.is_string())
                .ok_or_else(|| RewriteError::MissingField("content.text".to_string()))?;
            *field = Value::String(text.to_string());
        }
        ContentSlot::TextBlocks => {
            let blocks = content
                .as_array_mut()
                .ok_or_else(|| RewriteError::MissingField("content[]".to_string()))?;
            // Keep the first block (and any extra keys on it), drop the rest.
            let mut first = match blocks.first() {
                Some(Value::Object(block)) => block.clone(),
                _ => Map::new(),
            };
            first.insert("type".to_string(), Value::String("text".to_string()));
            first.insert("text".to_string(), Value::String(text.to_string()));
            *blocks = vec![Value::Object(first)];
        }
    }

    Ok(())
}

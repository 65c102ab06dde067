//! Gemini web app.
//!
//! The send request is a form-encoded body whose `f.req` parameter holds a
//! JSON array. Element 1 of that array is itself a JSON string, and the
//! prompt is element `[0][0]` of the array it decodes to:
//!
//! ```text
//! f.req=[null,"[[\"<prompt>\",0,null,...],[\"en\"],...]"]&at=...
//! ```
//!
//! There is no schema or version marker, so every step fails closed. The
//! rewrite cannot patch the string in place because of the double encoding;
//! it rebuilds both arrays and re-encodes the parameter, leaving every other
//! form parameter byte-for-byte as it was.

use serde_json::Value;
use url::form_urlencoded;

use super::{
    is_long_enough, Document, Extraction, Locator, Provider, ProviderShape, RequestBody,
    RewriteError,
};

const URL_PATTERNS: &[&str] = &["gemini.google.com", "bard.google.com"];

/// Form parameter carrying the batched request.
const REQUEST_PARAM: &str = "f.req";

pub(super) struct GeminiShape;

impl ProviderShape for GeminiShape {
    fn url_patterns(&self) -> &'static [&'static str] {
        URL_PATTERNS
    }

    fn extract(&self, body: &RequestBody) -> Option<Extraction> {
        let raw = body.as_text()?;
        let request = form_param(raw, REQUEST_PARAM)?;

        let outer: Vec<Value> = serde_json::from_str(&request).ok()?;
        if outer.len() < 2 {
            return None;
        }
        let inner: Value = serde_json::from_str(outer[1].as_str()?).ok()?;
        let text = prompt_of(&inner)?.to_string();

        if !is_long_enough(&text) {
            return None;
        }

        Some(Extraction {
            text,
            locator: Locator::FormRequest,
            document: Document::Form {
                raw: raw.to_string(),
                outer,
                inner,
            },
        })
    }

    fn rewrite(
        &self,
        document: Document,
        locator: &Locator,
        text: &str,
    ) -> Result<String, RewriteError> {
        let (raw, mut outer, mut inner) = match (document, locator) {
            (Document::Form { raw, outer, inner }, Locator::FormRequest) => (raw, outer, inner),
            _ => return Err(RewriteError::LocatorMismatch(Provider::Gemini)),
        };

        let prompt = inner
            .pointer_mut("/0/0")
            .filter(|value| value.is_string())
            .ok_or_else(|| RewriteError::MissingField("f.req[1][0][0]".to_string()))?;
        *prompt = Value::String(text.to_string());

        let slot = outer
            .get_mut(1)
            .ok_or_else(|| RewriteError::MissingField("f.req[1]".to_string()))?;
        *slot = Value::String(serde_json::to_string(&inner)?);

        let request = serde_json::to_string(&outer)?;
        replace_form_param(&raw, REQUEST_PARAM, &request)
    }
}

/// `inner[0][0]`, only when both levels are arrays.
fn prompt_of(inner: &Value) -> Option<&str> {
    inner.as_array()?.first()?.as_array()?.first()?.as_str()
}

/// Decoded value of the first parameter named `name`.
fn form_param(raw: &str, name: &str) -> Option<String> {
    form_urlencoded::parse(raw.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Re-encodes one parameter and keeps every other segment untouched.
fn replace_form_param(raw: &str, name: &str, value: &str) -> Result<String, RewriteError> {
    let mut replaced = false;

    let segments: Vec<String> = raw
        .split('&')
        .map(|segment| {
            let decoded_key = form_urlencoded::parse(segment.as_bytes())
                .next()
                .map(|(key, _)| key.into_owned());

            if !replaced && decoded_key.as_deref() == Some(name) {
                replaced = true;
                let raw_key = segment.split_once('=').map_or(segment, |(key, _)| key);
                let encoded: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();
                format!("{}={}", raw_key, encoded)
            } else {
                segment.to_string()
            }
        })
        .collect();

    if !replaced {
        return Err(RewriteError::MissingFormParam(name.to_string()));
    }

    Ok(segments.join("&"))
}

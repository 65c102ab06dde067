//! Grok web app.

use super::{long_field, Document, Extraction, Locator, ProviderShape, RequestBody};

const URL_PATTERNS: &[&str] = &["grok.com/rest/app-chat", "grok.com/api", "grok.com/rest"];

pub(super) struct GrokShape;

impl ProviderShape for GrokShape {
    fn url_patterns(&self) -> &'static [&'static str] {
        URL_PATTERNS
    }

    fn extract(&self, body: &RequestBody) -> Option<Extraction> {
        let document = body.to_json()?;
        let text = long_field(&document, "message")?;

        Some(Extraction {
            text,
            locator: Locator::Field("message"),
            document: Document::Json(document),
        })
    }
}

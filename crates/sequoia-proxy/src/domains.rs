//! Provider host filtering.
//!
//! Only traffic to these hosts is decrypted and handed to the interceptor.
//! Everything else is tunnelled through untouched.

use sequoia_core::Provider;

/// Hosts serving the supported chat apps and APIs.
pub const PROVIDER_HOSTS: &[(&str, Provider)] = &[
    ("chatgpt.com", Provider::ChatGpt),
    ("chat.openai.com", Provider::ChatGpt),
    ("api.openai.com", Provider::ChatGpt),
    ("claude.ai", Provider::Claude),
    ("gemini.google.com", Provider::Gemini),
    ("bard.google.com", Provider::Gemini),
    ("grok.com", Provider::Grok),
];

/// Checks if the host belongs to a supported provider.
///
/// Matches the host itself and any subdomain. A trailing port is ignored.
///
/// # Examples
///
/// ```
/// use sequoia_proxy::is_provider_host;
///
/// assert!(is_provider_host("chatgpt.com"));
/// assert!(is_provider_host("claude.ai:443"));
/// assert!(!is_provider_host("example.com"));
/// ```
pub fn is_provider_host(host: &str) -> bool {
    provider_for_host(host).is_some()
}

/// Returns the provider owning a host, if any.
pub fn provider_for_host(host: &str) -> Option<Provider> {
    let host = strip_port(host).to_ascii_lowercase();

    PROVIDER_HOSTS
        .iter()
        .find(|(domain, _)| {
            host == *domain
                || host
                    .strip_suffix(domain)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
        .map(|(_, provider)| *provider)
}

fn strip_port(host: &str) -> &str {
    host.split(':').next().unwrap_or(host)
}

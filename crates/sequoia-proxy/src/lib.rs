//! Sequoia Proxy - request interception and prompt compression.
//!
//! The [`Interceptor`] runs every outgoing chat request through a fixed
//! pipeline and hands back the request to dispatch:
//!
//! ```text
//! Request → classify → extract → daily limit ──exceeded──→ notify, send original
//!                                      │
//!                                 count (if limited)
//!                                      │
//!                              paused? ──yes──→ send original
//!                                      │
//!                           compress (bridge → oracle)
//!                                      │
//!                           rewrite ──fails──→ send original
//!                                      │
//!                              send rewritten
//! ```
//!
//! Any step that times out or fails falls back to the original request.
//! The pipeline is reachable three ways: directly via
//! [`Interceptor::intercept`], by wrapping a request primitive with
//! [`Interceptor::wrap_fetch`] / [`Interceptor::wrap_xhr`], or through the
//! MITM [`ProxyServer`], which decrypts traffic to the provider hosts only.

mod ca;
pub mod compression;
mod domains;
mod error;
mod handler;
pub mod hooks;
pub mod interceptor;
mod proxy;

#[cfg(test)]
mod test_support;

pub use ca::{CaManager, CaManagerError};
pub use compression::Compressor;
pub use domains::{is_provider_host, provider_for_host, PROVIDER_HOSTS};
pub use error::{ProxyError, Result};
pub use handler::ProxyHandler;
pub use hooks::{FetchOptions, FetchPrimitive, HookRegistry, PrimitiveKind, XhrPrimitive};
pub use interceptor::{
    InterceptedRequest, Interception, Interceptor, InterceptorConfig, Outcome,
};
pub use proxy::{ProxyConfig, ProxyHandle, ProxyServer};

/// Default proxy port.
pub const DEFAULT_PROXY_PORT: u16 = 8766;

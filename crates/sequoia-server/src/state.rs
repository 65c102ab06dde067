//! Application state for the API server.

use std::time::Duration;

use sequoia_bridge::BridgeClient;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Connection to the bridge actor, which owns all persistent state.
    pub bridge: BridgeClient,
    /// Timeout for calls that take one explicitly.
    pub call_timeout: Duration,
}

impl AppState {
    pub fn new(bridge: BridgeClient) -> Self {
        Self {
            bridge,
            call_timeout: crate::DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

//! Bridge and oracle configuration.

use std::time::Duration;

/// Default compression oracle address.
pub const DEFAULT_ORACLE_URL: &str = "http://localhost:8002";

/// Transport timeout for oracle calls.
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between oracle health checks.
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// Timeout for control requests (settings, stats, health).
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

/// Request queue depth.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Compression oracle configuration.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Base URL, without a trailing slash.
    pub base_url: String,
    /// Per-request transport timeout.
    pub timeout: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ORACLE_URL.to_string(),
            timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }
}

impl OracleConfig {
    /// Sets the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the transport timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL for an endpoint path such as `/health`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Bridge actor configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub oracle: OracleConfig,
    pub health_interval: Duration,
    pub control_timeout: Duration,
    pub channel_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            oracle: OracleConfig::default(),
            health_interval: DEFAULT_HEALTH_INTERVAL,
            control_timeout: DEFAULT_CONTROL_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl BridgeConfig {
    pub fn with_oracle(mut self, oracle: OracleConfig) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    pub fn with_control_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout = timeout;
        self
    }
}

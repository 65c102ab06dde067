//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use sequoia_bridge::{BridgeConfig, OracleConfig, DEFAULT_ORACLE_URL};
use sequoia_core::notifications::NotificationSettings;
use sequoia_proxy::DEFAULT_PROXY_PORT;
use sequoia_server::{ServerConfig, DEFAULT_PORT};

/// Sequoia - compresses prompts sent to AI chat services
#[derive(Parser, Debug, Clone)]
#[command(name = "sequoia", version, about)]
pub struct Args {
    /// Base URL of the compression service
    #[arg(long, env = "SEQUOIA_ORACLE_URL", default_value = DEFAULT_ORACLE_URL)]
    pub oracle_url: String,

    /// Port for the intercepting proxy
    #[arg(long, env = "SEQUOIA_PROXY_PORT", default_value_t = DEFAULT_PROXY_PORT)]
    pub proxy_port: u16,

    /// Port for the control API
    #[arg(long, env = "SEQUOIA_API_PORT", default_value_t = DEFAULT_PORT)]
    pub api_port: u16,

    /// Database file (default: the platform data directory)
    #[arg(long, env = "SEQUOIA_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Directory holding the proxy root CA (default: the platform data directory)
    #[arg(long, env = "SEQUOIA_CA_DIR")]
    pub ca_dir: Option<PathBuf>,

    /// Run the control API only, without the intercepting proxy
    #[arg(long)]
    pub no_proxy: bool,

    /// Suppress desktop notifications
    #[arg(long)]
    pub no_notifications: bool,

    /// Enable debug logging (also logs to the console)
    #[arg(long)]
    pub debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Effective log level after `--debug`.
    pub fn log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_level
        }
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig::default()
            .with_oracle(OracleConfig::default().with_base_url(self.oracle_url.trim_end_matches('/')))
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::default().with_port(self.api_port)
    }

    pub fn notification_settings(&self) -> NotificationSettings {
        if self.no_notifications {
            NotificationSettings::disabled()
        } else {
            NotificationSettings::enabled()
        }
    }
}

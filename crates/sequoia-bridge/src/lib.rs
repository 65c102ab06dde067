//! Sequoia Bridge - the privileged side.
//!
//! A single actor task owns the [`Database`](sequoia_storage::Database) and
//! the HTTP client for the compression oracle. Everything else talks to it
//! through a [`BridgeClient`]: correlated requests over an mpsc channel, with
//! pause changes pushed back as [`BridgeEvent`]s.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use std::time::Duration;
//! use sequoia_bridge::BridgeConfig;
//! use sequoia_storage::Database;
//!
//! let db = Database::in_memory()?;
//! let (client, handle) = sequoia_bridge::spawn(db, BridgeConfig::default())?;
//!
//! let status = client.check_daily_limit(Duration::from_secs(2)).await?;
//! println!("{} messages today", status.daily_message_count);
//!
//! handle.stop().await;
//! # Ok(())
//! # }
//! ```

mod actor;
pub mod client;
pub mod config;
pub mod error;
pub mod monitor;
pub mod oracle;
pub mod protocol;

pub use actor::{spawn, spawn_with_clock, BridgeHandle};
pub use client::BridgeClient;
pub use config::{BridgeConfig, OracleConfig, DEFAULT_ORACLE_URL};
pub use error::{BridgeError, OracleError, Result};
pub use monitor::ServiceMonitor;
pub use oracle::OracleClient;
pub use protocol::{
    BridgeEvent, BridgeRequest, BridgeResponse, CallId, CompressionResult, Envelope,
    SavingsReport, ServiceHealth, ServiceStats, ServiceStatus,
};

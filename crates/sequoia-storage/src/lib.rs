//! Sequoia Storage - SQLite persistence layer.
//!
//! This crate is the durable store behind the bridge actor. It handles:
//!
//! - Settings key-value storage (pause flag, daily limit, goals, welcome)
//! - The daily message counter and its rollover
//! - Environmental savings totals and per-day history
//! - Compression logging (privacy-preserving: stores hashes and previews, not full prompts)
//!
//! # Example
//!
//! ```no_run
//! use sequoia_storage::Database;
//!
//! let db = Database::in_memory().unwrap();
//! let today = sequoia_core::rate_limit::today();
//!
//! db.initialize_defaults(today).unwrap();
//! db.set_daily_limit(20).unwrap();
//!
//! let status = db.check_daily_limit(today).unwrap();
//! assert!(!status.is_exceeded);
//! ```

mod database;
pub mod error;
pub mod models;
mod pool;
pub mod repository;
mod schema;

pub use database::Database;
pub use error::{Result, StorageError};
pub use models::{
    CompressionRecord, DailySavings, NewCompressionRecord, Setting, SettingsSnapshot,
};
pub use pool::ConnectionPool;
pub use repository::{create_preview, hash_prompt};

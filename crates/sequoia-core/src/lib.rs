//! Sequoia Core - provider request shapes, rate limiting and savings.
//!
//! This crate holds the pure logic of the Sequoia prompt compressor:
//!
//! - [`provider`]: which chat service owns a URL, where the user's prompt
//!   sits in its request body, and how to write a replacement back
//! - [`rate_limit`]: the daily message counter and its day rollover
//! - [`savings`]: water/CO2 estimates and weekly goals
//! - [`notifications`]: desktop notices shown while chatting
//!
//! Nothing here performs I/O except the desktop notifier.

pub mod error;
pub mod notifications;
pub mod provider;
pub mod rate_limit;
pub mod savings;

pub use error::RewriteError;
pub use provider::{
    classify, extract, rewrite, ExtractedMessage, Locator, Provider, RequestBody,
    MIN_MESSAGE_CHARS,
};
pub use rate_limit::{DailyLimitStatus, IncrementOutcome, RateLimitState};
pub use savings::{EnvironmentalSavings, WeeklyGoals};

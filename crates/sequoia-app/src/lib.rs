//! Sequoia - prompt compression for AI chat services.
//!
//! This crate holds the pieces of the `sequoia` binary that are worth
//! testing on their own: command-line parsing and the configs derived
//! from it.

pub mod cli;

pub use cli::Args;

//! Database repositories for each table.

pub mod compressions;
pub mod savings;
pub mod settings;
pub mod usage;

pub use compressions::{create_preview, hash_prompt, CompressionsRepo};
pub use savings::SavingsRepo;
pub use settings::SettingsRepo;
pub use usage::UsageRepo;

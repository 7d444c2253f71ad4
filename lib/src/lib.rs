//! Shared configuration and types for the groupware sync daemon

pub mod config;
pub mod types;

// Re-export main types
pub use config::{AccountSettings, PairingSettings, PrevalenceSettings, ProjectConfig, Settings, SyncConfig};
pub use types::{AccountStatus, EntityType, Outcome, Prevalence, Side, Statistics};

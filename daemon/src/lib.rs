//! Groupware sync daemon library
//!
//! This library exposes the internal modules for testing purposes

pub mod adapters;
pub mod app_state;
pub mod log_appender;
pub mod persistency;
pub mod scheduler;
pub mod sync;

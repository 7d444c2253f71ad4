pub mod conflict_resolution;
pub mod errors;
pub mod harmonizer;
pub mod pass_cache;
pub mod strategies;
pub mod supervisor;

pub use conflict_resolution::{resolve, Decision};
pub use errors::{is_cancellation, HarmonizeError};
pub use harmonizer::Harmonizer;
pub use supervisor::{AccountHealth, AccountSession, AdapterSet, CollectionSupervisor};

//! Vault engine: sub-modules.

pub mod types;
pub mod core;
pub mod time;
pub mod cipher;
pub mod store;
pub mod export;
pub mod uri;
pub mod service;

// Re-export top-level items for convenience.
pub use types::*;
pub use service::{
    ImportSummary, RotationWatcher, VaultService, VaultServiceState, WipeConfirmation,
};
pub use time::TimeSource;

//! # Twofold – app-lock authentication gate
//!
//! Optional PIN and biometric lock in front of the vault UI:
//!
//! - [`gate::AuthGate`] — the lock state machine; the active
//!   [`gate::AuthMethod`] is always derived from what is configured,
//!   never stored as an independent fact
//! - [`settings::SettingsStore`] — the key-value contract the gate
//!   persists its state through
//! - [`biometric::BiometricAuthenticator`] — opaque yes/no platform
//!   oracle

pub mod biometric;
pub mod gate;
pub mod settings;

pub use biometric::{BiometricAuthenticator, FixedOutcomeAuthenticator};
pub use gate::{AuthError, AuthGate, AuthMethod};
pub use settings::{JsonFileSettings, MemorySettings, SettingsStore};

//! Platform biometric oracle.

use crate::gate::AuthError;

/// An opaque yes/no challenge against the platform's biometric stack.
/// The gate never learns why a challenge failed, only that it did.
pub trait BiometricAuthenticator: Send + Sync {
    /// Whether the device has usable biometric hardware at all.
    fn is_available(&self) -> bool;

    /// Run a challenge with a user-facing reason string.
    fn authenticate(&self, reason: &str) -> Result<bool, AuthError>;
}

/// Always answers the same way; for tests and headless builds.
pub struct FixedOutcomeAuthenticator {
    outcome: bool,
}

impl FixedOutcomeAuthenticator {
    pub fn accepting() -> Self {
        Self { outcome: true }
    }

    pub fn rejecting() -> Self {
        Self { outcome: false }
    }
}

impl BiometricAuthenticator for FixedOutcomeAuthenticator {
    fn is_available(&self) -> bool {
        true
    }

    fn authenticate(&self, _reason: &str) -> Result<bool, AuthError> {
        Ok(self.outcome)
    }
}

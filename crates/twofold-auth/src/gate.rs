//! App-lock state machine.
//!
//! The gate sits in front of the vault UI. Its active [`AuthMethod`] is
//! never stored as an independent fact: it is derived from whether a
//! PIN is set and whether biometrics are enabled, so the stored
//! `security.authMethod` key can never disagree with reality for long.
//! Every transition is written back to the settings store immediately.

use crate::biometric::BiometricAuthenticator;
use crate::settings::{SettingsStore, APP_LOCK_ENABLED_KEY, AUTH_METHOD_KEY, PIN_KEY};
use thiserror::Error;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("no authentication method is configured")]
    NoMethodConfigured,
    #[error("biometric authentication is not available on this device")]
    BiometricUnavailable,
    #[error("invalid PIN: {0}")]
    InvalidPin(String),
    #[error("settings error: {0}")]
    Settings(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  AuthMethod
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which credentials unlock the app. Derived, never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    None,
    Pin,
    Biometric,
    Both,
}

impl AuthMethod {
    /// The single source of truth for the method.
    pub fn derive(pin_set: bool, biometric_enabled: bool) -> Self {
        match (pin_set, biometric_enabled) {
            (false, false) => Self::None,
            (true, false) => Self::Pin,
            (false, true) => Self::Biometric,
            (true, true) => Self::Both,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pin => "pin",
            Self::Biometric => "biometric",
            Self::Both => "both",
        }
    }

    pub fn allows_pin(&self) -> bool {
        matches!(self, Self::Pin | Self::Both)
    }

    pub fn allows_biometric(&self) -> bool {
        matches!(self, Self::Biometric | Self::Both)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  AuthGate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AuthGate<S: SettingsStore, B: BiometricAuthenticator> {
    settings: S,
    biometric: B,
    biometric_enabled: bool,
    locked: bool,
}

impl<S: SettingsStore, B: BiometricAuthenticator> AuthGate<S, B> {
    /// Build a gate from persisted settings. The stored method string is
    /// advisory only; the PIN key decides `pin_set`, and the stored
    /// method decides `biometric_enabled`. The derived method is written
    /// back, which self-heals an inconsistent settings file.
    pub fn load(settings: S, biometric: B) -> Result<Self, AuthError> {
        let stored_method = settings.get(AUTH_METHOD_KEY)?.unwrap_or_default();
        let biometric_enabled = matches!(stored_method.as_str(), "biometric" | "both");
        let mut gate = Self { settings, biometric, biometric_enabled, locked: false };
        gate.persist_method()?;
        // Start locked when the lock is armed.
        if gate.lock_enabled()? && gate.method()? != AuthMethod::None {
            gate.locked = true;
        }
        Ok(gate)
    }

    // ── derived state ────────────────────────────────────────────

    pub fn method(&self) -> Result<AuthMethod, AuthError> {
        // An empty value in a hand-edited settings file is not a PIN.
        let pin_set = self
            .settings
            .get(PIN_KEY)?
            .filter(|p| !p.is_empty())
            .is_some();
        Ok(AuthMethod::derive(pin_set, self.biometric_enabled))
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lock_enabled(&self) -> Result<bool, AuthError> {
        Ok(self.settings.get(APP_LOCK_ENABLED_KEY)?.as_deref() == Some("true"))
    }

    // ── configuration events ─────────────────────────────────────

    pub fn set_pin(&mut self, pin: &str) -> Result<(), AuthError> {
        if pin.is_empty() {
            return Err(AuthError::InvalidPin("PIN must not be empty".into()));
        }
        if !pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(AuthError::InvalidPin("PIN must be digits only".into()));
        }
        self.settings.set(PIN_KEY, pin)?;
        self.persist_method()?;
        log::info!("PIN configured, method now {}", self.method()?.as_str());
        Ok(())
    }

    pub fn remove_pin(&mut self) -> Result<(), AuthError> {
        self.settings.remove(PIN_KEY)?;
        self.persist_method()?;
        self.disarm_if_methodless()?;
        log::info!("PIN removed, method now {}", self.method()?.as_str());
        Ok(())
    }

    /// Enabling biometrics requires passing a challenge first, so a
    /// user cannot lock themselves behind a sensor that rejects them.
    pub fn enable_biometric(&mut self) -> Result<(), AuthError> {
        if !self.biometric.is_available() {
            return Err(AuthError::BiometricUnavailable);
        }
        if !self.biometric.authenticate("Confirm to enable biometric unlock")? {
            return Err(AuthError::AuthenticationFailed);
        }
        self.biometric_enabled = true;
        self.persist_method()?;
        log::info!("biometric unlock enabled");
        Ok(())
    }

    pub fn disable_biometric(&mut self) -> Result<(), AuthError> {
        self.biometric_enabled = false;
        self.persist_method()?;
        self.disarm_if_methodless()?;
        log::info!("biometric unlock disabled");
        Ok(())
    }

    /// Clear every configured credential and disarm the lock.
    pub fn remove_all(&mut self) -> Result<(), AuthError> {
        self.settings.remove(PIN_KEY)?;
        self.biometric_enabled = false;
        self.locked = false;
        self.settings.set(APP_LOCK_ENABLED_KEY, "false")?;
        self.persist_method()?;
        log::info!("all authentication methods removed");
        Ok(())
    }

    /// Arm or disarm the foreground lock. Arming with no configured
    /// method is rejected, otherwise the user would be locked out with
    /// no way back in.
    pub fn set_lock_enabled(&mut self, enabled: bool) -> Result<(), AuthError> {
        if enabled && self.method()? == AuthMethod::None {
            return Err(AuthError::NoMethodConfigured);
        }
        self.settings
            .set(APP_LOCK_ENABLED_KEY, if enabled { "true" } else { "false" })?;
        if !enabled {
            self.locked = false;
        }
        Ok(())
    }

    // ── lock lifecycle ───────────────────────────────────────────

    /// Called when the app returns to the foreground. Locks when the
    /// lock is armed and a method exists; returns the new locked state.
    pub fn on_foreground(&mut self) -> Result<bool, AuthError> {
        if self.lock_enabled()? && self.method()? != AuthMethod::None {
            self.locked = true;
            log::info!("app locked on foreground");
        }
        Ok(self.locked)
    }

    /// Try to unlock with a PIN. A wrong PIN leaves the gate locked;
    /// retries are not limited at this layer.
    pub fn authenticate_pin(&mut self, pin: &str) -> Result<(), AuthError> {
        if !self.method()?.allows_pin() {
            return Err(AuthError::AuthenticationFailed);
        }
        let stored = self
            .settings
            .get(PIN_KEY)?
            .ok_or(AuthError::AuthenticationFailed)?;
        if !constant_time_eq(stored.as_bytes(), pin.as_bytes()) {
            return Err(AuthError::AuthenticationFailed);
        }
        self.locked = false;
        Ok(())
    }

    /// Try to unlock with a biometric challenge. A "no" from the oracle
    /// leaves the gate locked.
    pub fn authenticate_biometric(&mut self) -> Result<(), AuthError> {
        if !self.method()?.allows_biometric() {
            return Err(AuthError::AuthenticationFailed);
        }
        if !self.biometric.authenticate("Unlock your vault")? {
            return Err(AuthError::AuthenticationFailed);
        }
        self.locked = false;
        Ok(())
    }

    // ── helpers ──────────────────────────────────────────────────

    fn persist_method(&self) -> Result<(), AuthError> {
        self.settings.set(AUTH_METHOD_KEY, self.method()?.as_str())
    }

    /// Losing the last method also disarms the lock.
    fn disarm_if_methodless(&mut self) -> Result<(), AuthError> {
        if self.method()? == AuthMethod::None {
            self.settings.set(APP_LOCK_ENABLED_KEY, "false")?;
            self.locked = false;
        }
        Ok(())
    }
}

/// Constant-time comparison for PIN checks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

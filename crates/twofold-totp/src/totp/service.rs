//! Vault service: the single entry point a frontend talks to.
//!
//! Owns the store and the time source; no global state. Async hosts
//! wrap it in [`VaultServiceState`] and lock per operation.

use crate::totp::core;
use crate::totp::export;
use crate::totp::store::VaultStore;
use crate::totp::time::TimeSource;
use crate::totp::types::*;
use crate::totp::uri;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared handle for async frontends.
pub type VaultServiceState = Arc<Mutex<VaultService>>;

/// Explicit destructive-action token: [`VaultService::wipe`] refuses to
/// run without it, so a wipe can never happen from a stray call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WipeConfirmation {
    UserConfirmed,
}

/// Result of an archive import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  VaultService
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct VaultService {
    store: VaultStore,
    time: TimeSource,
}

impl VaultService {
    pub fn new(store: VaultStore, time: TimeSource) -> Self {
        Self { store, time }
    }

    pub fn into_state(self) -> VaultServiceState {
        Arc::new(Mutex::new(self))
    }

    pub fn time_source(&self) -> &TimeSource {
        &self.time
    }

    // ── accounts ─────────────────────────────────────────────────

    /// Validate and persist a new account.
    pub fn add_account(&self, account: Account) -> Result<Account, OtpError> {
        account.validate()?;
        self.store.save(&account)?;
        log::info!("added account {}", account.display_name());
        Ok(account)
    }

    /// Parse an otpauth URI and persist the resulting account.
    pub fn add_from_uri(&self, otpauth: &str) -> Result<Account, OtpError> {
        self.add_account(uri::parse_otpauth_uri(otpauth)?)
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>, OtpError> {
        self.store.list()
    }

    /// Records the device key can no longer decrypt.
    pub fn unreadable_count(&self) -> Result<usize, OtpError> {
        self.store.unreadable_count()
    }

    /// Idempotent delete: removing an unknown id is not an error.
    pub fn delete_account(&self, id: &str) -> Result<bool, OtpError> {
        self.store.delete(id)
    }

    // ── codes ────────────────────────────────────────────────────

    /// Generate the current code for an account, stamping
    /// `last_used_at` and persisting it.
    pub fn generate_code(&self, id: &str) -> Result<GeneratedCode, OtpError> {
        let mut account = self.require_account(id)?;
        let generated = core::generate_code(&account, &self.time)?;
        account.last_used_at = Some(Utc::now());
        self.store.save(&account)?;
        Ok(generated)
    }

    /// Seconds until the account's current code rotates.
    pub fn remaining_seconds(&self, id: &str) -> Result<u32, OtpError> {
        let account = self.require_account(id)?;
        Ok(core::remaining_seconds(&account, &self.time))
    }

    // ── archives ─────────────────────────────────────────────────

    /// Export all readable accounts; returns the one-time passphrase
    /// and the archive bytes.
    pub fn export_accounts(&self) -> Result<(String, Vec<u8>), OtpError> {
        let accounts = self.store.list()?;
        export::export(&accounts)
    }

    pub fn export_accounts_with_passphrase(&self, passphrase: &str) -> Result<Vec<u8>, OtpError> {
        let accounts = self.store.list()?;
        export::export_with_passphrase(&accounts, passphrase)
    }

    /// Import an archive, skipping accounts already in the vault.
    ///
    /// A duplicate is a matching id or a matching (issuer, label,
    /// secret) triple.
    pub fn import_archive(
        &self,
        bytes: &[u8],
        passphrase: &str,
    ) -> Result<ImportSummary, OtpError> {
        let incoming = export::import(bytes, passphrase)?;
        let existing = self.store.list()?;
        let mut summary = ImportSummary { imported: 0, skipped: 0 };
        let mut to_save = Vec::new();
        for account in incoming {
            if existing.iter().any(|e| e.is_duplicate_of(&account)) {
                log::info!("import: skipping duplicate {}", account.display_name());
                summary.skipped += 1;
            } else {
                to_save.push(account);
                summary.imported += 1;
            }
        }
        // One write for the whole batch, so a failure cannot leave a
        // half-imported vault behind.
        self.store.save_all(&to_save)?;
        log::info!(
            "import complete: {} imported, {} skipped",
            summary.imported,
            summary.skipped
        );
        Ok(summary)
    }

    // ── destructive ──────────────────────────────────────────────

    /// Erase every account.
    pub fn wipe(&self, confirmation: WipeConfirmation) -> Result<(), OtpError> {
        match confirmation {
            WipeConfirmation::UserConfirmed => {
                log::warn!("wiping vault");
                self.store.reset()
            }
        }
    }

    // ── helpers ──────────────────────────────────────────────────

    fn require_account(&self, id: &str) -> Result<Account, OtpError> {
        self.store
            .get(id)?
            .ok_or_else(|| OtpError::new(OtpErrorKind::NotFound, format!("No account '{}'", id)))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Rotation watcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tracks the last observed time-step per account so a one-second UI
/// tick can tell when a code actually rotated.
#[derive(Default)]
pub struct RotationWatcher {
    last_steps: std::collections::HashMap<String, u64>,
}

impl RotationWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the account's current step; returns `true` when the step
    /// advanced since the previous observation.
    pub fn observe(&mut self, account: &Account, time: &TimeSource) -> bool {
        let step = core::time_step(account, time);
        match self.last_steps.insert(account.id.clone(), step) {
            Some(previous) => previous != step,
            None => false,
        }
    }

    /// Forget an account, e.g. after deletion.
    pub fn forget(&mut self, id: &str) {
        self.last_steps.remove(id);
    }
}

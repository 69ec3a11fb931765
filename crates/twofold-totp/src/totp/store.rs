//! Encrypted account persistence.
//!
//! The vault is a single JSON file of records whose secrets are
//! encrypted with the device key. Listing tolerates individual corrupt
//! records: they are skipped with a warning and surfaced only as a
//! count, so one damaged entry never takes the whole vault down.

use crate::totp::cipher::SecretCipher;
use crate::totp::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const VAULT_VERSION: u32 = 1;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  On-disk records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One persisted account, secret encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredAccount {
    id: String,
    issuer: String,
    account_label: String,
    secret: EncryptedSecretBlob,
    algorithm: Algorithm,
    digits: u8,
    period: u32,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VaultFile {
    version: u32,
    accounts: Vec<StoredAccount>,
}

impl Default for VaultFile {
    fn default() -> Self {
        Self { version: VAULT_VERSION, accounts: Vec::new() }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  VaultStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// File-backed store of encrypted accounts.
pub struct VaultStore {
    path: PathBuf,
    cipher: SecretCipher,
}

impl VaultStore {
    pub fn new(path: impl AsRef<Path>, cipher: SecretCipher) -> Self {
        Self { path: path.as_ref().to_path_buf(), cipher }
    }

    /// Insert or replace an account by id.
    pub fn save(&self, account: &Account) -> Result<(), OtpError> {
        let mut file = self.load_file()?;
        let record = self.encrypt_record(account)?;
        match file.accounts.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => file.accounts.push(record),
        }
        self.write_file(&file)
    }

    /// Insert or replace a batch of accounts with a single write, so a
    /// multi-account merge lands all-or-nothing on disk.
    pub fn save_all(&self, accounts: &[Account]) -> Result<(), OtpError> {
        if accounts.is_empty() {
            return Ok(());
        }
        let mut file = self.load_file()?;
        for account in accounts {
            let record = self.encrypt_record(account)?;
            match file.accounts.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => file.accounts.push(record),
            }
        }
        self.write_file(&file)
    }

    /// Fetch and decrypt a single account.
    pub fn get(&self, id: &str) -> Result<Option<Account>, OtpError> {
        let file = self.load_file()?;
        match file.accounts.iter().find(|r| r.id == id) {
            Some(record) => Ok(Some(self.decrypt_record(record)?)),
            None => Ok(None),
        }
    }

    /// Decrypt every readable account. Corrupt records are skipped and
    /// logged; the second element is the skipped count.
    pub fn list_with_unreadable(&self) -> Result<(Vec<Account>, usize), OtpError> {
        let file = self.load_file()?;
        let mut accounts = Vec::with_capacity(file.accounts.len());
        let mut unreadable = 0usize;
        for record in &file.accounts {
            match self.decrypt_record(record) {
                Ok(account) => accounts.push(account),
                Err(e) => {
                    log::warn!("skipping unreadable vault record {}: {}", record.id, e);
                    unreadable += 1;
                }
            }
        }
        Ok((accounts, unreadable))
    }

    /// Decrypt every readable account.
    pub fn list(&self) -> Result<Vec<Account>, OtpError> {
        Ok(self.list_with_unreadable()?.0)
    }

    /// Number of records the device key can no longer decrypt.
    pub fn unreadable_count(&self) -> Result<usize, OtpError> {
        Ok(self.list_with_unreadable()?.1)
    }

    /// Remove an account. Idempotent: deleting an unknown id succeeds
    /// and returns `false`.
    pub fn delete(&self, id: &str) -> Result<bool, OtpError> {
        let mut file = self.load_file()?;
        let before = file.accounts.len();
        file.accounts.retain(|r| r.id != id);
        let removed = file.accounts.len() != before;
        if removed {
            self.write_file(&file)?;
        }
        Ok(removed)
    }

    /// Drop every record, keeping an empty vault file.
    pub fn reset(&self) -> Result<(), OtpError> {
        self.write_file(&VaultFile::default())
    }

    // ── helpers ──────────────────────────────────────────────────

    fn encrypt_record(&self, account: &Account) -> Result<StoredAccount, OtpError> {
        let secret = self.cipher.encrypt(&account.normalised_secret())?;
        Ok(StoredAccount {
            id: account.id.clone(),
            issuer: account.issuer.clone(),
            account_label: account.account_label.clone(),
            secret,
            algorithm: account.algorithm,
            digits: account.digits,
            period: account.period,
            created_at: account.created_at,
            last_used_at: account.last_used_at,
        })
    }

    fn decrypt_record(&self, record: &StoredAccount) -> Result<Account, OtpError> {
        let secret = self.cipher.decrypt(&record.secret)?;
        Ok(Account {
            id: record.id.clone(),
            issuer: record.issuer.clone(),
            account_label: record.account_label.clone(),
            secret,
            algorithm: record.algorithm,
            digits: record.digits,
            period: record.period,
            created_at: record.created_at,
            last_used_at: record.last_used_at,
        })
    }

    fn load_file(&self) -> Result<VaultFile, OtpError> {
        if !self.path.exists() {
            return Ok(VaultFile::default());
        }
        let raw = fs::read_to_string(&self.path).map_err(|e| {
            OtpError::new(OtpErrorKind::IoError, "Failed to read vault file")
                .with_detail(e.to_string())
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            OtpError::new(OtpErrorKind::IoError, "Vault file is not valid JSON")
                .with_detail(e.to_string())
        })
    }

    fn write_file(&self, file: &VaultFile) -> Result<(), OtpError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                OtpError::new(OtpErrorKind::IoError, "Failed to create vault directory")
                    .with_detail(e.to_string())
            })?;
        }
        let json = serde_json::to_string_pretty(file).map_err(|e| {
            OtpError::new(OtpErrorKind::IoError, "Failed to serialize vault")
                .with_detail(e.to_string())
        })?;
        fs::write(&self.path, json).map_err(|e| {
            OtpError::new(OtpErrorKind::IoError, "Failed to write vault file")
                .with_detail(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::totp::cipher::{DeviceKey, SecretCipher};

    fn test_store(dir: &tempfile::TempDir) -> VaultStore {
        let cipher = SecretCipher::new(DeviceKey::generate());
        VaultStore::new(dir.path().join("vault.json"), cipher)
    }

    fn sample(issuer: &str) -> Account {
        Account::new(issuer, "me@example.com", "JBSWY3DPEHPK3PXP").unwrap()
    }

    #[test]
    fn save_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        store.save(&sample("GitHub")).unwrap();
        store.save(&sample("GitLab")).unwrap();
        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|a| a.secret == "JBSWY3DPEHPK3PXP"));
    }

    #[test]
    fn save_is_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        let mut account = sample("GitHub");
        store.save(&account).unwrap();
        account.issuer = "GitHub Enterprise".into();
        store.save(&account).unwrap();
        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].issuer, "GitHub Enterprise");
    }

    #[test]
    fn save_all_mixes_inserts_and_updates() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        let mut existing = sample("GitHub");
        store.save(&existing).unwrap();

        existing.issuer = "GitHub Enterprise".into();
        let incoming = vec![existing, sample("GitLab"), sample("AWS")];
        store.save_all(&incoming).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed.iter().any(|a| a.issuer == "GitHub Enterprise"));
    }

    #[test]
    fn save_all_empty_batch_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        store.save_all(&[]).unwrap();
        assert!(!dir.path().join("vault.json").exists());
    }

    #[test]
    fn secrets_not_stored_in_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        store.save(&sample("GitHub")).unwrap();
        let raw = std::fs::read_to_string(dir.path().join("vault.json")).unwrap();
        assert!(!raw.contains("JBSWY3DPEHPK3PXP"));
    }

    #[test]
    fn get_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        assert!(store.get("no-such-id").unwrap().is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        let account = sample("GitHub");
        store.save(&account).unwrap();
        assert!(store.delete(&account.id).unwrap());
        assert!(!store.delete(&account.id).unwrap());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn reset_wipes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        store.save(&sample("GitHub")).unwrap();
        store.reset().unwrap();
        assert!(store.list().unwrap().is_empty());
        assert_eq!(store.unreadable_count().unwrap(), 0);
    }

    #[test]
    fn corrupt_record_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");
        let cipher = SecretCipher::new(DeviceKey::generate());
        let store = VaultStore::new(&path, cipher);
        store.save(&sample("GitHub")).unwrap();
        store.save(&sample("GitLab")).unwrap();

        // Corrupt one record's ciphertext on disk.
        let raw = std::fs::read_to_string(&path).unwrap();
        let mut file: serde_json::Value = serde_json::from_str(&raw).unwrap();
        file["accounts"][0]["secret"]["ciphertext"] = serde_json::Value::String("00".into());
        std::fs::write(&path, serde_json::to_string(&file).unwrap()).unwrap();

        let (accounts, unreadable) = store.list_with_unreadable().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(unreadable, 1);
        assert_eq!(store.unreadable_count().unwrap(), 1);
    }

    #[test]
    fn missing_file_is_empty_vault() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn different_device_key_cannot_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");
        let store = VaultStore::new(&path, SecretCipher::new(DeviceKey::generate()));
        store.save(&sample("GitHub")).unwrap();

        let other = VaultStore::new(&path, SecretCipher::new(DeviceKey::generate()));
        let (accounts, unreadable) = other.list_with_unreadable().unwrap();
        assert!(accounts.is_empty());
        assert_eq!(unreadable, 1);
    }
}

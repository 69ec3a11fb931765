//! Secret encryption at rest.
//!
//! Account secrets are never persisted in the clear. A 256-bit device
//! key is loaded from (or created in) a [`KeyStore`], and each secret
//! is encrypted with AES-256-CBC under a fresh random 128-bit IV. IV
//! and ciphertext are stored hex-encoded alongside the record.

use crate::totp::types::*;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use std::fs;
use std::path::{Path, PathBuf};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Device key
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A 256-bit symmetric key scoped to this device installation.
#[derive(Clone)]
pub struct DeviceKey([u8; KEY_LEN]);

impl DeviceKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DeviceKey(..)")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Key store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Persistence of the device key. On platforms with an OS keychain an
/// implementation can delegate there; [`FileKeyStore`] keeps it in a
/// restricted file next to the vault.
pub trait KeyStore: Send + Sync {
    fn load(&self) -> Result<Option<DeviceKey>, OtpError>;
    fn store(&self, key: &DeviceKey) -> Result<(), OtpError>;

    /// Load the existing key, or create and persist a new one.
    fn load_or_create(&self) -> Result<DeviceKey, OtpError> {
        if let Some(key) = self.load()? {
            return Ok(key);
        }
        let key = DeviceKey::generate();
        self.store(&key)?;
        Ok(key)
    }
}

/// Hex-encoded key file on disk.
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl KeyStore for FileKeyStore {
    fn load(&self) -> Result<Option<DeviceKey>, OtpError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let hex_str = fs::read_to_string(&self.path).map_err(|e| {
            OtpError::new(OtpErrorKind::KeyStoreError, "Failed to read key file")
                .with_detail(e.to_string())
        })?;
        let bytes = hex::decode(hex_str.trim()).map_err(|e| {
            OtpError::new(OtpErrorKind::KeyStoreError, "Key file is not valid hex")
                .with_detail(e.to_string())
        })?;
        let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            OtpError::new(OtpErrorKind::KeyStoreError, "Key file has wrong length")
        })?;
        Ok(Some(DeviceKey::from_bytes(arr)))
    }

    fn store(&self, key: &DeviceKey) -> Result<(), OtpError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                OtpError::new(OtpErrorKind::KeyStoreError, "Failed to create key directory")
                    .with_detail(e.to_string())
            })?;
        }
        fs::write(&self.path, hex::encode(key.as_bytes())).map_err(|e| {
            OtpError::new(OtpErrorKind::KeyStoreError, "Failed to write key file")
                .with_detail(e.to_string())
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600));
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Secret cipher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Encrypts and decrypts account secrets under the device key.
#[derive(Clone)]
pub struct SecretCipher {
    key: DeviceKey,
}

impl SecretCipher {
    pub fn new(key: DeviceKey) -> Self {
        Self { key }
    }

    /// Encrypt a plaintext secret with a fresh random IV.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecretBlob, OtpError> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);
        let ciphertext = encrypt_cbc(self.key.as_bytes(), &iv, plaintext.as_bytes());
        Ok(EncryptedSecretBlob {
            iv: hex::encode(iv),
            ciphertext: hex::encode(ciphertext),
        })
    }

    /// Decrypt a stored blob back to the plaintext secret.
    pub fn decrypt(&self, blob: &EncryptedSecretBlob) -> Result<String, OtpError> {
        let iv_bytes = hex::decode(&blob.iv).map_err(|_| {
            OtpError::new(OtpErrorKind::DecryptionFailed, "Stored IV is not valid hex")
        })?;
        let iv: [u8; IV_LEN] = iv_bytes.try_into().map_err(|_| {
            OtpError::new(OtpErrorKind::DecryptionFailed, "Stored IV has wrong length")
        })?;
        let ciphertext = hex::decode(&blob.ciphertext).map_err(|_| {
            OtpError::new(OtpErrorKind::DecryptionFailed, "Stored ciphertext is not valid hex")
        })?;
        let plaintext = decrypt_cbc(self.key.as_bytes(), &iv, &ciphertext).ok_or_else(|| {
            OtpError::new(OtpErrorKind::DecryptionFailed, "Secret decryption failed")
        })?;
        String::from_utf8(plaintext).map_err(|_| {
            OtpError::new(OtpErrorKind::DecryptionFailed, "Decrypted secret is not UTF-8")
        })
    }
}

/// AES-256-CBC with PKCS#7 padding.
pub(crate) fn encrypt_cbc(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Vec<u8> {
    Aes256CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Returns `None` on a padding error, which covers both a wrong key and
/// tampered ciphertext.
pub(crate) fn decrypt_cbc(
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
    ciphertext: &[u8],
) -> Option<Vec<u8>> {
    Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .ok()
}

//! Core types for the credential vault.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Algorithm
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Hash algorithm used for HMAC-based OTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Algorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl Default for Algorithm {
    fn default() -> Self {
        Self::Sha1
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha1 => write!(f, "SHA1"),
            Self::Sha256 => write!(f, "SHA256"),
            Self::Sha512 => write!(f, "SHA512"),
        }
    }
}

impl Algorithm {
    /// Parse from a case-insensitive string.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "SHA1" | "SHA-1" | "HMACSHA1" | "HMAC-SHA1" => Some(Self::Sha1),
            "SHA256" | "SHA-256" | "HMACSHA256" | "HMAC-SHA256" => Some(Self::Sha256),
            "SHA512" | "SHA-512" | "HMACSHA512" | "HMAC-SHA512" => Some(Self::Sha512),
            _ => None,
        }
    }

    /// URI-safe name for `otpauth://` parameters.
    pub fn uri_name(&self) -> &'static str {
        match self {
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Account
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single enrolled TOTP credential.
///
/// Field names serialise in camelCase so the same type doubles as the
/// archive-JSON account record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Unique identifier, assigned at creation, immutable.
    pub id: String,
    /// Issuer (e.g. "GitHub", "Google").
    pub issuer: String,
    /// Account label (e.g. "user@example.com").
    pub account_label: String,
    /// Base-32 encoded secret key, kept as originally entered.
    pub secret: String,
    /// Hash algorithm.
    pub algorithm: Algorithm,
    /// Number of digits in the generated code.
    pub digits: u8,
    /// Rotation period in seconds.
    pub period: u32,
    /// When the account was enrolled.
    pub created_at: DateTime<Utc>,
    /// When a code was last generated for this account.
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Create a new account with defaults (SHA1, 6 digits, 30 s period).
    ///
    /// The secret must be valid base-32 decoding to at least one byte, and
    /// issuer/label must be non-empty — rejected here, never at generation
    /// time.
    pub fn new(
        issuer: impl Into<String>,
        account_label: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Self, OtpError> {
        let account = Self {
            id: uuid::Uuid::new_v4().to_string(),
            issuer: issuer.into(),
            account_label: account_label.into(),
            secret: secret.into(),
            algorithm: Algorithm::default(),
            digits: 6,
            period: 30,
            created_at: Utc::now(),
            last_used_at: None,
        };
        account.validate()?;
        Ok(account)
    }

    /// Builder: set algorithm.
    pub fn with_algorithm(mut self, algo: Algorithm) -> Self {
        self.algorithm = algo;
        self
    }

    /// Builder: set digit count.
    pub fn with_digits(mut self, digits: u8) -> Self {
        self.digits = digits;
        self
    }

    /// Builder: set rotation period.
    pub fn with_period(mut self, period: u32) -> Self {
        self.period = period;
        self
    }

    /// Check every invariant an account must satisfy to be usable.
    pub fn validate(&self) -> Result<(), OtpError> {
        if self.issuer.trim().is_empty() {
            return Err(OtpError::new(OtpErrorKind::InvalidInput, "Issuer must not be empty"));
        }
        if self.account_label.trim().is_empty() {
            return Err(OtpError::new(OtpErrorKind::InvalidInput, "Account label must not be empty"));
        }
        if self.digits < 1 {
            return Err(OtpError::new(OtpErrorKind::InvalidInput, "Digit count must be at least 1"));
        }
        if self.period == 0 {
            return Err(OtpError::new(OtpErrorKind::InvalidInput, "Period must be greater than zero"));
        }
        let bytes = crate::totp::core::decode_secret(&self.secret)?;
        if bytes.is_empty() {
            return Err(OtpError::new(OtpErrorKind::InvalidSecret, "Secret decodes to zero bytes"));
        }
        Ok(())
    }

    /// Normalise the secret (uppercase, no spaces/dashes).
    pub fn normalised_secret(&self) -> String {
        self.secret.replace(' ', "").replace('-', "").to_uppercase()
    }

    /// Decode the secret to raw key bytes.
    pub fn secret_bytes(&self) -> Result<Vec<u8>, OtpError> {
        crate::totp::core::decode_secret(&self.secret)
    }

    /// Display name: "Issuer (label)".
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.issuer, self.account_label)
    }

    /// Duplicate test used when merging imports: same id, or same
    /// (issuer, label, secret) triple.
    pub fn is_duplicate_of(&self, other: &Account) -> bool {
        self.id == other.id
            || (self.issuer == other.issuer
                && self.account_label == other.account_label
                && self.normalised_secret() == other.normalised_secret())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Encrypted secret blob
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ciphertext + IV for one account secret, persisted as a unit.
///
/// Replaced whole whenever the secret changes; the IV is meaningless
/// without its ciphertext and vice versa, so they never travel apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecretBlob {
    /// Hex-encoded 16-byte initialisation vector.
    pub iv: String,
    /// Hex-encoded AES-256-CBC ciphertext.
    pub ciphertext: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Generated code result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A generated OTP code with associated timing info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedCode {
    /// The OTP code string (e.g. "123456").
    pub code: String,
    /// Seconds remaining until the code expires, in `[0, period)`.
    pub remaining_seconds: u32,
    /// Total period in seconds.
    pub period: u32,
    /// The time step this code was generated for.
    pub step: u64,
    /// Account ID this code was generated for.
    pub account_id: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Error kind for this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OtpErrorKind {
    /// Malformed base-32 at creation or generation time.
    InvalidSecret,
    /// Malformed `otpauth://` URI.
    InvalidUri,
    /// A stored record could not be decrypted (wrong key, corrupt blob).
    DecryptionFailed,
    /// Archive decryption/padding failure — wrong passphrase or corrupt
    /// file, deliberately undifferentiated.
    WrongPassphraseOrCorruptFile,
    /// The archive does not carry our magic header.
    UnrecognizedFormat,
    /// The archive decrypted but its JSON lacks the accounts field.
    MalformedArchive,
    EncryptionFailed,
    KeyStoreError,
    NotFound,
    InvalidInput,
    IoError,
}

/// Crate-level error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpError {
    pub kind: OtpErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

impl fmt::Display for OtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)?;
        if let Some(d) = &self.detail {
            write!(f, " ({})", d)?;
        }
        Ok(())
    }
}

impl std::error::Error for OtpError {}

impl OtpError {
    pub fn new(kind: OtpErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl From<OtpError> for String {
    fn from(e: OtpError) -> String {
        e.to_string()
    }
}

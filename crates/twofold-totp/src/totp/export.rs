//! Passphrase-protected vault archives.
//!
//! An archive transports accounts between devices: plaintext JSON is
//! encrypted with a key derived from a 16-word passphrase. The wire
//! format is `MAGIC || IV || AES-256-CBC ciphertext`, nothing else.
//! There is no MAC, so a wrong passphrase and a corrupted body are
//! indistinguishable and are reported as one error.

use crate::totp::cipher::{self, IV_LEN, KEY_LEN};
use crate::totp::types::*;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

/// Leading bytes of every archive; checked before any KDF work.
pub const MAGIC: &[u8] = b"TWOFOLD-VAULT-1\n";

/// PBKDF2-HMAC-SHA256 rounds for the archive key.
pub const PBKDF2_ITERATIONS: u32 = 600_000;

/// Application-wide KDF salt. The wire format carries no salt field, so
/// this stays fixed; the passphrase itself carries 128 bits of entropy.
const EXPORT_SALT: &[u8] = b"twofold-vault-export-v1";

/// Words per generated passphrase (16 x 8 bits = 128 bits).
const PASSPHRASE_WORDS: usize = 16;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Wordlist
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 256 short common words; each word encodes exactly one byte.
pub const WORDLIST: [&str; 256] = [
    "acid", "acorn", "adapt", "agree", "aisle", "alarm", "album", "alert",
    "alley", "amber", "amuse", "angle", "ankle", "apple", "apron", "arena",
    "argue", "arrow", "aspen", "atlas", "attic", "audio", "award", "axis",
    "bacon", "badge", "bagel", "baker", "banjo", "barn", "basil", "beach",
    "bead", "beam", "bear", "begin", "bell", "bench", "berry", "birch",
    "bison", "blade", "blank", "blaze", "blend", "bloom", "blue", "board",
    "boat", "bold", "bonus", "book", "boost", "bottle", "brave", "bread",
    "brick", "brief", "brook", "brush", "bubble", "bucket", "buddy", "bugle",
    "bunny", "burst", "cabin", "cable", "cactus", "camel", "candle", "canoe",
    "canyon", "carbon", "cargo", "carrot", "castle", "cedar", "cello", "chair",
    "chalk", "charm", "chess", "chief", "choir", "chord", "cider", "cinema",
    "circle", "citrus", "claim", "clay", "clever", "cliff", "clock", "cloud",
    "clover", "coast", "cobalt", "cocoa", "coin", "comet", "copper", "coral",
    "cotton", "cougar", "cove", "crane", "cream", "creek", "crisp", "crown",
    "cruise", "crystal", "cubic", "curve", "cycle", "daily", "daisy", "dance",
    "dawn", "delta", "denim", "depot", "desk", "dial", "diary", "dime",
    "dingo", "dollar", "dome", "donut", "dove", "dragon", "drift", "drum",
    "dune", "eagle", "early", "earth", "easel", "echo", "edge", "elbow",
    "elder", "elm", "ember", "emblem", "empty", "engine", "enjoy", "entry",
    "envy", "equal", "era", "essay", "etch", "evening", "exit", "fable",
    "falcon", "fancy", "fern", "ferry", "fever", "fiber", "fiddle", "field",
    "fig", "finch", "flame", "flint", "flute", "foam", "forest", "fossil",
    "fox", "frame", "fresh", "frost", "fruit", "fudge", "galaxy", "garden",
    "gecko", "gem", "giant", "ginger", "glacier", "glass", "globe", "gold",
    "goose", "gourd", "grain", "grape", "green", "grill", "grove", "guitar",
    "gull", "habit", "harbor", "harp", "haven", "hazel", "heron", "hill",
    "honey", "howl", "humble", "icicle", "igloo", "index", "inlet", "iris",
    "iron", "island", "ivory", "jade", "jaguar", "jazz", "jelly", "jigsaw",
    "jolly", "jungle", "juniper", "kayak", "kettle", "kiosk", "kite", "kiwi",
    "koala", "lagoon", "lake", "lantern", "lava", "leaf", "lemon", "lily",
    "linen", "lion", "lobby", "locket", "lotus", "lunar", "lyric", "mango",
    "maple", "marble", "meadow", "melon", "mesa", "mint", "mocha", "moose",
];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Archive document
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArchiveDocument {
    accounts: Vec<ArchiveAccount>,
    export_date: DateTime<Utc>,
    app_version: String,
}

/// Lenient account record: older or foreign archives may omit fields.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArchiveAccount {
    #[serde(default)]
    id: String,
    issuer: String,
    account_label: String,
    secret: String,
    #[serde(default)]
    algorithm: Algorithm,
    #[serde(default = "default_digits")]
    digits: u8,
    #[serde(default = "default_period")]
    period: u32,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    last_used_at: Option<DateTime<Utc>>,
}

fn default_digits() -> u8 {
    6
}

fn default_period() -> u32 {
    30
}

impl From<&Account> for ArchiveAccount {
    fn from(a: &Account) -> Self {
        Self {
            id: a.id.clone(),
            issuer: a.issuer.clone(),
            account_label: a.account_label.clone(),
            secret: a.secret.clone(),
            algorithm: a.algorithm,
            digits: a.digits,
            period: a.period,
            created_at: Some(a.created_at),
            last_used_at: a.last_used_at,
        }
    }
}

impl ArchiveAccount {
    /// Convert back to an [`Account`], regenerating a missing id.
    fn into_account(self) -> Result<Account, OtpError> {
        let mut account = Account::new(&self.issuer, &self.account_label, &self.secret)?;
        if !self.id.is_empty() {
            account.id = self.id;
        }
        account.algorithm = self.algorithm;
        account.digits = self.digits;
        account.period = self.period;
        if let Some(created_at) = self.created_at {
            account.created_at = created_at;
        }
        account.last_used_at = self.last_used_at;
        account.validate()?;
        Ok(account)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Passphrase and key derivation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Generate a 16-word passphrase, space-separated.
pub fn generate_passphrase() -> String {
    let mut bytes = [0u8; PASSPHRASE_WORDS];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|&b| WORDLIST[b as usize])
        .collect::<Vec<_>>()
        .join(" ")
}

/// Derive the archive key from a passphrase.
fn derive_key(passphrase: &str) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        passphrase.as_bytes(),
        EXPORT_SALT,
        PBKDF2_ITERATIONS,
        &mut key,
    );
    key
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Export / import
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Export accounts under a freshly generated passphrase. Returns the
/// passphrase (show it to the user once) and the archive bytes.
pub fn export(accounts: &[Account]) -> Result<(String, Vec<u8>), OtpError> {
    let passphrase = generate_passphrase();
    let bytes = export_with_passphrase(accounts, &passphrase)?;
    Ok((passphrase, bytes))
}

/// Export accounts under a caller-supplied passphrase.
pub fn export_with_passphrase(
    accounts: &[Account],
    passphrase: &str,
) -> Result<Vec<u8>, OtpError> {
    let document = ArchiveDocument {
        accounts: accounts.iter().map(ArchiveAccount::from).collect(),
        export_date: Utc::now(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let json = serde_json::to_vec(&document).map_err(|e| {
        OtpError::new(OtpErrorKind::EncryptionFailed, "Failed to serialize archive")
            .with_detail(e.to_string())
    })?;

    let key = derive_key(passphrase);
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    let ciphertext = cipher::encrypt_cbc(&key, &iv, &json);

    let mut out = Vec::with_capacity(MAGIC.len() + IV_LEN + ciphertext.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt and parse an archive. Atomic: either every account parses
/// or the whole import fails.
pub fn import(bytes: &[u8], passphrase: &str) -> Result<Vec<Account>, OtpError> {
    // Magic first, before spending CPU on the KDF.
    if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
        return Err(OtpError::new(
            OtpErrorKind::UnrecognizedFormat,
            "Not a recognized vault archive",
        ));
    }
    let body = &bytes[MAGIC.len()..];
    if body.len() <= IV_LEN {
        return Err(OtpError::new(
            OtpErrorKind::WrongPassphraseOrCorruptFile,
            "Archive is truncated",
        ));
    }
    let iv: [u8; IV_LEN] = body[..IV_LEN]
        .try_into()
        .map_err(|_| OtpError::new(OtpErrorKind::WrongPassphraseOrCorruptFile, "Archive is truncated"))?;
    let ciphertext = &body[IV_LEN..];

    let key = derive_key(passphrase);
    // No MAC: a wrong passphrase and a damaged file both surface here
    // as padding, UTF-8, or JSON-syntax failures.
    let plaintext = cipher::decrypt_cbc(&key, &iv, ciphertext).ok_or_else(wrong_passphrase)?;
    let json = String::from_utf8(plaintext).map_err(|_| wrong_passphrase())?;
    let value: serde_json::Value = serde_json::from_str(&json).map_err(|_| wrong_passphrase())?;

    // The JSON decrypted cleanly; from here on, problems are structural.
    if value.get("accounts").map(|v| v.is_array()) != Some(true) {
        return Err(OtpError::new(
            OtpErrorKind::MalformedArchive,
            "Archive has no account list",
        ));
    }
    let document: ArchiveDocument = serde_json::from_value(value).map_err(|e| {
        OtpError::new(OtpErrorKind::MalformedArchive, "Archive records are malformed")
            .with_detail(e.to_string())
    })?;

    document
        .accounts
        .into_iter()
        .map(|record| {
            record.into_account().map_err(|e| {
                OtpError::new(OtpErrorKind::MalformedArchive, "Archive contains an invalid account")
                    .with_detail(e.to_string())
            })
        })
        .collect()
}

fn wrong_passphrase() -> OtpError {
    OtpError::new(
        OtpErrorKind::WrongPassphraseOrCorruptFile,
        "Wrong passphrase or corrupt file",
    )
}

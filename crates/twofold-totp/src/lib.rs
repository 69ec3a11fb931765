//! # Twofold – TOTP credential vault engine
//!
//! Local multi-factor credential vault:
//!
//! - **RFC 4226 / 6238** – HOTP & TOTP generation with SHA-1, SHA-256, SHA-512
//! - **Clock-drift correction** – best-effort SNTP offset, cached for the
//!   process lifetime
//! - **Encrypted at rest** – per-account secrets sealed with a device-local
//!   AES-256 key (fresh IV per encryption)
//! - **Passphrase archives** – whole-vault export/import to a portable file
//!   keyed by a generated 16-word passphrase (PBKDF2 + AES-CBC)
//! - **otpauth:// URIs** – parsing & generation per the Google Authenticator
//!   key-URI format

pub mod totp;

//! Core OTP generation — RFC 4226 (HOTP) and RFC 6238 (TOTP).
//!
//! Implements HMAC-based One-Time Password with SHA-1, SHA-256, and SHA-512,
//! time-step calculation against a drift-corrected [`TimeSource`], code
//! verification with a configurable drift window, and base-32 helpers.

use crate::totp::time::TimeSource;
use crate::totp::types::*;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Raw HMAC-OTP (RFC 4226 §5.3)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compute an HOTP code for the given raw key bytes and counter.
pub fn hotp_raw(key: &[u8], counter: u64, digits: u8, algo: Algorithm) -> String {
    let hmac_result = compute_hmac(key, &counter.to_be_bytes(), algo);
    truncate(&hmac_result, digits)
}

/// Compute HMAC(key, message) using the specified algorithm.
fn compute_hmac(key: &[u8], data: &[u8], algo: Algorithm) -> Vec<u8> {
    match algo {
        Algorithm::Sha1 => {
            let mut mac =
                Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts any key length");
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        Algorithm::Sha256 => {
            let mut mac =
                Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        Algorithm::Sha512 => {
            let mut mac =
                Hmac::<Sha512>::new_from_slice(key).expect("HMAC accepts any key length");
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
    }
}

/// Dynamic truncation per RFC 4226 §5.3.
///
/// The modulus is computed in `u64`: `10^digits` overflows `u32` for
/// digit counts above 9, and the truncated value is at most 31 bits, so
/// for `digits >= 10` the full value is emitted left-zero-padded.
fn truncate(hmac_result: &[u8], digits: u8) -> String {
    let offset = (hmac_result[hmac_result.len() - 1] & 0x0f) as usize;
    let binary = ((hmac_result[offset] as u64 & 0x7f) << 24)
        | ((hmac_result[offset + 1] as u64) << 16)
        | ((hmac_result[offset + 2] as u64) << 8)
        | (hmac_result[offset + 3] as u64);
    let code = if digits >= 10 {
        binary
    } else {
        binary % 10u64.pow(digits as u32)
    };
    format!("{:0>width$}", code, width = digits as usize)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Time steps
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compute the time-step counter for a given unix timestamp.
pub fn time_step_at(unix_seconds: u64, period: u32) -> u64 {
    unix_seconds / period as u64
}

/// Current time-step counter for an account.
pub fn time_step(account: &Account, time: &TimeSource) -> u64 {
    time_step_at(time.now_unix(), account.period)
}

/// Seconds remaining for a specific timestamp, in `[0, period)`.
///
/// Zero exactly on a period boundary: the instant a fresh code is cut
/// counts as "expiring now" for the countdown, never as `period`.
pub fn remaining_seconds_at(unix_seconds: u64, period: u32) -> u32 {
    let p = period as u64;
    ((p - unix_seconds % p) % p) as u32
}

/// Seconds remaining until the account's current code rotates.
pub fn remaining_seconds(account: &Account, time: &TimeSource) -> u32 {
    remaining_seconds_at(time.now_unix(), account.period)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  TOTP generation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Generate the account's code at an explicit unix timestamp.
pub fn generate_at(account: &Account, unix_seconds: u64) -> Result<String, OtpError> {
    let key = decode_secret(&account.secret)?;
    let step = time_step_at(unix_seconds, account.period);
    Ok(hotp_raw(&key, step, account.digits, account.algorithm))
}

/// Generate the account's current code from a [`TimeSource`] reading.
pub fn generate(account: &Account, time: &TimeSource) -> Result<String, OtpError> {
    generate_at(account, time.now_unix())
}

/// Generate a [`GeneratedCode`] with timing info attached.
pub fn generate_code(account: &Account, time: &TimeSource) -> Result<GeneratedCode, OtpError> {
    let now = time.now_unix();
    let key = decode_secret(&account.secret)?;
    let step = time_step_at(now, account.period);
    Ok(GeneratedCode {
        code: hotp_raw(&key, step, account.digits, account.algorithm),
        remaining_seconds: remaining_seconds_at(now, account.period),
        period: account.period,
        step,
        account_id: account.id.clone(),
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Verification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Verify an OTP code against an account at a specific timestamp.
///
/// `drift_window` specifies how many time-steps to check on either side
/// of the current step (e.g. 1 checks ±1).
pub fn verify_at(
    account: &Account,
    code: &str,
    drift_window: u32,
    unix_seconds: u64,
) -> Result<bool, OtpError> {
    let key = decode_secret(&account.secret)?;

    if code.len() != account.digits as usize || !code.chars().all(|c| c.is_ascii_digit()) {
        return Ok(false);
    }

    let base = time_step_at(unix_seconds, account.period);
    let start = base.saturating_sub(drift_window as u64);
    let end = base + drift_window as u64;

    for step in start..=end {
        let generated = hotp_raw(&key, step, account.digits, account.algorithm);
        if constant_time_eq(generated.as_bytes(), code.as_bytes()) {
            return Ok(true);
        }
    }
    Ok(false)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Utility helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Decode a base-32 secret (with or without spaces/dashes, case-insensitive).
pub fn decode_secret(b32: &str) -> Result<Vec<u8>, OtpError> {
    let cleaned = b32.replace(' ', "").replace('-', "").to_uppercase();
    if cleaned.is_empty() {
        return Err(OtpError::new(OtpErrorKind::InvalidSecret, "Empty base-32 secret"));
    }
    let padded = pad_base32(&cleaned);
    base32::decode(base32::Alphabet::Rfc4648 { padding: true }, &padded)
        .or_else(|| base32::decode(base32::Alphabet::Rfc4648 { padding: false }, &cleaned))
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| OtpError::new(OtpErrorKind::InvalidSecret, "Invalid base-32 secret"))
}

/// Encode raw bytes to base-32 (no padding, uppercase).
pub fn encode_secret(bytes: &[u8]) -> String {
    base32::encode(base32::Alphabet::Rfc4648 { padding: false }, bytes)
}

/// Generate a cryptographically-random base-32 secret.
pub fn generate_secret(byte_length: usize) -> String {
    use rand::RngCore;
    let mut buf = vec![0u8; byte_length];
    rand::thread_rng().fill_bytes(&mut buf);
    encode_secret(&buf)
}

/// Check if a string looks like a valid base-32 secret.
pub fn is_valid_base32(s: &str) -> bool {
    decode_secret(s).is_ok()
}

/// Pad a base-32 string to a multiple of 8 with '='.
fn pad_base32(s: &str) -> String {
    let remainder = s.len() % 8;
    if remainder == 0 {
        s.to_string()
    } else {
        let pad_count = 8 - remainder;
        format!("{}{}", s, "=".repeat(pad_count))
    }
}

/// Constant-time comparison (to prevent timing attacks on code verification).
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── RFC 4226 test vectors (Appendix D) ───────────────────────
    // Secret: "12345678901234567890" (ASCII) → base32: GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ

    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    fn account(secret: &str) -> Account {
        Account::new("Test", "user@example.com", secret).unwrap()
    }

    #[test]
    fn rfc4226_hotp_vectors() {
        let key = decode_secret(RFC_SECRET).unwrap();
        let expected = [
            "755224", "287082", "359152", "969429", "338314",
            "254676", "287922", "162583", "399871", "520489",
        ];
        for (counter, exp) in expected.iter().enumerate() {
            let code = hotp_raw(&key, counter as u64, 6, Algorithm::Sha1);
            assert_eq!(&code, exp, "HOTP mismatch at counter {}", counter);
        }
    }

    // ── RFC 6238 test vectors ────────────────────────────────────

    #[test]
    fn rfc6238_totp_sha1() {
        let a = account(RFC_SECRET).with_digits(8);
        assert_eq!(generate_at(&a, 59).unwrap(), "94287082");
    }

    #[test]
    fn rfc6238_totp_sha256() {
        let secret = encode_secret(b"12345678901234567890123456789012");
        let a = account(&secret).with_algorithm(Algorithm::Sha256).with_digits(8);
        assert_eq!(generate_at(&a, 59).unwrap(), "46119246");
    }

    #[test]
    fn rfc6238_totp_sha512() {
        let secret = encode_secret(
            b"1234567890123456789012345678901234567890123456789012345678901234",
        );
        let a = account(&secret).with_algorithm(Algorithm::Sha512).with_digits(8);
        assert_eq!(generate_at(&a, 59).unwrap(), "90693936");
    }

    #[test]
    fn rfc6238_totp_large_time() {
        let a = account(RFC_SECRET).with_digits(8);
        assert_eq!(generate_at(&a, 1111111109).unwrap(), "07081804");
        assert_eq!(generate_at(&a, 20000000000).unwrap(), "65353130");
    }

    // ── Time-step helpers ────────────────────────────────────────

    #[test]
    fn time_step_calculation() {
        assert_eq!(time_step_at(0, 30), 0);
        assert_eq!(time_step_at(29, 30), 0);
        assert_eq!(time_step_at(30, 30), 1);
        assert_eq!(time_step_at(59, 30), 1);
        assert_eq!(time_step_at(60, 30), 2);
    }

    #[test]
    fn remaining_seconds_in_range() {
        for t in 0..95u64 {
            let r = remaining_seconds_at(t, 30);
            assert!(r < 30, "remaining {} out of range at t={}", r, t);
        }
    }

    #[test]
    fn remaining_seconds_zero_only_on_boundary() {
        assert_eq!(remaining_seconds_at(0, 30), 0);
        assert_eq!(remaining_seconds_at(30, 30), 0);
        assert_eq!(remaining_seconds_at(1, 30), 29);
        assert_eq!(remaining_seconds_at(29, 30), 1);
        assert_eq!(remaining_seconds_at(31, 30), 29);
    }

    // ── Digit-count edge cases ───────────────────────────────────

    #[test]
    fn one_digit_code() {
        let a = account(RFC_SECRET).with_digits(1);
        let code = generate_at(&a, 59).unwrap();
        assert_eq!(code.len(), 1);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn ten_digit_code_is_padded_full_value() {
        // Truncated value is < 2^31 < 10^10, so the full value appears
        // zero-padded; no modulus overflow for any digit count.
        let a = account(RFC_SECRET).with_digits(10);
        let code = generate_at(&a, 59).unwrap();
        assert_eq!(code.len(), 10);
        assert!(code.ends_with("94287082"));
    }

    #[test]
    fn twelve_digit_code() {
        let a = account(RFC_SECRET).with_digits(12);
        let code = generate_at(&a, 59).unwrap();
        assert_eq!(code.len(), 12);
        assert!(code.starts_with("00"));
    }

    // ── Failure paths ────────────────────────────────────────────

    #[test]
    fn malformed_secret_is_an_error_not_a_zero_code() {
        let mut a = account(RFC_SECRET);
        a.secret = "!!!".into();
        let err = generate_at(&a, 59).unwrap_err();
        assert_eq!(err.kind, OtpErrorKind::InvalidSecret);
    }

    // ── Verification ─────────────────────────────────────────────

    #[test]
    fn verify_exact() {
        let a = account(RFC_SECRET);
        // At T=59 the 6-digit code is "287082"
        assert!(verify_at(&a, "287082", 0, 59).unwrap());
    }

    #[test]
    fn verify_with_drift() {
        let a = account(RFC_SECRET);
        // Step-0 code "755224" still matches at T=59 with window 1
        assert!(verify_at(&a, "755224", 1, 59).unwrap());
        assert!(!verify_at(&a, "755224", 0, 59).unwrap());
    }

    #[test]
    fn verify_wrong_code_and_length() {
        let a = account(RFC_SECRET);
        assert!(!verify_at(&a, "000000", 0, 59).unwrap());
        assert!(!verify_at(&a, "12345", 0, 59).unwrap());
        assert!(!verify_at(&a, "28708a", 0, 59).unwrap());
    }

    // ── Secret helpers ───────────────────────────────────────────

    #[test]
    fn decode_encode_roundtrip() {
        let original = b"hello world secret";
        let b32 = encode_secret(original);
        assert_eq!(decode_secret(&b32).unwrap(), original);
    }

    #[test]
    fn decode_with_spaces_dashes_case() {
        let d1 = decode_secret("JBSWY3DPEHPK3PXP").unwrap();
        let d2 = decode_secret("jbsw y3dp-ehpk 3pxp").unwrap();
        assert_eq!(d1, d2);
    }

    #[test]
    fn decode_invalid_and_empty() {
        assert!(decode_secret("!!!").is_err());
        assert!(decode_secret("").is_err());
        assert!(decode_secret(" - ").is_err());
    }

    #[test]
    fn generate_secret_length() {
        let s = generate_secret(20);
        assert_eq!(decode_secret(&s).unwrap().len(), 20);
    }

    #[test]
    fn is_valid_base32_check() {
        assert!(is_valid_base32("JBSWY3DPEHPK3PXP"));
        assert!(is_valid_base32("jbsw y3dp ehpk 3pxp"));
        assert!(!is_valid_base32(""));
        assert!(!is_valid_base32("!!!"));
    }

    // ── Bucket behavior ──────────────────────────────────────────

    #[test]
    fn different_buckets_produce_different_codes() {
        let a = Account::new("GitHub", "me@example.com", "JBSWY3DPEHPK3PXP").unwrap();
        let c1 = generate_at(&a, 1_000_000_000).unwrap();
        let c2 = generate_at(&a, 1_000_000_030).unwrap();
        assert_eq!(c1.len(), 6);
        assert_eq!(c2.len(), 6);
        assert_ne!(c1, c2);
        // Reproducible within the same bucket.
        assert_eq!(c1, generate_at(&a, 1_000_000_015).unwrap());
    }

    // ── constant_time_eq ─────────────────────────────────────────

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}

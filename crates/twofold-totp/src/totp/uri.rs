//! otpauth:// URI parsing and generation (Key Uri Format).

use crate::totp::types::*;
use url::Url;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse an `otpauth://totp/...` URI into an [`Account`].
///
/// The label may be `issuer:account`; an explicit `issuer` query
/// parameter wins over the label prefix. A missing `secret` parameter
/// is a hard rejection.
pub fn parse_otpauth_uri(uri: &str) -> Result<Account, OtpError> {
    let parsed = Url::parse(uri).map_err(|e| {
        OtpError::new(OtpErrorKind::InvalidUri, "Failed to parse URI").with_detail(e.to_string())
    })?;

    if parsed.scheme() != "otpauth" {
        return Err(OtpError::new(
            OtpErrorKind::InvalidUri,
            format!("Expected otpauth:// scheme, got {}://", parsed.scheme()),
        ));
    }

    // Host position carries the OTP type; only time-based is supported.
    let otp_type = parsed.host_str().unwrap_or_default().to_lowercase();
    if otp_type != "totp" {
        return Err(OtpError::new(
            OtpErrorKind::InvalidUri,
            format!("Unsupported OTP type '{}'", otp_type),
        ));
    }

    let label = percent_decode(parsed.path().trim_start_matches('/'));
    let (label_issuer, account_label) = match label.split_once(':') {
        Some((issuer, rest)) => (Some(issuer.trim().to_string()), rest.trim().to_string()),
        None => (None, label.trim().to_string()),
    };

    let mut secret = None;
    let mut issuer_param = None;
    let mut algorithm = Algorithm::default();
    let mut digits = 6u8;
    let mut period = 30u32;

    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "secret" => secret = Some(value.to_string()),
            "issuer" => issuer_param = Some(value.to_string()),
            "algorithm" => {
                algorithm = Algorithm::from_str_loose(&value).ok_or_else(|| {
                    OtpError::new(
                        OtpErrorKind::InvalidUri,
                        format!("Unknown algorithm '{}'", value),
                    )
                })?;
            }
            "digits" => {
                digits = value.parse().map_err(|_| {
                    OtpError::new(OtpErrorKind::InvalidUri, format!("Invalid digits '{}'", value))
                })?;
            }
            "period" => {
                period = value.parse().map_err(|_| {
                    OtpError::new(OtpErrorKind::InvalidUri, format!("Invalid period '{}'", value))
                })?;
            }
            _ => {}
        }
    }

    let secret = secret.filter(|s| !s.is_empty()).ok_or_else(|| {
        OtpError::new(OtpErrorKind::InvalidUri, "URI has no secret parameter")
    })?;
    let issuer = issuer_param
        .or(label_issuer)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());
    let account_label = if account_label.is_empty() {
        issuer.clone()
    } else {
        account_label
    };

    Account::new(&issuer, &account_label, &secret)
        .map(|a| a.with_algorithm(algorithm).with_digits(digits).with_period(period))
        .and_then(|a| {
            a.validate()?;
            Ok(a)
        })
}

fn percent_decode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut bytes = s.bytes();
    let mut buf = Vec::new();
    while let Some(b) = bytes.next() {
        if b == b'%' {
            let hi = bytes.next();
            let lo = bytes.next();
            if let (Some(hi), Some(lo)) = (hi, lo) {
                if let Ok(byte) = u8::from_str_radix(&format!("{}{}", hi as char, lo as char), 16) {
                    buf.push(byte);
                    continue;
                }
            }
            buf.push(b'%');
        } else if b == b'+' {
            buf.push(b' ');
        } else {
            buf.push(b);
        }
    }
    out.push_str(&String::from_utf8_lossy(&buf));
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Generation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build an otpauth URI for an account. Default algorithm, digits, and
/// period are omitted to keep QR payloads small.
pub fn build_otpauth_uri(account: &Account) -> String {
    let mut uri = format!(
        "otpauth://totp/{}:{}?secret={}&issuer={}",
        urlencode(&account.issuer),
        urlencode(&account.account_label),
        account.normalised_secret(),
        urlencode(&account.issuer),
    );
    if account.algorithm != Algorithm::Sha1 {
        uri.push_str(&format!("&algorithm={}", account.algorithm.uri_name()));
    }
    if account.digits != 6 {
        uri.push_str(&format!("&digits={}", account.digits));
    }
    if account.period != 30 {
        uri.push_str(&format!("&period={}", account.period));
    }
    uri
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_uri() {
        let account = parse_otpauth_uri(
            "otpauth://totp/GitHub:me%40example.com?secret=JBSWY3DPEHPK3PXP&issuer=GitHub&algorithm=SHA256&digits=8&period=60",
        )
        .unwrap();
        assert_eq!(account.issuer, "GitHub");
        assert_eq!(account.account_label, "me@example.com");
        assert_eq!(account.secret, "JBSWY3DPEHPK3PXP");
        assert_eq!(account.algorithm, Algorithm::Sha256);
        assert_eq!(account.digits, 8);
        assert_eq!(account.period, 60);
    }

    #[test]
    fn parse_minimal_uri_uses_defaults() {
        let account =
            parse_otpauth_uri("otpauth://totp/me%40example.com?secret=JBSWY3DPEHPK3PXP").unwrap();
        assert_eq!(account.account_label, "me@example.com");
        assert_eq!(account.issuer, "Unknown");
        assert_eq!(account.algorithm, Algorithm::Sha1);
        assert_eq!(account.digits, 6);
        assert_eq!(account.period, 30);
    }

    #[test]
    fn issuer_param_overrides_label_prefix() {
        let account = parse_otpauth_uri(
            "otpauth://totp/OldName:me?secret=JBSWY3DPEHPK3PXP&issuer=NewName",
        )
        .unwrap();
        assert_eq!(account.issuer, "NewName");
        assert_eq!(account.account_label, "me");
    }

    #[test]
    fn label_prefix_used_without_issuer_param() {
        let account =
            parse_otpauth_uri("otpauth://totp/GitHub:me?secret=JBSWY3DPEHPK3PXP").unwrap();
        assert_eq!(account.issuer, "GitHub");
    }

    #[test]
    fn missing_secret_rejected() {
        let err = parse_otpauth_uri("otpauth://totp/GitHub:me?issuer=GitHub").unwrap_err();
        assert_eq!(err.kind, OtpErrorKind::InvalidUri);
        let err = parse_otpauth_uri("otpauth://totp/GitHub:me?secret=").unwrap_err();
        assert_eq!(err.kind, OtpErrorKind::InvalidUri);
    }

    #[test]
    fn wrong_scheme_and_type_rejected() {
        assert!(parse_otpauth_uri("https://example.com").is_err());
        assert!(parse_otpauth_uri("otpauth://hotp/GitHub:me?secret=JBSWY3DPEHPK3PXP").is_err());
        assert!(parse_otpauth_uri("not a uri").is_err());
    }

    #[test]
    fn invalid_parameters_rejected() {
        assert!(parse_otpauth_uri(
            "otpauth://totp/a?secret=JBSWY3DPEHPK3PXP&algorithm=MD5"
        )
        .is_err());
        assert!(
            parse_otpauth_uri("otpauth://totp/a?secret=JBSWY3DPEHPK3PXP&digits=abc").is_err()
        );
        assert!(
            parse_otpauth_uri("otpauth://totp/a?secret=JBSWY3DPEHPK3PXP&period=0").is_err()
        );
    }

    #[test]
    fn build_omits_defaults() {
        let account = Account::new("GitHub", "me@example.com", "JBSWY3DPEHPK3PXP").unwrap();
        let uri = build_otpauth_uri(&account);
        assert!(uri.starts_with("otpauth://totp/GitHub:me%40example.com?"));
        assert!(!uri.contains("algorithm="));
        assert!(!uri.contains("digits="));
        assert!(!uri.contains("period="));
    }

    #[test]
    fn build_parse_roundtrip() {
        let account = Account::new("My Service", "user name", "JBSWY3DPEHPK3PXP")
            .unwrap()
            .with_algorithm(Algorithm::Sha512)
            .with_digits(7)
            .with_period(45);
        let reparsed = parse_otpauth_uri(&build_otpauth_uri(&account)).unwrap();
        assert_eq!(reparsed.issuer, account.issuer);
        assert_eq!(reparsed.account_label, account.account_label);
        assert_eq!(reparsed.algorithm, Algorithm::Sha512);
        assert_eq!(reparsed.digits, 7);
        assert_eq!(reparsed.period, 45);
    }
}

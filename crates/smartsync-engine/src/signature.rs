//! HMAC signing and verification of webhook pushes.
//!
//! A signed push carries `x-signature = hex(HMAC-SHA256(api_key, body || x-timestamp))`
//! where `x-timestamp` is unix epoch milliseconds.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Default tolerance between the signed timestamp and the server clock.
pub const DEFAULT_REPLAY_WINDOW_SECS: u64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("x-timestamp is required when x-signature is present")]
    MissingTimestamp,

    #[error("x-timestamp is not a unix millisecond timestamp")]
    InvalidTimestamp,

    #[error("timestamp is outside the replay window")]
    Stale,

    #[error("signature does not match payload")]
    Mismatch,

    #[error("signing key rejected")]
    Key,
}

fn keyed_mac(api_key: &str, body: &[u8], timestamp: &str) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(api_key.as_bytes()).map_err(|_| SignatureError::Key)?;
    mac.update(body);
    mac.update(timestamp.as_bytes());
    Ok(mac)
}

/// Lower-case hex signature for `body` sent at `timestamp`.
///
/// # Errors
///
/// Returns [`SignatureError::Key`] if the HMAC cannot be keyed.
pub fn sign_payload(api_key: &str, body: &[u8], timestamp: &str) -> Result<String, SignatureError> {
    let mac = keyed_mac(api_key, body, timestamp)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a signed push against the raw body bytes.
///
/// The timestamp is checked first so a stale request is rejected without
/// touching the MAC. Signatures of the wrong length or with non-hex characters
/// are mismatches.
///
/// # Errors
///
/// Returns the first [`SignatureError`] that applies.
pub fn verify_signature(
    api_key: &str,
    body: &[u8],
    signature: &str,
    timestamp: Option<&str>,
    now_ms: i64,
    window_secs: u64,
) -> Result<(), SignatureError> {
    let timestamp = timestamp
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(SignatureError::MissingTimestamp)?;
    let sent_at: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp)?;
    if now_ms.abs_diff(sent_at) > window_secs.saturating_mul(1_000) {
        return Err(SignatureError::Stale);
    }

    let presented = hex::decode(signature.trim()).map_err(|_| SignatureError::Mismatch)?;
    let expected = keyed_mac(api_key, body, timestamp)?.finalize().into_bytes();
    if presented.len() != expected.len() {
        return Err(SignatureError::Mismatch);
    }
    if bool::from(presented.as_slice().ct_eq(expected.as_slice())) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "whk_test";
    const BODY: &[u8] = br#"{"payload":[{"sku":"A","qty":1}]}"#;
    const NOW: i64 = 1_790_000_000_000;

    fn signed_now() -> (String, String) {
        let ts = NOW.to_string();
        let sig = sign_payload(KEY, BODY, &ts).unwrap();
        (sig, ts)
    }

    #[test]
    fn signature_is_64_hex_chars() {
        let (sig, _) = signed_now();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fresh_signature_verifies() {
        let (sig, ts) = signed_now();
        assert_eq!(
            verify_signature(KEY, BODY, &sig, Some(&ts), NOW + 10_000, 300),
            Ok(())
        );
    }

    #[test]
    fn tampered_body_is_rejected() {
        let (sig, ts) = signed_now();
        let tampered = br#"{"payload":[{"sku":"A","qty":1000}]}"#;
        assert_eq!(
            verify_signature(KEY, tampered, &sig, Some(&ts), NOW, 300),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn wrong_key_is_rejected() {
        let (sig, ts) = signed_now();
        assert_eq!(
            verify_signature("whk_other", BODY, &sig, Some(&ts), NOW, 300),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn stale_and_future_timestamps_are_rejected() {
        let (sig, ts) = signed_now();
        assert_eq!(
            verify_signature(KEY, BODY, &sig, Some(&ts), NOW + 301_000, 300),
            Err(SignatureError::Stale)
        );
        assert_eq!(
            verify_signature(KEY, BODY, &sig, Some(&ts), NOW - 301_000, 300),
            Err(SignatureError::Stale)
        );
    }

    #[test]
    fn missing_or_garbled_timestamp_is_rejected() {
        let (sig, _) = signed_now();
        assert_eq!(
            verify_signature(KEY, BODY, &sig, None, NOW, 300),
            Err(SignatureError::MissingTimestamp)
        );
        assert_eq!(
            verify_signature(KEY, BODY, &sig, Some("yesterday"), NOW, 300),
            Err(SignatureError::InvalidTimestamp)
        );
    }

    #[test]
    fn truncated_or_non_hex_signature_is_a_mismatch() {
        let (sig, ts) = signed_now();
        assert_eq!(
            verify_signature(KEY, BODY, &sig[..32], Some(&ts), NOW, 300),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_signature(KEY, BODY, "zz", Some(&ts), NOW, 300),
            Err(SignatureError::Mismatch)
        );
    }
}

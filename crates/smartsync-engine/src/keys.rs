//! Credential minting and digests.
//!
//! Agent keys and session tokens are shown once and stored only as
//! `sha256(salt || secret)`. Webhook keys stay in plaintext because they key
//! the HMAC.

use rand::RngCore;
use sha2::{Digest, Sha256};

pub const AGENT_KEY_PREFIX: &str = "ssa_";
pub const SESSION_TOKEN_PREFIX: &str = "sst_";
pub const WEBHOOK_KEY_PREFIX: &str = "whk_";

fn mint(prefix: &str) -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    format!("{prefix}{}", hex::encode(bytes))
}

/// `ssa_` followed by 64 hex characters from 32 random bytes.
#[must_use]
pub fn mint_agent_key() -> String {
    mint(AGENT_KEY_PREFIX)
}

#[must_use]
pub fn mint_session_token() -> String {
    mint(SESSION_TOKEN_PREFIX)
}

#[must_use]
pub fn mint_webhook_key() -> String {
    mint(WEBHOOK_KEY_PREFIX)
}

/// Salted SHA-256 digest, lower-case hex.
#[must_use]
pub fn hash_secret(salt: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_key_has_prefix_and_64_hex_chars() {
        let key = mint_agent_key();
        let body = key.strip_prefix(AGENT_KEY_PREFIX).expect("prefix");
        assert_eq!(body.len(), 64);
        assert!(body.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn minted_keys_differ() {
        assert_ne!(mint_agent_key(), mint_agent_key());
    }

    #[test]
    fn digest_depends_on_salt() {
        let secret = "ssa_abc";
        assert_eq!(hash_secret("s1", secret), hash_secret("s1", secret));
        assert_ne!(hash_secret("s1", secret), hash_secret("s2", secret));
        assert_eq!(hash_secret("s1", secret).len(), 64);
    }
}

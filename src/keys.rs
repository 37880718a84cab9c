//! Derivation of cookie-signing keys from the configured application secrets.
//!
//! Secrets are long-lived, caller-supplied strings; signing keys are derived
//! from them with HKDF-SHA256 under a per-purpose label so that the transient
//! cookie layer and the session cookie layer never share key material. A
//! [`KeyRing`] holds one derived key per configured secret, in configuration
//! order: index 0 belongs to the newest secret and signs everything written
//! from now on, while the remaining keys keep cookies signed under older
//! secrets verifiable during a rotation window.

use hkdf::Hkdf;
use sha2::Sha256;
use std::fmt;

use crate::errors::OIDCFlowError;

/// Purpose label for keys that sign transient (nonce/state/verifier) cookies.
pub const TRANSIENT_COOKIE_PURPOSE: &str = "transient cookie signing";
/// Purpose label for keys that sign the session cookie.
pub const SESSION_COOKIE_PURPOSE: &str = "session cookie signing";

const KEY_LEN: usize = 32;

/// Ordered, non-empty set of raw application secrets.
///
/// The first entry is the write secret; the rest are accepted for
/// verification only. Construction fails on an empty set or an empty member,
/// surfacing bad configuration at startup rather than at request time.
#[derive(Debug, Clone)]
pub struct SecretSet(Vec<String>);

impl SecretSet {
    pub fn new(secrets: Vec<String>) -> Result<Self, OIDCFlowError> {
        if secrets.is_empty() {
            return Err(OIDCFlowError::Configuration(
                "at least one cookie secret is required".to_string(),
            ));
        }
        if secrets.iter().any(|s| s.is_empty()) {
            return Err(OIDCFlowError::Configuration(
                "cookie secrets must not be empty".to_string(),
            ));
        }
        Ok(SecretSet(secrets))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// A derived 32-byte symmetric signing key.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey([u8; KEY_LEN]);

impl SigningKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

// Key material stays out of logs.
impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

/// Derives the signing key for one secret and one purpose label.
///
/// Deterministic: identical inputs always yield the identical key, which is
/// what makes stateless verification across processes possible.
pub fn derive_key(secret: &str, purpose: &str) -> SigningKey {
    let hk = Hkdf::<Sha256>::new(None, secret.as_bytes());
    let mut okm = [0u8; KEY_LEN];
    hk.expand(purpose.as_bytes(), &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    SigningKey(okm)
}

/// All signing keys for one purpose, derived once at configuration-load time
/// and passed by reference wherever cookies are signed or verified.
#[derive(Debug, Clone)]
pub struct KeyRing {
    keys: Vec<SigningKey>,
}

impl KeyRing {
    /// Derives one key per configured secret, preserving secret order.
    pub fn derive(secrets: &SecretSet, purpose: &str) -> Self {
        let keys = secrets
            .iter()
            .map(|secret| derive_key(secret, purpose))
            .collect();
        KeyRing { keys }
    }

    /// The key new cookies are signed under (first configured secret).
    pub fn write_key(&self) -> &SigningKey {
        &self.keys[0]
    }

    /// Every key accepted during verification, in configured order. The first
    /// key whose tag matches wins.
    pub fn verify_keys(&self) -> &[SigningKey] {
        &self.keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_key_is_deterministic() {
        let a = derive_key("a long lived secret", TRANSIENT_COOKIE_PURPOSE);
        let b = derive_key("a long lived secret", TRANSIENT_COOKIE_PURPOSE);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_purposes_yield_distinct_keys() {
        let transient = derive_key("secret", TRANSIENT_COOKIE_PURPOSE);
        let session = derive_key("secret", SESSION_COOKIE_PURPOSE);
        assert_ne!(transient, session);
    }

    #[test]
    fn distinct_secrets_yield_distinct_keys() {
        let a = derive_key("secret-a", TRANSIENT_COOKIE_PURPOSE);
        let b = derive_key("secret-b", TRANSIENT_COOKIE_PURPOSE);
        assert_ne!(a, b);
    }

    #[test]
    fn key_ring_preserves_secret_order() {
        let secrets =
            SecretSet::new(vec!["current".to_string(), "previous".to_string()]).unwrap();
        let ring = KeyRing::derive(&secrets, TRANSIENT_COOKIE_PURPOSE);

        assert_eq!(
            ring.write_key(),
            &derive_key("current", TRANSIENT_COOKIE_PURPOSE)
        );
        assert_eq!(ring.verify_keys().len(), 2);
        assert_eq!(
            &ring.verify_keys()[1],
            &derive_key("previous", TRANSIENT_COOKIE_PURPOSE)
        );
    }

    #[test]
    fn empty_secret_set_is_rejected() {
        assert!(SecretSet::new(Vec::new()).is_err());
    }

    #[test]
    fn empty_secret_member_is_rejected() {
        assert!(SecretSet::new(vec!["ok".to_string(), String::new()]).is_err());
    }
}

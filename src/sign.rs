//! Tamper-evident cookie values.
//!
//! A signed cookie value is `base64url(payload) + "." + base64url(tag)` where
//! the tag is an HMAC-SHA256 over the cookie name and the encoded payload.
//! Binding the name into the tag means a value lifted out of one cookie never
//! verifies under another name, closing cookie-substitution attacks.
//!
//! Verification accepts a list of candidate keys so that secret rotation does
//! not invalidate cookies signed under the previous secret: keys are tried in
//! configured order and the first matching tag wins. Tag comparison is
//! constant time. Anything that fails to verify, for whatever reason, decodes
//! to `None` — callers are never told whether a value was malformed or
//! carried a bad signature.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::keys::SigningKey;

type HmacSha256 = Hmac<Sha256>;

const TAG_LEN: usize = 32;
// Base64url without padding for a 32-byte tag is 43 characters.
const TAG_B64_LEN: usize = 43;

fn compute_tag(name: &str, payload_b64: &str, key: &SigningKey) -> [u8; TAG_LEN] {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .expect("HMAC-SHA256 accepts any key length");
    mac.update(name.as_bytes());
    mac.update(b"=");
    mac.update(payload_b64.as_bytes());
    mac.finalize().into_bytes().into()
}

/// Signs `value` for the cookie called `name` under `key`.
pub fn encode(name: &str, value: &str, key: &SigningKey) -> String {
    let payload = URL_SAFE_NO_PAD.encode(value.as_bytes());
    let tag = compute_tag(name, &payload, key);
    format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(tag))
}

/// Recovers the payload of a signed cookie value, or `None` if the value is
/// malformed or no candidate key produces a matching tag.
pub fn decode(name: &str, raw: &str, keys: &[SigningKey]) -> Option<String> {
    let (payload, sig) = raw.rsplit_once('.')?;
    if sig.len() != TAG_B64_LEN {
        return None;
    }
    let provided = URL_SAFE_NO_PAD.decode(sig).ok()?;
    if provided.len() != TAG_LEN {
        return None;
    }

    let matched = keys.iter().any(|key| {
        let expected = compute_tag(name, payload, key);
        bool::from(provided.as_slice().ct_eq(&expected))
    });
    if !matched {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    String::from_utf8(bytes).ok()
}

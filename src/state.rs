//! The `state` authorization parameter doubles as CSRF protection and as a
//! carrier for application state across the redirect to the identity
//! provider, most importantly where to send the user after login.
//!
//! The encoded form travels twice: unsigned in the `state` query parameter of
//! the authorization request, and signed inside the `state` transient cookie.
//! The callback compares the returned parameter against the verified cookie
//! copy, so tampering with either is caught without the parameter itself
//! needing a signature.
//!
//! `returnTo` resolution is where open-redirect protection happens: a value
//! arriving on the querystring is honored only when it is a path-relative
//! reference, so `returnTo=https://evil.example` can never bounce a victim
//! off-site. Explicit caller options and the custom state hook are trusted
//! code and may use absolute URLs.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;

use crate::errors::OIDCFlowError;
use crate::utils::to_absolute;

/// Login state is an open mapping of caller-chosen keys to JSON values.
pub type LoginStateMap = serde_json::Map<String, Value>;

pub const RETURN_TO_KEY: &str = "returnTo";

/// Serializes login state to the compact form embedded in the `state`
/// authorization parameter.
pub fn encode_state(state: &LoginStateMap) -> String {
    let json = serde_json::to_string(state).expect("a JSON object always serializes");
    URL_SAFE_NO_PAD.encode(json.as_bytes())
}

/// Inverse of [`encode_state`]. `None` for anything that is not the base64url
/// encoding of a JSON object.
pub fn decode_state(raw: &str) -> Option<LoginStateMap> {
    let bytes = URL_SAFE_NO_PAD.decode(raw).ok()?;
    match serde_json::from_slice(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Whether a querystring-supplied redirect target may be honored: only
/// path-relative references qualify. Protocol-relative (`//host`) and
/// backslash (`/\host`, which browsers normalize to `//host`) forms are
/// rejected along with absolute URLs.
pub fn is_safe_redirect(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.starts_with("/\\")
}

/// Builds the login-state mapping for one authorization request.
///
/// `returnTo` precedence, lowest to highest: the configured default, the
/// first `returnTo` querystring value (relative references only), the
/// explicit caller option (absolute allowed), and finally the custom state
/// hook's own `returnTo`. Everything below the hook is resolved to an
/// absolute URL against `resolve_base`; the hook's value is embedded as
/// returned.
///
/// A hook that produced anything but a JSON object aborts the login attempt
/// with [`OIDCFlowError::InvalidCustomState`].
pub fn build_login_state(
    default_return_to: &str,
    query_return_to: Option<&str>,
    option_return_to: Option<&str>,
    resolve_base: &str,
    hook_state: Option<Value>,
) -> Result<LoginStateMap, OIDCFlowError> {
    let mut return_to = default_return_to;
    if let Some(candidate) = query_return_to {
        if is_safe_redirect(candidate) {
            return_to = candidate;
        }
    }
    if let Some(explicit) = option_return_to {
        return_to = explicit;
    }
    let return_to = to_absolute(return_to, resolve_base)?;

    let mut state = LoginStateMap::new();
    state.insert(RETURN_TO_KEY.to_string(), Value::String(return_to));

    if let Some(custom) = hook_state {
        let Value::Object(custom) = custom else {
            return Err(OIDCFlowError::InvalidCustomState);
        };
        for (key, value) in custom {
            state.insert(key, value);
        }
    }

    Ok(state)
}

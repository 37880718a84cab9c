//! Single-use cookies that survive the redirect round trip to the identity
//! provider.
//!
//! Each transient entry (nonce, state, PKCE code verifier) is written exactly
//! once when login starts and read-then-deleted exactly once on callback. The
//! values are signed with the [`crate::sign`] codec; a cookie that fails
//! verification reads as absent, which callers treat as "the state protocol
//! failed" rather than as an error.
//!
//! Browsers that predate `SameSite=None` mishandle cookies carrying that
//! attribute, so when legacy compatibility is enabled every `SameSite=None`
//! write is mirrored into a fallback cookie with no SameSite/Secure
//! attributes at all, named by prefixing the original name with an
//! underscore. Reads consult the fallback only after the primary fails, and
//! always clear both.

use cookie::Expiration;
use rocket::http::{Cookie, CookieJar, SameSite};
use serde_derive::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::keys::KeyRing;
use crate::sign;

// Transient cookies only need to outlive one redirect round trip.
const TRANSIENT_TTL: Duration = Duration::minutes(10);

/// The cookie surface the store writes through. Implemented for Rocket's
/// [`CookieJar`]; tests use an in-memory jar.
pub trait CookieIo {
    fn get(&self, name: &str) -> Option<String>;
    fn add(&self, cookie: Cookie<'static>);
    fn remove(&self, cookie: Cookie<'static>);
}

impl CookieIo for CookieJar<'_> {
    fn get(&self, name: &str) -> Option<String> {
        CookieJar::get(self, name).map(|cookie| cookie.value().to_string())
    }

    fn add(&self, cookie: Cookie<'static>) {
        CookieJar::add(self, cookie);
    }

    fn remove(&self, cookie: Cookie<'static>) {
        CookieJar::remove(self, cookie);
    }
}

/// Attributes applied to every cookie the crate writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieOptions {
    pub domain: Option<String>,
    pub path: String,
    pub secure: bool,
    /// Mirror `SameSite=None` cookies into an attribute-free fallback for
    /// clients whose browser predates `SameSite=None` support.
    pub legacy_same_site: bool,
}

impl Default for CookieOptions {
    fn default() -> CookieOptions {
        CookieOptions {
            domain: None,
            path: "/".to_string(),
            secure: true,
            legacy_same_site: true,
        }
    }
}

impl CookieOptions {
    /// Builds a cookie with this configuration's attributes. `same_site:
    /// None` means the legacy fallback shape: no SameSite and no Secure.
    pub(crate) fn build_cookie(
        &self,
        name: String,
        value: String,
        same_site: Option<SameSite>,
    ) -> Cookie<'static> {
        let mut builder = Cookie::build((name, value))
            .http_only(true)
            .path(self.path.clone())
            .expires(Expiration::DateTime(OffsetDateTime::now_utc() + TRANSIENT_TTL));
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        match same_site {
            // Browsers reject SameSite=None without Secure.
            Some(SameSite::None) => builder.same_site(SameSite::None).secure(true),
            Some(same_site) => builder.same_site(same_site).secure(self.secure),
            None => builder,
        }
        .build()
    }

    /// A cookie whose name/path/domain match what [`build_cookie`] wrote, as
    /// required for removal.
    pub(crate) fn removal_cookie(&self, name: &str) -> Cookie<'static> {
        let mut builder = Cookie::build((name.to_string(), "")).path(self.path.clone());
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        builder.build()
    }
}

/// The underscore-prefix convention for legacy fallback cookies lives here
/// and nowhere else.
fn fallback_name(name: &str) -> String {
    format!("_{name}")
}

/// Writes and consumes signed transient cookies.
#[derive(Debug, Clone)]
pub struct TransientStore {
    options: CookieOptions,
}

impl TransientStore {
    pub fn new(options: CookieOptions) -> Self {
        TransientStore { options }
    }

    /// Signs `value` under `name` and sets the cookie. Returns the signed
    /// value as written.
    ///
    /// With legacy compatibility enabled, a `SameSite=None` write also sets
    /// the attribute-free fallback cookie carrying the same signed value.
    pub fn save(
        &self,
        jar: &dyn CookieIo,
        name: &str,
        value: &str,
        same_site: SameSite,
        keys: &KeyRing,
    ) -> String {
        let signed = sign::encode(name, value, keys.write_key());
        jar.add(
            self.options
                .build_cookie(name.to_string(), signed.clone(), Some(same_site)),
        );
        if self.options.legacy_same_site && same_site == SameSite::None {
            jar.add(
                self.options
                    .build_cookie(fallback_name(name), signed.clone(), None),
            );
        }
        signed
    }

    /// Verifies and returns the transient value, clearing the cookie(s)
    /// whether or not verification succeeds. `None` means expired, tampered,
    /// or dropped by the browser — never an error.
    pub fn read(&self, jar: &dyn CookieIo, name: &str, keys: &KeyRing) -> Option<String> {
        let mut value = jar
            .get(name)
            .and_then(|raw| sign::decode(name, &raw, keys.verify_keys()));
        jar.remove(self.options.removal_cookie(name));

        if self.options.legacy_same_site {
            let fallback = fallback_name(name);
            if value.is_none() {
                // Fallback carries the value signed under the primary name.
                value = jar
                    .get(&fallback)
                    .and_then(|raw| sign::decode(name, &raw, keys.verify_keys()));
            }
            jar.remove(self.options.removal_cookie(&fallback));
        }
        value
    }
}

#[cfg(test)]
pub(crate) mod test_jar {
    use super::CookieIo;
    use rocket::http::Cookie;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Conflates request and response cookies so save-then-read behaves like
    /// a browser replaying what the server set.
    pub(crate) struct MemoryJar {
        cookies: RefCell<HashMap<String, Cookie<'static>>>,
    }

    impl MemoryJar {
        pub(crate) fn new() -> Self {
            MemoryJar {
                cookies: RefCell::new(HashMap::new()),
            }
        }

        pub(crate) fn contains(&self, name: &str) -> bool {
            self.cookies.borrow().contains_key(name)
        }

        pub(crate) fn cookie(&self, name: &str) -> Option<Cookie<'static>> {
            self.cookies.borrow().get(name).cloned()
        }

        /// Simulates the browser dropping a cookie.
        pub(crate) fn drop_cookie(&self, name: &str) {
            self.cookies.borrow_mut().remove(name);
        }

        /// Simulates an attacker-supplied raw cookie value.
        pub(crate) fn inject(&self, name: &str, value: &str) {
            self.cookies.borrow_mut().insert(
                name.to_string(),
                Cookie::new(name.to_string(), value.to_string()),
            );
        }
    }

    impl CookieIo for MemoryJar {
        fn get(&self, name: &str) -> Option<String> {
            self.cookies
                .borrow()
                .get(name)
                .map(|cookie| cookie.value().to_string())
        }

        fn add(&self, cookie: Cookie<'static>) {
            self.cookies
                .borrow_mut()
                .insert(cookie.name().to_string(), cookie);
        }

        fn remove(&self, cookie: Cookie<'static>) {
            self.cookies.borrow_mut().remove(cookie.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_jar::MemoryJar;
    use super::*;
    use crate::keys::{KeyRing, SecretSet, TRANSIENT_COOKIE_PURPOSE};

    fn test_keys() -> KeyRing {
        let secrets = SecretSet::new(vec!["test-secret".to_string()]).unwrap();
        KeyRing::derive(&secrets, TRANSIENT_COOKIE_PURPOSE)
    }

    fn test_store() -> TransientStore {
        TransientStore::new(CookieOptions::default())
    }

    #[test]
    fn save_then_read_returns_original_value() {
        let jar = MemoryJar::new();
        let keys = test_keys();
        let store = test_store();

        store.save(&jar, "nonce", "abc123", SameSite::Lax, &keys);
        assert_eq!(store.read(&jar, "nonce", &keys), Some("abc123".to_string()));
    }

    #[test]
    fn read_clears_the_cookie_even_on_success() {
        let jar = MemoryJar::new();
        let keys = test_keys();
        let store = test_store();

        store.save(&jar, "nonce", "abc123", SameSite::Lax, &keys);
        assert!(store.read(&jar, "nonce", &keys).is_some());
        assert!(!jar.contains("nonce"));
        // A second read must not replay the value.
        assert_eq!(store.read(&jar, "nonce", &keys), None);
    }

    #[test]
    fn tampered_cookie_reads_as_absent_and_is_cleared() {
        let jar = MemoryJar::new();
        let keys = test_keys();
        let store = test_store();

        let signed = store.save(&jar, "state", "value", SameSite::Lax, &keys);
        jar.inject("state", &format!("{signed}x"));

        assert_eq!(store.read(&jar, "state", &keys), None);
        assert!(!jar.contains("state"));
    }

    #[test]
    fn lax_save_does_not_write_a_fallback_cookie() {
        let jar = MemoryJar::new();
        let store = test_store();

        store.save(&jar, "nonce", "abc", SameSite::Lax, &test_keys());
        assert!(jar.contains("nonce"));
        assert!(!jar.contains("_nonce"));
    }

    #[test]
    fn same_site_none_save_writes_fallback_and_forces_secure() {
        let jar = MemoryJar::new();
        let store = TransientStore::new(CookieOptions {
            secure: false,
            ..CookieOptions::default()
        });

        store.save(&jar, "verification", "abc", SameSite::None, &test_keys());

        let primary = jar.cookie("verification").unwrap();
        assert_eq!(primary.same_site(), Some(SameSite::None));
        // Secure is forced on despite the configuration.
        assert_eq!(primary.secure(), Some(true));

        let fallback = jar.cookie("_verification").unwrap();
        assert_eq!(fallback.same_site(), None);
        assert_ne!(fallback.secure(), Some(true));
        assert_eq!(fallback.value(), primary.value());
    }

    #[test]
    fn read_falls_back_to_legacy_cookie_when_primary_is_dropped() {
        let jar = MemoryJar::new();
        let keys = test_keys();
        let store = test_store();

        store.save(&jar, "verification", "abc", SameSite::None, &keys);
        jar.drop_cookie("verification");

        assert_eq!(
            store.read(&jar, "verification", &keys),
            Some("abc".to_string())
        );
        assert!(!jar.contains("_verification"));
    }

    #[test]
    fn successful_primary_read_still_clears_the_fallback() {
        let jar = MemoryJar::new();
        let keys = test_keys();
        let store = test_store();

        store.save(&jar, "verification", "abc", SameSite::None, &keys);
        assert!(store.read(&jar, "verification", &keys).is_some());

        assert!(!jar.contains("verification"));
        assert!(!jar.contains("_verification"));
        assert_eq!(store.read(&jar, "verification", &keys), None);
    }

    #[test]
    fn legacy_mode_off_ignores_the_fallback_cookie() {
        let jar = MemoryJar::new();
        let keys = test_keys();
        let strict = TransientStore::new(CookieOptions {
            legacy_same_site: false,
            ..CookieOptions::default()
        });
        let legacy = test_store();

        legacy.save(&jar, "verification", "abc", SameSite::None, &keys);
        jar.drop_cookie("verification");

        assert_eq!(strict.read(&jar, "verification", &keys), None);
    }

    #[test]
    fn cookies_are_http_only_with_configured_path() {
        let jar = MemoryJar::new();
        let store = TransientStore::new(CookieOptions {
            domain: Some("example.org".to_string()),
            ..CookieOptions::default()
        });

        store.save(&jar, "nonce", "abc", SameSite::Lax, &test_keys());
        let cookie = jar.cookie("nonce").unwrap();
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.domain(), Some("example.org"));
    }
}

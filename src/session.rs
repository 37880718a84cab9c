//! The session collaborator consulted by logout and fed by the callback.
//!
//! Persistent session storage proper lives outside this crate; what logout
//! needs is only the three operations below. [`CookieSession`] is the
//! built-in implementation, keeping the raw ID token in a signed cookie.

use rocket::http::SameSite;

use crate::keys::KeyRing;
use crate::sign;
use crate::transient::{CookieIo, CookieOptions};

pub const SESSION_COOKIE: &str = "appSession";

pub trait Session {
    fn is_authenticated(&self) -> bool;
    /// The raw ID token to pass as `id_token_hint` on RP-initiated logout.
    fn id_token(&self) -> Option<String>;
    fn set_id_token(&self, raw: &str);
    fn delete(&self);
}

/// Signed-cookie-backed session.
pub struct CookieSession<'a> {
    jar: &'a dyn CookieIo,
    options: &'a CookieOptions,
    keys: &'a KeyRing,
}

impl<'a> CookieSession<'a> {
    pub fn new(jar: &'a dyn CookieIo, options: &'a CookieOptions, keys: &'a KeyRing) -> Self {
        CookieSession { jar, options, keys }
    }
}

impl Session for CookieSession<'_> {
    fn is_authenticated(&self) -> bool {
        self.id_token().is_some()
    }

    fn id_token(&self) -> Option<String> {
        self.jar
            .get(SESSION_COOKIE)
            .and_then(|raw| sign::decode(SESSION_COOKIE, &raw, self.keys.verify_keys()))
    }

    fn set_id_token(&self, raw: &str) {
        let signed = sign::encode(SESSION_COOKIE, raw, self.keys.write_key());
        self.jar.add(self.options.build_cookie(
            SESSION_COOKIE.to_string(),
            signed,
            Some(SameSite::Lax),
        ));
    }

    fn delete(&self) {
        self.jar.remove(self.options.removal_cookie(SESSION_COOKIE));
    }
}

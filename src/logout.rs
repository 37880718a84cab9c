//! Tears a session down, locally and optionally at the identity provider.
//!
//! Logout is idempotent: an unauthenticated request redirects straight to the
//! return URL without touching anything. For an authenticated session the
//! local state is deleted before any provider redirect is computed, so a
//! failure building the end-session URL can never leave the session behind.

use rocket::response::Redirect;

use crate::AuthState;
use crate::errors::OIDCFlowError;
use crate::session::Session;
use crate::utils::to_absolute;

/// Per-call overrides for one logout invocation. `return_to` comes from
/// application code; querystring values are deliberately not consulted here.
#[derive(Debug, Clone, Default)]
pub struct LogoutOptions {
    pub return_to: Option<String>,
}

/// Clears the session and returns the redirect ending the logout: either the
/// provider's end-session endpoint or the local return URL.
pub fn logout_redirect(
    auth: &AuthState,
    session: &dyn Session,
    options: &LogoutOptions,
) -> Result<Redirect, OIDCFlowError> {
    let requested = options
        .return_to
        .as_deref()
        .or(auth.config.post_logout_redirect.as_deref())
        .unwrap_or(&auth.config.base_url);
    let return_to = to_absolute(requested, &auth.config.base_url)?;

    let target = logout_target(return_to, auth.config.idp_logout, session, |hint, post| {
        auth.client.end_session_url(hint, post)
    });
    Ok(Redirect::to(target))
}

/// The core sequencing, kept free of the HTTP types: check authentication,
/// capture the ID-token hint, delete the session, then pick the destination.
fn logout_target(
    return_to: String,
    idp_logout: bool,
    session: &dyn Session,
    end_session: impl FnOnce(Option<&str>, &str) -> Option<String>,
) -> String {
    if !session.is_authenticated() {
        return return_to;
    }

    let id_token_hint = session.id_token();
    // Local deletion happens before the provider redirect is computed.
    session.delete();

    if idp_logout {
        if let Some(url) = end_session(id_token_hint.as_deref(), &return_to) {
            return url;
        }
    }
    return_to
}

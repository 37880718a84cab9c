//! Builds the authorization request that starts a login attempt.
//!
//! One invocation: build the login state, generate the nonce and PKCE
//! material, persist all three as signed transient cookies, then compose the
//! provider's authorization URL and redirect. Anything that fails does so
//! before the redirect is issued, so a failed attempt never sends the user
//! to the identity provider with half the protocol state missing.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use openidconnect::core::CoreResponseType;
use openidconnect::{AuthenticationFlow, CsrfToken, Nonce, PkceCodeChallenge, Scope};
use rocket::http::SameSite;
use rocket::response::Redirect;
use serde_json::Value;
use std::sync::Arc;

use crate::AuthState;
use crate::errors::OIDCFlowError;
use crate::state::{build_login_state, encode_state};
use crate::transient::CookieIo;
use crate::utils::{first_query_value, generate_random_bytes};

pub const NONCE_COOKIE: &str = "nonce";
pub const STATE_COOKIE: &str = "state";
pub const VERIFIER_COOKIE: &str = "code_verifier";

/// Scopes requested when neither configuration nor the caller says otherwise.
pub const DEFAULT_SCOPE: &str = "openid profile email";

// Parameters the orchestrator itself composes; never taken from caller or
// configuration extras.
const RESERVED_PARAMS: &[&str] = &[
    "client_id",
    "redirect_uri",
    "response_type",
    "state",
    "nonce",
    "code_challenge",
    "code_challenge_method",
];

/// Per-call overrides for one login invocation. Everything here comes from
/// application code, not from the end user.
#[derive(Debug, Clone, Default)]
pub struct LoginOptions {
    /// Where to send the user after login. Unlike the querystring value,
    /// this may be an absolute URL.
    pub return_to: Option<String>,
    /// Overrides the redirect URI whose origin relative `returnTo` values
    /// resolve against.
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub audience: Option<String>,
    pub organization: Option<String>,
    pub invitation: Option<String>,
    /// Arbitrary additional authorization parameters.
    pub authorization_params: Vec<(String, String)>,
}

/// Application hook producing extra login state. Must return a JSON object;
/// anything else aborts the login attempt.
pub type LoginStateHook = Arc<dyn Fn(&LoginOptions) -> Value + Send + Sync>;

/// Runs the whole login sequence and returns the redirect to the provider's
/// authorization endpoint.
pub fn authorize_redirect(
    auth: &AuthState,
    jar: &dyn CookieIo,
    raw_query: Option<&str>,
    options: &LoginOptions,
) -> Result<Redirect, OIDCFlowError> {
    // The custom hook runs before anything is persisted, so a bad hook
    // aborts with no cookies written.
    let hook_state = auth.login_state_hook.as_ref().map(|hook| hook(options));
    let resolve_base = options
        .redirect_uri
        .as_deref()
        .unwrap_or(&auth.config.redirect_uri);
    let query_return_to = raw_query.and_then(|query| first_query_value(query, "returnTo"));

    let login_state = build_login_state(
        &auth.config.base_url,
        query_return_to.as_deref(),
        options.return_to.as_deref(),
        resolve_base,
        hook_state,
    )?;
    let encoded_state = encode_state(&login_state);

    let nonce_value = URL_SAFE_NO_PAD.encode(generate_random_bytes(32));
    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    auth.transient
        .save(jar, NONCE_COOKIE, &nonce_value, SameSite::Lax, &auth.keys);
    auth.transient
        .save(jar, STATE_COOKIE, &encoded_state, SameSite::Lax, &auth.keys);
    auth.transient.save(
        jar,
        VERIFIER_COOKIE,
        pkce_verifier.secret(),
        SameSite::Lax,
        &auth.keys,
    );

    let merged = merged_authorization_params(&auth.config, options);
    let (scopes, extra) = split_authorization_params(merged);

    let state_param = encoded_state.clone();
    let nonce_param = nonce_value.clone();
    let mut request = auth
        .client
        .client
        .authorize_url(
            AuthenticationFlow::<CoreResponseType>::AuthorizationCode,
            move || CsrfToken::new(state_param),
            move || Nonce::new(nonce_param),
        )
        .set_pkce_challenge(pkce_challenge);
    for scope in scopes {
        request = request.add_scope(Scope::new(scope));
    }
    for (name, value) in extra {
        request = request.add_extra_param(name, value);
    }
    let (authorize_url, _state, _nonce) = request.url();

    Ok(Redirect::to(authorize_url.to_string()))
}

/// Merges authorization parameters as an ordered list of layers, last wins:
/// crate defaults, then static configuration, then per-call options.
pub(crate) fn merged_authorization_params(
    config: &crate::OIDCLoginConfig,
    options: &LoginOptions,
) -> Vec<(String, String)> {
    let mut config_layer: Vec<(String, String)> = Vec::new();
    if let Some(scope) = &config.scope {
        config_layer.push(("scope".to_string(), scope.clone()));
    }
    if let Some(audience) = &config.audience {
        config_layer.push(("audience".to_string(), audience.clone()));
    }
    if let Some(organization) = &config.organization {
        config_layer.push(("organization".to_string(), organization.clone()));
    }
    config_layer.extend(config.authorization_params.iter().cloned());

    let mut option_layer: Vec<(String, String)> = Vec::new();
    if let Some(scope) = &options.scope {
        option_layer.push(("scope".to_string(), scope.clone()));
    }
    if let Some(audience) = &options.audience {
        option_layer.push(("audience".to_string(), audience.clone()));
    }
    if let Some(organization) = &options.organization {
        option_layer.push(("organization".to_string(), organization.clone()));
    }
    if let Some(invitation) = &options.invitation {
        option_layer.push(("invitation".to_string(), invitation.clone()));
    }
    option_layer.extend(options.authorization_params.iter().cloned());

    let layers: [Vec<(String, String)>; 3] = [
        vec![("scope".to_string(), DEFAULT_SCOPE.to_string())],
        config_layer,
        option_layer,
    ];

    let mut merged: Vec<(String, String)> = Vec::new();
    for layer in layers {
        for (name, value) in layer {
            match merged.iter_mut().find(|(existing, _)| *existing == name) {
                Some(slot) => slot.1 = value,
                None => merged.push((name, value)),
            }
        }
    }
    merged
}

/// Splits the merged parameters into the scope list (minus `openid`, which
/// the client adds on its own) and the extra parameters, dropping anything
/// the orchestrator reserves for itself.
pub(crate) fn split_authorization_params(
    merged: Vec<(String, String)>,
) -> (Vec<String>, Vec<(String, String)>) {
    let mut scopes = Vec::new();
    let mut extra = Vec::new();
    for (name, value) in merged {
        if name == "scope" {
            scopes = value
                .split_whitespace()
                .filter(|scope| *scope != "openid")
                .map(str::to_string)
                .collect();
        } else if !RESERVED_PARAMS.contains(&name.as_str()) {
            extra.push((name, value));
        }
    }
    (scopes, extra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OIDCLoginConfig;
    use openidconnect::PkceCodeVerifier;
    use sha2::{Digest, Sha256};

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn caller_options_override_config_which_overrides_defaults() {
        let config = OIDCLoginConfig {
            scope: Some("openid email".to_string()),
            audience: Some("https://api".to_string()),
            ..OIDCLoginConfig::default()
        };
        let options = LoginOptions {
            audience: Some("urn:other".to_string()),
            authorization_params: params(&[("prompt", "login")]),
            ..LoginOptions::default()
        };

        let merged = merged_authorization_params(&config, &options);
        assert_eq!(
            merged,
            params(&[
                ("scope", "openid email"),
                ("audience", "urn:other"),
                ("prompt", "login"),
            ])
        );
    }

    #[test]
    fn defaults_survive_when_nothing_overrides_them() {
        let merged =
            merged_authorization_params(&OIDCLoginConfig::default(), &LoginOptions::default());
        assert_eq!(merged, params(&[("scope", DEFAULT_SCOPE)]));
    }

    #[test]
    fn organization_and_invitation_ride_the_same_precedence() {
        let config = OIDCLoginConfig {
            organization: Some("org_config".to_string()),
            ..OIDCLoginConfig::default()
        };
        let options = LoginOptions {
            organization: Some("org_caller".to_string()),
            invitation: Some("inv_123".to_string()),
            ..LoginOptions::default()
        };

        let merged = merged_authorization_params(&config, &options);
        assert!(merged.contains(&("organization".to_string(), "org_caller".to_string())));
        assert!(merged.contains(&("invitation".to_string(), "inv_123".to_string())));
    }

    #[test]
    fn caller_extra_params_override_config_extra_params() {
        let config = OIDCLoginConfig {
            authorization_params: params(&[("prompt", "none"), ("max_age", "86400")]),
            ..OIDCLoginConfig::default()
        };
        let options = LoginOptions {
            authorization_params: params(&[("prompt", "login")]),
            ..LoginOptions::default()
        };

        let merged = merged_authorization_params(&config, &options);
        assert!(merged.contains(&("prompt".to_string(), "login".to_string())));
        assert!(merged.contains(&("max_age".to_string(), "86400".to_string())));
    }

    #[test]
    fn split_extracts_scopes_and_drops_openid() {
        let (scopes, extra) = split_authorization_params(params(&[
            ("scope", "openid profile email"),
            ("audience", "https://api"),
        ]));
        assert_eq!(scopes, vec!["profile".to_string(), "email".to_string()]);
        assert_eq!(extra, params(&[("audience", "https://api")]));
    }

    #[test]
    fn split_strips_reserved_protocol_params() {
        let (_, extra) = split_authorization_params(params(&[
            ("state", "forged"),
            ("nonce", "forged"),
            ("code_challenge", "forged"),
            ("redirect_uri", "https://evil.example"),
            ("organization", "org_123"),
        ]));
        assert_eq!(extra, params(&[("organization", "org_123")]));
    }

    #[test]
    fn code_challenge_is_s256_of_the_verifier() {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let digest = Sha256::digest(verifier.secret().as_bytes());
        assert_eq!(challenge.as_str(), URL_SAFE_NO_PAD.encode(digest));

        // Recomputing from the persisted verifier yields the same challenge.
        let recomputed = PkceCodeChallenge::from_code_verifier_sha256(&PkceCodeVerifier::new(
            verifier.secret().clone(),
        ));
        assert_eq!(recomputed.as_str(), challenge.as_str());
    }
}

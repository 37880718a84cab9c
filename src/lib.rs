/*!
The authorization-code-flow front door for a Rocket application: initiates an
OpenID Connect login, protects the redirect round trip with signed transient
cookies, and tears the session down again on logout.

```rust,no_run
use rocket::response::content::RawHtml;
use rocket::{get, launch, routes};
use rocket_oidc_login::{OIDCLoginConfig, setup};

#[get("/")]
async fn index() -> RawHtml<String> {
    RawHtml(format!(
        "<a href=\"/auth/login\">Log in</a> <a href=\"/auth/logout\">Log out</a>"
    ))
}

#[launch]
async fn rocket() -> _ {
    let rocket = rocket::build().mount("/", routes![index]);

    setup(rocket, OIDCLoginConfig::from_env().unwrap())
        .await
        .unwrap()
}
```

The heavy lifting is the transient state protocol: `nonce`, `state`, and the
PKCE `code_verifier` each cross the redirect to the identity provider inside
a tamper-evident, single-use cookie, and the callback consumes them exactly
once. See [`transient`] and [`state`] for the details, including the
dual-cookie fallback for browsers that predate `SameSite=None`.
*/
#[macro_use]
extern crate rocket;

pub mod client;
pub mod errors;
pub mod keys;
pub mod login;
pub mod logout;
pub mod routes;
pub mod session;
pub mod sign;
pub mod state;
pub mod transient;
pub mod utils;

use rocket::{Build, Rocket};
use serde_derive::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

pub use crate::client::OIDCClient;
pub use crate::errors::OIDCFlowError;
pub use crate::keys::{KeyRing, SESSION_COOKIE_PURPOSE, SecretSet, TRANSIENT_COOKIE_PURPOSE};
pub use crate::login::{LoginOptions, LoginStateHook};
pub use crate::logout::LogoutOptions;
pub use crate::session::{CookieSession, Session};
pub use crate::transient::{CookieIo, CookieOptions, TransientStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OIDCLoginConfig {
    pub client_id: String,
    /// Path to a file holding the client secret.
    pub client_secret: PathBuf,
    pub issuer_url: String,
    /// Absolute base URL of this application; the default post-login and
    /// post-logout destination.
    pub base_url: String,
    /// Absolute URL of the registered callback route.
    pub redirect_uri: String,
    /// Cookie-signing secrets, newest first. Older entries keep previously
    /// issued cookies verifiable during rotation.
    pub secrets: Vec<String>,
    pub scope: Option<String>,
    pub audience: Option<String>,
    pub organization: Option<String>,
    /// Extra authorization parameters sent on every login.
    #[serde(default)]
    pub authorization_params: Vec<(String, String)>,
    /// Whether logout also ends the session at the identity provider.
    #[serde(default)]
    pub idp_logout: bool,
    pub end_session_endpoint: Option<String>,
    pub post_logout_redirect: Option<String>,
    #[serde(default)]
    pub cookie: CookieOptions,
}

/// please note this is just an example, and should not be used in production builds
/// rather `from_env` should be used instead.
impl Default for OIDCLoginConfig {
    fn default() -> OIDCLoginConfig {
        Self {
            client_id: "storyteller".to_string(),
            client_secret: "./secret".into(),
            issuer_url: "http://keycloak.com/realms/master".to_string(),
            base_url: "http://localhost:8000/".to_string(),
            redirect_uri: "http://localhost:8000/auth/callback".to_string(),
            secrets: vec!["an example cookie secret".to_string()],
            scope: None,
            audience: None,
            organization: None,
            authorization_params: Vec::new(),
            idp_logout: false,
            end_session_endpoint: None,
            post_logout_redirect: None,
            cookie: CookieOptions::default(),
        }
    }
}

impl OIDCLoginConfig {
    pub fn from_env() -> Result<Self, OIDCFlowError> {
        let client_id = match env::var("CLIENT_ID") {
            Ok(client_id) => client_id,
            _ => return Err(OIDCFlowError::MissingClientId),
        };
        let client_secret = match env::var("CLIENT_SECRET") {
            Ok(secret) => secret.into(),
            _ => return Err(OIDCFlowError::MissingClientSecret),
        };
        let issuer_url = match env::var("ISSUER_URL") {
            Ok(url) => url,
            _ => return Err(OIDCFlowError::MissingIssuerUrl),
        };
        let base_url = match env::var("BASE_URL") {
            Ok(url) => url,
            _ => return Err(OIDCFlowError::MissingBaseUrl),
        };
        let secrets: Vec<String> = match env::var("COOKIE_SECRET") {
            Ok(raw) => raw.split(',').map(str::to_string).collect(),
            _ => return Err(OIDCFlowError::MissingSecret),
        };

        let redirect_uri = match env::var("REDIRECT_URL") {
            Ok(redirect) => redirect,
            _ => crate::utils::to_absolute("/auth/callback", &base_url)?,
        };

        Ok(Self {
            client_id,
            client_secret,
            issuer_url,
            base_url,
            redirect_uri,
            secrets,
            scope: env::var("SCOPE").ok(),
            audience: env::var("AUDIENCE").ok(),
            organization: env::var("ORGANIZATION").ok(),
            authorization_params: Vec::new(),
            idp_logout: env::var("IDP_LOGOUT").is_ok_and(|v| v == "true"),
            end_session_endpoint: env::var("END_SESSION_URL").ok(),
            post_logout_redirect: env::var("POST_LOGOUT_REDIRECT").ok(),
            cookie: CookieOptions::default(),
        })
    }
}

/// Everything one login/logout invocation needs, managed by Rocket.
#[derive(Clone)]
pub struct AuthState {
    pub client: OIDCClient,
    pub config: OIDCLoginConfig,
    /// Keys for the transient (nonce/state/verifier) cookies.
    pub keys: KeyRing,
    /// Keys for the session cookie; separate purpose, separate keys.
    pub session_keys: KeyRing,
    pub transient: TransientStore,
    pub login_state_hook: Option<LoginStateHook>,
}

impl AuthState {
    pub async fn from_config(config: OIDCLoginConfig) -> Result<Self, OIDCFlowError> {
        Self::with_state_hook(config, None).await
    }

    /// Like [`AuthState::from_config`], with a hook contributing extra login
    /// state to every authorization request.
    pub async fn with_state_hook(
        config: OIDCLoginConfig,
        login_state_hook: Option<LoginStateHook>,
    ) -> Result<Self, OIDCFlowError> {
        let secrets = SecretSet::new(config.secrets.clone())?;
        let keys = KeyRing::derive(&secrets, TRANSIENT_COOKIE_PURPOSE);
        let session_keys = KeyRing::derive(&secrets, SESSION_COOKIE_PURPOSE);
        let client = OIDCClient::from_config(&config).await?;
        let transient = TransientStore::new(config.cookie.clone());

        Ok(Self {
            client,
            config,
            keys,
            session_keys,
            transient,
            login_state_hook,
        })
    }
}

/// Builds the managed [`AuthState`] and mounts the login/callback/logout
/// routes under `/auth`.
pub async fn setup(
    rocket: Rocket<Build>,
    config: OIDCLoginConfig,
) -> Result<Rocket<Build>, OIDCFlowError> {
    let auth_state = AuthState::from_config(config).await?;
    Ok(rocket.manage(auth_state).mount("/auth", routes::get_routes()))
}

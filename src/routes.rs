//! The mounted `/auth` routes: start a login, consume the callback, log out.

use rocket::http::CookieJar;
use rocket::request::{FromRequest, Outcome};
use rocket::{Request, Route, State, response::Redirect};

use crate::AuthState;
use crate::client::raw_id_token;
use crate::errors::OIDCFlowError;
use crate::login::{
    LoginOptions, NONCE_COOKIE, STATE_COOKIE, VERIFIER_COOKIE, authorize_redirect,
};
use crate::logout::{LogoutOptions, logout_redirect};
use crate::session::{CookieSession, Session};
use crate::state::{RETURN_TO_KEY, decode_state};

const LOGIN_URI: &str = "/auth/login";

/// The request's raw query string. `returnTo` is extracted from this instead
/// of a route parameter so that only the first occurrence counts.
pub struct RawQuery(pub Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RawQuery {
    type Error = std::convert::Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(RawQuery(
            req.uri().query().map(|query| query.as_str().to_string()),
        ))
    }
}

#[get("/login")]
pub async fn login(
    jar: &CookieJar<'_>,
    auth: &State<AuthState>,
    query: RawQuery,
) -> Result<Redirect, OIDCFlowError> {
    authorize_redirect(auth.inner(), jar, query.0.as_deref(), &LoginOptions::default())
}

#[get("/callback?<code>&<state>")]
pub async fn callback(
    jar: &CookieJar<'_>,
    auth: &State<AuthState>,
    code: String,
    state: String,
) -> Result<Redirect, OIDCFlowError> {
    let auth = auth.inner();
    let expected_state = auth.transient.read(jar, STATE_COOKIE, &auth.keys);
    // The nonce is single-use; consume it even though ID-token claim
    // validation is the consumer's job.
    let _nonce = auth.transient.read(jar, NONCE_COOKIE, &auth.keys);
    let verifier = auth.transient.read(jar, VERIFIER_COOKIE, &auth.keys);

    // A broken or missing protocol state means the login attempt cannot
    // complete; start over instead of failing hard.
    let (Some(expected_state), Some(verifier)) = (expected_state, verifier) else {
        eprintln!("transient login state missing or invalid, restarting login");
        return Ok(Redirect::to(LOGIN_URI));
    };
    if state != expected_state {
        eprintln!("state parameter does not match the state cookie, restarting login");
        return Ok(Redirect::to(LOGIN_URI));
    }
    let Some(login_state) = decode_state(&expected_state) else {
        eprintln!("state cookie is not decodable login state, restarting login");
        return Ok(Redirect::to(LOGIN_URI));
    };

    let tokens = auth.client.exchange_code(code, verifier).await?;

    let session = CookieSession::new(jar, &auth.config.cookie, &auth.session_keys);
    if let Some(raw) = raw_id_token(&tokens) {
        session.set_id_token(&raw);
    }

    let return_to = login_state
        .get(RETURN_TO_KEY)
        .and_then(|value| value.as_str())
        .unwrap_or(&auth.config.base_url)
        .to_string();
    Ok(Redirect::to(return_to))
}

#[get("/logout")]
pub async fn logout(
    jar: &CookieJar<'_>,
    auth: &State<AuthState>,
) -> Result<Redirect, OIDCFlowError> {
    let auth = auth.inner();
    let session = CookieSession::new(jar, &auth.config.cookie, &auth.session_keys);
    logout_redirect(auth, &session, &LogoutOptions::default())
}

pub fn get_routes() -> Vec<Route> {
    routes![login, callback, logout]
}

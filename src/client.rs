//! The identity-provider client: discovery, the authorization endpoint, code
//! exchange, and RP-initiated logout URL construction. Token validation and
//! claims processing are deliberately not here; consumers validate the
//! tokens this client hands back.

use openidconnect::core::*;
use openidconnect::reqwest;
use openidconnect::*;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use url::Url;

use crate::OIDCLoginConfig;
use crate::errors::OIDCFlowError;

pub type OpenIDClient<
    HasDeviceAuthUrl = EndpointNotSet,
    HasIntrospectionUrl = EndpointNotSet,
    HasRevocationUrl = EndpointNotSet,
    HasAuthUrl = EndpointSet,
    HasTokenUrl = EndpointMaybeSet,
    HasUserInfoUrl = EndpointMaybeSet,
> = openidconnect::Client<
    EmptyAdditionalClaims,
    CoreAuthDisplay,
    CoreGenderClaim,
    CoreJweContentEncryptionAlgorithm,
    CoreJsonWebKey,
    CoreAuthPrompt,
    StandardErrorResponse<CoreErrorResponseType>,
    CoreTokenResponse,
    CoreTokenIntrospectionResponse,
    CoreRevocableToken,
    CoreRevocationErrorResponse,
    HasAuthUrl,
    HasDeviceAuthUrl,
    HasIntrospectionUrl,
    HasRevocationUrl,
    HasTokenUrl,
    HasUserInfoUrl,
>;

fn trim_trailing_whitespace(s: &str) -> String {
    s.trim_end().to_string()
}

fn load_client_secret<P: AsRef<Path>>(secret_file: P) -> Result<ClientSecret, std::io::Error> {
    let mut file = File::open(secret_file.as_ref())?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(ClientSecret::new(trim_trailing_whitespace(&contents)))
}

/// A discovery-configured OpenID Connect client for the authorization-code
/// flow.
#[derive(Debug, Clone)]
pub struct OIDCClient {
    // The OpenID Connect client instance, created from discovered provider metadata.
    pub client: OpenIDClient,

    // The reqwest HTTP client used for token requests.
    reqwest_client: reqwest::Client,

    end_session_endpoint: Option<Url>,
}

impl OIDCClient {
    /// Discovers the provider metadata and prepares the client.
    ///
    /// Fails with [`OIDCFlowError::Configuration`] when IdP logout is enabled
    /// without an end-session endpoint, so the gap surfaces at startup rather
    /// than on the first logout.
    pub async fn from_config(config: &OIDCLoginConfig) -> Result<Self, OIDCFlowError> {
        let http_client = reqwest::ClientBuilder::new()
            // Following redirects opens the client up to SSRF vulnerabilities.
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let provider_metadata = CoreProviderMetadata::discover_async(
            IssuerUrl::new(config.issuer_url.clone())?,
            &http_client,
        )
        .await?;

        let client_secret = load_client_secret(&config.client_secret)?;
        let client = CoreClient::from_provider_metadata(
            provider_metadata,
            ClientId::new(config.client_id.clone()),
            Some(client_secret),
        )
        .set_redirect_uri(RedirectUrl::new(config.redirect_uri.clone())?);

        let end_session_endpoint = match &config.end_session_endpoint {
            Some(raw) => Some(Url::parse(raw)?),
            None => None,
        };
        if config.idp_logout && end_session_endpoint.is_none() {
            return Err(OIDCFlowError::Configuration(
                "idp_logout requires an end_session_endpoint".to_string(),
            ));
        }

        Ok(Self {
            client,
            reqwest_client: http_client,
            end_session_endpoint,
        })
    }

    /// Exchanges an authorization code (received after user login) for a
    /// token response, proving code possession with the PKCE verifier.
    pub async fn exchange_code(
        &self,
        code: String,
        pkce_verifier: String,
    ) -> Result<CoreTokenResponse, OIDCFlowError> {
        Ok(self
            .client
            .exchange_code(AuthorizationCode::new(code))?
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
            .request_async(&self.reqwest_client)
            .await?)
    }

    /// The provider's end-session URL for this logout, or `None` when the
    /// provider exposes no end-session endpoint.
    pub fn end_session_url(
        &self,
        id_token_hint: Option<&str>,
        post_logout_redirect_uri: &str,
    ) -> Option<String> {
        self.end_session_endpoint
            .as_ref()
            .map(|endpoint| build_end_session_url(endpoint, id_token_hint, post_logout_redirect_uri))
    }
}

fn build_end_session_url(
    endpoint: &Url,
    id_token_hint: Option<&str>,
    post_logout_redirect_uri: &str,
) -> String {
    let mut url = endpoint.clone();
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("post_logout_redirect_uri", post_logout_redirect_uri);
        if let Some(hint) = id_token_hint {
            query.append_pair("id_token_hint", hint);
        }
    }
    url.into()
}

/// The compact serialized form of the response's ID token, if one was
/// issued. JSON web tokens serialize to their raw string form.
pub fn raw_id_token(response: &CoreTokenResponse) -> Option<String> {
    let id_token = response.id_token()?;
    match serde_json::to_value(id_token) {
        Ok(serde_json::Value::String(raw)) => Some(raw),
        _ => None,
    }
}

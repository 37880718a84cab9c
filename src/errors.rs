use openidconnect::{ConfigurationError, HttpClientError, RequestTokenError};
use rocket::Request;
use rocket::http::ContentType;
use rocket::http::Status;
use rocket::response;
use std::io::Cursor;
use thiserror::Error;

pub type TokenErr = RequestTokenError<
    HttpClientError<reqwest::Error>,
    openidconnect::StandardErrorResponse<openidconnect::core::CoreErrorResponseType>,
>;

#[derive(Debug, Error)]
pub enum OIDCFlowError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("missing client id")]
    MissingClientId,
    #[error("missing client secret")]
    MissingClientSecret,
    #[error("missing issuer url")]
    MissingIssuerUrl,
    #[error("missing base url")]
    MissingBaseUrl,
    #[error("missing cookie secret")]
    MissingSecret,

    #[error("custom login state must be a key/value mapping")]
    InvalidCustomState,

    #[error("transient login state missing or invalid")]
    ProtocolStateMissing,

    #[error("IO Error: {0}")]
    IO(#[from] std::io::Error),
    #[error("serde JSON error: {0}")]
    JSONErr(#[from] serde_json::Error),
    #[error("discovery error: {0}")]
    OIDCDiscoveryErr(
        #[from] openidconnect::DiscoveryError<openidconnect::HttpClientError<reqwest::Error>>,
    ),
    #[error("reqwest error: {0}")]
    RequestErr(#[from] reqwest::Error),
    #[error("url parsing error: {0}")]
    UrlErr(#[from] url::ParseError),

    #[error("openidconnect configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),

    #[error("token exchange error: {0}")]
    TokenError(#[from] TokenErr),
}

impl<'r> response::Responder<'r, 'static> for OIDCFlowError {
    fn respond_to(self, _request: &'r Request<'_>) -> response::Result<'static> {
        let body = self.to_string();
        let status = match &self {
            OIDCFlowError::MissingClientId
            | OIDCFlowError::MissingClientSecret
            | OIDCFlowError::MissingIssuerUrl
            | OIDCFlowError::MissingBaseUrl
            | OIDCFlowError::MissingSecret => Status::BadRequest,
            OIDCFlowError::ProtocolStateMissing | OIDCFlowError::TokenError(_) => {
                Status::Unauthorized
            }
            _ => Status::InternalServerError,
        };

        response::Response::build()
            .status(status)
            .header(ContentType::Plain)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

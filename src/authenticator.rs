use http::header::{ACCEPT, CONTENT_TYPE};
use http::{Method, Request};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use url::Url;

use crate::credentials::secret::ClientSecret;
use crate::http_client::HttpClient;
use crate::token::AccessToken;

/// Instance Metadata Service endpoint serving managed identity tokens.
pub const MANAGED_IDENTITY_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const MANAGED_IDENTITY_API_VERSION: &str = "2018-02-01";

#[derive(Error, Debug)]
pub enum AuthenticateError {
    #[error("unable to build token request: `{0}`")]
    RequestError(String),
    #[error("unable to deserialize token: `{0}`")]
    DeserializeError(String),
    #[error("identity server error: Status code: `{0}`, Reason: `{1}`")]
    HttpResponseError(u16, String),
    #[error("http transport error: `{0}`")]
    HttpTransportError(String),
}

/// Token request for one of the supported identities.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenRequest {
    /// OAuth2 client credentials grant of a service principal.
    ClientCredentials {
        authority: String,
        tenant_id: String,
        client_id: String,
        client_secret: ClientSecret,
        resource: String,
    },
    /// Token of the managed identity assigned to the current host.
    ManagedIdentity {
        client_id: Option<String>,
        resource: String,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: AccessToken,
    /// The lifetime in seconds of the access token.
    #[serde(deserialize_with = "seconds_from_string_or_number")]
    pub expires_in: u64,
    pub token_type: String,
}

pub trait Authenticator {
    fn authenticate(&self, req: TokenRequest) -> Result<TokenResponse, AuthenticateError>;
}

/// Obtains access tokens from Azure Active Directory or the instance metadata service.
pub struct HttpAuthenticator<C> {
    http_client: C,
    managed_identity_endpoint: Url,
}

impl<C> HttpAuthenticator<C> {
    pub fn new(http_client: C) -> Self {
        Self {
            http_client,
            managed_identity_endpoint: Url::parse(MANAGED_IDENTITY_ENDPOINT)
                .expect("constant valid url value"),
        }
    }

    /// Overrides the metadata service location.
    pub fn with_managed_identity_endpoint(self, managed_identity_endpoint: Url) -> Self {
        Self {
            managed_identity_endpoint,
            ..self
        }
    }

    fn build_request(&self, req: &TokenRequest) -> Result<Request<Vec<u8>>, AuthenticateError> {
        match req {
            TokenRequest::ClientCredentials {
                authority,
                tenant_id,
                client_id,
                client_secret,
                resource,
            } => {
                let url = Url::parse(authority)
                    .and_then(|base| base.join(&format!("{tenant_id}/oauth2/token")))
                    .map_err(|e| AuthenticateError::RequestError(e.to_string()))?;

                let body = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("grant_type", "client_credentials")
                    .append_pair("client_id", client_id)
                    .append_pair("client_secret", client_secret.expose())
                    .append_pair("resource", resource)
                    .finish();

                Request::builder()
                    .method(Method::POST)
                    .uri(url.as_str())
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .header(ACCEPT, "application/json")
                    .body(body.into_bytes())
                    .map_err(|e| AuthenticateError::RequestError(e.to_string()))
            }
            TokenRequest::ManagedIdentity {
                client_id,
                resource,
            } => {
                let mut url = self.managed_identity_endpoint.clone();
                {
                    let mut query = url.query_pairs_mut();
                    query.append_pair("api-version", MANAGED_IDENTITY_API_VERSION);
                    query.append_pair("resource", resource);
                    if let Some(client_id) = client_id {
                        query.append_pair("client_id", client_id);
                    }
                }

                Request::builder()
                    .method(Method::GET)
                    .uri(url.as_str())
                    .header("Metadata", "true")
                    .header(ACCEPT, "application/json")
                    .body(Vec::new())
                    .map_err(|e| AuthenticateError::RequestError(e.to_string()))
            }
        }
    }
}

impl<C> Authenticator for HttpAuthenticator<C>
where
    C: HttpClient,
{
    fn authenticate(&self, req: TokenRequest) -> Result<TokenResponse, AuthenticateError> {
        let request = self.build_request(&req)?;

        let response = self
            .http_client
            .send(request)
            .map_err(|e| AuthenticateError::HttpTransportError(e.to_string()))?;

        let body = String::from_utf8(response.body().clone()).map_err(|e| {
            AuthenticateError::DeserializeError(format!("invalid utf8 response: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(AuthenticateError::HttpResponseError(
                response.status().as_u16(),
                body,
            ));
        }

        serde_json::from_str(body.as_str())
            .map_err(|e| AuthenticateError::DeserializeError(e.to_string()))
    }
}

// Azure AD v1 endpoints and the metadata service report `expires_in` as a string.
fn seconds_from_string_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Number(n) => Ok(n),
        Seconds::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

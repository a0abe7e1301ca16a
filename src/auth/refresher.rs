//! Token endpoint clients
//!
//! A `TokenRefresher` performs the single network call that renews a
//! credential. The authorization manager decides *when* to call it and makes
//! sure concurrent callers share one call.

use super::types::{Capabilities, TokenResponse, TokenState};
use crate::error::{ApiError, AuthError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Performs the network call that renews a credential
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// What this flow supports
    fn capabilities(&self) -> Capabilities;

    /// Obtain a new token state
    ///
    /// `current` is the installed state, or `None` when requesting an initial
    /// token for flows that need no renewal credential.
    async fn refresh(&self, current: Option<&TokenState>) -> Result<TokenState, AuthError>;
}

/// Client identity presented to the token endpoint
#[derive(Clone)]
struct ClientIdentity {
    client_id: String,
    client_secret: Option<String>,
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("client_id", &self.client_id)
            .field("has_secret", &self.client_secret.is_some())
            .finish()
    }
}

/// Shared token endpoint plumbing
#[derive(Debug, Clone)]
struct TokenEndpoint {
    http_client: Client,
    token_url: String,
    identity: ClientIdentity,
    timeout: Duration,
}

impl TokenEndpoint {
    /// POST a form to the token endpoint and normalize the response
    async fn request(
        &self,
        mut form: Vec<(&'static str, String)>,
        previous: Option<&TokenState>,
    ) -> Result<TokenState, AuthError> {
        let mut req = self.http_client.post(&self.token_url).timeout(self.timeout);

        // Confidential clients authenticate with Basic auth, public (PKCE)
        // clients identify themselves in the body
        match &self.identity.client_secret {
            Some(secret) => {
                req = req.basic_auth(&self.identity.client_id, Some(secret));
            }
            None => form.push(("client_id", self.identity.client_id.clone())),
        }

        let response = req.form(&form).send().await.map_err(|e| {
            if e.is_timeout() {
                AuthError::expired(format!("token request timed out after {:?}", self.timeout))
            } else {
                AuthError::expired(format!("token request failed: {e}"))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::expired(format!("failed to read token response: {e}")))?;

        if !status.is_success() {
            let api_error = ApiError::from_body(status.as_u16(), &body);
            return Err(classify_failure(status, &api_error));
        }

        let de = &mut serde_json::Deserializer::from_str(&body);
        let token_response: TokenResponse = serde_path_to_error::deserialize(de).map_err(|e| {
            AuthError::expired(format!(
                "malformed token response at '{}': {}",
                e.path(),
                e.inner()
            ))
        })?;

        token_response.into_token_state(previous)
    }
}

/// Rejected grants need user interaction; everything else can be retried
fn classify_failure(status: StatusCode, error: &ApiError) -> AuthError {
    let rejected = matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED)
        || error.reason.as_deref() == Some("invalid_grant");
    if rejected {
        AuthError::reauthorization(error.to_string())
    } else {
        AuthError::expired(error.to_string())
    }
}

// ============================================================================
// Refresh Token Grant
// ============================================================================

/// OAuth2 refresh token flow (authorization code and PKCE clients)
#[derive(Debug, Clone)]
pub struct OAuthRefresher {
    endpoint: TokenEndpoint,
}

impl OAuthRefresher {
    /// Create a refresher for a confidential or public client
    pub fn new(
        http_client: Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            endpoint: TokenEndpoint {
                http_client,
                token_url: token_url.into(),
                identity: ClientIdentity {
                    client_id: client_id.into(),
                    client_secret,
                },
                timeout: Duration::from_secs(30),
            },
        }
    }

    /// Set the token request timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.endpoint.timeout = timeout;
        self
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    fn capabilities(&self) -> Capabilities {
        Capabilities::AUTHORIZATION_CODE
    }

    async fn refresh(&self, current: Option<&TokenState>) -> Result<TokenState, AuthError> {
        let refresh_token = current
            .and_then(|c| c.refresh_token.clone())
            .ok_or_else(|| AuthError::reauthorization("no refresh token available"))?;

        debug!(token_url = %self.endpoint.token_url, "requesting refresh token grant");

        let form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token),
        ];
        self.endpoint.request(form, current).await
    }
}

// ============================================================================
// Client Credentials Grant
// ============================================================================

/// OAuth2 client credentials flow
///
/// Renewal re-issues the grant, so no refresh token is involved.
#[derive(Debug, Clone)]
pub struct ClientCredentialsRefresher {
    endpoint: TokenEndpoint,
}

impl ClientCredentialsRefresher {
    pub fn new(
        http_client: Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: TokenEndpoint {
                http_client,
                token_url: token_url.into(),
                identity: ClientIdentity {
                    client_id: client_id.into(),
                    client_secret: Some(client_secret.into()),
                },
                timeout: Duration::from_secs(30),
            },
        }
    }

    /// Set the token request timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.endpoint.timeout = timeout;
        self
    }
}

#[async_trait]
impl TokenRefresher for ClientCredentialsRefresher {
    fn capabilities(&self) -> Capabilities {
        Capabilities::CLIENT_CREDENTIALS
    }

    async fn refresh(&self, _current: Option<&TokenState>) -> Result<TokenState, AuthError> {
        debug!(token_url = %self.endpoint.token_url, "requesting client credentials grant");

        let form = vec![("grant_type", "client_credentials".to_string())];
        self.endpoint.request(form, None).await
    }
}

//! Authorized request execution with retry policy
//!
//! Every attempt asks the authorization manager for a token first. Two server
//! signals are retried, each at most once per call:
//! - 401: force one refresh, then retry
//! - 429: wait for `retry-after` seconds, then retry
//!
//! Every other non-2xx response is terminal.

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use super::request::{Body, RequestSpec};
use crate::auth::AuthorizationManager;
use crate::error::{ApiError, AuthError, Error, Result};
use crate::types::ScopeSet;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Default API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";

/// Configuration for the request executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Base URL for relative request paths
    pub base_url: Url,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Optional client-side pacing
    pub rate_limit: Option<RateLimiterConfig>,
    /// Headers sent with every request
    pub default_headers: BTreeMap<String, String>,
    /// User agent string
    pub user_agent: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_API_BASE_URL).expect("default base URL is valid"),
            timeout: Duration::from_secs(30),
            rate_limit: None,
            default_headers: BTreeMap::new(),
            user_agent: format!("spotify-web-core/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ExecutorConfig {
    pub fn builder() -> ExecutorConfigBuilder {
        ExecutorConfigBuilder::default()
    }
}

/// Builder for executor config
#[derive(Default)]
pub struct ExecutorConfigBuilder {
    config: ExecutorConfig,
    base_url: Option<String>,
}

impl ExecutorConfigBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the per-attempt timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Enable client-side pacing
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Add a default header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Build the config, validating the base URL
    pub fn build(self) -> Result<ExecutorConfig> {
        let mut config = self.config;
        if let Some(url) = self.base_url {
            config.base_url = Url::parse(&url)?;
        }
        Ok(config)
    }
}

/// Classification of one attempt's response
///
/// A response lands in exactly one bucket, so the 401 and 429 paths never
/// both apply to the same attempt.
enum Verdict {
    Success(Response),
    Unauthorized(ApiError),
    RateLimited(ApiError),
    Failed(ApiError),
}

/// Issues authorized HTTP calls and applies the retry policy
///
/// Cheap to clone; clones share the HTTP connection pool, the authorization
/// manager and the rate limiter.
#[derive(Clone)]
pub struct RequestExecutor {
    client: Client,
    config: Arc<ExecutorConfig>,
    auth: AuthorizationManager,
    rate_limiter: Option<RateLimiter>,
}

impl RequestExecutor {
    /// Create an executor
    pub fn new(config: ExecutorConfig, auth: AuthorizationManager) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;
        Ok(Self::with_client(client, config, auth))
    }

    /// Create an executor around an existing reqwest client
    pub fn with_client(client: Client, config: ExecutorConfig, auth: AuthorizationManager) -> Self {
        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);
        Self {
            client,
            config: Arc::new(config),
            auth,
            rate_limiter,
        }
    }

    /// The authorization manager tokens come from
    pub fn auth(&self) -> &AuthorizationManager {
        &self.auth
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute a request, returning the successful response
    pub async fn execute(&self, spec: &RequestSpec, required: &ScopeSet) -> Result<Response> {
        let url = spec.url(&self.config.base_url)?;
        let mut refreshed = false;
        let mut rate_limited = false;

        loop {
            if let Some(limiter) = &self.rate_limiter {
                limiter.wait().await;
            }

            let token = self.auth.authorized_token(required).await?;
            let response = self.send(spec, &url, &token).await?;

            match classify(response).await {
                Verdict::Success(response) => {
                    debug!(method = %spec.method, url = %url, "request succeeded");
                    return Ok(response);
                }
                Verdict::Unauthorized(error) => {
                    if refreshed {
                        warn!(url = %url, "token rejected again after refresh");
                        return Err(AuthError::reauthorization(error.to_string()).into());
                    }
                    warn!(url = %url, "token rejected (401), forcing refresh");
                    self.auth.refresh_rejected(&token).await?;
                    refreshed = true;
                }
                Verdict::RateLimited(error) => {
                    let Some(seconds) = error.retry_after else {
                        warn!(url = %url, "rate limited without a usable retry-after");
                        return Err(Error::Api(error));
                    };
                    if rate_limited {
                        warn!(url = %url, "rate limited again after waiting");
                        return Err(Error::Api(error));
                    }
                    if seconds > MAX_RETRY_AFTER_SECS {
                        warn!(url = %url, retry_after = seconds, "retry-after exceeds the wait cap");
                        return Err(Error::Api(error));
                    }
                    warn!(url = %url, retry_after = seconds, "rate limited (429), waiting");
                    tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
                    rate_limited = true;
                }
                Verdict::Failed(error) => return Err(Error::Api(error)),
            }
        }
    }

    /// Execute a request and decode the JSON body
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        spec: &RequestSpec,
        required: &ScopeSet,
    ) -> Result<T> {
        let response = self.execute(spec, required).await?;
        let bytes = response.bytes().await?;
        decode_json(&bytes)
    }

    /// GET a path or absolute URL and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, required: &ScopeSet) -> Result<T> {
        self.execute_json(&RequestSpec::get(path), required).await
    }

    /// Send one attempt
    async fn send(&self, spec: &RequestSpec, url: &Url, token: &str) -> Result<Response> {
        let timeout = spec.timeout.unwrap_or(self.config.timeout);

        let mut req = self
            .client
            .request(spec.method.into(), url.clone())
            .bearer_auth(token)
            .timeout(timeout);

        for (key, value) in &self.config.default_headers {
            req = req.header(key.as_str(), value.as_str());
        }
        for (key, value) in &spec.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        match &spec.body {
            Some(Body::Json(body)) => req = req.json(body),
            Some(Body::Form(fields)) => req = req.form(fields),
            None => {}
        }

        req.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }
            } else {
                Error::Http(e)
            }
        })
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("config", &self.config)
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

async fn classify(response: Response) -> Verdict {
    let status = response.status();
    if status.is_success() {
        return Verdict::Success(response);
    }

    let retry_after = retry_after_seconds(response.headers());
    let body = response.text().await.unwrap_or_default();
    let error = ApiError::from_body(status.as_u16(), &body).with_retry_after(retry_after);

    match status {
        StatusCode::UNAUTHORIZED => Verdict::Unauthorized(error),
        StatusCode::TOO_MANY_REQUESTS => Verdict::RateLimited(error),
        _ => Verdict::Failed(error),
    }
}

/// Longest `retry-after` the executor sleeps through; longer waits fail
/// with the value kept on the error
pub const MAX_RETRY_AFTER_SECS: f64 = 60.0;

/// Read the `retry-after` header as seconds
///
/// Header names are compared case-insensitively. Values that are not a
/// representable non-negative number of seconds (including HTTP dates)
/// yield `None`.
pub fn retry_after_seconds(headers: &HeaderMap) -> Option<f64> {
    headers
        .iter()
        .find(|(name, _)| name.as_str().eq_ignore_ascii_case("retry-after"))
        .and_then(|(_, value)| value.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| Duration::try_from_secs_f64(*secs).is_ok())
}

/// Decode a JSON body, reporting the field path on failure
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let de = &mut serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(de).map_err(|e| {
        let path = e.path().to_string();
        Error::decoding(path, e.into_inner().to_string())
    })
}

//! Client configuration
//!
//! Settings are read from a YAML (or JSON) file, optionally overridden from
//! the environment, and turned into the authorization manager and request
//! executor the rest of the crate works with.

use crate::auth::{AuthorizationManager, ClientCredentialsRefresher, OAuthRefresher, TokenState};
use crate::error::{Error, Result};
use crate::http::{ExecutorConfig, RateLimiterConfig, RequestExecutor, DEFAULT_API_BASE_URL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default token endpoint
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

// ============================================================================
// Client Config
// ============================================================================

/// Settings for talking to the Web API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL relative request paths resolve against
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// OAuth2 token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Application client id
    #[serde(default)]
    pub client_id: String,

    /// Application client secret; absent for PKCE clients
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Seconds before expiry at which a token counts as expired
    #[serde(default = "default_expiry_margin_secs")]
    pub expiry_margin_secs: u64,

    /// Optional client-side pacing
    #[serde(default)]
    pub rate_limit: Option<RateLimiterConfig>,

    /// User agent header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Where the token state is persisted between runs
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_expiry_margin_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("spotify-web-core/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            token_url: default_token_url(),
            client_id: String::new(),
            client_secret: None,
            timeout_secs: default_timeout_secs(),
            expiry_margin_secs: default_expiry_margin_secs(),
            rate_limit: None,
            user_agent: default_user_agent(),
            token_file: None,
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Load from a file; `.json` files are parsed as JSON, anything else as YAML
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        debug!(path = %path.display(), json = is_json, "loading client config");

        if is_json {
            Ok(serde_json::from_str(&content)?)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    /// Parse from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Override fields from `SPOTIFY_*` environment variables
    #[must_use]
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Override fields from an arbitrary variable lookup
    #[must_use]
    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(id) = var("SPOTIFY_CLIENT_ID") {
            self.client_id = id;
        }
        if let Some(secret) = var("SPOTIFY_CLIENT_SECRET") {
            self.client_secret = Some(secret);
        }
        if let Some(url) = var("SPOTIFY_API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(url) = var("SPOTIFY_TOKEN_URL") {
            self.token_url = url;
        }
        self
    }

    /// Check required fields and URLs
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::missing_field("client_id"));
        }
        Url::parse(&self.api_base_url)
            .map_err(|e| Error::config(format!("Invalid api_base_url '{}': {e}", self.api_base_url)))?;
        Url::parse(&self.token_url)
            .map_err(|e| Error::config(format!("Invalid token_url '{}': {e}", self.token_url)))?;
        if self.timeout_secs == 0 {
            return Err(Error::config("timeout_secs must be greater than zero"));
        }
        let margin_fits = i64::try_from(self.expiry_margin_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|margin| chrono::Utc::now().checked_add_signed(margin))
            .is_some();
        if !margin_fits {
            return Err(Error::config(format!(
                "expiry_margin_secs {} is out of range",
                self.expiry_margin_secs
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn expiry_margin(&self) -> Duration {
        Duration::from_secs(self.expiry_margin_secs)
    }

    /// Executor settings derived from this config
    pub fn executor_config(&self) -> Result<ExecutorConfig> {
        let mut builder = ExecutorConfig::builder()
            .base_url(&self.api_base_url)
            .timeout(self.timeout())
            .user_agent(&self.user_agent);
        if let Some(rate_limit) = &self.rate_limit {
            builder = builder.rate_limit(rate_limit.clone());
        }
        builder.build()
    }

    /// Authorization manager for the flow these settings support
    ///
    /// A stored token is renewed with its refresh token. Without one, a
    /// client secret selects the client credentials grant; otherwise the
    /// manager starts unauthorized.
    pub fn authorization_manager(
        &self,
        http_client: reqwest::Client,
        state: Option<TokenState>,
    ) -> AuthorizationManager {
        match (state, &self.client_secret) {
            (None, Some(secret)) => {
                debug!("using client credentials flow");
                let refresher = ClientCredentialsRefresher::new(
                    http_client,
                    &self.token_url,
                    &self.client_id,
                    secret,
                )
                .timeout(self.timeout());
                AuthorizationManager::builder(refresher)
                    .expiry_margin(self.expiry_margin())
                    .build()
            }
            (state, secret) => {
                debug!(has_token = state.is_some(), "using refresh token flow");
                let refresher = OAuthRefresher::new(
                    http_client,
                    &self.token_url,
                    &self.client_id,
                    secret.clone(),
                )
                .timeout(self.timeout());
                let mut builder =
                    AuthorizationManager::builder(refresher).expiry_margin(self.expiry_margin());
                if let Some(state) = state {
                    builder = builder.state(state);
                }
                builder.build()
            }
        }
    }

    /// Validate and build a ready-to-use executor
    pub fn build_executor(&self, state: Option<TokenState>) -> Result<RequestExecutor> {
        self.validate()?;
        let executor_config = self.executor_config()?;
        let http_client = reqwest::Client::builder()
            .timeout(self.timeout())
            .user_agent(&self.user_agent)
            .build()?;
        let auth = self.authorization_manager(http_client.clone(), state);
        Ok(RequestExecutor::with_client(http_client, executor_config, auth))
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`ClientConfig`]
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    #[must_use]
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.config.client_id = id.into();
        self
    }

    #[must_use]
    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.client_secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    #[must_use]
    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.config.token_url = url.into();
        self
    }

    #[must_use]
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn expiry_margin_secs(mut self, secs: u64) -> Self {
        self.config.expiry_margin_secs = secs;
        self
    }

    #[must_use]
    pub fn rate_limit(mut self, rate_limit: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(rate_limit);
        self
    }

    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    #[must_use]
    pub fn token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.token_file = Some(path.into());
        self
    }

    /// Build and validate
    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Capabilities;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_config() {
        let config = ClientConfig::from_yaml_str("client_id: abc123\n").unwrap();

        assert_eq!(config.client_id, "abc123");
        assert_eq!(config.api_base_url, "https://api.spotify.com/v1");
        assert_eq!(config.token_url, "https://accounts.spotify.com/api/token");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.expiry_margin_secs, 30);
        assert!(config.client_secret.is_none());
        assert!(config.rate_limit.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
api_base_url: "http://localhost:8080/v1"
token_url: "http://localhost:8080/api/token"
client_id: abc
client_secret: shh
timeout_secs: 5
expiry_margin_secs: 0
rate_limit:
  requests_per_second: 4
user_agent: "my-app/1.0"
token_file: "/tmp/token.json"
"#;

        let config = ClientConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.client_secret.as_deref(), Some("shh"));
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.expiry_margin(), Duration::ZERO);
        assert_eq!(config.rate_limit, Some(RateLimiterConfig::new(4, 1)));
        assert_eq!(config.user_agent, "my-app/1.0");
        assert_eq!(config.token_file, Some(PathBuf::from("/tmp/token.json")));
    }

    #[test]
    fn test_from_file_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("client.yaml");
        std::fs::write(&yaml_path, "client_id: from-yaml\n").unwrap();
        assert_eq!(ClientConfig::from_file(&yaml_path).unwrap().client_id, "from-yaml");

        let json_path = dir.path().join("client.json");
        let mut file = std::fs::File::create(&json_path).unwrap();
        file.write_all(br#"{"client_id": "from-json", "timeout_secs": 7}"#)
            .unwrap();
        let config = ClientConfig::from_file(&json_path).unwrap();
        assert_eq!(config.client_id, "from-json");
        assert_eq!(config.timeout_secs, 7);
    }

    #[test]
    fn test_from_file_missing() {
        let err = ClientConfig::from_file("/nonexistent/client.yaml").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_from_yaml_invalid() {
        let err = ClientConfig::from_yaml_str("timeout_secs: [1, 2]").unwrap_err();
        assert!(matches!(err, Error::YamlParse(_)));
    }

    #[test]
    fn test_apply_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SPOTIFY_CLIENT_ID", "env-id"),
            ("SPOTIFY_CLIENT_SECRET", "env-secret"),
            ("SPOTIFY_API_BASE_URL", "http://127.0.0.1:9000/v1"),
            ("SPOTIFY_TOKEN_URL", "  "),
        ]);

        let config = ClientConfig::from_yaml_str("client_id: file-id\n")
            .unwrap()
            .apply_env_from(|key| vars.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.client_id, "env-id");
        assert_eq!(config.client_secret.as_deref(), Some("env-secret"));
        assert_eq!(config.api_base_url, "http://127.0.0.1:9000/v1");
        // Blank values leave the file setting alone
        assert_eq!(config.token_url, DEFAULT_TOKEN_URL);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let err = ClientConfig::default().validate().unwrap_err();
        assert!(matches!(err, Error::MissingConfigField { ref field } if field == "client_id"));

        let err = ClientConfig::builder()
            .client_id("abc")
            .api_base_url("not a url")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("api_base_url"));

        let err = ClientConfig::builder()
            .client_id("abc")
            .timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));

        let err = ClientConfig::builder()
            .client_id("abc")
            .expiry_margin_secs(u64::MAX)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("expiry_margin_secs"));

        let err = ClientConfig::from_yaml_str("client_id: abc\nexpiry_margin_secs: 1000000000000000\n")
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_executor_config_from_client_config() {
        let config = ClientConfig::builder()
            .client_id("abc")
            .api_base_url("http://localhost:1234/v1")
            .timeout_secs(3)
            .rate_limit(RateLimiterConfig::new(2, 2))
            .build()
            .unwrap();

        let executor_config = config.executor_config().unwrap();
        assert_eq!(executor_config.base_url.as_str(), "http://localhost:1234/v1");
        assert_eq!(executor_config.timeout, Duration::from_secs(3));
        assert!(executor_config.rate_limit.is_some());
    }

    #[tokio::test]
    async fn test_flow_selection() {
        let confidential = ClientConfig::builder()
            .client_id("abc")
            .client_secret("shh")
            .build()
            .unwrap();

        let manager = confidential.authorization_manager(reqwest::Client::new(), None);
        assert_eq!(manager.capabilities(), Capabilities::CLIENT_CREDENTIALS);

        let stored = TokenState::expires_in("token", 3600).with_refresh_token("refresh");
        let manager = confidential.authorization_manager(reqwest::Client::new(), Some(stored));
        assert_eq!(manager.capabilities(), Capabilities::AUTHORIZATION_CODE);
        assert!(manager.is_authorized().await);

        let public = ClientConfig::builder().client_id("abc").build().unwrap();
        let manager = public.authorization_manager(reqwest::Client::new(), None);
        assert_eq!(manager.capabilities(), Capabilities::AUTHORIZATION_CODE);
        assert!(!manager.is_authorized().await);
    }
}

//! Error types for the API runtime
//!
//! This module defines the error hierarchy for the whole crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! `AuthError` is kept separate from `Error` because a single refresh outcome
//! is handed to every caller waiting on it, which requires `Clone`.

use crate::types::ScopeSet;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Authorization failures raised by the token lifecycle manager
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No token is installed (never authorized, or deauthorized)
    #[error("No credential available, authorization required")]
    NoCredential,

    /// The token is expired and a refresh attempt failed transiently
    #[error("Access token expired: {message}")]
    Expired { message: String },

    /// The granted scopes do not cover the scopes a request needs
    #[error("Insufficient scopes, missing: {missing}")]
    InsufficientScopes { missing: ScopeSet },

    /// The renewal credential is missing or was rejected by the server
    #[error("Reauthorization required: {reason}")]
    ReauthorizationRequired { reason: String },
}

impl AuthError {
    /// Create a transient expiry error
    pub fn expired(message: impl Into<String>) -> Self {
        Self::Expired {
            message: message.into(),
        }
    }

    /// Create a reauthorization-required error
    pub fn reauthorization(reason: impl Into<String>) -> Self {
        Self::ReauthorizationRequired {
            reason: reason.into(),
        }
    }

    /// Whether the caller can retry later without user interaction
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }
}

/// Structured non-2xx response from the API or the token endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    /// HTTP status code
    pub status: u16,
    /// Server-provided message (or the raw body when it is not structured)
    pub message: String,
    /// Optional machine-readable reason (e.g. `invalid_grant`, `PREMIUM_REQUIRED`)
    pub reason: Option<String>,
    /// Retry delay in seconds, when the server sent one
    pub retry_after: Option<f64>,
}

impl ApiError {
    /// Decode an error body, falling back to the raw text
    pub fn from_body(status: u16, body: &str) -> Self {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum ErrorBody {
            Regular {
                error: RegularError,
            },
            OAuth {
                error: String,
                #[serde(default)]
                error_description: Option<String>,
            },
        }

        #[derive(Deserialize)]
        struct RegularError {
            #[serde(default)]
            message: Option<String>,
            #[serde(default)]
            reason: Option<String>,
        }

        match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody::Regular { error }) => Self {
                status,
                message: error.message.unwrap_or_default(),
                reason: error.reason,
                retry_after: None,
            },
            Ok(ErrorBody::OAuth {
                error,
                error_description,
            }) => Self {
                status,
                message: error_description.unwrap_or_else(|| error.clone()),
                reason: Some(error),
                retry_after: None,
            },
            Err(_) => Self {
                status,
                message: body.trim().to_string(),
                reason: None,
                retry_after: None,
            },
        }
    }

    /// Attach a retry delay
    #[must_use]
    pub fn with_retry_after(mut self, seconds: Option<f64>) -> Self {
        self.retry_after = seconds;
        self
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}: {}", self.status, self.message)?;
        if let Some(reason) = &self.reason {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

/// The main error type
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Authorization Errors
    // ============================================================================
    #[error(transparent)]
    Auth(#[from] AuthError),

    // ============================================================================
    // Network Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // API Errors
    // ============================================================================
    #[error("API error: {0}")]
    Api(ApiError),

    // ============================================================================
    // Decoding Errors
    // ============================================================================
    #[error("Failed to decode response at '{path}': {message}")]
    Decoding { path: String, message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Token store error: {message}")]
    Store { message: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create a decoding error
    pub fn decoding(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decoding {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a token store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api(api) => Some(api.status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The caller has to restart the interactive authorization flow
    pub fn is_reauthorization_required(&self) -> bool {
        matches!(
            self,
            Error::Auth(AuthError::ReauthorizationRequired { .. } | AuthError::NoCredential)
        )
    }

    /// The server rejected the call with 429 after the single retry
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::Api(api) if api.status == 429)
    }

    /// Transport failure or timeout
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Timeout { .. })
    }
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}

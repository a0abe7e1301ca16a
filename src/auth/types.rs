//! Token state and authorization event types

use crate::error::AuthError;
use crate::types::ScopeSet;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Immutable snapshot of one issued credential
///
/// Replaced wholesale on every refresh, never mutated in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    /// The bearer token
    pub access_token: String,
    /// When the bearer token stops being accepted
    pub expires_at: DateTime<Utc>,
    /// Long-lived renewal credential
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Scopes granted at issuance
    #[serde(default)]
    pub scopes: ScopeSet,
}

impl TokenState {
    /// Create a token state with no renewal credential and no scopes
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
            refresh_token: None,
            scopes: ScopeSet::new(),
        }
    }

    /// Create a token that expires in N seconds from now
    ///
    /// Offsets beyond the representable range clamp to the earliest or
    /// latest instant.
    pub fn expires_in(access_token: impl Into<String>, seconds: i64) -> Self {
        let expires_at = seconds_from_now(seconds).unwrap_or(if seconds < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        });
        Self::new(access_token, expires_at)
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
        self.scopes = scopes;
        self
    }

    /// Check if the token is expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// A token is usable iff `now < expires_at` and the granted scopes cover `required`
    pub fn is_usable_at(&self, now: DateTime<Utc>, required: &ScopeSet) -> bool {
        !self.is_expired_at(now) && self.scopes.covers(required)
    }
}

impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// What an authorization flow can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Tokens carry scopes that can be checked per request
    pub scopes: bool,
    /// Renewal needs a refresh token (otherwise the grant is simply re-issued)
    pub refresh_token_required: bool,
}

impl Capabilities {
    /// Authorization code flow (with or without PKCE)
    pub const AUTHORIZATION_CODE: Self = Self {
        scopes: true,
        refresh_token_required: true,
    };

    /// Client credentials flow: no user, no scopes, no refresh token
    pub const CLIENT_CREDENTIALS: Self = Self {
        scopes: false,
        refresh_token_required: false,
    };
}

/// Authorization state transitions
///
/// Exactly one event is emitted per transition.
#[derive(Debug, Clone)]
pub enum AuthorizationEvent {
    /// A new token state was installed (authorize or refresh)
    Changed(Arc<TokenState>),
    /// The token state was cleared
    Deauthorized,
}

impl AuthorizationEvent {
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed(_))
    }

    pub fn is_deauthorized(&self) -> bool {
        matches!(self, Self::Deauthorized)
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    /// Lifetime in seconds from now
    #[serde(default)]
    expires_in: Option<i64>,
    /// Absolute expiry as a unix timestamp
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Space or comma delimited
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    token_type: Option<String>,
}

/// `now + seconds`, `None` when out of range
fn seconds_from_now(seconds: i64) -> Option<DateTime<Utc>> {
    chrono::Duration::try_seconds(seconds).and_then(|offset| Utc::now().checked_add_signed(offset))
}

impl TokenResponse {
    /// Normalize into a token state
    ///
    /// Missing renewal credential or scope string carry over from `previous`.
    pub(crate) fn into_token_state(
        self,
        previous: Option<&TokenState>,
    ) -> Result<TokenState, AuthError> {
        let expires_at = match (self.expires_in, self.expires_at) {
            (Some(secs), _) => seconds_from_now(secs)
                .ok_or_else(|| AuthError::expired(format!("invalid expires_in: {secs}")))?,
            (None, Some(epoch)) => Utc
                .timestamp_opt(epoch, 0)
                .single()
                .ok_or_else(|| AuthError::expired(format!("invalid expires_at: {epoch}")))?,
            (None, None) => {
                return Err(AuthError::expired("token response carries no expiry"));
            }
        };

        let refresh_token = self
            .refresh_token
            .or_else(|| previous.and_then(|p| p.refresh_token.clone()));

        let scopes = match self.scope {
            Some(raw) => ScopeSet::parse(&raw),
            None => previous.map(|p| p.scopes.clone()).unwrap_or_default(),
        };

        Ok(TokenState {
            access_token: self.access_token,
            expires_at,
            refresh_token,
            scopes,
        })
    }
}

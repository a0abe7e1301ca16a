//! Authorization manager
//!
//! Owns the current token state and hands out usable bearer tokens to any
//! number of concurrent callers.

use super::coordinator::{RefreshCoordinator, RefreshOutcome};
use super::refresher::TokenRefresher;
use super::types::{AuthorizationEvent, Capabilities, TokenState};
use crate::error::AuthError;
use crate::types::ScopeSet;
use chrono::{DateTime, Utc};
use futures::future::FutureExt;
use futures::Stream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Default window before `expires_at` in which a token already counts as expired
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

struct Inner {
    /// Current token; `None` is the unauthorized sentinel
    state: RwLock<Option<Arc<TokenState>>>,
    /// Bumped whenever the state is replaced from outside a refresh, so a
    /// refresh started before that point discards its result
    generation: AtomicU64,
    refresher: Box<dyn TokenRefresher>,
    coordinator: RefreshCoordinator,
    events: broadcast::Sender<AuthorizationEvent>,
    expiry_margin: Duration,
    expiration_override: Mutex<Option<DateTime<Utc>>>,
}

impl Inner {
    fn expiration_override(&self) -> Option<DateTime<Utc>> {
        *self
            .expiration_override
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn clear_expiration_override(&self) {
        *self
            .expiration_override
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// A margin too large to add to the current time leaves nothing usable
    fn is_usable(&self, state: &TokenState, required: &ScopeSet) -> bool {
        let expires_at = self.expiration_override().unwrap_or(state.expires_at);
        let usable_until = chrono::Duration::from_std(self.expiry_margin)
            .ok()
            .and_then(|margin| Utc::now().checked_add_signed(margin));
        usable_until.is_some_and(|limit| limit < expires_at) && state.scopes.covers(required)
    }

    /// Install a refreshed state unless the manager moved on meanwhile
    ///
    /// When it did, waiters get whatever state is installed now, or
    /// `NoCredential` after a deauthorization.
    async fn install_refreshed(&self, generation: u64, fresh: TokenState) -> RefreshOutcome {
        let mut state = self.state.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            info!("discarding refresh result, authorization changed while it was in flight");
            return state.clone().ok_or(AuthError::NoCredential);
        }

        let fresh = Arc::new(fresh);
        *state = Some(Arc::clone(&fresh));
        self.clear_expiration_override();
        let _ = self.events.send(AuthorizationEvent::Changed(Arc::clone(&fresh)));
        info!(expires_at = %fresh.expires_at, "installed refreshed token");
        Ok(fresh)
    }

    /// Body of one refresh, run on its own task by the coordinator
    ///
    /// `seen` is the unusable state that made the caller refresh. If a
    /// previous refresh already replaced it with a usable one, that state is
    /// returned without a network call.
    async fn run_refresh(
        self: Arc<Self>,
        id: u64,
        generation: u64,
        seen: Option<(Arc<TokenState>, ScopeSet)>,
    ) -> RefreshOutcome {
        let current = self.state.read().await.clone();

        let replaced = match (&seen, &current) {
            (Some((seen, required)), Some(current)) => {
                !Arc::ptr_eq(seen, current) && self.is_usable(current, required)
            }
            _ => false,
        };

        if replaced {
            debug!(refresh_id = id, "token already replaced by a previous refresh");
            current.ok_or(AuthError::NoCredential)
        } else if current.is_none() && self.refresher.capabilities().refresh_token_required {
            Err(AuthError::NoCredential)
        } else {
            match self.refresher.refresh(current.as_deref()).await {
                Ok(fresh) => self.install_refreshed(generation, fresh).await,
                Err(e) => {
                    warn!(refresh_id = id, error = %e, "token refresh failed");
                    Err(e)
                }
            }
        }
    }
}

/// Builder for [`AuthorizationManager`]
pub struct AuthorizationManagerBuilder {
    refresher: Box<dyn TokenRefresher>,
    state: Option<TokenState>,
    expiry_margin: Duration,
}

impl AuthorizationManagerBuilder {
    /// Start from an existing token state
    #[must_use]
    pub fn state(mut self, state: TokenState) -> Self {
        self.state = Some(state);
        self
    }

    /// Treat tokens as expired this long before `expires_at`
    #[must_use]
    pub fn expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = margin;
        self
    }

    pub fn build(self) -> AuthorizationManager {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        AuthorizationManager {
            inner: Arc::new(Inner {
                state: RwLock::new(self.state.map(Arc::new)),
                generation: AtomicU64::new(0),
                refresher: self.refresher,
                coordinator: RefreshCoordinator::new(),
                events,
                expiry_margin: self.expiry_margin,
                expiration_override: Mutex::new(None),
            }),
        }
    }
}

/// Owns the shared token state and keeps it valid
///
/// Cloning is cheap and every clone shares the same state, coordinator and
/// event channel.
#[derive(Clone)]
pub struct AuthorizationManager {
    inner: Arc<Inner>,
}

impl AuthorizationManager {
    /// Create an unauthorized manager
    pub fn new(refresher: impl TokenRefresher + 'static) -> Self {
        Self::builder(refresher).build()
    }

    pub fn builder(refresher: impl TokenRefresher + 'static) -> AuthorizationManagerBuilder {
        AuthorizationManagerBuilder {
            refresher: Box::new(refresher),
            state: None,
            expiry_margin: DEFAULT_EXPIRY_MARGIN,
        }
    }

    /// What the underlying flow supports
    pub fn capabilities(&self) -> Capabilities {
        self.inner.refresher.capabilities()
    }

    /// Get an access token usable for `required`, refreshing if necessary
    pub async fn authorized_token(&self, required: &ScopeSet) -> Result<String, AuthError> {
        let capabilities = self.capabilities();
        if !capabilities.scopes && !required.is_empty() {
            return Err(AuthError::InsufficientScopes {
                missing: required.clone(),
            });
        }

        let current = self
            .inner
            .state
            .read()
            .await
            .clone()
            .ok_or(AuthError::NoCredential)?;

        if self.inner.is_usable(&current, required) {
            return Ok(current.access_token.clone());
        }

        if capabilities.refresh_token_required && current.refresh_token.is_none() {
            return Err(AuthError::reauthorization(
                "token expired or lacks scopes and no refresh token is available",
            ));
        }

        debug!(required = %required, "token unusable, refreshing");
        let fresh = self.start_or_join(Some((current, required.clone()))).await?;

        if !fresh.scopes.covers(required) {
            return Err(AuthError::InsufficientScopes {
                missing: fresh.scopes.missing(required),
            });
        }
        Ok(fresh.access_token.clone())
    }

    /// Refresh now, joining an in-flight refresh if there is one
    ///
    /// Dropping the returned future stops waiting but does not abort the
    /// network call, which other callers may share.
    pub async fn refresh(&self) -> Result<Arc<TokenState>, AuthError> {
        self.start_or_join(None).await
    }

    /// Join or start a refresh; `seen` is the unusable state that prompted it
    pub(crate) async fn start_or_join(
        &self,
        seen: Option<(Arc<TokenState>, ScopeSet)>,
    ) -> Result<Arc<TokenState>, AuthError> {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        let shared = self
            .inner
            .coordinator
            .join_or_start(move |id| inner.run_refresh(id, generation, seen).boxed());
        shared.await
    }

    /// Renew after the server rejected `rejected_access_token`
    ///
    /// When another caller already replaced that token, the newer state is
    /// returned without a network call.
    pub async fn refresh_rejected(
        &self,
        rejected_access_token: &str,
    ) -> Result<Arc<TokenState>, AuthError> {
        let current = self
            .inner
            .state
            .read()
            .await
            .clone()
            .ok_or(AuthError::NoCredential)?;

        if current.access_token != rejected_access_token {
            debug!("rejected token already replaced");
            return Ok(current);
        }

        if self.capabilities().refresh_token_required && current.refresh_token.is_none() {
            return Err(AuthError::reauthorization(
                "access token rejected and no refresh token is available",
            ));
        }

        self.refresh().await
    }

    /// Request a first token for flows that need no renewal credential
    pub async fn request_initial_token(&self) -> Result<Arc<TokenState>, AuthError> {
        if self.capabilities().refresh_token_required {
            return Err(AuthError::reauthorization(
                "this flow requires interactive authorization",
            ));
        }
        self.refresh().await
    }

    /// Install a token obtained out of band (e.g. an authorization code exchange)
    ///
    /// Any in-flight refresh is detached and its result discarded.
    pub async fn authorize(&self, token: TokenState) {
        let token = Arc::new(token);
        let mut state = self.inner.state.write().await;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.coordinator.detach();
        *state = Some(Arc::clone(&token));
        self.inner.clear_expiration_override();
        let _ = self.inner.events.send(AuthorizationEvent::Changed(token));
        info!("installed new authorization");
    }

    /// Clear the token state
    ///
    /// An in-flight refresh runs to completion but its result is discarded.
    pub async fn deauthorize(&self) {
        let mut state = self.inner.state.write().await;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if self.inner.coordinator.detach() {
            debug!("detached in-flight refresh");
        }
        *state = None;
        self.inner.clear_expiration_override();
        let _ = self.inner.events.send(AuthorizationEvent::Deauthorized);
        info!("deauthorized");
    }

    /// Treat the token as expiring at `instant` until the next install
    ///
    /// Used to exercise refresh paths deterministically.
    pub fn set_expiration_override(&self, instant: Option<DateTime<Utc>>) {
        *self
            .inner
            .expiration_override
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = instant;
    }

    /// Current token state snapshot
    pub async fn snapshot(&self) -> Option<Arc<TokenState>> {
        self.inner.state.read().await.clone()
    }

    pub async fn is_authorized(&self) -> bool {
        self.inner.state.read().await.is_some()
    }

    /// Whether a refresh is in flight
    pub fn is_refreshing(&self) -> bool {
        self.inner.coordinator.is_pending()
    }

    /// Number of refreshes started so far
    pub fn refresh_count(&self) -> u64 {
        self.inner.coordinator.started()
    }

    /// Subscribe to every authorization event
    pub fn subscribe(&self) -> broadcast::Receiver<AuthorizationEvent> {
        self.inner.events.subscribe()
    }

    /// Stream of newly installed token states
    pub fn changes(&self) -> impl Stream<Item = Arc<TokenState>> + Send + 'static {
        filter_events(self.subscribe(), |event| match event {
            AuthorizationEvent::Changed(state) => Some(state),
            AuthorizationEvent::Deauthorized => None,
        })
    }

    /// Stream that yields once per deauthorization
    pub fn deauthorizations(&self) -> impl Stream<Item = ()> + Send + 'static {
        filter_events(self.subscribe(), |event| {
            event.is_deauthorized().then_some(())
        })
    }
}

impl std::fmt::Debug for AuthorizationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationManager")
            .field("capabilities", &self.capabilities())
            .field("refreshing", &self.is_refreshing())
            .finish_non_exhaustive()
    }
}

fn filter_events<T, F>(
    rx: broadcast::Receiver<AuthorizationEvent>,
    select: F,
) -> impl Stream<Item = T> + Send + 'static
where
    T: Send + 'static,
    F: Fn(AuthorizationEvent) -> Option<T> + Send + Sync + 'static,
{
    futures::stream::unfold((rx, select), |(mut rx, select)| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(item) = select(event) {
                        return Some((item, (rx, select)));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "authorization event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

//! Authorization module
//!
//! Keeps one bearer credential valid for any number of concurrent callers.
//!
//! # Overview
//!
//! - `TokenState` - immutable snapshot of the current credential
//! - `AuthorizationManager` - owns the state, checks scopes, hands out tokens
//! - `TokenRefresher` - the network call that renews a credential
//!   (`OAuthRefresher`, `ClientCredentialsRefresher`)
//!
//! N simultaneous callers holding an expired token produce exactly one
//! refresh request; everyone receives the same outcome.

mod coordinator;
mod manager;
mod refresher;
mod types;

pub use manager::{AuthorizationManager, AuthorizationManagerBuilder, DEFAULT_EXPIRY_MARGIN};
pub use refresher::{ClientCredentialsRefresher, OAuthRefresher, TokenRefresher};
pub use types::{AuthorizationEvent, Capabilities, TokenState};

//! # spotify-web-core
//!
//! Token lifecycle and pagination runtime for the Spotify Web API.
//!
//! ## Features
//!
//! - **Single-flight refresh**: any number of concurrent callers needing a
//!   fresh token share one token-endpoint call
//! - **Retry policy**: one forced refresh on 401, one wait-and-retry on 429
//! - **Lazy pagination**: pages are fetched one at a time, only as the
//!   consumer asks for them
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use spotify_web_core::{ClientConfig, Page, ScopeSet, TokenState};
//!
//! #[tokio::main]
//! async fn main() -> spotify_web_core::Result<()> {
//!     let config = ClientConfig::from_file("client.yaml")?.apply_env();
//!     let token = TokenState::expires_in("BQD...", 3600).with_refresh_token("AQC...");
//!     let executor = config.build_executor(Some(token))?;
//!
//!     let scopes = ScopeSet::parse("user-library-read");
//!     let first: Page<serde_json::Value> = executor.get_json("me/tracks", &scopes).await?;
//!
//!     let mut pages = std::pin::pin!(executor.extend_pages(first, None, &scopes));
//!     while let Some(page) = pages.next().await {
//!         println!("{} items", page?.items.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   token    ┌──────────────────────┐  refresh  ┌──────────────┐
//! │ PageWalker   │──────────▶ │ RequestExecutor      │─────────▶ │ Authorization│
//! │ (pagination) │  execute   │ 401 / 429 policy     │           │ Manager      │
//! └──────────────┘            └──────────────────────┘           └──────┬───────┘
//!                                                                       │ single flight
//!                                                                ┌──────▼───────┐
//!                                                                │ TokenRefresher│
//!                                                                └──────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Scopes, methods and JSON aliases
pub mod types;

/// Token state, refresh flows and the authorization manager
pub mod auth;

/// Request execution with retry and rate limiting
pub mod http;

/// Page types and the page walker
pub mod pagination;

/// Client configuration
pub mod config;

/// Token persistence
pub mod store;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{ApiError, AuthError, Error, Result, ResultExt};
pub use types::*;

pub use auth::{
    AuthorizationEvent, AuthorizationManager, Capabilities, ClientCredentialsRefresher,
    OAuthRefresher, TokenRefresher, TokenState,
};
pub use config::ClientConfig;
pub use http::{RequestExecutor, RequestSpec};
pub use pagination::{CursorPage, Page, PageWalker, Paginated};
pub use store::TokenStore;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

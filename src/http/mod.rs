//! HTTP module
//!
//! Issues authorized requests against the API and applies the retry policy.
//!
//! # Features
//!
//! - **Bearer Authorization**: a usable token is fetched before every attempt
//! - **401 Handling**: one forced refresh and one retry per call
//! - **429 Handling**: one delayed retry honoring `retry-after`
//! - **Canonical URLs**: query parameters are always serialized sorted
//! - **Pacing**: optional token bucket rate limiter using governor

mod executor;
mod rate_limit;
mod request;

pub use executor::{
    decode_json, retry_after_seconds, ExecutorConfig, ExecutorConfigBuilder, RequestExecutor,
    DEFAULT_API_BASE_URL, MAX_RETRY_AFTER_SECS,
};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use request::{Body, RequestSpec};

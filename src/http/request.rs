//! Request description
//!
//! A `RequestSpec` is everything the executor needs to issue one call except
//! the bearer token, which is attached per attempt.

use crate::error::Result;
use crate::types::{JsonValue, Method};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Request body
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// `application/json`
    Json(JsonValue),
    /// `application/x-www-form-urlencoded`
    Form(BTreeMap<String, String>),
}

/// One logical API request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    /// HTTP method
    pub method: Method,
    /// Path relative to the API base URL, or an absolute URL
    pub path: String,
    /// Query parameters (kept sorted)
    pub query: BTreeMap<String, String>,
    /// Extra request headers
    pub headers: BTreeMap<String, String>,
    /// Optional body
    pub body: Option<Body>,
    /// Override the per-attempt timeout
    pub timeout: Option<Duration>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Add a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set JSON body
    #[must_use]
    pub fn json(mut self, body: JsonValue) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    /// Set form body
    #[must_use]
    pub fn form(mut self, fields: BTreeMap<String, String>) -> Self {
        self.body = Some(Body::Form(fields));
        self
    }

    /// Set timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Resolve the full request URL
    ///
    /// Absolute URLs (such as page links) are used as-is unless parameters
    /// were added, in which case the whole query is rewritten in sorted order
    /// so identical logical requests produce identical URLs.
    pub fn url(&self, base: &Url) -> Result<Url> {
        let mut url = if is_absolute(&self.path) {
            Url::parse(&self.path)?
        } else {
            let base = base.as_str().trim_end_matches('/');
            let path = self.path.trim_start_matches('/');
            Url::parse(&format!("{base}/{path}"))?
        };

        if !self.query.is_empty() {
            let mut pairs: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| !self.query.contains_key(k.as_ref()))
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            pairs.extend(self.query.iter().map(|(k, v)| (k.clone(), v.clone())));
            pairs.sort();

            url.query_pairs_mut().clear().extend_pairs(pairs);
        }

        Ok(url)
    }
}

fn is_absolute(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

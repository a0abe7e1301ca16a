//! Common types used throughout the crate
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

// ============================================================================
// HTTP Types
// ============================================================================

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    GET,
    POST,
    PUT,
    DELETE,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::GET => reqwest::Method::GET,
            Method::POST => reqwest::Method::POST,
            Method::PUT => reqwest::Method::PUT,
            Method::DELETE => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Scopes
// ============================================================================

/// A named permission granted to a token
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    /// Create a scope from its wire name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The wire name of the scope
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Scope {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// An ordered set of scopes
///
/// Displays as the space-delimited form the authorization server expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<Scope>);

impl ScopeSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a granted-scope string
    ///
    /// Servers use either spaces or commas as the delimiter; both are
    /// accepted, and empty segments are ignored.
    pub fn parse(raw: &str) -> Self {
        raw.split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(Scope::new)
            .collect()
    }

    /// Add a scope
    pub fn insert(&mut self, scope: Scope) -> bool {
        self.0.insert(scope)
    }

    /// Whether the set contains a scope
    pub fn contains(&self, scope: &Scope) -> bool {
        self.0.contains(scope)
    }

    /// Whether every scope in `required` is in this set
    pub fn covers(&self, required: &ScopeSet) -> bool {
        required.0.is_subset(&self.0)
    }

    /// Scopes in `required` that this set lacks
    pub fn missing(&self, required: &ScopeSet) -> ScopeSet {
        ScopeSet(required.0.difference(&self.0).cloned().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scope> {
        self.0.iter()
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for scope in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(scope.as_str())?;
            first = false;
        }
        Ok(())
    }
}

impl FromIterator<Scope> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = Scope>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(Scope::new).collect()
    }
}

impl<'a> IntoIterator for &'a ScopeSet {
    type Item = &'a Scope;
    type IntoIter = std::collections::btree_set::Iter<'a, Scope>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("user-read-email playlist-read-private", 2 ; "space delimited")]
    #[test_case("user-read-email,playlist-read-private", 2 ; "comma delimited")]
    #[test_case("user-read-email, playlist-read-private  streaming", 3 ; "mixed delimiters")]
    #[test_case("", 0 ; "empty")]
    #[test_case(" , ", 0 ; "only delimiters")]
    fn test_scope_set_parse(raw: &str, expected: usize) {
        assert_eq!(ScopeSet::parse(raw).len(), expected);
    }

    #[test]
    fn test_scope_set_covers() {
        let granted = ScopeSet::parse("a b c");
        assert!(granted.covers(&ScopeSet::parse("a c")));
        assert!(granted.covers(&ScopeSet::new()));
        assert!(!granted.covers(&ScopeSet::parse("a d")));
    }

    #[test]
    fn test_scope_set_missing() {
        let granted = ScopeSet::parse("a b");
        let missing = granted.missing(&ScopeSet::parse("b c d"));
        assert_eq!(missing, ScopeSet::parse("c d"));
    }

    #[test]
    fn test_scope_set_display_sorted() {
        let scopes = ScopeSet::parse("streaming,app-remote-control");
        assert_eq!(scopes.to_string(), "app-remote-control streaming");
    }

    #[test]
    fn test_method_conversion() {
        assert_eq!(reqwest::Method::from(Method::PUT), reqwest::Method::PUT);
        assert_eq!(Method::default(), Method::GET);
        assert_eq!(Method::DELETE.to_string(), "DELETE");
    }
}

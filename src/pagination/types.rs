//! Page types
//!
//! Pages are immutable values decoded from one response. The only thing the
//! walker needs from a page is its link to the next one.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A page that may link to the page after it
pub trait Paginated: DeserializeOwned + Send + 'static {
    /// Absolute URL of the next page, `None` on the last page
    fn next_link(&self) -> Option<&str>;

    /// Number of items on this page
    fn item_count(&self) -> usize;
}

/// Offset-based page of a larger ordered collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page, in collection order
    pub items: Vec<T>,
    /// Maximum items per page
    pub limit: u32,
    /// Index of the first item in the collection
    pub offset: u32,
    /// Total items in the collection
    pub total: u32,
    /// Link to this page
    #[serde(default)]
    pub href: Option<String>,
    /// Link to the previous page
    #[serde(default)]
    pub previous: Option<String>,
    /// Link to the next page
    #[serde(default)]
    pub next: Option<String>,
}

impl<T> Page<T> {
    /// Whether the collection has items after this page
    pub fn has_more(&self) -> bool {
        (self.offset as usize + self.items.len()) < self.total as usize
    }

    /// Offset of the first item after this page
    pub fn next_offset(&self) -> u32 {
        self.offset + self.items.len() as u32
    }
}

impl<T: DeserializeOwned + Send + 'static> Paginated for Page<T> {
    fn next_link(&self) -> Option<&str> {
        self.next.as_deref()
    }

    fn item_count(&self) -> usize {
        self.items.len()
    }
}

/// Cursor positions of a cursor-based page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursors {
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
}

/// Cursor-based page, used by collections that change while being read
/// (followed artists, recently played)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub limit: u32,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub cursors: Option<Cursors>,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub href: Option<String>,
}

impl<T: DeserializeOwned + Send + 'static> Paginated for CursorPage<T> {
    fn next_link(&self) -> Option<&str> {
        self.next.as_deref()
    }

    fn item_count(&self) -> usize {
        self.items.len()
    }
}

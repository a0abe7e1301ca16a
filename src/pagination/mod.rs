//! Pagination module
//!
//! Supports: offset pages (`Page<T>`) and cursor pages (`CursorPage<T>`)
//!
//! # Overview
//!
//! Every paginated response links to the page after it. `PageWalker` takes
//! the first page and follows those links one request at a time, in order,
//! until the server reports no next page or the caller's cap is reached.

mod types;
mod walker;

pub use types::{CursorPage, Cursors, Page, Paginated};
pub use walker::PageWalker;

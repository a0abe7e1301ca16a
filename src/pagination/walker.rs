//! Page walker
//!
//! Starting from one page, fetches the chain of following pages strictly one
//! at a time. Page k+1 is requested only after page k has been received and
//! handed to the consumer, so dropping the walker (or its stream) after page
//! k guarantees page k+1 is never requested.

use super::types::{Page, Paginated};
use crate::error::Result;
use crate::http::RequestExecutor;
use crate::types::ScopeSet;
use futures::{Stream, TryStreamExt};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Ordered, finite sequence of pages following an initial page
///
/// Not resumable once finished; start a new walker from a fresh page.
pub struct PageWalker<P: Paginated> {
    executor: RequestExecutor,
    required: ScopeSet,
    initial: Option<P>,
    next: Option<String>,
    max_extra_pages: Option<usize>,
    extra_fetched: usize,
    finished: bool,
}

impl<P: Paginated> PageWalker<P> {
    /// Walk all pages after `initial`
    pub fn new(executor: RequestExecutor, initial: P) -> Self {
        Self {
            executor,
            required: ScopeSet::new(),
            initial: Some(initial),
            next: None,
            max_extra_pages: None,
            extra_fetched: 0,
            finished: false,
        }
    }

    /// Scopes each page request needs
    #[must_use]
    pub fn scopes(mut self, required: ScopeSet) -> Self {
        self.required = required;
        self
    }

    /// Stop after fetching this many pages beyond the initial one
    #[must_use]
    pub fn max_extra_pages(mut self, max: Option<usize>) -> Self {
        self.max_extra_pages = max;
        self
    }

    /// Whether `advance` would yield another page
    pub fn has_next(&self) -> bool {
        if self.finished {
            return false;
        }
        if self.initial.is_some() {
            return true;
        }
        self.next.is_some()
            && self
                .max_extra_pages
                .map_or(true, |max| self.extra_fetched < max)
    }

    /// Pages fetched over the network so far
    pub fn extra_pages_fetched(&self) -> usize {
        self.extra_fetched
    }

    /// Yield the next page
    ///
    /// The first call returns the initial page without a network call.
    /// After an error the walker is finished.
    pub async fn advance(&mut self) -> Option<Result<P>> {
        if let Some(page) = self.initial.take() {
            self.next = page.next_link().map(str::to_owned);
            return Some(Ok(page));
        }

        if !self.has_next() {
            self.finished = true;
            return None;
        }

        let url = self.next.clone()?;
        debug!(url = %url, page = self.extra_fetched + 1, "fetching next page");

        match self.executor.get_json::<P>(&url, &self.required).await {
            Ok(page) => {
                self.extra_fetched += 1;
                self.next = page.next_link().map(str::to_owned);
                Some(Ok(page))
            }
            Err(e) => {
                debug!(url = %url, error = %e, "page fetch failed, stopping");
                self.finished = true;
                self.next = None;
                Some(Err(e))
            }
        }
    }

    /// Consume the walker as a stream of pages
    pub fn into_stream(self) -> impl Stream<Item = Result<P>> + Send {
        futures::stream::unfold(self, |mut walker| async move {
            walker.advance().await.map(|page| (page, walker))
        })
    }

    /// Fetch every remaining page
    pub async fn collect_pages(self) -> Result<Vec<P>> {
        self.into_stream().try_collect().await
    }
}

impl<T: DeserializeOwned + Send + 'static> PageWalker<Page<T>> {
    /// Fetch every remaining page and flatten the items in collection order
    pub async fn collect_items(self) -> Result<Vec<T>> {
        let pages = self.collect_pages().await?;
        Ok(pages.into_iter().flat_map(|page| page.items).collect())
    }
}

impl RequestExecutor {
    /// Ordered stream of `initial` followed by every page it links to
    ///
    /// `max_extra_pages` caps the pages fetched beyond `initial`; `None`
    /// walks until the server reports no next page.
    pub fn extend_pages<P: Paginated>(
        &self,
        initial: P,
        max_extra_pages: Option<usize>,
        required: &ScopeSet,
    ) -> impl Stream<Item = Result<P>> + Send {
        PageWalker::new(self.clone(), initial)
            .scopes(required.clone())
            .max_extra_pages(max_extra_pages)
            .into_stream()
    }
}

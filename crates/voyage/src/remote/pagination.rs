//! Restartable page sequences over paginated search endpoints.
//!
//! A [`Paginator`] wraps a page-fetching closure. Pages are requested lazily and
//! the sequence ends on the first short page, on an empty page, or once the
//! reported total has been reached.

use std::future::Future;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use super::errors::Result;

/// Default page size for destination search endpoints.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages, if the service reports it.
    #[serde(default)]
    pub total: Option<u64>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: Option<u64>) -> Self {
        Self { items, total }
    }
}

/// Lazy, finite page iterator.
///
/// The fetch closure receives the 1-based page number and the page size.
pub struct Paginator<T, F> {
    fetch: F,
    page_size: u32,
    next_page: u32,
    fetched: u64,
    finished: bool,
    _item: PhantomData<fn() -> T>,
}

impl<T, F, Fut> Paginator<T, F>
where
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    pub fn new(page_size: u32, fetch: F) -> Self {
        Self {
            fetch,
            page_size: page_size.max(1),
            next_page: 1,
            fetched: 0,
            finished: false,
            _item: PhantomData,
        }
    }

    /// Fetch the next page, or `None` once the sequence is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>> {
        if self.finished {
            return Ok(None);
        }

        let page = (self.fetch)(self.next_page, self.page_size).await?;
        self.next_page += 1;

        let count = page.items.len() as u64;
        self.fetched += count;

        let short = count < u64::from(self.page_size);
        let reached_total = page.total.is_some_and(|total| self.fetched >= total);
        if short || reached_total {
            self.finished = true;
        }

        if count == 0 {
            return Ok(None);
        }
        Ok(Some(page.items))
    }

    /// Start over from the first page.
    pub fn reset(&mut self) {
        self.next_page = 1;
        self.fetched = 0;
        self.finished = false;
    }

    /// Fetch every page from the beginning and concatenate the items.
    pub async fn collect_all(&mut self) -> Result<Vec<T>> {
        self.reset();
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }
}

use std::marker::PhantomData;
use std::pin::pin;

use futures::stream::{self, Stream, StreamExt};

use crate::error::{MailchimpError, Result};
use crate::types::Listed;
use crate::MailchimpClient;

/// Default number of records requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// A lazy, restartable view over an offset-paginated collection endpoint.
///
/// Nothing is requested until one of the streams is polled, and every call to
/// [`Paginated::pages`] starts again from offset 0. The walk stops at the
/// first page with zero records; the `total_items` field Mailchimp returns is
/// ignored because it is not reliable across pages.
pub struct Paginated<T> {
    client: MailchimpClient,
    path: String,
    query: Vec<(String, String)>,
    page_size: u32,
    _marker: PhantomData<fn() -> T>,
}

/// Records accumulated before the walk ended, and the error that ended it early.
#[derive(Debug)]
pub struct Partial<T> {
    pub items: Vec<T>,
    pub pages: u32,
    pub error: Option<MailchimpError>,
}

impl<T: Listed> Paginated<T> {
    pub(crate) fn new(client: MailchimpClient, path: String, page_size: u32) -> Self {
        Self {
            client,
            path,
            query: Vec::new(),
            page_size: page_size.max(1),
            _marker: PhantomData,
        }
    }

    /// Add a fixed query constraint sent with every page request.
    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Fetch a single page starting at `offset`.
    pub async fn page(&self, offset: u32) -> Result<Vec<T>> {
        let mut query = self.query.clone();
        query.push(("count".to_string(), self.page_size.to_string()));
        query.push(("offset".to_string(), offset.to_string()));

        let body: serde_json::Value = self.client.get_json(&self.path, &query).await?;
        let items = match body.get(T::KEY) {
            Some(items) => serde_json::from_value(items.clone())?,
            None => Vec::new(),
        };
        Ok(items)
    }

    /// Stream of non-empty pages. Ends after an empty page, or right after
    /// yielding the first error.
    pub fn pages(&self) -> impl Stream<Item = Result<Vec<T>>> + Send + '_ {
        stream::unfold(Some(0u32), move |cursor| async move {
            let offset = cursor?;
            match self.page(offset).await {
                Ok(items) if items.is_empty() => None,
                Ok(items) => Some((Ok(items), Some(offset + self.page_size))),
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    /// Stream of individual records across all pages.
    pub fn stream(&self) -> impl Stream<Item = Result<T>> + Send + '_ {
        self.pages().flat_map(|page| {
            let items: Vec<Result<T>> = match page {
                Ok(items) => items.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            stream::iter(items)
        })
    }

    /// Walk every page, keeping what was accumulated if a page fails.
    pub async fn collect_partial(&self) -> Partial<T> {
        let mut partial = Partial {
            items: Vec::new(),
            pages: 0,
            error: None,
        };

        let mut pages = pin!(self.pages());
        while let Some(page) = pages.next().await {
            match page {
                Ok(mut items) => {
                    partial.pages += 1;
                    partial.items.append(&mut items);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %self.path,
                        fetched = partial.items.len(),
                        error = %e,
                        "Page fetch failed, keeping partial results"
                    );
                    partial.error = Some(e);
                }
            }
        }

        partial
    }
}

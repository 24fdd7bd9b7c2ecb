//! Pagination over query results.
//!
//! Paging is split in two layers:
//!
//! - a [`PageSource`] slices a result set by offset and count and knows the total count;
//!   [`CursorPageAdapter`] is the store-backed implementation, opening a fresh cursor over
//!   the same query for every slice
//! - a [`Paginator`] turns [`PaginationParams`] into a [`Page`] with navigation metadata
//!
//! Nothing is fetched until a page is requested.

use async_trait::async_trait;
use bson::Document;
use mea::rwlock::RwLock;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tracing::debug;

use crate::{
    document::Model,
    driver::StoreCollection,
    error::DocumentStoreResult,
    result::{CursorResult, ResultSet},
};

/// A single page of paginated results.
///
/// # Type Parameters
///
/// * `T` - The type of items contained in this page
///
/// # Example
///
/// ```ignore
/// use docgate::page::Page;
///
/// let page: Page<String> = Page::builder(vec!["item1".to_string()])
///     .with_count(100)
///     .with_next_page(Some(2))
///     .build();
///
/// assert_eq!(page.items.len(), 1);
/// assert_eq!(page.count, 100);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// Total count of items across all pages.
    pub count: usize,
    /// The next page number (if more pages exist).
    pub next_page: Option<usize>,
    /// The previous page number (if this is not the first page).
    pub previous_page: Option<usize>,
}

impl<T> Page<T> {
    /// Creates a new builder for constructing a page with custom settings.
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }
}

/// Builder for constructing [`Page`] instances.
pub struct PageBuilder<T> {
    items: Vec<T>,
    count: usize,
    next_page: Option<usize>,
    previous_page: Option<usize>,
}

impl<T> PageBuilder<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }

    /// Sets the total count of items across all pages.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Sets the next page number (or `None` if this is the last page).
    pub fn with_next_page(mut self, next_page: Option<usize>) -> Self {
        self.next_page = next_page;
        self
    }

    /// Sets the previous page number (or `None` if this is the first page).
    pub fn with_previous_page(mut self, previous_page: Option<usize>) -> Self {
        self.previous_page = previous_page;
        self
    }

    pub fn build(self) -> Page<T> {
        Page {
            items: self.items,
            count: self.count,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
    }
}

/// Which page to retrieve and how many items per page.
///
/// Pages are 1-indexed; page `0` is treated as page `1`.
///
/// ```ignore
/// let params = PaginationParams::new(3, 20);
/// assert_eq!(params.offset(), 40);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PaginationParams {
    /// The page number (1-indexed).
    pub page: usize,
    /// Number of items per page.
    pub per_page: usize,
}

impl PaginationParams {
    pub fn new(page: usize, per_page: usize) -> Self {
        Self { page, per_page }
    }

    /// Number of items to skip for this page.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) * self.per_page
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { page: 1, per_page: 10 }
    }
}

/// Offset/count slicing contract used by [`Paginator`].
#[async_trait]
pub trait PageSource: Send + Sync {
    type Model: Model;

    /// Returns `count` items starting at `offset`.
    async fn items(&self, offset: u64, count: u64) -> DocumentStoreResult<ResultSet<Self::Model>>;

    /// Total number of items across all pages.
    async fn count(&self) -> DocumentStoreResult<u64>;
}

/// Store-backed [`PageSource`] over one native query.
///
/// Every [`items`](PageSource::items) call runs the query afresh with skip and limit
/// applied; [`count`](PageSource::count) runs it without them and caches the answer.
pub struct CursorPageAdapter<M: Model> {
    collection: Arc<dyn StoreCollection>,
    query: Document,
    sort: Document,
    prototype: M,
    count: RwLock<Option<u64>>,
}

impl<M: Model> fmt::Debug for CursorPageAdapter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorPageAdapter")
            .field("collection", &self.collection.name())
            .field("query", &self.query)
            .field("sort", &self.sort)
            .finish_non_exhaustive()
    }
}

impl<M: Model> CursorPageAdapter<M> {
    /// Creates an adapter over a translated query and sort.
    pub fn new(
        collection: Arc<dyn StoreCollection>,
        query: Document,
        sort: Document,
        prototype: M,
    ) -> Self {
        Self {
            collection,
            query,
            sort,
            prototype,
            count: RwLock::new(None),
        }
    }

    pub fn query(&self) -> &Document {
        &self.query
    }

    pub fn sort(&self) -> &Document {
        &self.sort
    }
}

#[async_trait]
impl<M: Model> PageSource for CursorPageAdapter<M> {
    type Model = M;

    async fn items(&self, offset: u64, count: u64) -> DocumentStoreResult<ResultSet<M>> {
        debug!(collection = %self.collection.name(), offset, count, "fetching page items");

        let mut cursor = self.collection.find(self.query.clone()).await?;
        if !self.sort.is_empty() {
            cursor.sort(self.sort.clone())?;
        }

        let mut result = CursorResult::new(cursor);
        result.skip(offset)?;
        result.limit(count)?;
        if let Some(total) = *self.count.read().await {
            result = result.with_row_count(total);
        }

        Ok(ResultSet::new(self.prototype.clone(), result))
    }

    async fn count(&self) -> DocumentStoreResult<u64> {
        if let Some(total) = *self.count.read().await {
            return Ok(total);
        }

        let mut guard = self.count.write().await;
        if let Some(total) = *guard {
            return Ok(total);
        }

        let total = self
            .collection
            .find(self.query.clone())
            .await?
            .count(false)
            .await?;
        *guard = Some(total);
        Ok(total)
    }
}

/// Turns a [`PageSource`] into numbered pages.
#[derive(Debug)]
pub struct Paginator<S: PageSource> {
    source: S,
}

impl<S: PageSource> Paginator<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetches one page.
    ///
    /// # Errors
    ///
    /// Propagates store errors from counting or fetching.
    pub async fn page(&self, params: &PaginationParams) -> DocumentStoreResult<Page<S::Model>> {
        let count = self.source.count().await? as usize;
        let offset = params.offset();
        let page = params.page.max(1);
        let previous_page = if page > 1 { Some(page - 1) } else { None };
        if params.per_page == 0 || offset >= count {
            return Ok(Page::builder(Vec::new())
                .with_count(count)
                .with_previous_page(previous_page)
                .build());
        }

        let items = self
            .source
            .items(offset as u64, params.per_page as u64)
            .await?
            .collect_rows()
            .await?;
        let end = offset + items.len();

        Ok(Page::builder(items)
            .with_count(count)
            .with_next_page(if end < count { Some(page + 1) } else { None })
            .with_previous_page(previous_page)
            .build())
    }

    /// Number of pages of `per_page` items.
    pub async fn page_count(&self, per_page: usize) -> DocumentStoreResult<usize> {
        if per_page == 0 {
            return Ok(0);
        }
        let count = self.source.count().await? as usize;
        Ok(count.div_ceil(per_page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{document::Record, result::tests::VecCursor};
    use bson::doc;

    struct NumberSource {
        total: i32,
    }

    #[async_trait]
    impl PageSource for NumberSource {
        type Model = Record;

        async fn items(&self, offset: u64, count: u64) -> DocumentStoreResult<ResultSet<Record>> {
            let documents = (0..self.total).map(|n| doc! { "n": n }).collect();
            let mut result = CursorResult::new(Box::new(VecCursor::new(documents)));
            result.skip(offset)?;
            result.limit(count)?;
            Ok(ResultSet::new(Record::new(), result))
        }

        async fn count(&self) -> DocumentStoreResult<u64> {
            Ok(self.total as u64)
        }
    }

    fn numbers(page: &Page<Record>) -> Vec<i32> {
        page.items
            .iter()
            .filter_map(|r| r.get("n").and_then(|n| n.as_i32()))
            .collect()
    }

    #[test]
    fn test_offset() {
        assert_eq!(PaginationParams::new(3, 20).offset(), 40);
        assert_eq!(PaginationParams::new(0, 20).offset(), 0);
    }

    #[tokio::test]
    async fn test_middle_page() {
        let paginator = Paginator::new(NumberSource { total: 23 });
        let page = paginator.page(&PaginationParams::new(2, 10)).await.unwrap();

        assert_eq!(numbers(&page), (10..20).collect::<Vec<_>>());
        assert_eq!(page.count, 23);
        assert_eq!(page.next_page, Some(3));
        assert_eq!(page.previous_page, Some(1));
    }

    #[tokio::test]
    async fn test_last_and_out_of_range_pages() {
        let paginator = Paginator::new(NumberSource { total: 23 });

        let last = paginator.page(&PaginationParams::new(3, 10)).await.unwrap();
        assert_eq!(numbers(&last), vec![20, 21, 22]);
        assert_eq!(last.next_page, None);

        let beyond = paginator.page(&PaginationParams::new(9, 10)).await.unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.count, 23);
        assert_eq!(beyond.next_page, None);
        assert_eq!(beyond.previous_page, Some(8));

        assert_eq!(paginator.page_count(10).await.unwrap(), 3);
    }
}

//! Result types for read operations.
//!
//! A [`CursorResult`] wraps one driver cursor and tracks a forward-only position over it.
//! End of stream is an explicit flag reported by the cursor, never inferred from the
//! content of the current document: a document whose fields are all `Null` is a
//! perfectly valid row.
//!
//! A [`ResultSet`] shapes each record into a caller-chosen [`Model`] by cloning a row
//! prototype.
//!
//! # Example
//!
//! ```ignore
//! let mut rows = gateway.select(doc! { "artist": "Nina" }).await?;
//! while let Some(album) = rows.next_row().await? {
//!     println!("{album:?}");
//! }
//! ```

use bson::Bson;
use futures::{
    Stream,
    future::BoxFuture,
    stream,
};
use std::fmt;

use crate::{
    document::{Model, Record},
    driver::StoreCursor,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Deferred row count, invoked at most once.
pub type CountFn = Box<dyn FnOnce() -> BoxFuture<'static, DocumentStoreResult<u64>> + Send>;

/// Where a [`CursorResult`] gets its row count from.
pub enum RowCount {
    /// Ask the store, honoring the query's filter but not its skip/limit.
    Store,
    /// A precomputed count.
    Known(u64),
    /// A count function, invoked on first use.
    Deferred(CountFn),
    /// The count function failed; later calls report the same failure.
    Failed(String),
}

impl fmt::Debug for RowCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowCount::Store => f.write_str("Store"),
            RowCount::Known(n) => f.debug_tuple("Known").field(n).finish(),
            RowCount::Deferred(_) => f.write_str("Deferred(..)"),
            RowCount::Failed(message) => f.debug_tuple("Failed").field(message).finish(),
        }
    }
}

/// Position-tracked iteration over a driver cursor.
///
/// Positions start at `-1`; [`rewind`](Self::rewind) moves to `0` and every
/// [`next`](Self::next) increments by one.
#[derive(Debug)]
pub struct CursorResult {
    cursor: Box<dyn StoreCursor>,
    position: i64,
    current: Option<Record>,
    materialized: bool,
    exhausted: bool,
    row_count: RowCount,
    generated_value: Option<Bson>,
}

impl CursorResult {
    /// Wraps a cursor. The cursor is not touched until the result is first read.
    pub fn new(cursor: Box<dyn StoreCursor>) -> Self {
        Self {
            cursor,
            position: -1,
            current: None,
            materialized: false,
            exhausted: false,
            row_count: RowCount::Store,
            generated_value: None,
        }
    }

    /// Uses a precomputed row count instead of asking the store.
    pub fn with_row_count(mut self, count: u64) -> Self {
        self.row_count = RowCount::Known(count);
        self
    }

    /// Uses a count function, invoked once on the first [`count`](Self::count).
    pub fn with_count_fn(mut self, count: CountFn) -> Self {
        self.row_count = RowCount::Deferred(count);
        self
    }

    /// Attaches the adapter's last generated value at the time of the read.
    pub fn with_generated_value(mut self, value: Option<Bson>) -> Self {
        self.generated_value = value;
        self
    }

    pub fn generated_value(&self) -> Option<&Bson> {
        self.generated_value.as_ref()
    }

    /// Resets to the first document and materializes it.
    ///
    /// # Errors
    ///
    /// Propagates the driver's error when the cursor cannot re-scan (forward-only
    /// cursors that have already advanced).
    pub async fn rewind(&mut self) -> DocumentStoreResult<()> {
        self.cursor.rewind().await?;
        self.position = 0;
        self.exhausted = false;
        self.materialize().await
    }

    /// Advances to the next document and materializes it.
    ///
    /// Does nothing once the result is exhausted.
    pub async fn next(&mut self) -> DocumentStoreResult<()> {
        if !self.materialized {
            self.position = 0;
            return self.materialize().await;
        }
        if self.exhausted {
            return Ok(());
        }
        self.position += 1;
        self.materialize().await
    }

    /// The document at the current position.
    ///
    /// On a result that has not been read yet this positions on the first document.
    /// Returns `None` once the result is exhausted.
    pub async fn current(&mut self) -> DocumentStoreResult<Option<Record>> {
        if !self.materialized {
            self.position = 0;
            self.materialize().await?;
        }
        Ok(self.current.clone())
    }

    /// Whether the current position holds a document.
    pub fn valid(&self) -> bool {
        self.materialized && !self.exhausted
    }

    /// The current position; `-1` before the first read.
    pub fn key(&self) -> i64 {
        self.position
    }

    /// Reads the next record: the first call yields the first document, each later call
    /// the one after. Returns `None` at the end.
    pub async fn next_record(&mut self) -> DocumentStoreResult<Option<Record>> {
        self.next().await?;
        Ok(if self.valid() { self.current.clone() } else { None })
    }

    /// Total number of rows.
    ///
    /// Computed once and cached: from the precomputed value, the count function, or a
    /// store-side count that ignores skip and limit. A count function is invoked at most
    /// once, even when it fails.
    pub async fn count(&mut self) -> DocumentStoreResult<u64> {
        let count = match std::mem::replace(&mut self.row_count, RowCount::Store) {
            RowCount::Known(n) => n,
            RowCount::Deferred(count) => match count().await {
                Ok(n) => n,
                Err(err) => {
                    self.row_count = RowCount::Failed(err.to_string());
                    return Err(err);
                }
            },
            RowCount::Failed(message) => {
                let err = DocumentStoreError::Query(message.clone());
                self.row_count = RowCount::Failed(message);
                return Err(err);
            }
            RowCount::Store => self.cursor.count(false).await?,
        };
        self.row_count = RowCount::Known(count);
        Ok(count)
    }

    /// Skips `n` documents. Zero is a no-op.
    pub fn skip(&mut self, n: u64) -> DocumentStoreResult<()> {
        if n > 0 {
            self.cursor.skip(n)?;
        }
        Ok(())
    }

    /// Caps the number of documents read.
    pub fn limit(&mut self, n: u64) -> DocumentStoreResult<()> {
        self.cursor.limit(n)
    }

    /// Consumes the result as a stream of records. The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = DocumentStoreResult<Record>> + Send {
        stream::unfold(Some(self), |state| async move {
            let mut result = state?;
            match result.next_record().await {
                Ok(Some(record)) => Some((Ok(record), Some(result))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    async fn materialize(&mut self) -> DocumentStoreResult<()> {
        self.materialized = true;
        if self.cursor.advance().await? {
            self.current = Some(Record::from(self.cursor.current()?));
        } else {
            self.current = None;
            self.exhausted = true;
        }
        Ok(())
    }
}

/// The rows of one read, shaped by a row prototype.
#[derive(Debug)]
pub struct ResultSet<M: Model = Record> {
    prototype: M,
    result: CursorResult,
}

impl<M: Model> ResultSet<M> {
    pub fn new(prototype: M, result: CursorResult) -> Self {
        Self { prototype, result }
    }

    /// Returns the next row, or `None` at the end.
    ///
    /// # Errors
    ///
    /// Propagates driver errors and [`Model::exchange_record`] failures.
    pub async fn next_row(&mut self) -> DocumentStoreResult<Option<M>> {
        match self.result.next_record().await? {
            Some(record) => Ok(Some(self.shape(record)?)),
            None => Ok(None),
        }
    }

    /// Total number of rows matched by the read (see [`CursorResult::count`]).
    pub async fn count(&mut self) -> DocumentStoreResult<u64> {
        self.result.count().await
    }

    /// Reads every remaining row.
    pub async fn collect_rows(mut self) -> DocumentStoreResult<Vec<M>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    pub fn into_stream(self) -> impl Stream<Item = DocumentStoreResult<M>> + Send {
        stream::unfold(Some(self), |state| async move {
            let mut set = state?;
            match set.next_row().await {
                Ok(Some(row)) => Some((Ok(row), Some(set))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    pub fn result(&self) -> &CursorResult {
        &self.result
    }

    pub fn result_mut(&mut self) -> &mut CursorResult {
        &mut self.result
    }

    pub fn into_result(self) -> CursorResult {
        self.result
    }

    fn shape(&self, record: Record) -> DocumentStoreResult<M> {
        let mut row = self.prototype.clone();
        row.exchange_record(record)?;
        Ok(row)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::DocumentStoreError;
    use async_trait::async_trait;
    use bson::{Document, doc};
    use futures::{FutureExt, TryStreamExt};
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    /// Cursor over a fixed list of documents.
    #[derive(Debug, Default)]
    pub(crate) struct VecCursor {
        documents: Vec<Document>,
        index: Option<usize>,
        skip: u64,
        limit: u64,
        forward_only: bool,
        counts: Arc<AtomicUsize>,
    }

    impl VecCursor {
        pub(crate) fn new(documents: Vec<Document>) -> Self {
            Self { documents, ..Self::default() }
        }

        fn window(&self) -> Vec<&Document> {
            let rows = self.documents.iter().skip(self.skip as usize);
            if self.limit > 0 {
                rows.take(self.limit as usize).collect()
            } else {
                rows.collect()
            }
        }
    }

    #[async_trait]
    impl StoreCursor for VecCursor {
        fn sort(&mut self, _sort: Document) -> DocumentStoreResult<()> {
            Ok(())
        }

        fn limit(&mut self, limit: u64) -> DocumentStoreResult<()> {
            self.limit = limit;
            Ok(())
        }

        fn skip(&mut self, skip: u64) -> DocumentStoreResult<()> {
            self.skip = skip;
            Ok(())
        }

        async fn advance(&mut self) -> DocumentStoreResult<bool> {
            let next = self.index.map_or(0, |i| i + 1);
            self.index = Some(next);
            Ok(next < self.window().len())
        }

        fn current(&self) -> DocumentStoreResult<Document> {
            self.index
                .and_then(|i| self.window().get(i).map(|d| (*d).clone()))
                .ok_or_else(|| DocumentStoreError::query("cursor is not positioned"))
        }

        async fn rewind(&mut self) -> DocumentStoreResult<()> {
            if self.forward_only && self.index.is_some_and(|i| i > 0) {
                return Err(DocumentStoreError::query("cursor cannot be rewound"));
            }
            self.index = None;
            Ok(())
        }

        async fn count(&mut self, found_only: bool) -> DocumentStoreResult<u64> {
            self.counts.fetch_add(1, Ordering::SeqCst);
            let count = if found_only { self.window().len() } else { self.documents.len() };
            Ok(count as u64)
        }
    }

    fn three_rows() -> Vec<Document> {
        vec![
            doc! { "_id": 1, "name": "a" },
            doc! { "_id": Bson::Null, "name": Bson::Null },
            doc! { "_id": 3, "name": "c" },
        ]
    }

    #[tokio::test]
    async fn test_null_row_does_not_end_iteration() {
        let mut result = CursorResult::new(Box::new(VecCursor::new(three_rows())));
        assert_eq!(result.key(), -1);
        assert!(!result.valid());

        result.rewind().await.unwrap();
        let mut seen = 0;
        while result.valid() {
            assert!(result.current().await.unwrap().is_some());
            seen += 1;
            result.next().await.unwrap();
        }

        assert_eq!(seen, 3);
        assert_eq!(result.key(), 3);
        assert!(!result.valid());
        assert_eq!(result.current().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_current_reads_first_row_lazily() {
        let mut result = CursorResult::new(Box::new(VecCursor::new(three_rows())));

        let first = result.current().await.unwrap().unwrap();
        assert_eq!(first.id(), Some(&Bson::Int32(1)));
        assert_eq!(result.key(), 0);
        assert!(result.valid());
    }

    #[tokio::test]
    async fn test_forward_only_rewind_fails_after_advancing() {
        let cursor = VecCursor { forward_only: true, ..VecCursor::new(three_rows()) };
        let mut result = CursorResult::new(Box::new(cursor));

        result.rewind().await.unwrap();
        result.next().await.unwrap();
        assert!(matches!(result.rewind().await, Err(DocumentStoreError::Query(_))));
    }

    #[tokio::test]
    async fn test_store_count_ignores_skip_and_is_cached() {
        let counts = Arc::new(AtomicUsize::new(0));
        let cursor = VecCursor { counts: counts.clone(), ..VecCursor::new(three_rows()) };
        let mut result = CursorResult::new(Box::new(cursor));

        result.skip(1).unwrap();
        result.limit(1).unwrap();
        assert_eq!(result.count().await.unwrap(), 3);
        assert_eq!(result.count().await.unwrap(), 3);
        assert_eq!(counts.load(Ordering::SeqCst), 1);

        let rows: Vec<Record> = result.into_stream().try_collect().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&Bson::Null));
    }

    #[tokio::test]
    async fn test_count_sources() {
        let mut known = CursorResult::new(Box::new(VecCursor::new(three_rows()))).with_row_count(42);
        assert_eq!(known.count().await.unwrap(), 42);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut deferred = CursorResult::new(Box::new(VecCursor::new(three_rows())))
            .with_count_fn(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<u64, DocumentStoreError>(7) }.boxed()
            }));
        assert_eq!(deferred.count().await.unwrap(), 7);
        assert_eq!(deferred.count().await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_count_fn_is_not_replaced_by_store_count() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let store_counts = Arc::new(AtomicUsize::new(0));
        let cursor = VecCursor { counts: store_counts.clone(), ..VecCursor::new(three_rows()) };
        let mut result = CursorResult::new(Box::new(cursor)).with_count_fn(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<u64, _>(DocumentStoreError::query("count timed out")) }.boxed()
        }));

        assert!(matches!(result.count().await, Err(DocumentStoreError::Query(_))));
        match result.count().await {
            Err(DocumentStoreError::Query(message)) => assert!(message.contains("count timed out")),
            other => panic!("expected the count failure again, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store_counts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_result_set_shapes_rows() {
        let result = CursorResult::new(Box::new(VecCursor::new(three_rows())));
        let rows = ResultSet::new(Record::new(), result).collect_rows().await.unwrap();

        assert_eq!(rows.len(), 3);
        assert!(rows[1].fields().iter().all(|(_, v)| *v == Bson::Null));
    }
}

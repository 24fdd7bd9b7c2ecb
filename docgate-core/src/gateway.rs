//! Table-style CRUD over one collection.
//!
//! A [`Gateway`] binds an [`Adapter`] to one table (collection) name and exposes the
//! familiar table-gateway verbs: select/find/get/find_one for reads, insert/update/
//! delete/save/drop for writes, paging and index management.
//!
//! Filters and orders go through [`QueryTranslator`]; write payloads go through
//! identifier coercion. Every read returns a [`ResultSet`] whose rows are clones of the
//! gateway's row prototype.
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use docgate::prelude::*;
//!
//! let adapter = Arc::new(Adapter::new(InMemoryConnector::new(), AdapterConfig::new("memory://", "music")));
//! let albums = Gateway::new(adapter, "albums")?;
//!
//! let mut album = Record::new().with("artist", "Nina").with("title", "Pastel Blues");
//! albums.save(&mut album).await?;
//!
//! let found = albums.get(album.id().cloned().unwrap()).await?;
//! let mut recent = albums
//!     .find(doc! { "-status": "deleted" }, doc! { "year": "desc" }, Some(10), None)
//!     .await?;
//! ```

use bson::{Bson, Document, doc};
use mea::rwlock::RwLock;
use std::{fmt, future::Future, sync::Arc};
use tracing::{Instrument, debug, debug_span};

use crate::{
    adapter::Adapter,
    coerce::{coerce, coerce_document},
    document::{ID_FIELD, Model, Record},
    driver::{IndexOptions, StoreCollection, UpdateOptions, WriteAck},
    error::{DocumentStoreError, DocumentStoreResult},
    feature::{FeatureSet, Verb},
    page::{CursorPageAdapter, Paginator},
    query::{Filter, IntoFilter, IntoOrder, Order},
    result::{CursorResult, ResultSet},
    translate::QueryTranslator,
};

/// Suffix of the index name used when none is given.
pub const DEFAULT_INDEX_SUFFIX: &str = "TextIndex";

/// CRUD gateway bound to one table.
///
/// # Type Parameters
///
/// * `M` - The row prototype type; [`Record`] unless a typed model is supplied
pub struct Gateway<M: Model = Record> {
    table: String,
    adapter: Arc<Adapter>,
    collection: RwLock<Option<Arc<dyn StoreCollection>>>,
    row_prototype: M,
    features: FeatureSet,
}

impl<M: Model + fmt::Debug> fmt::Debug for Gateway<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("table", &self.table)
            .field("adapter", &self.adapter)
            .field("row_prototype", &self.row_prototype)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

impl Gateway<Record> {
    /// Creates a gateway whose rows are plain [`Record`]s.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Initialization`] when `table` is empty.
    pub fn new(adapter: Arc<Adapter>, table: impl Into<String>) -> DocumentStoreResult<Self> {
        Self::with_prototype(adapter, table, Record::new())
    }
}

impl<M: Model> Gateway<M> {
    /// Creates a gateway that shapes every row by cloning `row_prototype`.
    ///
    /// The collection handle is resolved on first use (or by [`initialize`](Self::initialize)).
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Initialization`] when `table` is empty.
    pub fn with_prototype(
        adapter: Arc<Adapter>,
        table: impl Into<String>,
        row_prototype: M,
    ) -> DocumentStoreResult<Self> {
        let table = table.into();
        if table.is_empty() {
            return Err(DocumentStoreError::Initialization(
                "table name must not be empty".to_string(),
            ));
        }

        Ok(Self {
            table,
            adapter,
            collection: RwLock::new(None),
            row_prototype,
            features: FeatureSet::new(),
        })
    }

    /// Replaces the interceptor set, builder-style.
    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = features;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn adapter(&self) -> &Arc<Adapter> {
        &self.adapter
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// A fresh clone of the row prototype.
    pub fn model(&self) -> M {
        self.row_prototype.clone()
    }

    /// Whether the collection handle has been resolved.
    pub async fn is_initialized(&self) -> bool {
        self.collection.read().await.is_some()
    }

    /// Resolves the collection handle. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns connection errors from the adapter.
    pub async fn initialize(&self) -> DocumentStoreResult<()> {
        self.collection().await.map(|_| ())
    }

    /// The identifier recorded by the most recent write through this table.
    pub async fn last_insert_id(&self) -> Option<Bson> {
        self.adapter.last_generated_value(Some(&self.table)).await
    }

    /// Reads every document matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidInput`] when `filter` is not a mapping, or
    /// the store's error.
    pub async fn select(&self, filter: impl IntoFilter) -> DocumentStoreResult<ResultSet<M>> {
        self.around(Verb::Select, async {
            let filter = filter.into_filter()?;
            let result = self.open(&filter, &Order::new(), None, None).await?;
            Ok(self.result_set(result))
        })
        .await
    }

    /// Reads every document in the table.
    pub async fn fetch_all(&self) -> DocumentStoreResult<ResultSet<M>> {
        self.select(Filter::new()).await
    }

    /// Reads the documents matching `filter`, sorted by `order`, then limited and offset.
    ///
    /// # Arguments
    ///
    /// * `filter` - Match conditions; see [`Filter`]
    /// * `order` - Sort specification; see [`Order`]
    /// * `limit` - Maximum number of rows
    /// * `offset` - Number of leading rows to skip
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidInput`] when `filter` or `order` is not a
    /// mapping, or the store's error.
    pub async fn find(
        &self,
        filter: impl IntoFilter,
        order: impl IntoOrder,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> DocumentStoreResult<ResultSet<M>> {
        self.around(Verb::Find, async {
            let filter = filter.into_filter()?;
            let order = order.into_order()?;
            let result = self.open(&filter, &order, limit, offset).await?;
            Ok(self.result_set(result))
        })
        .await
    }

    /// Reads the document with identifier `id`.
    ///
    /// Returns `None` when no document matches.
    ///
    /// # Errors
    ///
    /// A store rejection of the identifier surfaces as [`DocumentStoreError::Query`].
    pub async fn get(&self, id: impl Into<Bson>) -> DocumentStoreResult<Option<M>> {
        self.around(Verb::Get, async {
            match self.get_record(id.into()).await? {
                Some(record) => self.shape(record).map(Some),
                None => Ok(None),
            }
        })
        .await
    }

    /// Reads the first document matching `filter`, or `None`.
    pub async fn find_one(&self, filter: impl IntoFilter) -> DocumentStoreResult<Option<M>> {
        self.around(Verb::FindOne, async {
            let filter = filter.into_filter()?;
            let mut result = self.open(&filter, &Order::new(), Some(1), None).await?;
            match result.next_record().await? {
                Some(record) => self.shape(record).map(Some),
                None => Ok(None),
            }
        })
        .await
    }

    /// Inserts a document and records its identifier as the table's last generated value.
    ///
    /// The identifier is the one in the payload or, when absent, the one the store
    /// generated. It is returned in [`WriteAck::inserted_id`].
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Query`] with the store's diagnostic when the write
    /// is not acknowledged.
    pub async fn insert(&self, record: impl Into<Record>) -> DocumentStoreResult<WriteAck> {
        self.around(Verb::Insert, self.insert_record(record.into())).await
    }

    /// Sets `record`'s fields on every document matching `filter`.
    ///
    /// The record's identifier is never part of the update payload. When it has one, it
    /// is recorded as the table's last generated value.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidInput`] when `filter` is not a mapping and
    /// [`DocumentStoreError::Query`] when the write is not acknowledged.
    pub async fn update(
        &self,
        record: impl Into<Record>,
        filter: impl IntoFilter,
    ) -> DocumentStoreResult<WriteAck> {
        self.around(Verb::Update, async {
            let filter = filter.into_filter()?;
            self.update_record(record.into(), &filter).await
        })
        .await
    }

    /// Removes every document matching `filter`.
    ///
    /// Returns whether the store acknowledged the removal.
    pub async fn delete(&self, filter: impl IntoFilter) -> DocumentStoreResult<bool> {
        self.around(Verb::Delete, async {
            let filter = filter.into_filter()?;
            let query = QueryTranslator::new().translate_filter(&filter);
            debug!(table = %self.table, query = ?query, "remove");

            let ack = self.collection().await?.remove(query).await?;
            self.adapter.store_last_generated_value(&self.table, None).await;
            Ok(ack.acknowledged)
        })
        .await
    }

    /// Drops the whole collection.
    pub async fn drop(&self) -> DocumentStoreResult<bool> {
        self.around(Verb::Drop, async {
            StoreCollection::drop(&*self.collection().await?).await?;
            self.adapter.store_last_generated_value(&self.table, None).await;
            Ok(true)
        })
        .await
    }

    /// Inserts or updates `record` depending on whether it carries an identifier.
    ///
    /// - Without an identifier the record is inserted and the new identifier is written
    ///   back into `record`.
    /// - With one, the document must already exist; its fields are then updated.
    ///
    /// The existence check and the update are separate round-trips, so concurrent saves
    /// of the same identifier may interleave.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Consistency`] when the identifier does not exist.
    pub async fn save(&self, record: &mut Record) -> DocumentStoreResult<WriteAck> {
        self.around(Verb::Save, async {
            if !record.has_id() {
                let ack = self.insert_record(record.clone()).await?;
                record.set_id(ack.inserted_id.clone());
                return Ok(ack);
            }

            let id = record.id().cloned().unwrap_or(Bson::Null);
            if self.get_record(id.clone()).await?.is_none() {
                return Err(DocumentStoreError::Consistency(
                    "model id does not exist".to_string(),
                ));
            }

            let filter = Filter::new().eq(ID_FIELD, id);
            self.update_record(record.clone(), &filter).await
        })
        .await
    }

    /// Builds a paginator over the documents matching `filter`, sorted by `order`.
    ///
    /// Nothing is read until a page is requested.
    pub async fn get_pages(
        &self,
        filter: impl IntoFilter,
        order: impl IntoOrder,
    ) -> DocumentStoreResult<Paginator<CursorPageAdapter<M>>> {
        self.around(Verb::GetPages, async {
            let filter = filter.into_filter()?;
            let order = order.into_order()?;

            let mut translator = QueryTranslator::new();
            let query = translator.translate_filter(&filter);
            let sort = translator.translate_order(&order);

            let source = CursorPageAdapter::new(
                self.collection().await?,
                query,
                sort,
                self.row_prototype.clone(),
            );
            Ok(Paginator::new(source))
        })
        .await
    }

    /// Creates an index over `keys`, named `name` or `"<table>TextIndex"`.
    pub async fn create_index(&self, keys: Document, name: Option<&str>) -> DocumentStoreResult<()> {
        self.around(Verb::CreateIndex, async {
            let name = name.map_or_else(|| self.default_index_name(), str::to_string);
            self.collection()
                .await?
                .ensure_index(keys, IndexOptions::named(name))
                .await
        })
        .await
    }

    /// Drops every existing index, then creates `"<table>TextIndex"` over `keys`.
    pub async fn ensure_index(&self, keys: Document) -> DocumentStoreResult<()> {
        self.around(Verb::EnsureIndex, async {
            let collection = self.collection().await?;
            collection.delete_indexes().await?;
            collection
                .ensure_index(keys, IndexOptions::named(self.default_index_name()))
                .await
        })
        .await
    }

    /// Drops every existing index, then creates each `(name, keys)` pair.
    pub async fn create_indexes(
        &self,
        indexes: impl IntoIterator<Item = (String, Document)>,
    ) -> DocumentStoreResult<()> {
        self.around(Verb::CreateIndexes, async {
            let collection = self.collection().await?;
            collection.delete_indexes().await?;
            for (name, keys) in indexes {
                collection.ensure_index(keys, IndexOptions::named(name)).await?;
            }
            Ok(())
        })
        .await
    }

    /// Drops one index by name.
    pub async fn drop_index(&self, name: &str) -> DocumentStoreResult<()> {
        self.around(Verb::DropIndex, async {
            self.collection().await?.delete_index(name).await
        })
        .await
    }

    /// Drops every index.
    pub async fn drop_indexes(&self) -> DocumentStoreResult<()> {
        self.around(Verb::DropIndexes, async {
            self.collection().await?.delete_indexes().await
        })
        .await
    }

    async fn around<T, F>(&self, verb: Verb, operation: F) -> DocumentStoreResult<T>
    where
        F: Future<Output = DocumentStoreResult<T>>,
    {
        let span = debug_span!("gateway", table = %self.table, verb = %verb);
        async {
            self.features.pre(verb, &self.table)?;
            let outcome = operation.await;
            if let Err(err) = &outcome {
                debug!(error = %err, "gateway verb failed");
            }
            self.features.post(verb, &self.table, outcome.is_ok());
            outcome
        }
        .instrument(span)
        .await
    }

    async fn collection(&self) -> DocumentStoreResult<Arc<dyn StoreCollection>> {
        let existing = self.collection.read().await.clone();
        if let Some(collection) = existing {
            return Ok(collection);
        }

        let mut guard = self.collection.write().await;
        if let Some(collection) = guard.as_ref() {
            return Ok(collection.clone());
        }

        let connection = self.adapter.connection().await?;
        let collection = connection.select_collection(&self.table).await?;
        debug!(table = %self.table, database = %connection.database(), "collection resolved");
        *guard = Some(collection.clone());
        Ok(collection)
    }

    async fn open(
        &self,
        filter: &Filter,
        order: &Order,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> DocumentStoreResult<CursorResult> {
        let mut translator = QueryTranslator::new();
        let query = translator.translate_filter(filter);
        let sort = translator.translate_order(order);
        debug!(table = %self.table, query = ?query, sort = ?sort, ?limit, ?offset, "find");

        let mut cursor = self.collection().await?.find(query).await?;
        if !sort.is_empty() {
            cursor.sort(sort)?;
        }
        if let Some(limit) = limit {
            cursor.limit(limit)?;
        }

        let generated = self.adapter.last_generated_value(Some(&self.table)).await;
        let mut result = CursorResult::new(cursor).with_generated_value(generated);
        if let Some(offset) = offset {
            result.skip(offset)?;
        }
        Ok(result)
    }

    async fn get_record(&self, id: Bson) -> DocumentStoreResult<Option<Record>> {
        let filter = Filter::new().eq(ID_FIELD, id);
        let lookup = async {
            let mut result = self.open(&filter, &Order::new(), Some(1), None).await?;
            result.next_record().await
        };

        lookup.await.map_err(|err| match err {
            DocumentStoreError::Query(message) => {
                DocumentStoreError::Query(format!("invalid identifier: {message}"))
            }
            other => other,
        })
    }

    async fn insert_record(&self, mut record: Record) -> DocumentStoreResult<WriteAck> {
        if !record.has_id() {
            record.set_id(None);
        }
        let document = coerce_document(record.into_document());
        let payload_id = document.get(ID_FIELD).cloned();
        debug!(table = %self.table, document = ?document, "insert");

        let collection = self.collection().await?;
        let ack = collection.insert(document).await?;
        self.check_acknowledged(&ack).await?;

        let id = payload_id.or_else(|| ack.inserted_id.clone());
        self.adapter
            .store_last_generated_value(&self.table, id.clone())
            .await;

        Ok(WriteAck { inserted_id: id, ..ack })
    }

    async fn update_record(&self, record: Record, filter: &Filter) -> DocumentStoreResult<WriteAck> {
        let recorded_id = if record.has_id() { record.id().cloned() } else { None };
        let (_, fields) = record.into_parts();
        let query = QueryTranslator::new().translate_filter(filter);
        let update = doc! { "$set": coerce_document(fields) };
        debug!(table = %self.table, query = ?query, update = ?update, "update");

        let collection = self.collection().await?;
        let ack = collection
            .update(query, update, UpdateOptions { multiple: true })
            .await?;
        self.check_acknowledged(&ack).await?;

        if let Some(id) = recorded_id {
            self.adapter
                .store_last_generated_value(&self.table, Some(coerce(id)))
                .await;
        }
        Ok(ack)
    }

    async fn check_acknowledged(&self, ack: &WriteAck) -> DocumentStoreResult<()> {
        if ack.acknowledged {
            return Ok(());
        }
        let diagnostic = self
            .adapter
            .connection()
            .await?
            .last_error()
            .unwrap_or_else(|| "write was not acknowledged".to_string());
        Err(DocumentStoreError::Query(diagnostic))
    }

    fn default_index_name(&self) -> String {
        format!("{}{}", self.table, DEFAULT_INDEX_SUFFIX)
    }

    fn shape(&self, record: Record) -> DocumentStoreResult<M> {
        let mut row = self.row_prototype.clone();
        row.exchange_record(record)?;
        Ok(row)
    }

    fn result_set(&self, result: CursorResult) -> ResultSet<M> {
        ResultSet::new(self.row_prototype.clone(), result)
    }
}

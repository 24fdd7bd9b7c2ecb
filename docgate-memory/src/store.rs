//! In-memory implementation of the driver boundary.
//!
//! Databases and collections live in one shared map behind an async-aware read-write
//! lock. Every connection opened by the same [`InMemoryConnector`] (or a clone of it)
//! sees the same data.

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tracing::{debug, warn};

use docgate_core::{
    driver::{
        ConnectionParams, IndexOptions, StoreCollection, StoreConnection, StoreConnector,
        StoreCursor, UpdateOptions, WriteAck,
    },
    error::{DocumentStoreError, DocumentStoreResult},
};

use crate::evaluator::{Comparable, DocumentEvaluator, apply_update, compare_by};

/// Connection string scheme accepted by [`InMemoryConnector`].
pub const MEMORY_SCHEME: &str = "memory://";

/// Name of the index every collection carries on `_id`.
pub const ID_INDEX_NAME: &str = "_id_";

#[derive(Debug, Default)]
struct CollectionState {
    documents: Vec<Document>,
    indexes: Vec<String>,
}

type DatabaseMap = HashMap<String, CollectionState>;
type StoreMap = HashMap<String, DatabaseMap>;
type Shared = Arc<RwLock<StoreMap>>;
type LastError = Arc<Mutex<Option<String>>>;

/// Connector for the in-memory store.
///
/// Accepts connection strings starting with `memory://`; anything else is refused with a
/// connection error, which makes it easy to exercise connection failures in tests.
///
/// # Example
///
/// ```ignore
/// use docgate::memory::InMemoryConnector;
///
/// let connector = InMemoryConnector::builder().forward_only(true).build();
/// let adapter = Adapter::new(connector.clone(), AdapterConfig::new("memory://", "music"));
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryConnector {
    store: Shared,
    forward_only: bool,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryConnectorBuilder {
        InMemoryConnectorBuilder::default()
    }

    /// Copies of every document in a collection, in insertion order.
    pub async fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        self.store
            .read()
            .await
            .get(database)
            .and_then(|db| db.get(collection))
            .map(|state| state.documents.clone())
            .unwrap_or_default()
    }

    /// Names of a collection's indexes, `_id_` first.
    pub async fn index_names(&self, database: &str, collection: &str) -> Vec<String> {
        let store = self.store.read().await;
        match store.get(database).and_then(|db| db.get(collection)) {
            Some(state) => std::iter::once(ID_INDEX_NAME.to_string())
                .chain(state.indexes.iter().cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Names of the collections that exist in `database`.
    pub async fn collection_names(&self, database: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .store
            .read()
            .await
            .get(database)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

#[async_trait]
impl StoreConnector for InMemoryConnector {
    async fn connect(
        &self,
        params: &ConnectionParams,
    ) -> DocumentStoreResult<Arc<dyn StoreConnection>> {
        if !params.dsn.starts_with(MEMORY_SCHEME) {
            return Err(DocumentStoreError::connection(
                format!("unsupported connection string: {}", params.dsn),
                None,
            ));
        }

        Ok(Arc::new(InMemoryConnection {
            store: self.store.clone(),
            database: params.database.clone(),
            forward_only: self.forward_only,
            last_error: LastError::default(),
        }))
    }
}

/// Builder for [`InMemoryConnector`].
#[derive(Default, Debug)]
pub struct InMemoryConnectorBuilder {
    forward_only: bool,
}

impl InMemoryConnectorBuilder {
    /// Makes every cursor refuse to rewind once it has moved past its first document,
    /// like a network cursor that cannot re-scan.
    pub fn forward_only(mut self, forward_only: bool) -> Self {
        self.forward_only = forward_only;
        self
    }

    pub fn build(self) -> InMemoryConnector {
        InMemoryConnector {
            store: Shared::default(),
            forward_only: self.forward_only,
        }
    }
}

/// An open connection to one in-memory database.
#[derive(Debug)]
pub struct InMemoryConnection {
    store: Shared,
    database: String,
    forward_only: bool,
    last_error: LastError,
}

#[async_trait]
impl StoreConnection for InMemoryConnection {
    fn database(&self) -> &str {
        &self.database
    }

    async fn select_collection(&self, name: &str) -> DocumentStoreResult<Arc<dyn StoreCollection>> {
        Ok(Arc::new(InMemoryCollection {
            store: self.store.clone(),
            database: self.database.clone(),
            name: name.to_string(),
            forward_only: self.forward_only,
            last_error: self.last_error.clone(),
        }))
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|guard| guard.clone())
    }
}

/// Handle on one in-memory collection. The collection is created by its first write.
#[derive(Debug)]
pub struct InMemoryCollection {
    store: Shared,
    database: String,
    name: String,
    forward_only: bool,
    last_error: LastError,
}

impl InMemoryCollection {
    fn fail(&self, err: DocumentStoreError) -> DocumentStoreError {
        warn!(collection = %self.name, error = %err, "in-memory operation failed");
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = Some(err.to_string());
        }
        err
    }

    fn succeed(&self) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = None;
        }
    }

    /// Indexes of the documents matching `query`.
    fn matching(documents: &[Document], query: &Document) -> DocumentStoreResult<Vec<usize>> {
        let mut positions = Vec::new();
        for (position, document) in documents.iter().enumerate() {
            if DocumentEvaluator::new(document).matches(query)? {
                positions.push(position);
            }
        }
        Ok(positions)
    }
}

#[async_trait]
impl StoreCollection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, query: Document) -> DocumentStoreResult<Box<dyn StoreCursor>> {
        Ok(Box::new(InMemoryCursor {
            store: self.store.clone(),
            database: self.database.clone(),
            collection: self.name.clone(),
            query,
            sort: Document::new(),
            skip: 0,
            limit: 0,
            snapshot: None,
            index: None,
            forward_only: self.forward_only,
        }))
    }

    async fn insert(&self, document: Document) -> DocumentStoreResult<WriteAck> {
        let id = document
            .get("_id")
            .cloned()
            .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));

        let mut stored = Document::new();
        stored.insert("_id", id.clone());
        for (key, value) in document {
            if key != "_id" {
                stored.insert(key, value);
            }
        }

        let mut store = self.store.write().await;
        let state = store
            .entry(self.database.clone())
            .or_default()
            .entry(self.name.clone())
            .or_default();

        let duplicate = state
            .documents
            .iter()
            .any(|existing| existing.get("_id").map(Comparable::from) == Some(Comparable::from(&id)));
        if duplicate {
            return Err(self.fail(DocumentStoreError::query(format!(
                "E11000 duplicate key error collection: {}.{} dup key: {{ _id: {} }}",
                self.database, self.name, id
            ))));
        }

        state.documents.push(stored);
        self.succeed();
        Ok(WriteAck::acknowledged(1).with_inserted_id(id))
    }

    async fn update(
        &self,
        query: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<WriteAck> {
        let mut store = self.store.write().await;
        let Some(state) = store
            .get_mut(&self.database)
            .and_then(|db| db.get_mut(&self.name))
        else {
            self.succeed();
            return Ok(WriteAck::acknowledged(0));
        };

        let mut positions =
            Self::matching(&state.documents, &query).map_err(|err| self.fail(err))?;
        if !options.multiple {
            positions.truncate(1);
        }

        for &position in &positions {
            apply_update(&mut state.documents[position], &update).map_err(|err| self.fail(err))?;
        }

        debug!(collection = %self.name, affected = positions.len(), "documents updated");
        self.succeed();
        Ok(WriteAck::acknowledged(positions.len() as u64))
    }

    async fn remove(&self, query: Document) -> DocumentStoreResult<WriteAck> {
        let mut store = self.store.write().await;
        let Some(state) = store
            .get_mut(&self.database)
            .and_then(|db| db.get_mut(&self.name))
        else {
            self.succeed();
            return Ok(WriteAck::acknowledged(0));
        };

        let positions = Self::matching(&state.documents, &query).map_err(|err| self.fail(err))?;
        for &position in positions.iter().rev() {
            state.documents.remove(position);
        }

        debug!(collection = %self.name, removed = positions.len(), "documents removed");
        self.succeed();
        Ok(WriteAck::acknowledged(positions.len() as u64))
    }

    async fn drop(&self) -> DocumentStoreResult<()> {
        if let Some(db) = self.store.write().await.get_mut(&self.database) {
            db.remove(&self.name);
        }
        self.succeed();
        Ok(())
    }

    async fn ensure_index(&self, keys: Document, options: IndexOptions) -> DocumentStoreResult<()> {
        if keys.is_empty() {
            return Err(self.fail(DocumentStoreError::query("index keys must not be empty")));
        }
        let name = options.name.unwrap_or_else(|| {
            keys.iter()
                .map(|(field, kind)| match kind {
                    Bson::String(s) => format!("{field}_{s}"),
                    Bson::Int32(n) => format!("{field}_{n}"),
                    Bson::Int64(n) => format!("{field}_{n}"),
                    other => format!("{field}_{other}"),
                })
                .collect::<Vec<_>>()
                .join("_")
        });

        let mut store = self.store.write().await;
        let state = store
            .entry(self.database.clone())
            .or_default()
            .entry(self.name.clone())
            .or_default();
        if !state.indexes.contains(&name) {
            state.indexes.push(name);
        }
        self.succeed();
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let state = store
            .get_mut(&self.database)
            .and_then(|db| db.get_mut(&self.name));

        match state {
            Some(state) if state.indexes.iter().any(|index| index == name) => {
                state.indexes.retain(|index| index != name);
                self.succeed();
                Ok(())
            }
            _ => Err(self.fail(DocumentStoreError::query(format!(
                "index not found with name [{name}]"
            )))),
        }
    }

    async fn delete_indexes(&self) -> DocumentStoreResult<()> {
        if let Some(state) = self
            .store
            .write()
            .await
            .get_mut(&self.database)
            .and_then(|db| db.get_mut(&self.name))
        {
            state.indexes.clear();
        }
        self.succeed();
        Ok(())
    }
}

/// Lazy cursor over an in-memory collection.
///
/// The query runs on the first [`advance`](StoreCursor::advance) against a snapshot of
/// the collection; rewinding discards the snapshot so the next pass sees fresh data.
#[derive(Debug)]
pub struct InMemoryCursor {
    store: Shared,
    database: String,
    collection: String,
    query: Document,
    sort: Document,
    skip: u64,
    limit: u64,
    snapshot: Option<Vec<Document>>,
    index: Option<usize>,
    forward_only: bool,
}

impl InMemoryCursor {
    fn ensure_not_started(&self) -> DocumentStoreResult<()> {
        if self.index.is_some() {
            return Err(DocumentStoreError::query("cannot modify cursor after beginning iteration"));
        }
        Ok(())
    }

    async fn matched(&self) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(state) = store
            .get(&self.database)
            .and_then(|db| db.get(&self.collection))
        else {
            return Ok(Vec::new());
        };

        Ok(DocumentEvaluator::filter_documents(&state.documents, &self.query)?
            .into_iter()
            .cloned()
            .collect())
    }

    async fn run(&self) -> DocumentStoreResult<Vec<Document>> {
        let mut documents = self.matched().await?;
        if !self.sort.is_empty() {
            documents.sort_by(|a, b| compare_by(&self.sort, a, b));
        }

        let rows = documents.into_iter().skip(self.skip as usize);
        Ok(if self.limit > 0 {
            rows.take(self.limit as usize).collect()
        } else {
            rows.collect()
        })
    }
}

#[async_trait]
impl StoreCursor for InMemoryCursor {
    fn sort(&mut self, sort: Document) -> DocumentStoreResult<()> {
        self.ensure_not_started()?;
        self.sort = sort;
        Ok(())
    }

    fn limit(&mut self, limit: u64) -> DocumentStoreResult<()> {
        self.ensure_not_started()?;
        self.limit = limit;
        Ok(())
    }

    fn skip(&mut self, skip: u64) -> DocumentStoreResult<()> {
        self.ensure_not_started()?;
        self.skip = skip;
        Ok(())
    }

    async fn advance(&mut self) -> DocumentStoreResult<bool> {
        if self.snapshot.is_none() {
            self.snapshot = Some(self.run().await?);
        }
        let len = self.snapshot.as_ref().map_or(0, Vec::len);

        let next = self.index.map_or(0, |i| i.saturating_add(1)).min(len);
        self.index = Some(next);
        Ok(next < len)
    }

    fn current(&self) -> DocumentStoreResult<Document> {
        match (&self.snapshot, self.index) {
            (Some(rows), Some(index)) => rows
                .get(index)
                .cloned()
                .ok_or_else(|| DocumentStoreError::query("cursor is exhausted")),
            _ => Err(DocumentStoreError::query("cursor has not been advanced")),
        }
    }

    async fn rewind(&mut self) -> DocumentStoreResult<()> {
        if self.forward_only && self.index.is_some_and(|i| i > 0) {
            return Err(DocumentStoreError::query(
                "cursor cannot be rewound after advancing past the first document",
            ));
        }
        self.snapshot = None;
        self.index = None;
        Ok(())
    }

    async fn count(&mut self, found_only: bool) -> DocumentStoreResult<u64> {
        let total = self.matched().await?.len() as u64;
        if !found_only {
            return Ok(total);
        }

        let remaining = total.saturating_sub(self.skip);
        Ok(if self.limit > 0 { remaining.min(self.limit) } else { remaining })
    }
}

//! Wire-driver boundary.
//!
//! These traits are the only thing a gateway knows about the store. A driver crate
//! implements them over a real client (see `docgate-mongodb`) or over process memory
//! (see `docgate-memory`), and the gateway stays unaware of which one it is talking to.
//!
//! # Traits
//!
//! - [`StoreConnector`]: Factory that opens a connection from [`ConnectionParams`]
//! - [`StoreConnection`]: An open connection bound to one database
//! - [`StoreCollection`]: A handle on one named collection
//! - [`StoreCursor`]: A lazily evaluated result stream over a native query
//!
//! All traits are object safe; the gateway holds them as `Arc<dyn ...>` / `Box<dyn ...>`.
//!
//! # Examples
//!
//! ```ignore
//! use docgate::driver::{StoreConnector, ConnectionParams};
//! use bson::doc;
//!
//! let connection = connector.connect(&ConnectionParams::new("memory://", "music")).await?;
//! let albums = connection.select_collection("albums").await?;
//! let mut cursor = albums.find(doc! { "artist": "Nina" }).await?;
//! while cursor.advance().await? {
//!     println!("{:?}", cursor.current()?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use std::{fmt::Debug, sync::Arc};

use crate::error::DocumentStoreResult;

/// Everything a driver needs to open a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Driver-specific connection string.
    pub dsn: String,
    /// Database the connection is bound to.
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectionParams {
    pub fn new(dsn: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            database: database.into(),
            username: None,
            password: None,
        }
    }

    /// Sets the credentials, builder-style.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

/// Acknowledgement returned by every write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteAck {
    /// Whether the store confirmed the write.
    pub acknowledged: bool,
    /// Number of documents inserted, modified or removed.
    pub affected: u64,
    /// Identifier the store generated for an insert, if any.
    pub inserted_id: Option<Bson>,
}

impl WriteAck {
    /// An acknowledged write touching `affected` documents.
    pub fn acknowledged(affected: u64) -> Self {
        Self {
            acknowledged: true,
            affected,
            inserted_id: None,
        }
    }

    /// Attaches a generated identifier, builder-style.
    pub fn with_inserted_id(mut self, id: Bson) -> Self {
        self.inserted_id = Some(id);
        self
    }
}

/// Options for [`StoreCollection::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Apply the update to every matching document rather than the first one.
    pub multiple: bool,
}

/// Options for [`StoreCollection::ensure_index`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Index name. Drivers fall back to the store's own naming when `None`.
    pub name: Option<String>,
}

impl IndexOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()) }
    }
}

/// Factory for [`StoreConnection`]s.
///
/// Connecting is the only place a driver may fail with
/// [`DocumentStoreError::Connection`](crate::error::DocumentStoreError::Connection).
#[async_trait]
pub trait StoreConnector: Send + Sync + Debug {
    /// Opens a connection.
    ///
    /// # Arguments
    ///
    /// * `params` - Connection string, database name and optional credentials
    ///
    /// # Errors
    ///
    /// Returns a connection error carrying the driver's message and code.
    async fn connect(&self, params: &ConnectionParams)
    -> DocumentStoreResult<Arc<dyn StoreConnection>>;
}

/// An open connection bound to one database.
#[async_trait]
pub trait StoreConnection: Send + Sync + Debug {
    /// Name of the database this connection is bound to.
    fn database(&self) -> &str;

    /// Returns a handle on the named collection. The collection need not exist yet.
    async fn select_collection(&self, name: &str) -> DocumentStoreResult<Arc<dyn StoreCollection>>;

    /// The diagnostic for the most recent failed operation on this connection, if any.
    ///
    /// Gateways use it to explain unacknowledged writes.
    fn last_error(&self) -> Option<String>;

    /// Releases the connection's resources. The default implementation does nothing.
    async fn shutdown(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

/// A handle on one named collection.
///
/// Every query and update document handed to these methods is already in the store's
/// native form (see [`QueryTranslator`](crate::translate::QueryTranslator)).
#[async_trait]
pub trait StoreCollection: Send + Sync + Debug {
    /// Collection name.
    fn name(&self) -> &str;

    /// Opens a lazy cursor over the documents matching `query`.
    ///
    /// Nothing is read until the cursor is first advanced, so sort/limit/skip can still
    /// be applied to the returned cursor.
    async fn find(&self, query: Document) -> DocumentStoreResult<Box<dyn StoreCursor>>;

    /// Inserts a document. The store generates `_id` when the document carries none.
    async fn insert(&self, document: Document) -> DocumentStoreResult<WriteAck>;

    /// Applies an update document (`{ "$set": ... }`) to matching documents.
    ///
    /// # Arguments
    ///
    /// * `query` - Native where-clause
    /// * `update` - Native update document
    /// * `options` - Whether to update all matches or only the first
    async fn update(
        &self,
        query: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<WriteAck>;

    /// Removes every document matching `query`.
    async fn remove(&self, query: Document) -> DocumentStoreResult<WriteAck>;

    /// Drops the collection and all of its documents and indexes.
    async fn drop(&self) -> DocumentStoreResult<()>;

    /// Creates an index over `keys` (`{ field: 1 | -1 | "text" }`) if it does not exist.
    async fn ensure_index(&self, keys: Document, options: IndexOptions) -> DocumentStoreResult<()>;

    /// Drops one index by name.
    async fn delete_index(&self, name: &str) -> DocumentStoreResult<()>;

    /// Drops every index except the store's mandatory ones.
    async fn delete_indexes(&self) -> DocumentStoreResult<()>;
}

/// A lazily evaluated, forward-moving result stream.
///
/// A fresh cursor is positioned before its first document. `sort`, `limit` and `skip`
/// may only be applied before the first [`advance`](StoreCursor::advance); drivers reject
/// them afterwards.
#[async_trait]
pub trait StoreCursor: Send + Debug {
    /// Applies a native sort specification.
    fn sort(&mut self, sort: Document) -> DocumentStoreResult<()>;

    /// Caps the number of documents returned. `0` means no limit.
    fn limit(&mut self, limit: u64) -> DocumentStoreResult<()>;

    /// Skips the first `skip` matching documents.
    fn skip(&mut self, skip: u64) -> DocumentStoreResult<()>;

    /// Moves to the next document. Returns `false` once the stream is exhausted.
    async fn advance(&mut self) -> DocumentStoreResult<bool>;

    /// The document at the current position.
    ///
    /// # Errors
    ///
    /// Returns a query error when the cursor is not positioned on a document.
    fn current(&self) -> DocumentStoreResult<Document>;

    /// Resets the cursor to before its first document.
    ///
    /// # Errors
    ///
    /// Forward-only drivers return a query error once iteration has begun.
    async fn rewind(&mut self) -> DocumentStoreResult<()>;

    /// Number of documents the query matches.
    ///
    /// With `found_only`, skip and limit are taken into account.
    async fn count(&mut self, found_only: bool) -> DocumentStoreResult<u64>;
}

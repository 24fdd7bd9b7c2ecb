use async_trait::async_trait;
use bson::{Document, doc};
use mongodb::{
    Client, Collection, Cursor, Database, IndexModel,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, CountOptions, Credential, FindOptions, IndexOptions as MongoIndexOptions},
};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use docgate_core::{
    driver::{
        ConnectionParams, IndexOptions, StoreCollection, StoreConnection, StoreConnector,
        StoreCursor, UpdateOptions, WriteAck,
    },
    error::{DocumentStoreError, DocumentStoreResult},
};

type LastError = Arc<Mutex<Option<String>>>;

/// Server error code carried by a driver error, if any.
pub fn error_code(err: &MongoError) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        ErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
        ErrorKind::Write(WriteFailure::WriteConcernError(concern)) => Some(concern.code),
        _ => None,
    }
}

/// Server code for a collection or database that does not exist.
pub const NAMESPACE_NOT_FOUND: i32 = 26;

fn is_missing_namespace(err: &MongoError) -> bool {
    error_code(err) == Some(NAMESPACE_NOT_FOUND)
}

/// Driver limit for a cursor limit; `0` means none. Saturates instead of wrapping
/// into the negative "single batch" range.
fn native_limit(limit: u64) -> Option<i64> {
    (limit > 0).then(|| i64::try_from(limit).unwrap_or(i64::MAX))
}

fn connection_error(err: MongoError) -> DocumentStoreError {
    DocumentStoreError::connection(err.to_string(), error_code(&err))
}

/// Connector for MongoDB servers.
///
/// Parses the connection string, applies credentials when both a username and a
/// password are configured, and pings the server so connection failures surface at
/// connect time.
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoConnector;

impl MongoConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StoreConnector for MongoConnector {
    async fn connect(
        &self,
        params: &ConnectionParams,
    ) -> DocumentStoreResult<Arc<dyn StoreConnection>> {
        let mut options = ClientOptions::parse(&params.dsn)
            .await
            .map_err(connection_error)?;

        if let (Some(username), Some(password)) = (&params.username, &params.password) {
            options.credential = Some(
                Credential::builder()
                    .username(username.clone())
                    .password(password.clone())
                    .source(params.database.clone())
                    .build(),
            );
        }

        let client = Client::with_options(options).map_err(connection_error)?;
        let database = client.database(&params.database);
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(connection_error)?;

        info!(database = %params.database, "connected to mongodb");
        Ok(Arc::new(MongoConnection {
            client,
            database,
            last_error: LastError::default(),
        }))
    }
}

/// An open MongoDB connection bound to one database.
#[derive(Debug)]
pub struct MongoConnection {
    client: Client,
    database: Database,
    last_error: LastError,
}

#[async_trait]
impl StoreConnection for MongoConnection {
    fn database(&self) -> &str {
        self.database.name()
    }

    async fn select_collection(&self, name: &str) -> DocumentStoreResult<Arc<dyn StoreCollection>> {
        Ok(Arc::new(MongoCollection {
            name: name.to_string(),
            collection: self.database.collection::<Document>(name),
            last_error: self.last_error.clone(),
        }))
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|guard| guard.clone())
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}

/// Handle on one MongoDB collection.
#[derive(Debug)]
pub struct MongoCollection {
    name: String,
    collection: Collection<Document>,
    last_error: LastError,
}

impl MongoCollection {
    fn fail(&self, err: MongoError) -> DocumentStoreError {
        warn!(collection = %self.name, error = %err, "mongodb operation failed");
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = Some(err.to_string());
        }
        DocumentStoreError::query(err)
    }

    fn succeed(&self) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = None;
        }
    }
}

#[async_trait]
impl StoreCollection for MongoCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, query: Document) -> DocumentStoreResult<Box<dyn StoreCursor>> {
        Ok(Box::new(MongoCursor {
            collection: self.collection.clone(),
            query,
            options: FindOptions::default(),
            cursor: None,
            current: None,
        }))
    }

    async fn insert(&self, document: Document) -> DocumentStoreResult<WriteAck> {
        let result = self
            .collection
            .insert_one(document)
            .await
            .map_err(|err| self.fail(err))?;

        self.succeed();
        Ok(WriteAck::acknowledged(1).with_inserted_id(result.inserted_id))
    }

    async fn update(
        &self,
        query: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<WriteAck> {
        let result = if options.multiple {
            self.collection.update_many(query, update).await
        } else {
            self.collection.update_one(query, update).await
        }
        .map_err(|err| self.fail(err))?;

        debug!(collection = %self.name, matched = result.matched_count, "documents updated");
        self.succeed();
        Ok(WriteAck::acknowledged(result.matched_count))
    }

    async fn remove(&self, query: Document) -> DocumentStoreResult<WriteAck> {
        let result = self
            .collection
            .delete_many(query)
            .await
            .map_err(|err| self.fail(err))?;

        self.succeed();
        Ok(WriteAck::acknowledged(result.deleted_count))
    }

    async fn drop(&self) -> DocumentStoreResult<()> {
        self.collection.drop().await.map_err(|err| self.fail(err))?;
        self.succeed();
        Ok(())
    }

    async fn ensure_index(&self, keys: Document, options: IndexOptions) -> DocumentStoreResult<()> {
        let mut index_options = MongoIndexOptions::default();
        index_options.name = options.name;

        self.collection
            .create_index(
                IndexModel::builder()
                    .keys(keys)
                    .options(index_options)
                    .build(),
            )
            .await
            .map_err(|err| self.fail(err))?;

        self.succeed();
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> DocumentStoreResult<()> {
        self.collection
            .drop_index(name)
            .await
            .map_err(|err| self.fail(err))?;

        self.succeed();
        Ok(())
    }

    async fn delete_indexes(&self) -> DocumentStoreResult<()> {
        match self.collection.drop_indexes().await {
            Ok(()) => {}
            Err(err) if is_missing_namespace(&err) => {
                debug!(collection = %self.name, "collection does not exist; no indexes to drop");
            }
            Err(err) => return Err(self.fail(err)),
        }

        self.succeed();
        Ok(())
    }
}

/// Lazy cursor over a MongoDB query.
///
/// The server-side cursor is opened on the first advance with the sort, skip and limit
/// collected so far. Rewinding closes it; the next advance re-runs the query.
#[derive(Debug)]
pub struct MongoCursor {
    collection: Collection<Document>,
    query: Document,
    options: FindOptions,
    cursor: Option<Cursor<Document>>,
    current: Option<Document>,
}

impl MongoCursor {
    fn ensure_not_started(&self) -> DocumentStoreResult<()> {
        if self.cursor.is_some() {
            return Err(DocumentStoreError::query("cannot modify cursor after beginning iteration"));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreCursor for MongoCursor {
    fn sort(&mut self, sort: Document) -> DocumentStoreResult<()> {
        self.ensure_not_started()?;
        self.options.sort = (!sort.is_empty()).then_some(sort);
        Ok(())
    }

    fn limit(&mut self, limit: u64) -> DocumentStoreResult<()> {
        self.ensure_not_started()?;
        self.options.limit = native_limit(limit);
        Ok(())
    }

    fn skip(&mut self, skip: u64) -> DocumentStoreResult<()> {
        self.ensure_not_started()?;
        self.options.skip = (skip > 0).then_some(skip);
        Ok(())
    }

    async fn advance(&mut self) -> DocumentStoreResult<bool> {
        if self.cursor.is_none() {
            let cursor = self
                .collection
                .find(self.query.clone())
                .with_options(self.options.clone())
                .await
                .map_err(DocumentStoreError::query)?;
            self.cursor = Some(cursor);
        }

        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(false);
        };
        if cursor.advance().await.map_err(DocumentStoreError::query)? {
            self.current = Some(cursor.deserialize_current().map_err(DocumentStoreError::query)?);
            Ok(true)
        } else {
            self.current = None;
            Ok(false)
        }
    }

    fn current(&self) -> DocumentStoreResult<Document> {
        self.current
            .clone()
            .ok_or_else(|| DocumentStoreError::query("cursor is not positioned on a document"))
    }

    async fn rewind(&mut self) -> DocumentStoreResult<()> {
        self.cursor = None;
        self.current = None;
        Ok(())
    }

    async fn count(&mut self, found_only: bool) -> DocumentStoreResult<u64> {
        let mut options = CountOptions::default();
        if found_only {
            options.skip = self.options.skip;
            options.limit = self.options.limit.and_then(|limit| u64::try_from(limit).ok());
        }

        self.collection
            .count_documents(self.query.clone())
            .with_options(options)
            .await
            .map_err(DocumentStoreError::query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::error::CommandError;

    fn command_error(code: i32, name: &str) -> MongoError {
        let command: CommandError = bson::deserialize_from_document(doc! {
            "code": code,
            "codeName": name,
            "errmsg": "ns not found",
        })
        .unwrap();
        MongoError::from(ErrorKind::Command(command))
    }

    #[test]
    fn test_missing_namespace_is_recognized() {
        let missing = command_error(NAMESPACE_NOT_FOUND, "NamespaceNotFound");
        assert_eq!(error_code(&missing), Some(26));
        assert!(is_missing_namespace(&missing));

        let unauthorized = command_error(13, "Unauthorized");
        assert!(!is_missing_namespace(&unauthorized));
    }

    #[test]
    fn test_native_limit_saturates() {
        assert_eq!(native_limit(0), None);
        assert_eq!(native_limit(20), Some(20));
        assert_eq!(native_limit(u64::MAX), Some(i64::MAX));
    }

    #[tokio::test]
    async fn test_malformed_dsn_is_a_connection_error() {
        let result = MongoConnector::new()
            .connect(&ConnectionParams::new("not a connection string", "music"))
            .await;

        match result {
            Err(DocumentStoreError::Connection { message, .. }) => assert!(!message.is_empty()),
            other => panic!("expected a connection error, got {other:?}"),
        }
    }
}

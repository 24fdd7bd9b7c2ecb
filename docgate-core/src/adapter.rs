//! Connection management shared by gateways.
//!
//! An [`Adapter`] owns a driver connector and its configuration and opens the connection
//! on first use ("connect if not already connected"). Gateways over different tables share
//! one adapter through an `Arc`.
//!
//! The adapter also carries two pieces of bookkeeping that outlive any single gateway
//! call:
//!
//! - an emulated transaction flag; the store has no multi-document transactions here, so
//!   [`Adapter::rollback`] cannot undo anything and only validates that a transaction was
//!   begun
//! - the last generated value (identifier) per table, read back via
//!   [`Adapter::last_generated_value`]
//!
//! # Example
//!
//! ```ignore
//! use docgate::{adapter::Adapter, config::AdapterConfig, memory::InMemoryConnector};
//!
//! let adapter = Adapter::open(
//!     InMemoryConnector::new(),
//!     AdapterConfig::new("memory://", "music").with_eager_connect(true),
//! ).await?;
//! assert!(adapter.is_connected().await);
//! ```

use bson::Bson;
use mea::rwlock::RwLock;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::{debug, error, info, warn};

use crate::{
    config::AdapterConfig,
    driver::{StoreConnection, StoreConnector},
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Lazily connected handle on one database.
pub struct Adapter {
    connector: Box<dyn StoreConnector>,
    config: AdapterConfig,
    connection: RwLock<Option<Arc<dyn StoreConnection>>>,
    in_transaction: AtomicBool,
    last_generated: RwLock<Vec<(String, Option<Bson>)>>,
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("connector", &self.connector)
            .field("dsn", &self.config.dsn)
            .field("dbname", &self.config.dbname)
            .field("in_transaction", &self.in_transaction())
            .finish_non_exhaustive()
    }
}

impl Adapter {
    /// Creates an adapter that connects on first use.
    pub fn new(connector: impl StoreConnector + 'static, config: AdapterConfig) -> Self {
        Self {
            connector: Box::new(connector),
            config,
            connection: RwLock::new(None),
            in_transaction: AtomicBool::new(false),
            last_generated: RwLock::new(Vec::new()),
        }
    }

    /// Creates an adapter, connecting immediately when `driver_options.connect` is set.
    ///
    /// # Errors
    ///
    /// Returns a connection error if eager connection fails.
    pub async fn open(
        connector: impl StoreConnector + 'static,
        config: AdapterConfig,
    ) -> DocumentStoreResult<Self> {
        let adapter = Self::new(connector, config);
        if adapter.config.driver_options.connect {
            adapter.connection().await?;
        }
        Ok(adapter)
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// The configured database name.
    pub fn current_schema(&self) -> Option<&str> {
        self.config.dbname.as_deref()
    }

    /// Returns the open connection, connecting first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidInput`] for an incomplete configuration and
    /// [`DocumentStoreError::Connection`] when the driver cannot connect.
    pub async fn connection(&self) -> DocumentStoreResult<Arc<dyn StoreConnection>> {
        let existing = self.connection.read().await.clone();
        if let Some(connection) = existing {
            return Ok(connection);
        }

        let mut guard = self.connection.write().await;
        if let Some(connection) = guard.as_ref() {
            return Ok(connection.clone());
        }

        let params = self.config.connection_params()?;
        match self.connector.connect(&params).await {
            Ok(connection) => {
                info!(database = %params.database, "connected to document store");
                *guard = Some(connection.clone());
                Ok(connection)
            }
            Err(err) => {
                error!(database = %params.database, error = %err, "failed to connect to document store");
                Err(err)
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.read().await.is_some()
    }

    /// Closes the connection, if open. The next call to [`connection`](Self::connection)
    /// reconnects. Any emulated transaction is abandoned.
    pub async fn disconnect(&self) -> DocumentStoreResult<()> {
        let connection = self.connection.write().await.take();
        self.in_transaction.store(false, Ordering::SeqCst);
        if let Some(connection) = connection {
            connection.shutdown().await?;
            info!(database = %connection.database(), "disconnected from document store");
        }
        Ok(())
    }

    /// Marks the start of an emulated transaction, connecting first if needed.
    pub async fn begin_transaction(&self) -> DocumentStoreResult<()> {
        self.connection().await?;
        self.in_transaction.store(true, Ordering::SeqCst);
        debug!("transaction started");
        Ok(())
    }

    /// Ends the emulated transaction. Writes were applied as they happened.
    pub async fn commit(&self) -> DocumentStoreResult<()> {
        self.connection().await?;
        self.in_transaction.store(false, Ordering::SeqCst);
        debug!("transaction committed");
        Ok(())
    }

    /// Ends the emulated transaction without undoing anything.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Transaction`] when there is no open connection or
    /// no transaction was begun.
    pub async fn rollback(&self) -> DocumentStoreResult<()> {
        if !self.is_connected().await {
            return Err(DocumentStoreError::Transaction(
                "must be connected before rollback".to_string(),
            ));
        }
        if !self.in_transaction() {
            return Err(DocumentStoreError::Transaction(
                "must call begin_transaction() before rollback".to_string(),
            ));
        }

        self.in_transaction.store(false, Ordering::SeqCst);
        warn!("rollback requested; writes made since begin_transaction() are not undone");
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::SeqCst)
    }

    /// Records the last generated value for `table`. `None` clears it.
    pub async fn store_last_generated_value(&self, table: &str, value: Option<Bson>) {
        let mut values = self.last_generated.write().await;
        match values.iter_mut().find(|(name, _)| name == table) {
            Some((_, slot)) => *slot = value,
            None => values.push((table.to_string(), value)),
        }
    }

    /// Returns the last generated value for `table`, or, when `table` is `None`, the
    /// value of the first table that currently holds one.
    pub async fn last_generated_value(&self, table: Option<&str>) -> Option<Bson> {
        let values = self.last_generated.read().await;
        match table {
            Some(table) => values
                .iter()
                .find(|(name, _)| name == table)
                .and_then(|(_, value)| value.clone()),
            None => values.iter().find_map(|(_, value)| value.clone()),
        }
    }
}

//! Table-gateway access to schemaless document stores.
//!
//! This crate is the entry point of the docgate project. It re-exports the core types
//! from `docgate-core` and the drivers from the driver crates.
//!
//! A [`Gateway`](gateway::Gateway) wraps one collection and exposes CRUD verbs that take
//! SQL-where-like filters: plain values mean equality, arrays mean set membership, and a
//! leading `-` on a key negates the condition. Filters are translated into the store's
//! native query language, and hex strings that look like object identifiers are turned
//! into native identifiers on the way.
//!
//! # Features
//!
//! - **Gateway verbs** - select, find, get, find_one, insert, update, delete, save, drop
//! - **Lazy results** - Cursor-backed result sets that materialize on first access
//! - **Paging** - Offset/limit page sources and a paginator
//! - **Indexes** - Named and default text indexes
//! - **Interceptors** - Hooks around every verb
//!
//! # Quick Start
//!
//! ```ignore
//! use docgate::{prelude::*, memory::InMemoryConnector};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let adapter = Arc::new(Adapter::new(
//!         InMemoryConnector::new(),
//!         AdapterConfig::new("memory://", "music"),
//!     ));
//!     let albums = Gateway::new(adapter, "albums")?;
//!
//!     let mut album = Record::new().with("title", "Kind of Blue").with("year", 1959);
//!     albums.save(&mut album).await?;
//!
//!     let mut rows = albums
//!         .find(doc! { "-year": [1958, 1960] }, doc! { "title": "asc" }, Some(10), None)
//!         .await?;
//!     while let Some(row) = rows.next_row().await? {
//!         println!("{:?}", row.get("title"));
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Drivers
//!
//! - [`memory`] - In-memory store for development and testing
//! - [`mongodb`] - MongoDB driver (requires `mongodb` feature)

pub mod prelude;

pub use docgate_core::{
    adapter, coerce, config, document, driver, error, feature, gateway, page, query, result,
    translate,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory driver.
pub mod memory {
    pub use docgate_memory::{InMemoryConnector, InMemoryConnectorBuilder};
}

/// MongoDB driver.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docgate_mongodb::{MongoConnector, error_code};
}

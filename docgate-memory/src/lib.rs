//! In-memory document store driver for docgate.
//!
//! This crate implements the docgate driver boundary against a process-local store. It
//! understands the same native query language the gateway produces (equality, `$in`,
//! `$ne`, `$nin`, comparison operators, `$and`/`$or`/`$nor`) and is intended for
//! development and tests.
//!
//! # Features
//!
//! - **Shared state** - Clones of a connector share one store behind an async-aware RwLock
//! - **Lazy cursors** - Queries run on first advance; sort, skip and limit apply before that
//! - **Forward-only mode** - Cursors that refuse to rewind, like network cursors
//! - **Index bookkeeping** - Named indexes can be created, listed and dropped
//!
//! # Quick Start
//!
//! ```ignore
//! use docgate::prelude::*;
//! use docgate::memory::InMemoryConnector;
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let connector = InMemoryConnector::new();
//!     let adapter = Arc::new(Adapter::new(connector, AdapterConfig::new("memory://", "music")));
//!     let albums = Gateway::new(adapter, "albums")?;
//!
//!     albums.insert(Record::new().with("title", "Kind of Blue")).await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docgate_memory;

mod evaluator;
pub mod store;

pub use store::{
    ID_INDEX_NAME, InMemoryCollection, InMemoryConnection, InMemoryConnector,
    InMemoryConnectorBuilder, InMemoryCursor, MEMORY_SCHEME,
};

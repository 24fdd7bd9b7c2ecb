//! MongoDB driver for docgate.
//!
//! This crate implements the docgate driver boundary on top of the official `mongodb`
//! async client. Gateways built on it translate their filters into native MongoDB
//! queries, so everything the server's query engine supports is available through
//! raw conditions.
//!
//! To use this driver, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docgate = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Connection checks** - The server is pinged at connect time
//! - **Credentials** - Username and password from the adapter configuration
//! - **Lazy cursors** - Sort, skip and limit are collected until the first advance
//! - **Indexing** - Named index creation and removal
//!
//! # Example
//!
//! ```ignore
//! use docgate::{prelude::*, mongodb::MongoConnector};
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let config = AdapterConfig::new("mongodb://localhost:27017", "music")
//!         .with_eager_connect(true);
//!     let adapter = Adapter::open(MongoConnector::new(), config).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docgate_mongodb;

pub mod store;

pub use store::{MongoCollection, MongoConnection, MongoConnector, MongoCursor, error_code};

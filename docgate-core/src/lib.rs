//! Table-gateway access to schemaless document stores.
//!
//! This crate is the core of the docgate project and provides:
//!
//! - **Records and models** ([`document`]) - Documents with a dedicated identifier, row prototypes
//! - **Identifier coercion** ([`coerce`]) - Hex-string identifiers to native identifiers
//! - **Filter and order values** ([`query`]) - SQL-where-like match conditions and sort keys
//! - **Translation** ([`translate`]) - Filters and orders to native query documents
//! - **Driver boundary** ([`driver`]) - Traits a wire driver implements
//! - **Configuration** ([`config`]) - Connection settings with common aliases
//! - **Adapter** ([`adapter`]) - Lazy connection, emulated transactions, last generated values
//! - **Results** ([`result`]) - Cursor-backed, position-tracked result sets
//! - **Paging** ([`page`]) - Offset/limit page sources and a paginator
//! - **Interceptors** ([`feature`]) - Hooks run around every gateway verb
//! - **Gateway** ([`gateway`]) - CRUD verbs over one collection
//! - **Error handling** ([`error`]) - Error taxonomy and result alias
//!
//! # Example
//!
//! ```ignore
//! use docgate::prelude::*;
//! use bson::doc;
//!
//! let adapter = Arc::new(Adapter::new(connector, AdapterConfig::new(dsn, "music")));
//! let albums = Gateway::new(adapter, "albums")?;
//!
//! let mut rows = albums.find(doc! { "tags": ["jazz", "soul"] }, doc! { "year": -1 }, Some(20), None).await?;
//! while let Some(album) = rows.next_row().await? {
//!     println!("{:?}", album.get("title"));
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docgate_core;

pub mod adapter;
pub mod coerce;
pub mod config;
pub mod document;
pub mod driver;
pub mod error;
pub mod feature;
pub mod gateway;
pub mod page;
pub mod query;
pub mod result;
pub mod translate;

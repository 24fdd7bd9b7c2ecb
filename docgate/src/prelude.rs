//! Convenient re-exports of commonly used types from docgate.
//!
//! ```ignore
//! use docgate::prelude::*;
//! ```

pub use std::sync::Arc;

pub use docgate_core::{
    adapter::Adapter,
    config::{AdapterConfig, DriverOptions},
    document::{ID_FIELD, Model, Record},
    driver::{StoreConnector, WriteAck},
    error::{DocumentStoreError, DocumentStoreResult},
    feature::{Feature, FeatureSet, Verb},
    gateway::Gateway,
    page::{Page, PageSource, PaginationParams, Paginator},
    query::{Condition, Filter, IntoFilter, IntoOrder, Order, SortDirection},
    result::{CursorResult, ResultSet},
};

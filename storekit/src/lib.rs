//! Uniform data-store surface over ScyllaDB, Cassandra and an in-memory
//! table.
//!
//! A [`StoreHandle`] is obtained from the [`DataStoreFactory`] for a backend
//! identifier, a key/value parameter map and a [`TableMapping`]. Queries
//! are built from the handle and executed into a [`ResultCursor`].

pub mod config;
pub mod database;
pub mod errors;
pub mod mapping;
pub mod metrics;
pub mod observability;
pub mod types;

pub use config::{DatabaseConfig, StoreProperties};
pub use database::{BackendKind, DataStoreFactory, Query, ResultCursor, StoreHandle};
pub use errors::{StoreError, StoreResult};
pub use mapping::{ColumnMapping, TableMapping};
pub use types::{Filter, FilterOp, Persistent, Row, StoreKey};

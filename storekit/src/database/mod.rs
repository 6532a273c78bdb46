pub mod backend;
pub mod cursor;
pub mod factory;
pub mod handle;
pub mod memory;
pub mod query;
pub mod query_builder;
pub mod retry;
pub mod scylla;

pub use backend::{Backend, RowSource, ScanSpec};
pub use cursor::ResultCursor;
pub use factory::{BackendKind, DataStoreFactory};
pub use handle::StoreHandle;
pub use memory::MemoryBackend;
pub use query::Query;
pub use query_builder::{KeyPredicate, QueryBuilder};
pub use retry::RetryPolicy;
pub use self::scylla::{ScyllaBackend, ScyllaConnection};

// storekit/src/database/backend.rs
//
// Capability interface implemented directly by every backend.
// Backends move JSON rows; typing, validation, filtering and limits live in
// StoreHandle / ResultCursor so no backend can change those semantics.
//

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::factory::BackendKind;
use crate::errors::StoreError;
use crate::types::{RawRow, StoreKey};

/// What a backend must read for one query execution.
#[derive(Debug, Clone)]
pub struct ScanSpec<'a, K> {
    pub start_key: Option<&'a K>,
    pub end_key: Option<&'a K>,
    pub fields: Option<&'a [String]>,
    /// Only set when it is safe to push down (no local filters).
    pub limit: Option<usize>,
}

#[async_trait]
pub trait Backend<K: StoreKey>: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn create_schema(&self) -> Result<(), StoreError>;
    async fn delete_schema(&self) -> Result<(), StoreError>;
    async fn truncate_schema(&self) -> Result<(), StoreError>;
    async fn schema_exists(&self) -> Result<bool, StoreError>;

    async fn get(&self, key: &K, fields: Option<&[String]>) -> Result<Option<Map<String, Value>>, StoreError>;
    /// `row` already carries the key column.
    async fn put(&self, key: &K, row: Map<String, Value>) -> Result<(), StoreError>;
    async fn delete(&self, key: &K) -> Result<bool, StoreError>;

    async fn scan(&self, spec: ScanSpec<'_, K>) -> Result<Box<dyn RowSource<K>>, StoreError>;

    async fn flush(&self) -> Result<(), StoreError>;
    async fn close(&self) -> Result<(), StoreError>;
}

/// Backend-side iteration state behind a cursor.
#[async_trait]
pub trait RowSource<K: StoreKey>: Send {
    async fn next_row(&mut self) -> Result<Option<RawRow<K>>, StoreError>;

    /// Release backend-side resources. Called at most once by the cursor.
    async fn close(&mut self) -> Result<(), StoreError>;
}

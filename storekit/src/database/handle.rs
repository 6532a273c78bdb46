use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backend::Backend;
use super::cursor::ResultCursor;
use super::factory::BackendKind;
use super::query::Query;
use crate::errors::StoreError;
use crate::mapping::TableMapping;
use crate::metrics;
use crate::types::{Persistent, StoreKey};

/// Live store for one key/record type pair on one backend.
///
/// Queries and cursors are produced through the handle; cursors borrow it,
/// so they cannot outlive it.
pub struct StoreHandle<K: StoreKey, T: Persistent> {
    id: Uuid,
    mapping: TableMapping,
    backend: Arc<dyn Backend<K>>,
    open: AtomicBool,
    _record: PhantomData<fn() -> T>,
}

impl<K: StoreKey, T: Persistent> fmt::Debug for StoreHandle<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("id", &self.id)
            .field("backend", &self.backend.kind())
            .field("table", &self.mapping.table)
            .field("open", &self.is_open())
            .finish()
    }
}

impl<K: StoreKey, T: Persistent> StoreHandle<K, T> {
    pub(crate) fn new(backend: Arc<dyn Backend<K>>, mapping: TableMapping) -> Self {
        let kind = backend.kind();
        metrics::OPEN_HANDLES.with_label_values(&[kind.as_str()]).inc();
        Self {
            id: Uuid::new_v4(),
            mapping,
            backend,
            open: AtomicBool::new(true),
            _record: PhantomData,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn mapping(&self) -> &TableMapping {
        &self.mapping
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn backend(&self) -> &dyn Backend<K> {
        self.backend.as_ref()
    }

    pub(crate) fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::ConfigError(format!("store handle {} is closed", self.id)))
        }
    }

    pub(crate) fn validate_fields(&self, fields: &[String]) -> Result<(), StoreError> {
        for field in fields {
            if !self.mapping.has_column(field) && *field != self.mapping.key.name {
                return Err(StoreError::InvalidArgument(format!(
                    "field `{}` is not mapped in table {}",
                    field, self.mapping.table
                )));
            }
        }
        Ok(())
    }

    /// New query bound to this handle.
    pub fn new_query(&self) -> Result<Query<K, T>, StoreError> {
        self.ensure_open()?;
        Ok(Query::new(self.id, self.backend.kind()))
    }

    /// Execute `query`, which must have been produced by this handle.
    pub async fn execute(&self, query: &Query<K, T>) -> Result<ResultCursor<'_, K, T>, StoreError> {
        let start = Instant::now();
        let result = ResultCursor::open(self, query).await;
        self.record("execute", result.is_ok(), start);
        result
    }

    pub async fn create_schema(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.timed("create_schema", self.backend.create_schema()).await
    }

    pub async fn delete_schema(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.timed("delete_schema", self.backend.delete_schema()).await
    }

    pub async fn truncate_schema(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.timed("truncate_schema", self.backend.truncate_schema()).await
    }

    pub async fn schema_exists(&self) -> Result<bool, StoreError> {
        self.ensure_open()?;
        self.timed("schema_exists", self.backend.schema_exists()).await
    }

    pub async fn get(&self, key: &K) -> Result<Option<T>, StoreError> {
        self.ensure_open()?;
        let row = self.timed("get", self.backend.get(key, None)).await?;
        row.map(Self::decode).transpose()
    }

    /// Fetch only `fields` of the record; the rest come back missing.
    pub async fn get_fields(&self, key: &K, fields: &[String]) -> Result<Option<T>, StoreError> {
        self.ensure_open()?;
        self.validate_fields(fields)?;
        let row = self.timed("get", self.backend.get(key, Some(fields))).await?;
        row.map(Self::decode).transpose()
    }

    pub async fn put(&self, key: K, value: &T) -> Result<(), StoreError> {
        self.ensure_open()?;
        let row = self.to_row(&key, value)?;
        self.timed("put", self.backend.put(&key, row)).await
    }

    pub async fn delete(&self, key: &K) -> Result<bool, StoreError> {
        self.ensure_open()?;
        self.timed("delete", self.backend.delete(key)).await
    }

    /// Delete every row matched by `query`; returns how many were deleted.
    pub async fn delete_by_query(&self, query: &Query<K, T>) -> Result<u64, StoreError> {
        let start = Instant::now();
        let result = self.delete_matching(query).await;
        self.record("delete_by_query", result.is_ok(), start);
        result
    }

    async fn delete_matching(&self, query: &Query<K, T>) -> Result<u64, StoreError> {
        let mut cursor = ResultCursor::open(self, query).await?;
        let mut keys = Vec::new();
        while let Some(row) = cursor.next_raw().await? {
            keys.push(row.key);
        }
        cursor.close().await?;

        let mut deleted = 0;
        for key in &keys {
            if self.backend.delete(key).await? {
                deleted += 1;
            }
        }
        debug!("Deleted {} rows from {} by query", deleted, self.mapping.table);
        Ok(deleted)
    }

    pub async fn flush(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.timed("flush", self.backend.flush()).await
    }

    /// Close the handle. Idempotent; queries and cursors of a closed
    /// handle fail with `ConfigError`.
    pub async fn close(&self) -> Result<(), StoreError> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let kind = self.backend.kind();
        metrics::OPEN_HANDLES.with_label_values(&[kind.as_str()]).dec();
        info!("Closing {} store for table {}", kind, self.mapping.table);
        self.backend.close().await
    }

    pub(crate) fn decode(fields: Map<String, Value>) -> Result<T, StoreError> {
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    fn to_row(&self, key: &K, value: &T) -> Result<Map<String, Value>, StoreError> {
        let mut row = match serde_json::to_value(value)? {
            Value::Object(row) => row,
            other => {
                return Err(StoreError::SerializationError(format!(
                    "record must serialize to an object, got {}",
                    other
                )))
            }
        };

        let key_column = &self.mapping.key.name;
        let key_value = serde_json::to_value(key)?;
        for (name, value) in &row {
            if name == key_column {
                if *value != key_value {
                    return Err(StoreError::InvalidArgument(format!(
                        "record key field `{}` = {} does not match key {}",
                        name, value, key_value
                    )));
                }
            } else if !self.mapping.has_column(name) {
                return Err(StoreError::InvalidArgument(format!(
                    "field `{}` is not mapped in table {}",
                    name, self.mapping.table
                )));
            }
        }
        row.insert(key_column.clone(), key_value);
        Ok(row)
    }

    async fn timed<R>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<R, StoreError>>,
    ) -> Result<R, StoreError> {
        let start = Instant::now();
        let result = fut.await;
        if let Err(err) = &result {
            warn!("{} on {} failed: {}", operation, self.mapping.table, err);
        }
        self.record(operation, result.is_ok(), start);
        result
    }

    fn record(&self, operation: &str, success: bool, start: Instant) {
        metrics::record_operation(
            operation,
            self.backend.kind().as_str(),
            success,
            start.elapsed().as_secs_f64(),
        );
    }
}

impl<K: StoreKey, T: Persistent> Drop for StoreHandle<K, T> {
    fn drop(&mut self) {
        if self.open.swap(false, Ordering::AcqRel) {
            metrics::OPEN_HANDLES
                .with_label_values(&[self.backend.kind().as_str()])
                .dec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryBackend;
    use crate::mapping::ColumnMapping;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Employee {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        salary: Option<i32>,
    }

    fn store() -> StoreHandle<String, Employee> {
        let mapping = TableMapping::new("employee", ColumnMapping::new("ssn", "text"))
            .with_column("name", "text")
            .with_column("salary", "int");
        StoreHandle::new(Arc::new(MemoryBackend::new(mapping.clone())), mapping)
    }

    fn employee(name: &str, salary: i32) -> Employee {
        Employee {
            name: Some(name.to_string()),
            salary: Some(salary),
        }
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = store();
        store.create_schema().await.unwrap();

        store.put("123".to_string(), &employee("ana", 100)).await.unwrap();
        assert_eq!(store.get(&"123".to_string()).await.unwrap(), Some(employee("ana", 100)));

        assert!(store.delete(&"123".to_string()).await.unwrap());
        assert_eq!(store.get(&"123".to_string()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_fields_projects() {
        let store = store();
        store.create_schema().await.unwrap();
        store.put("1".to_string(), &employee("ana", 100)).await.unwrap();

        let partial = store
            .get_fields(&"1".to_string(), &["salary".to_string()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(partial.name, None);
        assert_eq!(partial.salary, Some(100));

        let err = store.get_fields(&"1".to_string(), &["age".to_string()]).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_put_rejects_unmapped_fields() {
        let store: StoreHandle<i32, Value> = {
            let mapping = TableMapping::new("t", ColumnMapping::new("id", "int")).with_column("a", "text");
            StoreHandle::new(Arc::new(MemoryBackend::new(mapping.clone())), mapping)
        };
        store.create_schema().await.unwrap();

        let err = store.put(1, &serde_json::json!({"b": "x"})).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));

        let err = store.put(1, &serde_json::json!({"id": 2, "a": "x"})).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));

        store.put(1, &serde_json::json!({"id": 1, "a": "x"})).await.unwrap();

        let err = store.put(2, &serde_json::json!(["not", "an", "object"])).await.unwrap_err();
        assert!(matches!(err, StoreError::SerializationError(_)));
    }

    #[tokio::test]
    async fn test_closed_handle_rejects_operations() {
        let store = store();
        store.close().await.unwrap();
        store.close().await.unwrap();

        assert!(!store.is_open());
        assert!(matches!(store.new_query(), Err(StoreError::ConfigError(_))));
        assert!(matches!(
            store.get(&"1".to_string()).await,
            Err(StoreError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_by_query_respects_filters() {
        let store = store();
        store.create_schema().await.unwrap();
        for (ssn, salary) in [("1", 10), ("2", 200), ("3", 300)] {
            store.put(ssn.to_string(), &employee("x", salary)).await.unwrap();
        }

        let query = store
            .new_query()
            .unwrap()
            .with_filter(crate::types::Filter::new("salary", crate::types::FilterOp::Gt, 100));
        assert_eq!(store.delete_by_query(&query).await.unwrap(), 2);
        assert!(store.get(&"1".to_string()).await.unwrap().is_some());
        assert!(store.get(&"2".to_string()).await.unwrap().is_none());
    }

    /// Memory table reported under the `cassandra` label, so the gauge
    /// assertions do not race with other tests' memory handles.
    struct RelabelledBackend(MemoryBackend<i32>);

    #[async_trait::async_trait]
    impl Backend<i32> for RelabelledBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Cassandra
        }
        async fn create_schema(&self) -> Result<(), StoreError> {
            self.0.create_schema().await
        }
        async fn delete_schema(&self) -> Result<(), StoreError> {
            self.0.delete_schema().await
        }
        async fn truncate_schema(&self) -> Result<(), StoreError> {
            self.0.truncate_schema().await
        }
        async fn schema_exists(&self) -> Result<bool, StoreError> {
            self.0.schema_exists().await
        }
        async fn get(&self, key: &i32, fields: Option<&[String]>) -> Result<Option<Map<String, Value>>, StoreError> {
            self.0.get(key, fields).await
        }
        async fn put(&self, key: &i32, row: Map<String, Value>) -> Result<(), StoreError> {
            self.0.put(key, row).await
        }
        async fn delete(&self, key: &i32) -> Result<bool, StoreError> {
            self.0.delete(key).await
        }
        async fn scan(
            &self,
            spec: crate::database::backend::ScanSpec<'_, i32>,
        ) -> Result<Box<dyn crate::database::backend::RowSource<i32>>, StoreError> {
            self.0.scan(spec).await
        }
        async fn flush(&self) -> Result<(), StoreError> {
            self.0.flush().await
        }
        async fn close(&self) -> Result<(), StoreError> {
            self.0.close().await
        }
    }

    #[tokio::test]
    async fn test_open_handle_gauge_tracks_drop_and_close() {
        let mapping = TableMapping::new("session", ColumnMapping::new("id", "int"));
        let gauge = || metrics::OPEN_HANDLES.with_label_values(&["cassandra"]).get();
        let handle = || -> StoreHandle<i32, Value> {
            StoreHandle::new(Arc::new(RelabelledBackend(MemoryBackend::new(mapping.clone()))), mapping.clone())
        };

        let closed = handle();
        let dropped = handle();
        let before = gauge();

        closed.close().await.unwrap();
        drop(closed);
        assert_eq!(gauge(), before - 1);

        drop(dropped);
        assert_eq!(gauge(), before - 2);
    }
}

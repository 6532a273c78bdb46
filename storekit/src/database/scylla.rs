use async_trait::async_trait;
use futures::StreamExt;
use scylla::frame::response::result::{CqlValue, Row};
use scylla::query::Query as CqlStatement;
use scylla::serialize::row::SerializeRow;
use scylla::transport::execution_profile::ExecutionProfile;
use scylla::transport::iterator::RowIterator;
use scylla::transport::session::PoolSize;
use scylla::{QueryResult, Session, SessionBuilder};
use serde_json::{Map, Value};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::backend::{Backend, RowSource, ScanSpec};
use super::factory::BackendKind;
use super::query_builder::{KeyPredicate, QueryBuilder};
use crate::config::DatabaseConfig;
use crate::errors::StoreError;
use crate::mapping::TableMapping;
use crate::types::{RawRow, StoreKey};

/// ScyllaDB connection wrapper
pub struct ScyllaConnection {
    session: Session,
    config: DatabaseConfig,
}

impl ScyllaConnection {
    /// Create a new ScyllaDB connection
    pub async fn new(config: &DatabaseConfig) -> Result<Self, StoreError> {
        info!("Connecting to ScyllaDB cluster: {:?}", config.hosts);

        let pool_size = NonZeroUsize::new(config.pool_size as usize).unwrap_or(NonZeroUsize::MIN);

        let profile = ExecutionProfile::builder()
            .consistency(config.consistency.into())
            .request_timeout(Some(config.request_timeout()))
            .build();

        let mut session_builder = SessionBuilder::new()
            .known_nodes(config.contact_points())
            .connection_timeout(config.connection_timeout())
            .pool_size(PoolSize::PerShard(pool_size))
            .default_execution_profile_handle(profile.into_handle());

        // Add authentication if provided
        if let (Some(ref username), Some(ref password)) = (&config.username, &config.password) {
            session_builder = session_builder.user(username, password);
        }

        let session = session_builder.build().await.map_err(|e| {
            error!("Failed to connect to ScyllaDB: {}", e);
            StoreError::DatabaseError(format!("Connection failed: {}", e))
        })?;

        info!("Successfully connected to ScyllaDB cluster");

        Ok(Self {
            session,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Get the underlying Scylla session
    pub fn get_session(&self) -> &Session {
        &self.session
    }

    /// Execute a simple query without values
    pub async fn execute_simple(&self, query: &str) -> Result<QueryResult, StoreError> {
        self.session
            .query_unpaged(query, ())
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Query execution failed: {}", e)))
    }

    /// Execute a query with serializable values
    pub async fn execute_with_values<V: SerializeRow>(
        &self,
        query: &str,
        values: V,
    ) -> Result<QueryResult, StoreError> {
        self.session
            .query_unpaged(query, values)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Query execution failed: {}", e)))
    }

    /// Execute a paged query; pages are fetched as the iterator is driven
    pub async fn execute_paged<V: SerializeRow>(&self, query: &str, values: V) -> Result<RowIterator, StoreError> {
        let mut statement = CqlStatement::new(query);
        statement.set_page_size(self.config.page_size);
        self.session
            .query_iter(statement, values)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Query execution failed: {}", e)))
    }

    /// Health check
    pub async fn health_check(&self) -> Result<(), StoreError> {
        self.execute_simple("SELECT now() FROM system.local").await?;
        Ok(())
    }
}

/// CQL backend shared by the `scylla` and `cassandra` identifiers.
pub struct ScyllaBackend {
    kind: BackendKind,
    connection: Arc<ScyllaConnection>,
    mapping: TableMapping,
    keyspace: String,
}

impl ScyllaBackend {
    pub fn new(kind: BackendKind, connection: Arc<ScyllaConnection>, mapping: TableMapping) -> Self {
        let keyspace = mapping
            .keyspace
            .clone()
            .unwrap_or_else(|| connection.config().keyspace.clone());
        Self {
            kind,
            connection,
            mapping,
            keyspace,
        }
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }
}

#[async_trait]
impl<K: StoreKey> Backend<K> for ScyllaBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn create_schema(&self) -> Result<(), StoreError> {
        let replication_factor = self.connection.config().replication_factor;
        self.connection
            .execute_simple(&QueryBuilder::build_create_keyspace(&self.keyspace, replication_factor))
            .await?;
        self.connection
            .execute_simple(&QueryBuilder::build_create_table(&self.keyspace, &self.mapping))
            .await?;
        info!("Created table {}.{}", self.keyspace, self.mapping.table);
        Ok(())
    }

    async fn delete_schema(&self) -> Result<(), StoreError> {
        self.connection
            .execute_simple(&QueryBuilder::build_drop_table(&self.keyspace, &self.mapping.table))
            .await?;
        info!("Dropped table {}.{}", self.keyspace, self.mapping.table);
        Ok(())
    }

    async fn truncate_schema(&self) -> Result<(), StoreError> {
        self.connection
            .execute_simple(&QueryBuilder::build_truncate(&self.keyspace, &self.mapping.table))
            .await?;
        Ok(())
    }

    async fn schema_exists(&self) -> Result<bool, StoreError> {
        let result = self
            .connection
            .execute_with_values(
                QueryBuilder::build_table_exists(),
                (self.keyspace.as_str(), self.mapping.table.as_str()),
            )
            .await?;
        Ok(result.rows_num().unwrap_or(0) > 0)
    }

    async fn get(&self, key: &K, fields: Option<&[String]>) -> Result<Option<Map<String, Value>>, StoreError> {
        let query = QueryBuilder::build_select_json(&self.keyspace, &self.mapping, fields, KeyPredicate::Equals, None);
        let key_json = serde_json::to_string(key)?;
        let result = self.connection.execute_with_values(&query, (key_json,)).await?;

        match result.rows.and_then(|rows| rows.into_iter().next()) {
            Some(row) => {
                let row: RawRow<K> = decode_json_row(row, &self.mapping.key.name)?;
                Ok(Some(row.fields))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, _key: &K, row: Map<String, Value>) -> Result<(), StoreError> {
        let document = serde_json::to_string(&Value::Object(row))?;
        self.connection
            .execute_with_values(
                &QueryBuilder::build_insert_json(&self.keyspace, &self.mapping.table),
                (document,),
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &K) -> Result<bool, StoreError> {
        let key_json = serde_json::to_string(key)?;
        self.connection
            .execute_with_values(&QueryBuilder::build_delete_by_key(&self.keyspace, &self.mapping), (key_json,))
            .await?;
        // CQL deletes are blind writes; presence is not reported.
        Ok(true)
    }

    async fn scan(&self, spec: ScanSpec<'_, K>) -> Result<Box<dyn RowSource<K>>, StoreError> {
        let (predicate, values) = key_predicate(spec.start_key, spec.end_key)?;
        let query = QueryBuilder::build_select_json(&self.keyspace, &self.mapping, spec.fields, predicate, spec.limit);
        debug!("Scanning with: {}", query);

        let rows = self.connection.execute_paged(&query, values).await?;
        Ok(Box::new(ScyllaRowSource {
            rows: Some(rows),
            key_column: self.mapping.key.name.clone(),
        }))
    }

    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        info!("Releasing {} connection for {}.{}", self.kind, self.keyspace, self.mapping.table);
        Ok(())
    }
}

/// Pick the key restriction and its JSON-encoded bind values.
fn key_predicate<K: StoreKey>(start: Option<&K>, end: Option<&K>) -> Result<(KeyPredicate, Vec<String>), StoreError> {
    match (start, end) {
        (None, None) => Ok((KeyPredicate::All, Vec::new())),
        (Some(start), Some(end)) if start == end => Ok((KeyPredicate::Equals, vec![serde_json::to_string(start)?])),
        (start, end) => {
            let mut values = Vec::new();
            if let Some(start) = start {
                values.push(serde_json::to_string(start)?);
            }
            if let Some(end) = end {
                values.push(serde_json::to_string(end)?);
            }
            Ok((
                KeyPredicate::Range {
                    lower: start.is_some(),
                    upper: end.is_some(),
                },
                values,
            ))
        }
    }
}

/// Decode one `SELECT JSON` row; null columns are dropped.
fn decode_json_row<K: StoreKey>(row: Row, key_column: &str) -> Result<RawRow<K>, StoreError> {
    let text = match row.columns.into_iter().next().flatten() {
        Some(CqlValue::Text(text)) | Some(CqlValue::Ascii(text)) => text,
        other => {
            return Err(StoreError::DatabaseError(format!(
                "expected a JSON text column, got {:?}",
                other
            )))
        }
    };

    let mut fields: Map<String, Value> = serde_json::from_str(&text)?;
    fields.retain(|_, value| !value.is_null());

    let key = fields
        .get(key_column)
        .cloned()
        .ok_or_else(|| StoreError::DatabaseError(format!("row is missing key column `{}`", key_column)))?;

    Ok(RawRow {
        key: serde_json::from_value(key)?,
        fields,
    })
}

struct ScyllaRowSource {
    rows: Option<RowIterator>,
    key_column: String,
}

#[async_trait]
impl<K: StoreKey> RowSource<K> for ScyllaRowSource {
    async fn next_row(&mut self) -> Result<Option<RawRow<K>>, StoreError> {
        let rows = match self.rows.as_mut() {
            Some(rows) => rows,
            None => return Ok(None),
        };
        match rows.next().await {
            Some(row) => Ok(Some(decode_json_row(row?, &self.key_column)?)),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        // Dropping the iterator stops page fetching.
        self.rows = None;
        Ok(())
    }
}

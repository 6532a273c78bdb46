// storekit/src/database/factory.rs
//
// Factory Pattern for runtime backend selection
// Supports: ScyllaDB, Cassandra 4.x, in-memory
//

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use super::backend::Backend;
use super::handle::StoreHandle;
use super::memory::MemoryBackend;
use super::scylla::{ScyllaBackend, ScyllaConnection};
use crate::config::{DatabaseConfig, StoreProperties, PROP_BACKEND};
use crate::errors::StoreError;
use crate::mapping::TableMapping;
use crate::types::{Persistent, StoreKey};

/// Backend identifiers known to the factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Scylla,
    Cassandra,
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Scylla => "scylla",
            BackendKind::Cassandra => "cassandra",
            BackendKind::Memory => "memory",
        }
    }

    /// Whether the backend talks CQL to a live cluster.
    pub fn is_cql(&self) -> bool {
        matches!(self, BackendKind::Scylla | BackendKind::Cassandra)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "scylla" | "scylladb" => Ok(BackendKind::Scylla),
            "cassandra" | "cassandra4" | "cass" => Ok(BackendKind::Cassandra),
            "memory" | "mem" => Ok(BackendKind::Memory),
            other => Err(StoreError::ConfigError(format!("unknown backend: {}", other))),
        }
    }
}

/// Data store factory
pub struct DataStoreFactory;

impl DataStoreFactory {
    /// Create a store handle for `mapping` on the given backend
    pub async fn create_data_store<K: StoreKey, T: Persistent>(
        kind: BackendKind,
        properties: &StoreProperties,
        mapping: TableMapping,
    ) -> Result<StoreHandle<K, T>, StoreError> {
        mapping.validate()?;
        info!("Creating data store for table {} with backend: {}", mapping.table, kind);

        let backend: Arc<dyn Backend<K>> = match kind {
            BackendKind::Scylla | BackendKind::Cassandra => {
                // The Scylla driver speaks the same CQL binary protocol as
                // Cassandra 4.x, so both identifiers share one backend.
                let config = DatabaseConfig::from_properties(properties)?;
                let connection = ScyllaConnection::new(&config).await?;
                Arc::new(ScyllaBackend::new(kind, Arc::new(connection), mapping.clone()))
            }
            BackendKind::Memory => Arc::new(MemoryBackend::new(mapping.clone())),
        };

        Ok(StoreHandle::new(backend, mapping))
    }

    /// Create from a parameter map (reads the `backend` key, Scylla when absent)
    pub async fn create_from_properties<K: StoreKey, T: Persistent>(
        properties: &StoreProperties,
        mapping: TableMapping,
    ) -> Result<StoreHandle<K, T>, StoreError> {
        let kind = match properties.get(PROP_BACKEND) {
            Some(name) => name.parse()?,
            None => BackendKind::default(),
        };
        Self::create_data_store(kind, properties, mapping).await
    }

    /// Create from a backend name
    pub async fn create_from_str<K: StoreKey, T: Persistent>(
        backend_name: &str,
        properties: &StoreProperties,
        mapping: TableMapping,
    ) -> Result<StoreHandle<K, T>, StoreError> {
        let kind: BackendKind = backend_name.parse()?;
        Self::create_data_store(kind, properties, mapping).await
    }
}

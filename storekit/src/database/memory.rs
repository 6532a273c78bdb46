// storekit/src/database/memory.rs
//
// In-memory backend: one ordered table per store handle.
// Used by the shared conformance suite and unit tests; rows are held in
// their serialized form so projections behave like the CQL backends.
//

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use tracing::info;

use super::backend::{Backend, RowSource, ScanSpec};
use super::factory::BackendKind;
use crate::errors::StoreError;
use crate::mapping::TableMapping;
use crate::types::{RawRow, StoreKey};

type Table<K> = BTreeMap<K, Map<String, Value>>;

pub struct MemoryBackend<K> {
    mapping: TableMapping,
    table: RwLock<Option<Table<K>>>,
}

impl<K: StoreKey> MemoryBackend<K> {
    pub fn new(mapping: TableMapping) -> Self {
        Self {
            mapping,
            table: RwLock::new(None),
        }
    }

    fn missing_table(&self) -> StoreError {
        StoreError::DatabaseError(format!("unconfigured table {}", self.mapping.table))
    }

    fn project(&self, row: &Map<String, Value>, fields: Option<&[String]>) -> Map<String, Value> {
        match fields {
            None => row.clone(),
            Some(fields) => row
                .iter()
                .filter(|(name, _)| **name == self.mapping.key.name || fields.contains(name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl<K: StoreKey> Backend<K> for MemoryBackend<K> {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn create_schema(&self) -> Result<(), StoreError> {
        let mut table = self.table.write();
        if table.is_none() {
            info!("Creating in-memory table {}", self.mapping.table);
            *table = Some(BTreeMap::new());
        }
        Ok(())
    }

    async fn delete_schema(&self) -> Result<(), StoreError> {
        *self.table.write() = None;
        Ok(())
    }

    async fn truncate_schema(&self) -> Result<(), StoreError> {
        match self.table.write().as_mut() {
            Some(table) => {
                table.clear();
                Ok(())
            }
            None => Err(self.missing_table()),
        }
    }

    async fn schema_exists(&self) -> Result<bool, StoreError> {
        Ok(self.table.read().is_some())
    }

    async fn get(&self, key: &K, fields: Option<&[String]>) -> Result<Option<Map<String, Value>>, StoreError> {
        let table = self.table.read();
        let table = table.as_ref().ok_or_else(|| self.missing_table())?;
        Ok(table.get(key).map(|row| self.project(row, fields)))
    }

    async fn put(&self, key: &K, row: Map<String, Value>) -> Result<(), StoreError> {
        let mut table = self.table.write();
        let table = table.as_mut().ok_or_else(|| self.missing_table())?;
        table.insert(key.clone(), row);
        Ok(())
    }

    async fn delete(&self, key: &K) -> Result<bool, StoreError> {
        let mut table = self.table.write();
        let table = table.as_mut().ok_or_else(|| self.missing_table())?;
        Ok(table.remove(key).is_some())
    }

    async fn scan(&self, spec: ScanSpec<'_, K>) -> Result<Box<dyn RowSource<K>>, StoreError> {
        let table = self.table.read();
        let table = table.as_ref().ok_or_else(|| self.missing_table())?;

        if let (Some(start), Some(end)) = (spec.start_key, spec.end_key) {
            if start > end {
                return Ok(Box::new(MemoryRowSource { rows: VecDeque::new() }));
            }
        }

        let lower = spec.start_key.map_or(Bound::Unbounded, Bound::Included);
        let upper = spec.end_key.map_or(Bound::Unbounded, Bound::Included);
        let limit = spec.limit.unwrap_or(usize::MAX);

        let rows = table
            .range::<K, _>((lower, upper))
            .take(limit)
            .map(|(key, row)| RawRow {
                key: key.clone(),
                fields: self.project(row, spec.fields),
            })
            .collect();

        Ok(Box::new(MemoryRowSource { rows }))
    }

    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Snapshot of the matching rows taken when the cursor was opened.
struct MemoryRowSource<K> {
    rows: VecDeque<RawRow<K>>,
}

#[async_trait]
impl<K: StoreKey> RowSource<K> for MemoryRowSource<K> {
    async fn next_row(&mut self) -> Result<Option<RawRow<K>>, StoreError> {
        Ok(self.rows.pop_front())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.rows.clear();
        Ok(())
    }
}

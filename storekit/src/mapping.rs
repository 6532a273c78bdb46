// storekit/src/mapping.rs
//
// Flat table mapping: which table a record type lives in, its key column
// and its value columns. Loaded from YAML next to the test suites.
//

use serde::{Deserialize, Serialize};
use std::fs;

use crate::errors::StoreError;
use crate::types::is_valid_identifier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub name: String,
    #[serde(rename = "type")]
    pub cql_type: String,
}

impl ColumnMapping {
    pub fn new(name: impl Into<String>, cql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cql_type: cql_type.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    /// Overrides the connection keyspace when set.
    #[serde(default)]
    pub keyspace: Option<String>,
    pub table: String,
    pub key: ColumnMapping,
    #[serde(default)]
    pub columns: Vec<ColumnMapping>,
}

impl TableMapping {
    pub fn new(table: impl Into<String>, key: ColumnMapping) -> Self {
        Self {
            keyspace: None,
            table: table.into(),
            key,
            columns: Vec::new(),
        }
    }

    pub fn with_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    pub fn with_column(mut self, name: impl Into<String>, cql_type: impl Into<String>) -> Self {
        self.columns.push(ColumnMapping::new(name, cql_type));
        self
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, StoreError> {
        let mapping: TableMapping = serde_yaml::from_str(yaml)?;
        mapping.validate()?;
        Ok(mapping)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if let Some(keyspace) = &self.keyspace {
            if !is_valid_identifier(keyspace) {
                return Err(StoreError::ConfigError(format!("invalid keyspace name: {}", keyspace)));
            }
        }
        if !is_valid_identifier(&self.table) {
            return Err(StoreError::ConfigError(format!("invalid table name: {}", self.table)));
        }

        let mut seen = std::collections::HashSet::new();
        for column in std::iter::once(&self.key).chain(self.columns.iter()) {
            if !is_valid_identifier(&column.name) {
                return Err(StoreError::ConfigError(format!(
                    "invalid column name `{}` in table {}",
                    column.name, self.table
                )));
            }
            if !is_valid_cql_type(&column.cql_type) {
                return Err(StoreError::ConfigError(format!(
                    "invalid type `{}` for column {}",
                    column.cql_type, column.name
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(StoreError::ConfigError(format!(
                    "column `{}` mapped twice in table {}",
                    column.name, self.table
                )));
            }
        }
        Ok(())
    }
}

pub fn load_mapping(path: &str) -> Result<TableMapping, StoreError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| StoreError::ConfigError(format!("Failed to read mapping {}: {}", path, e)))?;
    TableMapping::from_yaml_str(&contents)
}

fn is_valid_cql_type(cql_type: &str) -> bool {
    !cql_type.trim().is_empty()
        && cql_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '<' | '>' | ',' | ' ' | '_'))
}

use crate::mapping::TableMapping;

/// Shape of the key restriction in a SELECT; bound values are JSON text
/// passed through `fromJson(?)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPredicate {
    All,
    Equals,
    Range { lower: bool, upper: bool },
}

pub struct QueryBuilder;

impl QueryBuilder {
    pub fn build_create_keyspace(keyspace: &str, replication_factor: u32) -> String {
        format!(
            "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
            keyspace, replication_factor
        )
    }

    pub fn build_create_table(keyspace: &str, mapping: &TableMapping) -> String {
        let mut columns = vec![format!("{} {} PRIMARY KEY", mapping.key.name, mapping.key.cql_type)];
        columns.extend(
            mapping
                .columns
                .iter()
                .map(|c| format!("{} {}", c.name, c.cql_type)),
        );
        format!(
            "CREATE TABLE IF NOT EXISTS {}.{} ({})",
            keyspace,
            mapping.table,
            columns.join(", ")
        )
    }

    pub fn build_drop_table(keyspace: &str, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}.{}", keyspace, table)
    }

    pub fn build_truncate(keyspace: &str, table: &str) -> String {
        format!("TRUNCATE {}.{}", keyspace, table)
    }

    /// Binds (keyspace, table).
    pub fn build_table_exists() -> &'static str {
        "SELECT table_name FROM system_schema.tables WHERE keyspace_name = ? AND table_name = ?"
    }

    /// Binds one JSON document holding the key column and the record fields.
    pub fn build_insert_json(keyspace: &str, table: &str) -> String {
        format!("INSERT INTO {}.{} JSON ?", keyspace, table)
    }

    /// Build a `SELECT JSON` over the key column plus the projected fields
    /// (all mapped columns when `fields` is `None`).
    pub fn build_select_json(
        keyspace: &str,
        mapping: &TableMapping,
        fields: Option<&[String]>,
        predicate: KeyPredicate,
        limit: Option<usize>,
    ) -> String {
        let mut selected = vec![mapping.key.name.clone()];
        match fields {
            Some(fields) => selected.extend(fields.iter().cloned()),
            None => selected.extend(mapping.column_names().map(str::to_string)),
        }

        let mut query = format!(
            "SELECT JSON {} FROM {}.{}",
            selected.join(", "),
            keyspace,
            mapping.table
        );

        let key = &mapping.key.name;
        let mut needs_filtering = false;
        match predicate {
            KeyPredicate::All => {}
            KeyPredicate::Equals => {
                query.push_str(&format!(" WHERE {} = fromJson(?)", key));
            }
            KeyPredicate::Range { lower, upper } => {
                let mut clauses = Vec::new();
                if lower {
                    clauses.push(format!("{} >= fromJson(?)", key));
                }
                if upper {
                    clauses.push(format!("{} <= fromJson(?)", key));
                }
                if !clauses.is_empty() {
                    query.push_str(" WHERE ");
                    query.push_str(&clauses.join(" AND "));
                    needs_filtering = true;
                }
            }
        }

        if let Some(limit) = limit {
            query.push_str(&format!(" LIMIT {}", limit));
        }
        if needs_filtering {
            query.push_str(" ALLOW FILTERING");
        }
        query
    }

    pub fn build_delete_by_key(keyspace: &str, mapping: &TableMapping) -> String {
        format!(
            "DELETE FROM {}.{} WHERE {} = fromJson(?)",
            keyspace, mapping.table, mapping.key.name
        )
    }
}

//! Discovers tables and columns through the database's own metadata
//! statements and turns them into entity metadata.

use super::map_column;
use crate::config::PersistConfig;
use crate::core::{DbResult, Operation, PersistError, Result, SqlValue};
use crate::driver::{Connection, FetchTarget};
use crate::entity::{EntityCatalog, EntityMeta, PrimaryKey};
use crate::sql::quote_ident;

const LIST_TABLES_SQL: &str = "SHOW TABLES";

/// One row of a table description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub raw_type: String,
    /// `PRI` for primary key columns
    pub key: String,
    /// e.g. `auto_increment`
    pub extra: String,
}

impl ColumnInfo {
    pub fn is_primary_key(&self) -> bool {
        self.key.eq_ignore_ascii_case("PRI")
    }

    pub fn is_auto_increment(&self) -> bool {
        self.extra.to_ascii_lowercase().contains("auto_increment")
    }
}

#[derive(Default)]
struct FetchedRow(Vec<(String, SqlValue)>);

impl FetchedRow {
    fn text(&self, column: &str) -> String {
        self.0
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| match value {
                SqlValue::Null => String::new(),
                other => other.to_string(),
            })
            .unwrap_or_default()
    }
}

impl FetchTarget for FetchedRow {
    fn assign_column(&mut self, column: &str, value: SqlValue) -> DbResult<()> {
        self.0.push((column.to_string(), value));
        Ok(())
    }
}

pub struct SchemaIntrospector<'c> {
    conn: &'c dyn Connection,
    config: PersistConfig,
}

impl<'c> SchemaIntrospector<'c> {
    pub fn new(conn: &'c dyn Connection, config: PersistConfig) -> Self {
        Self { conn, config }
    }

    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        let rows = self
            .fetch_all(LIST_TABLES_SQL)
            .map_err(|e| PersistError::statement("*", Operation::ListTables, LIST_TABLES_SQL, e))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.0.into_iter().next())
            .map(|(_, name)| name.to_string())
            .collect())
    }

    /// Columns of `table` in declaration order.
    pub fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let sql = format!("SHOW COLUMNS FROM {}", quote_ident(table));
        let rows = self
            .fetch_all(&sql)
            .map_err(|e| PersistError::schema(table, format!("cannot describe table: {}", e)))?;
        Ok(rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.text("Field"),
                raw_type: row.text("Type"),
                key: row.text("Key"),
                extra: row.text("Extra"),
            })
            .collect())
    }

    /// Entity metadata of `table`.
    ///
    /// A table with a composite primary key is described without a key and
    /// is therefore read-only.
    pub fn entity_meta(&self, table: &str) -> Result<EntityMeta> {
        let columns = self.describe_table(table)?;
        if columns.is_empty() {
            return Err(PersistError::schema(table, "table has no columns"));
        }

        let mut fields = Vec::with_capacity(columns.len());
        for column in &columns {
            if column.name.is_empty() {
                return Err(PersistError::schema(table, "column without a name"));
            }
            let field = map_column(&column.name, &column.raw_type, self.config.set_columns)
                .ok_or_else(|| {
                    PersistError::schema(
                        table,
                        format!("cannot parse type '{}' of column {}", column.raw_type, column.name),
                    )
                })?;
            fields.push(field);
        }

        let keys: Vec<&ColumnInfo> = columns.iter().filter(|c| c.is_primary_key()).collect();
        let primary_key = match keys.as_slice() {
            [] => None,
            [key] => Some(PrimaryKey::new(key.name.clone(), key.is_auto_increment())),
            composite => {
                let names: Vec<&str> = composite.iter().map(|c| c.name.as_str()).collect();
                tracing::warn!(table, key = ?names, "composite primary key, entity is read-only");
                None
            }
        };

        let meta = EntityMeta::new(table, fields, primary_key)?.with_default_key_generator(&self.config);
        tracing::debug!(
            table,
            fields = meta.fields().len(),
            primary_key = meta.primary_key().map(|pk| pk.name.as_str()),
            auto_increment = meta.is_auto_increment(),
            "table described"
        );
        Ok(meta)
    }

    /// Describe every table lazily; each item succeeds or fails on its own.
    pub fn scan(&self) -> Result<SchemaScan<'_, 'c>> {
        Ok(SchemaScan {
            introspector: self,
            tables: self.list_tables()?.into_iter(),
        })
    }

    /// Catalog of every table, halting on the first table that cannot be described.
    pub fn catalog(&self) -> Result<EntityCatalog> {
        let mut catalog = EntityCatalog::new(self.config.namespace.clone());
        for meta in self.scan()? {
            catalog.insert(meta?);
        }
        Ok(catalog)
    }

    fn fetch_all(&self, sql: &str) -> DbResult<Vec<FetchedRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        stmt.execute()?;
        let mut rows = Vec::new();
        loop {
            let mut row = FetchedRow::default();
            if !stmt.fetch_into(&mut row)? {
                return Ok(rows);
            }
            rows.push(row);
        }
    }
}

/// Lazy per-table schema scan.
pub struct SchemaScan<'a, 'c> {
    introspector: &'a SchemaIntrospector<'c>,
    tables: std::vec::IntoIter<String>,
}

impl Iterator for SchemaScan<'_, '_> {
    type Item = Result<EntityMeta>;

    fn next(&mut self) -> Option<Self::Item> {
        let table = self.tables.next()?;
        Some(self.introspector.entity_meta(&table))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.tables.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{ColumnDef, MemoryConnection, TableDef};
    use crate::schema::FieldKind;

    fn database() -> MemoryConnection {
        let conn = MemoryConnection::new();
        conn.create_table(
            TableDef::new("users")
                .column(ColumnDef::new("id", "int(11)").primary_key().auto_increment())
                .column(ColumnDef::new("name", "varchar(50)")),
        )
        .unwrap();
        conn.create_table(
            TableDef::new("memberships")
                .column(ColumnDef::new("user_id", "int(11)").primary_key())
                .column(ColumnDef::new("group_id", "int(11)").primary_key()),
        )
        .unwrap();
        conn.create_table(TableDef::new("audit_log").column(ColumnDef::new("line", "text")))
            .unwrap();
        conn
    }

    #[test]
    fn test_users_metadata() {
        let conn = database();
        let introspector = SchemaIntrospector::new(&conn, PersistConfig::default());
        let meta = introspector.entity_meta("users").unwrap();

        assert_eq!(meta.primary_key(), Some(&PrimaryKey::new("id", true)));
        assert_eq!(meta.fields()[0].kind, FieldKind::Int);
        assert_eq!(meta.fields()[1].kind, FieldKind::String);
        assert_eq!(meta.fields()[1].length, 50);
    }

    #[test]
    fn test_keyless_and_composite_are_read_only() {
        let conn = database();
        let introspector = SchemaIntrospector::new(&conn, PersistConfig::default());
        assert!(introspector.entity_meta("audit_log").unwrap().is_read_only());
        assert!(introspector.entity_meta("memberships").unwrap().is_read_only());
    }

    #[test]
    fn test_missing_table_is_schema_error() {
        let conn = database();
        let introspector = SchemaIntrospector::new(&conn, PersistConfig::default());
        let err = introspector.entity_meta("ghosts").unwrap_err();
        assert!(matches!(err, PersistError::Schema { ref table, .. } if table == "ghosts"));
    }

    #[test]
    fn test_scan_lists_every_table() {
        let conn = database();
        let introspector = SchemaIntrospector::new(&conn, PersistConfig::default());
        assert_eq!(introspector.list_tables().unwrap(), vec!["audit_log", "memberships", "users"]);

        let scanned: Vec<EntityMeta> = introspector
            .scan()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(scanned.len(), 3);
    }
}

use crate::core::{DbError, DbResult};
use crate::driver::{Connection, Statement};
use std::fmt;

/// The statements a record keeps prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Insert,
    Update,
    Delete,
    /// The open traversal cursor
    Current,
}

impl Slot {
    const ALL: [Slot; 4] = [Slot::Insert, Slot::Update, Slot::Delete, Slot::Current];

    fn index(self) -> usize {
        match self {
            Self::Insert => 0,
            Self::Update => 1,
            Self::Delete => 2,
            Self::Current => 3,
        }
    }
}

pub struct CachedStatement {
    /// Column indices the statement was built for
    signature: Vec<usize>,
    sql: String,
    statement: Box<dyn Statement>,
}

impl CachedStatement {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn signature(&self) -> &[usize] {
        &self.signature
    }

    pub fn statement(&mut self) -> &mut dyn Statement {
        self.statement.as_mut()
    }
}

impl fmt::Debug for CachedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedStatement")
            .field("signature", &self.signature)
            .field("sql", &self.sql)
            .finish()
    }
}

/// Per-record prepared statements: one per slot, owned exclusively.
#[derive(Debug, Default)]
pub struct StatementCache {
    slots: [Option<CachedStatement>; 4],
}

impl StatementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The statement cached in `slot` for `signature`, preparing `sql` and
    /// replacing the slot's previous statement when the signature differs.
    pub fn checkout(
        &mut self,
        conn: &dyn Connection,
        slot: Slot,
        signature: &[usize],
        sql: &str,
    ) -> DbResult<&mut CachedStatement> {
        let entry = &mut self.slots[slot.index()];
        let hit = entry
            .as_ref()
            .is_some_and(|cached| cached.signature == signature);
        if hit {
            tracing::trace!(?slot, sql, "statement cache hit");
        } else {
            tracing::debug!(?slot, sql, "statement cache miss, preparing");
            *entry = None;
            *entry = Some(CachedStatement {
                signature: signature.to_vec(),
                sql: sql.to_string(),
                statement: conn.prepare(sql)?,
            });
        }
        entry
            .as_mut()
            .ok_or_else(|| DbError::ExecutionError(format!("{:?} statement missing from cache", slot)))
    }

    /// Prepare `sql` into `slot` unconditionally.
    pub fn replace(&mut self, conn: &dyn Connection, slot: Slot, sql: &str) -> DbResult<&mut CachedStatement> {
        self.slots[slot.index()] = None;
        self.checkout(conn, slot, &[], sql)
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut CachedStatement> {
        self.slots[slot.index()].as_mut()
    }

    pub fn is_cached(&self, slot: Slot) -> bool {
        self.slots[slot.index()].is_some()
    }

    pub fn sql(&self, slot: Slot) -> Option<&str> {
        self.slots[slot.index()].as_ref().map(CachedStatement::sql)
    }

    pub fn invalidate(&mut self, slot: Slot) {
        self.slots[slot.index()] = None;
    }

    pub fn clear(&mut self) {
        for slot in Slot::ALL {
            self.invalidate(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{ColumnDef, LoggingConnection, MemoryConnection, TableDef};

    fn connection() -> LoggingConnection<MemoryConnection> {
        let conn = MemoryConnection::new()
            .with_table(
                TableDef::new("t")
                    .column(ColumnDef::new("id", "int").primary_key())
                    .column(ColumnDef::new("a", "int")),
            )
            .unwrap();
        LoggingConnection::new(conn)
    }

    #[test]
    fn test_same_signature_reuses_statement() {
        let conn = connection();
        let mut cache = StatementCache::new();
        let sql = "DELETE FROM `t` WHERE `id` = :__pk";

        cache.checkout(&conn, Slot::Delete, &[], sql).unwrap();
        cache.checkout(&conn, Slot::Delete, &[], sql).unwrap();
        assert_eq!(conn.prepared_count(), 1);

        cache
            .checkout(&conn, Slot::Insert, &[1], "INSERT INTO `t` (`a`) VALUES (:a)")
            .unwrap();
        cache
            .checkout(&conn, Slot::Insert, &[0, 1], "INSERT INTO `t` (`id`, `a`) VALUES (:id, :a)")
            .unwrap();
        assert_eq!(conn.prepared_count(), 3);
        assert_eq!(
            cache.sql(Slot::Insert),
            Some("INSERT INTO `t` (`id`, `a`) VALUES (:id, :a)")
        );
    }

    #[test]
    fn test_replace_and_invalidate() {
        let conn = connection();
        let mut cache = StatementCache::new();
        let sql = "SELECT `t`.`a` FROM `t`";
        cache.replace(&conn, Slot::Current, sql).unwrap();
        cache.replace(&conn, Slot::Current, sql).unwrap();
        assert_eq!(conn.prepared_count(), 2);

        cache.clear();
        assert!(!cache.is_cached(Slot::Current));
        assert!(cache.get_mut(Slot::Current).is_none());
    }
}

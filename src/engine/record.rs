use super::statement_cache::{Slot, StatementCache};
use super::traversal::FindAll;
use crate::core::{DbError, DbResult, Operation, PersistError, Result, SqlValue};
use crate::driver::{Connection, FetchTarget, Statement};
use crate::dsl::{Condition, FilterOp, FilterSpec, OrderSpec, OrderTerm, WhereClause, query_tail};
use crate::entity::{Entity, EntityMeta, FieldValue, coerce};
use crate::schema::FieldKind;
use crate::sql::{self, Params};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Lifecycle position of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Not (yet) backed by a row
    New,
    /// Mirrors a row as of the last load or save
    Loaded,
    /// The row was deleted
    Invalid,
}

/// A live row of an entity: field values, dirty set, traversal state and the
/// statements it keeps prepared.
///
/// Records borrow their connection and are not shared across threads.
pub struct Record<'c> {
    conn: &'c dyn Connection,
    meta: Arc<EntityMeta>,
    values: Vec<FieldValue>,
    dirty: BTreeSet<usize>,
    state: RecordState,
    valid: bool,
    filter: Vec<Condition>,
    /// Filter values bound at query time, by field index
    filter_values: HashMap<usize, SqlValue>,
    order: Vec<OrderTerm>,
    statements: StatementCache,
}

/// Receives fetched columns into a record's values without touching its dirty set.
struct RowSink<'a> {
    meta: &'a EntityMeta,
    values: &'a mut [FieldValue],
}

impl FetchTarget for RowSink<'_> {
    fn assign_column(&mut self, column: &str, value: SqlValue) -> DbResult<()> {
        let index = self
            .meta
            .field_index(column)
            .ok_or_else(|| DbError::ColumnNotFound(column.to_string(), self.meta.table_name().to_string()))?;
        self.values[index] = coerce::from_sql(&self.meta.fields()[index], value).map_err(DbError::TypeMismatch)?;
        Ok(())
    }
}

impl<'c> Record<'c> {
    /// An empty record: every field NULL, nothing dirty.
    pub fn new(conn: &'c dyn Connection, meta: Arc<EntityMeta>) -> Self {
        let values = vec![FieldValue::Null; meta.fields().len()];
        Self {
            conn,
            meta,
            values,
            dirty: BTreeSet::new(),
            state: RecordState::New,
            valid: false,
            filter: Vec::new(),
            filter_values: HashMap::new(),
            order: Vec::new(),
            statements: StatementCache::new(),
        }
    }

    pub fn of<E: Entity>(conn: &'c dyn Connection) -> Self {
        Self::new(conn, E::meta())
    }

    /// An empty record carrying a validated filter and order for traversal.
    pub fn with_query(
        conn: &'c dyn Connection,
        meta: Arc<EntityMeta>,
        filter: FilterSpec,
        order: OrderSpec,
    ) -> Result<Self> {
        let mut record = Self::new(conn, meta);
        record.set_where(filter)?;
        record.set_order(order)?;
        Ok(record)
    }

    /// Look a row up by primary key.
    pub fn load(conn: &'c dyn Connection, meta: Arc<EntityMeta>, id: impl Into<FieldValue>) -> Result<Option<Self>> {
        let mut record = Self::new(conn, meta);
        let found = record.thaw(id)?.is_some();
        Ok(found.then_some(record))
    }

    /// First row matching `filter` in `order`.
    pub fn find(
        conn: &'c dyn Connection,
        meta: Arc<EntityMeta>,
        filter: FilterSpec,
        order: OrderSpec,
    ) -> Result<Option<Self>> {
        let mut record = Self::with_query(conn, meta, filter, order)?;
        let found = record.find_first()?;
        Ok(found.then_some(record))
    }

    /// Every row matching `filter`, keyed by primary key. The query runs on
    /// the first call to `next`; the filter is validated here.
    pub fn find_all(
        conn: &'c dyn Connection,
        meta: Arc<EntityMeta>,
        filter: FilterSpec,
        order: OrderSpec,
    ) -> Result<FindAll<'c>> {
        Ok(FindAll::new(Self::with_query(conn, meta, filter, order)?))
    }

    pub fn meta(&self) -> &Arc<EntityMeta> {
        &self.meta
    }

    pub fn table_name(&self) -> &str {
        self.meta.table_name()
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    /// Whether the last traversal or lookup landed on a row.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Loaded and identified by a primary key value.
    pub fn is_record(&self) -> bool {
        self.state == RecordState::Loaded && self.key().is_some_and(|key| !key.is_null())
    }

    pub fn get(&self, name: &str) -> Result<&FieldValue> {
        let index = self.index_of(name)?;
        Ok(&self.values[index])
    }

    /// Primary key value, `None` for entities without a key.
    pub fn key(&self) -> Option<&FieldValue> {
        self.meta.key_index().map(|index| &self.values[index])
    }

    /// `(name, value)` pairs in column order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.meta
            .fields()
            .iter()
            .map(|f| f.name.as_str())
            .zip(self.values.iter())
    }

    /// Names of fields changed since the last load or save, in column order.
    pub fn dirty_fields(&self) -> Vec<&str> {
        self.dirty
            .iter()
            .map(|&index| self.meta.fields()[index].name.as_str())
            .collect()
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.meta
            .field_index(name)
            .is_some_and(|index| self.dirty.contains(&index))
    }

    /// Assign a field through its kind's setter rules and mark it dirty.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<&mut Self> {
        let index = self.index_of(name)?;
        let value = coerce::assign(&self.meta.fields()[index], value.into())
            .map_err(|message| PersistError::validation(self.meta.table_name(), message))?;
        self.values[index] = value;
        self.dirty.insert(index);
        Ok(self)
    }

    /// Assign a `set` field from flag labels.
    pub fn set_flags(&mut self, name: &str, labels: &[&str]) -> Result<&mut Self> {
        let field = &self.meta.fields()[self.index_of(name)?];
        if field.kind != FieldKind::Set {
            return Err(PersistError::validation(
                self.meta.table_name(),
                format!("{} is a {} field, not a set", name, field.kind),
            ));
        }
        let mask = field
            .label_mask(labels)
            .map_err(|message| PersistError::validation(self.meta.table_name(), message))?;
        self.set(name, FieldValue::Set(mask))
    }

    /// Replace the traversal filter.
    ///
    /// Every non-membership operand is parsed for its field's kind and
    /// assigned through the setter, so those fields become dirty. Nothing is
    /// assigned unless the whole filter is valid.
    pub fn set_where(&mut self, filter: FilterSpec) -> Result<&mut Self> {
        let conditions = filter.compile(&self.meta)?;

        let mut assigned = Vec::new();
        for condition in conditions.iter().filter(|c| c.op != FilterOp::In) {
            let field = &self.meta.fields()[condition.index];
            let value = coerce::parse_operand(field, &condition.operand)
                .and_then(|value| coerce::assign(field, value))
                .map_err(|message| PersistError::validation(self.meta.table_name(), message))?;
            assigned.push((condition.index, value));
        }

        self.filter_values.clear();
        for (index, value) in assigned {
            self.filter_values.insert(index, value.to_sql());
            self.values[index] = value;
            self.dirty.insert(index);
        }
        self.filter = conditions;
        Ok(self)
    }

    /// Replace the traversal order.
    pub fn set_order(&mut self, order: OrderSpec) -> Result<&mut Self> {
        self.order = order.compile(&self.meta)?;
        Ok(self)
    }

    /// Save: update a loaded row, insert anything else.
    ///
    /// A loaded row with no dirty fields is left alone: no statement is
    /// prepared and the call returns `Ok(())`, the same as a write that
    /// changed nothing. Check [`Record::dirty_fields`] first to tell the two
    /// apart.
    pub fn freeze(&mut self) -> Result<()> {
        if self.is_record() {
            self.update()
        } else {
            self.insert()
        }
    }

    /// Insert the dirty fields as a new row.
    ///
    /// A key that is not auto-increment is generated once, before the SQL is
    /// built. An auto-increment key is read back from the connection after
    /// execution; callers sharing the connection must serialize inserts.
    pub fn insert(&mut self) -> Result<()> {
        let key_index = self.writable_key(Operation::Insert)?;
        let auto_increment = self.meta.is_auto_increment();

        if !auto_increment {
            self.values[key_index] = self.meta.next_key()?;
        }

        let columns: Vec<usize> = (0..self.values.len())
            .filter(|&i| {
                if i == key_index {
                    !auto_increment
                } else {
                    self.dirty.contains(&i)
                }
            })
            .collect();
        let named: Vec<(usize, &str)> = columns
            .iter()
            .map(|&i| (i, self.meta.fields()[i].name.as_str()))
            .collect();
        let params = Params::new().for_columns(&named);
        let names: Vec<&str> = named.iter().map(|&(_, name)| name).collect();
        let sql = sql::insert(self.meta.table_name(), &names, &params);

        let Self {
            conn,
            meta,
            values,
            statements,
            ..
        } = self;
        let fail = |e| PersistError::statement(meta.table_name(), Operation::Insert, sql.as_str(), e);
        let cached = statements
            .checkout(*conn, Slot::Insert, &columns, &sql)
            .map_err(fail)?;
        let stmt = cached.statement();
        for (&i, name) in columns.iter().zip(&params) {
            bind(stmt, name, values[i].to_sql()).map_err(fail)?;
        }
        execute(stmt).map_err(fail)?;

        if auto_increment {
            let id = conn.last_insert_id().map_err(fail)?;
            values[key_index] = coerce::from_sql(&meta.fields()[key_index], id)
                .map_err(|message| fail(DbError::TypeMismatch(message)))?;
        }

        tracing::debug!(table = %meta.table_name(), key = %values[key_index], "inserted");
        self.dirty.clear();
        self.state = RecordState::Loaded;
        self.valid = true;
        Ok(())
    }

    /// Write the dirty fields of a loaded row. Succeeds without SQL when
    /// nothing but the key is dirty.
    pub fn update(&mut self) -> Result<()> {
        let key_index = self.writable_key(Operation::Update)?;
        let key = self.existing_key(key_index, Operation::Update)?;

        let columns: Vec<usize> = self.dirty.iter().copied().filter(|&i| i != key_index).collect();
        if columns.is_empty() {
            tracing::debug!(table = %self.meta.table_name(), "update skipped, nothing dirty");
            self.dirty.clear();
            return Ok(());
        }
        let named: Vec<(usize, &str)> = columns
            .iter()
            .map(|&i| (i, self.meta.fields()[i].name.as_str()))
            .collect();
        let params = Params::keyed().for_columns(&named);
        let names: Vec<&str> = named.iter().map(|&(_, name)| name).collect();
        let sql = sql::update(self.meta.table_name(), &names, &params, names_of_key(&self.meta, key_index));

        let Self {
            conn,
            meta,
            values,
            statements,
            ..
        } = self;
        let fail = |e| PersistError::statement(meta.table_name(), Operation::Update, sql.as_str(), e);
        let cached = statements
            .checkout(*conn, Slot::Update, &columns, &sql)
            .map_err(fail)?;
        let stmt = cached.statement();
        for (&i, name) in columns.iter().zip(&params) {
            bind(stmt, name, values[i].to_sql()).map_err(fail)?;
        }
        bind(stmt, sql::KEY_PARAM, key).map_err(fail)?;
        execute(stmt).map_err(fail)?;

        tracing::debug!(table = %meta.table_name(), fields = columns.len(), "updated");
        self.dirty.clear();
        self.state = RecordState::Loaded;
        Ok(())
    }

    /// Delete the row by primary key, then reset the key to its zero value.
    pub fn delete(&mut self) -> Result<()> {
        let key_index = self.writable_key(Operation::Delete)?;
        let key = self.existing_key(key_index, Operation::Delete)?;
        let sql = sql::delete(self.meta.table_name(), names_of_key(&self.meta, key_index));

        let Self {
            conn,
            meta,
            statements,
            ..
        } = self;
        let fail = |e| PersistError::statement(meta.table_name(), Operation::Delete, sql.as_str(), e);
        let cached = statements
            .checkout(*conn, Slot::Delete, &[], &sql)
            .map_err(fail)?;
        let stmt = cached.statement();
        bind(stmt, sql::KEY_PARAM, key).map_err(fail)?;
        execute(stmt).map_err(fail)?;

        self.values[key_index] = coerce::zero_value(&self.meta.fields()[key_index]);
        self.dirty.clear();
        self.state = RecordState::Invalid;
        self.valid = false;
        Ok(())
    }

    /// Load the row with primary key `id` into this record.
    ///
    /// Returns `Ok(None)` when no row matches; the key is then cleared.
    pub fn thaw(&mut self, id: impl Into<FieldValue>) -> Result<Option<&mut Self>> {
        let key_index = self.writable_key(Operation::Thaw)?;
        let key_field = &self.meta.fields()[key_index];
        let key = coerce::key(key_field, id.into())
            .map_err(|message| PersistError::validation(self.meta.table_name(), message))?;

        let mut columns: Vec<&str> = self
            .meta
            .fields()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != key_index)
            .map(|(_, f)| f.name.as_str())
            .collect();
        if columns.is_empty() {
            columns.push(key_field.name.as_str());
        }
        let sql = sql::select_by_key(self.meta.table_name(), &columns, &key_field.name);

        let fail = |e| PersistError::statement(self.meta.table_name(), Operation::Thaw, sql.as_str(), e);
        let mut stmt = self.conn.prepare(&sql).map_err(fail)?;
        bind(stmt.as_mut(), sql::KEY_PARAM, key.to_sql()).map_err(fail)?;
        execute(stmt.as_mut()).map_err(fail)?;
        let mut sink = RowSink {
            meta: &self.meta,
            values: &mut self.values,
        };
        let found = stmt.fetch_into(&mut sink).map_err(|e| {
            PersistError::statement(self.meta.table_name(), Operation::Thaw, sql.as_str(), e)
        })?;

        self.dirty.clear();
        self.valid = found;
        if found {
            self.values[key_index] = key;
            self.state = RecordState::Loaded;
            tracing::trace!(table = %self.meta.table_name(), key = %self.values[key_index], "thawed");
            Ok(Some(self))
        } else {
            self.values[key_index] = FieldValue::Null;
            self.state = RecordState::New;
            Ok(None)
        }
    }

    /// Run the traversal query and load its first row.
    pub fn find_first(&mut self) -> Result<bool> {
        let filter_values = &self.filter_values;
        let clause = WhereClause::render(&self.filter, |condition| {
            filter_values
                .get(&condition.index)
                .cloned()
                .unwrap_or(SqlValue::Null)
        });
        let names: Vec<&str> = self.meta.fields().iter().map(|f| f.name.as_str()).collect();
        let sql = sql::select(self.meta.table_name(), &names, &query_tail(&clause, &self.order));

        let Self {
            conn,
            meta,
            values,
            statements,
            ..
        } = self;
        let fail = |e| PersistError::statement(meta.table_name(), Operation::Find, sql.as_str(), e);
        let cached = statements.replace(*conn, Slot::Current, &sql).map_err(fail)?;
        let stmt = cached.statement();
        for (name, value) in clause.params {
            bind(stmt, &name, value).map_err(fail)?;
        }
        execute(stmt).map_err(fail)?;
        let found = stmt
            .fetch_into(&mut RowSink {
                meta: Arc::as_ref(meta),
                values: values.as_mut_slice(),
            })
            .map_err(fail)?;

        self.loaded(found);
        Ok(found)
    }

    /// Advance the open traversal cursor. `Ok(false)` when exhausted or when
    /// no traversal has been started.
    pub fn find_next(&mut self) -> Result<bool> {
        let Self {
            meta,
            values,
            statements,
            ..
        } = self;
        let Some(cached) = statements.get_mut(Slot::Current) else {
            return Ok(false);
        };
        let sql = cached.sql().to_string();
        let found = cached
            .statement()
            .fetch_into(&mut RowSink {
                meta: Arc::as_ref(meta),
                values: values.as_mut_slice(),
            })
            .map_err(|e| PersistError::statement(meta.table_name(), Operation::FindNext, sql, e))?;

        self.loaded(found);
        Ok(found)
    }

    /// Drop every prepared statement, including the open cursor.
    pub fn invalidate_statements(&mut self) {
        self.statements.clear();
    }

    fn loaded(&mut self, found: bool) {
        self.valid = found;
        if found {
            self.dirty.clear();
            self.state = RecordState::Loaded;
            tracing::trace!(table = %self.meta.table_name(), "row fetched");
        }
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.meta.field_index(name).ok_or_else(|| {
            PersistError::validation(self.meta.table_name(), format!("unknown field {}", name))
        })
    }

    fn writable_key(&self, operation: Operation) -> Result<usize> {
        self.meta.key_index().ok_or_else(|| PersistError::ReadOnly {
            table: self.meta.table_name().to_string(),
            operation,
        })
    }

    fn existing_key(&self, key_index: usize, operation: Operation) -> Result<SqlValue> {
        let key = &self.values[key_index];
        if key.is_null() {
            return Err(PersistError::validation(
                self.meta.table_name(),
                format!("cannot {} without a primary key value", operation),
            ));
        }
        Ok(key.to_sql())
    }
}

fn names_of_key(meta: &EntityMeta, key_index: usize) -> &str {
    meta.fields()[key_index].name.as_str()
}

fn bind(stmt: &mut dyn Statement, name: &str, value: SqlValue) -> DbResult<()> {
    stmt.bind_value(name, value)
}

fn execute(stmt: &mut dyn Statement) -> DbResult<()> {
    if stmt.execute()? {
        Ok(())
    } else {
        Err(DbError::ExecutionError("statement execution reported failure".to_string()))
    }
}

impl Clone for Record<'_> {
    /// Copies the row state; prepared statements are never shared.
    fn clone(&self) -> Self {
        Self {
            conn: self.conn,
            meta: Arc::clone(&self.meta),
            values: self.values.clone(),
            dirty: self.dirty.clone(),
            state: self.state,
            valid: self.valid,
            filter: self.filter.clone(),
            filter_values: self.filter_values.clone(),
            order: self.order.clone(),
            statements: StatementCache::new(),
        }
    }
}

impl fmt::Debug for Record<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("table", &self.meta.table_name())
            .field("values", &self.fields().collect::<Vec<_>>())
            .field("dirty", &self.dirty_fields())
            .field("state", &self.state)
            .field("valid", &self.valid)
            .finish()
    }
}

//! In-memory, MySQL-flavoured reference backend.
//!
//! Executes exactly the statement shapes the engine and the schema
//! introspector produce. Single-threaded: clones share the same tables.

mod catalog;
mod pattern;
mod sql;
mod table;

pub use catalog::{ColumnDef, TableDef};

use super::{Connection, FetchTarget, Statement};
use crate::core::{DbError, DbResult, SqlValue};
use sql::{Command, Operand, Predicate};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;
use table::{Filter, Table};

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, Table>,
    last_insert_id: i64,
}

impl MemoryState {
    fn table(&self, name: &str) -> DbResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> DbResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }
}

/// Connection handle over shared in-memory tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnection {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, def: TableDef) -> DbResult<()> {
        let mut state = self.state.borrow_mut();
        if state.tables.contains_key(&def.name) {
            return Err(DbError::ExecutionError(format!(
                "Table '{}' already exists",
                def.name
            )));
        }
        tracing::debug!(table = %def.name, columns = def.columns.len(), "create table");
        state.tables.insert(def.name.clone(), Table::new(def)?);
        Ok(())
    }

    /// Builder form of [`create_table`](Self::create_table).
    pub fn with_table(self, def: TableDef) -> DbResult<Self> {
        self.create_table(def)?;
        Ok(self)
    }

    pub fn drop_table(&self, name: &str) -> DbResult<()> {
        self.state
            .borrow_mut()
            .tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn table_names(&self) -> Vec<String> {
        self.state.borrow().tables.keys().cloned().collect()
    }

    pub fn row_count(&self, table: &str) -> DbResult<usize> {
        Ok(self.state.borrow().table(table)?.rows().len())
    }

    /// All rows of `table` in storage order, every column included.
    pub fn rows(&self, table: &str) -> DbResult<Vec<Vec<SqlValue>>> {
        Ok(self.state.borrow().table(table)?.rows().to_vec())
    }

    fn check(&self, command: &Command) -> DbResult<()> {
        let state = self.state.borrow();
        let (table, columns): (&str, Vec<&str>) = match command {
            Command::ShowTables => return Ok(()),
            Command::ShowColumns { table } => (table.as_str(), Vec::new()),
            Command::Insert { table, columns, .. } => (table.as_str(), columns.iter().map(String::as_str).collect()),
            Command::Update {
                table,
                assignments,
                filter,
            } => (
                table.as_str(),
                assignments
                    .iter()
                    .map(|(c, _)| c.as_str())
                    .chain(filter.iter().map(Predicate::column))
                    .collect(),
            ),
            Command::Delete { table, filter } => (table.as_str(), filter.iter().map(Predicate::column).collect()),
            Command::Select {
                table,
                columns,
                filter,
                order,
            } => (
                table.as_str(),
                columns
                    .iter()
                    .map(String::as_str)
                    .chain(filter.iter().map(Predicate::column))
                    .chain(order.iter().map(|(c, _)| c.as_str()))
                    .collect(),
            ),
        };
        let table = state.table(table)?;
        for column in columns {
            table.column_index(column)?;
        }
        Ok(())
    }
}

impl Connection for MemoryConnection {
    fn prepare(&self, sql: &str) -> DbResult<Box<dyn Statement>> {
        let command = sql::parse(sql)?;
        self.check(&command)?;
        let params = command.params().into_iter().map(str::to_string).collect();
        Ok(Box::new(MemoryStatement {
            sql: sql.to_string(),
            command,
            params,
            bindings: HashMap::new(),
            cursor: None,
            state: Rc::clone(&self.state),
        }))
    }

    fn last_insert_id(&self) -> DbResult<SqlValue> {
        Ok(SqlValue::Integer(self.state.borrow().last_insert_id))
    }
}

#[derive(Debug)]
struct ResultSet {
    columns: Vec<String>,
    rows: VecDeque<Vec<SqlValue>>,
}

#[derive(Debug)]
struct MemoryStatement {
    sql: String,
    command: Command,
    params: Vec<String>,
    bindings: HashMap<String, SqlValue>,
    cursor: Option<ResultSet>,
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryStatement {
    fn resolve(&self, operand: &Operand) -> DbResult<SqlValue> {
        match operand {
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Param(name) => self
                .bindings
                .get(name)
                .cloned()
                .ok_or_else(|| DbError::ExecutionError(format!("No value bound for parameter {}", name))),
        }
    }

    fn filter(&self, table: &Table, predicates: &[Predicate]) -> DbResult<Vec<Filter>> {
        predicates
            .iter()
            .map(|predicate| match predicate {
                Predicate::Compare {
                    column,
                    op,
                    operand,
                } => Ok(Filter::Compare {
                    column: table.column_index(column)?,
                    op: *op,
                    value: self.resolve(operand)?,
                }),
                Predicate::In { column, operands } => Ok(Filter::In {
                    column: table.column_index(column)?,
                    values: operands
                        .iter()
                        .map(|o| self.resolve(o))
                        .collect::<DbResult<_>>()?,
                }),
            })
            .collect()
    }

    fn run(&self, state: &mut MemoryState) -> DbResult<Option<ResultSet>> {
        match &self.command {
            Command::ShowTables => Ok(Some(ResultSet {
                columns: vec!["Tables_in_memory".to_string()],
                rows: state
                    .tables
                    .keys()
                    .map(|name| vec![SqlValue::Text(name.clone())])
                    .collect(),
            })),
            Command::ShowColumns { table } => {
                let table = state.table(table)?;
                let described: Vec<_> = table.def().columns.iter().map(|c| c.describe()).collect();
                let columns: Vec<String> = described
                    .first()
                    .map(|row| row.iter().map(|(name, _)| name.to_string()).collect())
                    .unwrap_or_default();
                let rows: VecDeque<Vec<SqlValue>> = described
                    .into_iter()
                    .map(|row| row.into_iter().map(|(_, value)| value).collect())
                    .collect();
                Ok(Some(ResultSet { columns, rows }))
            }
            Command::Insert {
                table,
                columns,
                values,
            } => {
                let values = values
                    .iter()
                    .map(|v| self.resolve(v))
                    .collect::<DbResult<Vec<_>>>()?;
                let target = state.table_mut(table)?;
                let columns = columns
                    .iter()
                    .map(|c| target.column_index(c))
                    .collect::<DbResult<Vec<_>>>()?;
                if let Some(id) = target.insert(&columns, values)? {
                    state.last_insert_id = id;
                }
                Ok(None)
            }
            Command::Update {
                table,
                assignments,
                filter,
            } => {
                let target = state.table_mut(table)?;
                let filter = self.filter(target, filter)?;
                let assignments = assignments
                    .iter()
                    .map(|(c, v)| Ok((target.column_index(c)?, self.resolve(v)?)))
                    .collect::<DbResult<Vec<_>>>()?;
                let affected = target.update(&assignments, &filter)?;
                tracing::trace!(affected, "update");
                Ok(None)
            }
            Command::Delete { table, filter } => {
                let target = state.table_mut(table)?;
                let filter = self.filter(target, filter)?;
                let affected = target.delete(&filter)?;
                tracing::trace!(affected, "delete");
                Ok(None)
            }
            Command::Select {
                table,
                columns,
                filter,
                order,
            } => {
                let source = state.table(table)?;
                let names: Vec<String> = if columns.is_empty() {
                    source.def().columns.iter().map(|c| c.name.clone()).collect()
                } else {
                    columns.clone()
                };
                let projection = names
                    .iter()
                    .map(|c| source.column_index(c))
                    .collect::<DbResult<Vec<_>>>()?;
                let order = order
                    .iter()
                    .map(|(c, descending)| Ok((source.column_index(c)?, *descending)))
                    .collect::<DbResult<Vec<_>>>()?;
                let filter = self.filter(source, filter)?;
                let rows = source.select(&projection, &filter, &order)?;
                Ok(Some(ResultSet {
                    columns: names,
                    rows: rows.into(),
                }))
            }
        }
    }
}

impl Statement for MemoryStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind_value(&mut self, name: &str, value: SqlValue) -> DbResult<()> {
        if !self.params.iter().any(|p| p == name) {
            return Err(DbError::ExecutionError(format!(
                "Statement has no parameter {}",
                name
            )));
        }
        self.bindings.insert(name.to_string(), value);
        Ok(())
    }

    fn execute(&mut self) -> DbResult<bool> {
        self.cursor = None;
        let mut state = self.state.borrow_mut();
        self.cursor = self.run(&mut state)?;
        Ok(true)
    }

    fn fetch_into(&mut self, target: &mut dyn FetchTarget) -> DbResult<bool> {
        let cursor = match self.cursor.as_mut() {
            Some(cursor) => cursor,
            None if self.command.is_query() => {
                return Err(DbError::ExecutionError(
                    "Statement has not been executed".to_string(),
                ));
            }
            None => return Ok(false),
        };
        let Some(row) = cursor.rows.pop_front() else {
            return Ok(false);
        };
        for (column, value) in cursor.columns.iter().zip(row) {
            target.assign_column(column, value)?;
        }
        Ok(true)
    }
}

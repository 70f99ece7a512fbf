use super::{Connection, FetchTarget, Statement};
use crate::core::{DbResult, SqlValue};
use std::cell::RefCell;
use std::rc::Rc;

/// One execution of a prepared statement with the values bound at that time.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub sql: String,
    pub params: Vec<(String, SqlValue)>,
}

impl Execution {
    pub fn param(&self, name: &str) -> Option<&SqlValue> {
        self.params
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Default)]
struct Journal {
    prepared: Vec<String>,
    executed: Vec<Execution>,
}

/// Decorates a connection with `tracing` events and an in-process journal of
/// prepared and executed SQL.
pub struct LoggingConnection<C> {
    inner: C,
    journal: Rc<RefCell<Journal>>,
}

impl<C: Connection> LoggingConnection<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            journal: Rc::new(RefCell::new(Journal::default())),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// SQL text of every statement prepared so far, in order.
    pub fn history(&self) -> Vec<String> {
        self.journal.borrow().prepared.clone()
    }

    pub fn prepared_count(&self) -> usize {
        self.journal.borrow().prepared.len()
    }

    pub fn executions(&self) -> Vec<Execution> {
        self.journal.borrow().executed.clone()
    }

    pub fn last_execution(&self) -> Option<Execution> {
        self.journal.borrow().executed.last().cloned()
    }

    pub fn clear_history(&self) {
        let mut journal = self.journal.borrow_mut();
        journal.prepared.clear();
        journal.executed.clear();
    }
}

impl<C: Connection> Connection for LoggingConnection<C> {
    fn prepare(&self, sql: &str) -> DbResult<Box<dyn Statement>> {
        tracing::debug!(sql, "prepare");
        let inner = self.inner.prepare(sql)?;
        self.journal.borrow_mut().prepared.push(sql.to_string());
        Ok(Box::new(LoggingStatement {
            inner,
            params: Vec::new(),
            journal: Rc::clone(&self.journal),
        }))
    }

    fn last_insert_id(&self) -> DbResult<SqlValue> {
        let id = self.inner.last_insert_id()?;
        tracing::trace!(%id, "last insert id");
        Ok(id)
    }
}

struct LoggingStatement {
    inner: Box<dyn Statement>,
    params: Vec<(String, SqlValue)>,
    journal: Rc<RefCell<Journal>>,
}

impl Statement for LoggingStatement {
    fn sql(&self) -> &str {
        self.inner.sql()
    }

    fn bind_value(&mut self, name: &str, value: SqlValue) -> DbResult<()> {
        self.inner.bind_value(name, value.clone())?;
        match self.params.iter_mut().find(|(param, _)| param == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name.to_string(), value)),
        }
        Ok(())
    }

    fn execute(&mut self) -> DbResult<bool> {
        tracing::debug!(sql = self.inner.sql(), params = ?self.params, "execute");
        self.journal.borrow_mut().executed.push(Execution {
            sql: self.inner.sql().to_string(),
            params: self.params.clone(),
        });
        self.inner.execute()
    }

    fn fetch_into(&mut self, target: &mut dyn FetchTarget) -> DbResult<bool> {
        self.inner.fetch_into(target)
    }
}

use super::catalog::TableDef;
use super::pattern;
use super::sql::CompareOp;
use crate::core::{DbError, DbResult, SqlValue};
use crate::schema::FieldKind;
use std::cmp::Ordering;

/// A resolved predicate: column index plus bound values.
#[derive(Debug, Clone)]
pub enum Filter {
    Compare {
        column: usize,
        op: CompareOp,
        value: SqlValue,
    },
    In {
        column: usize,
        values: Vec<SqlValue>,
    },
}

impl Filter {
    /// NULL never satisfies a predicate.
    fn matches(&self, row: &[SqlValue]) -> DbResult<bool> {
        match self {
            Self::Compare { column, op, value } => {
                let cell = &row[*column];
                if cell.is_null() || value.is_null() {
                    return Ok(false);
                }
                let ordering = cell.compare(value);
                Ok(match op {
                    CompareOp::Eq => ordering == Some(Ordering::Equal),
                    CompareOp::NotEq => ordering.is_some_and(|o| o != Ordering::Equal),
                    CompareOp::Lt => ordering == Some(Ordering::Less),
                    CompareOp::LtEq => ordering.is_some_and(|o| o != Ordering::Greater),
                    CompareOp::Gt => ordering == Some(Ordering::Greater),
                    CompareOp::GtEq => ordering.is_some_and(|o| o != Ordering::Less),
                    CompareOp::Like => pattern::like(&cell.to_string(), &value.to_string())?,
                    CompareOp::BitAnd => cell.to_bits()? & value.to_bits()? != 0,
                    CompareOp::BitOr => cell.to_bits()? | value.to_bits()? != 0,
                    CompareOp::BitXor => cell.to_bits()? ^ value.to_bits()? != 0,
                })
            }
            Self::In { column, values } => {
                let cell = &row[*column];
                if cell.is_null() {
                    return Ok(false);
                }
                Ok(values
                    .iter()
                    .any(|v| cell.compare(v) == Some(Ordering::Equal)))
            }
        }
    }
}

/// Rows of one in-memory table, kept in insertion order.
#[derive(Debug, Clone)]
pub struct Table {
    def: TableDef,
    kinds: Vec<FieldKind>,
    rows: Vec<Vec<SqlValue>>,
    next_auto: i64,
}

impl Table {
    pub fn new(def: TableDef) -> DbResult<Self> {
        for (idx, column) in def.columns.iter().enumerate() {
            if def.column_index(&column.name) != Some(idx) {
                return Err(DbError::ConstraintViolation(format!(
                    "Duplicate column '{}' in table '{}'",
                    column.name, def.name
                )));
            }
        }
        if def.columns.iter().filter(|c| c.auto_increment).count() > 1 {
            return Err(DbError::ConstraintViolation(format!(
                "Table '{}' declares more than one auto_increment column",
                def.name
            )));
        }
        let kinds = def.columns.iter().map(|c| c.kind()).collect();
        Ok(Self {
            def,
            kinds,
            rows: Vec::new(),
            next_auto: 1,
        })
    }

    pub fn def(&self) -> &TableDef {
        &self.def
    }

    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows
    }

    pub fn column_index(&self, name: &str) -> DbResult<usize> {
        self.def
            .column_index(name)
            .ok_or_else(|| DbError::ColumnNotFound(name.to_string(), self.def.name.clone()))
    }

    /// Insert one row. Returns the generated auto-increment key, if any.
    pub fn insert(&mut self, columns: &[usize], values: Vec<SqlValue>) -> DbResult<Option<i64>> {
        let mut row: Vec<SqlValue> = self
            .def
            .columns
            .iter()
            .map(|c| c.default.clone().unwrap_or(SqlValue::Null))
            .collect();
        for (&column, value) in columns.iter().zip(values) {
            row[column] = self.coerce(column, value)?;
        }

        let mut generated = None;
        if let Some(auto) = self.def.auto_increment_column() {
            match row[auto].as_i64() {
                Some(explicit) if explicit != 0 => {
                    self.next_auto = self.next_auto.max(explicit + 1);
                }
                _ => {
                    row[auto] = SqlValue::Integer(self.next_auto);
                    generated = Some(self.next_auto);
                    self.next_auto += 1;
                }
            }
        }

        self.check_not_null(&row)?;
        self.check_unique(&row, None)?;
        self.rows.push(row);
        Ok(generated)
    }

    /// Apply `assignments` to every row matching `filter`. Returns the number of rows changed.
    pub fn update(&mut self, assignments: &[(usize, SqlValue)], filter: &[Filter]) -> DbResult<usize> {
        let targets = self.matching(filter)?;
        let mut updated = Vec::with_capacity(targets.len());
        for &idx in &targets {
            let mut row = self.rows[idx].clone();
            for (column, value) in assignments {
                row[*column] = self.coerce(*column, value.clone())?;
            }
            self.check_not_null(&row)?;
            self.check_unique(&row, Some(idx))?;
            updated.push((idx, row));
        }
        for (idx, row) in updated {
            self.rows[idx] = row;
        }
        Ok(targets.len())
    }

    pub fn delete(&mut self, filter: &[Filter]) -> DbResult<usize> {
        let targets = self.matching(filter)?;
        let mut position = 0;
        self.rows.retain(|_| {
            let keep = targets.binary_search(&position).is_err();
            position += 1;
            keep
        });
        Ok(targets.len())
    }

    /// Project `columns` of matching rows, sorted by `order` (NULLs first ascending).
    pub fn select(
        &self,
        columns: &[usize],
        filter: &[Filter],
        order: &[(usize, bool)],
    ) -> DbResult<Vec<Vec<SqlValue>>> {
        let mut rows: Vec<&Vec<SqlValue>> = self
            .matching(filter)?
            .into_iter()
            .map(|idx| &self.rows[idx])
            .collect();

        if !order.is_empty() {
            rows.sort_by(|a, b| {
                for &(column, descending) in order {
                    let ordering = sort_order(&a[column], &b[column]);
                    let ordering = if descending { ordering.reverse() } else { ordering };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| columns.iter().map(|&c| row[c].clone()).collect())
            .collect())
    }

    fn matching(&self, filter: &[Filter]) -> DbResult<Vec<usize>> {
        let mut matches = Vec::new();
        'rows: for (idx, row) in self.rows.iter().enumerate() {
            for predicate in filter {
                if !predicate.matches(row)? {
                    continue 'rows;
                }
            }
            matches.push(idx);
        }
        Ok(matches)
    }

    fn coerce(&self, column: usize, value: SqlValue) -> DbResult<SqlValue> {
        if value.is_null() {
            return Ok(value);
        }
        let mismatch = |value: &SqlValue| {
            DbError::TypeMismatch(format!(
                "Column '{}' ({}) cannot store {} '{}'",
                self.def.columns[column].name,
                self.def.columns[column].raw_type,
                value.type_name(),
                value
            ))
        };
        match self.kinds[column] {
            FieldKind::Int | FieldKind::Bool => value
                .as_i64()
                .map(SqlValue::Integer)
                .ok_or_else(|| mismatch(&value)),
            FieldKind::Float => value
                .as_f64()
                .map(SqlValue::Float)
                .ok_or_else(|| mismatch(&value)),
            FieldKind::Set => Ok(value.as_i64().map_or(value, SqlValue::Integer)),
            FieldKind::String | FieldKind::Date | FieldKind::DateTime => match value {
                SqlValue::Text(_) => Ok(value),
                other => Ok(SqlValue::Text(other.to_string())),
            },
        }
    }

    fn check_not_null(&self, row: &[SqlValue]) -> DbResult<()> {
        for (column, value) in self.def.columns.iter().zip(row) {
            if !column.nullable && value.is_null() {
                return Err(DbError::ConstraintViolation(format!(
                    "Column '{}' of '{}' cannot be null",
                    column.name, self.def.name
                )));
            }
        }
        Ok(())
    }

    fn check_unique(&self, row: &[SqlValue], skip: Option<usize>) -> DbResult<()> {
        let key = self.def.primary_key();
        if key.is_empty() {
            return Ok(());
        }
        let duplicate = self.rows.iter().enumerate().any(|(idx, existing)| {
            Some(idx) != skip
                && key
                    .iter()
                    .all(|&c| existing[c].compare(&row[c]) == Some(Ordering::Equal))
        });
        if duplicate {
            let values: Vec<String> = key.iter().map(|&c| row[c].to_string()).collect();
            return Err(DbError::ConstraintViolation(format!(
                "Duplicate entry '{}' for key 'PRIMARY' in '{}'",
                values.join("-"),
                self.def.name
            )));
        }
        Ok(())
    }
}

fn sort_order(a: &SqlValue, b: &SqlValue) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory::ColumnDef;

    fn users() -> Table {
        Table::new(
            TableDef::new("users")
                .column(ColumnDef::new("id", "int(11)").primary_key().auto_increment())
                .column(ColumnDef::new("name", "varchar(50)"))
                .column(ColumnDef::new("age", "int(3)")),
        )
        .unwrap()
    }

    #[test]
    fn test_auto_increment_and_uniqueness() {
        let mut table = users();
        assert_eq!(table.insert(&[1], vec!["Ada".into()]).unwrap(), Some(1));
        assert_eq!(table.insert(&[0, 1], vec![10.into(), "Bob".into()]).unwrap(), None);
        assert_eq!(table.insert(&[1], vec!["Cy".into()]).unwrap(), Some(11));

        let err = table.insert(&[0], vec![10.into()]).unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation(_)));
        assert_eq!(table.rows().len(), 3);
    }

    #[test]
    fn test_int_column_rejects_text() {
        let mut table = users();
        assert!(matches!(
            table.insert(&[2], vec!["old".into()]),
            Err(DbError::TypeMismatch(_))
        ));
        table.insert(&[2], vec!["42".into()]).unwrap();
        assert_eq!(table.rows()[0][2], SqlValue::Integer(42));
    }

    #[test]
    fn test_select_filter_and_order() {
        let mut table = users();
        for (name, age) in [("Ada", 36), ("Bob", 25), ("Cy", 41)] {
            table.insert(&[1, 2], vec![name.into(), age.into()]).unwrap();
        }
        table.insert(&[1], vec!["Dee".into()]).unwrap();

        let older = Filter::Compare {
            column: 2,
            op: CompareOp::Gt,
            value: "30".into(),
        };
        let rows = table.select(&[1], &[older], &[(1, true)]).unwrap();
        assert_eq!(rows, vec![vec![SqlValue::from("Cy")], vec![SqlValue::from("Ada")]]);

        let by_age = table.select(&[1], &[], &[(2, false)]).unwrap();
        assert_eq!(by_age[0], vec![SqlValue::from("Dee")]);
    }

    #[test]
    fn test_update_and_delete() {
        let mut table = users();
        table.insert(&[1], vec!["Ada".into()]).unwrap();
        table.insert(&[1], vec!["Bob".into()]).unwrap();

        let first = Filter::Compare {
            column: 0,
            op: CompareOp::Eq,
            value: 1.into(),
        };
        assert_eq!(table.update(&[(2, 37.into())], &[first.clone()]).unwrap(), 1);
        assert_eq!(table.rows()[0][2], SqlValue::Integer(37));

        assert_eq!(table.delete(&[first]).unwrap(), 1);
        assert_eq!(table.rows().len(), 1);
        assert_eq!(table.rows()[0][1], SqlValue::from("Bob"));
    }
}

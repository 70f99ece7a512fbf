use crate::core::SqlValue;
use crate::schema::{FieldKind, kind_of};

/// Declaration of an in-memory table, using raw MySQL column types.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn auto_increment_column(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.auto_increment)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub raw_type: String,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub nullable: bool,
    pub default: Option<SqlValue>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, raw_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw_type: raw_type.into(),
            primary_key: false,
            auto_increment: false,
            nullable: true,
            default: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<SqlValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Storage kind derived from the base type name. Unknown types store text.
    pub fn kind(&self) -> FieldKind {
        let base: String = self
            .raw_type
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        kind_of(&base.to_ascii_lowercase()).unwrap_or(FieldKind::String)
    }

    /// `SHOW COLUMNS` row: Field, Type, Null, Key, Default, Extra.
    pub(super) fn describe(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("Field", SqlValue::Text(self.name.clone())),
            ("Type", SqlValue::Text(self.raw_type.clone())),
            ("Null", SqlValue::Text(if self.nullable { "YES" } else { "NO" }.to_string())),
            ("Key", SqlValue::Text(if self.primary_key { "PRI" } else { "" }.to_string())),
            ("Default", self.default.clone().unwrap_or(SqlValue::Null)),
            (
                "Extra",
                SqlValue::Text(if self.auto_increment { "auto_increment" } else { "" }.to_string()),
            ),
        ]
    }
}

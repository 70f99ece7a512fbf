use crate::core::{PersistError, Result};
use crate::entity::EntityMeta;
use crate::sql::quote_ident;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// Case-insensitive `asc` / `desc`. An empty token means ascending.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "" | "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Field name → direction token, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderSpec {
    entries: Vec<(String, String)>,
}

impl OrderSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, direction: impl Into<String>) -> Self {
        self.insert(field, direction);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, direction: impl Into<String>) {
        let field = field.into();
        let direction = direction.into();
        match self.entries.iter_mut().find(|(name, _)| *name == field) {
            Some(entry) => entry.1 = direction,
            None => self.entries.push((field, direction)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(f, d)| (f.as_str(), d.as_str()))
    }

    pub fn compile(&self, meta: &EntityMeta) -> Result<Vec<OrderTerm>> {
        self.entries
            .iter()
            .map(|(field, token)| {
                if !meta.has_field(field) {
                    return Err(PersistError::validation(
                        meta.table_name(),
                        format!("unknown order field {}", field),
                    ));
                }
                let direction = Direction::parse(token).ok_or_else(|| {
                    PersistError::validation(
                        meta.table_name(),
                        format!("invalid direction '{}' for {}", token, field),
                    )
                })?;
                Ok(OrderTerm {
                    field: field.clone(),
                    direction,
                })
            })
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OrderSpec {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut spec = Self::new();
        for (field, direction) in iter {
            spec.insert(field, direction);
        }
        spec
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for OrderSpec {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub field: String,
    pub direction: Direction,
}

/// `ORDER BY ...`, or an empty string for no terms.
pub fn render_order(terms: &[OrderTerm]) -> String {
    if terms.is_empty() {
        return String::new();
    }
    let terms: Vec<String> = terms
        .iter()
        .map(|t| format!("{} {}", quote_ident(&t.field), t.direction))
        .collect();
    format!("ORDER BY {}", terms.join(", "))
}

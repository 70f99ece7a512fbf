use crate::core::{PersistError, Result, SqlValue};
use crate::entity::EntityMeta;
use crate::sql::{Params, list_placeholder, placeholder, quote_ident};

/// Operator of an encoded filter value `"<op><operand>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    NotEq,
    Like,
    Less,
    Greater,
    BitAnd,
    BitOr,
    BitXor,
    In,
}

impl FilterOp {
    pub fn from_prefix(c: char) -> Option<Self> {
        match c {
            '=' => Some(Self::Eq),
            '!' => Some(Self::NotEq),
            '*' => Some(Self::Like),
            '<' => Some(Self::Less),
            '>' => Some(Self::Greater),
            '&' => Some(Self::BitAnd),
            '|' => Some(Self::BitOr),
            '^' => Some(Self::BitXor),
            '~' => Some(Self::In),
            _ => None,
        }
    }

    pub fn prefix(&self) -> char {
        match self {
            Self::Eq => '=',
            Self::NotEq => '!',
            Self::Like => '*',
            Self::Less => '<',
            Self::Greater => '>',
            Self::BitAnd => '&',
            Self::BitOr => '|',
            Self::BitXor => '^',
            Self::In => '~',
        }
    }

    /// SQL operator placed between the column and its parameter.
    ///
    /// `<` and `>` render swapped: `{age: "<30"}` becomes `` `age` > :age ``.
    pub fn sql_operator(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Like => "LIKE",
            Self::Less => ">",
            Self::Greater => "<",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::In => "IN",
        }
    }

    /// Split an encoded filter value. No operator prefix means `=` with the whole text.
    pub fn split(encoded: &str) -> (Self, &str) {
        let mut chars = encoded.chars();
        match chars.next().and_then(Self::from_prefix) {
            Some(op) => (op, chars.as_str()),
            None => (Self::Eq, encoded),
        }
    }
}

/// Field name → encoded filter value, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    entries: Vec<(String, String)>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, field: impl Into<String>, encoded: impl Into<String>) -> Self {
        self.insert(field, encoded);
        self
    }

    /// Set the filter of `field`, replacing an earlier one in place.
    pub fn insert(&mut self, field: impl Into<String>, encoded: impl Into<String>) {
        let field = field.into();
        let encoded = encoded.into();
        match self.entries.iter_mut().find(|(name, _)| *name == field) {
            Some(entry) => entry.1 = encoded,
            None => self.entries.push((field, encoded)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(f, v)| (f.as_str(), v.as_str()))
    }

    /// Check every field against `meta` and split the operators off.
    pub fn compile(&self, meta: &EntityMeta) -> Result<Vec<Condition>> {
        self.entries
            .iter()
            .map(|(field, encoded)| {
                let index = meta.field_index(field).ok_or_else(|| {
                    PersistError::validation(meta.table_name(), format!("unknown filter field {}", field))
                })?;
                let (op, operand) = FilterOp::split(encoded);
                Ok(Condition {
                    field: field.clone(),
                    index,
                    op,
                    operand: operand.to_string(),
                })
            })
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FilterSpec {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut spec = Self::new();
        for (field, encoded) in iter {
            spec.insert(field, encoded);
        }
        spec
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for FilterSpec {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

/// A validated filter entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: String,
    /// Position of the field in the entity's column order
    pub index: usize,
    pub op: FilterOp,
    pub operand: String,
}

impl Condition {
    /// Elements of a membership list, bound verbatim.
    pub fn items(&self) -> Vec<&str> {
        self.operand.split(',').collect()
    }
}

/// A rendered `WHERE` clause and the values to bind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    pub sql: String,
    pub params: Vec<(String, SqlValue)>,
}

impl WhereClause {
    /// Render `conditions` joined by `AND`. `value_of` supplies the bound value
    /// of every condition except membership lists, whose elements are bound as text.
    pub fn render(conditions: &[Condition], mut value_of: impl FnMut(&Condition) -> SqlValue) -> Self {
        if conditions.is_empty() {
            return Self::default();
        }

        let mut predicates = Vec::with_capacity(conditions.len());
        let mut params = Vec::new();
        let mut taken = Params::new();
        for condition in conditions {
            let column = quote_ident(&condition.field);
            if condition.op == FilterOp::In {
                let mut names = Vec::new();
                for (i, item) in condition.items().into_iter().enumerate() {
                    let name = taken.claim(list_placeholder(&condition.field, i), condition.index);
                    params.push((name.clone(), SqlValue::Text(item.to_string())));
                    names.push(name);
                }
                predicates.push(format!("{} IN ({})", column, names.join(",")));
            } else {
                let name = taken.claim(placeholder(&condition.field), condition.index);
                predicates.push(format!("{} {} {}", column, condition.op.sql_operator(), name));
                params.push((name, value_of(condition)));
            }
        }

        Self {
            sql: format!("WHERE {}", predicates.join(" AND ")),
            params,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::PrimaryKey;
    use crate::schema::{FieldDescriptor, FieldKind};

    fn users() -> EntityMeta {
        EntityMeta::new(
            "users",
            vec![
                FieldDescriptor::new("id", FieldKind::Int),
                FieldDescriptor::new("age", FieldKind::Int),
                FieldDescriptor::new("status", FieldKind::String),
                FieldDescriptor::new("status_0", FieldKind::String),
            ],
            Some(PrimaryKey::new("id", true)),
        )
        .unwrap()
    }

    #[test]
    fn test_split_operators() {
        assert_eq!(FilterOp::split("<30"), (FilterOp::Less, "30"));
        assert_eq!(FilterOp::split("~A,B"), (FilterOp::In, "A,B"));
        assert_eq!(FilterOp::split("Ada"), (FilterOp::Eq, "Ada"));
        assert_eq!(FilterOp::split(""), (FilterOp::Eq, ""));
        assert_eq!(FilterOp::split("=<"), (FilterOp::Eq, "<"));
    }

    #[test]
    fn test_swapped_comparison() {
        let conditions = FilterSpec::from([("age", "<30")]).compile(&users()).unwrap();
        let clause = WhereClause::render(&conditions, |_| SqlValue::Integer(30));
        assert_eq!(clause.sql, "WHERE `age` > :age");
        assert_eq!(clause.params, vec![(":age".to_string(), SqlValue::Integer(30))]);

        let conditions = FilterSpec::from([("age", ">30")]).compile(&users()).unwrap();
        let clause = WhereClause::render(&conditions, |_| SqlValue::Integer(30));
        assert_eq!(clause.sql, "WHERE `age` < :age");
    }

    #[test]
    fn test_membership_binds_each_item() {
        let spec = FilterSpec::new().with("status", "~A,B,C").with("age", "!4");
        let conditions = spec.compile(&users()).unwrap();
        let clause = WhereClause::render(&conditions, |_| SqlValue::Integer(4));
        assert_eq!(
            clause.sql,
            "WHERE `status` IN (:status_0,:status_1,:status_2) AND `age` <> :age"
        );
        let names: Vec<&str> = clause.params.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec![":status_0", ":status_1", ":status_2", ":age"]);
        assert_eq!(clause.params[1].1, SqlValue::Text("B".into()));
    }

    #[test]
    fn test_list_items_never_share_a_name_with_fields() {
        let spec = FilterSpec::new().with("status", "~A,B").with("status_0", "x");
        let conditions = spec.compile(&users()).unwrap();
        let clause = WhereClause::render(&conditions, |_| SqlValue::Text("x".into()));
        assert_eq!(
            clause.sql,
            "WHERE `status` IN (:status_0,:status_1) AND `status_0` = :status_0__3"
        );
        assert_eq!(clause.params.len(), 3);
        assert_eq!(clause.params[0].1, SqlValue::Text("A".into()));
        assert_eq!(clause.params[2], (":status_0__3".to_string(), SqlValue::Text("x".into())));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = FilterSpec::from([("shoe_size", "42")]).compile(&users()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_empty_filter_renders_nothing() {
        let clause = WhereClause::render(&[], |_| SqlValue::Null);
        assert!(clause.is_empty());
        assert!(clause.params.is_empty());
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let spec = FilterSpec::new().with("a", "1").with("b", "2").with("a", "3");
        assert_eq!(spec.iter().collect::<Vec<_>>(), vec![("a", "3"), ("b", "2")]);
    }
}

//! SQL text for the engine's statements. Only metadata-validated names are
//! interpolated, and always quoted; values are always bound.

use std::collections::HashSet;

/// Placeholder bound to the primary key in keyed statements.
pub const KEY_PARAM: &str = ":__pk";

/// Quote a table or column identifier, doubling embedded backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Named placeholder for a field: `:` followed by the name with every
/// character outside `[A-Za-z0-9_]` replaced by `_`.
pub fn placeholder(name: &str) -> String {
    let mut param = String::with_capacity(name.len() + 1);
    param.push(':');
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            param.push(ch);
        } else {
            param.push('_');
        }
    }
    param
}

/// Placeholder of the `index`-th element of a membership list on `name`.
pub fn list_placeholder(name: &str, index: usize) -> String {
    format!("{}_{}", placeholder(name), index)
}

/// Placeholder names handed out within one statement.
///
/// The preferred name is kept while it is free. A name already taken (two
/// fields sanitizing alike, or a field named like a list element) gets the
/// field index appended, so every bound value has its own parameter.
#[derive(Debug, Default)]
pub struct Params {
    taken: HashSet<String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator with [`KEY_PARAM`] already reserved.
    pub fn keyed() -> Self {
        let mut params = Self::new();
        params.taken.insert(KEY_PARAM.to_string());
        params
    }

    pub fn claim(&mut self, preferred: String, field_index: usize) -> String {
        if self.taken.insert(preferred.clone()) {
            return preferred;
        }
        let base = format!("{}__{}", preferred, field_index);
        let mut candidate = base.clone();
        let mut attempt = 0;
        while !self.taken.insert(candidate.clone()) {
            attempt += 1;
            candidate = format!("{}_{}", base, attempt);
        }
        candidate
    }

    /// Placeholders for `(field_index, name)` columns, in order.
    pub fn for_columns(&mut self, columns: &[(usize, &str)]) -> Vec<String> {
        columns
            .iter()
            .map(|&(index, name)| self.claim(placeholder(name), index))
            .collect()
    }
}

/// `INSERT` of `columns`, bound to the matching `params`.
pub fn insert(table: &str, columns: &[&str], params: &[String]) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        names.join(", "),
        params.join(", ")
    )
}

/// `UPDATE` of `columns` bound to `params`, keyed by [`KEY_PARAM`].
pub fn update(table: &str, columns: &[&str], params: &[String], key: &str) -> String {
    let assignments: Vec<String> = columns
        .iter()
        .zip(params)
        .map(|(c, p)| format!("{} = {}", quote_ident(c), p))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {} = {}",
        quote_ident(table),
        assignments.join(", "),
        quote_ident(key),
        KEY_PARAM
    )
}

pub fn delete(table: &str, key: &str) -> String {
    format!(
        "DELETE FROM {} WHERE {} = {}",
        quote_ident(table),
        quote_ident(key),
        KEY_PARAM
    )
}

/// `SELECT` of table-qualified `columns`, followed by an already rendered
/// `WHERE`/`ORDER BY` tail (empty for none).
pub fn select(table: &str, columns: &[&str], tail: &str) -> String {
    let table = quote_ident(table);
    let columns: Vec<String> = columns
        .iter()
        .map(|c| format!("{}.{}", table, quote_ident(c)))
        .collect();
    let mut sql = format!("SELECT {} FROM {}", columns.join(", "), table);
    if !tail.is_empty() {
        sql.push(' ');
        sql.push_str(tail);
    }
    sql
}

/// Lookup of `columns` by primary key.
pub fn select_by_key(table: &str, columns: &[&str], key: &str) -> String {
    select(
        table,
        columns,
        &format!("WHERE {} = {}", quote_ident(key), KEY_PARAM),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("users"), "`users`");
        assert_eq!(quote_ident("we`ird"), "`we``ird`");
        assert_eq!(placeholder("first-name"), ":first_name");
        assert_eq!(list_placeholder("status", 2), ":status_2");
    }

    fn params(columns: &[&str]) -> Vec<String> {
        let indexed: Vec<(usize, &str)> = columns.iter().copied().enumerate().collect();
        Params::keyed().for_columns(&indexed)
    }

    #[test]
    fn test_statements() {
        assert_eq!(
            insert("users", &["name", "age"], &params(&["name", "age"])),
            "INSERT INTO `users` (`name`, `age`) VALUES (:name, :age)"
        );
        assert_eq!(insert("users", &[], &[]), "INSERT INTO `users` () VALUES ()");
        assert_eq!(
            update("users", &["name"], &params(&["name"]), "id"),
            "UPDATE `users` SET `name` = :name WHERE `id` = :__pk"
        );
        assert_eq!(delete("users", "id"), "DELETE FROM `users` WHERE `id` = :__pk");
        assert_eq!(
            select_by_key("users", &["name"], "id"),
            "SELECT `users`.`name` FROM `users` WHERE `id` = :__pk"
        );
        assert_eq!(select("users", &["id"], ""), "SELECT `users`.`id` FROM `users`");
    }

    #[test]
    fn test_colliding_placeholders_are_disambiguated() {
        assert_eq!(
            params(&["first-name", "first_name", "__pk"]),
            vec![":first_name", ":first_name__1", ":__pk__2"]
        );

        let mut params = Params::new();
        assert_eq!(params.claim(list_placeholder("tag", 0), 0), ":tag_0");
        assert_eq!(params.claim(placeholder("tag_0"), 1), ":tag_0__1");
        assert_eq!(params.claim(placeholder("tag_0__1"), 2), ":tag_0__1__2");
        assert_eq!(params.claim(placeholder("tag_0"), 1), ":tag_0__1_1");
    }
}

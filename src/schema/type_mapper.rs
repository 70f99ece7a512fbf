//! Maps raw SQL column types (`varchar(255)`, `decimal(10,2) unsigned`,
//! `set('a','b')`) to logical field kinds.

use super::{FieldDescriptor, FieldKind};
use crate::config::SetColumnMode;
use regex::Regex;

lazy_static::lazy_static! {
    /// `base_type[(args)][ modifier ...]`
    static ref TYPE_PATTERN: Regex =
        Regex::new(r"^\s*(\w+)\s*(?:\((.*)\))?\s*(?:(\w+)(?:\s+\w+)*)?\s*$").expect("valid type pattern");

    /// Quoted labels inside `set(...)` / `enum(...)`, with '' as an escaped quote
    static ref LABEL_PATTERN: Regex =
        Regex::new(r"'((?:[^']|'')*)'").expect("valid label pattern");
}

const INT_TYPES: &[&str] = &["int", "integer", "mediumint", "smallint", "tinyint", "bigint"];
const FLOAT_TYPES: &[&str] = &["float", "double", "real"];
const STRING_TYPES: &[&str] = &[
    "char", "varchar", "text", "tinytext", "mediumtext", "longtext", "decimal", "binary",
    "varbinary", "enum",
];
const BOOL_TYPES: &[&str] = &["bool", "boolean"];
const DATE_TYPES: &[&str] = &["date"];
const DATETIME_TYPES: &[&str] = &["datetime", "timestamp"];
const SET_TYPES: &[&str] = &["set"];

/// Parsed form of a raw column type.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnType {
    pub base: String,
    pub kind: FieldKind,
    pub length: u32,
    pub extra: String,
    pub labels: Vec<String>,
    /// False when the base type was not in the mapping table and fell back to `string`
    pub known: bool,
}

/// Look up the logical kind of a (lowercase) base type name.
pub fn kind_of(base: &str) -> Option<FieldKind> {
    let table: [(&[&str], FieldKind); 7] = [
        (INT_TYPES, FieldKind::Int),
        (FLOAT_TYPES, FieldKind::Float),
        (STRING_TYPES, FieldKind::String),
        (BOOL_TYPES, FieldKind::Bool),
        (DATE_TYPES, FieldKind::Date),
        (DATETIME_TYPES, FieldKind::DateTime),
        (SET_TYPES, FieldKind::Set),
    ];
    table
        .iter()
        .find(|(names, _)| names.contains(&base))
        .map(|(_, kind)| *kind)
}

/// Parse a raw SQL column type. Returns `None` when the string has no base type.
pub fn parse_column_type(raw: &str, set_columns: SetColumnMode) -> Option<ColumnType> {
    let caps = TYPE_PATTERN.captures(raw)?;
    let base = caps.get(1)?.as_str().to_ascii_lowercase();
    let args = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    let extra = caps
        .get(3)
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default();

    let (kind, known) = match kind_of(&base) {
        Some(kind) => (kind, true),
        None => {
            tracing::trace!(raw_type = raw, "unknown column type, mapping to string");
            (FieldKind::String, false)
        }
    };

    let (kind, labels) = match kind {
        FieldKind::Set if set_columns == SetColumnMode::Bitmask => (kind, parse_labels(args)),
        FieldKind::Set => (FieldKind::String, Vec::new()),
        _ => (kind, Vec::new()),
    };

    let length = if base == "set" || base == "enum" {
        0
    } else {
        args.split(',')
            .next()
            .and_then(|first| first.trim().parse().ok())
            .unwrap_or(0)
    };

    Some(ColumnType {
        base,
        kind,
        length,
        extra,
        labels,
        known,
    })
}

/// Build the descriptor of column `name` with raw type `raw_type`.
pub fn map_column(name: &str, raw_type: &str, set_columns: SetColumnMode) -> Option<FieldDescriptor> {
    let parsed = parse_column_type(raw_type, set_columns)?;
    Some(
        FieldDescriptor::new(name, parsed.kind)
            .with_length(parsed.length)
            .with_extra(parsed.extra)
            .with_raw_type(raw_type)
            .with_labels(parsed.labels),
    )
}

fn parse_labels(args: &str) -> Vec<String> {
    LABEL_PATTERN
        .captures_iter(args)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().replace("''", "'"))
        .collect()
}

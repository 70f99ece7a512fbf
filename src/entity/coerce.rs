//! Kind-directed conversion of values entering a record: from the typed
//! setter, from filter operands, and from fetched result columns.

use super::value::{DATETIME_FORMAT, DATE_FORMAT};
use super::FieldValue;
use crate::core::SqlValue;
use crate::schema::{FieldDescriptor, FieldKind};
use chrono::{NaiveDate, NaiveDateTime};

/// The all-zero datetime some databases use for "no value".
pub const ZERO_DATETIME: &str = "0000-00-00 00:00:00";
const ZERO_DATE: &str = "0000-00-00";

const DATETIME_FORMATS: &[&str] = &[
    DATETIME_FORMAT,
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

type Coerced = std::result::Result<FieldValue, String>;

/// Permissive boolean literal parsing. `None` when not recognizably truthy or falsy.
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" | "" => Some(false),
        _ => None,
    }
}

/// Parse a date-time string. The zero sentinel yields `Ok(None)`.
pub fn parse_datetime(text: &str) -> std::result::Result<Option<NaiveDateTime>, String> {
    let text = text.trim();
    if text == ZERO_DATETIME || text == ZERO_DATE {
        return Ok(None);
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Some(dt));
        }
    }
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(Some)
        .ok_or_else(|| format!("Invalid date value '{}'", text))
}

/// Setter rules: strict for numeric kinds, permissive for booleans and dates.
pub fn assign(field: &FieldDescriptor, value: FieldValue) -> Coerced {
    if value.is_null() {
        return Ok(FieldValue::Null);
    }
    match field.kind {
        FieldKind::Int => match value {
            FieldValue::Int(i) => Ok(FieldValue::Int(i)),
            other => Err(expected(field, "int", &other)),
        },
        FieldKind::Float => match value {
            FieldValue::Float(f) => Ok(FieldValue::Float(f)),
            other => Err(expected(field, "float", &other)),
        },
        FieldKind::String => match value {
            FieldValue::Text(s) => Ok(FieldValue::Text(s)),
            other => Err(expected(field, "string", &other)),
        },
        FieldKind::Bool => match value {
            FieldValue::Bool(b) => Ok(FieldValue::Bool(b)),
            FieldValue::Int(0) => Ok(FieldValue::Bool(false)),
            FieldValue::Int(1) => Ok(FieldValue::Bool(true)),
            FieldValue::Text(s) => parse_bool(&s)
                .map(FieldValue::Bool)
                .ok_or_else(|| format!("Invalid boolean value '{}' for {}", s, field.name)),
            other => Err(expected(field, "bool", &other)),
        },
        FieldKind::Date => match value {
            FieldValue::Date(d) => Ok(FieldValue::Date(d)),
            FieldValue::DateTime(dt) => Ok(FieldValue::Date(dt.date())),
            FieldValue::Text(s) => Ok(parse_datetime(&s)?
                .map_or(FieldValue::Null, |dt| FieldValue::Date(dt.date()))),
            other => Err(expected(field, "date", &other)),
        },
        FieldKind::DateTime => match value {
            FieldValue::DateTime(dt) => Ok(FieldValue::DateTime(dt)),
            FieldValue::Date(d) => Ok(d
                .and_hms_opt(0, 0, 0)
                .map_or(FieldValue::Null, FieldValue::DateTime)),
            FieldValue::Text(s) => Ok(parse_datetime(&s)?.map_or(FieldValue::Null, FieldValue::DateTime)),
            other => Err(expected(field, "datetime", &other)),
        },
        FieldKind::Set => match value {
            FieldValue::Set(mask) => Ok(FieldValue::Set(mask)),
            FieldValue::Int(i) if i >= 0 => Ok(FieldValue::Set(i as u64)),
            FieldValue::Text(s) => labels_to_mask(field, &s),
            other => Err(expected(field, "set", &other)),
        },
    }
}

/// Turn a textual filter operand into a value the setter accepts for `field`.
pub fn parse_operand(field: &FieldDescriptor, operand: &str) -> Coerced {
    match field.kind {
        FieldKind::Int => operand
            .trim()
            .parse()
            .map(FieldValue::Int)
            .map_err(|_| format!("int value expected for {}, got '{}'", field.name, operand)),
        FieldKind::Float => operand
            .trim()
            .parse()
            .map(FieldValue::Float)
            .map_err(|_| format!("float value expected for {}, got '{}'", field.name, operand)),
        FieldKind::Set => match operand.trim().parse::<u64>() {
            Ok(mask) => Ok(FieldValue::Set(mask)),
            Err(_) => labels_to_mask(field, operand),
        },
        _ => Ok(FieldValue::Text(operand.to_string())),
    }
}

/// Convert a fetched column value into the field's declared kind.
pub fn from_sql(field: &FieldDescriptor, value: SqlValue) -> Coerced {
    if value.is_null() {
        return Ok(FieldValue::Null);
    }
    match field.kind {
        FieldKind::Int => value
            .as_i64()
            .map(FieldValue::Int)
            .ok_or_else(|| mismatch(field, &value)),
        FieldKind::Float => value
            .as_f64()
            .map(FieldValue::Float)
            .ok_or_else(|| mismatch(field, &value)),
        FieldKind::String => Ok(FieldValue::Text(value.to_string())),
        FieldKind::Bool => match &value {
            SqlValue::Integer(i) => Ok(FieldValue::Bool(*i != 0)),
            SqlValue::Text(s) => parse_bool(s)
                .map(FieldValue::Bool)
                .ok_or_else(|| mismatch(field, &value)),
            _ => Err(mismatch(field, &value)),
        },
        FieldKind::Date | FieldKind::DateTime => match value {
            SqlValue::Text(s) => assign(field, FieldValue::Text(s)),
            other => Err(mismatch(field, &other)),
        },
        FieldKind::Set => match &value {
            // Stored as the two's complement of the mask; bit 63 reads back negative
            SqlValue::Integer(i) => Ok(FieldValue::Set(*i as u64)),
            SqlValue::Text(s) => parse_operand(field, s),
            _ => Err(mismatch(field, &value)),
        },
    }
}

/// Coerce a primary key lookup value back to the key's declared kind.
pub fn key(field: &FieldDescriptor, value: FieldValue) -> Coerced {
    match (field.kind, value) {
        (FieldKind::Int, FieldValue::Int(i)) => Ok(FieldValue::Int(i)),
        (FieldKind::Int, FieldValue::Text(s)) => parse_operand(field, &s),
        (FieldKind::String, FieldValue::Text(s)) => Ok(FieldValue::Text(s)),
        (FieldKind::String, FieldValue::Int(i)) => Ok(FieldValue::Text(i.to_string())),
        (FieldKind::Int | FieldKind::String, other) => Err(expected(field, &field.kind.to_string(), &other)),
        (kind, _) => Err(format!("Unsupported primary key kind {} for {}", kind, field.name)),
    }
}

/// The value a key field is reset to after its row is deleted.
pub fn zero_value(field: &FieldDescriptor) -> FieldValue {
    match field.kind {
        FieldKind::Int => FieldValue::Int(0),
        FieldKind::Float => FieldValue::Float(0.0),
        FieldKind::String => FieldValue::Text(String::new()),
        FieldKind::Bool => FieldValue::Bool(false),
        FieldKind::Set => FieldValue::Set(0),
        FieldKind::Date | FieldKind::DateTime => FieldValue::Null,
    }
}

fn labels_to_mask(field: &FieldDescriptor, list: &str) -> Coerced {
    let labels: Vec<&str> = list.split(',').collect();
    field.label_mask(&labels).map(FieldValue::Set)
}

fn expected(field: &FieldDescriptor, kind: &str, got: &FieldValue) -> String {
    format!("{} value expected for {}, got {} '{}'", kind, field.name, got.type_name(), got)
}

fn mismatch(field: &FieldDescriptor, got: &SqlValue) -> String {
    format!(
        "column {} ({}) cannot hold {} '{}'",
        field.name,
        field.kind,
        got.type_name(),
        got
    )
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical kind of a column, derived from its SQL type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Int,
    Float,
    String,
    Bool,
    Date,
    DateTime,
    Set,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Bool => "bool",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Set => "set",
        };
        f.write_str(name)
    }
}

/// Immutable description of one column of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub length: u32,
    #[serde(default)]
    pub extra: String,
    #[serde(default)]
    pub raw_type: String,
    /// Flag labels of a `set` column, in declaration order. Label `i` is bit `1 << i`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            length: 0,
            extra: String::new(),
            raw_type: String::new(),
            labels: Vec::new(),
        }
    }

    pub fn with_length(mut self, length: u32) -> Self {
        self.length = length;
        self
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = extra.into();
        self
    }

    pub fn with_raw_type(mut self, raw_type: impl Into<String>) -> Self {
        self.raw_type = raw_type.into();
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Whether values of this field are bitmasks over named flags.
    pub fn is_bitmask(&self) -> bool {
        self.kind == FieldKind::Set
    }

    /// Bit assigned to `label`, if it is one of the declared flags.
    pub fn label_bit(&self, label: &str) -> Option<u64> {
        self.labels
            .iter()
            .position(|l| l == label)
            .filter(|idx| *idx < 64)
            .map(|idx| 1u64 << idx)
    }

    /// Combine labels into a bitmask. Fails on the first unknown label.
    pub fn label_mask<S: AsRef<str>>(&self, labels: &[S]) -> std::result::Result<u64, String> {
        let mut mask = 0u64;
        for label in labels {
            let label = label.as_ref().trim();
            if label.is_empty() {
                continue;
            }
            let bit = self.label_bit(label).ok_or_else(|| {
                format!("'{}' is not a flag of set field {}", label, self.name)
            })?;
            mask |= bit;
        }
        Ok(mask)
    }

    /// Labels whose bits are set in `mask`, in declaration order.
    pub fn mask_labels(&self, mask: u64) -> Vec<&str> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx < 64 && mask & (1u64 << idx) != 0)
            .map(|(_, label)| label.as_str())
            .collect()
    }

    /// Named bitmask constants for a `set` field: `<field>_<label>` → 1, 2, 4, ...
    pub fn flag_constants(&self) -> Vec<(String, u64)> {
        if !self.is_bitmask() {
            return Vec::new();
        }
        self.labels
            .iter()
            .take(64)
            .enumerate()
            .map(|(idx, label)| {
                let label = label.replace('\'', "").replace(' ', "_");
                (format!("{}_{}", self.name, label), 1u64 << idx)
            })
            .collect()
    }
}

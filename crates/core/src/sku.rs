//! SKU rows and the spec-field registry
//!
//! A `SkuRow` is one catalog entry: a unique model name, the series key
//! derived from it, and a value for every known spec field. Missing values
//! are stored as empty strings, never as a sentinel.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The closed set of spec fields every catalog row carries.
///
/// Columns outside this list are ignored at ingestion; fields absent from
/// the source file are present here with an empty value.
pub const SPEC_FIELDS: &[&str] = &[
    "cpu",
    "gpu",
    "memory",
    "storage",
    "lcd",
    "touchpanel",
    "iointerface",
    "keyboard",
    "webcamera",
    "touchpad",
    "fingerprint",
    "audio",
    "battery",
    "thermal",
    "wireless",
    "lan",
    "bluetooth",
    "wifislot",
    "powerbutton",
    "ledind",
    "softwareconfig",
    "ai",
    "accessory",
    "certifications",
    "otherfeatures",
    "structconfig",
    "price",
];

/// Fields shown when a whole-machine comparison is requested.
pub const COMPARISON_FIELDS: &[&str] = &[
    "cpu",
    "gpu",
    "memory",
    "storage",
    "lcd",
    "battery",
    "structconfig",
    "price",
];

/// Whether `name` is a member of the spec-field registry.
pub fn is_spec_field(name: &str) -> bool {
    SPEC_FIELDS.contains(&name)
}

/// Derive the series key from a model name: the first run of three or more
/// consecutive ASCII digits (`"APX819: FP7R2"` → `"819"`).
pub fn series_key_of(model_name: &str) -> Option<String> {
    let bytes = model_name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i - start >= 3 {
                return Some(model_name[start..i].to_string());
            }
        } else {
            i += 1;
        }
    }
    None
}

/// One catalog row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkuRow {
    /// Unique model name, e.g. `AG958` or `APX819: FP7R2`.
    pub model_name: String,
    /// Series key derived from the model name, e.g. `819`.
    pub series_key: String,
    /// Spec-field values; every key is a member of [`SPEC_FIELDS`].
    fields: HashMap<String, String>,
}

impl SkuRow {
    /// Build a row from a model name and a column map. Unknown columns are
    /// dropped; known fields missing from the map become empty strings.
    /// Returns `None` when no series key can be derived from the name.
    pub fn from_columns(model_name: &str, columns: &HashMap<String, String>) -> Option<Self> {
        let series_key = series_key_of(model_name)?;
        let mut fields = HashMap::with_capacity(SPEC_FIELDS.len());
        for &field in SPEC_FIELDS {
            let value = columns.get(field).map(|v| v.trim()).unwrap_or("");
            fields.insert(field.to_string(), value.to_string());
        }
        Some(Self {
            model_name: model_name.to_string(),
            series_key,
            fields,
        })
    }

    /// Field value; empty string for unknown fields or absent data.
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    /// Whether the row has no data for `name`.
    pub fn field_is_empty(&self, name: &str) -> bool {
        self.field(name).is_empty()
    }

    /// Iterate over `(field, value)` pairs in registry order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        SPEC_FIELDS.iter().map(move |&f| (f, self.field(f)))
    }
}

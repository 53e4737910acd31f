//! Reply parsing
//!
//! Two-stage parse of the model's reply:
//!
//! 1. Strip a syntactically delimited `<think>…</think>` block, then cut
//!    the substring from the first `{` to the last `}`.
//! 2. Strict JSON decoding, falling back to a small, bounded set of repair
//!    passes (quote bare keys, single → double quotes, drop trailing
//!    commas, collapse doubled braces). Each pass is idempotent; the
//!    budget is fixed.
//!
//! The decoded object must carry a non-empty `summary` string. A missing
//! `table` is tolerated as empty; a present one is canonicalized from any
//! of the three accepted shapes into the list-of-row-maps form. Anything
//! else is a `TableShape` error the caller routes to the fallback.

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use nb_assistant_core::{ResponseObject, TableRow, MISSING_CELL};

const REPAIR_BUDGET: usize = 4;
const THINK_CLOSE: &str = "</think>";

/// Parse failures; all route to the rule-based fallback.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("reply contains no JSON object")]
    NoJson,

    #[error("reply JSON undecodable after repair: {0}")]
    Undecodable(String),

    #[error("reply object lacks a usable summary")]
    MissingSummary,

    #[error("comparison table has an unrecognized shape: {0}")]
    TableShape(String),
}

/// Parse the raw model reply into the canonical response object.
/// `target_names` fixes the column order of the canonical table.
pub fn parse_reply(raw: &str, target_names: &[String]) -> Result<ResponseObject, ParseError> {
    let visible = strip_think_block(raw);
    let span = extract_json_span(visible).ok_or(ParseError::NoJson)?;
    let value = decode_with_repairs(span)?;

    let object = value.as_object().ok_or(ParseError::NoJson)?;
    let summary = object
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ParseError::MissingSummary)?
        .to_string();

    let table = match object.get("table") {
        None | Some(Value::Null) => Vec::new(),
        Some(table) => canonicalize_table(table, target_names)?,
    };

    Ok(ResponseObject { summary, table })
}

/// Discard everything up to and including the closing think tag, when one
/// is present.
pub fn strip_think_block(raw: &str) -> &str {
    match raw.find(THINK_CLOSE) {
        Some(end) => raw[end + THINK_CLOSE.len()..].trim_start(),
        None => raw,
    }
}

/// The substring from the first `{` to the last `}` inclusive.
fn extract_json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Strict decode first; on failure apply the repair pass repeatedly until
/// the text stops changing or the budget runs out. Valid JSON never enters
/// the repair loop, so repairing is a no-op on well-formed replies.
fn decode_with_repairs(span: &str) -> Result<Value, ParseError> {
    let mut candidate = span.to_string();
    let mut last_error = String::new();
    for _ in 0..=REPAIR_BUDGET {
        match serde_json::from_str(&candidate) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = e.to_string(),
        }
        let repaired = repair_pass(&candidate);
        if repaired == candidate {
            break;
        }
        candidate = repaired;
    }
    Err(ParseError::Undecodable(last_error))
}

/// One application of all repair transforms.
fn repair_pass(text: &str) -> String {
    let mut out = text.replace('\'', "\"");
    out = out.replace("{{", "{").replace("}}", "}");

    let bare_keys = Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_\-]*)\s*:"#).unwrap();
    out = bare_keys.replace_all(&out, "$1\"$2\":").to_string();

    let trailing_commas = Regex::new(r#",\s*([}\]])"#).unwrap();
    out = trailing_commas.replace_all(&out, "$1").to_string();

    out
}

/// Convert any accepted table shape into the canonical list of row maps:
/// `feature` first, then one column per target name in order, missing
/// cells filled with `N/A`.
pub fn canonicalize_table(
    table: &Value,
    target_names: &[String],
) -> Result<Vec<TableRow>, ParseError> {
    match table {
        Value::Array(rows) => rows
            .iter()
            .map(|row| {
                let map = row.as_object().ok_or_else(|| {
                    ParseError::TableShape("table row is not an object".to_string())
                })?;
                let feature = feature_of(map).ok_or_else(|| {
                    ParseError::TableShape("table row lacks a feature cell".to_string())
                })?;
                Ok(build_row(feature, |name| {
                    map.get(name).map(cell_to_string)
                }, target_names))
            })
            .collect(),

        Value::Object(map) => {
            if map.values().all(Value::is_array) && !map.is_empty() {
                canonicalize_transposed(map, target_names)
            } else if feature_of(map).is_some() {
                let feature = feature_of(map).unwrap();
                Ok(vec![build_row(
                    feature,
                    |name| map.get(name).map(cell_to_string),
                    target_names,
                )])
            } else {
                Err(ParseError::TableShape(
                    "object table lacks both columns and a feature cell".to_string(),
                ))
            }
        }

        other => Err(ParseError::TableShape(format!(
            "unsupported table value: {}",
            value_kind(other)
        ))),
    }
}

/// Pivot `{Feature: [...], name: [...]}` row-wise.
fn canonicalize_transposed(
    map: &serde_json::Map<String, Value>,
    target_names: &[String],
) -> Result<Vec<TableRow>, ParseError> {
    let features = map
        .iter()
        .find(|(k, _)| is_feature_key(k))
        .map(|(_, v)| v)
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::TableShape("transposed table lacks a feature column".to_string()))?;

    let row_count = features.len();
    let mut rows = Vec::with_capacity(row_count);
    for i in 0..row_count {
        let feature = cell_to_string(&features[i]);
        rows.push(build_row(
            feature,
            |name| {
                map.get(name)
                    .and_then(Value::as_array)
                    .and_then(|col| col.get(i))
                    .map(cell_to_string)
            },
            target_names,
        ));
    }
    Ok(rows)
}

/// Assemble one canonical row in fixed column order.
fn build_row(
    feature: String,
    cell: impl Fn(&str) -> Option<String>,
    target_names: &[String],
) -> TableRow {
    let mut row = TableRow::new();
    row.insert("feature".to_string(), feature);
    for name in target_names {
        row.insert(
            name.clone(),
            cell(name).unwrap_or_else(|| MISSING_CELL.to_string()),
        );
    }
    row
}

fn is_feature_key(key: &str) -> bool {
    key.eq_ignore_ascii_case("feature")
}

fn feature_of(map: &serde_json::Map<String, Value>) -> Option<String> {
    map.iter()
        .find(|(k, v)| is_feature_key(k) && !v.is_array() && !v.is_object())
        .map(|(_, v)| cell_to_string(v))
}

/// Stringify one cell. Null becomes the missing marker.
fn cell_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => MISSING_CELL.to_string(),
        other => other.to_string(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

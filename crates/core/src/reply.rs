//! Reply types
//!
//! Every user turn produces exactly one `Reply`. Downstream failures after
//! routing are absorbed into `Direct` replies; the `Error` variant is
//! reserved for session lookup failures the transport must surface.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Default display width for table cells before ellipsis truncation.
pub const CELL_DISPLAY_WIDTH: usize = 50;

/// Placeholder for cells the model or the catalog did not supply.
pub const MISSING_CELL: &str = "N/A";

/// One canonical table row: `feature` first, then one key per compared SKU,
/// in retrieval order. All values are strings.
pub type TableRow = IndexMap<String, String>;

/// The canonical `{summary, table}` response object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseObject {
    pub summary: String,
    #[serde(default)]
    pub table: Vec<TableRow>,
}

impl ResponseObject {
    /// A prose-only reply with an empty table.
    pub fn prose(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            table: Vec::new(),
        }
    }

    /// A truncated copy of the table for display. Cell values longer than
    /// `width` characters are shortened with an ellipsis; the rows held on
    /// the object itself keep the full values.
    pub fn display_table(&self, width: usize) -> Vec<TableRow> {
        self.table
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(k, v)| (k.clone(), truncate_cell(v, width)))
                    .collect()
            })
            .collect()
    }
}

/// Shorten `value` to at most `width` characters, appending an ellipsis
/// when anything was cut. Character-based, so multi-byte text is safe.
pub fn truncate_cell(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let cut: String = value.chars().take(width.saturating_sub(1)).collect();
    format!("{}…", cut)
}

/// The closed set of error kinds (§ recovery table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigInvalid,
    CatalogUnavailable,
    VectorUnavailable,
    LlmUnavailable,
    LlmTimeout,
    LlmEmpty,
    ParseFailure,
    TableShapeError,
    DataUnavailable,
    SessionNotFound,
    SessionExpired,
    InvalidAnswer,
    UnknownSeries,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::ConfigInvalid => "config_invalid",
            ErrorKind::CatalogUnavailable => "catalog_unavailable",
            ErrorKind::VectorUnavailable => "vector_unavailable",
            ErrorKind::LlmUnavailable => "llm_unavailable",
            ErrorKind::LlmTimeout => "llm_timeout",
            ErrorKind::LlmEmpty => "llm_empty",
            ErrorKind::ParseFailure => "parse_failure",
            ErrorKind::TableShapeError => "table_shape_error",
            ErrorKind::DataUnavailable => "data_unavailable",
            ErrorKind::SessionNotFound => "session_not_found",
            ErrorKind::SessionExpired => "session_expired",
            ErrorKind::InvalidAnswer => "invalid_answer",
            ErrorKind::UnknownSeries => "unknown_series",
        };
        f.write_str(name)
    }
}

/// One multiple-choice option as rendered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionView {
    pub option_id: String,
    pub label: String,
    pub description: String,
}

/// One funnel question as rendered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    pub feature_id: String,
    pub prompt_text: String,
    pub options: Vec<OptionView>,
}

/// One answered funnel question, bundled into the completion reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference {
    pub feature_id: String,
    pub feature_label: String,
    pub option_id: String,
    pub option_label: String,
}

/// Input for one user turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnInput {
    /// A free-text turn.
    Query { text: String },
    /// A single-step funnel reply. `step_index` guards against stale
    /// answers from a UI that lagged behind the session.
    FunnelAnswer {
        session_id: String,
        option_id: String,
        #[serde(default)]
        step_index: Option<usize>,
    },
    /// A one-shot funnel reply.
    FunnelBatchAnswer {
        session_id: String,
        answers: HashMap<String, String>,
    },
}

/// Output of one user turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    /// The canonical response object.
    Direct { response: ResponseObject },
    /// A funnel is open; the transport should immediately request the
    /// first question for `session_id`.
    FunnelStart { session_id: String, message: String },
    /// The next question to render.
    FunnelQuestion {
        session_id: String,
        step_index: usize,
        total_steps: usize,
        question: QuestionView,
        /// Validation note when an answer was rejected.
        #[serde(default)]
        note: Option<String>,
    },
    /// The one-shot question list.
    FunnelBatch {
        session_id: String,
        questions: Vec<QuestionView>,
        #[serde(default)]
        note: Option<String>,
    },
    /// Terminal funnel event bundling selections and the final reply.
    FunnelComplete {
        session_id: String,
        preferences: Vec<Preference>,
        reply: ResponseObject,
    },
    /// Session lookup failures only; everything else becomes `Direct`.
    Error { kind: ErrorKind, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_cell_short_value_untouched() {
        assert_eq!(truncate_cell("Ryzen 7", 50), "Ryzen 7");
    }

    #[test]
    fn test_truncate_cell_appends_ellipsis() {
        let long = "x".repeat(60);
        let shown = truncate_cell(&long, 50);
        assert_eq!(shown.chars().count(), 50);
        assert!(shown.ends_with('…'));
    }

    #[test]
    fn test_truncate_cell_multibyte_safe() {
        let value = "獨立顯卡".repeat(20);
        let shown = truncate_cell(&value, 10);
        assert_eq!(shown.chars().count(), 10);
    }

    #[test]
    fn test_display_table_keeps_full_values() {
        let mut row = TableRow::new();
        row.insert("feature".to_string(), "GPU".to_string());
        row.insert("AG958".to_string(), "y".repeat(80));
        let response = ResponseObject {
            summary: "ok".to_string(),
            table: vec![row],
        };
        let shown = response.display_table(CELL_DISPLAY_WIDTH);
        assert_eq!(shown[0]["AG958"].chars().count(), 50);
        // Programmatic consumers still see the unshortened value.
        assert_eq!(response.table[0]["AG958"].chars().count(), 80);
    }

    #[test]
    fn test_reply_serialization_is_tagged() {
        let reply = Reply::Error {
            kind: ErrorKind::SessionExpired,
            message: "gone".to_string(),
        };
        let json = serde_json::to_string(&reply).unwrap();
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("\"kind\":\"session_expired\""));
    }
}

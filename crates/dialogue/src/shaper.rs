//! Response shaping and fallbacks
//!
//! Produces the final `{summary, table}` object for every outcome. The
//! rule-based fallback is a first-class output: it is built directly from
//! catalog rows and is syntactically indistinguishable from an LLM-parsed
//! reply, so consumers never branch on where a reply came from.

use nb_assistant_catalog::CatalogStore;
use nb_assistant_core::{
    ResponseObject, SkuRow, TableRow, Topic, COMPARISON_FIELDS, MISSING_CELL,
};

/// Display labels for the fields used in fallback tables.
fn field_label(field: &str) -> &'static str {
    match field {
        "cpu" => "CPU",
        "gpu" => "GPU",
        "memory" => "Memory",
        "storage" => "Storage",
        "lcd" => "Display",
        "battery" => "Battery",
        "structconfig" => "Weight / Build",
        "price" => "Price",
        _ => "Spec",
    }
}

/// Rule-based reply assembled from catalog rows, used whenever the LLM
/// call or its output is unusable. One row per topic-relevant field,
/// columns equal to `target_names`.
pub fn fallback_reply(topic: Topic, rows: &[SkuRow], target_names: &[String]) -> ResponseObject {
    let fields: Vec<&'static str> = match topic.spec_field() {
        Some(field) => vec![field],
        None => COMPARISON_FIELDS.to_vec(),
    };

    let table: Vec<TableRow> = fields
        .iter()
        .map(|&field| {
            let mut row = TableRow::new();
            row.insert("feature".to_string(), field_label(field).to_string());
            for name in target_names {
                let value = rows
                    .iter()
                    .find(|r| &r.model_name == name)
                    .map(|r| r.field(field))
                    .filter(|v| !v.is_empty())
                    .unwrap_or(MISSING_CELL);
                row.insert(name.clone(), value.to_string());
            }
            row
        })
        .collect();

    ResponseObject {
        summary: format!(
            "以下為 {} 的型錄規格整理（未經語言模型分析，直接取自產品資料）。",
            target_names.join("、")
        ),
        table,
    }
}

/// Prose reply for a field nobody has data for. The LLM is never called
/// on this path.
pub fn data_unavailable_reply(field: &str, names: &[String]) -> ResponseObject {
    ResponseObject::prose(format!(
        "抱歉，{} 目前沒有登錄 {} 的相關資料，因此無法回答這個問題。",
        names.join("、"),
        field_label(field)
    ))
}

/// Static enumeration of every model and series.
pub fn listing_reply(catalog: &CatalogStore) -> ResponseObject {
    let names: Vec<&str> = catalog.names().iter().map(String::as_str).collect();
    let series: Vec<&str> = catalog.series().iter().map(String::as_str).collect();
    ResponseObject::prose(format!(
        "目前型錄共有 {} 個機型：{}。系列包括：{}。",
        names.len(),
        names.join("、"),
        series.join("、")
    ))
}

/// Helpful reply for digit tokens that look like series keys but match
/// nothing, naming every valid series in sorted order.
pub fn unknown_series_reply(tokens: &[String], catalog: &CatalogStore) -> ResponseObject {
    let series: Vec<&str> = catalog.series().iter().map(String::as_str).collect();
    ResponseObject::prose(format!(
        "找不到 {} 系列。目前可查詢的系列為：{}。請使用正確的系列名稱重新查詢。",
        tokens.join("、"),
        series.join("、")
    ))
}

/// Reply when retrieval produced nothing at all.
pub fn no_rows_reply() -> ResponseObject {
    ResponseObject::prose("抱歉，找不到符合條件的產品資料，請調整您的查詢後再試一次。")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sku(name: &str, pairs: &[(&str, &str)]) -> SkuRow {
        let columns: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SkuRow::from_columns(name, &columns).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_topic_fallback_has_one_row() {
        let rows = vec![sku("AG958", &[("gpu", "RTX 3050")])];
        let reply = fallback_reply(Topic::Gpu, &rows, &names(&["AG958"]));
        assert_eq!(reply.table.len(), 1);
        assert_eq!(reply.table[0]["feature"], "GPU");
        assert_eq!(reply.table[0]["AG958"], "RTX 3050");
        assert!(reply.summary.contains("未經語言模型分析"));
    }

    #[test]
    fn test_comparison_fallback_covers_primary_fields() {
        let rows = vec![
            sku("AG958", &[("cpu", "R7"), ("gpu", "RTX")]),
            sku("APX958", &[("cpu", "R9")]),
        ];
        let reply = fallback_reply(Topic::Comparison, &rows, &names(&["AG958", "APX958"]));
        assert_eq!(reply.table.len(), COMPARISON_FIELDS.len());
        // Every row shares the same key set in the same order.
        for row in &reply.table {
            let keys: Vec<&str> = row.keys().map(String::as_str).collect();
            assert_eq!(keys, vec!["feature", "AG958", "APX958"]);
        }
        // Missing data shows the placeholder, not an empty string.
        let gpu_row = &reply.table[1];
        assert_eq!(gpu_row["APX958"], MISSING_CELL);
    }

    #[test]
    fn test_data_unavailable_reply_is_prose() {
        let reply = data_unavailable_reply("cpu", &names(&["AG958", "APX958"]));
        assert!(reply.table.is_empty());
        assert!(reply.summary.contains("AG958"));
        assert!(reply.summary.contains("CPU"));
    }

    #[test]
    fn test_unknown_series_reply_lists_valid_series() {
        let catalog = CatalogStore::from_rows(vec![
            sku("AG958", &[]),
            sku("AHP819: FP7R2", &[]),
            sku("APX839", &[]),
        ])
        .unwrap();
        let reply = unknown_series_reply(&names(&["777"]), &catalog);
        assert!(reply.summary.contains("777"));
        // Sorted order is the BTreeSet iteration order.
        let pos_819 = reply.summary.find("819").unwrap();
        let pos_839 = reply.summary.find("839").unwrap();
        let pos_958 = reply.summary.find("958").unwrap();
        assert!(pos_819 < pos_839 && pos_839 < pos_958);
        assert!(reply.table.is_empty());
    }

    #[test]
    fn test_listing_reply_enumerates_everything() {
        let catalog =
            CatalogStore::from_rows(vec![sku("AG958", &[]), sku("AHP819: FP7R2", &[])]).unwrap();
        let reply = listing_reply(&catalog);
        assert!(reply.summary.contains("AG958"));
        assert!(reply.summary.contains("AHP819: FP7R2"));
        assert!(reply.summary.contains("819"));
        assert!(reply.summary.contains("958"));
    }
}

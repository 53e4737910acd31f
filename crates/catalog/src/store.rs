//! Read-only catalog store
//!
//! Rows are loaded once from a JSON file; the derived model-name and
//! series-key sets are frozen for the remainder of the process lifetime.
//! Test rows (`Test *`) and rows without a model name are excluded at
//! load.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;

use nb_assistant_core::SkuRow;

use crate::CatalogError;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    rows: Vec<HashMap<String, String>>,
}

/// The catalog. Immutable after construction; reads are lock-free.
#[derive(Debug)]
pub struct CatalogStore {
    rows: Vec<SkuRow>,
    index_by_name: HashMap<String, usize>,
    names: BTreeSet<String>,
    series: BTreeSet<String>,
}

impl CatalogStore {
    /// Load the catalog from `path`. I/O or schema failure refuses
    /// startup, as does a file that yields zero usable rows.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Unreadable(display.clone(), e.to_string()))?;
        let file: CatalogFile = serde_json::from_str(&raw)
            .map_err(|e| CatalogError::Malformed(display, e.to_string()))?;

        let mut rows = Vec::with_capacity(file.rows.len());
        for columns in &file.rows {
            let model_name = columns
                .get("model_name")
                .map(|v| v.trim())
                .unwrap_or("");
            if model_name.is_empty() || model_name.starts_with("Test ") {
                continue;
            }
            match SkuRow::from_columns(model_name, columns) {
                Some(row) => rows.push(row),
                None => {
                    tracing::warn!(model = model_name, "dropping row without a series key");
                }
            }
        }
        Self::from_rows(rows)
    }

    /// Build from already-constructed rows. Used by tests with synthetic
    /// catalogs.
    pub fn from_rows(mut rows: Vec<SkuRow>) -> Result<Self, CatalogError> {
        if rows.is_empty() {
            return Err(CatalogError::Empty);
        }
        rows.sort_by(|a, b| a.model_name.cmp(&b.model_name));

        let mut index_by_name = HashMap::with_capacity(rows.len());
        let mut names = BTreeSet::new();
        let mut series = BTreeSet::new();
        for (i, row) in rows.iter().enumerate() {
            if index_by_name.insert(row.model_name.clone(), i).is_some() {
                return Err(CatalogError::DuplicateModel(row.model_name.clone()));
            }
            names.insert(row.model_name.clone());
            series.insert(row.series_key.clone());
        }
        tracing::info!(models = rows.len(), series = series.len(), "catalog ready");
        Ok(Self {
            rows,
            index_by_name,
            names,
            series,
        })
    }

    /// Rows whose model name is in `names`, preserving the input order.
    /// Unknown names are silently skipped.
    pub fn by_name<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<SkuRow> {
        names
            .into_iter()
            .filter_map(|name| self.index_by_name.get(name).map(|&i| self.rows[i].clone()))
            .collect()
    }

    /// All rows whose series key is in `keys`, ordered by model name.
    pub fn by_series<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Vec<SkuRow> {
        let wanted: BTreeSet<&str> = keys.into_iter().collect();
        self.rows
            .iter()
            .filter(|row| wanted.contains(row.series_key.as_str()))
            .cloned()
            .collect()
    }

    /// Every row in stable alphabetic order.
    pub fn all(&self) -> Vec<SkuRow> {
        self.rows.clone()
    }

    /// The immutable model-name set.
    pub fn names(&self) -> &BTreeSet<String> {
        &self.names
    }

    /// The immutable series-key set.
    pub fn series(&self) -> &BTreeSet<String> {
        &self.series
    }

    /// Case-insensitive lookup of the canonical model name for `candidate`.
    pub fn canonical_name(&self, candidate: &str) -> Option<&str> {
        let lower = candidate.trim().to_lowercase();
        self.names
            .iter()
            .find(|name| name.to_lowercase() == lower)
            .map(String::as_str)
    }
}

//! In-process vector index
//!
//! One embedding per SKU, precomputed at startup from a fixed
//! concatenation of spec fields. The index is a re-ranker: callers only
//! keep hits that are already confirmed by the catalog. The embedder is a
//! deterministic hash projection, so the index needs no model artifacts
//! and search results are reproducible.

use nb_assistant_core::SkuRow;

use crate::store::CatalogStore;

/// Spec fields concatenated into the embedded text, in this order.
pub const EMBEDDED_FIELDS: &[&str] = &[
    "cpu",
    "gpu",
    "memory",
    "storage",
    "lcd",
    "battery",
    "structconfig",
];

const DEFAULT_DIM: usize = 384;

/// Deterministic hash-projection embedder. Dimension and normalization
/// are fixed at construction; there is no runtime switching.
#[derive(Debug, Clone)]
pub struct Embedder {
    dim: usize,
}

impl Embedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Embed `text` into a unit vector.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dim];
        for (i, c) in text.to_lowercase().chars().enumerate() {
            let idx = (c as usize + i) % self.dim;
            embedding[idx] += 1.0;
        }
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }
        embedding
    }
}

impl Default for Embedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIM)
    }
}

/// The `(model_name, embedding)` collection.
#[derive(Debug)]
pub struct VectorIndex {
    embedder: Embedder,
    entries: Vec<(String, Vec<f32>)>,
}

impl VectorIndex {
    /// Build the index over every catalog row.
    pub fn build(catalog: &CatalogStore, embedder: Embedder) -> Self {
        let entries = catalog
            .all()
            .iter()
            .map(|row| (row.model_name.clone(), embedder.embed(&embedded_text(row))))
            .collect();
        Self { embedder, entries }
    }

    /// Up to `k` hits for `text`, sorted by decreasing cosine similarity,
    /// ties broken by model name ascending.
    pub fn search(&self, text: &str, k: usize) -> Vec<(String, f32)> {
        let query = self.embedder.embed(text);
        let mut scored: Vec<(String, f32)> = self
            .entries
            .iter()
            .map(|(name, emb)| (name.clone(), dot(&query, emb)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    fn from_entries(embedder: Embedder, entries: Vec<(String, Vec<f32>)>) -> Self {
        Self { embedder, entries }
    }
}

/// The fixed field concatenation a SKU is embedded from.
fn embedded_text(row: &SkuRow) -> String {
    let mut parts = vec![row.model_name.clone()];
    for &field in EMBEDDED_FIELDS {
        let value = row.field(field);
        if !value.is_empty() {
            parts.push(value.to_string());
        }
    }
    parts.join(" ")
}

/// Both vectors are unit length, so the dot product is cosine similarity.
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
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

    fn index() -> VectorIndex {
        let store = CatalogStore::from_rows(vec![
            sku("AG958", &[("gpu", "RTX 3050 gaming"), ("cpu", "Ryzen 7")]),
            sku("APX819: FP7R2", &[("cpu", "Ryzen 5"), ("structconfig", "1.5 kg thin")]),
            sku("AHP839", &[("battery", "80Wh long life")]),
        ])
        .unwrap();
        VectorIndex::build(&store, Embedder::default())
    }

    #[test]
    fn test_embedding_is_normalized() {
        let embedder = Embedder::default();
        let v = embedder.embed("gaming laptop with discrete graphics");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_embedding_is_deterministic() {
        let embedder = Embedder::default();
        assert_eq!(embedder.embed("AG958"), embedder.embed("AG958"));
    }

    #[test]
    fn test_search_returns_at_most_k_sorted() {
        let index = index();
        let hits = index.search("Ryzen gaming", 2);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].1 >= hits[1].1);
    }

    #[test]
    fn test_tie_break_on_model_name() {
        // Identical embeddings must resolve by name ascending.
        let embedder = Embedder::default();
        let shared = embedder.embed("same spec text");
        let index = VectorIndex::from_entries(
            embedder,
            vec![
                ("B958".to_string(), shared.clone()),
                ("A958".to_string(), shared),
            ],
        );
        let hits = index.search("same spec text", 2);
        assert_eq!(hits[0].0, "A958");
        assert_eq!(hits[1].0, "B958");
    }

    #[test]
    fn test_index_covers_catalog() {
        assert_eq!(index().len(), 3);
    }
}

//! Entity + intent extraction
//!
//! A pure pass over one query: regex entity hits are deduplicated in
//! first-occurrence order and validated against the catalog's closed
//! model-name and series-key sets, so hallucinated references (a `777`
//! that matches the pattern but no catalog entry) never reach retrieval.
//! The topic comes from the keyword map scanned in declaration order.

use std::sync::Arc;

use nb_assistant_catalog::CatalogStore;
use nb_assistant_config::AssistantConfig;
use nb_assistant_core::{Intent, Topic};

pub struct EntityExtractor {
    config: Arc<AssistantConfig>,
    catalog: Arc<CatalogStore>,
}

impl EntityExtractor {
    pub fn new(config: Arc<AssistantConfig>, catalog: Arc<CatalogStore>) -> Self {
        Self { config, catalog }
    }

    /// Extract the intent record for `query`.
    pub fn extract(&self, query: &str) -> Intent {
        let query_lower = query.to_lowercase();

        let model_names = self.match_model_names(query);
        let series_keys = self.match_series_keys(query);

        let mut topic = self
            .config
            .keywords
            .scan(&query_lower)
            .unwrap_or(Topic::General);

        // A comparison phrase plus at least two models is always a
        // comparison, whatever keyword happened to match first.
        if model_names.len() >= 2 && self.mentions_comparison(&query_lower) {
            topic = Topic::Comparison;
        }

        let shape = Intent::shape_of(&model_names, &series_keys);
        Intent {
            original_query: query.to_string(),
            model_names,
            series_keys,
            topic,
            shape,
        }
    }

    fn match_model_names(&self, query: &str) -> Vec<String> {
        let mut found = Vec::new();
        for regex in self.config.entities.model_name() {
            for hit in regex.find_iter(query) {
                if let Some(canonical) = self.catalog.canonical_name(hit.as_str()) {
                    if !found.iter().any(|n| n == canonical) {
                        found.push(canonical.to_string());
                    }
                }
            }
        }
        found
    }

    fn match_series_keys(&self, query: &str) -> Vec<String> {
        let mut found = Vec::new();
        for regex in self.config.entities.series_key() {
            for hit in regex.find_iter(query) {
                let token = hit.as_str();
                if !self.catalog.series().contains(token) {
                    continue;
                }
                if !found.iter().any(|k| k == token) {
                    found.push(token.to_string());
                }
            }
        }
        found
    }

    fn mentions_comparison(&self, query_lower: &str) -> bool {
        self.config
            .funnel
            .trigger
            .comparison
            .iter()
            .any(|k| query_lower.contains(&k.to_lowercase()))
    }
}

//! Intent routing
//!
//! Classifies every free-text turn into one handling mode. Decision
//! order, first match wins: list-all request, funnel trigger, known
//! unknown series, direct answer. The router never retrieves anything
//! itself.

use std::sync::Arc;

use nb_assistant_catalog::CatalogStore;
use nb_assistant_config::AssistantConfig;
use nb_assistant_core::{Intent, IntentShape, Scenario};

use crate::funnel::FunnelController;

/// The chosen handling mode.
#[derive(Debug, PartialEq, Eq)]
pub enum Route {
    /// Static enumeration of every model and series.
    Listing,
    /// Open a funnel under this scenario.
    Funnel(Scenario),
    /// Digit tokens that look like series keys but match nothing.
    UnknownSeries(Vec<String>),
    /// Pass the intent to the retrieval planner.
    Direct,
}

pub struct IntentRouter {
    config: Arc<AssistantConfig>,
    catalog: Arc<CatalogStore>,
}

impl IntentRouter {
    pub fn new(config: Arc<AssistantConfig>, catalog: Arc<CatalogStore>) -> Self {
        Self { config, catalog }
    }

    pub fn route(&self, query: &str, intent: &Intent, funnel: &FunnelController) -> Route {
        let query_lower = query.to_lowercase();

        if self
            .config
            .funnel
            .trigger
            .listing
            .iter()
            .any(|phrase| query_lower.contains(&phrase.to_lowercase()))
        {
            tracing::info!(route = "listing", "routed turn");
            return Route::Listing;
        }

        if let Some(scenario) = funnel.should_activate(query, intent) {
            tracing::info!(route = "funnel", scenario = scenario.key(), "routed turn");
            return Route::Funnel(scenario);
        }

        if intent.shape == IntentShape::Unknown {
            let strays = stray_series_tokens(query, &self.catalog);
            if !strays.is_empty() {
                tracing::info!(route = "unknown_series", tokens = ?strays, "routed turn");
                return Route::UnknownSeries(strays);
            }
        }

        tracing::info!(route = "direct", topic = intent.topic.key(), "routed turn");
        Route::Direct
    }
}

/// Digit runs of series-key length that match no known series.
fn stray_series_tokens(query: &str, catalog: &CatalogStore) -> Vec<String> {
    let mut tokens = Vec::new();
    let bytes = query.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i - start >= 3 {
                let token = &query[start..i];
                if !catalog.series().contains(token) && !tokens.iter().any(|t| t == token) {
                    tokens.push(token.to_string());
                }
            }
        } else {
            i += 1;
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::EntityExtractor;
    use nb_assistant_core::SkuRow;
    use std::collections::HashMap;

    fn sku(name: &str) -> SkuRow {
        SkuRow::from_columns(name, &HashMap::new()).unwrap()
    }

    struct Fixture {
        router: IntentRouter,
        extractor: EntityExtractor,
        funnel: FunnelController,
    }

    fn fixture() -> Fixture {
        let config = Arc::new(
            AssistantConfig::from_strs(
                r#"{"intent_keywords": {
                    "comparison": {"keywords": ["比較"], "description": ""},
                    "cpu": {"keywords": ["cpu"], "description": ""}}}"#,
                r#"{"entity_patterns": {
                    "MODEL_NAME": {"patterns": ["(?i)[A-Z]{2,4}\\d{3}"]},
                    "SERIES_KEY": {"patterns": ["\\d{3}"]}}}"#,
                r#"{"features": {
                        "cpu": {"prompt_text": "?", "options": [{"option_id": "high", "label": "高"}]}},
                    "priorities": {},
                    "scenario_keywords": {"business": ["辦公"]},
                    "trigger_keywords": {"vague": ["推薦", "適合"], "comparison": ["比較"],
                                         "listing": ["列出所有型號", "所有系列"]}}"#,
                "{context} {query}",
            )
            .unwrap(),
        );
        let catalog = Arc::new(
            CatalogStore::from_rows(vec![sku("AG958"), sku("APX958"), sku("AHP819: FP7R2")])
                .unwrap(),
        );
        Fixture {
            router: IntentRouter::new(Arc::clone(&config), Arc::clone(&catalog)),
            extractor: EntityExtractor::new(Arc::clone(&config), Arc::clone(&catalog)),
            funnel: FunnelController::new(config),
        }
    }

    fn route_of(f: &Fixture, query: &str) -> Route {
        let intent = f.extractor.extract(query);
        f.router.route(query, &intent, &f.funnel)
    }

    #[test]
    fn test_listing_wins_first() {
        let f = fixture();
        assert_eq!(route_of(&f, "請列出所有型號"), Route::Listing);
    }

    #[test]
    fn test_vague_query_routes_to_funnel() {
        let f = fixture();
        assert_eq!(
            route_of(&f, "我想要一台適合辦公的筆電"),
            Route::Funnel(Scenario::Business)
        );
    }

    #[test]
    fn test_model_query_never_funnels() {
        let f = fixture();
        assert_eq!(route_of(&f, "推薦 AG958 適合嗎"), Route::Direct);
    }

    #[test]
    fn test_unknown_series_detected() {
        let f = fixture();
        let route = route_of(&f, "777 系列有哪些？");
        assert_eq!(route, Route::UnknownSeries(vec!["777".to_string()]));
    }

    #[test]
    fn test_known_series_routes_direct() {
        let f = fixture();
        assert_eq!(route_of(&f, "958 系列 cpu 比較"), Route::Direct);
    }
}

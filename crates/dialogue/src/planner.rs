//! Retrieval planning
//!
//! Maps a resolved intent (user-stated or funnel-collected) onto the
//! catalog rows to answer from and the ordered target names that fix the
//! reply table's columns. The vector index only re-ranks: rows the
//! catalog filter kept are reordered so semantically closer models come
//! first, and vector hits outside the filtered set are discarded.

use std::sync::Arc;

use nb_assistant_catalog::{CatalogStore, VectorIndex};
use nb_assistant_config::funnel::row_matches;
use nb_assistant_core::{Intent, IntentShape, SkuRow, Topic};

use crate::funnel::FunnelOutcome;

/// How many vector hits to consider when re-ranking.
const ENRICH_TOP_K: usize = 10;

/// Rows plus the column order for the reply table.
#[derive(Debug)]
pub struct RetrievalPlan {
    pub rows: Vec<SkuRow>,
    pub target_names: Vec<String>,
}

/// Planner verdict for one turn.
#[derive(Debug)]
pub enum PlanOutcome {
    Plan(RetrievalPlan),
    /// The topic names a spec field and every retrieved row has no data
    /// for it; the reply is produced without calling the LLM.
    DataUnavailable {
        field: &'static str,
        names: Vec<String>,
    },
}

pub struct RetrievalPlanner {
    catalog: Arc<CatalogStore>,
    vectors: Arc<VectorIndex>,
    /// Series to fall back to when funnel filters eliminate everything.
    default_series: Vec<String>,
}

impl RetrievalPlanner {
    pub fn new(
        catalog: Arc<CatalogStore>,
        vectors: Arc<VectorIndex>,
        default_series: Vec<String>,
    ) -> Self {
        Self {
            catalog,
            vectors,
            default_series,
        }
    }

    /// Plan a direct-answer turn.
    pub fn plan(&self, intent: &Intent) -> PlanOutcome {
        let mut rows = match intent.shape {
            IntentShape::SpecificModel => self
                .catalog
                .by_name(intent.model_names.iter().map(String::as_str)),
            IntentShape::Series => self
                .catalog
                .by_series(intent.series_keys.iter().map(String::as_str)),
            IntentShape::Unknown => self.catalog.all(),
        };

        // Re-rank only unpinned result sets: a query that named models or
        // a series fixed its own column order.
        if matches!(intent.topic, Topic::General | Topic::Unclear)
            && intent.shape == IntentShape::Unknown
            && rows.len() > 1
        {
            self.enrich(&mut rows, &intent.original_query);
        }

        self.finish(rows, intent.topic)
    }

    /// Plan a funnel-completion turn: apply the collected filters over the
    /// whole catalog, falling back to the configured default series when
    /// the filters eliminate everything.
    pub fn plan_funnel(&self, outcome: &FunnelOutcome) -> PlanOutcome {
        let mut rows: Vec<SkuRow> = if outcome.filters.is_empty() {
            Vec::new()
        } else {
            self.catalog
                .all()
                .into_iter()
                .filter(|row| row_matches(row, &outcome.filters))
                .collect()
        };

        if rows.is_empty() {
            tracing::info!(
                session_id = %outcome.session_id,
                "funnel filters matched nothing; using default series"
            );
            rows = self
                .catalog
                .by_series(self.default_series.iter().map(String::as_str));
            if rows.is_empty() {
                rows = self.catalog.all();
            }
        }

        if rows.len() > 1 {
            self.enrich(&mut rows, &outcome.enhanced_query);
        }

        self.finish(rows, Topic::Comparison)
    }

    /// Reorder `rows` so vector-ranked names come first. Rows the vector
    /// search did not surface keep their relative order at the tail.
    fn enrich(&self, rows: &mut Vec<SkuRow>, query: &str) {
        let hits = self.vectors.search(query, ENRICH_TOP_K);
        if hits.is_empty() {
            return;
        }
        let rank_of = |name: &str| -> usize {
            hits.iter()
                .position(|(hit, _)| hit == name)
                .unwrap_or(usize::MAX)
        };
        rows.sort_by_key(|row| rank_of(&row.model_name));
    }

    fn finish(&self, rows: Vec<SkuRow>, topic: Topic) -> PlanOutcome {
        let names: Vec<String> = rows.iter().map(|r| r.model_name.clone()).collect();
        if let Some(field) = topic.spec_field() {
            if !rows.is_empty() && rows.iter().all(|r| r.field_is_empty(field)) {
                return PlanOutcome::DataUnavailable {
                    field,
                    names,
                };
            }
        }
        PlanOutcome::Plan(RetrievalPlan {
            rows,
            target_names: names,
        })
    }
}

//! Funnel feature configuration
//!
//! Questions, per-scenario priority lists, scenario keywords and trigger
//! keyword lists. Option filters are partial predicates over SKU rows and
//! are validated against the spec-field registry at load.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use nb_assistant_core::{is_spec_field, Scenario, SkuRow, Topic};

use crate::ConfigError;

/// Option ids that mean "no preference"; they contribute neither filters
/// nor enhanced-query fragments.
pub const NO_PREFERENCE_OPTION_IDS: &[&str] = &["no_preference", "no_specific", "flexible"];

const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

/// One match rule over a single spec field.
///
/// Field values are free text, so set membership is implemented as
/// "contains any of the listed tokens"; the comparison rules parse the
/// first decimal number out of the field text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchRule {
    Equals {
        equals: String,
    },
    AnyOf {
        any_of: Vec<String>,
    },
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
}

impl MatchRule {
    /// Whether `value` (a raw field string) satisfies the rule. Empty
    /// field values never match.
    pub fn matches(&self, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }
        match self {
            MatchRule::Equals { equals } => value.eq_ignore_ascii_case(equals.trim()),
            MatchRule::AnyOf { any_of } => {
                let lower = value.to_lowercase();
                any_of.iter().any(|t| lower.contains(&t.to_lowercase()))
            }
            MatchRule::Range { min, max } => match parse_leading_number(value) {
                Some(n) => min.map_or(true, |lo| n >= lo) && max.map_or(true, |hi| n <= hi),
                None => false,
            },
        }
    }

    fn is_vacuous(&self) -> bool {
        matches!(
            self,
            MatchRule::Range {
                min: None,
                max: None
            }
        ) || matches!(self, MatchRule::AnyOf { any_of } if any_of.is_empty())
    }
}

/// First decimal number in `value`, e.g. `"1.89 kg"` → `1.89`.
pub fn parse_leading_number(value: &str) -> Option<f64> {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            let mut seen_dot = false;
            while i < bytes.len()
                && (bytes[i].is_ascii_digit() || (bytes[i] == b'.' && !seen_dot))
            {
                if bytes[i] == b'.' {
                    seen_dot = true;
                }
                i += 1;
            }
            let end = if bytes[i - 1] == b'.' { i - 1 } else { i };
            return value[start..end].parse().ok();
        }
        i += 1;
    }
    None
}

/// A partial predicate over SKU rows: field → rule, all of which must hold.
pub type FilterSpec = IndexMap<String, MatchRule>;

/// Whether `row` satisfies every rule in `filters`. An empty filter set
/// matches everything.
pub fn row_matches(row: &SkuRow, filters: &FilterSpec) -> bool {
    filters.iter().all(|(field, rule)| rule.matches(row.field(field)))
}

/// One multiple-choice option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionSpec {
    pub option_id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub filter: FilterSpec,
}

/// One funnel question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Display name used in preference summaries, e.g. `顯示晶片`.
    #[serde(default)]
    pub name: String,
    pub prompt_text: String,
    pub options: Vec<OptionSpec>,
}

impl FeatureSpec {
    pub fn option(&self, option_id: &str) -> Option<&OptionSpec> {
        self.options.iter().find(|o| o.option_id == option_id)
    }
}

/// Substring lists that steer routing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerKeywords {
    /// Phrases marking a query too vague to answer directly.
    #[serde(default)]
    pub vague: Vec<String>,
    /// Phrases marking a comparison request.
    #[serde(default)]
    pub comparison: Vec<String>,
    /// Catch-all "list everything" phrases.
    #[serde(default)]
    pub listing: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FunnelFile {
    features: IndexMap<String, FeatureSpec>,
    #[serde(default)]
    priorities: IndexMap<String, Vec<String>>,
    #[serde(default)]
    scenario_keywords: IndexMap<String, Vec<String>>,
    #[serde(default)]
    lifestyle_topics: Vec<String>,
    trigger_keywords: TriggerKeywords,
    #[serde(default)]
    session_ttl_secs: Option<u64>,
    #[serde(default)]
    shuffle_leading_questions: bool,
    #[serde(default)]
    default_series: Vec<String>,
}

/// The validated funnel configuration.
#[derive(Debug)]
pub struct FunnelConfig {
    pub features: IndexMap<String, FeatureSpec>,
    priorities: IndexMap<Scenario, Vec<String>>,
    scenario_keywords: Vec<(Scenario, Vec<String>)>,
    pub lifestyle_topics: Vec<Topic>,
    pub trigger: TriggerKeywords,
    pub session_ttl_secs: u64,
    pub shuffle_leading_questions: bool,
    /// Series used when a funnel completion filters down to nothing.
    pub default_series: Vec<String>,
}

impl FunnelConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: FunnelFile = serde_json::from_str(json)
            .map_err(|e| ConfigError::Malformed(crate::FUNNEL_FEATURES_FILE.into(), e.to_string()))?;

        for (feature_id, feature) in &file.features {
            let mut seen = std::collections::HashSet::new();
            for option in &feature.options {
                if !seen.insert(option.option_id.as_str()) {
                    return Err(ConfigError::DuplicateOptionId {
                        question: feature_id.clone(),
                        option: option.option_id.clone(),
                    });
                }
                for (field, rule) in &option.filter {
                    if !is_spec_field(field) {
                        return Err(ConfigError::UnknownFilterField {
                            question: feature_id.clone(),
                            option: option.option_id.clone(),
                            field: field.clone(),
                        });
                    }
                    if rule.is_vacuous() {
                        return Err(ConfigError::EmptyMatchRule {
                            question: feature_id.clone(),
                            option: option.option_id.clone(),
                        });
                    }
                }
            }
        }

        let mut priorities = IndexMap::new();
        for (key, order) in file.priorities {
            let scenario =
                Scenario::from_key(&key).ok_or_else(|| ConfigError::UnknownScenario(key.clone()))?;
            priorities.insert(scenario, order);
        }

        let mut scenario_keywords = Vec::new();
        for (key, words) in file.scenario_keywords {
            let scenario =
                Scenario::from_key(&key).ok_or_else(|| ConfigError::UnknownScenario(key.clone()))?;
            scenario_keywords.push((
                scenario,
                words.iter().map(|w| w.to_lowercase()).collect(),
            ));
        }

        let lifestyle_topics = file
            .lifestyle_topics
            .iter()
            .filter_map(|key| {
                let topic = Topic::from_key(key);
                if topic.is_none() {
                    tracing::warn!(topic = %key, "ignoring unknown lifestyle topic");
                }
                topic
            })
            .collect();

        Ok(Self {
            features: file.features,
            priorities,
            scenario_keywords,
            lifestyle_topics,
            trigger: file.trigger_keywords,
            session_ttl_secs: file.session_ttl_secs.unwrap_or(DEFAULT_SESSION_TTL_SECS),
            shuffle_leading_questions: file.shuffle_leading_questions,
            default_series: file.default_series,
        })
    }

    /// The priority list for `scenario`, filtered to feature ids that
    /// actually exist in the features map. Falls back to the declaration
    /// order of the features map when the scenario has no list.
    pub fn question_order(&self, scenario: Scenario) -> Vec<String> {
        match self.priorities.get(&scenario) {
            Some(order) => order
                .iter()
                .filter(|id| self.features.contains_key(id.as_str()))
                .cloned()
                .collect(),
            None => self.features.keys().cloned().collect(),
        }
    }

    /// First scenario whose any keyword appears in `query_lower`;
    /// `General` when nothing matches.
    pub fn detect_scenario(&self, query_lower: &str) -> Scenario {
        self.scenario_keywords
            .iter()
            .find(|(_, words)| words.iter().any(|w| query_lower.contains(w.as_str())))
            .map(|(scenario, _)| *scenario)
            .unwrap_or(Scenario::General)
    }
}

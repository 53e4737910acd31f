//! Startup artifact loading
//!
//! Four artifacts are read once from a configured directory and exposed
//! through typed, immutable accessors:
//!
//! 1. `intent_keywords.json`: topic keyword lists, scanned in file order
//! 2. `entity_patterns.json`: regex patterns per entity kind
//! 3. `funnel_features.json`: questions, scenario priorities, triggers
//! 4. `reply_prompt.txt`: the LLM prompt template
//!
//! Schema drift in any of them refuses startup with a precise error.
//! There is no hot reload; operators restart the process to pick up
//! changes.

pub mod entities;
pub mod funnel;
pub mod keywords;

use std::path::Path;

use thiserror::Error;

pub use entities::EntityPatterns;
pub use funnel::{
    FeatureSpec, FilterSpec, FunnelConfig, MatchRule, OptionSpec, TriggerKeywords,
    NO_PREFERENCE_OPTION_IDS,
};
pub use keywords::IntentKeywords;

/// File names inside the config directory.
pub const INTENT_KEYWORDS_FILE: &str = "intent_keywords.json";
pub const ENTITY_PATTERNS_FILE: &str = "entity_patterns.json";
pub const FUNNEL_FEATURES_FILE: &str = "funnel_features.json";
pub const REPLY_PROMPT_FILE: &str = "reply_prompt.txt";

/// Placeholders the prompt template must contain exactly once each.
pub const PROMPT_PLACEHOLDERS: [&str; 2] = ["{context}", "{query}"];

/// Errors raised while loading the startup artifacts. All are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {0} unreadable: {1}")]
    Unreadable(String, String),

    #[error("config file {0} malformed: {1}")]
    Malformed(String, String),

    #[error("entity patterns missing mandatory kind {0}")]
    MissingEntityKind(String),

    #[error("entity kind {0} has no usable pattern")]
    NoUsablePattern(String),

    #[error("question {question} option {option} filters on unknown field {field}")]
    UnknownFilterField {
        question: String,
        option: String,
        field: String,
    },

    #[error("question {question} option {option} has an empty match rule")]
    EmptyMatchRule { question: String, option: String },

    #[error("question {question} repeats option id {option}")]
    DuplicateOptionId { question: String, option: String },

    #[error("priority list {0} is unknown; expected a scenario key")]
    UnknownScenario(String),

    #[error("prompt template must contain {0} exactly once")]
    BadPromptTemplate(String),
}

/// All four artifacts, loaded once and shared immutably.
#[derive(Debug)]
pub struct AssistantConfig {
    pub keywords: IntentKeywords,
    pub entities: EntityPatterns,
    pub funnel: FunnelConfig,
    pub prompt_template: String,
}

impl AssistantConfig {
    /// Load all artifacts from `dir`. Any failure refuses startup.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let keywords = IntentKeywords::from_json(&read(dir, INTENT_KEYWORDS_FILE)?)?;
        let entities = EntityPatterns::from_json(&read(dir, ENTITY_PATTERNS_FILE)?)?;
        let funnel = FunnelConfig::from_json(&read(dir, FUNNEL_FEATURES_FILE)?)?;
        let prompt_template = read(dir, REPLY_PROMPT_FILE)?;
        validate_prompt_template(&prompt_template)?;
        tracing::info!(
            topics = keywords.len(),
            questions = funnel.features.len(),
            "configuration loaded"
        );
        Ok(Self {
            keywords,
            entities,
            funnel,
            prompt_template,
        })
    }

    /// Build from in-memory artifact strings. Used by tests and embedders
    /// that ship their artifacts inline.
    pub fn from_strs(
        keywords: &str,
        entities: &str,
        funnel: &str,
        prompt_template: &str,
    ) -> Result<Self, ConfigError> {
        validate_prompt_template(prompt_template)?;
        Ok(Self {
            keywords: IntentKeywords::from_json(keywords)?,
            entities: EntityPatterns::from_json(entities)?,
            funnel: FunnelConfig::from_json(funnel)?,
            prompt_template: prompt_template.to_string(),
        })
    }
}

fn read(dir: &Path, file: &str) -> Result<String, ConfigError> {
    std::fs::read_to_string(dir.join(file))
        .map_err(|e| ConfigError::Unreadable(file.to_string(), e.to_string()))
}

fn validate_prompt_template(template: &str) -> Result<(), ConfigError> {
    for placeholder in PROMPT_PLACEHOLDERS {
        if template.matches(placeholder).count() != 1 {
            return Err(ConfigError::BadPromptTemplate(placeholder.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_template_requires_both_placeholders() {
        assert!(validate_prompt_template("context: {context}\nquery: {query}").is_ok());
        assert!(validate_prompt_template("query: {query}").is_err());
        assert!(validate_prompt_template("{context} {context} {query}").is_err());
    }

    #[test]
    fn test_from_strs_round_trip() {
        let config = AssistantConfig::from_strs(
            r#"{"intent_keywords": {"cpu": {"keywords": ["cpu"], "description": "cpu asks"}}}"#,
            r#"{"entity_patterns": {
                "MODEL_NAME": {"patterns": ["[A-Z]{2,4}\\d{3}"], "examples": ["AG958"]},
                "SERIES_KEY": {"patterns": ["\\d{3}"], "examples": ["958"]}}}"#,
            r#"{"features": {}, "priorities": {}, "trigger_keywords": {"vague": [], "comparison": []}}"#,
            "{context}\n{query}",
        )
        .unwrap();
        assert_eq!(config.keywords.len(), 1);
    }
}

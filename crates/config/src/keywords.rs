//! Intent keyword configuration
//!
//! Maps topic tags to keyword lists. The scan order is the declaration
//! order in the file: the first topic with a matching keyword wins, which
//! gives operators explicit control by reordering entries. Keywords match
//! by case-insensitive substring containment.

use indexmap::IndexMap;
use serde::Deserialize;

use nb_assistant_core::Topic;

use crate::ConfigError;

#[derive(Debug, Deserialize)]
struct KeywordsFile {
    intent_keywords: IndexMap<String, TopicEntryRaw>,
}

#[derive(Debug, Deserialize)]
struct TopicEntryRaw {
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    description: String,
}

/// One validated topic entry.
#[derive(Debug, Clone)]
pub struct TopicKeywords {
    pub topic: Topic,
    /// Lowercased keywords, matched against the lowercased query.
    pub keywords: Vec<String>,
    pub description: String,
}

/// The ordered topic → keywords map.
///
/// An empty map is legal and degrades the extractor to always returning
/// `general`.
#[derive(Debug, Default)]
pub struct IntentKeywords {
    entries: Vec<TopicKeywords>,
}

impl IntentKeywords {
    /// Parse and validate the artifact. Unknown topic keys are logged and
    /// dropped; they are operator typos, not fatal drift.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: KeywordsFile = serde_json::from_str(json)
            .map_err(|e| ConfigError::Malformed(crate::INTENT_KEYWORDS_FILE.into(), e.to_string()))?;

        let mut entries = Vec::with_capacity(file.intent_keywords.len());
        for (key, raw) in file.intent_keywords {
            match Topic::from_key(&key) {
                Some(topic) => entries.push(TopicKeywords {
                    topic,
                    keywords: raw.keywords.iter().map(|k| k.to_lowercase()).collect(),
                    description: raw.description,
                }),
                None => {
                    tracing::warn!(topic = %key, "ignoring unknown intent topic");
                }
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in declaration order.
    pub fn entries(&self) -> &[TopicKeywords] {
        &self.entries
    }

    /// First topic whose any keyword appears in `query_lower`, scanning in
    /// declaration order. `None` when nothing matches.
    pub fn scan(&self, query_lower: &str) -> Option<Topic> {
        self.entries
            .iter()
            .find(|entry| entry.keywords.iter().any(|k| query_lower.contains(k.as_str())))
            .map(|entry| entry.topic)
    }
}

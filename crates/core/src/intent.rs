//! Intent records
//!
//! The extractor condenses a free-text query into an `Intent`: the SKU
//! names and series keys it mentions, one topic tag from a closed set, and
//! the overall query shape.

use serde::{Deserialize, Serialize};

/// What the user is asking about. Closed set; keyword files may only bind
/// keywords to these tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Cpu,
    Gpu,
    Memory,
    Storage,
    Display,
    Battery,
    Price,
    Portability,
    Comparison,
    General,
    Unclear,
}

impl Topic {
    /// Parse a topic key as written in the keyword config.
    pub fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "cpu" => Topic::Cpu,
            "gpu" => Topic::Gpu,
            "memory" => Topic::Memory,
            "storage" => Topic::Storage,
            "display" => Topic::Display,
            "battery" => Topic::Battery,
            "price" => Topic::Price,
            "portability" => Topic::Portability,
            "comparison" => Topic::Comparison,
            "general" => Topic::General,
            "unclear" => Topic::Unclear,
            _ => return None,
        })
    }

    /// The stable config key for this topic.
    pub fn key(&self) -> &'static str {
        match self {
            Topic::Cpu => "cpu",
            Topic::Gpu => "gpu",
            Topic::Memory => "memory",
            Topic::Storage => "storage",
            Topic::Display => "display",
            Topic::Battery => "battery",
            Topic::Price => "price",
            Topic::Portability => "portability",
            Topic::Comparison => "comparison",
            Topic::General => "general",
            Topic::Unclear => "unclear",
        }
    }

    /// The spec field this topic projects onto, if it names one.
    pub fn spec_field(&self) -> Option<&'static str> {
        match self {
            Topic::Cpu => Some("cpu"),
            Topic::Gpu => Some("gpu"),
            Topic::Memory => Some("memory"),
            Topic::Storage => Some("storage"),
            Topic::Display => Some("lcd"),
            Topic::Battery => Some("battery"),
            Topic::Price => Some("price"),
            Topic::Portability => Some("structconfig"),
            Topic::Comparison | Topic::General | Topic::Unclear => None,
        }
    }

    /// Human-facing label used as the `feature` cell in fallback tables.
    pub fn display_label(&self) -> &'static str {
        match self {
            Topic::Cpu => "CPU",
            Topic::Gpu => "GPU",
            Topic::Memory => "Memory",
            Topic::Storage => "Storage",
            Topic::Display => "Display",
            Topic::Battery => "Battery",
            Topic::Price => "Price",
            Topic::Portability => "Weight / Build",
            Topic::Comparison => "Comparison",
            Topic::General => "Overview",
            Topic::Unclear => "Overview",
        }
    }
}

/// Coarse query shape, derived from the extracted entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentShape {
    /// At least one known model name was mentioned.
    SpecificModel,
    /// No model name, but at least one known series key.
    Series,
    /// Neither.
    Unknown,
}

/// The per-session use-case label that selects the funnel question order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Gaming,
    Business,
    Study,
    Creation,
    General,
}

impl Scenario {
    pub fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "gaming" => Scenario::Gaming,
            "business" => Scenario::Business,
            "study" => Scenario::Study,
            "creation" => Scenario::Creation,
            "general" => Scenario::General,
            _ => return None,
        })
    }

    pub fn key(&self) -> &'static str {
        match self {
            Scenario::Gaming => "gaming",
            Scenario::Business => "business",
            Scenario::Study => "study",
            Scenario::Creation => "creation",
            Scenario::General => "general",
        }
    }
}

/// Extraction result for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    /// The query as typed, kept for display and prompting.
    pub original_query: String,
    /// Known model names mentioned, first-occurrence order, deduplicated.
    pub model_names: Vec<String>,
    /// Known series keys mentioned, first-occurrence order, deduplicated.
    pub series_keys: Vec<String>,
    pub topic: Topic,
    pub shape: IntentShape,
}

impl Intent {
    /// Compute the shape from the entity lists: model names win over
    /// series keys; both empty means unknown.
    pub fn shape_of(model_names: &[String], series_keys: &[String]) -> IntentShape {
        if !model_names.is_empty() {
            IntentShape::SpecificModel
        } else if !series_keys.is_empty() {
            IntentShape::Series
        } else {
            IntentShape::Unknown
        }
    }
}

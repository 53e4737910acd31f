//! Entity pattern configuration
//!
//! Regex patterns per entity kind, compiled once at startup. `MODEL_NAME`
//! and `SERIES_KEY` are mandatory kinds; invalid patterns inside a kind
//! are logged and dropped, but a kind that ends up with zero usable
//! patterns refuses startup.

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;

use crate::ConfigError;

pub const MODEL_NAME_KIND: &str = "MODEL_NAME";
pub const SERIES_KEY_KIND: &str = "SERIES_KEY";

#[derive(Debug, Deserialize)]
struct PatternsFile {
    entity_patterns: IndexMap<String, PatternEntryRaw>,
}

#[derive(Debug, Deserialize)]
struct PatternEntryRaw {
    patterns: Vec<String>,
    #[serde(default)]
    #[allow(dead_code)] // examples document the file for operators
    examples: Vec<String>,
}

/// Compiled entity patterns.
#[derive(Debug)]
pub struct EntityPatterns {
    model_name: Vec<Regex>,
    series_key: Vec<Regex>,
}

impl EntityPatterns {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: PatternsFile = serde_json::from_str(json)
            .map_err(|e| ConfigError::Malformed(crate::ENTITY_PATTERNS_FILE.into(), e.to_string()))?;

        let model_name = compile_kind(&file, MODEL_NAME_KIND)?;
        let series_key = compile_kind(&file, SERIES_KEY_KIND)?;
        Ok(Self {
            model_name,
            series_key,
        })
    }

    /// Patterns identifying full model names.
    pub fn model_name(&self) -> &[Regex] {
        &self.model_name
    }

    /// Patterns identifying bare series tokens.
    pub fn series_key(&self) -> &[Regex] {
        &self.series_key
    }
}

fn compile_kind(file: &PatternsFile, kind: &str) -> Result<Vec<Regex>, ConfigError> {
    let entry = file
        .entity_patterns
        .get(kind)
        .ok_or_else(|| ConfigError::MissingEntityKind(kind.to_string()))?;

    let mut compiled = Vec::with_capacity(entry.patterns.len());
    for pattern in &entry.patterns {
        match Regex::new(pattern) {
            Ok(regex) => compiled.push(regex),
            Err(e) => {
                tracing::warn!(kind, pattern, error = %e, "dropping invalid entity pattern");
            }
        }
    }
    if compiled.is_empty() {
        return Err(ConfigError::NoUsablePattern(kind.to_string()));
    }
    Ok(compiled)
}

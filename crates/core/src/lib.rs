//! Core types for the guided laptop recommender
//!
//! This crate provides the shared vocabulary used across all other crates:
//! - SKU rows and the closed spec-field registry
//! - Intent records (entities + topic + shape)
//! - The canonical response object and comparison table
//! - The `Reply` tagged union returned for every user turn
//! - The closed set of error kinds

pub mod intent;
pub mod reply;
pub mod sku;

pub use intent::{Intent, IntentShape, Scenario, Topic};
pub use reply::{
    truncate_cell, ErrorKind, OptionView, Preference, QuestionView, Reply, ResponseObject,
    TableRow, TurnInput, CELL_DISPLAY_WIDTH, MISSING_CELL,
};
pub use sku::{is_spec_field, series_key_of, SkuRow, COMPARISON_FIELDS, SPEC_FIELDS};

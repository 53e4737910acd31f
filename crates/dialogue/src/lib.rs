//! Dialogue orchestration core
//!
//! Everything between a raw user turn and the canonical reply:
//!
//! - [`extractor`]: entities and intent from free text
//! - [`funnel`]: session lifecycle and slot filling for vague queries
//! - [`router`]: per-query handling mode decision
//! - [`planner`]: intent to SKU rows plus target names
//! - [`shaper`]: final response objects, including all fallbacks
//! - [`engine`]: the `handle_turn` entry point wiring it all together

pub mod engine;
pub mod extractor;
pub mod funnel;
pub mod planner;
pub mod router;
pub mod shaper;

pub use engine::{DialogueEngine, EngineOptions};
pub use extractor::EntityExtractor;
pub use funnel::{FunnelController, FunnelEvent, FunnelOutcome};
pub use planner::{PlanOutcome, RetrievalPlan, RetrievalPlanner};
pub use router::{IntentRouter, Route};

//! LLM integration
//!
//! A single-shot text-in / text-out client over a hosted chat model with
//! fixed decoding parameters, the prompt builder that renders retrieval
//! context into the reply template, and the parser that turns the model's
//! reply into the canonical response object.

pub mod client;
pub mod parse;
pub mod prompt;

use thiserror::Error;

pub use client::{HttpLlmClient, LlmClient, LlmSettings};
pub use parse::{parse_reply, ParseError};
pub use prompt::{PromptBuilder, PromptContext};

/// LLM call failures.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm unavailable: {0}")]
    Unavailable(String),

    #[error("llm call exceeded its deadline")]
    Timeout,

    #[error("llm returned an empty reply")]
    Empty,
}

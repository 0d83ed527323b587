//! Streaming answer synthesis
//!
//! Consumes a guarded retrieval result, assembles a citation-numbered
//! prompt and streams the LLM's answer as a lazy sequence of tagged
//! events. The guardrail decision is authoritative: a not-answerable
//! result is refused here, never synthesized.

pub mod adapter;
pub mod events;
pub mod llm;
pub mod prompt;

pub use adapter::{SynthesisAdapter, SynthesisConfig};
pub use events::{Citation, SynthesisEvent, SynthesisMetadata};
pub use llm::HttpLlm;
pub use prompt::{AssembledPrompt, PromptBuilder};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("Retrieval was not answerable; synthesis refused")]
    NotAnswerable,

    #[error("No results available for synthesis")]
    EmptyResults,

    #[error("LLM error: {0}")]
    Llm(String),
}

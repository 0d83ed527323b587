//! Synthesis event stream types
//!
//! The adapter emits a finite, lazy sequence of these tagged variants. No
//! transport is assumed; the HTTP layer maps them onto whatever framing it
//! uses, and cancelling the outer request cancels the stream.

use serde::{Deserialize, Serialize};

/// One numbered citation backing the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    /// 1-based citation number as referenced in the answer text.
    pub number: usize,
    pub id: String,
    pub doc_id: String,
    /// URL or file path when the chunk carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub snippet: String,
}

/// Generation summary attached near the end of the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisMetadata {
    pub model: String,
    pub tokens: u32,
    pub duration_ms: u64,
    pub results_used: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SynthesisEvent {
    /// Incremental answer text.
    Chunk { text: String },
    /// The citation list, emitted before the first chunk.
    Citations { citations: Vec<Citation> },
    /// Generation summary.
    Metadata { metadata: SynthesisMetadata },
    /// Full answer text once generation finished.
    FormattedAnswer { text: String },
    /// Terminal failure; `done` still follows.
    Error { message: String },
    /// End of stream.
    Done,
}

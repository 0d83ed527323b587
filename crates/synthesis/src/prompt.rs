//! Prompt assembly
//!
//! Builds the synthesis prompt from the ACL-safe result list: a system
//! instruction, numbered context blocks and the user question. Citation
//! numbering here is the single source of truth; the `[n]` markers the
//! model is told to use refer to the citation list emitted on the stream.

use rag_agent_core::RankedResult;

use crate::events::Citation;

const DEFAULT_SYSTEM: &str = "You are a careful assistant answering strictly from the provided \
context. Cite every claim with the bracketed source number, e.g. [1]. If the context does not \
answer the question, say so instead of guessing.";

/// Upper bound on packed context characters (~2k tokens at 4 chars/token).
const DEFAULT_MAX_CONTEXT_CHARS: usize = 8_000;

/// Snippet length carried into each citation.
const SNIPPET_CHARS: usize = 160;

#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub system: String,
    pub prompt: String,
    pub citations: Vec<Citation>,
}

pub struct PromptBuilder {
    system: String,
    max_context_chars: usize,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            system: DEFAULT_SYSTEM.to_string(),
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    pub fn with_max_context_chars(mut self, max: usize) -> Self {
        self.max_context_chars = max;
        self
    }

    /// Assemble the prompt. Results are packed in rank order until the
    /// context budget is exhausted; the citation list mirrors exactly the
    /// packed blocks.
    pub fn build(&self, query: &str, results: &[RankedResult]) -> AssembledPrompt {
        let mut context = String::new();
        let mut citations = Vec::new();

        for result in results {
            let number = citations.len() + 1;
            let source = result
                .payload
                .url
                .clone()
                .or_else(|| result.payload.filepath.clone());

            let header = match &source {
                Some(source) => format!("[{number}] ({source})\n"),
                None => format!("[{number}]\n"),
            };
            let block_len = header.len() + result.content.len() + 2;
            if !context.is_empty() && context.len() + block_len > self.max_context_chars {
                break;
            }

            context.push_str(&header);
            context.push_str(&result.content);
            context.push_str("\n\n");

            citations.push(Citation {
                number,
                id: result.id.clone(),
                doc_id: result.payload.doc_id.clone(),
                source,
                snippet: result.content.chars().take(SNIPPET_CHARS).collect(),
            });
        }

        let prompt = format!("Context:\n{context}Question: {query}\n\nAnswer:");

        AssembledPrompt {
            system: self.system.clone(),
            prompt,
            citations,
        }
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_agent_core::{ChunkPayload, SearchType};

    fn result(id: &str, content: &str, url: Option<&str>) -> RankedResult {
        let payload = ChunkPayload {
            tenant: "t1".to_string(),
            doc_id: format!("doc-{id}"),
            acl: vec!["public".to_string()],
            content: content.to_string(),
            url: url.map(|u| u.to_string()),
            ..Default::default()
        };
        RankedResult::from_search(id, payload, 1, 0.9, SearchType::Hybrid)
    }

    #[test]
    fn test_citations_numbered_in_rank_order() {
        let results = vec![
            result("a", "First chunk.", Some("https://kb/a")),
            result("b", "Second chunk.", None),
        ];
        let assembled = PromptBuilder::new().build("what is this?", &results);

        assert_eq!(assembled.citations.len(), 2);
        assert_eq!(assembled.citations[0].number, 1);
        assert_eq!(assembled.citations[0].source.as_deref(), Some("https://kb/a"));
        assert_eq!(assembled.citations[1].number, 2);
        assert!(assembled.prompt.contains("[1] (https://kb/a)"));
        assert!(assembled.prompt.contains("[2]\nSecond chunk."));
        assert!(assembled.prompt.ends_with("Answer:"));
    }

    #[test]
    fn test_context_budget_caps_citations() {
        let long = "x".repeat(300);
        let results: Vec<RankedResult> = (0..10)
            .map(|i| result(&format!("r{i}"), &long, None))
            .collect();

        let assembled = PromptBuilder::new()
            .with_max_context_chars(1000)
            .build("q", &results);

        assert!(assembled.citations.len() < 10);
        assert!(!assembled.citations.is_empty());
    }

    #[test]
    fn test_first_block_always_packed() {
        let huge = "y".repeat(50_000);
        let results = vec![result("a", &huge, None)];
        let assembled = PromptBuilder::new()
            .with_max_context_chars(1000)
            .build("q", &results);
        assert_eq!(assembled.citations.len(), 1);
    }

    #[test]
    fn test_snippet_capped() {
        let long = "z".repeat(500);
        let results = vec![result("a", &long, None)];
        let assembled = PromptBuilder::new().build("q", &results);
        assert!(assembled.citations[0].snippet.chars().count() <= 160);
    }
}

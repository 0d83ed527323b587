//! Streaming synthesis adapter
//!
//! Bridges a guarded retrieval result to the synthesis event stream:
//! citations first, then answer chunks as the LLM produces them, then the
//! generation metadata and the formatted answer, then `done`. Dropping the
//! stream aborts the underlying LLM task.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use rag_agent_config::LlmSettings;
use rag_agent_core::{FinishReason, LlmBackend, LlmRequest};
use rag_agent_retrieval::GuardedRetrievalResult;

use crate::events::{SynthesisEvent, SynthesisMetadata};
use crate::prompt::PromptBuilder;
use crate::SynthesisError;

#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}

impl From<&LlmSettings> for SynthesisConfig {
    fn from(settings: &LlmSettings) -> Self {
        Self {
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        }
    }
}

/// Aborts the spawned LLM task when the consumer drops the stream.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct SynthesisAdapter {
    llm: Arc<dyn LlmBackend>,
    prompt_builder: PromptBuilder,
    config: SynthesisConfig,
}

impl SynthesisAdapter {
    pub fn new(llm: Arc<dyn LlmBackend>, config: SynthesisConfig) -> Self {
        Self {
            llm,
            prompt_builder: PromptBuilder::new(),
            config,
        }
    }

    pub fn with_prompt_builder(mut self, builder: PromptBuilder) -> Self {
        self.prompt_builder = builder;
        self
    }

    /// Start synthesis for an answerable retrieval. Refuses when the
    /// guardrail said not answerable or the result list is missing; the
    /// decision is authoritative and never second-guessed here.
    pub fn stream(
        &self,
        query: &str,
        retrieval: &GuardedRetrievalResult,
    ) -> Result<Pin<Box<dyn Stream<Item = SynthesisEvent> + Send>>, SynthesisError> {
        if !retrieval.is_answerable {
            return Err(SynthesisError::NotAnswerable);
        }
        let results = retrieval
            .results
            .as_ref()
            .filter(|r| !r.is_empty())
            .ok_or(SynthesisError::EmptyResults)?;

        let assembled = self.prompt_builder.build(query, results);
        let results_used = assembled.citations.len();
        let citations = assembled.citations.clone();

        let request = LlmRequest {
            system: Some(assembled.system),
            prompt: assembled.prompt,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let llm = Arc::clone(&self.llm);
        let model = llm.model_name().to_string();

        let stream = async_stream::stream! {
            yield SynthesisEvent::Citations { citations };

            let (tx, mut rx) = mpsc::channel::<String>(100);
            let mut task = AbortOnDrop(tokio::spawn(async move {
                llm.generate_stream(&request, tx).await
            }));

            while let Some(delta) = rx.recv().await {
                yield SynthesisEvent::Chunk { text: delta };
            }

            match (&mut task.0).await {
                Ok(Ok(completion)) => {
                    if completion.finish_reason == FinishReason::Error {
                        yield SynthesisEvent::Error {
                            message: "generation ended with an error".to_string(),
                        };
                    } else {
                        yield SynthesisEvent::Metadata {
                            metadata: SynthesisMetadata {
                                model: model.clone(),
                                tokens: completion.tokens,
                                duration_ms: completion.total_time_ms,
                                results_used,
                            },
                        };
                        yield SynthesisEvent::FormattedAnswer {
                            text: completion.text,
                        };
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "LLM synthesis failed");
                    yield SynthesisEvent::Error { message: e.to_string() };
                }
                Err(e) => {
                    yield SynthesisEvent::Error {
                        message: format!("synthesis task failed: {e}"),
                    };
                }
            }

            yield SynthesisEvent::Done;
        };

        Ok(Box::pin(stream))
    }
}

//! HTTP LLM client
//!
//! Streams a chat completion over NDJSON lines from an Ollama-compatible
//! endpoint. Token deltas go out on the caller's channel as they arrive;
//! a closed channel means the request was cancelled and the stream is
//! abandoned.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use rag_agent_config::LlmSettings;
use rag_agent_core::{Error, FinishReason, LlmBackend, LlmCompletion, LlmRequest};

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: i32,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Deserialize, Default)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponseChunk {
    #[serde(default)]
    message: ChatResponseMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    eval_count: Option<u32>,
}

pub struct HttpLlm {
    client: Client,
    endpoint: String,
    model: String,
}

impl HttpLlm {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
        })
    }

    pub fn from_settings(settings: &LlmSettings) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
        })
    }

    fn chat_request(&self, request: &LlmRequest, stream: bool) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.prompt.clone(),
        });

        ChatRequest {
            model: self.model.clone(),
            messages,
            stream,
            options: ChatOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens as i32,
            },
        }
    }

    async fn send(&self, body: &ChatRequest) -> Result<reqwest::Response, Error> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.endpoint))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("LLM request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("LLM returned {status}: {body}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmBackend for HttpLlm {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmCompletion, Error> {
        let started = Instant::now();
        let response = self.send(&self.chat_request(request, false)).await?;

        let parsed: ChatResponseChunk = response
            .json()
            .await
            .map_err(|e| Error::Llm(format!("malformed LLM response: {e}")))?;

        Ok(LlmCompletion {
            text: parsed.message.content,
            tokens: parsed.eval_count.unwrap_or(0),
            total_time_ms: started.elapsed().as_millis() as u64,
            finish_reason: if parsed.done {
                FinishReason::Stop
            } else {
                FinishReason::Length
            },
        })
    }

    async fn generate_stream(
        &self,
        request: &LlmRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<LlmCompletion, Error> {
        let started = Instant::now();
        let response = self.send(&self.chat_request(request, true)).await?;

        let mut full_text = String::new();
        let mut tokens: u32 = 0;
        let mut buffer = String::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Llm(format!("LLM stream error: {e}")))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // NDJSON: consume complete lines, keep the partial tail.
            while let Some(newline) = buffer.find('\n') {
                let line: String = buffer.drain(..=newline).collect();
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let parsed: ChatResponseChunk = match serde_json::from_str(line) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        tracing::debug!(error = %e, "Skipping unparseable stream line");
                        continue;
                    }
                };

                let delta = parsed.message.content;
                if !delta.is_empty() {
                    full_text.push_str(&delta);
                    tokens += 1;
                    if tx.send(delta).await.is_err() {
                        return Ok(LlmCompletion {
                            text: full_text,
                            tokens,
                            total_time_ms: started.elapsed().as_millis() as u64,
                            finish_reason: FinishReason::Cancelled,
                        });
                    }
                }

                if parsed.done {
                    if let Some(count) = parsed.eval_count {
                        tokens = count;
                    }
                    return Ok(LlmCompletion {
                        text: full_text,
                        tokens,
                        total_time_ms: started.elapsed().as_millis() as u64,
                        finish_reason: FinishReason::Stop,
                    });
                }
            }
        }

        Ok(LlmCompletion {
            text: full_text,
            tokens,
            total_time_ms: started.elapsed().as_millis() as u64,
            finish_reason: FinishReason::Stop,
        })
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.endpoint))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_shape() {
        let llm = HttpLlm::new("http://localhost:11434", "llama3.1:8b").unwrap();
        let request = LlmRequest {
            system: Some("be brief".to_string()),
            prompt: "hi".to_string(),
            max_tokens: 128,
            temperature: 0.2,
        };
        let chat = llm.chat_request(&request, true);
        assert!(chat.stream);
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[0].role, "system");
        assert_eq!(chat.options.num_predict, 128);
    }

    #[test]
    fn test_stream_chunk_parsing() {
        let line = r#"{"message":{"content":"Hel"},"done":false}"#;
        let parsed: ChatResponseChunk = serde_json::from_str(line).unwrap();
        assert_eq!(parsed.message.content, "Hel");
        assert!(!parsed.done);

        let final_line = r#"{"message":{"content":""},"done":true,"eval_count":42}"#;
        let parsed: ChatResponseChunk = serde_json::from_str(final_line).unwrap();
        assert!(parsed.done);
        assert_eq!(parsed.eval_count, Some(42));
    }
}

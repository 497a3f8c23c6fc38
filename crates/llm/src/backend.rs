//! OpenAI-compatible streaming backend
//!
//! Speaks the chat-completions SSE protocol: one `data: {json}` line per
//! delta, terminated by `data: [DONE]`. Tool-call arguments arrive as
//! fragments attached to an index; they are forwarded verbatim as
//! `LlmEvent::ToolCallDelta` so the consumer owns accumulation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use voxchat_core::{EventStream, LanguageModel, LlmEvent, Message, Role, ToolDefinition};

use crate::LlmError;

/// Backend options
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Abort when no stream event arrives for this long
    pub inactivity_timeout: Duration,
    /// Connection attempts before the stream yields an error
    pub max_retries: u32,
    /// Initial backoff, doubled per retry
    pub initial_backoff: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "anthropic/claude-3-5-nano".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            inactivity_timeout: Duration::from_secs(60),
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

impl From<&voxchat_config::LlmConfig> for BackendConfig {
    fn from(cfg: &voxchat_config::LlmConfig) -> Self {
        Self {
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            base_url: cfg.base_url.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            inactivity_timeout: Duration::from_secs(cfg.inactivity_timeout_s),
            ..Default::default()
        }
    }
}

/// OpenRouter / OpenAI-compatible backend
#[derive(Clone)]
pub struct OpenRouterBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl OpenRouterBackend {
    pub fn new(config: BackendConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            // Connect-phase guard; streaming reads are bounded per event.
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, messages: &[Message], tools: &[ToolDefinition]) -> serde_json::Value {
        let mut body = json!({
            "model": self.config.model,
            "messages": messages.iter().map(wire_message).collect::<Vec<_>>(),
            "stream": true,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });
        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
        }
        body
    }

    /// Open the SSE response, retrying connection-level failures.
    async fn connect(&self, body: &serde_json::Value) -> Result<reqwest::Response, LlmError> {
        let mut backoff = self.config.initial_backoff;
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(
                    attempt,
                    max = self.config.max_retries,
                    "LLM connect failed, retrying in {:?}",
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            let result = self
                .client
                .post(self.chat_url())
                .bearer_auth(&self.config.api_key)
                .json(body)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let detail = response.text().await.unwrap_or_default();
                    // 5xx is transient; 4xx will not improve with retries.
                    if status.is_server_error() {
                        last_error = Some(LlmError::Network(format!("{status}: {detail}")));
                    } else {
                        return Err(LlmError::Api(format!("{status}: {detail}")));
                    }
                }
                Err(e) => last_error = Some(LlmError::Network(e.to_string())),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Network("max retries exceeded".to_string())))
    }
}

#[async_trait]
impl LanguageModel for OpenRouterBackend {
    fn stream(&self, messages: Vec<Message>, tools: Vec<ToolDefinition>) -> EventStream {
        use futures::StreamExt;

        let backend = self.clone();
        let body = backend.request_body(&messages, &tools);
        let inactivity = backend.config.inactivity_timeout;

        Box::pin(async_stream::stream! {
            let response = match backend.connect(&body).await {
                Ok(r) => r,
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            };

            let mut bytes = response.bytes_stream();
            // SSE lines may split across network reads.
            let mut buffer = String::new();

            loop {
                let piece = match tokio::time::timeout(inactivity, bytes.next()).await {
                    Err(_) => {
                        yield Err(LlmError::Inactivity(inactivity.as_secs()).into());
                        return;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        yield Err(LlmError::Network(e.to_string()).into());
                        return;
                    }
                    Ok(Some(Ok(piece))) => piece,
                };

                buffer.push_str(&String::from_utf8_lossy(&piece));

                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);

                    for event in parse_sse_line(&line) {
                        let done = event.is_done();
                        yield Ok(event);
                        if done {
                            return;
                        }
                    }
                }
            }

            // Stream ended without a [DONE] marker; close the event stream
            // cleanly anyway so the consumer is never left hanging.
            yield Ok(LlmEvent::Done);
        })
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/models", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Serialize one core message into the wire shape.
fn wire_message(message: &Message) -> serde_json::Value {
    let mut value = json!({
        "role": message.role.as_str(),
        "content": message.content,
    });
    if let Some(id) = &message.tool_call_id {
        value["tool_call_id"] = json!(id);
    }
    if message.role == Role::Assistant {
        if let Some(calls) = &message.tool_calls {
            value["tool_calls"] = calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": { "name": c.name, "arguments": c.arguments },
                    })
                })
                .collect();
        }
    }
    value
}

// Wire shapes of a streamed chunk.

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    /// Reasoning stream, when the model exposes one
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallChunk>,
}

#[derive(Debug, Deserialize)]
struct ToolCallChunk {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: FunctionChunk,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionChunk {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Parse one SSE line into zero or more events.
fn parse_sse_line(line: &str) -> Vec<LlmEvent> {
    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
        // Comments, event names, blank keep-alives.
        return Vec::new();
    };

    if data == "[DONE]" {
        return vec![LlmEvent::Done];
    }

    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable stream chunk dropped");
            return Vec::new();
        }
    };

    let mut events = Vec::new();
    for choice in chunk.choices {
        if let Some(reasoning) = choice.delta.reasoning {
            if !reasoning.is_empty() {
                events.push(LlmEvent::ThoughtDelta(reasoning));
            }
        }
        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                events.push(LlmEvent::TextDelta(content));
            }
        }
        for call in choice.delta.tool_calls {
            events.push(LlmEvent::ToolCallDelta {
                index: call.index,
                id: call.id,
                name: call.function.name,
                args_chunk: call.function.arguments.unwrap_or_default(),
            });
        }
    }
    events
}

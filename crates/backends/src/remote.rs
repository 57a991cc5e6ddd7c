//! Remote service backend.
//!
//! Speaks the OpenAI-compatible `/v1/chat/completions` protocol, which
//! covers the large majority of hosted model services (OpenAI, OpenRouter,
//! Together, Fireworks, and any compatible proxy).
//!
//! Supports:
//! - Complete turns (non-streaming) and streaming SSE fragments
//! - Native tool / function calling
//! - Reasoning mode (request-level effort hint, separate reasoning channel)
//! - Model listing and health checks

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::StreamExt;
use quill_core::backend::{BackendRequest, ModelTurn, TurnFragment, Usage};
use quill_core::error::BackendError;
use quill_core::turn::{Role, Turn, TurnToolCall};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// A remote OpenAI-compatible model backend.
pub struct RemoteBackend {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl RemoteBackend {
    /// Create a new remote backend.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenRouter backend (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("remote", "https://openrouter.ai/api/v1", api_key)
    }

    /// Create an OpenAI backend (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("remote", "https://api.openai.com/v1", api_key)
    }

    /// Convert transcript turns to the wire message format.
    fn to_api_messages(turns: &[Turn]) -> Vec<ApiMessage> {
        turns
            .iter()
            .map(|t| ApiMessage {
                role: match t.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Tool => "tool".into(),
                },
                content: Some(t.content.clone()),
                reasoning: None,
                tool_calls: if t.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        t.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: t.call_id.clone(),
            })
            .collect()
    }

    /// Convert tool definitions to the wire format.
    fn to_api_tools(tools: &[quill_core::tool::ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn build_body(&self, request: &BackendRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.turns),
            "temperature": request.temperature,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        if request.flags.reasoning {
            body["reasoning"] = serde_json::json!({ "effort": "high" });
        }

        body
    }

    fn map_transport_error(e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(e.to_string())
        } else {
            BackendError::Unavailable(e.to_string())
        }
    }

    fn status_error(status: u16, body: String) -> BackendError {
        match status {
            429 => BackendError::RateLimited {
                retry_after_secs: 5,
            },
            401 | 403 => BackendError::AuthFailed(
                "Invalid API key or insufficient permissions".into(),
            ),
            _ => {
                warn!(status, body = %body, "Remote backend returned error");
                BackendError::Api {
                    status_code: status,
                    message: body,
                }
            }
        }
    }
}

#[async_trait]
impl quill_core::ModelBackend for RemoteBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(
        &self,
        request: BackendRequest,
    ) -> std::result::Result<ModelTurn, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&request, false);

        debug!(backend = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, error_body));
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| BackendError::Api {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Api {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let tool_calls: Vec<TurnToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| TurnToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ModelTurn {
            text: choice.message.content.unwrap_or_default(),
            reasoning: choice.message.reasoning.filter(|r| !r.is_empty()),
            tool_calls,
            usage,
            model: api_response.model,
        })
    }

    async fn stream(
        &self,
        request: BackendRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<TurnFragment, BackendError>>,
        BackendError,
    > {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&request, true);

        debug!(backend = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, error_body));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let backend_name = self.name.clone();

        // Spawn a task to read the SSE byte stream and parse fragments
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            // Tool call deltas accumulate keyed by index; BTreeMap keeps
            // emission order stable.
            let mut accumulators: BTreeMap<u32, ToolCallAccumulator> = BTreeMap::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(BackendError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete lines
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    // Skip empty lines and SSE comments
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();

                    // "[DONE]" signals end of stream
                    if data == "[DONE]" {
                        let _ = tx
                            .send(Ok(TurnFragment {
                                text: None,
                                reasoning: None,
                                tool_calls: drain_accumulators(&mut accumulators),
                                done: true,
                                usage: None,
                            }))
                            .await;
                        return;
                    }

                    match serde_json::from_str::<StreamResponse>(data) {
                        Ok(stream_resp) => {
                            if let Some(choice) = stream_resp.choices.first() {
                                let delta = &choice.delta;

                                if let Some(ref tc_deltas) = delta.tool_calls {
                                    for tc_delta in tc_deltas {
                                        let acc = accumulators
                                            .entry(tc_delta.index)
                                            .or_default();
                                        if let Some(ref id) = tc_delta.id {
                                            acc.id = id.clone();
                                        }
                                        if let Some(ref func) = tc_delta.function {
                                            if let Some(ref name) = func.name {
                                                acc.name = name.clone();
                                            }
                                            if let Some(ref args) = func.arguments {
                                                acc.arguments.push_str(args);
                                            }
                                        }
                                    }
                                }

                                let has_content =
                                    delta.content.as_ref().is_some_and(|c| !c.is_empty());
                                let has_reasoning =
                                    delta.reasoning.as_ref().is_some_and(|r| !r.is_empty());

                                if has_content || has_reasoning {
                                    let fragment = TurnFragment {
                                        text: delta.content.clone(),
                                        reasoning: delta.reasoning.clone(),
                                        tool_calls: Vec::new(),
                                        done: false,
                                        usage: None,
                                    };

                                    if tx.send(Ok(fragment)).await.is_err() {
                                        return; // receiver dropped
                                    }
                                }
                            }

                            // Usage arrives on the final chunk (stream_options)
                            if let Some(usage) = stream_resp.usage {
                                let fragment = TurnFragment {
                                    text: None,
                                    reasoning: None,
                                    tool_calls: drain_accumulators(&mut accumulators),
                                    done: true,
                                    usage: Some(Usage {
                                        prompt_tokens: usage.prompt_tokens,
                                        completion_tokens: usage.completion_tokens,
                                        total_tokens: usage.total_tokens,
                                    }),
                                };

                                let _ = tx.send(Ok(fragment)).await;
                                return;
                            }
                        }
                        Err(e) => {
                            trace!(
                                backend = %backend_name,
                                data = %data,
                                error = %e,
                                "Ignoring unparseable SSE chunk"
                            );
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx
                .send(Ok(TurnFragment {
                    text: None,
                    reasoning: None,
                    tool_calls: drain_accumulators(&mut accumulators),
                    done: true,
                    usage: None,
                }))
                .await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, BackendError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        let models = body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(models)
    }

    async fn health_check(&self) -> std::result::Result<bool, BackendError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        Ok(response.status().is_success())
    }
}

fn drain_accumulators(accumulators: &mut BTreeMap<u32, ToolCallAccumulator>) -> Vec<TurnToolCall> {
    std::mem::take(accumulators)
        .into_values()
        .map(|acc| acc.into_tool_call())
        .collect()
}

#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn into_tool_call(self) -> TurnToolCall {
        TurnToolCall {
            id: if self.id.is_empty() {
                uuid::Uuid::new_v4().to_string()
            } else {
                self.id
            },
            name: self.name,
            arguments: self.arguments,
        }
    }
}

// --- Wire types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// --- Streaming wire types ---

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::backend::ModeFlags;
    use quill_core::tool::ToolDefinition;

    fn test_request(reasoning: bool) -> BackendRequest {
        BackendRequest {
            model: "test-model".into(),
            turns: vec![Turn::user("hello")],
            temperature: 0.7,
            max_tokens: Some(1024),
            tools: vec![ToolDefinition {
                name: "run_shell".into(),
                description: "Execute a shell command".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "command": { "type": "string" } },
                    "required": ["command"]
                }),
            }],
            flags: ModeFlags {
                reasoning,
                ..Default::default()
            },
        }
    }

    #[test]
    fn body_includes_tools_and_max_tokens() {
        let backend = RemoteBackend::new("remote", "https://example.com/v1", "key");
        let body = backend.build_body(&test_request(false), false);

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["tools"][0]["function"]["name"], "run_shell");
        assert_eq!(body["stream"], false);
        assert!(body.get("reasoning").is_none());
    }

    #[test]
    fn reasoning_flag_sets_effort() {
        let backend = RemoteBackend::new("remote", "https://example.com/v1", "key");
        let body = backend.build_body(&test_request(true), false);
        assert_eq!(body["reasoning"]["effort"], "high");
    }

    #[test]
    fn streaming_body_requests_usage() {
        let backend = RemoteBackend::new("remote", "https://example.com/v1", "key");
        let body = backend.build_body(&test_request(false), true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
    }

    #[test]
    fn tool_result_turns_carry_call_id() {
        let turns = vec![Turn::tool_result("call_7", "output text")];
        let messages = RemoteBackend::to_api_messages(&turns);
        assert_eq!(messages[0].role, "tool");
        assert_eq!(messages[0].tool_call_id.as_deref(), Some("call_7"));
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            RemoteBackend::status_error(429, String::new()),
            BackendError::RateLimited { .. }
        ));
        assert!(matches!(
            RemoteBackend::status_error(401, String::new()),
            BackendError::AuthFailed(_)
        ));
        assert!(matches!(
            RemoteBackend::status_error(500, "boom".into()),
            BackendError::Api {
                status_code: 500,
                ..
            }
        ));
    }

    #[test]
    fn accumulator_generates_id_when_missing() {
        let acc = ToolCallAccumulator {
            id: String::new(),
            name: "read_file".into(),
            arguments: r#"{"path":"x"}"#.into(),
        };
        let call = acc.into_tool_call();
        assert!(!call.id.is_empty());
        assert_eq!(call.name, "read_file");
    }

    #[test]
    fn stream_delta_parses_reasoning_channel() {
        let data = r#"{"choices":[{"delta":{"reasoning":"thinking...","content":null}}]}"#;
        let resp: StreamResponse = serde_json::from_str(data).unwrap();
        assert_eq!(
            resp.choices[0].delta.reasoning.as_deref(),
            Some("thinking...")
        );
    }
}

//! Local inference backend.
//!
//! Talks to a locally reachable inference service speaking the Ollama chat
//! API (`/api/chat`, NDJSON streaming). No API key, no network egress; the
//! failure modes are the service not running (connection refused) and the
//! requested model not being loaded.

use async_trait::async_trait;
use futures::StreamExt;
use quill_core::backend::{BackendRequest, ModelTurn, TurnFragment, Usage};
use quill_core::error::BackendError;
use quill_core::turn::{Role, Turn, TurnToolCall};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

pub const DEFAULT_LOCAL_URL: &str = "http://localhost:11434";

/// A backend for a local inference service (Ollama-compatible).
pub struct LocalBackend {
    base_url: String,
    client: reqwest::Client,
}

impl LocalBackend {
    /// Create a new local backend. `base_url` defaults to the standard
    /// Ollama address when `None`.
    pub fn new(base_url: Option<&str>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(180))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_LOCAL_URL)
                .trim_end_matches('/')
                .to_string(),
            client,
        }
    }

    fn to_api_messages(turns: &[Turn]) -> Vec<ChatMessage> {
        turns
            .iter()
            .map(|t| ChatMessage {
                role: match t.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Tool => "tool".into(),
                },
                content: t.content.clone(),
                thinking: None,
                tool_calls: None,
            })
            .collect()
    }

    fn build_body(request: &BackendRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.turns),
            "stream": stream,
            "options": { "temperature": request.temperature },
        });

        if let Some(max_tokens) = request.max_tokens {
            body["options"]["num_predict"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }

        if request.flags.reasoning {
            body["think"] = serde_json::json!(true);
        }

        body
    }

    fn map_transport_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(e.to_string())
        } else if e.is_connect() {
            BackendError::Unavailable(format!(
                "local inference service not running at {} ({e})",
                self.base_url
            ))
        } else {
            BackendError::Unavailable(e.to_string())
        }
    }

    async fn status_error(&self, status: u16, response: reqwest::Response) -> BackendError {
        let body = response.text().await.unwrap_or_default();
        // Ollama answers 404 with an "error" body when the model is missing
        if status == 404 {
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["error"].as_str().map(String::from))
                .unwrap_or(body);
            return BackendError::ModelNotLoaded(message);
        }
        BackendError::Api {
            status_code: status,
            message: body,
        }
    }

    fn convert_tool_calls(calls: Vec<ApiToolCall>) -> Vec<TurnToolCall> {
        calls
            .into_iter()
            .map(|tc| TurnToolCall {
                id: uuid::Uuid::new_v4().to_string(),
                name: tc.function.name,
                // The local service emits arguments as a JSON object
                arguments: tc.function.arguments.to_string(),
            })
            .collect()
    }
}

#[async_trait]
impl quill_core::ModelBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn send(
        &self,
        request: BackendRequest,
    ) -> std::result::Result<ModelTurn, BackendError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::build_body(&request, false);

        debug!(model = %request.model, "Sending local completion request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(self.status_error(status, response).await);
        }

        let api_response: ChatResponse =
            response.json().await.map_err(|e| BackendError::Api {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let usage = api_response.usage();
        Ok(ModelTurn {
            text: api_response.message.content,
            reasoning: api_response.message.thinking.filter(|t| !t.is_empty()),
            tool_calls: Self::convert_tool_calls(
                api_response.message.tool_calls.unwrap_or_default(),
            ),
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
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::build_body(&request, true);

        debug!(model = %request.model, "Sending local streaming request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(self.status_error(status, response).await);
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // The local service streams NDJSON: one JSON object per line,
        // terminated by an object with "done": true.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut tool_calls: Vec<TurnToolCall> = Vec::new();

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

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() {
                        continue;
                    }

                    match serde_json::from_str::<ChatResponse>(&line) {
                        Ok(resp) => {
                            if let Some(calls) = resp.message.tool_calls.clone() {
                                tool_calls.extend(LocalBackend::convert_tool_calls(calls));
                            }

                            if resp.done {
                                let usage = resp.usage();
                                let _ = tx
                                    .send(Ok(TurnFragment {
                                        text: None,
                                        reasoning: None,
                                        tool_calls: std::mem::take(&mut tool_calls),
                                        done: true,
                                        usage,
                                    }))
                                    .await;
                                return;
                            }

                            let has_content = !resp.message.content.is_empty();
                            let has_thinking =
                                resp.message.thinking.as_ref().is_some_and(|t| !t.is_empty());
                            if has_content || has_thinking {
                                let fragment = TurnFragment {
                                    text: Some(resp.message.content),
                                    reasoning: resp.message.thinking,
                                    tool_calls: Vec::new(),
                                    done: false,
                                    usage: None,
                                };
                                if tx.send(Ok(fragment)).await.is_err() {
                                    return; // receiver dropped
                                }
                            }
                        }
                        Err(e) => {
                            trace!(line = %line, error = %e, "Ignoring unparseable stream line");
                        }
                    }
                }
            }

            // Stream ended without a done marker
            let _ = tx
                .send(Ok(TurnFragment {
                    text: None,
                    reasoning: None,
                    tool_calls: std::mem::take(&mut tool_calls),
                    done: true,
                    usage: None,
                }))
                .await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, BackendError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        let models = body["models"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["name"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(models)
    }

    async fn health_check(&self) -> std::result::Result<bool, BackendError> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) if e.is_connect() => Ok(false),
            Err(e) => Err(self.map_transport_error(e)),
        }
    }
}

// --- Wire types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiToolCall {
    function: ApiToolFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    message: ChatMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl ChatResponse {
    fn usage(&self) -> Option<Usage> {
        match (self.prompt_eval_count, self.eval_count) {
            (None, None) => None,
            (prompt, completion) => {
                let prompt = prompt.unwrap_or(0);
                let completion = completion.unwrap_or(0);
                Some(Usage {
                    prompt_tokens: prompt,
                    completion_tokens: completion,
                    total_tokens: prompt + completion,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::backend::ModeFlags;

    fn test_request(reasoning: bool) -> BackendRequest {
        BackendRequest {
            model: "llama3".into(),
            turns: vec![Turn::system("be helpful"), Turn::user("hello")],
            temperature: 0.7,
            max_tokens: Some(512),
            tools: vec![],
            flags: ModeFlags {
                reasoning,
                ..Default::default()
            },
        }
    }

    #[test]
    fn body_shape() {
        let body = LocalBackend::build_body(&test_request(false), false);
        assert_eq!(body["model"], "llama3");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["options"]["temperature"], 0.7);
        assert_eq!(body["options"]["num_predict"], 512);
        assert!(body.get("think").is_none());
    }

    #[test]
    fn reasoning_flag_sets_think() {
        let body = LocalBackend::build_body(&test_request(true), false);
        assert_eq!(body["think"], true);
    }

    #[test]
    fn response_parsing_with_tool_call() {
        let data = r#"{
            "model": "llama3",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "read_file", "arguments": {"path": "a.txt"}}}
                ]
            },
            "done": true,
            "prompt_eval_count": 12,
            "eval_count": 7
        }"#;
        let resp: ChatResponse = serde_json::from_str(data).unwrap();
        assert!(resp.done);
        let usage = resp.usage().unwrap();
        assert_eq!(usage.total_tokens, 19);

        let calls = LocalBackend::convert_tool_calls(resp.message.tool_calls.unwrap());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
        // Object arguments are re-serialized to a JSON string
        assert!(calls[0].arguments.contains("a.txt"));
        assert!(!calls[0].id.is_empty());
    }

    #[test]
    fn default_url_trims_trailing_slash() {
        let backend = LocalBackend::new(Some("http://127.0.0.1:11434/"));
        assert_eq!(backend.base_url, "http://127.0.0.1:11434");
        let default = LocalBackend::new(None);
        assert_eq!(default.base_url, DEFAULT_LOCAL_URL);
    }

    #[test]
    fn usage_absent_when_counts_missing() {
        let data = r#"{"message": {"role": "assistant", "content": "hi"}, "done": false}"#;
        let resp: ChatResponse = serde_json::from_str(data).unwrap();
        assert!(resp.usage().is_none());
    }
}

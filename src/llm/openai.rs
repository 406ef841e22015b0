//! `OpenAI`-compatible chat completions provider (Groq, `OpenAI`, gateways)

use super::types::{
    ContentBlock, FragmentSender, LlmMessage, LlmRequest, LlmResponse, MessageRole,
    ResponseFormat, Usage,
};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
/// Longest silence tolerated between two streamed chunks
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Chat completions client for any endpoint speaking the `OpenAI` wire format
pub struct OpenAiCompatService {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl OpenAiCompatService {
    /// `base_url` is the API root, e.g. `https://api.groq.com/openai/v1`
    pub fn new(api_key: String, base_url: &str, model: impl Into<String>) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
        })
    }

    fn translate_request(&self, request: &LlmRequest, stream: bool) -> OpenAIRequest {
        let mut messages = Vec::new();

        if !request.system.is_empty() {
            let system_text = request
                .system
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");

            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: Some(system_text),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for msg in &request.messages {
            messages.extend(translate_message(msg));
        }

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| OpenAITool {
                        r#type: "function".to_string(),
                        function: OpenAIFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                        },
                    })
                    .collect(),
            )
        };

        let response_format = match request.response_format {
            ResponseFormat::Text => None,
            ResponseFormat::JsonObject => Some(OpenAIResponseFormat {
                r#type: "json_object".to_string(),
            }),
        };

        OpenAIRequest {
            model: self.model.clone(),
            messages,
            tools,
            max_tokens: request.max_tokens,
            response_format,
            stream,
        }
    }

    async fn send(&self, body: &OpenAIRequest) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;
        let message = serde_json::from_str::<OpenAIErrorResponse>(&body)
            .map_or(body, |resp| resp.error.message);
        Err(LlmError::from_status(status.as_u16(), &message))
    }

    async fn complete_plain(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let response = self.send(&self.translate_request(request, false)).await?;
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        let openai_response: OpenAIResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        normalize_response(openai_response)
    }

    async fn complete_streaming(
        &self,
        request: &LlmRequest,
        fragments: &FragmentSender,
    ) -> Result<LlmResponse, LlmError> {
        let response = self.send(&self.translate_request(request, true)).await?;
        let mut stream = response.bytes_stream().eventsource();
        let mut acc = StreamAccumulator::default();

        loop {
            let event = match tokio::time::timeout(STREAM_IDLE_TIMEOUT, stream.next()).await {
                Ok(Some(Ok(event))) => event,
                Ok(Some(Err(e))) => {
                    return Err(LlmError::network(format!("SSE stream error: {e}")));
                }
                Ok(None) => break,
                Err(_) => {
                    return Err(LlmError::network(format!(
                        "SSE stream idle for {}s",
                        STREAM_IDLE_TIMEOUT.as_secs()
                    )));
                }
            };

            if event.data == "[DONE]" {
                break;
            }

            let chunk: OpenAIChunk = serde_json::from_str(&event.data).map_err(|e| {
                LlmError::unknown(format!("SSE parsing error: {e}, data: {}", event.data))
            })?;
            if let Some(error) = chunk.error {
                return Err(LlmError::server_error(error.message));
            }

            if let Some(delta) = acc.push(chunk) {
                // The receiver going away only means nobody is listening.
                let _ = fragments.send(delta);
            }
        }

        acc.finish()
    }
}

#[async_trait]
impl LlmService for OpenAiCompatService {
    async fn complete(
        &self,
        request: &LlmRequest,
        fragments: Option<&FragmentSender>,
    ) -> Result<LlmResponse, LlmError> {
        match fragments {
            Some(tx) => self.complete_streaming(request, tx).await,
            None => self.complete_plain(request).await,
        }
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

fn map_transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::network(format!("Request timeout: {e}"))
    } else if e.is_connect() {
        LlmError::network(format!("Connection failed: {e}"))
    } else {
        LlmError::unknown(format!("Request failed: {e}"))
    }
}

/// Translate an LLM message to `OpenAI` format.
/// Returns a Vec because tool results need separate messages with role "tool".
pub(super) fn translate_message(msg: &LlmMessage) -> Vec<OpenAIMessage> {
    let role = match msg.role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    };

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut tool_results = Vec::new();

    for block in &msg.content {
        match block {
            ContentBlock::Text { text } => text_parts.push(text.clone()),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(OpenAIToolCall {
                    id: id.clone(),
                    r#type: "function".to_string(),
                    function: OpenAIFunctionCall {
                        name: name.clone(),
                        arguments: serde_json::to_string(input)
                            .unwrap_or_else(|_| "{}".to_string()),
                    },
                });
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => tool_results.push((tool_use_id.clone(), content.clone(), *is_error)),
        }
    }

    let mut messages = Vec::new();

    if !text_parts.is_empty() || !tool_calls.is_empty() {
        messages.push(OpenAIMessage {
            role: role.to_string(),
            content: (!text_parts.is_empty()).then(|| text_parts.join("\n")),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_call_id: None,
        });
    }

    for (tool_use_id, content, is_error) in tool_results {
        messages.push(OpenAIMessage {
            role: "tool".to_string(),
            content: Some(if is_error {
                format!("Error: {content}")
            } else {
                content
            }),
            tool_calls: None,
            tool_call_id: Some(tool_use_id),
        });
    }

    if messages.is_empty() {
        messages.push(OpenAIMessage {
            role: role.to_string(),
            content: Some(String::new()),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    messages
}

fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, arguments = %raw, "Failed to parse tool call arguments");
        serde_json::json!({})
    })
}

fn normalize_response(resp: OpenAIResponse) -> Result<LlmResponse, LlmError> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::unknown("No choices in response"))?;

    let mut content = Vec::new();

    if let Some(text) = choice.message.content {
        if !text.is_empty() {
            content.push(ContentBlock::Text { text });
        }
    }

    for tc in choice.message.tool_calls.unwrap_or_default() {
        if tc.function.name.is_empty() {
            continue;
        }
        content.push(ContentBlock::ToolUse {
            input: parse_arguments(&tc.function.arguments),
            id: tc.id,
            name: tc.function.name,
        });
    }

    Ok(LlmResponse {
        content,
        end_turn: choice.finish_reason.as_deref() == Some("stop"),
        usage: resp.usage.map(Usage::from).unwrap_or_default(),
    })
}

// ============================================================================
// Streaming assembly
// ============================================================================

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds streamed chunks into a complete response
#[derive(Debug, Default)]
pub(super) struct StreamAccumulator {
    text: String,
    tool_calls: BTreeMap<u32, PartialToolCall>,
    finish_reason: Option<String>,
    usage: Usage,
    saw_choice: bool,
}

impl StreamAccumulator {
    /// Absorb one chunk, returning any new user-visible text
    pub(super) fn push(&mut self, chunk: OpenAIChunk) -> Option<String> {
        if let Some(usage) = chunk.usage.or_else(|| chunk.x_groq.and_then(|x| x.usage)) {
            self.usage = usage.into();
        }

        let choice = chunk.choices.into_iter().next()?;
        self.saw_choice = true;
        if choice.finish_reason.is_some() {
            self.finish_reason = choice.finish_reason;
        }

        for tc in choice.delta.tool_calls.unwrap_or_default() {
            let slot = self.tool_calls.entry(tc.index).or_default();
            if let Some(id) = tc.id {
                slot.id = id;
            }
            if let Some(function) = tc.function {
                if let Some(name) = function.name {
                    slot.name.push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    slot.arguments.push_str(&arguments);
                }
            }
        }

        let text = choice.delta.content.filter(|t| !t.is_empty())?;
        self.text.push_str(&text);
        Some(text)
    }

    pub(super) fn finish(self) -> Result<LlmResponse, LlmError> {
        if !self.saw_choice {
            return Err(LlmError::unknown("Stream ended without any choices"));
        }

        let mut content = Vec::new();
        if !self.text.is_empty() {
            content.push(ContentBlock::Text { text: self.text });
        }
        for call in self.tool_calls.into_values() {
            if call.name.is_empty() {
                continue;
            }
            content.push(ContentBlock::ToolUse {
                input: parse_arguments(&call.arguments),
                id: call.id,
                name: call.name,
            });
        }

        Ok(LlmResponse {
            content,
            end_turn: self.finish_reason.as_deref() == Some("stop"),
            usage: self.usage,
        })
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<OpenAIResponseFormat>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct OpenAIMessage {
    pub(super) role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIToolCall {
    id: String,
    r#type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<OpenAIUsage> for Usage {
    fn from(u: OpenAIUsage) -> Self {
        Usage {
            input_tokens: u64::from(u.prompt_tokens),
            output_tokens: u64::from(u.completion_tokens),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct OpenAIChunk {
    #[serde(default)]
    choices: Vec<OpenAIChunkChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
    /// Groq reports usage here on the final chunk
    #[serde(default)]
    x_groq: Option<GroqExtra>,
    #[serde(default)]
    error: Option<OpenAIError>,
}

#[derive(Debug, Deserialize)]
struct GroqExtra {
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChunkChoice {
    #[serde(default)]
    delta: OpenAIDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<OpenAIFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{SystemContent, ToolDefinition};
    use serde_json::json;

    fn service() -> OpenAiCompatService {
        OpenAiCompatService::new(
            "test-key".to_string(),
            "https://api.groq.com/openai/v1/",
            "llama-3.3-70b-versatile",
        )
        .unwrap()
    }

    fn chunk(raw: serde_json::Value) -> OpenAIChunk {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        assert_eq!(
            service().endpoint,
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_translate_request_json_mode_without_tools() {
        let request = LlmRequest {
            system: vec![SystemContent::new("route it")],
            messages: vec![LlmMessage {
                role: MessageRole::User,
                content: vec![ContentBlock::text("hi")],
            }],
            tools: vec![],
            max_tokens: None,
            response_format: ResponseFormat::JsonObject,
        };
        let body = serde_json::to_value(service().translate_request(&request, false)).unwrap();
        assert_eq!(body["response_format"], json!({"type": "json_object"}));
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!(body.get("tools").is_none());
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_translate_request_binds_tools() {
        let request = LlmRequest {
            system: vec![],
            messages: vec![],
            tools: vec![ToolDefinition {
                name: "calculator".to_string(),
                description: "math".to_string(),
                input_schema: json!({"type": "object"}),
            }],
            max_tokens: Some(512),
            response_format: ResponseFormat::Text,
        };
        let body = serde_json::to_value(service().translate_request(&request, true)).unwrap();
        assert_eq!(body["tools"][0]["function"]["name"], "calculator");
        assert_eq!(body["max_tokens"], 512);
        assert!(body.get("response_format").is_none());
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_translate_tool_result_becomes_tool_role() {
        let msg = LlmMessage {
            role: MessageRole::User,
            content: vec![
                ContentBlock::tool_result("call_1", "2518731", false),
                ContentBlock::tool_result("call_2", "boom", true),
            ],
        };
        let out = translate_message(&msg);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].role, "tool");
        assert_eq!(out[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(out[1].content.as_deref(), Some("Error: boom"));
    }

    #[test]
    fn test_translate_assistant_tool_call() {
        let msg = LlmMessage {
            role: MessageRole::Assistant,
            content: vec![ContentBlock::tool_use(
                "call_1",
                "calculator",
                json!({"expression": "1+1"}),
            )],
        };
        let out = translate_message(&msg);
        assert_eq!(out.len(), 1);
        assert!(out[0].content.is_none());
        let calls = out[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.arguments, r#"{"expression":"1+1"}"#);
    }

    #[test]
    fn test_translate_empty_message_is_not_dropped() {
        let msg = LlmMessage {
            role: MessageRole::Assistant,
            content: vec![],
        };
        let out = translate_message(&msg);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content.as_deref(), Some(""));
    }

    #[test]
    fn test_normalize_response_with_tool_calls() {
        let resp: OpenAIResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_1", "type": "function",
                         "function": {"name": "calculator", "arguments": "{\"expression\":\"37593*67\"}"}},
                        {"id": "call_2", "type": "function",
                         "function": {"name": "", "arguments": "{}"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }))
        .unwrap();

        let out = normalize_response(resp).unwrap();
        let uses = out.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].1, "calculator");
        assert_eq!(uses[0].2["expression"], "37593*67");
        assert!(!out.end_turn);
        assert_eq!(out.usage.input_tokens, 10);
    }

    #[test]
    fn test_normalize_response_without_choices_fails() {
        let resp: OpenAIResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(normalize_response(resp).is_err());
    }

    #[test]
    fn test_stream_accumulates_text_fragments() {
        let mut acc = StreamAccumulator::default();
        assert_eq!(
            acc.push(chunk(json!({"choices": [{"delta": {"role": "assistant", "content": ""}}]}))),
            None
        );
        assert_eq!(
            acc.push(chunk(json!({"choices": [{"delta": {"content": "Hel"}}]}))),
            Some("Hel".to_string())
        );
        assert_eq!(
            acc.push(chunk(json!({"choices": [{"delta": {"content": "lo"}}]}))),
            Some("lo".to_string())
        );
        acc.push(chunk(json!({
            "choices": [{"delta": {}, "finish_reason": "stop"}],
            "x_groq": {"usage": {"prompt_tokens": 3, "completion_tokens": 2}}
        })));

        let out = acc.finish().unwrap();
        assert_eq!(out.text(), "Hello");
        assert!(out.end_turn);
        assert_eq!(out.usage.output_tokens, 2);
    }

    #[test]
    fn test_stream_assembles_indexed_tool_calls() {
        let mut acc = StreamAccumulator::default();
        acc.push(chunk(json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "id": "call_a", "function": {"name": "calculator", "arguments": "{\"expr"}},
            {"index": 1, "id": "call_b", "function": {"name": "wikipedia_search_tool", "arguments": ""}}
        ]}}]})));
        acc.push(chunk(json!({"choices": [{"delta": {"tool_calls": [
            {"index": 1, "function": {"arguments": "{\"query\":\"Rust\"}"}},
            {"index": 0, "function": {"arguments": "ession\":\"2+2\"}"}}
        ]}}]})));
        acc.push(chunk(json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]})));

        let out = acc.finish().unwrap();
        let uses = out.tool_uses();
        assert_eq!(uses.len(), 2);
        assert_eq!(uses[0], ("call_a", "calculator", &json!({"expression": "2+2"})));
        assert_eq!(
            uses[1],
            ("call_b", "wikipedia_search_tool", &json!({"query": "Rust"}))
        );
        assert!(!out.end_turn);
    }

    #[test]
    fn test_stream_without_choices_is_an_error() {
        let acc = StreamAccumulator::default();
        assert!(acc.finish().is_err());
    }
}

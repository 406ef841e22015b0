//! Mock implementations for testing
//!
//! These mocks let the orchestrator and thread manager run without a model,
//! network, or database.

use super::traits::*;
use crate::db::{thread_title, ThreadSummary};
use crate::llm::{ContentBlock, FragmentSender, LlmError, LlmRequest, LlmResponse, ToolDefinition};
use crate::state_machine::{ConversationState, Message, ToolCall};
use crate::tools::ToolOutput;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Mock LLM client that returns queued responses.
///
/// When the caller asks for streaming, the text of each response is also
/// delivered word by word as fragments.
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    model_id: String,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn queue_text(&self, text: &str) {
        self.queue_response(LlmResponse::text_only(text));
    }

    /// Queue a supervisor answer naming `label`
    pub fn queue_route(&self, label: &str) {
        self.queue_text(&format!(r#"{{"route": "{label}"}}"#));
    }

    /// Queue a response carrying tool-call requests
    pub fn queue_tool_calls(&self, text: &str, calls: Vec<ToolCall>) {
        let mut content = Vec::new();
        if !text.is_empty() {
            content.push(ContentBlock::text(text));
        }
        content.extend(
            calls
                .into_iter()
                .map(|c| ContentBlock::tool_use(c.id, c.name, c.arguments)),
        );
        self.queue_response(LlmResponse {
            content,
            end_turn: false,
            ..LlmResponse::default()
        });
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_response(&self) -> Result<LlmResponse, LlmError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }
}

fn stream_text(response: &Result<LlmResponse, LlmError>, fragments: Option<&FragmentSender>) {
    let (Ok(response), Some(tx)) = (response, fragments) else {
        return;
    };
    for word in response.text().split_inclusive(' ') {
        let _ = tx.send(word.to_string());
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        request: &LlmRequest,
        fragments: Option<&FragmentSender>,
    ) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let response = self.next_response();
        stream_text(&response, fragments);
        response
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Mock Tool Executor
// ============================================================================

/// Mock tool executor with predefined outputs
pub struct MockToolExecutor {
    outputs: HashMap<String, ToolOutput>,
    definitions: Vec<ToolDefinition>,
    /// Cancel the run's token from inside every execution
    cancel_run: bool,
    /// Record of tool executions
    pub executions: Mutex<Vec<(String, Value)>>,
}

impl MockToolExecutor {
    pub fn new() -> Self {
        Self {
            outputs: HashMap::new(),
            definitions: Vec::new(),
            cancel_run: false,
            executions: Mutex::new(Vec::new()),
        }
    }

    /// Add a tool with a predefined output
    pub fn with_tool(mut self, name: impl Into<String>, output: ToolOutput) -> Self {
        let name = name.into();
        self.definitions.push(ToolDefinition {
            name: name.clone(),
            description: format!("Mock {name}"),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        });
        self.outputs.insert(name, output);
        self
    }

    /// Cancel the calling run when a tool executes, as a client
    /// disconnecting mid-batch would
    pub fn cancelling_run(mut self) -> Self {
        self.cancel_run = true;
        self
    }

    /// Get recorded executions
    pub fn recorded_executions(&self) -> Vec<(String, Value)> {
        self.executions.lock().unwrap().clone()
    }
}

impl Default for MockToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(
        &self,
        name: &str,
        input: Value,
        cancel: CancellationToken,
        _thread_id: &str,
    ) -> Option<ToolOutput> {
        if self.cancel_run {
            cancel.cancel();
        }
        self.executions
            .lock()
            .unwrap()
            .push((name.to_string(), input));
        self.outputs.get(name).cloned()
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }
}

// ============================================================================
// Delayed Mock LLM Client (for cancellation and serialisation tests)
// ============================================================================

/// Mock LLM client with configurable delay
pub struct DelayedMockLlmClient {
    inner: MockLlmClient,
    delay: Duration,
    /// Notified when a request starts
    pub request_started: Arc<Notify>,
}

impl DelayedMockLlmClient {
    pub fn new(model_id: impl Into<String>, delay: Duration) -> Self {
        Self {
            inner: MockLlmClient::new(model_id),
            delay,
            request_started: Arc::new(Notify::new()),
        }
    }

    pub fn queue_route(&self, label: &str) {
        self.inner.queue_route(label);
    }

    pub fn queue_text(&self, text: &str) {
        self.inner.queue_text(text);
    }
}

#[async_trait]
impl LlmClient for DelayedMockLlmClient {
    async fn complete(
        &self,
        request: &LlmRequest,
        fragments: Option<&FragmentSender>,
    ) -> Result<LlmResponse, LlmError> {
        self.inner.requests.lock().unwrap().push(request.clone());
        self.request_started.notify_one();
        tokio::time::sleep(self.delay).await;
        let response = self.inner.next_response();
        stream_text(&response, fragments);
        response
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

// ============================================================================
// In-Memory Checkpoint Store
// ============================================================================

struct StoredThread {
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// In-memory checkpoint store for testing
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    threads: Mutex<HashMap<String, StoredThread>>,
    saves: Mutex<Vec<String>>,
    fail_saves: AtomicBool,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing transcript for `thread_id`
    pub fn with_thread(self, thread_id: &str, messages: Vec<Message>) -> Self {
        let now = Utc::now();
        self.threads.lock().unwrap().insert(
            thread_id.to_string(),
            StoredThread {
                messages,
                created_at: now,
                updated_at: now,
            },
        );
        self
    }

    /// Make every subsequent `save` fail
    pub fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }

    pub fn messages(&self, thread_id: &str) -> Vec<Message> {
        self.threads
            .lock()
            .unwrap()
            .get(thread_id)
            .map(|t| t.messages.clone())
            .unwrap_or_default()
    }

    /// Thread ids in the order they were saved
    pub fn recorded_saves(&self) -> Vec<String> {
        self.saves.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Vec<Message>, String> {
        Ok(self.messages(thread_id))
    }

    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<(), String> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err("disk full".to_string());
        }
        let now = Utc::now();
        let mut threads = self.threads.lock().unwrap();
        let thread = threads
            .entry(thread_id.to_string())
            .or_insert_with(|| StoredThread {
                messages: Vec::new(),
                created_at: now,
                updated_at: now,
            });
        if state.messages.len() < thread.messages.len() {
            return Err(format!("refusing to shrink thread {thread_id}"));
        }
        thread.messages.clone_from(&state.messages);
        thread.updated_at = now;
        drop(threads);

        self.saves.lock().unwrap().push(thread_id.to_string());
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<ThreadSummary>, String> {
        let threads = self.threads.lock().unwrap();
        let mut summaries: Vec<ThreadSummary> = threads
            .iter()
            .map(|(id, t)| ThreadSummary {
                thread_id: id.clone(),
                title: thread_title(&t.messages),
                message_count: t.messages.len(),
                created_at: t.created_at,
                updated_at: t.updated_at,
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

//! Trait abstractions for runtime I/O
//!
//! These traits let the orchestrator run against mock implementations.

use crate::db::{Database, ThreadSummary};
use crate::llm::{FragmentSender, LlmError, LlmRequest, LlmResponse, ModelRegistry, ToolDefinition};
use crate::state_machine::{ConversationState, Message};
use crate::tools::{ToolContext, ToolOutput, ToolRegistry};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Client for making LLM requests
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete an LLM request, streaming text deltas into `fragments` if given
    async fn complete(
        &self,
        request: &LlmRequest,
        fragments: Option<&FragmentSender>,
    ) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Executor for tools
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute a tool by name; `None` when the name is not registered
    async fn execute(
        &self,
        name: &str,
        input: Value,
        cancel: CancellationToken,
        thread_id: &str,
    ) -> Option<ToolOutput>;

    /// Get tool definitions for LLM
    fn definitions(&self) -> Vec<ToolDefinition>;
}

/// Per-thread transcript persistence
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Prior messages of a thread, empty for a thread never saved
    async fn load(&self, thread_id: &str) -> Result<Vec<Message>, String>;

    /// Persist the final state of a completed run
    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<(), String>;

    /// All known threads, most recently updated first
    async fn list_threads(&self) -> Result<Vec<ThreadSummary>, String>;

    /// Full transcript of a thread for display
    async fn history(&self, thread_id: &str) -> Result<Vec<Message>, String> {
        self.load(thread_id).await
    }
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    async fn complete(
        &self,
        request: &LlmRequest,
        fragments: Option<&FragmentSender>,
    ) -> Result<LlmResponse, LlmError> {
        (**self).complete(request, fragments).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    async fn execute(
        &self,
        name: &str,
        input: Value,
        cancel: CancellationToken,
        thread_id: &str,
    ) -> Option<ToolOutput> {
        (**self).execute(name, input, cancel, thread_id).await
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        (**self).definitions()
    }
}

#[async_trait]
impl<T: CheckpointStore + ?Sized> CheckpointStore for Arc<T> {
    async fn load(&self, thread_id: &str) -> Result<Vec<Message>, String> {
        (**self).load(thread_id).await
    }

    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<(), String> {
        (**self).save(thread_id, state).await
    }

    async fn list_threads(&self) -> Result<Vec<ThreadSummary>, String> {
        (**self).list_threads().await
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<Message>, String> {
        (**self).history(thread_id).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as a checkpoint store
#[derive(Clone)]
pub struct DatabaseCheckpointStore {
    db: Database,
}

impl DatabaseCheckpointStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CheckpointStore for DatabaseCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Vec<Message>, String> {
        self.db.load_messages(thread_id).map_err(|e| e.to_string())
    }

    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<(), String> {
        self.db
            .save_messages(thread_id, &state.messages)
            .map_err(|e| e.to_string())
    }

    async fn list_threads(&self) -> Result<Vec<ThreadSummary>, String> {
        self.db.list_threads().map_err(|e| e.to_string())
    }
}

/// Adapter to use ModelRegistry as LlmClient
pub struct RegistryLlmClient {
    registry: Arc<ModelRegistry>,
    model_id: String,
}

impl RegistryLlmClient {
    pub fn new(registry: Arc<ModelRegistry>, model_id: String) -> Self {
        Self { registry, model_id }
    }
}

#[async_trait]
impl LlmClient for RegistryLlmClient {
    async fn complete(
        &self,
        request: &LlmRequest,
        fragments: Option<&FragmentSender>,
    ) -> Result<LlmResponse, LlmError> {
        let llm = self
            .registry
            .get(&self.model_id)
            .or_else(|| self.registry.default())
            .ok_or_else(|| LlmError::network("No LLM available"))?;
        llm.complete(request, fragments).await
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Adapter to use ToolRegistry as ToolExecutor
pub struct ToolRegistryExecutor {
    registry: ToolRegistry,
    http: reqwest::Client,
}

impl ToolRegistryExecutor {
    pub fn new(registry: ToolRegistry, http: reqwest::Client) -> Self {
        Self { registry, http }
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistryExecutor {
    async fn execute(
        &self,
        name: &str,
        input: Value,
        cancel: CancellationToken,
        thread_id: &str,
    ) -> Option<ToolOutput> {
        let ctx = ToolContext::new(cancel, thread_id, self.http.clone());
        self.registry.execute(name, input, ctx).await
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }
}

//! Graph walk from the supervisor to a terminal transition

use super::nodes::NodeRunner;
use super::traits::{LlmClient, ToolExecutor};
use crate::llm::LlmError;
use crate::state_machine::{ConversationState, Message, Next, NodeId};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default ceiling on node executions per run
pub const DEFAULT_MAX_STEPS: usize = 50;

/// Events a caller sees while a run progresses
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// Streamed model output from a user-facing node
    Fragment { node: NodeId, content: String },
    /// The run finished and its state was saved
    Completed { appended: Vec<Message> },
    /// The run stopped; nothing was saved
    Failed { message: String },
}

pub type EventSender = mpsc::UnboundedSender<RunEvent>;

/// Errors that abort a run
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("supervisor output is not a known route: {raw:?}")]
    RoutingParse { raw: String },

    #[error("orchestration exceeded {limit} steps without terminating")]
    LimitExceeded { limit: usize },

    #[error("model call failed: {0}")]
    ModelCall(#[from] LlmError),

    #[error("invalid transition from {from}: {detail}")]
    InvalidTransition { from: NodeId, detail: String },

    #[error("checkpoint store error: {0}")]
    Checkpoint(String),

    #[error("run cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub max_steps: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

/// Drives one conversation state through the node graph
pub struct Orchestrator<L, T> {
    llm: L,
    tools: T,
    config: OrchestratorConfig,
}

impl<L, T> Orchestrator<L, T>
where
    L: LlmClient,
    T: ToolExecutor,
{
    pub fn new(llm: L, tools: T, config: OrchestratorConfig) -> Self {
        Self { llm, tools, config }
    }

    /// Walk from the supervisor until a node declares the terminal transition.
    ///
    /// Each node's delta is applied only after the node returns, so an
    /// error or cancellation never leaves a half-applied step behind.
    pub async fn run(
        &self,
        thread_id: &str,
        mut state: ConversationState,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<ConversationState, OrchestrationError> {
        let runner = NodeRunner {
            llm: &self.llm,
            tools: &self.tools,
            thread_id,
            events,
            cancel,
        };

        tracing::info!(
            thread_id,
            model = %self.llm.model_id(),
            max_steps = self.config.max_steps,
            "Run started"
        );

        let mut node = NodeId::ENTRY;
        for step in 1..=self.config.max_steps {
            if cancel.is_cancelled() {
                tracing::info!(thread_id, step, %node, "Run cancelled");
                return Err(OrchestrationError::Cancelled);
            }

            tracing::debug!(thread_id, step, %node, "Entering node");
            let output = runner.run(node, &state).await?;

            if !node.allows(output.next) {
                return Err(OrchestrationError::InvalidTransition {
                    from: node,
                    detail: format!("{} is not a declared successor", output.next),
                });
            }

            state = state.apply(output.delta);
            tracing::info!(
                thread_id,
                step,
                from = %node,
                to = %output.next,
                messages = state.messages.len(),
                "Transition"
            );

            match output.next {
                Next::End => return Ok(state),
                Next::Node(next) => node = next,
            }
        }

        tracing::warn!(thread_id, limit = self.config.max_steps, %node, "Step limit reached");
        Err(OrchestrationError::LimitExceeded {
            limit: self.config.max_steps,
        })
    }
}

//! Handler node implementations
//!
//! Each node reads the conversation, makes at most one model call, and
//! returns a [`NodeOutput`]. Nodes never touch the state directly; the
//! orchestrator applies their deltas.

use super::orchestrator::{EventSender, OrchestrationError, RunEvent};
use super::traits::{LlmClient, ToolExecutor};
use crate::llm::{
    ContentBlock, LlmMessage, LlmRequest, LlmResponse, MessageRole, ResponseFormat,
    SystemContent, ToolDefinition,
};
use crate::prompts;
use crate::state_machine::{
    parse_route, tool_gate, tools_return_target, ConversationState, Message, Next, NodeId,
    NodeOutput, Role, Specialist, StateDelta, ToolCall, ToolPhase, TransitionError,
};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How many trailing messages a node sends to the model
pub const CONTEXT_WINDOW: usize = 4;

const MAX_TOKENS: u32 = 4096;

/// The trailing messages a node reasons over.
///
/// Starts at the last [`CONTEXT_WINDOW`] messages and reaches further back
/// while the window would open on a tool result, so that every result
/// travels with the `ai` message that requested it.
pub fn context_window(messages: &[Message]) -> &[Message] {
    let mut start = messages.len().saturating_sub(CONTEXT_WINDOW);
    while start > 0 && messages[start].role == Role::Tool {
        start -= 1;
    }
    &messages[start..]
}

/// Convert a window of transcript messages into provider messages.
///
/// `system` messages become extra system prompts. Tool requests without a
/// result in the window (dropped by the single-round policy) and results
/// without a request are left out; providers reject either.
pub fn to_llm_messages(window: &[Message]) -> (Vec<SystemContent>, Vec<LlmMessage>) {
    let answered: HashSet<&str> = window
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    let requested: HashSet<&str> = window
        .iter()
        .filter(|m| m.role == Role::Ai)
        .flat_map(|m| m.tool_calls.iter().map(|c| c.id.as_str()))
        .collect();

    let mut system = Vec::new();
    let mut messages = Vec::new();

    for msg in window {
        match msg.role {
            Role::Human => messages.push(LlmMessage {
                role: MessageRole::User,
                content: vec![ContentBlock::text(&msg.content)],
            }),
            Role::Ai => {
                let mut content = Vec::new();
                if !msg.content.is_empty() {
                    content.push(ContentBlock::text(&msg.content));
                }
                content.extend(
                    msg.tool_calls
                        .iter()
                        .filter(|c| answered.contains(c.id.as_str()))
                        .map(|c| ContentBlock::tool_use(&c.id, &c.name, c.arguments.clone())),
                );
                if !content.is_empty() {
                    messages.push(LlmMessage {
                        role: MessageRole::Assistant,
                        content,
                    });
                }
            }
            Role::Tool => {
                let Some(id) = msg
                    .tool_call_id
                    .as_deref()
                    .filter(|id| requested.contains(id))
                else {
                    continue;
                };
                messages.push(LlmMessage {
                    role: MessageRole::User,
                    content: vec![ContentBlock::tool_result(id, &msg.content, msg.is_error)],
                });
            }
            Role::System => system.push(SystemContent::new(&msg.content)),
        }
    }

    (system, messages)
}

/// Build the request a node sends for the current state
fn build_request(
    node: NodeId,
    state: &ConversationState,
    tools: Vec<ToolDefinition>,
    response_format: ResponseFormat,
) -> LlmRequest {
    let (extra_system, messages) = to_llm_messages(context_window(&state.messages));
    let mut system: Vec<SystemContent> = prompts::system_prompt(node)
        .map(SystemContent::new)
        .into_iter()
        .collect();
    system.extend(extra_system);

    LlmRequest {
        system,
        messages,
        tools,
        max_tokens: Some(MAX_TOKENS),
        response_format,
    }
}

/// The `ai` message recorded for a model response
fn response_message(response: &LlmResponse) -> Message {
    let calls: Vec<ToolCall> = response
        .tool_uses()
        .into_iter()
        .map(|(id, name, input)| {
            let id = if id.is_empty() {
                format!("call_{}", uuid::Uuid::new_v4().simple())
            } else {
                id.to_string()
            };
            ToolCall::new(id, name, input.clone())
        })
        .collect();
    Message::ai_with_tool_calls(response.text(), calls)
}

/// Everything one node activation needs besides the state
pub(super) struct NodeRunner<'a, L: ?Sized, T: ?Sized> {
    pub llm: &'a L,
    pub tools: &'a T,
    pub thread_id: &'a str,
    pub events: &'a EventSender,
    pub cancel: &'a CancellationToken,
}

impl<L, T> NodeRunner<'_, L, T>
where
    L: LlmClient + ?Sized,
    T: ToolExecutor + ?Sized,
{
    pub async fn run(
        &self,
        node: NodeId,
        state: &ConversationState,
    ) -> Result<NodeOutput, OrchestrationError> {
        match node {
            NodeId::Supervisor => self.supervisor(state).await,
            NodeId::Greeting => self.respond(node, state, Next::End).await,
            NodeId::Enhancer => self.respond(node, state, Next::Node(NodeId::Supervisor)).await,
            NodeId::Coder => self.specialist(Specialist::Coder, state).await,
            NodeId::MathsReasoner => self.specialist(Specialist::MathsReasoner, state).await,
            NodeId::Researcher => self.specialist(Specialist::Researcher, state).await,
            NodeId::ShouldUseTools => Ok(tool_gate(state)),
            NodeId::Tools => self.execute_tools(state).await,
        }
    }

    /// Classify the conversation into one route. No fallback on bad output.
    async fn supervisor(&self, state: &ConversationState) -> Result<NodeOutput, OrchestrationError> {
        let request = build_request(
            NodeId::Supervisor,
            state,
            Vec::new(),
            ResponseFormat::JsonObject,
        );
        let response = self.call_model(NodeId::Supervisor, &request, false).await?;
        let raw = response.text();

        let route = parse_route(&raw).ok_or(OrchestrationError::RoutingParse { raw })?;
        tracing::info!(thread_id = %self.thread_id, route = route.label(), "Supervisor routed");
        Ok(NodeOutput::goto(route.node()))
    }

    /// Greeting and enhancer: one plain answer, then a fixed successor
    async fn respond(
        &self,
        node: NodeId,
        state: &ConversationState,
        next: Next,
    ) -> Result<NodeOutput, OrchestrationError> {
        let request = build_request(node, state, Vec::new(), ResponseFormat::Text);
        let response = self.call_model(node, &request, true).await?;
        Ok(NodeOutput::new(
            StateDelta::append(Message::ai(response.text())),
            next,
        ))
    }

    /// Tools are bound only until the activation has used its tool round
    async fn specialist(
        &self,
        specialist: Specialist,
        state: &ConversationState,
    ) -> Result<NodeOutput, OrchestrationError> {
        let node = specialist.node();
        let tools = match state.tool_phase {
            ToolPhase::NoToolsYet => self.tools.definitions(),
            ToolPhase::ToolsUsed => Vec::new(),
        };
        let request = build_request(node, state, tools, ResponseFormat::Text);
        let response = self.call_model(node, &request, true).await?;

        let message = response_message(&response);
        if message.has_pending_tool_calls() {
            tracing::info!(
                thread_id = %self.thread_id,
                %node,
                count = message.tool_calls.len(),
                "Specialist requested tools"
            );
        }

        Ok(NodeOutput::new(
            StateDelta::append(message).with_tools_sender(specialist.sender()),
            Next::Node(NodeId::ShouldUseTools),
        ))
    }

    /// Run every pending call in request order. Failures stay in-band.
    async fn execute_tools(
        &self,
        state: &ConversationState,
    ) -> Result<NodeOutput, OrchestrationError> {
        let target = tools_return_target(state).map_err(|e| match e {
            TransitionError::NoToolsSender => OrchestrationError::InvalidTransition {
                from: NodeId::Tools,
                detail: e.to_string(),
            },
        })?;
        let calls = state
            .last_message()
            .map(|m| m.tool_calls.as_slice())
            .unwrap_or_default();

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            if self.cancel.is_cancelled() {
                return Err(OrchestrationError::Cancelled);
            }
            tracing::info!(thread_id = %self.thread_id, tool = %call.name, id = %call.id, "Executing tool");

            let output = self
                .tools
                .execute(
                    &call.name,
                    call.arguments.clone(),
                    self.cancel.clone(),
                    self.thread_id,
                )
                .await;

            let message = match output {
                Some(out) if out.success => Message::tool_result(call, out.output),
                Some(out) => {
                    tracing::warn!(tool = %call.name, error = %out.output, "Tool failed");
                    Message::tool_error(call, out.output)
                }
                None => {
                    tracing::warn!(tool = %call.name, "Unknown tool requested");
                    Message::tool_error(call, format!("Unknown tool: {}", call.name))
                }
            };
            results.push(message);
        }

        Ok(NodeOutput::new(
            StateDelta::append_all(results).with_tool_phase(ToolPhase::ToolsUsed),
            Next::Node(target.node()),
        ))
    }

    /// One model call raced against cancellation. Streamed fragments are
    /// forwarded to the run's event channel as they arrive.
    async fn call_model(
        &self,
        node: NodeId,
        request: &LlmRequest,
        stream: bool,
    ) -> Result<LlmResponse, OrchestrationError> {
        if !stream {
            return tokio::select! {
                biased;
                () = self.cancel.cancelled() => Err(OrchestrationError::Cancelled),
                result = self.llm.complete(request, None) => result.map_err(OrchestrationError::ModelCall),
            };
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let llm = self.llm;
        let call = async move {
            let result = llm.complete(request, Some(&tx)).await;
            drop(tx);
            result
        };
        let forward = async {
            while let Some(content) = rx.recv().await {
                if content.is_empty() {
                    continue;
                }
                let _ = self.events.send(RunEvent::Fragment { node, content });
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(OrchestrationError::Cancelled),
            (result, ()) = async { tokio::join!(call, forward) } => {
                result.map_err(OrchestrationError::ModelCall)
            }
        }
    }
}

//! Pure transition helpers
//!
//! Everything here is deterministic: given the same state it produces the
//! same delta and the same next node, with no I/O.

use super::node::{NodeId, Next, Route, Specialist};
use super::state::{ConversationState, Message, StateDelta, ToolPhase};
use serde::Deserialize;
use thiserror::Error;

/// Result of running one node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutput {
    pub delta: StateDelta,
    pub next: Next,
}

impl NodeOutput {
    pub fn new(delta: StateDelta, next: Next) -> Self {
        Self { delta, next }
    }

    pub fn goto(node: NodeId) -> Self {
        Self::new(StateDelta::none(), Next::Node(node))
    }
}

/// Tool-gate decision table
///
/// | pending tool calls | tools already used | action                       |
/// |--------------------|--------------------|------------------------------|
/// | yes                | no                 | run the tools                |
/// | yes                | yes                | reset round, end             |
/// | no                 | either             | reset round, end             |
///
/// The second row is intentional: a specialist gets one tool round per
/// activation and any further requests are dropped.
pub fn tool_gate(state: &ConversationState) -> NodeOutput {
    let pending = state
        .last_message()
        .is_some_and(Message::has_pending_tool_calls);

    match (pending, state.tool_phase) {
        (true, ToolPhase::NoToolsYet) => NodeOutput::goto(NodeId::Tools),
        (true, ToolPhase::ToolsUsed) | (false, _) => {
            NodeOutput::new(StateDelta::none().reset_tool_round(), Next::End)
        }
    }
}

/// Errors from pure transition helpers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("tool results have no specialist to return to")]
    NoToolsSender,
}

/// Where the tool-execution node hands control back to
pub fn tools_return_target(state: &ConversationState) -> Result<Specialist, TransitionError> {
    Specialist::from_sender(state.tools_sender).ok_or(TransitionError::NoToolsSender)
}

// ============================================================================
// Supervisor output parsing
// ============================================================================

#[derive(Debug, Deserialize)]
struct SupervisorOutput {
    route: String,
}

/// Parse the supervisor's structured output into a route.
///
/// Accepts a JSON object `{"route": "<label>"}`, optionally wrapped in a
/// Markdown code fence. Returns `None` for anything else; there is no
/// default route.
pub fn parse_route(raw: &str) -> Option<Route> {
    let body = strip_code_fence(raw.trim());
    let output: SupervisorOutput = serde_json::from_str(body).ok()?;
    output.route.trim().parse().ok()
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

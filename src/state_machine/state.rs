//! Conversation state types

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Messages
// ============================================================================

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Human,
    Ai,
    Tool,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Ai => "ai",
            Role::Tool => "tool",
            Role::System => "system",
        }
    }
}

/// A tool invocation requested by the model, attached to an `ai` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One entry in the conversation transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Pending tool-call requests (only meaningful on `ai` messages)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// The request this message answers (only on `tool` messages)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name (only on `tool` messages)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: vec![],
            tool_call_id: None,
            name: None,
            is_error: false,
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::plain(Role::Human, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::plain(Role::Ai, content)
    }

    #[allow(dead_code)] // Used in tests
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn ai_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Ai, content)
        }
    }

    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            ..Self::plain(Role::Tool, content)
        }
    }

    /// A failed tool call, recorded in-band so the resuming specialist can see it
    pub fn tool_error(call: &ToolCall, error: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::tool_result(call, error)
        }
    }

    pub fn has_pending_tool_calls(&self) -> bool {
        self.role == Role::Ai && !self.tool_calls.is_empty()
    }
}

// ============================================================================
// Tool round bookkeeping
// ============================================================================

/// Which specialist is waiting on tool results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolsSender {
    #[default]
    None,
    Coder,
    MathsReasoner,
    Researcher,
}

/// Progress of the current specialist activation through its single tool round.
///
/// Once `ToolsUsed`, the tool gate terminates the run even if the model asks
/// for more tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPhase {
    #[default]
    NoToolsYet,
    ToolsUsed,
}

// ============================================================================
// Conversation State
// ============================================================================

/// The record threaded through every node of one orchestration run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools_sender: ToolsSender,
    #[serde(default)]
    pub tool_phase: ToolPhase,
}

impl ConversationState {
    /// Seed a run from persisted history plus the new human turn
    pub fn seeded(prior: Vec<Message>, human_text: impl Into<String>) -> Self {
        let mut messages = prior;
        messages.push(Message::human(human_text));
        Self {
            messages,
            tools_sender: ToolsSender::None,
            tool_phase: ToolPhase::NoToolsYet,
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn used_tools(&self) -> bool {
        self.tool_phase == ToolPhase::ToolsUsed
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Apply a node's delta. Messages are only ever appended.
    #[must_use]
    pub fn apply(mut self, delta: StateDelta) -> Self {
        self.messages.extend(delta.append);
        if let Some(sender) = delta.tools_sender {
            self.tools_sender = sender;
        }
        if let Some(phase) = delta.tool_phase {
            self.tool_phase = phase;
        }
        self
    }
}

/// What a node wants changed. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub append: Vec<Message>,
    pub tools_sender: Option<ToolsSender>,
    pub tool_phase: Option<ToolPhase>,
}

impl StateDelta {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn append(message: Message) -> Self {
        Self {
            append: vec![message],
            ..Self::default()
        }
    }

    pub fn append_all(messages: Vec<Message>) -> Self {
        Self {
            append: messages,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_tools_sender(mut self, sender: ToolsSender) -> Self {
        self.tools_sender = Some(sender);
        self
    }

    #[must_use]
    pub fn with_tool_phase(mut self, phase: ToolPhase) -> Self {
        self.tool_phase = Some(phase);
        self
    }

    /// Clear the tool round on the way out of the graph
    #[must_use]
    pub fn reset_tool_round(self) -> Self {
        self.with_tools_sender(ToolsSender::None)
            .with_tool_phase(ToolPhase::NoToolsYet)
    }
}

//! Orchestration state machine
//!
//! Pure data and decisions: the conversation record, the node graph's
//! transition table, and the tool-gate policy. Nodes that talk to a model
//! live in `runtime`.

pub mod node;
pub mod state;
pub mod transition;

#[cfg(test)]
mod proptests;

pub use node::{Next, NodeId, Route, Specialist};
pub use state::{ConversationState, Message, Role, StateDelta, ToolCall, ToolPhase};
#[cfg(test)]
pub use state::ToolsSender;
pub use transition::{parse_route, tool_gate, tools_return_target, NodeOutput, TransitionError};

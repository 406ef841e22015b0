//! Node identities, the routing label set, and the transition table

use super::state::ToolsSender;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every node in the orchestration graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    Supervisor,
    Enhancer,
    Greeting,
    Coder,
    MathsReasoner,
    Researcher,
    /// Decides whether the last specialist output needs a tool round
    ShouldUseTools,
    /// Runs the pending tool calls
    Tools,
}

/// Where a node sends control next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Next {
    Node(NodeId),
    End,
}

const SUPERVISOR_SUCCESSORS: &[Next] = &[
    Next::Node(NodeId::Enhancer),
    Next::Node(NodeId::Greeting),
    Next::Node(NodeId::Coder),
    Next::Node(NodeId::MathsReasoner),
    Next::Node(NodeId::Researcher),
];
const ENHANCER_SUCCESSORS: &[Next] = &[Next::Node(NodeId::Supervisor)];
const GREETING_SUCCESSORS: &[Next] = &[Next::End];
const SPECIALIST_SUCCESSORS: &[Next] = &[Next::Node(NodeId::ShouldUseTools)];
const TOOL_GATE_SUCCESSORS: &[Next] = &[Next::Node(NodeId::Tools), Next::End];
const TOOLS_SUCCESSORS: &[Next] = &[
    Next::Node(NodeId::Coder),
    Next::Node(NodeId::MathsReasoner),
    Next::Node(NodeId::Researcher),
];

impl NodeId {
    /// Entry point of every run
    pub const ENTRY: NodeId = NodeId::Supervisor;

    pub fn as_str(self) -> &'static str {
        match self {
            NodeId::Supervisor => "supervisor",
            NodeId::Enhancer => "enhancer",
            NodeId::Greeting => "greeting",
            NodeId::Coder => "coder",
            NodeId::MathsReasoner => "maths_reasoner",
            NodeId::Researcher => "researcher",
            NodeId::ShouldUseTools => "should_use_tools",
            NodeId::Tools => "tools",
        }
    }

    /// The transitions this node is allowed to declare
    pub fn successors(self) -> &'static [Next] {
        match self {
            NodeId::Supervisor => SUPERVISOR_SUCCESSORS,
            NodeId::Enhancer => ENHANCER_SUCCESSORS,
            NodeId::Greeting => GREETING_SUCCESSORS,
            NodeId::Coder | NodeId::MathsReasoner | NodeId::Researcher => SPECIALIST_SUCCESSORS,
            NodeId::ShouldUseTools => TOOL_GATE_SUCCESSORS,
            NodeId::Tools => TOOLS_SUCCESSORS,
        }
    }

    pub fn allows(self, next: Next) -> bool {
        self.successors().contains(&next)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Next::Node(node) => node.fmt(f),
            Next::End => f.write_str("__end__"),
        }
    }
}

// ============================================================================
// Routing labels
// ============================================================================

/// The closed label set the supervisor classifies into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Enhancer,
    Greeting,
    Coder,
    MathsReasoner,
    Researcher,
}

impl Route {
    pub const ALL: [Route; 5] = [
        Route::Enhancer,
        Route::Greeting,
        Route::Coder,
        Route::MathsReasoner,
        Route::Researcher,
    ];

    pub fn label(self) -> &'static str {
        self.node().as_str()
    }

    pub fn node(self) -> NodeId {
        match self {
            Route::Enhancer => NodeId::Enhancer,
            Route::Greeting => NodeId::Greeting,
            Route::Coder => NodeId::Coder,
            Route::MathsReasoner => NodeId::MathsReasoner,
            Route::Researcher => NodeId::Researcher,
        }
    }
}

/// A label outside the closed set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown route label: {0:?}")]
pub struct UnknownRoute(pub String);

impl FromStr for Route {
    type Err = UnknownRoute;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Route::ALL
            .into_iter()
            .find(|route| route.label() == s)
            .ok_or_else(|| UnknownRoute(s.to_string()))
    }
}

// ============================================================================
// Specialists
// ============================================================================

/// Handler nodes that may request one tool round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Specialist {
    Coder,
    MathsReasoner,
    Researcher,
}

impl Specialist {
    pub fn node(self) -> NodeId {
        match self {
            Specialist::Coder => NodeId::Coder,
            Specialist::MathsReasoner => NodeId::MathsReasoner,
            Specialist::Researcher => NodeId::Researcher,
        }
    }

    pub fn sender(self) -> ToolsSender {
        match self {
            Specialist::Coder => ToolsSender::Coder,
            Specialist::MathsReasoner => ToolsSender::MathsReasoner,
            Specialist::Researcher => ToolsSender::Researcher,
        }
    }

    pub fn from_sender(sender: ToolsSender) -> Option<Self> {
        match sender {
            ToolsSender::Coder => Some(Specialist::Coder),
            ToolsSender::MathsReasoner => Some(Specialist::MathsReasoner),
            ToolsSender::Researcher => Some(Specialist::Researcher),
            ToolsSender::None => None,
        }
    }
}

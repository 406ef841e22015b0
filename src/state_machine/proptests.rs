//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::node::*;
use super::state::*;
use super::transition::*;
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_tool_call() -> impl Strategy<Value = ToolCall> {
    (
        "call_[a-z0-9]{6}",
        prop_oneof![
            Just("calculator"),
            Just("wikipedia_search_tool"),
            Just("python_code_executor_tool"),
            Just("no_such_tool"),
        ],
        "[a-z0-9 ]{0,20}",
    )
        .prop_map(|(id, name, query)| ToolCall::new(id, name, json!({ "query": query })))
}

fn arb_message() -> impl Strategy<Value = Message> {
    prop_oneof![
        "[a-zA-Z ]{1,30}".prop_map(Message::human),
        "[a-zA-Z ]{0,30}".prop_map(Message::ai),
        ("[a-zA-Z ]{0,30}", proptest::collection::vec(arb_tool_call(), 1..4))
            .prop_map(|(text, calls)| Message::ai_with_tool_calls(text, calls)),
        (arb_tool_call(), "[a-zA-Z0-9 ]{0,30}")
            .prop_map(|(call, out)| Message::tool_result(&call, out)),
    ]
}

fn arb_tools_sender() -> impl Strategy<Value = ToolsSender> {
    prop_oneof![
        Just(ToolsSender::None),
        Just(ToolsSender::Coder),
        Just(ToolsSender::MathsReasoner),
        Just(ToolsSender::Researcher),
    ]
}

fn arb_tool_phase() -> impl Strategy<Value = ToolPhase> {
    prop_oneof![Just(ToolPhase::NoToolsYet), Just(ToolPhase::ToolsUsed)]
}

fn arb_state() -> impl Strategy<Value = ConversationState> {
    (
        proptest::collection::vec(arb_message(), 0..8),
        arb_tools_sender(),
        arb_tool_phase(),
    )
        .prop_map(|(messages, tools_sender, tool_phase)| ConversationState {
            messages,
            tools_sender,
            tool_phase,
        })
}

fn arb_delta() -> impl Strategy<Value = StateDelta> {
    (
        proptest::collection::vec(arb_message(), 0..4),
        proptest::option::of(arb_tools_sender()),
        proptest::option::of(arb_tool_phase()),
    )
        .prop_map(|(append, tools_sender, tool_phase)| StateDelta {
            append,
            tools_sender,
            tool_phase,
        })
}

fn arb_node() -> impl Strategy<Value = NodeId> {
    prop_oneof![
        Just(NodeId::Supervisor),
        Just(NodeId::Enhancer),
        Just(NodeId::Greeting),
        Just(NodeId::Coder),
        Just(NodeId::MathsReasoner),
        Just(NodeId::Researcher),
        Just(NodeId::ShouldUseTools),
        Just(NodeId::Tools),
    ]
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Invariant 1: once a tool round has run, the gate always ends the run
    #[test]
    fn prop_gate_terminates_after_tool_round(mut state in arb_state()) {
        state.tool_phase = ToolPhase::ToolsUsed;
        let out = tool_gate(&state);
        prop_assert_eq!(out.next, Next::End);
        prop_assert_eq!(out.delta.tools_sender, Some(ToolsSender::None));
        prop_assert_eq!(out.delta.tool_phase, Some(ToolPhase::NoToolsYet));
    }

    // Invariant 2: the gate only routes to tools when the last message asks for them
    #[test]
    fn prop_gate_routes_to_tools_iff_pending(state in arb_state()) {
        let out = tool_gate(&state);
        let pending = state.last_message().is_some_and(Message::has_pending_tool_calls);
        let expect_tools = pending && !state.used_tools();
        prop_assert_eq!(out.next == Next::Node(NodeId::Tools), expect_tools);
        prop_assert!(NodeId::ShouldUseTools.allows(out.next));
    }

    // Invariant 3: the gate never appends messages
    #[test]
    fn prop_gate_never_appends(state in arb_state()) {
        prop_assert!(tool_gate(&state).delta.append.is_empty());
    }

    // Invariant 4: applying a delta never loses history
    #[test]
    fn prop_apply_is_append_only(state in arb_state(), delta in arb_delta()) {
        let before = state.messages.clone();
        let appended = delta.append.clone();
        let after = state.apply(delta);
        prop_assert_eq!(after.messages.len(), before.len() + appended.len());
        prop_assert_eq!(&after.messages[..before.len()], &before[..]);
        prop_assert_eq!(&after.messages[before.len()..], &appended[..]);
    }

    // Invariant 5: every node has a path to the end of the graph
    #[test]
    fn prop_every_node_reaches_end(start in arb_node()) {
        let mut frontier = vec![start];
        let mut seen = std::collections::HashSet::new();
        let mut reaches_end = false;
        while let Some(node) = frontier.pop() {
            if !seen.insert(node) {
                continue;
            }
            for next in node.successors() {
                match next {
                    Next::End => reaches_end = true,
                    Next::Node(n) => frontier.push(*n),
                }
            }
        }
        prop_assert!(reaches_end, "{} cannot reach the end", start);
    }

    // Invariant 6: supervisor output parsing never invents a route
    #[test]
    fn prop_parse_route_rejects_non_labels(label in "[a-z_]{1,16}") {
        let raw = format!(r#"{{"route": "{label}"}}"#);
        let parsed = parse_route(&raw);
        let is_label = Route::ALL.iter().any(|r| r.label() == label);
        prop_assert_eq!(parsed.is_some(), is_label);
    }
}

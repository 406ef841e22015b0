//! Property-based tests for the provider translation layer
//!
//! - Message translation never produces empty output
//! - Tool results keep their ids and order as `tool` messages
//! - Streamed text reassembles exactly, however it is chunked

use super::openai::{translate_message, OpenAIChunk, StreamAccumulator};
use super::types::{ContentBlock, LlmMessage, MessageRole};
use proptest::prelude::*;
use serde_json::json;

fn arb_text_block() -> impl Strategy<Value = ContentBlock> {
    "[a-zA-Z0-9 _.!?,]{1,60}".prop_map(|text| ContentBlock::Text { text })
}

fn arb_tool_use_block() -> impl Strategy<Value = ContentBlock> {
    ("call_[a-z0-9]{5,10}", "[a-z_]{3,20}", "[a-z0-9 ]{0,20}").prop_map(|(id, name, q)| {
        ContentBlock::ToolUse {
            id,
            name,
            input: json!({ "query": q }),
        }
    })
}

fn arb_tool_result_block() -> impl Strategy<Value = ContentBlock> {
    ("call_[a-z0-9]{5,10}", "[a-zA-Z0-9 ]{0,60}", any::<bool>()).prop_map(
        |(tool_use_id, content, is_error)| ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        },
    )
}

fn arb_message() -> impl Strategy<Value = LlmMessage> {
    prop_oneof![
        proptest::collection::vec(arb_text_block(), 0..3).prop_map(|content| LlmMessage {
            role: MessageRole::User,
            content,
        }),
        proptest::collection::vec(prop_oneof![arb_text_block(), arb_tool_use_block()], 0..4)
            .prop_map(|content| LlmMessage {
                role: MessageRole::Assistant,
                content,
            }),
        proptest::collection::vec(arb_tool_result_block(), 1..4).prop_map(|content| {
            LlmMessage {
                role: MessageRole::User,
                content,
            }
        }),
    ]
}

fn content_chunk(text: &str) -> OpenAIChunk {
    serde_json::from_value(json!({ "choices": [{ "delta": { "content": text } }] }))
        .expect("valid chunk")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn prop_translate_never_empty(msg in arb_message()) {
        prop_assert!(!translate_message(&msg).is_empty());
    }

    #[test]
    fn prop_tool_results_become_tool_messages(
        results in proptest::collection::vec(arb_tool_result_block(), 1..5)
    ) {
        let expected: Vec<String> = results
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.clone()),
                _ => None,
            })
            .collect();
        let msg = LlmMessage { role: MessageRole::User, content: results };

        let out = translate_message(&msg);
        prop_assert_eq!(out.len(), expected.len());
        for (translated, id) in out.iter().zip(&expected) {
            prop_assert_eq!(translated.role.as_str(), "tool");
            prop_assert_eq!(translated.tool_call_id.as_deref(), Some(id.as_str()));
        }
    }

    #[test]
    fn prop_stream_text_reassembles(parts in proptest::collection::vec("[a-zA-Z0-9 ]{0,12}", 1..10)) {
        let mut acc = StreamAccumulator::default();
        let mut forwarded = String::new();
        for part in &parts {
            if let Some(delta) = acc.push(content_chunk(part)) {
                forwarded.push_str(&delta);
            }
        }
        let response = acc.finish().expect("stream had choices");
        prop_assert_eq!(&forwarded, &parts.concat());
        prop_assert_eq!(response.text(), parts.concat());
    }
}

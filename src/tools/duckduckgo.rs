//! DuckDuckGo search tool (Instant Answer API, no key required)

use super::{fetch_json, query_schema, QueryInput, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde_json::Value;

const API_URL: &str = "https://api.duckduckgo.com/";
const MAX_TOPICS: usize = 5;

pub struct DuckDuckGoTool;

fn non_empty(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// Related topics may be nested one level under named groups
fn collect_topics<'a>(topics: &'a Value, out: &mut Vec<&'a str>) {
    let Some(items) = topics.as_array() else {
        return;
    };
    for item in items {
        if out.len() >= MAX_TOPICS {
            return;
        }
        if let Some(text) = non_empty(&item["Text"]) {
            out.push(text);
        } else if item["Topics"].is_array() {
            collect_topics(&item["Topics"], out);
        }
    }
}

fn format_answer(body: &Value) -> String {
    let mut snippets: Vec<String> = Vec::new();

    if let Some(answer) = non_empty(&body["Answer"]) {
        snippets.push(answer.to_string());
    }
    if let Some(abstract_text) = non_empty(&body["AbstractText"]) {
        match non_empty(&body["AbstractSource"]) {
            Some(source) => snippets.push(format!("{abstract_text} (source: {source})")),
            None => snippets.push(abstract_text.to_string()),
        }
    }
    if let Some(definition) = non_empty(&body["Definition"]) {
        snippets.push(definition.to_string());
    }

    let mut topics = Vec::new();
    collect_topics(&body["RelatedTopics"], &mut topics);
    snippets.extend(topics.into_iter().map(str::to_string));

    if snippets.is_empty() {
        return "No good DuckDuckGo Search Result was found".to_string();
    }
    snippets.join("\n")
}

#[async_trait]
impl Tool for DuckDuckGoTool {
    fn name(&self) -> &'static str {
        "duck_duck_search_tool"
    }

    fn description(&self) -> String {
        "Performs a web search using DuckDuckGo and returns relevant results. \
Useful for general web information, alternative sources, or quick factual answers."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        query_schema("What to search DuckDuckGo for")
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let query = match QueryInput::parse(input) {
            Ok(q) => q,
            Err(out) => return out,
        };
        let params = [
            ("q", query.as_str()),
            ("format", "json"),
            ("no_html", "1"),
            ("skip_disambig", "1"),
        ];
        match fetch_json(&ctx, API_URL, &params).await {
            Ok(body) => ToolOutput::success(format_answer(&body)),
            Err(e) => ToolOutput::error(e),
        }
    }
}

//! Web search tool backed by the Tavily search API

use super::{query_schema, QueryInput, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const TAVILY_URL: &str = "https://api.tavily.com/search";
const MAX_RESULTS: u32 = 5;

pub struct WebSearchTool {
    api_key: String,
}

impl WebSearchTool {
    pub fn new(api_key: String) -> Self {
        Self { api_key }
    }

    async fn search(&self, query: &str, ctx: &ToolContext) -> Result<TavilyResponse, String> {
        let body = TavilyRequest {
            query,
            max_results: MAX_RESULTS,
            topic: "general",
        };
        let request = ctx
            .http
            .post(TAVILY_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        let response = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return Err("[search cancelled]".to_string()),
            result = request => result.map_err(|e| format!("Tavily request failed: {e}"))?,
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(format!("Tavily returned HTTP {status}: {detail}"));
        }
        response
            .json()
            .await
            .map_err(|e| format!("Invalid Tavily response: {e}"))
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: u32,
    topic: &'a str,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

fn format_results(response: &TavilyResponse) -> String {
    let mut blocks = Vec::new();
    if let Some(answer) = response.answer.as_deref().filter(|a| !a.is_empty()) {
        blocks.push(format!("Answer: {answer}"));
    }
    for result in &response.results {
        blocks.push(format!(
            "Title: {}\nURL: {}\nContent: {}",
            result.title, result.url, result.content
        ));
    }
    if blocks.is_empty() {
        return "No good search result was found".to_string();
    }
    blocks.join("\n\n")
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search_tool"
    }

    fn description(&self) -> String {
        "Perform a web search for the given query and return relevant information. \
Useful for up-to-date facts, recent events, uncommon topics, or any external data \
you do not already know."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        query_schema("What to search the web for")
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let query = match QueryInput::parse(input) {
            Ok(q) => q,
            Err(out) => return out,
        };
        match self.search(&query, &ctx).await {
            Ok(response) => ToolOutput::success(format_results(&response)),
            Err(e) => ToolOutput::error(e),
        }
    }
}

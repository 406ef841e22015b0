//! Wikipedia search tool

use super::{fetch_json, query_schema, QueryInput, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde_json::Value;

const API_URL: &str = "https://en.wikipedia.org/w/api.php";
const TOP_K_RESULTS: &str = "3";
const MAX_CHARS: usize = 4000;

pub struct WikipediaTool;

/// Page titles from a `list=search` response, in rank order
fn search_titles(body: &Value) -> Vec<String> {
    body["query"]["search"]
        .as_array()
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| hit["title"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// `(title, extract)` pairs from a `prop=extracts` response, ordered like `titles`
fn page_summaries(body: &Value, titles: &[String]) -> Vec<(String, String)> {
    let Some(pages) = body["query"]["pages"].as_object() else {
        return Vec::new();
    };
    let mut found: Vec<(String, String)> = pages
        .values()
        .filter_map(|page| {
            let title = page["title"].as_str()?;
            let extract = page["extract"].as_str().unwrap_or_default().trim();
            Some((title.to_string(), extract.to_string()))
        })
        .collect();
    found.sort_by_key(|(title, _)| titles.iter().position(|t| t == title).unwrap_or(usize::MAX));
    found
}

fn format_pages(pages: &[(String, String)]) -> String {
    let text = pages
        .iter()
        .filter(|(_, summary)| !summary.is_empty())
        .map(|(title, summary)| format!("Page: {title}\nSummary: {summary}"))
        .collect::<Vec<_>>()
        .join("\n\n");
    if text.is_empty() {
        return "No good Wikipedia Search Result was found".to_string();
    }
    text.chars().take(MAX_CHARS).collect()
}

async fn lookup(query: &str, ctx: &ToolContext) -> Result<String, String> {
    let search = fetch_json(
        ctx,
        API_URL,
        &[
            ("action", "query"),
            ("list", "search"),
            ("srsearch", query),
            ("srlimit", TOP_K_RESULTS),
            ("format", "json"),
        ],
    )
    .await?;

    let titles = search_titles(&search);
    if titles.is_empty() {
        return Ok(format_pages(&[]));
    }

    let joined = titles.join("|");
    let extracts = fetch_json(
        ctx,
        API_URL,
        &[
            ("action", "query"),
            ("prop", "extracts"),
            ("exintro", "1"),
            ("explaintext", "1"),
            ("redirects", "1"),
            ("titles", joined.as_str()),
            ("format", "json"),
        ],
    )
    .await?;

    Ok(format_pages(&page_summaries(&extracts, &titles)))
}

#[async_trait]
impl Tool for WikipediaTool {
    fn name(&self) -> &'static str {
        "wikipedia_search_tool"
    }

    fn description(&self) -> String {
        "Searches Wikipedia for the given query and returns summaries of the most relevant pages. \
Useful for general knowledge, historical facts, definitions, or topic overviews."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        query_schema("Topic to look up on Wikipedia")
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let query = match QueryInput::parse(input) {
            Ok(q) => q,
            Err(out) => return out,
        };
        match lookup(&query, &ctx).await {
            Ok(text) => ToolOutput::success(text),
            Err(e) => ToolOutput::error(e),
        }
    }
}

//! Tool implementations available to the specialists
//!
//! Tools are stateless singletons; everything a call needs arrives through
//! [`ToolContext`].

mod calculator;
mod duckduckgo;
mod pubmed;
mod python;
mod web_search;
mod wikipedia;

pub use calculator::CalculatorTool;
pub use duckduckgo::DuckDuckGoTool;
pub use pubmed::PubMedTool;
pub use python::PythonTool;
pub use web_search::WebSearchTool;
pub use wikipedia::WikipediaTool;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("conductor/", env!("CARGO_PKG_VERSION"));

/// Result from tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
        }
    }
}

/// All context needed for a tool invocation.
///
/// Created fresh for each tool call. Tools derive everything from it.
#[derive(Clone)]
pub struct ToolContext {
    /// Cancellation signal of the run that requested the call
    pub cancel: CancellationToken,

    /// The thread this call executes within
    pub thread_id: String,

    /// Shared outbound HTTP client
    pub http: reqwest::Client,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken, thread_id: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            cancel,
            thread_id: thread_id.into(),
            http,
        }
    }
}

/// Trait for tools that can be executed by a specialist
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Tool description for LLM
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Execute the tool.
    ///
    /// Long-running work should watch `ctx.cancel` and stop promptly.
    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput;
}

/// Input shared by every search-style tool
#[derive(Debug, Deserialize)]
struct QueryInput {
    query: String,
}

impl QueryInput {
    fn parse(input: Value) -> Result<String, ToolOutput> {
        let parsed: QueryInput = serde_json::from_value(input)
            .map_err(|e| ToolOutput::error(format!("Invalid input: {e}")))?;
        let query = parsed.query.trim();
        if query.is_empty() {
            return Err(ToolOutput::error("Query cannot be empty"));
        }
        Ok(query.to_string())
    }
}

fn query_schema(description: &str) -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["query"],
        "properties": {
            "query": {
                "type": "string",
                "description": description
            }
        }
    })
}

/// GET a JSON document, racing the request against cancellation
async fn fetch_json(
    ctx: &ToolContext,
    url: &str,
    params: &[(&str, &str)],
) -> Result<Value, String> {
    let request = ctx.http.get(url).query(params).send();
    let response = tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => return Err("[request cancelled]".to_string()),
        result = request => result.map_err(|e| format!("Request failed: {e}"))?,
    };

    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {status} from {url}"));
    }
    response
        .json()
        .await
        .map_err(|e| format!("Invalid response from {url}: {e}"))
}

/// GET a text document, racing the request against cancellation
async fn fetch_text(
    ctx: &ToolContext,
    url: &str,
    params: &[(&str, &str)],
) -> Result<String, String> {
    let request = ctx.http.get(url).query(params).send();
    let response = tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => return Err("[request cancelled]".to_string()),
        result = request => result.map_err(|e| format!("Request failed: {e}"))?,
    };

    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {status} from {url}"));
    }
    response
        .text()
        .await
        .map_err(|e| format!("Invalid response from {url}: {e}"))
}

/// Build the HTTP client tools share
pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
}

/// Settings that decide which tools exist and how they run
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub tavily_api_key: Option<String>,
    pub python_bin: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            tavily_api_key: None,
            python_bin: PathBuf::from("python3"),
        }
    }
}

impl ToolsConfig {
    pub fn from_env() -> Self {
        Self {
            tavily_api_key: std::env::var("TAVILY_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            python_bin: std::env::var("PYTHON_BIN")
                .map_or_else(|_| PathBuf::from("python3"), PathBuf::from),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolRegistryError {
    #[error("tool already registered: {0}")]
    DuplicateName(String),
}

/// Collection of tools available to specialists
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard arsenal. Tavily is included only when it has a key.
    pub fn standard(config: &ToolsConfig) -> Result<Self, ToolRegistryError> {
        let mut registry = Self::empty();
        if let Some(key) = &config.tavily_api_key {
            registry.register(Arc::new(WebSearchTool::new(key.clone())))?;
        }
        registry.register(Arc::new(WikipediaTool))?;
        registry.register(Arc::new(DuckDuckGoTool))?;
        registry.register(Arc::new(PubMedTool))?;
        registry.register(Arc::new(PythonTool::new(config.python_bin.clone())))?;
        registry.register(Arc::new(CalculatorTool))?;
        Ok(registry)
    }

    /// Add a tool; names must be unique
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolRegistryError> {
        if self.get(tool.name()).is_some() {
            return Err(ToolRegistryError::DuplicateName(tool.name().to_string()));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Get all tool definitions for LLM
    pub fn definitions(&self) -> Vec<crate::llm::ToolDefinition> {
        self.tools
            .iter()
            .map(|t| crate::llm::ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Execute a tool by name; `None` when no such tool exists
    pub async fn execute(&self, name: &str, input: Value, ctx: ToolContext) -> Option<ToolOutput> {
        let tool = self.get(name)?;
        Some(tool.run(input, ctx).await)
    }
}

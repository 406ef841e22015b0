//! Conductor - a multi-agent chat orchestrator
//!
//! A supervisor model routes each user turn to a specialist (coder, maths
//! reasoner, researcher) or a conversational node. Specialists may run one
//! round of tools before answering. Replies stream over Server-Sent Events
//! and every thread's transcript is checkpointed in SQLite.

mod api;
mod db;
mod llm;
mod prompts;
mod runtime;
mod state_machine;
mod tools;

use api::{create_router, AppState};
use db::Database;
use llm::{LlmConfig, ModelRegistry};
use runtime::{
    DatabaseCheckpointStore, Orchestrator, OrchestratorConfig, RegistryLlmClient, ThreadManager,
    ToolRegistryExecutor, DEFAULT_MAX_STEPS,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tools::{ToolRegistry, ToolsConfig};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Pick up API keys from a local .env before anything reads the environment
    let dotenv_path = dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conductor=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    if let Some(path) = dotenv_path {
        tracing::info!(path = %path.display(), "Loaded environment file");
    }

    // Configuration
    let db_path = std::env::var("CONDUCTOR_DB_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.conductor/conductor.db")
    });

    let port: u16 = std::env::var("CONDUCTOR_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    let max_steps: usize = std::env::var("CONDUCTOR_MAX_STEPS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|&s| s > 0)
        .unwrap_or(DEFAULT_MAX_STEPS);

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Initialize database
    tracing::info!(path = %db_path, "Opening database");
    let db = Database::open(&db_path)?;

    // Initialize LLM registry
    let llm_config = LlmConfig::from_env();
    let llm_registry = Arc::new(ModelRegistry::new(&llm_config)?);

    if llm_registry.has_models() {
        tracing::info!(
            models = ?llm_registry.available_models(),
            default = %llm_registry.default_model_id(),
            "LLM registry initialized"
        );
    } else {
        tracing::warn!(
            "No LLM API keys configured. Set GROQ_API_KEY, OPENAI_API_KEY or LLM_BASE_URL."
        );
    }

    // Initialize tools
    let tools_config = ToolsConfig::from_env();
    let tool_registry = ToolRegistry::standard(&tools_config)?;
    tracing::info!(tools = ?tool_registry.names(), "Tool registry initialized");
    if tools_config.tavily_api_key.is_none() {
        tracing::warn!("TAVILY_API_KEY not set; web_search_tool is disabled");
    }

    // Wire the orchestrator
    let llm_client = RegistryLlmClient::new(
        llm_registry.clone(),
        llm_registry.default_model_id().to_string(),
    );
    let tool_executor = ToolRegistryExecutor::new(tool_registry, tools::http_client()?);
    let orchestrator = Orchestrator::new(
        llm_client,
        tool_executor,
        OrchestratorConfig { max_steps },
    );
    let threads = ThreadManager::new(orchestrator, DatabaseCheckpointStore::new(db));

    // Create application state
    let state = AppState::new(threads);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new().gzip(true).br(true);

    let app = create_router(state)
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(max_steps, "Conductor server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

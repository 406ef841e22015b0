//! Model registry for managing available LLM providers

use super::{LlmError, LlmService, LoggingService, OpenAiCompatService, RetryingService};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const GROQ_MODELS: &[&str] = &["llama-3.3-70b-versatile", "llama-3.1-8b-instant"];
const OPENAI_MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini"];

/// Configuration for LLM providers
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub groq_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    /// Any `OpenAI`-compatible gateway, e.g. `http://localhost:11434/v1`
    pub base_url: Option<String>,
    /// Default model ID
    pub default_model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            groq_api_key: non_empty_var("GROQ_API_KEY"),
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            base_url: non_empty_var("LLM_BASE_URL"),
            default_model: non_empty_var("DEFAULT_MODEL"),
        }
    }

    /// Which provider the configuration selects, if any.
    ///
    /// An explicit base URL wins; otherwise Groq is preferred over `OpenAI`.
    pub fn provider(&self) -> Option<Provider> {
        if self.base_url.is_some() {
            Some(Provider::Gateway)
        } else if self.groq_api_key.is_some() {
            Some(Provider::Groq)
        } else if self.openai_api_key.is_some() {
            Some(Provider::OpenAi)
        } else {
            None
        }
    }

    fn api_key(&self, provider: Provider) -> String {
        match provider {
            Provider::Groq => self.groq_api_key.clone(),
            Provider::OpenAi => self.openai_api_key.clone(),
            // Gateways may handle auth themselves
            Provider::Gateway => self
                .groq_api_key
                .clone()
                .or_else(|| self.openai_api_key.clone())
                .or_else(|| Some("implicit".to_string())),
        }
        .unwrap_or_default()
    }

    fn base_url(&self, provider: Provider) -> &str {
        match provider {
            Provider::Groq => GROQ_BASE_URL,
            Provider::OpenAi => OPENAI_BASE_URL,
            Provider::Gateway => self.base_url.as_deref().unwrap_or(OPENAI_BASE_URL),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Upstream API family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Groq,
    OpenAi,
    Gateway,
}

impl Provider {
    /// Models known to be served by this provider
    fn catalog(self) -> &'static [&'static str] {
        match self {
            Provider::Groq => GROQ_MODELS,
            Provider::OpenAi => OPENAI_MODELS,
            Provider::Gateway => &[],
        }
    }
}

/// Registry of available LLM models
pub struct ModelRegistry {
    services: HashMap<String, Arc<dyn LlmService>>,
    default_model: String,
}

impl ModelRegistry {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let mut services: HashMap<String, Arc<dyn LlmService>> = HashMap::new();
        let default_model = config
            .default_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        if let Some(provider) = config.provider() {
            let api_key = config.api_key(provider);
            let base_url = config.base_url(provider);

            let mut model_ids: Vec<&str> = provider.catalog().to_vec();
            if !model_ids.contains(&default_model.as_str()) {
                model_ids.push(&default_model);
            }

            for model_id in model_ids {
                let service = OpenAiCompatService::new(api_key.clone(), base_url, model_id)?;
                services.insert(model_id.to_string(), Self::layer(Arc::new(service)));
            }

            tracing::info!(
                ?provider,
                base_url,
                default_model = %default_model,
                "LLM provider configured"
            );
        }

        Ok(Self {
            services,
            default_model,
        })
    }

    /// Wrap a raw provider with retry and logging
    fn layer(service: Arc<dyn LlmService>) -> Arc<dyn LlmService> {
        let retrying: Arc<dyn LlmService> = Arc::new(RetryingService::new(service));
        Arc::new(LoggingService::new(retrying))
    }

    /// Get a model by ID
    pub fn get(&self, model_id: &str) -> Option<Arc<dyn LlmService>> {
        self.services.get(model_id).cloned()
    }

    /// Get the default model
    pub fn default(&self) -> Option<Arc<dyn LlmService>> {
        self.get(&self.default_model)
    }

    pub fn default_model_id(&self) -> &str {
        &self.default_model
    }

    /// List all available model IDs
    pub fn available_models(&self) -> Vec<String> {
        let mut models: Vec<_> = self.services.keys().cloned().collect();
        models.sort();
        models
    }

    pub fn has_models(&self) -> bool {
        !self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_api_keys_no_models() {
        let registry = ModelRegistry::new(&LlmConfig::default()).unwrap();
        assert!(!registry.has_models());
        assert!(registry.default().is_none());
        assert_eq!(registry.default_model_id(), DEFAULT_MODEL);
    }

    #[test]
    fn test_groq_key_registers_groq_catalog() {
        let config = LlmConfig {
            groq_api_key: Some("gsk-test".to_string()),
            ..Default::default()
        };
        assert_eq!(config.provider(), Some(Provider::Groq));

        let registry = ModelRegistry::new(&config).unwrap();
        assert_eq!(
            registry.available_models(),
            vec!["llama-3.1-8b-instant", "llama-3.3-70b-versatile"]
        );
        assert_eq!(
            registry.default().map(|s| s.model_id().to_string()),
            Some(DEFAULT_MODEL.to_string())
        );
    }

    #[test]
    fn test_groq_preferred_over_openai() {
        let config = LlmConfig {
            groq_api_key: Some("gsk".to_string()),
            openai_api_key: Some("sk".to_string()),
            ..Default::default()
        };
        assert_eq!(config.provider(), Some(Provider::Groq));
    }

    #[test]
    fn test_custom_default_model_is_registered() {
        let config = LlmConfig {
            openai_api_key: Some("sk-test".to_string()),
            default_model: Some("gpt-4.1".to_string()),
            ..Default::default()
        };
        let registry = ModelRegistry::new(&config).unwrap();
        assert_eq!(registry.default_model_id(), "gpt-4.1");
        assert!(registry.get("gpt-4.1").is_some());
        assert!(registry.get("gpt-4o-mini").is_some());
    }

    #[test]
    fn test_gateway_without_keys_uses_implicit_auth() {
        let config = LlmConfig {
            base_url: Some("http://localhost:11434/v1".to_string()),
            default_model: Some("llama3".to_string()),
            ..Default::default()
        };
        assert_eq!(config.provider(), Some(Provider::Gateway));
        assert_eq!(config.api_key(Provider::Gateway), "implicit");
        assert_eq!(config.base_url(Provider::Gateway), "http://localhost:11434/v1");

        let registry = ModelRegistry::new(&config).unwrap();
        assert_eq!(registry.available_models(), vec!["llama3"]);
    }
}

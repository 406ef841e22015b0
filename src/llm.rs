//! LLM provider abstraction
//!
//! Every node talks to the model through [`LlmService`]. The concrete
//! provider speaks the `OpenAI` chat completions dialect; logging and retry
//! are layered on top as wrappers.

mod error;
mod openai;
mod registry;
mod types;

#[cfg(test)]
mod proptests;

pub use error::LlmError;
#[cfg(test)]
pub use error::LlmErrorKind;
pub use openai::OpenAiCompatService;
pub use registry::{LlmConfig, ModelRegistry};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Common interface for LLM providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a completion request.
    ///
    /// When `fragments` is given the provider streams and forwards each text
    /// delta as it arrives; the returned response is still the complete one.
    async fn complete(
        &self,
        request: &LlmRequest,
        fragments: Option<&FragmentSender>,
    ) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(
        &self,
        request: &LlmRequest,
        fragments: Option<&FragmentSender>,
    ) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request, fragments).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    streamed = fragments.is_some(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    end_turn = response.end_turn,
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "LLM request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Retries transient failures of non-streaming requests.
///
/// Streaming requests pass straight through: fragments may already have
/// reached the client, and a second attempt would duplicate them.
pub struct RetryingService {
    inner: Arc<dyn LlmService>,
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryingService {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        Self {
            inner,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            base_delay: Self::DEFAULT_BASE_DELAY,
        }
    }

    #[allow(dead_code)] // Used in tests
    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }
}

#[async_trait]
impl LlmService for RetryingService {
    async fn complete(
        &self,
        request: &LlmRequest,
        fragments: Option<&FragmentSender>,
    ) -> Result<LlmResponse, LlmError> {
        if fragments.is_some() {
            return self.inner.complete(request, fragments).await;
        }

        let mut attempt = 1;
        loop {
            match self.inner.complete(request, None).await {
                Err(e) if e.kind.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.base_delay * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        model = %self.inner.model_id(),
                        attempt,
                        delay_ms = %delay.as_millis(),
                        error = %e.message,
                        "Retrying LLM request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

use crate::error::OrchestratorError;
use async_trait::async_trait;

mod http;
mod mock;
mod retry;

pub use http::HttpLlmClient;
pub use mock::MockLlmClient;
pub use retry::RetryingLlmClient;

/// The single interface between the Orchestrator and any LLM provider
/// (§4.6, §6). `prompt` is the fully-assembled prompt string; the
/// implementation is responsible for whatever wire format the provider
/// expects and must return the provider's raw reply text — sanitization and
/// JSON validation happen in `prompt::validate_response`, not here.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, OrchestratorError>;
}

use super::LlmClient;
use crate::error::OrchestratorError;
use async_trait::async_trait;
use std::sync::Arc;

/// Wraps any `LlmClient` with bounded exponential back-off retry. Auth
/// errors (401/403) are never retried; rate-limit errors (429) get a longer
/// initial back-off (§2 supplemented features).
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    max_retries: u32,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, max_retries: u32) -> Self {
        Self { inner, max_retries }
    }

    fn is_auth_error(err: &str) -> bool {
        let lower = err.to_lowercase();
        lower.contains("401")
            || lower.contains("403")
            || lower.contains("authentication")
            || lower.contains("unauthorized")
            || lower.contains("forbidden")
    }

    fn is_rate_limit_error(err: &str) -> bool {
        let lower = err.to_lowercase();
        lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests")
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, OrchestratorError> {
        let mut last_err = String::new();
        let mut rate_limited = false;

        for attempt in 0..=self.max_retries {
            match self.inner.complete(prompt).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    let message = e.to_string();
                    if Self::is_auth_error(&message) {
                        tracing::error!(error = %message, "LLM auth error — not retrying");
                        return Err(e);
                    }

                    last_err = message.clone();
                    if Self::is_rate_limit_error(&message) {
                        rate_limited = true;
                    }

                    if attempt < self.max_retries {
                        let base_wait = if rate_limited { 5 } else { 1 };
                        let wait_secs = std::cmp::min(base_wait << attempt, 60);
                        tracing::warn!(
                            attempt = attempt + 1,
                            max = self.max_retries,
                            wait_s = wait_secs,
                            error = %message,
                            "LLM transient error — retrying"
                        );
                        tokio::time::sleep(std::time::Duration::from_secs(wait_secs)).await;
                    }
                }
            }
        }

        let prefix = if rate_limited { "LLM rate limit exceeded" } else { "LLM failed" };
        Err(OrchestratorError::LlmError(format!(
            "{prefix} after {} retries — last error: {last_err}",
            self.max_retries
        )))
    }
}

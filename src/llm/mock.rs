use super::LlmClient;
use crate::error::OrchestratorError;
use async_trait::async_trait;
use std::sync::Mutex;

/// A scripted `LlmClient` for tests — returns queued replies in order and
/// records every prompt it was called with.
pub struct MockLlmClient {
    replies: Mutex<Vec<Result<String, String>>>,
    call_log: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// Builds a mock whose queued responses can include simulated
    /// failures, for exercising the retry wrapper.
    pub fn with_outcomes(outcomes: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(outcomes),
            call_log: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }

    pub fn prompt_for_call(&self, n: usize) -> Option<String> {
        self.call_log.lock().unwrap().get(n).cloned()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, OrchestratorError> {
        self.call_log.lock().unwrap().push(prompt.to_string());

        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(OrchestratorError::LlmError(
                "MockLlmClient: no more programmed replies".to_string(),
            ));
        }
        match replies.remove(0) {
            Ok(reply) => Ok(reply),
            Err(e) => Err(OrchestratorError::LlmError(e)),
        }
    }
}

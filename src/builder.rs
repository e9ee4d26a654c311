use crate::config::OrchestratorConfig;
use crate::conversation::ConversationHistory;
use crate::dispatcher::{Capability, CapabilityDispatcher};
use crate::error::OrchestratorError;
use crate::llm::{LlmClient, RetryingLlmClient};
use crate::orchestrator::{Orchestrator, PromptTemplate};
use crate::registry::CapabilityRegistry;
use crate::retrieval::{Embedder, RetrievalPipeline, VectorStore};
use crate::trace::Trace;
use std::sync::Arc;

/// Fluent construction of an `Orchestrator`, modeled on the convention of
/// validating required collaborators only at `.build()` time.
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: Option<OrchestratorConfig>,
    registry: Option<CapabilityRegistry>,
    capabilities: Vec<(String, Box<dyn Capability>)>,
    llm: Option<Arc<dyn LlmClient>>,
    embedder: Option<Box<dyn Embedder>>,
    vector_store: Option<Box<dyn VectorStore>>,
    template: Option<String>,
    retry_count: Option<u32>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn registry(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Registers a capability implementation under `name`. The name must
    /// match an entry in the registry passed to `.registry()`.
    pub fn capability(mut self, name: impl Into<String>, implementation: Box<dyn Capability>) -> Self {
        self.capabilities.push((name.into(), implementation));
        self
    }

    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn embedder(mut self, embedder: Box<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn vector_store(mut self, store: Box<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Wraps the configured LLM client with automatic retry. Must be called
    /// after `.llm()`.
    pub fn retry_on_error(mut self, n: u32) -> Self {
        self.retry_count = Some(n);
        self
    }

    pub fn build(self) -> Result<Orchestrator, OrchestratorError> {
        let mut llm = self
            .llm
            .ok_or_else(|| OrchestratorError::BuildError("an LLM client is required — use .llm()".to_string()))?;
        if let Some(n) = self.retry_count {
            llm = Arc::new(RetryingLlmClient::new(llm, n));
        }

        let embedder = self
            .embedder
            .ok_or_else(|| OrchestratorError::BuildError("an embedder is required — use .embedder()".to_string()))?;
        let vector_store = self.vector_store.ok_or_else(|| {
            OrchestratorError::BuildError("a vector store is required — use .vector_store()".to_string())
        })?;

        let registry = Arc::new(self.registry.ok_or_else(|| {
            OrchestratorError::BuildError("a capability registry is required — use .registry()".to_string())
        })?);

        let mut dispatcher = CapabilityDispatcher::new(Arc::clone(&registry));
        for (name, implementation) in self.capabilities {
            dispatcher.register(name, implementation);
        }
        let dispatcher = Arc::new(dispatcher);

        let config = self.config.unwrap_or_default();
        let history = ConversationHistory::new(config.history_cap);

        Ok(Orchestrator {
            config,
            registry,
            dispatcher,
            llm,
            retrieval: RetrievalPipeline::new(embedder, vector_store),
            template: self.template.map(PromptTemplate),
            history,
            trace: Trace::new(),
        })
    }
}

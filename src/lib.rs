pub mod builder;
pub mod capabilities;
pub mod config;
pub mod conversation;
pub mod dispatcher;
pub mod dynvalue;
pub mod error;
pub mod executor;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod registry;
pub mod resolver;
pub mod retrieval;
pub mod trace;
pub mod types;

pub use builder::OrchestratorBuilder;
pub use config::OrchestratorConfig;
pub use conversation::ConversationHistory;
pub use dispatcher::{Capability, CapabilityDispatcher};
pub use dynvalue::DynValue;
pub use error::OrchestratorError;
pub use executor::{TransactionExecutor, TransactionOutcome};
pub use llm::{HttpLlmClient, LlmClient, MockLlmClient, RetryingLlmClient};
pub use orchestrator::Orchestrator;
pub use registry::CapabilityRegistry;
pub use resolver::VariableResolver;
pub use retrieval::{Embedder, MockEmbedder, MockVectorStore, RetrievalPipeline, VectorStore};
pub use trace::{Trace, TraceEntry};
pub use types::{
    CapabilityCall, CapabilityDescriptor, ConversationMessage, Event, ExecutionResult, LlmPlan, ParamSpec,
    ParamType, Query, RetrievedPassage, Role, RollbackEntry, TurnState,
};

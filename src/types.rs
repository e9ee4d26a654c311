//! Core data model — §3 of the design.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// A validated user turn. Immutable once constructed; `Query::parse` is the
/// only constructor and enforces the length/blank/UTF-8 invariants from
/// §4.7.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    pub const MIN_BYTES: usize = 5;
    pub const MAX_BYTES: usize = 2000;

    pub fn parse(raw: &str) -> Result<Self, crate::error::OrchestratorError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(crate::error::OrchestratorError::InputInvalid(
                "query is blank".to_string(),
            ));
        }
        let len = trimmed.len();
        if len < Self::MIN_BYTES {
            return Err(crate::error::OrchestratorError::InputInvalid(format!(
                "query too short: {len} bytes (min {})",
                Self::MIN_BYTES
            )));
        }
        if len > Self::MAX_BYTES {
            return Err(crate::error::OrchestratorError::InputInvalid(format!(
                "query too long: {len} bytes (max {})",
                Self::MAX_BYTES
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Collapses internal whitespace runs to a single space — the
    /// sanitization step of §4.7 step 2.
    pub fn sanitized(&self) -> String {
        self.0.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One hit from the vector store, mapped into typed fields plus a
/// passthrough metadata bag (§4.5 step 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub content: String,
    pub score: f64,
    pub source: String,
    pub category: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A capability's declared parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Int,
    Bool,
    Float,
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParamType::String => "string",
            ParamType::Int => "int",
            ParamType::Bool => "bool",
            ParamType::Float => "float",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub description: String,
}

/// Loaded once at startup, immutable for the process lifetime (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub parameters: Vec<ParamSpec>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub mutating: bool,
    #[serde(default)]
    pub rollback_capability: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

impl CapabilityDescriptor {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Produced by the LLM's plan, validated against a Descriptor before
/// dispatch (§4.2, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityCall {
    pub name: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    #[serde(default = "default_true")]
    pub critical: bool,
    #[serde(default)]
    pub depends_on: Vec<usize>,
}

fn default_true() -> bool {
    true
}

/// One executed step, carrying the post-resolution params (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub index: usize,
    pub call: CapabilityCall,
    pub success: bool,
    pub output: String,
    pub error: String,
    pub duration: Duration,
}

/// Created only when a mutating capability succeeds and reports a
/// `(parameter, old_value)` pair (§4.4.1). Stack-owned by the Transaction
/// Executor for the duration of one transaction.
#[derive(Debug, Clone)]
pub struct RollbackEntry {
    pub capability: String,
    pub parameter: String,
    pub old_value: String,
}

/// The model's structured reply, validated against the Capability Registry
/// (§4.6, §6 normative schema). Field names follow the wire schema
/// (`functions`/`execution_strategy`), not the prose names in §3, since this
/// type is the direct deserialization target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmPlan {
    pub reasoning: String,
    #[serde(default = "default_strategy")]
    pub execution_strategy: String,
    #[serde(default)]
    pub functions: Vec<CapabilityCall>,
    pub explanation: String,
}

fn default_strategy() -> String {
    "stop_on_error".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Owned by the Orchestrator; capped at a configured number of most-recent
/// entries (§3 invariant 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub results: Vec<ExecutionResult>,
}

/// Turn outcome states — mirrors §7's "surfaced as" column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnState {
    Ok,
    Error,
}

/// The final structured event delivered to the UI collaborator (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub state: TurnState,
    pub final_answer: String,
    pub first_call: Option<CapabilityCall>,
    pub first_result: Option<ExecutionResult>,
    pub all_results: Vec<ExecutionResult>,
    pub chunks_found: usize,
    pub error: Option<String>,
}

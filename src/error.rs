use thiserror::Error;

/// The error taxonomy for the orchestrator core.
///
/// Variants map 1:1 onto the error-kind table in the design: each is raised
/// by exactly one component and surfaced according to the propagation
/// policy described there — some abort a transaction and trigger rollback,
/// some are recoverable at the turn level.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("input invalid: {0}")]
    InputInvalid(String),

    #[error("retrieval failed: {0}")]
    RetrievalError(String),

    #[error("LLM call failed: {0}")]
    LlmError(String),

    #[error("LLM response invalid: {reason} (raw reply: {raw})")]
    InvalidResponse { reason: String, raw: String },

    #[error("unresolved reference to step '{step}': known steps are {known:?}")]
    UnresolvedReference { step: String, known: Vec<String> },

    #[error("unknown field '{field}' at path '{path}': available keys are {available:?}")]
    UnknownField {
        field: String,
        path: String,
        available: Vec<String>,
    },

    #[error("index {index} out of range (len {len}) at path '{path}'")]
    IndexOutOfRange {
        index: i64,
        len: usize,
        path: String,
    },

    #[error("non-integer index '{index}' at path '{path}'")]
    NonIntegerIndex { index: String, path: String },

    #[error("cannot traverse into a scalar at path '{path}'")]
    NotTraversable { path: String },

    #[error("unknown capability '{0}'")]
    UnknownCapability(String),

    #[error("type error: cannot coerce parameter '{param}' to {expected}: {value}")]
    TypeError {
        param: String,
        expected: String,
        value: String,
    },

    #[error("missing required parameter '{0}'")]
    MissingRequiredParam(String),

    #[error("capability '{name}' failed: {message}")]
    CapabilityError { name: String, message: String },

    #[error("rollback errors: {0}")]
    RollbackError(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("failed to load registry: {0}")]
    LoadError(String),

    #[error("step {index} failed: {source}{rollback}")]
    StepFailed {
        index: usize,
        #[source]
        source: Box<OrchestratorError>,
        rollback: RollbackOutcome,
    },

    #[error("build error: {0}")]
    BuildError(String),
}

/// Appended to a `StepFailed` display when rollback ran, so user-visible
/// failures always say whether rollback succeeded.
#[derive(Debug, Default, Clone)]
pub struct RollbackOutcome(pub Option<String>);

impl std::fmt::Display for RollbackOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(msg) => write!(f, " (rollback errors: {msg})"),
            None => Ok(()),
        }
    }
}

impl RollbackOutcome {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn errors(msg: String) -> Self {
        Self(Some(msg))
    }

    pub fn is_clean(&self) -> bool {
        self.0.is_none()
    }
}

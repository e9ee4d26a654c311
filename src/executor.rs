use crate::dispatcher::CapabilityDispatcher;
use crate::error::{OrchestratorError, RollbackOutcome};
use crate::resolver::VariableResolver;
use crate::types::{CapabilityCall, ExecutionResult, RollbackEntry};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Runs a plan's steps in order against a `CapabilityDispatcher`, recording
/// each mutating step's undo information on a LIFO stack and rolling it back
/// if a later step fails (§4.4).
pub struct TransactionExecutor {
    dispatcher: Arc<CapabilityDispatcher>,
    rollback_stack: Vec<RollbackEntry>,
}

/// The result of one transaction: the Execution Results accumulated so far
/// (present even when the transaction aborted partway through — S3/S4 both
/// expect the partial list alongside the error) plus the terminating error,
/// if any.
#[derive(Debug)]
pub struct TransactionOutcome {
    pub results: Vec<ExecutionResult>,
    pub error: Option<OrchestratorError>,
}

impl TransactionExecutor {
    pub fn new(dispatcher: Arc<CapabilityDispatcher>) -> Self {
        Self {
            dispatcher,
            rollback_stack: Vec::new(),
        }
    }

    /// Number of undo entries currently pending — zero once a transaction
    /// has committed cleanly or finished rolling back.
    pub fn pending_rollbacks(&self) -> usize {
        self.rollback_stack.len()
    }

    /// Executes `calls` in order, resolving `${step.path}` references
    /// against prior steps' outputs as it goes.
    ///
    /// `critical` and `depends_on` ride along on the wire but are not
    /// differentiated here: every step is treated as critical and
    /// sequential, and any failure aborts the chain and triggers rollback.
    /// `execution_strategy` is likewise accepted but not branched on — it is
    /// preserved verbatim rather than given invented ordering semantics.
    pub async fn execute(
        &mut self,
        calls: &[CapabilityCall],
        _execution_strategy: &str,
        cancel: &AtomicBool,
    ) -> TransactionOutcome {
        let mut resolver = VariableResolver::new();
        let mut results = Vec::with_capacity(calls.len());

        for (index, call) in calls.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                let rollback = self.rollback_all().await;
                return TransactionOutcome {
                    results,
                    error: Some(OrchestratorError::StepFailed {
                        index,
                        source: Box::new(OrchestratorError::Cancelled(format!(
                            "cancelled before step {index} ('{}')",
                            call.name
                        ))),
                        rollback,
                    }),
                };
            }

            let span = tracing::info_span!("step", index, capability = %call.name);
            let _guard = span.enter();

            let resolved_params = match resolver.resolve_params(&call.params) {
                Ok(params) => params,
                Err(e) => {
                    results.push(ExecutionResult {
                        index,
                        call: call.clone(),
                        success: false,
                        output: String::new(),
                        error: format!("variable resolution failed: {e}"),
                        duration: Duration::default(),
                    });
                    let rollback = self.rollback_all().await;
                    return TransactionOutcome {
                        results,
                        error: Some(OrchestratorError::StepFailed {
                            index,
                            source: Box::new(e),
                            rollback,
                        }),
                    };
                }
            };

            let started = Instant::now();
            let outcome = self
                .dispatcher
                .dispatch(&call.name, resolved_params.clone())
                .await;
            let duration = started.elapsed();

            match outcome {
                Ok(output) => {
                    resolver.record(format!("step{index}"), &output);
                    if let Some(descriptor) = self.dispatcher.registry().get(&call.name) {
                        if descriptor.mutating {
                            if let Some(rollback_capability) = &descriptor.rollback_capability {
                                if let Some(entry) =
                                    extract_rollback_entry(rollback_capability, &output)
                                {
                                    tracing::debug!(capability = %entry.capability, parameter = %entry.parameter, "rollback entry pushed");
                                    self.rollback_stack.push(entry);
                                }
                            }
                        }
                    }

                    results.push(ExecutionResult {
                        index,
                        call: with_resolved(call, resolved_params),
                        success: true,
                        output,
                        error: String::new(),
                        duration,
                    });
                }
                Err(e) => {
                    results.push(ExecutionResult {
                        index,
                        call: with_resolved(call, resolved_params),
                        success: false,
                        output: String::new(),
                        error: e.to_string(),
                        duration,
                    });

                    let rollback = self.rollback_all().await;
                    return TransactionOutcome {
                        results,
                        error: Some(OrchestratorError::StepFailed {
                            index,
                            source: Box::new(e),
                            rollback,
                        }),
                    };
                }
            }
        }

        TransactionOutcome { results, error: None }
    }

    /// Pops every pending rollback entry in LIFO order, attempting all of
    /// them even if some fail, and returns the combined outcome (§4.4.2).
    async fn rollback_all(&mut self) -> RollbackOutcome {
        let mut errors = Vec::new();

        while let Some(entry) = self.rollback_stack.pop() {
            let mut params = HashMap::new();
            params.insert("parameter".to_string(), Value::String(entry.parameter.clone()));
            params.insert("value".to_string(), Value::String(entry.old_value.clone()));

            tracing::info!(capability = %entry.capability, parameter = %entry.parameter, "rolling back");
            if let Err(e) = self.dispatcher.dispatch(&entry.capability, params).await {
                errors.push(format!("{}: {e}", entry.capability));
            }
        }

        if errors.is_empty() {
            RollbackOutcome::none()
        } else {
            RollbackOutcome::errors(errors.join("; "))
        }
    }
}

fn with_resolved(call: &CapabilityCall, resolved_params: HashMap<String, Value>) -> CapabilityCall {
    CapabilityCall {
        name: call.name.clone(),
        params: resolved_params,
        critical: call.critical,
        depends_on: call.depends_on.clone(),
    }
}

/// A mutating capability reports undo information by including
/// `"parameter"` and `"old_value"` fields in its JSON output (§4.4.1). A
/// capability that omits either field produced nothing to roll back.
fn extract_rollback_entry(rollback_capability: &str, output: &str) -> Option<RollbackEntry> {
    let parsed: Value = serde_json::from_str(output).ok()?;
    let parameter = parsed.get("parameter")?.as_str()?.to_string();
    let old_value = parsed.get("old_value")?;
    let old_value = match old_value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Some(RollbackEntry {
        capability: rollback_capability.to_string(),
        parameter,
        old_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Capability;
    use crate::registry::CapabilityRegistry;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const REGISTRY_TOML: &str = r#"
        [[capability]]
        name = "set_value"
        timeout_seconds = 5
        mutating = true
        rollback_capability = "set_value_rollback"

        [[capability.parameters]]
        name = "value"
        type = "string"
        required = true

        [[capability]]
        name = "set_value_rollback"
        timeout_seconds = 5
        mutating = false

        [[capability.parameters]]
        name = "parameter"
        type = "string"
        required = true

        [[capability.parameters]]
        name = "value"
        type = "string"
        required = true

        [[capability]]
        name = "read_value"
        timeout_seconds = 5
        mutating = false

        [[capability]]
        name = "always_fails"
        timeout_seconds = 5
        mutating = false
    "#;

    struct SetValue;
    #[async_trait]
    impl Capability for SetValue {
        async fn execute(&self, params: HashMap<String, Value>) -> Result<String, String> {
            let value = params.get("value").and_then(|v| v.as_str()).unwrap_or("");
            Ok(serde_json::json!({"parameter": "mtu", "old_value": "1500", "new_value": value}).to_string())
        }
    }

    struct RecordingRollback(Arc<Mutex<Vec<String>>>);
    #[async_trait]
    impl Capability for RecordingRollback {
        async fn execute(&self, params: HashMap<String, Value>) -> Result<String, String> {
            self.0.lock().unwrap().push(params.get("value").unwrap().to_string());
            Ok("{}".to_string())
        }
    }

    struct ReadValue;
    #[async_trait]
    impl Capability for ReadValue {
        async fn execute(&self, _params: HashMap<String, Value>) -> Result<String, String> {
            Ok(serde_json::json!({"reachable": true}).to_string())
        }
    }

    struct AlwaysFails;
    #[async_trait]
    impl Capability for AlwaysFails {
        async fn execute(&self, _params: HashMap<String, Value>) -> Result<String, String> {
            Err("boom".to_string())
        }
    }

    fn dispatcher(rollback_log: Arc<Mutex<Vec<String>>>) -> Arc<CapabilityDispatcher> {
        let registry = Arc::new(CapabilityRegistry::from_toml_str(REGISTRY_TOML).unwrap());
        let mut dispatcher = CapabilityDispatcher::new(registry);
        dispatcher.register("set_value", Box::new(SetValue));
        dispatcher.register("set_value_rollback", Box::new(RecordingRollback(rollback_log)));
        dispatcher.register("read_value", Box::new(ReadValue));
        dispatcher.register("always_fails", Box::new(AlwaysFails));
        Arc::new(dispatcher)
    }

    fn call(name: &str, critical: bool) -> CapabilityCall {
        CapabilityCall {
            name: name.to_string(),
            params: HashMap::new(),
            critical,
            depends_on: Vec::new(),
        }
    }

    #[tokio::test]
    async fn read_only_single_step_succeeds() {
        let dispatcher = dispatcher(Arc::new(Mutex::new(Vec::new())));
        let mut executor = TransactionExecutor::new(dispatcher);
        let calls = vec![call("read_value", true)];
        let cancel = AtomicBool::new(false);
        let outcome = executor.execute(&calls, "stop_on_error", &cancel).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.results[0].success);
        assert_eq!(executor.pending_rollbacks(), 0);
    }

    #[tokio::test]
    async fn variable_chaining_resolves_prior_step_output() {
        let dispatcher = dispatcher(Arc::new(Mutex::new(Vec::new())));
        let mut executor = TransactionExecutor::new(dispatcher);
        let mut second = call("read_value", true);
        second
            .params
            .insert("host".to_string(), Value::String("${step0.reachable}".to_string()));
        let calls = vec![call("read_value", true), second];
        let cancel = AtomicBool::new(false);
        let outcome = executor.execute(&calls, "stop_on_error", &cancel).await;
        assert_eq!(
            outcome.results[1].call.params.get("host"),
            Some(&Value::String("true".to_string()))
        );
    }

    #[tokio::test]
    async fn mid_chain_failure_rolls_back_prior_mutating_step() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = dispatcher(log.clone());
        let mut executor = TransactionExecutor::new(dispatcher);
        let mut first = call("set_value", true);
        first.params.insert("value".to_string(), Value::String("9000".to_string()));
        let calls = vec![first, call("always_fails", true)];
        let cancel = AtomicBool::new(false);
        let outcome = executor.execute(&calls, "stop_on_error", &cancel).await;
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results[0].success);
        assert!(!outcome.results[1].success);
        match outcome.error.unwrap() {
            OrchestratorError::StepFailed { index, rollback, .. } => {
                assert_eq!(index, 1);
                assert!(rollback.is_clean());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(executor.pending_rollbacks(), 0);
    }

    #[tokio::test]
    async fn cancellation_before_step_aborts_and_rolls_back() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = dispatcher(log.clone());
        let mut executor = TransactionExecutor::new(dispatcher);
        let mut first = call("set_value", true);
        first.params.insert("value".to_string(), Value::String("9000".to_string()));
        let calls = vec![first, call("read_value", true)];
        let cancel = AtomicBool::new(true);
        let outcome = executor.execute(&calls, "stop_on_error", &cancel).await;
        assert!(outcome.results.is_empty());
        assert!(matches!(
            outcome.error.unwrap(),
            OrchestratorError::StepFailed { source, .. } if matches!(*source, OrchestratorError::Cancelled(_))
        ));
    }

    #[tokio::test]
    async fn unknown_reference_errors_without_executing_step() {
        let dispatcher = dispatcher(Arc::new(Mutex::new(Vec::new())));
        let mut executor = TransactionExecutor::new(dispatcher);
        let mut first = call("read_value", true);
        first
            .params
            .insert("x".to_string(), Value::String("${missing.field}".to_string()));
        let calls = vec![first];
        let cancel = AtomicBool::new(false);
        let outcome = executor.execute(&calls, "stop_on_error", &cancel).await;
        assert_eq!(outcome.results.len(), 1);
        assert!(!outcome.results[0].success);
        assert!(outcome.results[0].error.contains("variable resolution failed"));
        match outcome.error.unwrap() {
            OrchestratorError::StepFailed { source, .. } => {
                assert!(matches!(*source, OrchestratorError::UnresolvedReference { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

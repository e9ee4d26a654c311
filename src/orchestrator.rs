use crate::config::OrchestratorConfig;
use crate::conversation::ConversationHistory;
use crate::dispatcher::CapabilityDispatcher;
use crate::error::OrchestratorError;
use crate::executor::{TransactionExecutor, TransactionOutcome};
use crate::llm::LlmClient;
use crate::prompt;
use crate::registry::CapabilityRegistry;
use crate::retrieval::RetrievalPipeline;
use crate::trace::Trace;
use crate::types::{Event, LlmPlan, Query, TurnState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Optional prompt template. When absent, `prompt::build_fallback_prompt` is
/// used instead (§4.6).
pub struct PromptTemplate(pub String);

/// The top-level entry point: ties retrieval, planning, and transactional
/// execution together into one turn (§4.7).
pub struct Orchestrator {
    pub(crate) config: OrchestratorConfig,
    pub(crate) registry: Arc<CapabilityRegistry>,
    pub(crate) dispatcher: Arc<CapabilityDispatcher>,
    pub(crate) llm: Arc<dyn LlmClient>,
    pub(crate) retrieval: RetrievalPipeline,
    pub(crate) template: Option<PromptTemplate>,
    pub(crate) history: ConversationHistory,
    pub(crate) trace: Trace,
}

impl Orchestrator {
    /// Lightweight reachability probe independent of the main pipeline,
    /// matching the convention of exposing a cheap liveness check alongside
    /// the primary operation (§2 supplemented features).
    pub async fn ping(&self) -> Result<(), OrchestratorError> {
        self.llm.complete("ping").await.map(|_| ())
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Runs one full turn for `raw_query` (§4.7.1). Every failure mode short
    /// of a programming bug degrades into an `Event` with `state = Error`
    /// rather than aborting the call — this mirrors the error table's
    /// "surfaced as" column, where only `LoadError` (startup) is fatal:
    /// 1. validate and sanitize the query — failure aborts with `Event.Error`
    /// 2. retrieve relevant passages — failure logs and continues with none
    /// 3. build the prompt and call the LLM — failure aborts with `Event.Error`
    /// 4. validate the LLM's plan against the Capability Registry — failure
    ///    returns the raw reply as `final_answer`
    /// 5. execute the plan transactionally, rolling back on failure
    /// 6. record the turn in conversation history and return the `Event`
    pub async fn process(&mut self, raw_query: &str) -> Event {
        let deadline = tokio::time::Instant::now() + self.config.turn_deadline;
        let cancel = Arc::new(AtomicBool::new(false));

        let mut inner = Box::pin(self.process_inner(raw_query, Arc::clone(&cancel)));
        tokio::select! {
            event = &mut inner => event,
            _ = tokio::time::sleep_until(deadline) => {
                // Flip the shared flag rather than dropping `inner`: the
                // Transaction Executor checks it at the next step boundary
                // and rolls back any mutating step already applied instead
                // of leaving kernel state changed with nothing undone (§3
                // invariant 3, §5 cancellation).
                cancel.store(true, Ordering::SeqCst);
                inner.await
            }
        }
    }

    async fn process_inner(&mut self, raw_query: &str, cancel: Arc<AtomicBool>) -> Event {
        let query = match Query::parse(raw_query) {
            Ok(query) => query,
            Err(e) => return error_event(e.to_string()),
        };
        let sanitized = query.sanitized();
        self.trace.record("query", &sanitized);

        let passages = match self.retrieval.retrieve(&sanitized, &self.config).await {
            Ok(passages) => passages,
            Err(e) => {
                self.trace.record("retrieval_error", e.to_string());
                Vec::new()
            }
        };
        self.trace.record("retrieval", format!("{} passages", passages.len()));

        let function_registry = prompt::render_function_registry(&self.registry);
        let retrieved_context = prompt::render_retrieved_context(&passages, &self.config);
        let conversation_history = prompt::render_conversation_history(&self.history);

        let full_prompt = match &self.template {
            Some(template) => prompt::render_template(
                &template.0,
                &function_registry,
                &retrieved_context,
                &conversation_history,
                &sanitized,
            ),
            None => prompt::build_fallback_prompt(
                &function_registry,
                &retrieved_context,
                &conversation_history,
                &sanitized,
            ),
        };

        let raw_reply = match self.llm.complete(&full_prompt).await {
            Ok(reply) => reply,
            Err(e) => return error_event(e.to_string()),
        };
        self.trace
            .record("llm_call", self.config.truncate_raw_reply(&raw_reply));

        let plan = match prompt::validate_response(&raw_reply, &self.registry) {
            Ok(plan) => plan,
            Err(e) => {
                return Event {
                    state: TurnState::Error,
                    final_answer: raw_reply,
                    first_call: None,
                    first_result: None,
                    all_results: Vec::new(),
                    chunks_found: passages.len(),
                    error: Some(e.to_string()),
                }
            }
        };

        // Step 7: an empty plan skips the executor entirely; the
        // explanation alone is the final answer.
        if plan.functions.is_empty() {
            let event = Event {
                state: TurnState::Ok,
                final_answer: plan.explanation.clone(),
                first_call: None,
                first_result: None,
                all_results: Vec::new(),
                chunks_found: passages.len(),
                error: None,
            };
            self.history.push_user(sanitized.clone(), Vec::new());
            self.history.push_assistant(plan.explanation.clone());
            self.trace.record("turn", format!("state={:?}", event.state));
            return event;
        }

        let TransactionOutcome { results, error } = self.execute_plan(&plan, &cancel).await;

        let final_answer = prompt::build_final_answer(
            &plan,
            &results,
            error.as_ref().map(|e| e.to_string()).as_deref(),
            &self.config,
        );

        let final_event = Event {
            state: if error.is_none() { TurnState::Ok } else { TurnState::Error },
            final_answer,
            first_call: plan.functions.first().cloned(),
            first_result: results.first().cloned(),
            all_results: results.clone(),
            chunks_found: passages.len(),
            error: error.as_ref().map(|e| e.to_string()),
        };

        // Step 9: the Execution Results ride on the user-turn message, not
        // the assistant's (§4.7).
        self.history.push_user(sanitized.clone(), results);
        self.history.push_assistant(plan.explanation.clone());
        self.trace.record("turn", format!("state={:?}", final_event.state));

        final_event
    }

    async fn execute_plan(&self, plan: &LlmPlan, cancel: &Arc<AtomicBool>) -> TransactionOutcome {
        let mut executor = TransactionExecutor::new(Arc::clone(&self.dispatcher));
        executor
            .execute(&plan.functions, &plan.execution_strategy, cancel)
            .await
    }
}

/// Builds the turn-aborting `Event` shared by the input-validation, LLM-call,
/// and deadline failure paths of `process` (§7: these surface as
/// `Event.Error`, not a propagated `Result::Err`).
fn error_event(reason: String) -> Event {
    Event {
        state: TurnState::Error,
        final_answer: String::new(),
        first_call: None,
        first_result: None,
        all_results: Vec::new(),
        chunks_found: 0,
        error: Some(reason),
    }
}

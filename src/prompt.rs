use crate::config::OrchestratorConfig;
use crate::conversation::ConversationHistory;
use crate::error::OrchestratorError;
use crate::registry::CapabilityRegistry;
use crate::types::{CapabilityDescriptor, ExecutionResult, LlmPlan, RetrievedPassage};

const FUNCTION_REGISTRY_PLACEHOLDER: &str = "{{FUNCTION_REGISTRY}}";
const RETRIEVED_CONTEXT_PLACEHOLDER: &str = "{{RETRIEVED_CONTEXT}}";
const CONVERSATION_HISTORY_PLACEHOLDER: &str = "{{CONVERSATION_HISTORY}}";
const USER_QUERY_PLACEHOLDER: &str = "{{USER_QUERY}}";

/// Renders the function registry section of the prompt: one line per
/// capability naming its parameters and whether it mutates state.
pub fn render_function_registry(registry: &CapabilityRegistry) -> String {
    registry
        .list()
        .iter()
        .map(|d| render_descriptor(d))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_descriptor(d: &CapabilityDescriptor) -> String {
    let params = d
        .parameters
        .iter()
        .map(|p| {
            format!(
                "{}: {}{}",
                p.name,
                p.param_type,
                if p.required { "" } else { " (optional)" }
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "- {name}({params}){mutating} — {description}",
        name = d.name,
        params = params,
        mutating = if d.mutating { " [mutating]" } else { "" },
        description = d.description,
    )
}

/// Renders the retrieved-passages section: numbered, with source and score,
/// content truncated to the configured bound (§4.6).
pub fn render_retrieved_context(passages: &[RetrievedPassage], config: &OrchestratorConfig) -> String {
    if passages.is_empty() {
        return "(no relevant passages retrieved)".to_string();
    }
    passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}. [{}] ({:.2}) {}", i + 1, p.source, p.score, config.truncate_output(&p.content)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_conversation_history(history: &ConversationHistory) -> String {
    if history.is_empty() {
        return "(no prior turns)".to_string();
    }
    history
        .messages()
        .iter()
        .map(|m| format!("{:?}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Substitutes all four placeholders into `template`. If the template is
/// missing one or more placeholders, the missing sections are simply never
/// inserted — callers needing a guaranteed-complete prompt should use
/// `build_fallback_prompt` instead.
pub fn render_template(
    template: &str,
    function_registry: &str,
    retrieved_context: &str,
    conversation_history: &str,
    user_query: &str,
) -> String {
    template
        .replace(FUNCTION_REGISTRY_PLACEHOLDER, function_registry)
        .replace(RETRIEVED_CONTEXT_PLACEHOLDER, retrieved_context)
        .replace(CONVERSATION_HISTORY_PLACEHOLDER, conversation_history)
        .replace(USER_QUERY_PLACEHOLDER, user_query)
}

/// Assembled when no custom template is configured — a minimal but complete
/// prompt built purely from free functions over `&str` (§4.6).
pub fn build_fallback_prompt(
    function_registry: &str,
    retrieved_context: &str,
    conversation_history: &str,
    user_query: &str,
) -> String {
    format!(
        "You are a diagnostic assistant for operators of networked infrastructure.\n\n\
         Available functions:\n{function_registry}\n\n\
         Relevant context:\n{retrieved_context}\n\n\
         Conversation so far:\n{conversation_history}\n\n\
         Operator query: {user_query}\n\n\
         Respond with a single JSON object matching the capability call schema."
    )
}

/// Strips markdown code fences (```json ... ``` or ``` ... ```) and escapes
/// bare control characters that appear inside JSON string literals, both of
/// which real LLM replies routinely include despite being asked for raw
/// JSON.
pub fn sanitize_llm_reply(raw: &str) -> String {
    let stripped = strip_code_fences(raw.trim());
    escape_bare_control_chars(&stripped)
}

fn strip_code_fences(s: &str) -> String {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.trim_start_matches('\n');
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim().to_string();
        }
        return rest.trim().to_string();
    }
    s.to_string()
}

/// Escapes raw `\n`/`\r`/`\t` bytes that occur inside JSON string literals
/// but outside of an already-escaped sequence. A naive model reply often
/// embeds a literal newline inside a `"reasoning"` string, which is invalid
/// JSON even though it reads fine to a human.
fn escape_bare_control_chars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in s.chars() {
        if in_string {
            if escaped {
                out.push(ch);
                escaped = false;
                continue;
            }
            match ch {
                '\\' => {
                    out.push(ch);
                    escaped = true;
                }
                '"' => {
                    out.push(ch);
                    in_string = false;
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(ch),
            }
        } else {
            if ch == '"' {
                in_string = true;
            }
            out.push(ch);
        }
    }
    out
}

/// Builds the user-facing final answer for a turn that ran at least one
/// capability call (§4.7 step 10): reasoning section, one ✓/✗ line per
/// step with its duration and truncated output, a warning line when the
/// transaction aborted (carrying the rollback outcome), then the
/// explanation.
pub fn build_final_answer(
    plan: &LlmPlan,
    results: &[ExecutionResult],
    warning: Option<&str>,
    config: &OrchestratorConfig,
) -> String {
    let mut sections = Vec::new();
    sections.push(format!("Reasoning: {}", plan.reasoning));

    if !results.is_empty() {
        let steps = results
            .iter()
            .map(|r| {
                let mark = if r.success { "\u{2713}" } else { "\u{2717}" };
                let body = if r.success {
                    config.truncate_output(&r.output)
                } else {
                    r.error.clone()
                };
                format!("{mark} [{}] {} ({:?}) — {body}", r.index, r.call.name, r.duration)
            })
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(steps);
    }

    if let Some(warning) = warning {
        sections.push(format!("Warning: {warning}"));
    }

    sections.push(plan.explanation.clone());
    sections.join("\n\n")
}

/// Sanitizes and parses a raw LLM reply into an `LlmPlan`, then validates
/// every referenced capability exists in the registry (§4.6).
pub fn validate_response(
    raw: &str,
    registry: &CapabilityRegistry,
) -> Result<LlmPlan, OrchestratorError> {
    let sanitized = sanitize_llm_reply(raw);

    let plan: LlmPlan = serde_json::from_str(&sanitized).map_err(|e| OrchestratorError::InvalidResponse {
        reason: e.to_string(),
        raw: sanitized.chars().take(200).collect(),
    })?;

    if plan.reasoning.trim().is_empty() {
        return Err(OrchestratorError::InvalidResponse {
            reason: "'reasoning' must be non-empty".to_string(),
            raw: sanitized.chars().take(200).collect(),
        });
    }
    if plan.explanation.trim().is_empty() {
        return Err(OrchestratorError::InvalidResponse {
            reason: "'explanation' must be non-empty".to_string(),
            raw: sanitized.chars().take(200).collect(),
        });
    }

    for call in &plan.functions {
        if registry.get(&call.name).is_none() {
            return Err(OrchestratorError::InvalidResponse {
                reason: format!("plan references unknown capability '{}'", call.name),
                raw: sanitized.chars().take(200).collect(),
            });
        }
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CapabilityRegistry;

    const REGISTRY_TOML: &str = r#"
        [[capability]]
        name = "check_tcp_health"
        description = "Probe a TCP endpoint"
    "#;

    #[test]
    fn strips_json_code_fence() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(raw), "{\"a\": 1}");
    }

    #[test]
    fn strips_bare_code_fence() {
        let raw = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(raw), "{\"a\": 1}");
    }

    #[test]
    fn escapes_bare_newline_inside_string() {
        let raw = "{\"reasoning\": \"line one\nline two\"}";
        let escaped = escape_bare_control_chars(raw);
        let parsed: serde_json::Value = serde_json::from_str(&escaped).unwrap();
        assert_eq!(parsed["reasoning"], "line one\nline two");
    }

    #[test]
    fn validate_response_accepts_known_capability() {
        let registry = CapabilityRegistry::from_toml_str(REGISTRY_TOML).unwrap();
        let raw = r#"```json
        {"reasoning": "checking", "execution_strategy": "stop_on_error",
         "functions": [{"name": "check_tcp_health", "params": {}}],
         "explanation": "probing the endpoint"}
        ```"#;
        let plan = validate_response(raw, &registry).unwrap();
        assert_eq!(plan.functions.len(), 1);
    }

    #[test]
    fn validate_response_rejects_unknown_capability() {
        let registry = CapabilityRegistry::from_toml_str(REGISTRY_TOML).unwrap();
        let raw = r#"{"reasoning": "x", "functions": [{"name": "nonexistent", "params": {}}], "explanation": "x"}"#;
        let err = validate_response(raw, &registry).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidResponse { .. }));
    }

    #[test]
    fn render_template_substitutes_all_four_placeholders() {
        let out = render_template(
            "fns:{{FUNCTION_REGISTRY}} ctx:{{RETRIEVED_CONTEXT}} hist:{{CONVERSATION_HISTORY}} q:{{USER_QUERY}}",
            "F",
            "C",
            "H",
            "Q",
        );
        assert_eq!(out, "fns:F ctx:C hist:H q:Q");
    }

    #[test]
    fn final_answer_includes_reasoning_steps_and_explanation() {
        let plan = LlmPlan {
            reasoning: "checking reachability".to_string(),
            execution_strategy: "stop_on_error".to_string(),
            functions: vec![crate::types::CapabilityCall {
                name: "check_tcp_health".to_string(),
                params: Default::default(),
                critical: true,
                depends_on: Vec::new(),
            }],
            explanation: "the endpoint is reachable".to_string(),
        };
        let results = vec![ExecutionResult {
            index: 0,
            call: plan.functions[0].clone(),
            success: true,
            output: "{\"reachable\":true}".to_string(),
            error: String::new(),
            duration: std::time::Duration::from_millis(5),
        }];
        let config = OrchestratorConfig::default();
        let answer = build_final_answer(&plan, &results, None, &config);
        assert!(answer.contains("checking reachability"));
        assert!(answer.contains("check_tcp_health"));
        assert!(answer.contains("the endpoint is reachable"));
        assert!(!answer.contains("Warning"));
    }

    #[test]
    fn final_answer_surfaces_warning_on_failure() {
        let plan = LlmPlan {
            reasoning: "x".to_string(),
            execution_strategy: "stop_on_error".to_string(),
            functions: Vec::new(),
            explanation: "x".to_string(),
        };
        let config = OrchestratorConfig::default();
        let answer = build_final_answer(&plan, &[], Some("step 0 failed"), &config);
        assert!(answer.contains("Warning: step 0 failed"));
    }
}

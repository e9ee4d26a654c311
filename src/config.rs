use std::time::Duration;

/// Tunables for one `Orchestrator` instance. Parsing these from a file or
/// CLI args is out of scope here — callers construct this directly or via
/// `Default`.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Wall-clock budget for one full turn (retrieval + LLM + execution).
    pub turn_deadline: Duration,
    /// Per-call timeout for the LLM client.
    pub llm_timeout: Duration,
    /// Number of passages requested from the vector store.
    pub retrieval_top_k: usize,
    /// Minimum similarity score a passage must clear to be kept.
    pub retrieval_min_score: f64,
    /// Number of most-recent conversation messages retained.
    pub history_cap: usize,
    /// Max characters of a capability's output kept in the prompt / logs.
    pub output_truncate_len: usize,
    /// Max characters of a raw LLM reply kept in error messages / logs.
    pub raw_reply_truncate_len: usize,
    /// Retries for the LLM call before giving up (see `llm::retry`).
    pub llm_max_retries: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            turn_deadline: Duration::from_secs(120),
            llm_timeout: Duration::from_secs(60),
            retrieval_top_k: 5,
            retrieval_min_score: 0.5,
            history_cap: 20,
            output_truncate_len: 500,
            raw_reply_truncate_len: 200,
            llm_max_retries: 2,
        }
    }
}

impl OrchestratorConfig {
    /// Truncates `s` to `output_truncate_len` characters, appending a
    /// marker when truncation occurred.
    pub fn truncate_output(&self, s: &str) -> String {
        truncate(s, self.output_truncate_len)
    }

    pub fn truncate_raw_reply(&self, s: &str) -> String {
        truncate(s, self.raw_reply_truncate_len)
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("...[truncated]");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_strings() {
        let cfg = OrchestratorConfig::default();
        let long = "x".repeat(600);
        let truncated = cfg.truncate_output(&long);
        assert!(truncated.ends_with("...[truncated]"));
        assert!(truncated.len() < long.len());
    }

    #[test]
    fn leaves_short_strings_untouched() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.truncate_output("short"), "short");
    }
}

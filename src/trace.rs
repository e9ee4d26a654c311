use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded phase of a turn — retrieval, the LLM call, or one execution
/// step. Separate from `tracing`'s spans: this is retained in-process for
/// the duration of a turn so a caller can inspect what happened without
/// wiring up a subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub phase: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Trace {
    entries: Vec<TraceEntry>,
}

impl Trace {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn record(&mut self, phase: impl Into<String>, detail: impl Into<String>) {
        let phase = phase.into();
        let detail = detail.into();
        tracing::debug!(phase = %phase, detail = %detail, "turn trace");
        self.entries.push(TraceEntry {
            phase,
            detail,
            timestamp: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn for_phase(&self, phase: &str) -> Vec<&TraceEntry> {
        self.entries.iter().filter(|e| e.phase == phase).collect()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.entries).unwrap_or_else(|_| "[]".to_string())
    }
}

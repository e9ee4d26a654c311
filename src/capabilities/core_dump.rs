use crate::dispatcher::Capability;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

/// `analyze_core_dump` — runs `gdb` in batch mode against a core file and
/// the binary that produced it, then pattern-matches every thread's
/// backtrace for common crash signatures (§4.8).
pub struct AnalyzeCoreDump;

#[async_trait]
impl Capability for AnalyzeCoreDump {
    async fn execute(&self, params: HashMap<String, Value>) -> Result<String, String> {
        let binary = params
            .get("binary_path")
            .and_then(|v| v.as_str())
            .ok_or("missing 'binary_path' parameter")?
            .to_string();
        let core = params
            .get("core_path")
            .and_then(|v| v.as_str())
            .ok_or("missing 'core_path' parameter")?
            .to_string();

        let output = tokio::process::Command::new("gdb")
            .arg("--batch")
            .arg("-ex")
            .arg("thread apply all bt full")
            .arg(&binary)
            .arg(&core)
            .output()
            .await
            .map_err(|e| format!("failed to launch gdb: {e}"))?;

        let raw = String::from_utf8_lossy(&output.stdout).to_string();
        let (signal, signal_description) = extract_signal(&raw);
        let backtrace = backtrace_lines(&raw);
        let threads = thread_headers(&raw);
        let crash_patterns = classify_backtrace(&raw);
        let crash_reason = crash_patterns
            .first()
            .map(|p| reason_for(p))
            .unwrap_or("no recognizable crash signature")
            .to_string();

        Ok(serde_json::json!({
            "signal": signal,
            "signal_description": signal_description,
            "backtrace": backtrace,
            "threads": threads,
            "crash_patterns": crash_patterns,
            "crash_reason": crash_reason,
            "debugger": "gdb",
            "core_path": core,
            "binary_path": binary,
        })
        .to_string())
    }
}

fn signal_pattern() -> Regex {
    Regex::new(r"Program terminated with signal (SIG\w+), ([^.\n]+)").unwrap()
}

fn extract_signal(raw: &str) -> (String, String) {
    match signal_pattern().captures(raw) {
        Some(caps) => (caps[1].to_string(), caps[2].trim().to_string()),
        None => ("UNKNOWN".to_string(), "signal not found in gdb output".to_string()),
    }
}

fn backtrace_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .filter(|line| line.trim_start().starts_with('#'))
        .map(|line| line.trim().to_string())
        .take(200)
        .collect()
}

fn thread_headers(raw: &str) -> Vec<String> {
    raw.lines()
        .filter(|line| line.trim_start().starts_with("Thread "))
        .map(|line| line.trim().to_string())
        .collect()
}

/// Classifies the backtrace into every crash signature it matches — a
/// single core can show more than one symptom (e.g. a failed assertion
/// during unwind after a null dereference).
fn classify_backtrace(raw: &str) -> Vec<&'static str> {
    let lower = raw.to_lowercase();
    let mut patterns = Vec::new();

    if lower.contains("sigsegv") && (lower.contains("0x0000000000000000") || lower.contains("null")) {
        patterns.push("null_deref");
    }
    if lower.contains("double free") || lower.contains("heap corruption") || lower.contains("malloc(): invalid") {
        patterns.push("heap_corruption");
    }
    if lower.contains("assertion") && lower.contains("failed") {
        patterns.push("assertion_failure");
    }
    if has_repeated_frames(&lower) {
        patterns.push("stack_overflow");
    }
    if lower.contains("sigbus") {
        patterns.push("bus_error");
    }
    if lower.contains("sigfpe") {
        patterns.push("floating_point_exception");
    }
    if lower.contains("sigill") {
        patterns.push("illegal_instruction");
    }
    patterns
}

fn reason_for(pattern: &str) -> &'static str {
    match pattern {
        "null_deref" => "dereferenced a null pointer",
        "heap_corruption" => "heap corruption or double free",
        "assertion_failure" => "an assertion failed",
        "stack_overflow" => "stack overflow (unbounded recursion)",
        "bus_error" => "bus error (misaligned or invalid memory access)",
        "floating_point_exception" => "floating point exception",
        "illegal_instruction" => "illegal instruction executed",
        _ => "no recognizable crash signature",
    }
}

/// A stack overflow shows up in a backtrace as the same function appearing
/// several times in a row — gdb's frame list repeats the recursive call
/// site. Three consecutive identical frames is enough to call it (§4.8).
fn has_repeated_frames(backtrace: &str) -> bool {
    let frame_names: Vec<&str> = backtrace
        .lines()
        .filter_map(|line| line.trim_start().strip_prefix('#').and_then(|rest| rest.split_whitespace().nth(2)))
        .collect();

    frame_names.windows(3).any(|window| window[0] == window[1] && window[1] == window[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_null_deref() {
        let bt = "Program terminated with signal SIGSEGV, Segmentation fault.\n#0 0x0000000000000000 in ?? ()";
        assert_eq!(classify_backtrace(bt), vec!["null_deref"]);
    }

    #[test]
    fn classifies_double_free() {
        let bt = "malloc(): invalid pointer\n#0 abort ()";
        assert_eq!(classify_backtrace(bt), vec!["heap_corruption"]);
    }

    #[test]
    fn classifies_unknown_when_no_signature_matches() {
        assert!(classify_backtrace("#0 main ()").is_empty());
    }

    #[test]
    fn detects_stack_overflow_from_three_repeated_frames() {
        let bt = "#0 0x1 in recurse ()\n#1 0x1 in recurse ()\n#2 0x1 in recurse ()\n#3 0x1 in recurse ()";
        assert!(classify_backtrace(bt).contains(&"stack_overflow"));
    }

    #[test]
    fn extracts_signal_and_description() {
        let raw = "Program terminated with signal SIGSEGV, Segmentation fault.\n#0 foo ()";
        let (signal, description) = extract_signal(raw);
        assert_eq!(signal, "SIGSEGV");
        assert_eq!(description, "Segmentation fault");
    }

    #[test]
    fn collects_thread_headers() {
        let raw = "Thread 2 (Thread 0x1):\n#0 foo ()\nThread 1 (Thread 0x2):\n#0 bar ()";
        assert_eq!(thread_headers(raw), vec!["Thread 2 (Thread 0x1):", "Thread 1 (Thread 0x2):"]);
    }
}

use crate::dispatcher::Capability;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

const PERSIST_FILE: &str = "/etc/sysctl.d/99-diag-orchestrator.conf";

fn parameter_pattern() -> Regex {
    Regex::new(r"^net\.[a-z0-9_.]+$").unwrap()
}

fn value_pattern() -> Regex {
    Regex::new(r"^[0-9 \t]+$").unwrap()
}

fn proc_path(parameter: &str) -> PathBuf {
    Path::new("/proc/sys").join(parameter.replace('.', "/"))
}

/// All-zero (`"0"`, `"0 0 0"`, ...) is rejected before any I/O: a zeroed
/// buffer/backlog/window sysctl disables the subsystem it tunes rather than
/// tuning it, which is never the intent of a diagnostic write (§4.8, §8).
fn is_all_zero(value: &str) -> bool {
    value.split_whitespace().all(|tok| tok.chars().all(|c| c == '0')) && !value.trim().is_empty()
}

fn validate_shape(parameter: &str, value: &str) -> Result<(), String> {
    if !parameter_pattern().is_match(parameter) {
        return Err(format!("'{parameter}' is not a valid sysctl parameter name"));
    }
    if !value_pattern().is_match(value) {
        return Err(format!("'{value}' is not a valid sysctl value"));
    }
    Ok(())
}

/// Full validation for a deliberate write (§4.8): shape plus the all-zero
/// rejection. Restoring a captured `old_value` uses `validate_shape` alone —
/// that value may legitimately have been zero before the orchestrator ever
/// touched it, and rollback must restore it faithfully.
fn validate(parameter: &str, value: &str) -> Result<(), String> {
    validate_shape(parameter, value)?;
    if is_all_zero(value) {
        return Err(format!("'{value}' is an all-zero value and is rejected"));
    }
    Ok(())
}

fn read_current(parameter: &str) -> Result<String, String> {
    std::fs::read_to_string(proc_path(parameter))
        .map(|s| s.trim().to_string())
        .map_err(|e| format!("failed to read {parameter}: {e}"))
}

fn write_current(parameter: &str, value: &str) -> Result<(), String> {
    std::fs::write(proc_path(parameter), value).map_err(|e| format!("failed to write {parameter}: {e}"))
}

/// Rewrites the drop-in persistence file with `parameter = value` set,
/// preserving any other entries, via a temp-file-plus-rename so a crash
/// mid-write never leaves a half-written config on disk.
fn persist(parameter: &str, value: &str) -> Result<(), String> {
    let existing = std::fs::read_to_string(PERSIST_FILE).unwrap_or_default();
    let mut lines: Vec<String> = existing
        .lines()
        .filter(|line| !line.trim_start().starts_with(&format!("{parameter} =")))
        .map(|line| line.to_string())
        .collect();
    lines.push(format!("{parameter} = {value}"));

    let dir = Path::new(PERSIST_FILE).parent().unwrap_or_else(|| Path::new("/tmp"));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| e.to_string())?;
    tmp.write_all(lines.join("\n").as_bytes()).map_err(|e| e.to_string())?;
    tmp.as_file().sync_all().map_err(|e| e.to_string())?;
    tmp.persist(PERSIST_FILE).map_err(|e| e.error.to_string())?;
    Ok(())
}

/// `execute_sysctl_command` — writes a runtime sysctl value and persists it
/// to the drop-in config atomically, reporting the prior value so a failed
/// later step can be rolled back (§4.8, §4.4.1).
pub struct ExecuteSysctlCommand;

#[async_trait]
impl Capability for ExecuteSysctlCommand {
    async fn execute(&self, params: HashMap<String, Value>) -> Result<String, String> {
        let parameter = params
            .get("parameter")
            .and_then(|v| v.as_str())
            .ok_or("missing 'parameter'")?
            .to_string();
        let value = params
            .get("value")
            .and_then(|v| v.as_str())
            .ok_or("missing 'value'")?
            .to_string();
        let should_persist = params.get("persist").and_then(|v| v.as_bool()).unwrap_or(false);

        validate(&parameter, &value)?;
        let old_value = read_current(&parameter)?;

        let (written_back, persist_result) = tokio::task::spawn_blocking({
            let parameter = parameter.clone();
            let value = value.clone();
            move || -> Result<(String, Result<(), String>), String> {
                write_current(&parameter, &value)?;
                let written_back = read_current(&parameter)?;
                let persist_result = if should_persist { persist(&parameter, &value) } else { Ok(()) };
                Ok((written_back, persist_result))
            }
        })
        .await
        .map_err(|e| e.to_string())??;

        if written_back != value {
            return Err(format!("write verification failed: expected '{value}', kernel now reports '{written_back}'"));
        }

        let mut body = serde_json::json!({
            "parameter": parameter,
            "old_value": old_value,
            "new_value": value,
            "success": true,
            "persisted": should_persist && persist_result.is_ok(),
        });
        if let Err(e) = &persist_result {
            body["persist_error"] = serde_json::json!(e);
        }

        Ok(body.to_string())
    }
}

/// `restore_sysctl_value` — the rollback target for
/// `execute_sysctl_command`. Writes `value` back for `parameter`.
pub struct RestoreSysctlValue;

#[async_trait]
impl Capability for RestoreSysctlValue {
    async fn execute(&self, params: HashMap<String, Value>) -> Result<String, String> {
        let parameter = params
            .get("parameter")
            .and_then(|v| v.as_str())
            .ok_or("missing 'parameter'")?
            .to_string();
        let value = params
            .get("value")
            .and_then(|v| v.as_str())
            .ok_or("missing 'value'")?
            .to_string();

        validate_shape(&parameter, &value)?;

        tokio::task::spawn_blocking({
            let parameter = parameter.clone();
            let value = value.clone();
            move || -> Result<(), String> {
                write_current(&parameter, &value)?;
                persist(&parameter, &value)
            }
        })
        .await
        .map_err(|e| e.to_string())??;

        Ok("{}".to_string())
    }
}

/// `read_sysctl_value` — read-only lookup, used by operators who just want
/// the current value without staging a change.
pub struct ReadSysctlValue;

#[async_trait]
impl Capability for ReadSysctlValue {
    async fn execute(&self, params: HashMap<String, Value>) -> Result<String, String> {
        let parameter = params
            .get("parameter")
            .and_then(|v| v.as_str())
            .ok_or("missing 'parameter'")?;
        if !parameter_pattern().is_match(parameter) {
            return Err(format!("'{parameter}' is not a valid sysctl parameter name"));
        }
        let value = read_current(parameter)?;
        Ok(serde_json::json!({ "parameter": parameter, "value": value }).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_parameter_shape() {
        assert!(parameter_pattern().is_match("net.core.somaxconn"));
        assert!(!parameter_pattern().is_match("; rm -rf /"));
        assert!(!parameter_pattern().is_match("net"));
        assert!(!parameter_pattern().is_match("vm.swappiness"));
    }

    #[test]
    fn validates_value_shape() {
        assert!(value_pattern().is_match("1024"));
        assert!(value_pattern().is_match("4096 87380 6291456"));
        assert!(!value_pattern().is_match("1024; rm -rf /"));
    }

    #[test]
    fn rejects_all_zero_values() {
        assert!(validate("net.core.rmem_max", "0").is_err());
        assert!(validate("net.core.rmem_max", "0 0 0").is_err());
        assert!(validate("net.core.rmem_max", "6291456").is_ok());
    }
}

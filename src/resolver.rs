use crate::dynvalue::DynValue;
use crate::error::OrchestratorError;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

/// Matches a whole-value placeholder: the entire string is `${step.path}`
/// with nothing else around it — these resolve to the native JSON type
/// instead of a string (§4.3).
fn whole_value_pattern() -> Regex {
    Regex::new(r"^\$\{([A-Za-z0-9_]+)((?:\.[A-Za-z0-9_\-]+)*)\}$").unwrap()
}

/// Matches any `${step.path}` occurrence, for interpolation into a larger
/// string.
fn interpolation_pattern() -> Regex {
    Regex::new(r"\$\{([A-Za-z0-9_]+)((?:\.[A-Za-z0-9_\-]+)*)\}").unwrap()
}

/// Records each capability step's output under its name and resolves
/// `${step_name.path}` references against those recordings (§4.3).
#[derive(Debug, Default)]
pub struct VariableResolver {
    recorded: HashMap<String, DynValue>,
}

impl VariableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a step's output under `step_name`, parsing it as JSON first
    /// if it looks like a JSON document, otherwise storing it as a bare
    /// string.
    pub fn record(&mut self, step_name: impl Into<String>, output: &str) {
        let value = match serde_json::from_str::<Value>(output) {
            Ok(json) => DynValue::from_json(&json),
            Err(_) => DynValue::Str(output.to_string()),
        };
        self.recorded.insert(step_name.into(), value);
    }

    pub fn contains_placeholders(s: &str) -> bool {
        interpolation_pattern().is_match(s)
    }

    fn lookup(&self, step: &str, path: &str) -> Result<&DynValue, OrchestratorError> {
        let mut current = self.recorded.get(step).ok_or_else(|| {
            OrchestratorError::UnresolvedReference {
                step: step.to_string(),
                known: self.recorded.keys().cloned().collect(),
            }
        })?;

        if path.is_empty() {
            return Ok(current);
        }

        let mut so_far = step.to_string();
        for segment in path.trim_start_matches('.').split('.') {
            so_far.push('.');
            so_far.push_str(segment);
            current = current.step(segment, &so_far)?;
        }
        Ok(current)
    }

    /// Resolves a single parameter value. A value that is *entirely* one
    /// placeholder returns the native JSON type it refers to; a value with
    /// a placeholder embedded in other text gets string-interpolated.
    /// Maps and lists are traversed recursively so a placeholder nested
    /// inside either is still substituted (§4.3).
    pub fn resolve(&self, raw: &Value) -> Result<Value, OrchestratorError> {
        let s = match raw {
            Value::String(s) => s,
            Value::Array(items) => {
                return items.iter().map(|item| self.resolve(item)).collect::<Result<Vec<_>, _>>().map(Value::Array);
            }
            Value::Object(map) => {
                return map
                    .iter()
                    .map(|(k, v)| self.resolve(v).map(|resolved| (k.clone(), resolved)))
                    .collect::<Result<serde_json::Map<_, _>, _>>()
                    .map(Value::Object);
            }
            _ => return Ok(raw.clone()),
        };

        if let Some(caps) = whole_value_pattern().captures(s) {
            let step = &caps[1];
            let path = &caps[2];
            return Ok(self.lookup(step, path)?.to_json());
        }

        if !Self::contains_placeholders(s) {
            return Ok(raw.clone());
        }

        let mut result = String::with_capacity(s.len());
        let mut last_end = 0;
        for caps in interpolation_pattern().captures_iter(s) {
            let whole = caps.get(0).unwrap();
            result.push_str(&s[last_end..whole.start()]);
            let step = &caps[1];
            let path = &caps[2];
            let value = self.lookup(step, path)?;
            result.push_str(&value.as_interpolated_string());
            last_end = whole.end();
        }
        result.push_str(&s[last_end..]);
        Ok(Value::String(result))
    }

    /// Resolves every value in a parameter map.
    pub fn resolve_params(
        &self,
        raw: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, OrchestratorError> {
        raw.iter()
            .map(|(k, v)| self.resolve(v).map(|resolved| (k.clone(), resolved)))
            .collect()
    }
}

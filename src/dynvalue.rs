//! A tagged JSON-ish value used as the Variable Resolver's internal
//! representation of a capability's recorded output.
//!
//! `serde_json::Value` would work too, but path traversal wants exhaustive
//! case analysis so a bad step in `${step.path}` produces a precise error
//! (`UnknownField`, `IndexOutOfRange`, `NonIntegerIndex`, `NotTraversable`)
//! instead of a generic "not an object" message. `DynValue` is that
//! exhaustive match target; conversions to/from `serde_json::Value` live at
//! the boundary (recording an output, handing a resolved value back to the
//! dispatcher).

use crate::error::OrchestratorError;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum DynValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<DynValue>),
    Map(BTreeMap<String, DynValue>),
}

impl DynValue {
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => DynValue::Null,
            serde_json::Value::Bool(b) => DynValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DynValue::Int(i)
                } else {
                    DynValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => DynValue::Str(s.clone()),
            serde_json::Value::Array(items) => {
                DynValue::List(items.iter().map(DynValue::from_json).collect())
            }
            serde_json::Value::Object(map) => DynValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), DynValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DynValue::Null => serde_json::Value::Null,
            DynValue::Bool(b) => serde_json::Value::Bool(*b),
            DynValue::Int(i) => serde_json::json!(i),
            DynValue::Float(f) => serde_json::json!(f),
            DynValue::Str(s) => serde_json::Value::String(s.clone()),
            DynValue::List(items) => {
                serde_json::Value::Array(items.iter().map(DynValue::to_json).collect())
            }
            DynValue::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Renders the value the way an interpolated placeholder should:
    /// strings pass through bare, everything else uses its JSON text.
    pub fn as_interpolated_string(&self) -> String {
        match self {
            DynValue::Str(s) => s.clone(),
            DynValue::Null => "null".to_string(),
            DynValue::Bool(b) => b.to_string(),
            DynValue::Int(i) => i.to_string(),
            DynValue::Float(f) => f.to_string(),
            _ => self.to_json().to_string(),
        }
    }

    /// Steps one dot-segment of a `${step.path}` reference. `path_so_far`
    /// is only used to make error messages point at the exact segment that
    /// failed, not the whole reference.
    pub fn step(&self, segment: &str, path_so_far: &str) -> Result<&DynValue, OrchestratorError> {
        match self {
            DynValue::Map(map) => map.get(segment).ok_or_else(|| OrchestratorError::UnknownField {
                field: segment.to_string(),
                path: path_so_far.to_string(),
                available: map.keys().cloned().collect(),
            }),
            DynValue::List(items) => match segment.parse::<i64>() {
                Ok(idx) => {
                    let resolved = if idx < 0 { idx + items.len() as i64 } else { idx };
                    if resolved < 0 || resolved as usize >= items.len() {
                        Err(OrchestratorError::IndexOutOfRange {
                            index: idx,
                            len: items.len(),
                            path: path_so_far.to_string(),
                        })
                    } else {
                        Ok(&items[resolved as usize])
                    }
                }
                Err(_) => Err(OrchestratorError::NonIntegerIndex {
                    index: segment.to_string(),
                    path: path_so_far.to_string(),
                }),
            },
            _ => Err(OrchestratorError::NotTraversable {
                path: path_so_far.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_json() {
        let v = serde_json::json!({"a": 1, "b": [true, "x", 2.5]});
        let dyn_v = DynValue::from_json(&v);
        assert_eq!(dyn_v.to_json(), v);
    }

    #[test]
    fn steps_into_map_and_list() {
        let v = DynValue::from_json(&serde_json::json!({"items": [10, 20, 30]}));
        let items = v.step("items", "items").unwrap();
        let third = items.step("2", "items.2").unwrap();
        assert_eq!(*third, DynValue::Int(30));
    }

    #[test]
    fn unknown_field_lists_available_keys() {
        let v = DynValue::from_json(&serde_json::json!({"a": 1, "b": 2}));
        let err = v.step("c", "c").unwrap_err();
        match err {
            OrchestratorError::UnknownField { available, .. } => {
                assert!(available.contains(&"a".to_string()));
                assert!(available.contains(&"b".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

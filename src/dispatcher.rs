use crate::error::OrchestratorError;
use crate::registry::CapabilityRegistry;
use crate::types::ParamType;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One concrete capability implementation. Stateless and `Send + Sync` so a
/// single `CapabilityDispatcher` can be shared across parallel steps.
#[async_trait::async_trait]
pub trait Capability: Send + Sync {
    async fn execute(&self, params: HashMap<String, Value>) -> Result<String, String>;
}

/// Dispatches a resolved `CapabilityCall` to its registered implementation,
/// coercing parameters to the types declared in the Capability Registry and
/// enforcing the descriptor's timeout (§4.2).
pub struct CapabilityDispatcher {
    registry: Arc<CapabilityRegistry>,
    impls: HashMap<String, Box<dyn Capability>>,
}

impl CapabilityDispatcher {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            impls: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, implementation: Box<dyn Capability>) {
        self.impls.insert(name.into(), implementation);
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Coerces `raw` params to the types the descriptor declares, filling in
    /// defaults for missing optional parameters and erroring on missing
    /// required ones or values that cannot be coerced. Parameters the
    /// descriptor doesn't declare (e.g. a list/object the `ParamType`
    /// vocabulary can't express) pass through untouched rather than being
    /// dropped — declaring a type is how a parameter opts into validation,
    /// not a requirement to appear at all.
    fn coerce_params(
        &self,
        name: &str,
        raw: HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, OrchestratorError> {
        let descriptor = self
            .registry
            .get(name)
            .ok_or_else(|| OrchestratorError::UnknownCapability(name.to_string()))?;

        let mut coerced = raw;
        for spec in &descriptor.parameters {
            match coerced.get(&spec.name) {
                Some(value) => {
                    let typed = coerce_value(&spec.name, value, spec.param_type)?;
                    coerced.insert(spec.name.clone(), typed);
                }
                None => {
                    if let Some(default) = &spec.default {
                        coerced.insert(spec.name.clone(), default.clone());
                    } else if spec.required {
                        return Err(OrchestratorError::MissingRequiredParam(spec.name.clone()));
                    }
                }
            }
        }
        Ok(coerced)
    }

    /// Looks up, coerces, and executes a capability, applying the
    /// descriptor's declared timeout.
    pub async fn dispatch(
        &self,
        name: &str,
        raw_params: HashMap<String, Value>,
    ) -> Result<String, OrchestratorError> {
        let descriptor = self
            .registry
            .get(name)
            .ok_or_else(|| OrchestratorError::UnknownCapability(name.to_string()))?
            .clone();

        let params = self.coerce_params(name, raw_params)?;

        let implementation = self
            .impls
            .get(name)
            .ok_or_else(|| OrchestratorError::UnknownCapability(name.to_string()))?;

        match tokio::time::timeout(descriptor.timeout(), implementation.execute(params)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(message)) => Err(OrchestratorError::CapabilityError {
                name: name.to_string(),
                message,
            }),
            Err(_elapsed) => Err(OrchestratorError::CapabilityError {
                name: name.to_string(),
                message: format!("timed out after {:?}", descriptor.timeout()),
            }),
        }
    }
}

fn coerce_value(param: &str, value: &Value, expected: ParamType) -> Result<Value, OrchestratorError> {
    let type_err = || OrchestratorError::TypeError {
        param: param.to_string(),
        expected: expected.to_string(),
        value: value.to_string(),
    };

    match expected {
        ParamType::String => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(_) | Value::Bool(_) => Ok(Value::String(value.to_string())),
            _ => Err(type_err()),
        },
        ParamType::Int => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::Number(n) => {
                let f = n.as_f64().ok_or_else(type_err)?;
                Ok(Value::Number((f.trunc() as i64).into()))
            }
            Value::String(s) => s
                .parse::<i64>()
                .map(|i| Value::Number(i.into()))
                .map_err(|_| type_err()),
            _ => Err(type_err()),
        },
        ParamType::Float => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => s
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(type_err),
            _ => Err(type_err()),
        },
        ParamType::Bool => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => match s.to_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(type_err()),
            },
            _ => Err(type_err()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CapabilityRegistry;

    const REGISTRY_TOML: &str = r#"
        [[capability]]
        name = "echo"
        timeout_seconds = 1

        [[capability.parameters]]
        name = "count"
        type = "int"
        required = true

        [[capability.parameters]]
        name = "loud"
        type = "bool"
        required = false
        default = false
    "#;

    struct EchoCapability;

    #[async_trait::async_trait]
    impl Capability for EchoCapability {
        async fn execute(&self, params: HashMap<String, Value>) -> Result<String, String> {
            Ok(serde_json::to_string(&params).unwrap())
        }
    }

    struct HangingCapability;

    #[async_trait::async_trait]
    impl Capability for HangingCapability {
        async fn execute(&self, _params: HashMap<String, Value>) -> Result<String, String> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok("never".to_string())
        }
    }

    fn dispatcher_with(impls: Vec<(&str, Box<dyn Capability>)>) -> CapabilityDispatcher {
        let registry = Arc::new(CapabilityRegistry::from_toml_str(REGISTRY_TOML).unwrap());
        let mut dispatcher = CapabilityDispatcher::new(registry);
        for (name, implementation) in impls {
            dispatcher.register(name, implementation);
        }
        dispatcher
    }

    #[tokio::test]
    async fn coerces_string_count_to_int() {
        let dispatcher = dispatcher_with(vec![("echo", Box::new(EchoCapability))]);
        let mut params = HashMap::new();
        params.insert("count".to_string(), Value::String("3".to_string()));
        let out = dispatcher.dispatch("echo", params).await.unwrap();
        assert!(out.contains("\"count\":3"));
    }

    #[tokio::test]
    async fn fills_in_default_for_missing_optional() {
        let dispatcher = dispatcher_with(vec![("echo", Box::new(EchoCapability))]);
        let mut params = HashMap::new();
        params.insert("count".to_string(), Value::Number(1.into()));
        let out = dispatcher.dispatch("echo", params).await.unwrap();
        assert!(out.contains("\"loud\":false"));
    }

    #[tokio::test]
    async fn missing_required_param_errors() {
        let dispatcher = dispatcher_with(vec![("echo", Box::new(EchoCapability))]);
        let err = dispatcher.dispatch("echo", HashMap::new()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingRequiredParam(p) if p == "count"));
    }

    #[tokio::test]
    async fn unknown_capability_errors() {
        let dispatcher = dispatcher_with(vec![]);
        let err = dispatcher
            .dispatch("does_not_exist", HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownCapability(_)));
    }

    #[tokio::test]
    async fn timeout_is_enforced() {
        let dispatcher = dispatcher_with(vec![("echo", Box::new(HangingCapability))]);
        let mut params = HashMap::new();
        params.insert("count".to_string(), Value::Number(1.into()));
        let err = dispatcher.dispatch("echo", params).await.unwrap_err();
        match err {
            OrchestratorError::CapabilityError { message, .. } => {
                assert!(message.contains("timed out"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

use crate::error::OrchestratorError;
use crate::types::CapabilityDescriptor;
use std::collections::HashMap;
use std::path::Path;

/// The set of capabilities the orchestrator is allowed to call, loaded once
/// at startup from a TOML document and immutable afterwards (§4.1).
///
/// Source format:
/// ```toml
/// [[capability]]
/// name = "check_tcp_health"
/// description = "Probe a TCP endpoint for reachability"
/// category = "network"
/// timeout_seconds = 10
///
/// [[capability.parameters]]
/// name = "host"
/// type = "string"
/// required = true
/// ```
#[derive(Debug, Clone, serde::Deserialize)]
struct RegistryFile {
    #[serde(rename = "capability", default)]
    capabilities: Vec<CapabilityDescriptor>,
}

/// Insertion-order-preserving: `descriptors` holds entries in declaration
/// order, `index` maps name to position for O(1) lookup (§4.1).
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    descriptors: Vec<CapabilityDescriptor>,
    index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    pub fn from_toml_str(source: &str) -> Result<Self, OrchestratorError> {
        let parsed: RegistryFile =
            toml::from_str(source).map_err(|e| OrchestratorError::LoadError(e.to_string()))?;

        let mut descriptors = Vec::with_capacity(parsed.capabilities.len());
        let mut index = HashMap::with_capacity(parsed.capabilities.len());
        for descriptor in parsed.capabilities {
            if index.contains_key(&descriptor.name) {
                return Err(OrchestratorError::LoadError(format!(
                    "duplicate capability name '{}'",
                    descriptor.name
                )));
            }
            index.insert(descriptor.name.clone(), descriptors.len());
            descriptors.push(descriptor);
        }

        Ok(Self { descriptors, index })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OrchestratorError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| OrchestratorError::LoadError(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    /// Returns capabilities in load (declaration) order, not sorted (§4.1).
    pub fn list(&self) -> Vec<&CapabilityDescriptor> {
        self.descriptors.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[capability]]
        name = "check_tcp_health"
        description = "Probe a TCP endpoint"
        category = "network"
        timeout_seconds = 10
        mutating = false

        [[capability.parameters]]
        name = "host"
        type = "string"
        required = true

        [[capability.parameters]]
        name = "port"
        type = "int"
        required = true
    "#;

    #[test]
    fn loads_capabilities_from_toml() {
        let registry = CapabilityRegistry::from_toml_str(SAMPLE).unwrap();
        assert_eq!(registry.len(), 1);
        let descriptor = registry.get("check_tcp_health").unwrap();
        assert_eq!(descriptor.parameters.len(), 2);
        assert_eq!(descriptor.timeout_seconds, 10);
    }

    #[test]
    fn rejects_duplicate_names() {
        let doubled = format!("{SAMPLE}\n{SAMPLE}");
        let err = CapabilityRegistry::from_toml_str(&doubled).unwrap_err();
        assert!(matches!(err, OrchestratorError::LoadError(_)));
    }

    #[test]
    fn unknown_capability_is_none() {
        let registry = CapabilityRegistry::from_toml_str(SAMPLE).unwrap();
        assert!(registry.get("does_not_exist").is_none());
    }

    #[test]
    fn malformed_toml_is_load_error() {
        let err = CapabilityRegistry::from_toml_str("not valid [[ toml").unwrap_err();
        assert!(matches!(err, OrchestratorError::LoadError(_)));
    }

    #[test]
    fn list_preserves_declaration_order() {
        let source = r#"
            [[capability]]
            name = "zeta_capability"
            description = "z"
            category = "network"
            timeout_seconds = 5
            mutating = false

            [[capability]]
            name = "alpha_capability"
            description = "a"
            category = "network"
            timeout_seconds = 5
            mutating = false
        "#;
        let registry = CapabilityRegistry::from_toml_str(source).unwrap();
        let names: Vec<&str> = registry.list().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["zeta_capability", "alpha_capability"]);
    }
}

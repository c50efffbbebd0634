use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;

/// A live function or sub-component reference. The engine never looks inside
/// it; it only guarantees that the same `Arc` comes back out of the render.
pub type OpaqueRef = Arc<dyn Any + Send + Sync>;

/// The caller-supplied bindings for one render: plain data variables, literal
/// string substitutions, and opaque references that must survive rendering
/// with their identity intact. Rebuilt by the host on every dependency
/// change; the engine never mutates it.
#[derive(Clone, Default)]
pub struct BindingsContext {
    variables: HashMap<String, JsonValue>,
    string_substitutions: HashMap<String, String>,
    opaque_placeholders: HashMap<String, OpaqueRef>,
}

impl BindingsContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Accepts anything the provider layer can serialize, e.g. a provider
    /// output struct.
    pub fn with_serialized(
        self,
        name: impl Into<String>,
        value: &impl Serialize,
    ) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_value(value)?;
        Ok(self.with_variable(name, json))
    }

    pub fn with_substitution(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.string_substitutions.insert(name.into(), value.into());
        self
    }

    pub fn with_opaque(mut self, name: impl Into<String>, reference: OpaqueRef) -> Self {
        self.opaque_placeholders.insert(name.into(), reference);
        self
    }

    pub fn variable(&self, name: &str) -> Option<&JsonValue> {
        self.variables.get(name)
    }

    pub fn substitution(&self, name: &str) -> Option<&str> {
        self.string_substitutions.get(name).map(String::as_str)
    }

    pub fn opaque(&self, name: &str) -> Option<&OpaqueRef> {
        self.opaque_placeholders.get(name)
    }
}

impl std::fmt::Debug for BindingsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut opaque_names: Vec<&str> = self
            .opaque_placeholders
            .keys()
            .map(String::as_str)
            .collect();
        opaque_names.sort_unstable();
        f.debug_struct("BindingsContext")
            .field("variables", &self.variables)
            .field("string_substitutions", &self.string_substitutions)
            .field("opaque_placeholders", &opaque_names)
            .finish()
    }
}

//! Host-supplied render capabilities for `callback` fields.
//!
//! A callback field renders whatever its host function returns. Schemas
//! written in YAML name the callback; the host binds the name to a function
//! through a [`CallbackRegistry`] when the schema is loaded, so nothing is
//! resolved by name at render time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{FieldsError, Result};
use crate::types::{FieldSpec, FieldType};

/// Render function of a callback field. Receives the resolved field
/// parameters as a JSON object and returns markup.
pub type CallbackFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// A named callback capability, bound or not yet bound to a host function.
#[derive(Clone)]
pub struct FieldCallback {
    name: String,
    handler: Option<CallbackFn>,
}

impl FieldCallback {
    /// A callback bound to `handler`.
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            handler: Some(Arc::new(handler)),
        }
    }

    /// A callback known only by name, as read from a schema file.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_bound(&self) -> bool {
        self.handler.is_some()
    }

    pub fn bind(&mut self, handler: CallbackFn) {
        self.handler = Some(handler);
    }

    /// Run the host function. `None` when the callback was never bound.
    pub fn invoke(&self, params: &Value) -> Option<String> {
        self.handler.as_ref().map(|handler| handler(params))
    }
}

impl fmt::Debug for FieldCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCallback")
            .field("name", &self.name)
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl PartialEq for FieldCallback {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Serialize for FieldCallback {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

impl<'de> Deserialize<'de> for FieldCallback {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(FieldCallback::named)
    }
}

/// Host functions available to callback fields, keyed by the name schema
/// files refer to them by.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    handlers: HashMap<String, CallbackFn>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host function under `name`, replacing any earlier one.
    pub fn register<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn get(&self, name: &str) -> Option<&CallbackFn> {
        self.handlers.get(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Bind every unbound callback in `fields` (recursively). Fails on the
    /// first callback name the registry does not know.
    pub fn bind_all(&self, fields: &mut [FieldSpec]) -> Result<()> {
        for field in fields.iter_mut() {
            if field.field_type == FieldType::Callback {
                if let Some(callback) = field.callback.as_mut() {
                    if !callback.is_bound() {
                        let handler = self.get(callback.name()).ok_or_else(|| {
                            FieldsError::violation(
                                &field.id,
                                format!("no host function registered for callback '{}'", callback.name()),
                            )
                        })?;
                        callback.bind(Arc::clone(handler));
                    }
                }
            }
            self.bind_all(&mut field.children)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("CallbackRegistry")
            .field("callbacks", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bound_callback_invokes_handler() {
        let cb = FieldCallback::new("shout", |params: &Value| {
            params["value"].as_str().unwrap_or_default().to_uppercase()
        });
        assert!(cb.is_bound());
        assert_eq!(cb.invoke(&json!({"value": "hi"})), Some("HI".to_string()));
    }

    #[test]
    fn named_callback_is_unbound() {
        let cb = FieldCallback::named("later");
        assert!(!cb.is_bound());
        assert_eq!(cb.invoke(&json!({})), None);
    }

    #[test]
    fn callback_serializes_as_its_name() {
        let cb = FieldCallback::new("price_widget", |_: &Value| String::new());
        let yaml = serde_yaml_ng::to_string(&cb).unwrap();
        assert_eq!(yaml.trim(), "price_widget");
        let parsed: FieldCallback = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(parsed, cb);
        assert!(!parsed.is_bound());
    }

    #[test]
    fn registry_binds_nested_callbacks() {
        let registry = CallbackRegistry::new().register("badge", |_: &Value| "<b>ok</b>".into());
        let mut fields = vec![FieldSpec::group(
            "meta",
            "Meta",
            vec![FieldSpec::callback("badge", "Badge", FieldCallback::named("badge"))],
        )];
        registry.bind_all(&mut fields).unwrap();
        let cb = fields[0].children[0].callback.as_ref().unwrap();
        assert_eq!(cb.invoke(&json!({})), Some("<b>ok</b>".to_string()));
    }

    #[test]
    fn registry_rejects_unknown_callback_name() {
        let registry = CallbackRegistry::new();
        let mut fields = vec![FieldSpec::callback(
            "widget",
            "Widget",
            FieldCallback::named("missing"),
        )];
        let err = registry.bind_all(&mut fields).unwrap_err();
        assert!(matches!(err, FieldsError::SchemaViolation { .. }));
        assert!(err.to_string().contains("missing"));
    }
}

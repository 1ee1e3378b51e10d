//! Host capabilities: reading stored values and persisting sanitized ones.
//!
//! The engine never reaches for ambient state. The host hands render a
//! [`ValueLookup`] and hands the sanitized record a [`MetaStore`].

use std::convert::Infallible;

use indexmap::IndexMap;
use metabox_fields::FieldPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Resolves the stored value at a field path. `None` means nothing stored.
pub trait ValueLookup {
    fn lookup(&self, path: &FieldPath) -> Option<Value>;
}

impl<F> ValueLookup for F
where
    F: Fn(&FieldPath) -> Option<Value>,
{
    fn lookup(&self, path: &FieldPath) -> Option<Value> {
        self(path)
    }
}

/// Where sanitized values go. One call per top-level field per save.
pub trait MetaStore {
    type Error;

    fn persist(&mut self, id: &str, value: Value) -> std::result::Result<(), Self::Error>;

    fn delete(&mut self, id: &str) -> std::result::Result<(), Self::Error>;
}

/// One persistence step derived from a sanitized record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MetaOperation {
    Persist { id: String, value: Value },
    Delete { id: String },
}

impl MetaOperation {
    pub fn id(&self) -> &str {
        match self {
            MetaOperation::Persist { id, .. } | MetaOperation::Delete { id } => id,
        }
    }
}

/// In-memory values keyed by top-level field id.
///
/// Serves as a [`ValueLookup`] (nested paths walk into the stored
/// mappings and row sequences) and as a [`MetaStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryStore {
    values: IndexMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load stored values from a JSON object of top-level id to value.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with(mut self, id: impl Into<String>, value: Value) -> Self {
        self.values.insert(id.into(), value);
        self
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.values.get(id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }
}

impl ValueLookup for MemoryStore {
    fn lookup(&self, path: &FieldPath) -> Option<Value> {
        let mut segments = path.segments().iter();
        let first = segments.next()?;
        let mut current = self.values.get(&first.id)?;
        if let Some(index) = first.index {
            current = current.get(index)?;
        }
        for segment in segments {
            current = current.get(&segment.id)?;
            if let Some(index) = segment.index {
                current = current.get(index)?;
            }
        }
        Some(current.clone())
    }
}

impl MetaStore for MemoryStore {
    type Error = Infallible;

    fn persist(&mut self, id: &str, value: Value) -> std::result::Result<(), Infallible> {
        self.values.insert(id.to_string(), value);
        Ok(())
    }

    fn delete(&mut self, id: &str) -> std::result::Result<(), Infallible> {
        self.values.shift_remove(id);
        Ok(())
    }
}

impl FromIterator<(String, Value)> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

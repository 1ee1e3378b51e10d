//! Raw submission to sanitized record.
//!
//! Keys are decoded into field paths and matched against the schema; values
//! pass through their type's rule. Repeatable rows are grouped by their
//! submitted index and renumbered in index order, so gaps and duplicates
//! left by client-side add/remove are harmless. A top-level field with no
//! matching keys is absent from the record, which the host takes as a
//! delete.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use metabox_fields::path::is_valid_id;
use metabox_fields::{FieldPath, FieldSpec, FieldType, PathSegment, Schema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::host::{MetaOperation, MetaStore};
use crate::logging::Pretty;
use crate::strategy::StrategyRegistry;

/// Submitted form data: encoded key to value, in submission order.
///
/// Values are strings, sequences, numbers, booleans or null. A mapping value
/// is read as nested keys (`{"seo": {"title": "x"}}` is `seo[title]`), and
/// a sequence of mappings as repeatable rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawSubmission(IndexMap<String, Value>);

impl RawSubmission {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from key/value pairs as a form posts them. A repeated key
    /// collects its values into a sequence.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut submission = Self::new();
        for (key, value) in pairs {
            submission.append(key, value);
        }
        submission
    }

    /// Parse a JSON object of key to value.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set `key`, replacing any earlier value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Add a value under `key`, turning a repeated key into a sequence.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let value = value.into();
        match self.0.entry(key.into()) {
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(value);
            }
            indexmap::map::Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(items) => items.push(value),
                existing => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            },
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RawSubmission {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

/// Sanitized values keyed by top-level field id, in schema order.
///
/// Groups are mappings, repeatables are sequences of row mappings. A
/// top-level field missing here was not submitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SanitizedRecord(IndexMap<String, Value>);

impl SanitizedRecord {
    pub fn get(&self, id: &str) -> Option<&Value> {
        self.0.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The record as one JSON mapping.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }

    /// One persist or delete per top-level field, in schema order.
    /// Callback fields are left to their owner and produce nothing.
    pub fn operations(&self, schema: &Schema) -> Vec<MetaOperation> {
        schema
            .fields()
            .iter()
            .filter(|field| field.field_type != FieldType::Callback)
            .map(|field| match self.0.get(&field.id) {
                Some(value) => MetaOperation::Persist {
                    id: field.id.clone(),
                    value: value.clone(),
                },
                None => MetaOperation::Delete {
                    id: field.id.clone(),
                },
            })
            .collect()
    }

    /// Issue the record's operations against a store. Returns how many were
    /// applied; stops at the first store error.
    pub fn apply<S: MetaStore>(
        &self,
        schema: &Schema,
        store: &mut S,
    ) -> std::result::Result<usize, S::Error> {
        let operations = self.operations(schema);
        for operation in &operations {
            match operation {
                MetaOperation::Persist { id, value } => store.persist(id, value.clone())?,
                MetaOperation::Delete { id } => store.delete(id)?,
            }
        }
        debug!(operations = operations.len(), "record applied to store");
        Ok(operations.len())
    }
}

/// A decoded submission key, relative to the schema level being walked.
struct Entry<'a> {
    segments: &'a [PathSegment],
    value: &'a Value,
}

impl Entry<'_> {
    fn head(&self) -> &PathSegment {
        &self.segments[0]
    }
}

/// Walks a schema over a raw submission.
pub struct Sanitizer<'a> {
    config: &'a EngineConfig,
    strategies: &'a StrategyRegistry,
}

impl<'a> Sanitizer<'a> {
    pub fn new(config: &'a EngineConfig, strategies: &'a StrategyRegistry) -> Self {
        Self { config, strategies }
    }

    pub fn sanitize(&self, schema: &Schema, raw: &RawSubmission) -> SanitizedRecord {
        let mut decoded: Vec<(FieldPath, &Value)> = Vec::with_capacity(raw.len());
        for (key, value) in raw.iter() {
            match FieldPath::decode(key) {
                Ok(path) => flatten(path, value, &mut decoded),
                Err(e) => warn!(%key, %e, "dropping malformed submission key"),
            }
        }

        let entries: Vec<Entry<'_>> = decoded
            .iter()
            .filter(|(path, _)| !path.is_empty())
            .map(|(path, value)| Entry {
                segments: path.segments(),
                value,
            })
            .collect();

        let record = SanitizedRecord(self.sanitize_level(schema.fields(), &entries));
        debug!(
            keys = raw.len(),
            fields = record.len(),
            "submission sanitized{}",
            Pretty(&record)
        );
        record
    }

    fn sanitize_level(&self, fields: &[FieldSpec], entries: &[Entry<'_>]) -> IndexMap<String, Value> {
        let mut out = IndexMap::new();
        for field in fields {
            let own: Vec<&Entry<'_>> = entries.iter().filter(|e| e.head().id == field.id).collect();
            if let Some(value) = self.sanitize_field(field, &own) {
                out.insert(field.id.clone(), value);
            }
        }
        out
    }

    fn sanitize_field(&self, field: &FieldSpec, entries: &[&Entry<'_>]) -> Option<Value> {
        match &field.field_type {
            FieldType::Callback => None,
            FieldType::Group => {
                let children: Vec<Entry<'_>> = entries
                    .iter()
                    .filter(|e| e.head().index.is_none() && e.segments.len() > 1)
                    .map(|e| Entry {
                        segments: &e.segments[1..],
                        value: e.value,
                    })
                    .collect();
                let group = self.sanitize_level(&field.children, &children);
                Some(Value::Object(group.into_iter().collect()))
            }
            FieldType::Repeatable => {
                let mut rows: BTreeMap<usize, Vec<Entry<'_>>> = BTreeMap::new();
                for e in entries {
                    if let (Some(index), true) = (e.head().index, e.segments.len() > 1) {
                        rows.entry(index).or_default().push(Entry {
                            segments: &e.segments[1..],
                            value: e.value,
                        });
                    }
                }
                if rows.is_empty() {
                    return None;
                }
                let rows = rows
                    .into_values()
                    .map(|row| {
                        let row = self.sanitize_level(&field.children, &row);
                        Value::Object(row.into_iter().collect())
                    })
                    .collect();
                Some(Value::Array(rows))
            }
            field_type => {
                let raw = leaf_value(entries)?;
                let strategy = match self.strategies.get(field_type) {
                    Some(strategy) => strategy,
                    None => {
                        debug!(field = %field.id, type_name = %field_type, "no strategy for field type, using plain text");
                        self.strategies.fallback()
                    }
                };
                Some(strategy.sanitize(&raw, self.config))
            }
        }
    }
}

/// Submitted value of a leaf: the last exact key wins; otherwise indexed
/// keys (`tags[0]`, `tags[1]`) collect into a sequence in index order.
fn leaf_value(entries: &[&Entry<'_>]) -> Option<Value> {
    let exact = entries
        .iter()
        .rev()
        .find(|e| e.segments.len() == 1 && e.head().index.is_none());
    if let Some(e) = exact {
        return Some(e.value.clone());
    }
    let indexed: BTreeMap<usize, &Value> = entries
        .iter()
        .filter(|e| e.segments.len() == 1)
        .filter_map(|e| e.head().index.map(|i| (i, e.value)))
        .collect();
    if indexed.is_empty() {
        None
    } else {
        Some(Value::Array(indexed.into_values().cloned().collect()))
    }
}

/// Expand mapping values into nested keys and sequences of mappings into
/// indexed rows. Everything else is a leaf value at `path`.
fn flatten<'v>(path: FieldPath, value: &'v Value, out: &mut Vec<(FieldPath, &'v Value)>) {
    let unindexed = path
        .segments()
        .last()
        .is_some_and(|segment| segment.index.is_none());
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if is_valid_id(key) {
                    flatten(path.child(key.clone()), nested, out);
                } else if let (Ok(index), true) = (key.parse::<usize>(), unindexed) {
                    flatten(path.with_index(index), nested, out);
                } else {
                    warn!(key = %path, nested_key = %key, "dropping malformed nested submission key");
                }
            }
        }
        Value::Array(items) if unindexed && !items.is_empty() && items.iter().all(Value::is_object) => {
            for (index, item) in items.iter().enumerate() {
                flatten(path.with_index(index), item, out);
            }
        }
        _ => out.push((path, value)),
    }
}

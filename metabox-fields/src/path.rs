//! Field paths and the flat submission key encoding.
//!
//! A [`FieldPath`] addresses one field inside a possibly nested, possibly
//! repeated schema. It encodes to the flat key a form control is named with
//! and decodes back from the key a submission arrives under:
//!
//! ```text
//! [links#2, url]   <->   links[2][url]
//! [seo, title]     <->   seo[title]
//! ```
//!
//! The first segment renders as its bare id, every later segment as `[id]`,
//! and a repeat index as `[n]` directly after the id that owns it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FieldsError, Result};

/// Characters a field id may not contain; the encoding reserves them.
pub const RESERVED_CHARS: [char; 3] = ['[', ']', '.'];

/// One step of a [`FieldPath`]: a field id, plus the row index when the
/// field is a repeatable collection addressed at one row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathSegment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl PathSegment {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            index: None,
        }
    }

    pub fn indexed(id: impl Into<String>, index: usize) -> Self {
        Self {
            id: id.into(),
            index: Some(index),
        }
    }
}

/// Address of a field within a schema walk. Built while walking, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Path to a top-level field.
    pub fn root(id: impl Into<String>) -> Self {
        Self {
            segments: vec![PathSegment::new(id)],
        }
    }

    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Extend the path by one nested field id.
    pub fn child(&self, id: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::new(id));
        Self { segments }
    }

    /// Address one row of the repeatable the path currently points at.
    pub fn with_index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        if let Some(last) = segments.last_mut() {
            last.index = Some(index);
        }
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Id of the top-level field, the key the host persists under.
    pub fn top_level_id(&self) -> Option<&str> {
        self.segments.first().map(|s| s.id.as_str())
    }

    /// Id of the addressed field.
    pub fn leaf_id(&self) -> Option<&str> {
        self.segments.last().map(|s| s.id.as_str())
    }

    /// Encode to the flat submission key, e.g. `links[2][url]`.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for (i, segment) in self.segments.iter().enumerate() {
            if i == 0 {
                out.push_str(&segment.id);
            } else {
                out.push('[');
                out.push_str(&segment.id);
                out.push(']');
            }
            if let Some(index) = segment.index {
                out.push('[');
                out.push_str(&index.to_string());
                out.push(']');
            }
        }
        out
    }

    /// Decode a flat submission key. Numeric bracket tokens are repeat
    /// indices of the preceding segment, any other token is a nested id.
    pub fn decode(key: &str) -> Result<Self> {
        let (head, mut rest) = match key.find('[') {
            Some(pos) => key.split_at(pos),
            None => (key, ""),
        };

        if head.is_empty() {
            return Err(FieldsError::malformed(key, "missing leading field id"));
        }
        if head.contains(']') {
            return Err(FieldsError::malformed(key, "unbalanced brackets"));
        }
        if is_index_token(head) {
            return Err(FieldsError::malformed(key, "leading token is a row index"));
        }
        if head.contains('.') {
            return Err(FieldsError::malformed(key, "reserved character in field id"));
        }

        let mut segments = vec![PathSegment::new(head)];

        while !rest.is_empty() {
            if !rest.starts_with('[') {
                return Err(FieldsError::malformed(key, "text outside brackets"));
            }
            let close = rest
                .find(']')
                .ok_or_else(|| FieldsError::malformed(key, "unbalanced brackets"))?;
            let token = &rest[1..close];
            rest = &rest[close + 1..];

            if token.contains('[') {
                return Err(FieldsError::malformed(key, "unbalanced brackets"));
            }
            if token.is_empty() {
                return Err(FieldsError::malformed(key, "empty bracket token"));
            }

            if is_index_token(token) {
                let index: usize = token
                    .parse()
                    .map_err(|_| FieldsError::malformed(key, "row index out of range"))?;
                // segments is never empty here
                let last = segments
                    .last_mut()
                    .ok_or_else(|| FieldsError::malformed(key, "missing leading field id"))?;
                if last.index.is_some() {
                    return Err(FieldsError::malformed(key, "consecutive row indices"));
                }
                last.index = Some(index);
            } else {
                if token.contains('.') {
                    return Err(FieldsError::malformed(key, "reserved character in field id"));
                }
                segments.push(PathSegment::new(token));
            }
        }

        Ok(Self { segments })
    }

    /// Identifier usable as a DOM id: `links[2][url]` becomes `links_2_url`.
    pub fn dom_id(&self) -> String {
        let mut parts = Vec::with_capacity(self.segments.len() * 2);
        for segment in &self.segments {
            parts.push(segment.id.clone());
            if let Some(index) = segment.index {
                parts.push(index.to_string());
            }
        }
        parts.join("_")
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for FieldPath {
    type Err = FieldsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

/// Whether `id` can be used as a field id without clashing with the encoding.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(RESERVED_CHARS) && !is_index_token(id)
}

fn is_index_token(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

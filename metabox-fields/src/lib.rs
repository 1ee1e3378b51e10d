//! Field schema and name encoding for metabox
//!
//! `metabox-fields` is the schema-only half of the engine. It owns the field
//! descriptors, the flat submission key encoding that rendering and
//! sanitizing share, and the YAML schema files a host registers. It knows
//! nothing about rendering or sanitizing values; `metabox-engine` does that.
//!
//! # Architecture
//!
//! - **Typed schema**: `FieldSpec` trees with `Group` and `Repeatable` nesting
//! - **Validated on load**: `Schema::new` and the YAML loaders reject malformed trees
//! - **Name encoding**: `FieldPath` encodes to `links[2][url]` and decodes back
//! - **Host capabilities**: callback fields carry a host-bound `FieldCallback`

pub mod callback;
pub mod context;
pub mod error;
pub mod path;
pub mod types;
pub mod validation;

pub use callback::{CallbackFn, CallbackRegistry, FieldCallback};
pub use context::{SchemaContext, SchemaContextBuilder};
pub use error::{FieldsError, Result};
pub use path::{FieldPath, PathSegment};
pub use types::{
    BoxContext, BoxPriority, Dependency, DependencyOperator, EditorSettings, FieldSpec, FieldType,
    MetaBox, Schema, SelectOption,
};
pub use validation::validate_fields;

//! Core field and meta box types for the schema.
//!
//! All types serialize to/from YAML via serde. A [`FieldSpec`] describes one
//! named, typed field; groups and repeatables nest further specs as
//! `children`. A [`Schema`] is a validated, ordered list of top-level specs,
//! and a [`MetaBox`] places a schema on the host's edit screens.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use crate::callback::{CallbackRegistry, FieldCallback};
use crate::error::{FieldsError, Result};
use crate::validation::validate_fields;

/// The type of a field, which decides how it renders and how its
/// submitted value is sanitized.
///
/// Type names outside the known set load as [`FieldType::Unknown`] so a
/// schema with a typo still renders; see the engine's fallback rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Text,
    Url,
    Color,
    Textarea,
    Editor,
    Select,
    MultiSelect,
    Image,
    Checkbox,
    Group,
    Repeatable,
    Callback,
    Unknown(String),
}

impl FieldType {
    /// Parse a type name as written in a schema file. Matching is
    /// case-insensitive; unrecognized names are kept lowercased.
    pub fn parse(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "text" => FieldType::Text,
            "url" => FieldType::Url,
            "color" => FieldType::Color,
            "textarea" => FieldType::Textarea,
            "editor" => FieldType::Editor,
            "select" | "select2" => FieldType::Select,
            "multiselect" | "multi-select" | "multi_select" => FieldType::MultiSelect,
            "image" => FieldType::Image,
            "checkbox" => FieldType::Checkbox,
            "group" => FieldType::Group,
            "repeatable" => FieldType::Repeatable,
            "callback" => FieldType::Callback,
            _ => FieldType::Unknown(name),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Text => "text",
            FieldType::Url => "url",
            FieldType::Color => "color",
            FieldType::Textarea => "textarea",
            FieldType::Editor => "editor",
            FieldType::Select => "select",
            FieldType::MultiSelect => "multi-select",
            FieldType::Image => "image",
            FieldType::Checkbox => "checkbox",
            FieldType::Group => "group",
            FieldType::Repeatable => "repeatable",
            FieldType::Callback => "callback",
            FieldType::Unknown(name) => name,
        }
    }

    /// Group and Repeatable hold child fields instead of a value.
    pub fn is_container(&self) -> bool {
        matches!(self, FieldType::Group | FieldType::Repeatable)
    }

    pub fn has_options(&self) -> bool {
        matches!(self, FieldType::Select | FieldType::MultiSelect)
    }

    /// A field holding a scalar or list-of-scalars value.
    pub fn is_leaf(&self) -> bool {
        !self.is_container() && !matches!(self, FieldType::Callback)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for FieldType {
    fn from(name: String) -> Self {
        FieldType::parse(&name)
    }
}

impl From<FieldType> for String {
    fn from(field_type: FieldType) -> Self {
        field_type.as_str().to_string()
    }
}

/// A single option in a select or multi-select field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub key: String,
    #[serde(default)]
    pub label: String,
}

impl SelectOption {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

/// Comparison a dependency applies to the field it watches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyOperator {
    #[default]
    Equals,
    NotEquals,
    In,
    NotIn,
    Empty,
    NotEmpty,
}

/// Conditional visibility: show this field only while another field's value
/// matches. Carried through to render output; the client-side layer
/// evaluates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub field: String,
    #[serde(default)]
    pub operator: DependencyOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Rich text editor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    #[serde(alias = "textarea_rows")]
    pub rows: u32,
    pub quicktags: bool,
    pub media_buttons: bool,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            rows: 8,
            quicktags: false,
            media_buttons: false,
        }
    }
}

/// One field definition.
///
/// The serialized form accepts the legacy spellings found in older schema
/// files: `desc` for `description`, `fields` for `children`, a `select2`
/// type (an enhanced select), `multiple: true` on a select and
/// `repeatable: true` on a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawFieldSpec", into = "RawFieldSpec")]
pub struct FieldSpec {
    pub id: String,
    pub label: String,
    pub field_type: FieldType,
    pub required: bool,
    pub placeholder: Option<String>,
    pub description: Option<String>,
    /// Display width; the engine's configured default applies when unset.
    pub size: Option<u32>,
    pub options: Vec<SelectOption>,
    pub children: Vec<FieldSpec>,
    pub callback: Option<FieldCallback>,
    pub dependency: Option<Dependency>,
    pub editor: Option<EditorSettings>,
    /// Select/MultiSelect only: request a searchable select widget.
    pub enhanced: bool,
}

impl FieldSpec {
    pub fn new(id: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            field_type,
            required: false,
            placeholder: None,
            description: None,
            size: None,
            options: Vec::new(),
            children: Vec::new(),
            callback: None,
            dependency: None,
            editor: None,
            enhanced: false,
        }
    }

    pub fn select<I, K, L>(id: impl Into<String>, label: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = (K, L)>,
        K: Into<String>,
        L: Into<String>,
    {
        let mut spec = Self::new(id, label, FieldType::Select);
        spec.options = options
            .into_iter()
            .map(|(key, label)| SelectOption::new(key, label))
            .collect();
        spec
    }

    pub fn multi_select<I, K, L>(id: impl Into<String>, label: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = (K, L)>,
        K: Into<String>,
        L: Into<String>,
    {
        let mut spec = Self::select(id, label, options);
        spec.field_type = FieldType::MultiSelect;
        spec
    }

    pub fn group(id: impl Into<String>, label: impl Into<String>, children: Vec<FieldSpec>) -> Self {
        let mut spec = Self::new(id, label, FieldType::Group);
        spec.children = children;
        spec
    }

    pub fn repeatable(
        id: impl Into<String>,
        label: impl Into<String>,
        children: Vec<FieldSpec>,
    ) -> Self {
        let mut spec = Self::new(id, label, FieldType::Repeatable);
        spec.children = children;
        spec
    }

    pub fn callback(id: impl Into<String>, label: impl Into<String>, callback: FieldCallback) -> Self {
        let mut spec = Self::new(id, label, FieldType::Callback);
        spec.callback = Some(callback);
        spec
    }

    pub fn with_required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependency = Some(dependency);
        self
    }

    pub fn with_editor(mut self, settings: EditorSettings) -> Self {
        self.editor = Some(settings);
        self
    }

    pub fn enhanced(mut self) -> Self {
        self.enhanced = true;
        self
    }

    /// Find a direct child by id.
    pub fn child(&self, id: &str) -> Option<&FieldSpec> {
        self.children.iter().find(|c| c.id == id)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// On-disk shape of a [`FieldSpec`], before legacy spellings are normalized.
#[derive(Serialize, Deserialize)]
struct RawFieldSpec {
    id: String,
    #[serde(default)]
    label: String,
    #[serde(rename = "type")]
    type_: String,
    #[serde(default, skip_serializing_if = "is_false")]
    required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    placeholder: Option<String>,
    #[serde(default, alias = "desc", skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size: Option<u32>,
    #[serde(default, with = "option_list", skip_serializing_if = "Vec::is_empty")]
    options: Vec<SelectOption>,
    #[serde(default, alias = "fields", skip_serializing_if = "Vec::is_empty")]
    children: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    callback: Option<FieldCallback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dependency: Option<Dependency>,
    #[serde(default, alias = "settings", skip_serializing_if = "Option::is_none")]
    editor: Option<EditorSettings>,
    #[serde(default, skip_serializing_if = "is_false")]
    enhanced: bool,
    #[serde(default, skip_serializing)]
    multiple: bool,
    #[serde(default, skip_serializing)]
    repeatable: bool,
}

impl From<RawFieldSpec> for FieldSpec {
    fn from(raw: RawFieldSpec) -> Self {
        let mut field_type = FieldType::parse(&raw.type_);
        let enhanced = raw.enhanced || raw.type_.trim().eq_ignore_ascii_case("select2");
        if raw.multiple && field_type == FieldType::Select {
            field_type = FieldType::MultiSelect;
        }
        if raw.repeatable {
            field_type = FieldType::Repeatable;
        }
        FieldSpec {
            id: raw.id,
            label: raw.label,
            field_type,
            required: raw.required,
            placeholder: raw.placeholder,
            description: raw.description,
            size: raw.size,
            options: raw.options,
            children: raw.children,
            callback: raw.callback,
            dependency: raw.dependency,
            editor: raw.editor,
            enhanced,
        }
    }
}

impl From<FieldSpec> for RawFieldSpec {
    fn from(spec: FieldSpec) -> Self {
        RawFieldSpec {
            id: spec.id,
            label: spec.label,
            type_: spec.field_type.into(),
            required: spec.required,
            placeholder: spec.placeholder,
            description: spec.description,
            size: spec.size,
            options: spec.options,
            children: spec.children,
            callback: spec.callback,
            dependency: spec.dependency,
            editor: spec.editor,
            enhanced: spec.enhanced,
            multiple: false,
            repeatable: false,
        }
    }
}

/// Options are written either as an ordered `key: label` mapping or as a
/// list of `{key, label}` entries. They serialize back as the mapping.
mod option_list {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OptionsRepr {
        Map(IndexMap<String, String>),
        List(Vec<SelectOption>),
    }

    pub fn serialize<S: Serializer>(
        options: &[SelectOption],
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let map: IndexMap<&str, &str> = options
            .iter()
            .map(|o| (o.key.as_str(), o.label.as_str()))
            .collect();
        map.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Vec<SelectOption>, D::Error> {
        Ok(match OptionsRepr::deserialize(deserializer)? {
            OptionsRepr::Map(map) => map
                .into_iter()
                .map(|(key, label)| SelectOption { key, label })
                .collect(),
            OptionsRepr::List(list) => list
                .into_iter()
                .map(|mut o| {
                    if o.label.is_empty() {
                        o.label = o.key.clone();
                    }
                    o
                })
                .collect(),
        })
    }
}

/// A validated, ordered list of top-level fields.
///
/// Only constructed through [`Schema::new`] or [`Schema::from_yaml_str`],
/// both of which run the full validation pass, so render and sanitize can
/// rely on the schema invariants.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    /// Validate and wrap a field list.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self> {
        validate_fields(&fields)?;
        debug!(fields = fields.len(), "schema validated");
        Ok(Self { fields })
    }

    /// Parse a YAML field list, bind its callbacks and validate it.
    pub fn from_yaml_str(yaml: &str, callbacks: &CallbackRegistry) -> Result<Self> {
        let mut fields: Vec<FieldSpec> = serde_yaml_ng::from_str(yaml)?;
        callbacks.bind_all(&mut fields)?;
        Self::new(fields)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Top-level field by id.
    pub fn field(&self, id: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Where on the edit screen a meta box is placed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoxContext {
    Normal,
    Side,
    #[default]
    Advanced,
}

/// Ordering of a meta box within its context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoxPriority {
    #[default]
    High,
    Core,
    Default,
    Low,
}

/// A schema together with its placement on the host's edit screens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaBox {
    pub id: String,
    pub title: String,
    /// Content types whose edit screen shows the box. Empty means all.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub post_types: Vec<String>,
    pub context: BoxContext,
    pub priority: BoxPriority,
    #[serde(rename = "fields")]
    pub schema: Schema,
}

#[derive(Deserialize)]
struct MetaBoxFile {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default, alias = "post_type", deserialize_with = "one_or_many")]
    post_types: Vec<String>,
    #[serde(default)]
    context: BoxContext,
    #[serde(default)]
    priority: BoxPriority,
    #[serde(default)]
    fields: Vec<FieldSpec>,
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(one) => vec![one],
        OneOrMany::Many(many) => many,
    })
}

impl MetaBox {
    pub fn new(id: impl Into<String>, title: impl Into<String>, schema: Schema) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            post_types: Vec::new(),
            context: BoxContext::default(),
            priority: BoxPriority::default(),
            schema,
        }
    }

    pub fn for_post_type(mut self, post_type: impl Into<String>) -> Self {
        self.post_types.push(post_type.into());
        self
    }

    pub fn with_context(mut self, context: BoxContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_priority(mut self, priority: BoxPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Parse a meta box file, bind its callbacks and validate its schema.
    pub fn from_yaml_str(yaml: &str, callbacks: &CallbackRegistry) -> Result<Self> {
        let file: MetaBoxFile = serde_yaml_ng::from_str(yaml)?;
        if file.id.trim().is_empty() {
            return Err(FieldsError::violation("<meta box>", "meta box id is empty"));
        }
        let mut fields = file.fields;
        callbacks.bind_all(&mut fields)?;
        let schema = Schema::new(fields)?;
        Ok(Self {
            id: file.id,
            title: file.title,
            post_types: file.post_types,
            context: file.context,
            priority: file.priority,
            schema,
        })
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Whether the box appears on the edit screen of `post_type`.
    pub fn shows_on(&self, post_type: &str) -> bool {
        self.post_types.is_empty() || self.post_types.iter().any(|p| p == post_type)
    }
}

//! Schema walk producing render instructions.
//!
//! The output is a tree of [`RenderNode`]s mirroring the schema. Leaf nodes
//! carry the encoded submission name, a display-escaped value and a
//! [`Control`] describing the widget; the host turns them into markup.
//!
//! Repeatables render one row per stored element, or a single blank row at
//! index 0. Rows are added and removed on the client; see [`RowTemplate`].

use metabox_fields::{Dependency, EditorSettings, FieldPath, FieldSpec, FieldType, Schema};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, trace, warn};

use crate::config::EngineConfig;
use crate::host::ValueLookup;
use crate::strategy::{LeafContext, StrategyRegistry};

fn is_false(value: &bool) -> bool {
    !*value
}

/// Identity and display flags shared by every node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMeta {
    pub id: String,
    pub label: String,
    /// Encoded submission key, e.g. `links[2][url]`
    pub name: String,
    pub dom_id: String,
    #[serde(skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency: Option<Dependency>,
}

impl FieldMeta {
    fn new(field: &FieldSpec, path: &FieldPath) -> Self {
        Self {
            id: field.id.clone(),
            label: field.label.clone(),
            name: path.encode(),
            dom_id: path.dom_id(),
            required: field.required,
            placeholder: field.placeholder.clone(),
            description: field.description.clone(),
            dependency: field.dependency.clone(),
        }
    }
}

/// One select option as rendered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionChoice {
    pub key: String,
    /// HTML-escaped label
    pub label: String,
    pub selected: bool,
}

/// Widget description for a leaf.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Control {
    Input {
        input_type: String,
    },
    Color {
        default_color: String,
    },
    Textarea {
        rows: u32,
        cols: u32,
    },
    Editor {
        settings: EditorSettings,
    },
    Select {
        options: Vec<OptionChoice>,
        multiple: bool,
        enhanced: bool,
    },
    Image {
        attachment_id: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<String>,
        /// Remove button is shown only while an attachment is set
        removable: bool,
    },
    Checkbox {
        checked_value: String,
        checked: bool,
    },
}

/// A rendered leaf field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeafInstruction {
    #[serde(flatten)]
    pub meta: FieldMeta,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub size: u32,
    /// Display-escaped value
    pub value: Value,
    pub control: Control,
}

/// One row of a repeatable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatableRow {
    pub index: usize,
    /// Encoded key of the row itself, e.g. `links[2]`
    pub name: String,
    pub children: Vec<RenderNode>,
}

/// Client-side add/remove contract for a repeatable.
///
/// "Add" duplicates row `clone_from` with leaf values cleared and every
/// embedded row index replaced by `next_index`; `blank` is that row
/// pre-rendered. "Remove" deletes one row subtree. Indices only need to be
/// distinct per row; sanitize renumbers rows in index order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowTemplate {
    pub clone_from: usize,
    pub next_index: usize,
    pub blank: RepeatableRow,
}

/// One node of the render tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum RenderNode {
    Field(LeafInstruction),
    Group {
        #[serde(flatten)]
        meta: FieldMeta,
        children: Vec<RenderNode>,
    },
    Repeatable {
        #[serde(flatten)]
        meta: FieldMeta,
        rows: Vec<RepeatableRow>,
        template: RowTemplate,
    },
    Callback {
        #[serde(flatten)]
        meta: FieldMeta,
        /// Host markup, embedded as is
        output: String,
    },
    /// A field whose type has no strategy; value uses the generic text rule
    Unsupported {
        #[serde(flatten)]
        meta: FieldMeta,
        type_name: String,
        value: Value,
    },
}

impl RenderNode {
    pub fn meta(&self) -> &FieldMeta {
        match self {
            RenderNode::Field(leaf) => &leaf.meta,
            RenderNode::Group { meta, .. }
            | RenderNode::Repeatable { meta, .. }
            | RenderNode::Callback { meta, .. }
            | RenderNode::Unsupported { meta, .. } => meta,
        }
    }

    /// Encoded submission key of the node.
    pub fn name(&self) -> &str {
        &self.meta().name
    }

    /// Display value of a leaf or unsupported node.
    pub fn value(&self) -> Option<&Value> {
        match self {
            RenderNode::Field(leaf) => Some(&leaf.value),
            RenderNode::Unsupported { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Depth-first search by encoded name, through groups and rows.
    pub fn find<'a>(nodes: &'a [RenderNode], name: &str) -> Option<&'a RenderNode> {
        for node in nodes {
            if node.name() == name {
                return Some(node);
            }
            let found = match node {
                RenderNode::Group { children, .. } => Self::find(children, name),
                RenderNode::Repeatable { rows, .. } => {
                    rows.iter().find_map(|row| Self::find(&row.children, name))
                }
                _ => None,
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }
}

/// Where a field's stored value comes from during the walk.
#[derive(Clone, Copy)]
enum Scope<'a> {
    /// Ask the host by full path
    Host(&'a dyn ValueLookup),
    /// Inside a repeatable row: read from the row's own mapping
    Row(Option<&'a Map<String, Value>>),
}

impl Scope<'_> {
    fn value_of(&self, field: &FieldSpec, path: &FieldPath) -> Option<Value> {
        match self {
            Scope::Host(lookup) => lookup.lookup(path),
            Scope::Row(row) => row.and_then(|m| m.get(&field.id)).cloned(),
        }
    }
}

/// Walks a schema into render instructions.
pub struct Renderer<'a> {
    config: &'a EngineConfig,
    strategies: &'a StrategyRegistry,
}

impl<'a> Renderer<'a> {
    pub fn new(config: &'a EngineConfig, strategies: &'a StrategyRegistry) -> Self {
        Self { config, strategies }
    }

    /// Render every field of `schema`, depth first in schema order.
    pub fn render(&self, schema: &Schema, lookup: &dyn ValueLookup) -> Vec<RenderNode> {
        let nodes = self.render_fields(schema.fields(), None, Scope::Host(lookup));
        debug!(nodes = nodes.len(), "schema rendered");
        nodes
    }

    /// A repeatable row with every value empty, at `index`.
    pub fn blank_row(&self, field: &FieldSpec, path: &FieldPath, index: usize) -> RepeatableRow {
        self.render_row(field, path, index, None)
    }

    fn render_fields(
        &self,
        fields: &[FieldSpec],
        parent: Option<&FieldPath>,
        scope: Scope<'_>,
    ) -> Vec<RenderNode> {
        fields
            .iter()
            .map(|field| {
                let path = match parent {
                    Some(p) => p.child(field.id.clone()),
                    None => FieldPath::root(field.id.clone()),
                };
                self.render_field(field, &path, scope)
            })
            .collect()
    }

    fn render_field(&self, field: &FieldSpec, path: &FieldPath, scope: Scope<'_>) -> RenderNode {
        match &field.field_type {
            FieldType::Group => {
                let stored = match scope {
                    Scope::Host(_) => None,
                    Scope::Row(_) => scope.value_of(field, path),
                };
                let child_scope = match scope {
                    Scope::Host(lookup) => Scope::Host(lookup),
                    Scope::Row(_) => Scope::Row(stored.as_ref().and_then(Value::as_object)),
                };
                RenderNode::Group {
                    meta: FieldMeta::new(field, path),
                    children: self.render_fields(&field.children, Some(path), child_scope),
                }
            }
            FieldType::Repeatable => self.render_repeatable(field, path, scope),
            FieldType::Callback => self.render_callback(field, path, scope),
            field_type => {
                let stored = scope.value_of(field, path);
                let ctx = LeafContext {
                    field,
                    path,
                    value: stored.as_ref(),
                    config: self.config,
                };
                match self.strategies.get(field_type) {
                    Some(strategy) => {
                        let out = strategy.render(&ctx);
                        trace!(name = %path, "rendered leaf");
                        RenderNode::Field(LeafInstruction {
                            meta: FieldMeta::new(field, path),
                            field_type: field_type.clone(),
                            size: field.size.unwrap_or(self.config.default_size),
                            value: out.value,
                            control: out.control,
                        })
                    }
                    None => {
                        debug!(name = %path, type_name = %field_type, "no strategy for field type");
                        let out = self.strategies.fallback().render(&ctx);
                        RenderNode::Unsupported {
                            meta: FieldMeta::new(field, path),
                            type_name: field_type.as_str().to_string(),
                            value: out.value,
                        }
                    }
                }
            }
        }
    }

    fn render_repeatable(&self, field: &FieldSpec, path: &FieldPath, scope: Scope<'_>) -> RenderNode {
        let stored = scope.value_of(field, path);
        let rows: Vec<RepeatableRow> = match stored.as_ref().and_then(Value::as_array) {
            Some(items) if !items.is_empty() => items
                .iter()
                .enumerate()
                .map(|(index, item)| self.render_row(field, path, index, item.as_object()))
                .collect(),
            _ => vec![self.render_row(field, path, 0, None)],
        };

        let clone_from = rows.last().map(|row| row.index).unwrap_or_default();
        let template = RowTemplate {
            clone_from,
            next_index: clone_from + 1,
            blank: self.blank_row(field, path, clone_from + 1),
        };
        trace!(name = %path, rows = rows.len(), "rendered repeatable");

        RenderNode::Repeatable {
            meta: FieldMeta::new(field, path),
            rows,
            template,
        }
    }

    fn render_row(
        &self,
        field: &FieldSpec,
        path: &FieldPath,
        index: usize,
        item: Option<&Map<String, Value>>,
    ) -> RepeatableRow {
        let row_path = path.with_index(index);
        RepeatableRow {
            index,
            name: row_path.encode(),
            children: self.render_fields(&field.children, Some(&row_path), Scope::Row(item)),
        }
    }

    fn render_callback(&self, field: &FieldSpec, path: &FieldPath, scope: Scope<'_>) -> RenderNode {
        let params = json!({
            "id": field.id,
            "label": field.label,
            "type": field.field_type,
            "name": path.encode(),
            "dom_id": path.dom_id(),
            "value": scope.value_of(field, path).unwrap_or(Value::Null),
            "required": field.required,
            "placeholder": field.placeholder,
            "description": field.description,
            "size": field.size.unwrap_or(self.config.default_size),
        });
        let output = match field.callback.as_ref().and_then(|cb| cb.invoke(&params)) {
            Some(output) => output,
            None => {
                warn!(name = %path, "callback field has no bound host function");
                String::new()
            }
        };
        RenderNode::Callback {
            meta: FieldMeta::new(field, path),
            output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryStore;
    use metabox_fields::FieldCallback;

    fn render(schema: &Schema, lookup: &dyn ValueLookup) -> Vec<RenderNode> {
        let config = EngineConfig::default();
        let strategies = StrategyRegistry::builtin();
        Renderer::new(&config, &strategies).render(schema, lookup)
    }

    fn links_schema() -> Schema {
        Schema::new(vec![
            FieldSpec::new("title", "Title", FieldType::Text).with_required(),
            FieldSpec::repeatable(
                "links",
                "Links",
                vec![
                    FieldSpec::new("url", "URL", FieldType::Url),
                    FieldSpec::new("label", "Label", FieldType::Text),
                ],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn leaf_carries_name_value_and_flags() {
        let store = MemoryStore::new().with("title", json!("Hello <b>"));
        let nodes = render(&links_schema(), &store);
        match &nodes[0] {
            RenderNode::Field(leaf) => {
                assert_eq!(leaf.meta.name, "title");
                assert_eq!(leaf.meta.dom_id, "title");
                assert!(leaf.meta.required);
                assert_eq!(leaf.size, 40);
                assert_eq!(leaf.value, json!("Hello &lt;b&gt;"));
                assert_eq!(
                    leaf.control,
                    Control::Input {
                        input_type: "text".into()
                    }
                );
            }
            other => panic!("expected a leaf, got {other:?}"),
        }
    }

    #[test]
    fn absent_repeatable_renders_one_blank_row() {
        let nodes = render(&links_schema(), &MemoryStore::new());
        let RenderNode::Repeatable { rows, template, .. } = &nodes[1] else {
            panic!("expected a repeatable");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].index, 0);
        assert_eq!(rows[0].children[0].name(), "links[0][url]");
        assert_eq!(rows[0].children[0].value(), Some(&json!("")));
        assert_eq!(template.clone_from, 0);
        assert_eq!(template.next_index, 1);
        assert_eq!(template.blank.children[1].name(), "links[1][label]");
    }

    #[test]
    fn non_sequence_repeatable_value_renders_blank_row() {
        for stored in [json!("oops"), json!([]), json!({"url": "x"})] {
            let store = MemoryStore::new().with("links", stored);
            let nodes = render(&links_schema(), &store);
            let RenderNode::Repeatable { rows, .. } = &nodes[1] else {
                panic!("expected a repeatable");
            };
            assert_eq!(rows.len(), 1);
        }
    }

    #[test]
    fn rows_resolve_against_their_own_element() {
        let store = MemoryStore::new().with(
            "links",
            json!([
                {"url": "https://a.example", "label": "A"},
                {"label": "<B>"},
                "not a mapping"
            ]),
        );
        let nodes = render(&links_schema(), &store);
        let RenderNode::Repeatable { rows, template, .. } = &nodes[1] else {
            panic!("expected a repeatable");
        };
        assert_eq!(rows.len(), 3);
        assert_eq!(
            RenderNode::find(&nodes, "links[0][url]").unwrap().value(),
            Some(&json!("https://a.example"))
        );
        assert_eq!(
            RenderNode::find(&nodes, "links[1][url]").unwrap().value(),
            Some(&json!(""))
        );
        assert_eq!(
            RenderNode::find(&nodes, "links[1][label]").unwrap().value(),
            Some(&json!("&lt;B&gt;"))
        );
        assert_eq!(rows[2].children[1].value(), Some(&json!("")));
        assert_eq!(template.next_index, 3);
    }

    #[test]
    fn groups_extend_paths_and_look_up_nested_values() {
        let schema = Schema::new(vec![FieldSpec::group(
            "seo",
            "SEO",
            vec![
                FieldSpec::new("title", "Title", FieldType::Text),
                FieldSpec::group(
                    "social",
                    "Social",
                    vec![FieldSpec::new("image", "Image", FieldType::Image)],
                ),
            ],
        )])
        .unwrap();
        let store = MemoryStore::new().with("seo", json!({"title": "T", "social": {"image": "12"}}));
        let nodes = render(&schema, &store);
        assert_eq!(
            RenderNode::find(&nodes, "seo[social][image]").unwrap().value(),
            Some(&json!(12))
        );
        assert_eq!(
            RenderNode::find(&nodes, "seo[social][image]").unwrap().meta().dom_id,
            "seo_social_image"
        );
        assert!(nodes[0].value().is_none());
    }

    #[test]
    fn groups_inside_rows_read_from_the_row() {
        let schema = Schema::new(vec![FieldSpec::repeatable(
            "people",
            "People",
            vec![FieldSpec::group(
                "contact",
                "Contact",
                vec![FieldSpec::new("email", "Email", FieldType::Text)],
            )],
        )])
        .unwrap();
        let store = MemoryStore::new().with(
            "people",
            json!([{"contact": {"email": "a@example.com"}}, {"contact": {"email": "b@example.com"}}]),
        );
        let nodes = render(&schema, &store);
        assert_eq!(
            RenderNode::find(&nodes, "people[1][contact][email]").unwrap().value(),
            Some(&json!("b@example.com"))
        );
    }

    #[test]
    fn nested_repeatables_index_every_level() {
        let schema = Schema::new(vec![FieldSpec::repeatable(
            "sections",
            "Sections",
            vec![FieldSpec::repeatable(
                "items",
                "Items",
                vec![FieldSpec::new("label", "Label", FieldType::Text)],
            )],
        )])
        .unwrap();
        let store = MemoryStore::new().with(
            "sections",
            json!([{"items": [{"label": "a"}]}, {"items": [{"label": "b"}, {"label": "c"}]}]),
        );
        let nodes = render(&schema, &store);
        assert_eq!(
            RenderNode::find(&nodes, "sections[1][items][1][label]").unwrap().value(),
            Some(&json!("c"))
        );
        assert!(RenderNode::find(&nodes, "sections[0][items][1][label]").is_none());
    }

    #[test]
    fn callback_receives_field_parameters() {
        let callback = FieldCallback::new("echo", |params: &Value| {
            format!(
                "<span data-name=\"{}\">{}</span>",
                params["name"].as_str().unwrap_or_default(),
                params["value"].as_str().unwrap_or_default()
            )
        });
        let schema = Schema::new(vec![FieldSpec::callback("preview", "Preview", callback)]).unwrap();
        let lookup = |path: &FieldPath| (path.encode() == "preview").then(|| json!("raw"));
        let nodes = render(&schema, &lookup);
        match &nodes[0] {
            RenderNode::Callback { output, .. } => {
                assert_eq!(output, "<span data-name=\"preview\">raw</span>")
            }
            other => panic!("expected a callback node, got {other:?}"),
        }
    }

    #[test_log::test]
    fn unknown_types_render_as_unsupported() {
        let schema =
            Schema::new(vec![FieldSpec::new("when", "When", FieldType::parse("datepicker"))]).unwrap();
        let store = MemoryStore::new().with("when", json!("<i>2024-01-01</i>"));
        let nodes = render(&schema, &store);
        match &nodes[0] {
            RenderNode::Unsupported { type_name, value, .. } => {
                assert_eq!(type_name, "datepicker");
                assert_eq!(value, &json!("2024-01-01"));
            }
            other => panic!("expected an unsupported node, got {other:?}"),
        }
    }

    #[test]
    fn render_output_serializes_with_node_tags() {
        let nodes = render(&links_schema(), &MemoryStore::new());
        let value = serde_json::to_value(&nodes).unwrap();
        assert_eq!(value[0]["node"], json!("field"));
        assert_eq!(value[0]["type"], json!("text"));
        assert_eq!(value[0]["control"]["kind"], json!("input"));
        assert_eq!(value[1]["node"], json!("repeatable"));
        assert_eq!(value[1]["rows"][0]["children"][0]["name"], json!("links[0][url]"));
    }
}

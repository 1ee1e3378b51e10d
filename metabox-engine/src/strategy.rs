//! Per-type render and sanitize strategies.
//!
//! Each leaf [`FieldType`] maps to one [`FieldStrategy`] in a
//! [`StrategyRegistry`]. The render and sanitize walkers only ever talk to
//! the registry, so supporting another leaf type is a matter of
//! registering a strategy for it (including for `FieldType::Unknown`
//! names).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use metabox_fields::{FieldPath, FieldSpec, FieldType};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::kses::filter_html;
use crate::render::{Control, OptionChoice};
use crate::rules::{
    absint, escape_html, escape_textarea, key_list, map_text, sanitize_key, sanitize_text_field,
    sanitize_url, scalar_text,
};

/// Everything a strategy sees when rendering one leaf.
pub struct LeafContext<'a> {
    pub field: &'a FieldSpec,
    pub path: &'a FieldPath,
    /// Stored value, `None` when nothing is stored
    pub value: Option<&'a Value>,
    pub config: &'a EngineConfig,
}

impl LeafContext<'_> {
    fn value_or_null(&self) -> &Value {
        self.value.unwrap_or(&Value::Null)
    }

    fn size(&self) -> u32 {
        self.field.size.unwrap_or(self.config.default_size)
    }
}

/// Display value and control description of a rendered leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafRender {
    pub value: Value,
    pub control: Control,
}

/// Render and sanitize behavior of one leaf type.
///
/// `sanitize` must be total and idempotent.
pub trait FieldStrategy: Send + Sync {
    fn render(&self, ctx: &LeafContext<'_>) -> LeafRender;

    fn sanitize(&self, value: &Value, config: &EngineConfig) -> Value;
}

/// Single-line input (`text` or `url`).
#[derive(Debug, Clone, Copy)]
pub struct InputStrategy {
    url: bool,
}

impl InputStrategy {
    pub fn text() -> Self {
        Self { url: false }
    }

    pub fn url() -> Self {
        Self { url: true }
    }
}

impl FieldStrategy for InputStrategy {
    fn render(&self, ctx: &LeafContext<'_>) -> LeafRender {
        LeafRender {
            value: self.sanitize(ctx.value_or_null(), ctx.config),
            control: Control::Input {
                input_type: if self.url { "url" } else { "text" }.to_string(),
            },
        }
    }

    fn sanitize(&self, value: &Value, config: &EngineConfig) -> Value {
        if self.url {
            map_text(value, |s| sanitize_url(s, config))
        } else {
            map_text(value, escape_html)
        }
    }
}

/// Color picker; the stored color doubles as the picker's default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColorStrategy;

impl FieldStrategy for ColorStrategy {
    fn render(&self, ctx: &LeafContext<'_>) -> LeafRender {
        let value = self.sanitize(ctx.value_or_null(), ctx.config);
        let default_color = display_text(&value);
        LeafRender {
            value,
            control: Control::Color { default_color },
        }
    }

    fn sanitize(&self, value: &Value, _config: &EngineConfig) -> Value {
        map_text(value, escape_html)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextareaStrategy;

impl FieldStrategy for TextareaStrategy {
    fn render(&self, ctx: &LeafContext<'_>) -> LeafRender {
        LeafRender {
            value: self.sanitize(ctx.value_or_null(), ctx.config),
            control: Control::Textarea {
                rows: ctx.config.textarea_rows,
                cols: ctx.size(),
            },
        }
    }

    fn sanitize(&self, value: &Value, _config: &EngineConfig) -> Value {
        map_text(value, escape_textarea)
    }
}

/// Rich text editor; values keep the allowed HTML subset.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditorStrategy;

impl FieldStrategy for EditorStrategy {
    fn render(&self, ctx: &LeafContext<'_>) -> LeafRender {
        let settings = ctx
            .field
            .editor
            .clone()
            .unwrap_or_else(|| ctx.config.editor.clone());
        LeafRender {
            value: self.sanitize(ctx.value_or_null(), ctx.config),
            control: Control::Editor { settings },
        }
    }

    fn sanitize(&self, value: &Value, config: &EngineConfig) -> Value {
        map_text(value, |s| filter_html(s, config))
    }
}

/// Select and multi-select. Submitted values are option keys.
#[derive(Debug, Clone, Copy)]
pub struct SelectStrategy {
    multiple: bool,
}

impl SelectStrategy {
    pub fn single() -> Self {
        Self { multiple: false }
    }

    pub fn multiple() -> Self {
        Self { multiple: true }
    }
}

impl FieldStrategy for SelectStrategy {
    fn render(&self, ctx: &LeafContext<'_>) -> LeafRender {
        let value = self.sanitize(ctx.value_or_null(), ctx.config);
        let selected: Vec<&str> = match &value {
            Value::Array(keys) => keys.iter().filter_map(Value::as_str).collect(),
            Value::String(key) => vec![key.as_str()],
            _ => Vec::new(),
        };
        let options = ctx
            .field
            .options
            .iter()
            .map(|option| OptionChoice {
                key: option.key.clone(),
                label: escape_html(&option.label),
                selected: selected.contains(&option.key.as_str()),
            })
            .collect();
        LeafRender {
            control: Control::Select {
                options,
                multiple: self.multiple,
                enhanced: ctx.field.enhanced,
            },
            value,
        }
    }

    fn sanitize(&self, value: &Value, _config: &EngineConfig) -> Value {
        if self.multiple {
            key_list(value)
        } else {
            map_text(value, sanitize_key)
        }
    }
}

/// Attachment picker storing a non-negative attachment id.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageStrategy;

impl FieldStrategy for ImageStrategy {
    fn render(&self, ctx: &LeafContext<'_>) -> LeafRender {
        let attachment_id = absint(ctx.value_or_null());
        LeafRender {
            value: Value::from(attachment_id),
            control: Control::Image {
                attachment_id,
                placeholder: ctx.config.placeholder_image.clone(),
                removable: attachment_id != 0,
            },
        }
    }

    fn sanitize(&self, value: &Value, _config: &EngineConfig) -> Value {
        Value::from(absint(value))
    }
}

/// Checkbox submitting the configured checked value.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckboxStrategy;

impl FieldStrategy for CheckboxStrategy {
    fn render(&self, ctx: &LeafContext<'_>) -> LeafRender {
        let value = self.sanitize(ctx.value_or_null(), ctx.config);
        let checked = value.as_str() == Some(ctx.config.checkbox_value.as_str());
        LeafRender {
            value,
            control: Control::Checkbox {
                checked_value: ctx.config.checkbox_value.clone(),
                checked,
            },
        }
    }

    fn sanitize(&self, value: &Value, _config: &EngineConfig) -> Value {
        map_text(value, sanitize_key)
    }
}

/// Generic text handling for types without a registered strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextStrategy;

impl FieldStrategy for PlainTextStrategy {
    fn render(&self, ctx: &LeafContext<'_>) -> LeafRender {
        let value = self.sanitize(ctx.value_or_null(), ctx.config);
        LeafRender {
            value,
            control: Control::Input {
                input_type: "text".to_string(),
            },
        }
    }

    fn sanitize(&self, value: &Value, _config: &EngineConfig) -> Value {
        map_text(value, sanitize_text_field)
    }
}

/// Mapping from leaf field type to its strategy.
#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: HashMap<FieldType, Arc<dyn FieldStrategy>>,
    fallback: Arc<dyn FieldStrategy>,
}

impl StrategyRegistry {
    /// A registry with no strategies; every type falls back to plain text.
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
            fallback: Arc::new(PlainTextStrategy),
        }
    }

    /// Strategies for every built-in leaf type.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(FieldType::Text, InputStrategy::text());
        registry.register(FieldType::Url, InputStrategy::url());
        registry.register(FieldType::Color, ColorStrategy);
        registry.register(FieldType::Textarea, TextareaStrategy);
        registry.register(FieldType::Editor, EditorStrategy);
        registry.register(FieldType::Select, SelectStrategy::single());
        registry.register(FieldType::MultiSelect, SelectStrategy::multiple());
        registry.register(FieldType::Image, ImageStrategy);
        registry.register(FieldType::Checkbox, CheckboxStrategy);
        registry
    }

    /// Register (or replace) the strategy for a leaf type.
    pub fn register(&mut self, field_type: FieldType, strategy: impl FieldStrategy + 'static) {
        self.strategies.insert(field_type, Arc::new(strategy));
    }

    pub fn get(&self, field_type: &FieldType) -> Option<&dyn FieldStrategy> {
        self.strategies.get(field_type).map(|s| s.as_ref())
    }

    /// Strategy used for types with none registered.
    pub fn fallback(&self) -> &dyn FieldStrategy {
        self.fallback.as_ref()
    }

    pub fn contains(&self, field_type: &FieldType) -> bool {
        self.strategies.contains_key(field_type)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.strategies.keys().map(FieldType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("StrategyRegistry")
            .field("types", &types)
            .finish()
    }
}

/// Text form of a scalar value; `""` for sequences and mappings.
pub fn display_text(value: &Value) -> String {
    scalar_text(value).map(|s| s.into_owned()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn render_with(strategy: &dyn FieldStrategy, field: &FieldSpec, value: Option<Value>) -> LeafRender {
        let config = EngineConfig::default();
        let path = FieldPath::root(field.id.clone());
        strategy.render(&LeafContext {
            field,
            path: &path,
            value: value.as_ref(),
            config: &config,
        })
    }

    #[test]
    fn builtin_covers_every_leaf_type() {
        let registry = StrategyRegistry::builtin();
        for ft in [
            FieldType::Text,
            FieldType::Url,
            FieldType::Color,
            FieldType::Textarea,
            FieldType::Editor,
            FieldType::Select,
            FieldType::MultiSelect,
            FieldType::Image,
            FieldType::Checkbox,
        ] {
            assert!(registry.contains(&ft), "{ft} has no strategy");
        }
        assert!(!registry.contains(&FieldType::Group));
        assert!(!registry.contains(&FieldType::parse("datepicker")));
    }

    #[rstest]
    #[case(FieldType::Text, json!("<b>x</b>"), json!("&lt;b&gt;x&lt;/b&gt;"))]
    #[case(FieldType::Color, json!("#ff0000"), json!("#ff0000"))]
    #[case(FieldType::Url, json!("javascript:evil()"), json!(""))]
    #[case(FieldType::Image, json!("-42"), json!(42))]
    #[case(FieldType::Textarea, json!("a\r\n<b>"), json!("a\n&lt;b&gt;"))]
    #[case(FieldType::Editor, json!("<p onclick=x>hi</p><script>1</script>"), json!("<p>hi</p>"))]
    #[case(FieldType::Select, json!("Draft Mode"), json!("draftmode"))]
    #[case(FieldType::MultiSelect, json!(["A", "", "b!"]), json!(["a", "b"]))]
    #[case(FieldType::MultiSelect, json!(null), json!([]))]
    #[case(FieldType::Checkbox, json!("YES"), json!("yes"))]
    fn builtin_sanitize(#[case] ft: FieldType, #[case] input: Value, #[case] expected: Value) {
        let registry = StrategyRegistry::builtin();
        let config = EngineConfig::default();
        let strategy = registry.get(&ft).unwrap();
        let once = strategy.sanitize(&input, &config);
        assert_eq!(once, expected);
        assert_eq!(strategy.sanitize(&once, &config), once);
    }

    #[test]
    fn fallback_strips_tags() {
        let registry = StrategyRegistry::empty();
        let out = registry
            .fallback()
            .sanitize(&json!("<em>hi</em>\tthere"), &EngineConfig::default());
        assert_eq!(out, json!("hi there"));
    }

    #[test]
    fn select_render_marks_selected_options() {
        let field = FieldSpec::multi_select("sizes", "Sizes", [("s", "Small"), ("m", "<M>"), ("l", "Large")]);
        let out = render_with(&SelectStrategy::multiple(), &field, Some(json!(["m", "l"])));
        match out.control {
            Control::Select { options, multiple, enhanced } => {
                assert!(multiple);
                assert!(!enhanced);
                let selected: Vec<bool> = options.iter().map(|o| o.selected).collect();
                assert_eq!(selected, [false, true, true]);
                assert_eq!(options[1].label, "&lt;M&gt;");
            }
            other => panic!("expected a select control, got {other:?}"),
        }
    }

    #[test]
    fn image_render_without_value_is_not_removable() {
        let field = FieldSpec::new("logo", "Logo", FieldType::Image);
        let out = render_with(&ImageStrategy, &field, None);
        assert_eq!(out.value, json!(0));
        assert_eq!(
            out.control,
            Control::Image {
                attachment_id: 0,
                placeholder: None,
                removable: false
            }
        );
        let out = render_with(&ImageStrategy, &field, Some(json!(17)));
        assert!(matches!(out.control, Control::Image { removable: true, .. }));
    }

    #[test]
    fn checkbox_render_reflects_checked_value() {
        let field = FieldSpec::new("featured", "Featured", FieldType::Checkbox);
        let on = render_with(&CheckboxStrategy, &field, Some(json!("yes")));
        assert!(matches!(on.control, Control::Checkbox { checked: true, .. }));
        let off = render_with(&CheckboxStrategy, &field, None);
        assert!(matches!(off.control, Control::Checkbox { checked: false, .. }));
    }

    #[test]
    fn textarea_uses_size_as_cols() {
        let field = FieldSpec::new("notes", "Notes", FieldType::Textarea).with_size(60);
        let out = render_with(&TextareaStrategy, &field, None);
        assert_eq!(out.control, Control::Textarea { rows: 5, cols: 60 });
        assert_eq!(out.value, json!(""));
    }

    #[test]
    fn editor_prefers_field_settings() {
        let field = FieldSpec::new("body", "Body", FieldType::Editor).with_editor(
            metabox_fields::EditorSettings {
                rows: 20,
                quicktags: true,
                media_buttons: false,
            },
        );
        let out = render_with(&EditorStrategy, &field, Some(json!("<p>x</p>")));
        match out.control {
            Control::Editor { settings } => assert_eq!(settings.rows, 20),
            other => panic!("expected an editor control, got {other:?}"),
        }
    }

    #[test]
    fn custom_strategies_replace_builtins() {
        struct Upper;
        impl FieldStrategy for Upper {
            fn render(&self, ctx: &LeafContext<'_>) -> LeafRender {
                LeafRender {
                    value: self.sanitize(ctx.value.unwrap_or(&Value::Null), ctx.config),
                    control: Control::Input {
                        input_type: "text".into(),
                    },
                }
            }
            fn sanitize(&self, value: &Value, _config: &EngineConfig) -> Value {
                Value::String(display_text(value).to_uppercase())
            }
        }

        let mut registry = StrategyRegistry::builtin();
        registry.register(FieldType::parse("shout"), Upper);
        let out = registry
            .get(&FieldType::parse("shout"))
            .unwrap()
            .sanitize(&json!("hey"), &EngineConfig::default());
        assert_eq!(out, json!("HEY"));
        assert!(registry.get(&FieldType::parse("Shout")).is_some());
    }
}

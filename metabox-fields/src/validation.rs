//! Structural validation of field trees.
//!
//! Runs once when a schema is built or loaded. Render and sanitize assume a
//! tree that passed here, so every invariant they depend on is checked up
//! front rather than rediscovered mid-walk.

use std::collections::HashSet;

use crate::error::{FieldsError, Result};
use crate::path::{is_valid_id, FieldPath, RESERVED_CHARS};
use crate::types::{FieldSpec, FieldType};

/// Validate a list of sibling fields and everything below them.
///
/// Violations are reported against the encoded path of the offending field,
/// without row indices, e.g. `links[url]`.
pub fn validate_fields(fields: &[FieldSpec]) -> Result<()> {
    validate_level(fields, None)
}

fn validate_level(fields: &[FieldSpec], parent: Option<&FieldPath>) -> Result<()> {
    let mut seen = HashSet::new();
    for field in fields {
        let path = match parent {
            Some(p) => p.child(field.id.clone()),
            None => FieldPath::root(field.id.clone()),
        };
        validate_field(field, &path)?;
        if !seen.insert(field.id.as_str()) {
            return Err(FieldsError::violation(
                path.encode(),
                "duplicate id among sibling fields",
            ));
        }
        if field.field_type.is_container() {
            validate_level(&field.children, Some(&path))?;
        }
    }
    Ok(())
}

fn validate_field(field: &FieldSpec, path: &FieldPath) -> Result<()> {
    let at = || path.encode();

    if !is_valid_id(&field.id) {
        let reason = if field.id.is_empty() {
            "field id is empty".to_string()
        } else if field.id.contains(RESERVED_CHARS) {
            format!("field id '{}' contains one of {RESERVED_CHARS:?}", field.id)
        } else {
            format!("field id '{}' is all digits and would read as a row index", field.id)
        };
        return Err(FieldsError::violation(at(), reason));
    }

    let ft = &field.field_type;

    if ft.is_container() {
        if field.children.is_empty() {
            return Err(FieldsError::violation(at(), format!("{ft} has no children")));
        }
    } else if !field.children.is_empty() {
        return Err(FieldsError::violation(at(), format!("{ft} cannot have children")));
    }

    if ft.has_options() {
        if field.options.is_empty() {
            return Err(FieldsError::violation(at(), format!("{ft} has no options")));
        }
        let mut keys = HashSet::new();
        for option in &field.options {
            if !keys.insert(option.key.as_str()) {
                return Err(FieldsError::violation(
                    at(),
                    format!("duplicate option key '{}'", option.key),
                ));
            }
        }
    } else if !field.options.is_empty() {
        return Err(FieldsError::violation(at(), format!("{ft} cannot have options")));
    }

    match (ft, &field.callback) {
        (FieldType::Callback, None) => {
            return Err(FieldsError::violation(at(), "callback field has no callback"));
        }
        (FieldType::Callback, Some(cb)) if !cb.is_bound() => {
            return Err(FieldsError::violation(
                at(),
                format!("callback '{}' is not bound to a host function", cb.name()),
            ));
        }
        (FieldType::Callback, Some(_)) => {}
        (_, Some(_)) => {
            return Err(FieldsError::violation(at(), format!("{ft} cannot carry a callback")));
        }
        (_, None) => {}
    }

    if field.editor.is_some() && *ft != FieldType::Editor {
        return Err(FieldsError::violation(at(), "editor settings on a non-editor field"));
    }
    if field.enhanced && !ft.has_options() {
        return Err(FieldsError::violation(at(), format!("{ft} cannot be enhanced")));
    }
    if field.size == Some(0) {
        return Err(FieldsError::violation(at(), "size must be positive"));
    }
    if let Some(dep) = &field.dependency {
        if dep.field.trim().is_empty() {
            return Err(FieldsError::violation(at(), "dependency names no field"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::FieldCallback;
    use crate::types::Dependency;
    use rstest::rstest;
    use serde_json::Value;

    fn reason_of(fields: &[FieldSpec]) -> (String, String) {
        match validate_fields(fields) {
            Err(FieldsError::SchemaViolation { field, reason }) => (field, reason),
            other => panic!("expected a schema violation, got {other:?}"),
        }
    }

    #[test]
    fn accepts_a_typical_schema() {
        let fields = vec![
            FieldSpec::new("title", "Title", FieldType::Text).with_required(),
            FieldSpec::repeatable(
                "links",
                "Links",
                vec![
                    FieldSpec::new("url", "URL", FieldType::Url),
                    FieldSpec::select("kind", "Kind", [("doc", "Docs"), ("src", "Source")]),
                ],
            ),
            FieldSpec::callback(
                "preview",
                "Preview",
                FieldCallback::new("preview", |_: &Value| String::new()),
            ),
        ];
        validate_fields(&fields).unwrap();
    }

    #[test]
    fn unknown_types_are_not_violations() {
        validate_fields(&[FieldSpec::new("when", "When", FieldType::parse("datepicker"))]).unwrap();
    }

    #[rstest]
    #[case("")]
    #[case("a.b")]
    #[case("a[b]")]
    #[case("7")]
    fn rejects_invalid_ids(#[case] id: &str) {
        let (_, reason) = reason_of(&[FieldSpec::new(id, "Bad", FieldType::Text)]);
        assert!(reason.contains("field id"));
    }

    #[test]
    fn rejects_duplicate_sibling_ids_with_nested_path() {
        let fields = vec![FieldSpec::group(
            "seo",
            "SEO",
            vec![
                FieldSpec::new("title", "Title", FieldType::Text),
                FieldSpec::new("title", "Again", FieldType::Text),
            ],
        )];
        let (field, reason) = reason_of(&fields);
        assert_eq!(field, "seo[title]");
        assert!(reason.contains("duplicate"));
    }

    #[test]
    fn same_id_at_different_levels_is_fine() {
        let fields = vec![
            FieldSpec::new("title", "Title", FieldType::Text),
            FieldSpec::group(
                "seo",
                "SEO",
                vec![FieldSpec::new("title", "Title", FieldType::Text)],
            ),
        ];
        validate_fields(&fields).unwrap();
    }

    #[rstest]
    #[case(FieldSpec::group("g", "G", vec![]), "has no children")]
    #[case(FieldSpec::repeatable("r", "R", vec![]), "has no children")]
    #[case(FieldSpec::select("s", "S", Vec::<(String, String)>::new()), "has no options")]
    #[case(FieldSpec::select("s", "S", [("a", "A"), ("a", "B")]), "duplicate option key")]
    #[case(FieldSpec::callback("c", "C", FieldCallback::named("later")), "not bound")]
    #[case(FieldSpec::new("c", "C", FieldType::Callback), "has no callback")]
    #[case(FieldSpec::new("t", "T", FieldType::Text).enhanced(), "cannot be enhanced")]
    #[case(FieldSpec::new("t", "T", FieldType::Text).with_size(0), "size must be positive")]
    #[case(
        FieldSpec::new("t", "T", FieldType::Text).with_editor(Default::default()),
        "non-editor"
    )]
    #[case(
        FieldSpec::new("t", "T", FieldType::Text).with_dependency(Dependency {
            field: " ".into(),
            operator: Default::default(),
            value: None,
        }),
        "dependency names no field"
    )]
    fn rejects_broken_fields(#[case] field: FieldSpec, #[case] expected: &str) {
        let (_, reason) = reason_of(&[field]);
        assert!(reason.contains(expected), "{reason}");
    }

    #[test]
    fn leaf_with_children_is_rejected() {
        let mut field = FieldSpec::new("t", "T", FieldType::Text);
        field.children.push(FieldSpec::new("x", "X", FieldType::Text));
        let (_, reason) = reason_of(&[field]);
        assert!(reason.contains("cannot have children"));
    }

    #[test]
    fn violation_in_deep_child_reports_full_path() {
        let fields = vec![FieldSpec::repeatable(
            "sections",
            "Sections",
            vec![FieldSpec::repeatable("items", "Items", vec![])],
        )];
        let (field, _) = reason_of(&fields);
        assert_eq!(field, "sections[items]");
    }
}

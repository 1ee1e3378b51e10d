use std::path::{Path, PathBuf};

use metabox_cli::commands::{self, stub_callbacks};
use metabox_cli::OutputFormat;
use metabox_engine::FormEngine;
use metabox_fields::CallbackRegistry;
use serde_json::{json, Value};
use tempfile::TempDir;

const SEO_BOX: &str = r#"
id: seo
title: SEO
post_types: [post, page]
fields:
  - id: title
    label: Title
    type: text
  - id: links
    label: Links
    type: repeatable
    fields:
      - id: url
        label: URL
        type: url
"#;

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[tokio::test]
async fn validate_reports_a_single_file() {
    let temp = TempDir::new().unwrap();
    let schema = write(temp.path(), "seo.yaml", SEO_BOX);

    let out = commands::validate(&schema, CallbackRegistry::new())
        .await
        .unwrap();
    assert_eq!(out, "ok seo (2 fields)");
}

#[tokio::test]
async fn validate_reports_a_directory() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "seo.yaml", SEO_BOX);
    write(
        temp.path(),
        "extra.yaml",
        "id: extra\ntitle: Extra\nfields:\n  - id: note\n    label: Note\n    type: textarea\n",
    );

    let out = commands::validate(temp.path(), CallbackRegistry::new())
        .await
        .unwrap();
    assert_eq!(out, "ok extra (1 fields)\nok seo (2 fields)");
}

#[tokio::test]
async fn validate_fails_a_directory_with_an_invalid_file() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "seo.yaml", SEO_BOX);
    write(temp.path(), "broken.yaml", "id: broken\nfields:\n  - id: g\n    type: group\n");

    let err = commands::validate(temp.path(), CallbackRegistry::new())
        .await
        .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("1 of 2"));
    assert!(message.contains("broken.yaml"));
}

#[tokio::test]
async fn validate_fails_a_directory_with_repeated_ids() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "seo.yaml", SEO_BOX);
    write(temp.path(), "seo_copy.yaml", SEO_BOX);

    let err = commands::validate(temp.path(), CallbackRegistry::new())
        .await
        .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("seo_copy.yaml"));
    assert!(message.contains("duplicate meta box id 'seo'"));
}

#[tokio::test]
async fn validate_rejects_unbound_callbacks_unless_stubbed() {
    let temp = TempDir::new().unwrap();
    let schema = write(
        temp.path(),
        "preview.yaml",
        "id: preview\nfields:\n  - id: preview\n    label: Preview\n    type: callback\n    callback: render_preview\n",
    );

    assert!(commands::validate(&schema, CallbackRegistry::new())
        .await
        .is_err());
    let stubs = stub_callbacks(&["render_preview".to_string()]);
    assert!(commands::validate(&schema, stubs).await.is_ok());
}

#[tokio::test]
async fn render_uses_stored_values() {
    let temp = TempDir::new().unwrap();
    let schema = write(temp.path(), "seo.yaml", SEO_BOX);
    let values = write(
        temp.path(),
        "values.json",
        r#"{"title": "Hello <b>", "links": [{"url": "https://a.example"}, {"url": "https://b.example"}]}"#,
    );

    let out = commands::render(
        &FormEngine::default(),
        &schema,
        Some(&values),
        &CallbackRegistry::new(),
        OutputFormat::Json,
    )
    .await
    .unwrap();
    let nodes: Value = serde_json::from_str(&out).unwrap();

    assert_eq!(nodes[0]["name"], json!("title"));
    assert_eq!(nodes[0]["value"], json!("Hello &lt;b&gt;"));
    assert_eq!(nodes[1]["rows"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn sanitize_prints_record_and_operations() {
    let temp = TempDir::new().unwrap();
    let schema = write(temp.path(), "seo.yaml", SEO_BOX);
    let submission = write(
        temp.path(),
        "submission.json",
        r#"{"title": "Hello <b>", "links[3][url]": "javascript:evil()", "foo[[bad": "x"}"#,
    );

    let out = commands::sanitize(
        &FormEngine::default(),
        &schema,
        &submission,
        &CallbackRegistry::new(),
        OutputFormat::Json,
    )
    .await
    .unwrap();
    let result: Value = serde_json::from_str(&out).unwrap();

    assert_eq!(
        result["record"],
        json!({"title": "Hello &lt;b&gt;", "links": [{"url": ""}]})
    );
    assert_eq!(
        result["operations"],
        json!([
            {"op": "persist", "id": "title", "value": "Hello &lt;b&gt;"},
            {"op": "persist", "id": "links", "value": [{"url": ""}]}
        ])
    );
}

#[tokio::test]
async fn missing_schema_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    let err = commands::validate(&temp.path().join("missing.yaml"), CallbackRegistry::new())
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("missing.yaml"));
}

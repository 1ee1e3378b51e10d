//! Command handlers. Each returns the text to print on success.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use metabox_engine::{EngineConfig, FormEngine, MemoryStore, RawSubmission};
use metabox_fields::{CallbackRegistry, FieldPath, MetaBox, PathSegment};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::cli::{Cli, Commands, OutputFormat};

/// Run the parsed command line.
pub async fn run(cli: Cli) -> Result<String> {
    let callbacks = stub_callbacks(&cli.callbacks);
    match cli.command {
        Commands::Validate { path } => validate(&path, callbacks).await,
        Commands::Render {
            schema,
            values,
            format,
        } => {
            let engine = FormEngine::new(load_config(cli.config.as_deref())?);
            render(&engine, &schema, values.as_deref(), &callbacks, format).await
        }
        Commands::Sanitize {
            schema,
            submission,
            format,
        } => {
            let engine = FormEngine::new(load_config(cli.config.as_deref())?);
            sanitize(&engine, &schema, &submission, &callbacks, format).await
        }
        Commands::Encode { segments } => encode(&segments),
        Commands::Decode { key } => decode(&key),
    }
}

/// A registry binding each name to a handler that echoes its parameters.
pub fn stub_callbacks(names: &[String]) -> CallbackRegistry {
    names.iter().fold(CallbackRegistry::new(), |registry, name| {
        let label = name.clone();
        registry.register(name.clone(), move |params: &Value| {
            format!("<!-- {label} {params} -->")
        })
    })
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = EngineConfig::load(path).context("Failed to load engine configuration")?;
    debug!(?path, "engine configuration loaded");
    Ok(config)
}

async fn read(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn load_box(path: &Path, callbacks: &CallbackRegistry) -> Result<MetaBox> {
    let yaml = read(path).await?;
    MetaBox::from_yaml_str(&yaml, callbacks)
        .with_context(|| format!("Invalid meta box in {}", path.display()))
}

/// Validate one meta box file, or every `*.yaml` file in a directory.
///
/// In directory mode every file is checked; any invalid file or repeated id
/// fails the command with one line per problem.
pub async fn validate(path: &Path, callbacks: CallbackRegistry) -> Result<String> {
    if !path.is_dir() {
        let meta_box = load_box(path, &callbacks).await?;
        return Ok(summary(&meta_box));
    }

    let files = yaml_files(path).await?;
    let mut boxes: Vec<MetaBox> = Vec::new();
    let mut problems = Vec::new();
    for file in &files {
        match load_box(file, &callbacks).await {
            Ok(meta_box) if boxes.iter().any(|b| b.id == meta_box.id) => {
                problems.push(format!(
                    "{}: duplicate meta box id '{}'",
                    file.display(),
                    meta_box.id
                ));
            }
            Ok(meta_box) => boxes.push(meta_box),
            Err(e) => problems.push(format!("{e:#}")),
        }
    }
    if !problems.is_empty() {
        bail!(
            "{} of {} meta box files failed validation:\n{}",
            problems.len(),
            files.len(),
            problems.join("\n")
        );
    }

    boxes.sort_by(|a, b| a.id.cmp(&b.id));
    info!(boxes = boxes.len(), "schema directory validated");
    Ok(boxes.iter().map(summary).collect::<Vec<_>>().join("\n"))
}

async fn yaml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("yaml") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn summary(meta_box: &MetaBox) -> String {
    format!(
        "ok {} ({} fields)",
        meta_box.id,
        meta_box.schema.len()
    )
}

pub async fn render(
    engine: &FormEngine,
    schema: &Path,
    values: Option<&Path>,
    callbacks: &CallbackRegistry,
    format: OutputFormat,
) -> Result<String> {
    let meta_box = load_box(schema, callbacks).await?;
    let stored = match values {
        Some(path) => MemoryStore::from_json_str(&read(path).await?)
            .with_context(|| format!("Invalid stored values in {}", path.display()))?,
        None => MemoryStore::new(),
    };
    let nodes = engine.render(&meta_box.schema, &stored);
    output(&nodes, format)
}

pub async fn sanitize(
    engine: &FormEngine,
    schema: &Path,
    submission: &Path,
    callbacks: &CallbackRegistry,
    format: OutputFormat,
) -> Result<String> {
    let meta_box = load_box(schema, callbacks).await?;
    let raw = RawSubmission::from_json_str(&read(submission).await?)
        .with_context(|| format!("Invalid submission in {}", submission.display()))?;
    let record = engine.sanitize(&meta_box.schema, &raw);
    let operations = record.operations(&meta_box.schema);
    output(
        &json!({
            "record": record,
            "operations": operations,
        }),
        format,
    )
}

/// Parse `id` or `id:index` into a path segment.
pub fn parse_segment(arg: &str) -> Result<PathSegment> {
    match arg.rsplit_once(':') {
        Some((id, index)) => {
            let index = index
                .parse::<usize>()
                .with_context(|| format!("Invalid row index in segment '{arg}'"))?;
            Ok(PathSegment::indexed(id, index))
        }
        None => Ok(PathSegment::new(arg)),
    }
}

pub fn encode(segments: &[String]) -> Result<String> {
    let segments = segments
        .iter()
        .map(|s| parse_segment(s))
        .collect::<Result<Vec<_>>>()?;
    if let Some(bad) = segments.iter().find(|s| !metabox_fields::path::is_valid_id(&s.id)) {
        bail!("'{}' is not a valid field id", bad.id);
    }
    Ok(FieldPath::from_segments(segments).encode())
}

pub fn decode(key: &str) -> Result<String> {
    let path = FieldPath::decode(key)?;
    output(path.segments(), OutputFormat::Json)
}

fn output<T: serde::Serialize + ?Sized>(value: &T, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml_ng::to_string(value)?,
    })
}

//! SchemaContext: the registry of meta boxes a host has on disk.
//!
//! Manages meta box schemas as YAML files, one per box, in a single
//! directory. Boxes are held in id order and can be looked up by id or by
//! the post type they appear on.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tokio::fs;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::callback::CallbackRegistry;
use crate::error::{FieldsError, Result};
use crate::types::MetaBox;

/// Builder for `SchemaContext`. Created by `SchemaContext::open()`.
pub struct SchemaContextBuilder {
    root: PathBuf,
    callbacks: CallbackRegistry,
    read_only: bool,
}

impl SchemaContextBuilder {
    /// Host functions that callback fields in the loaded files may name.
    pub fn with_callbacks(mut self, callbacks: CallbackRegistry) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Load an existing directory without creating it; writes and deletes
    /// are refused.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Build the context: create the directory if needed, load from disk.
    pub async fn build(self) -> Result<SchemaContext> {
        let root = self.root;

        if self.read_only {
            if !root.is_dir() {
                return Err(FieldsError::NotInitialized { path: root });
            }
        } else {
            fs::create_dir_all(&root).await?;
        }

        let mut ctx = SchemaContext {
            root,
            callbacks: self.callbacks,
            boxes: IndexMap::new(),
            read_only: self.read_only,
        };
        ctx.load_boxes().await?;

        debug!(boxes = ctx.boxes.len(), root = ?ctx.root, "schema context opened");
        Ok(ctx)
    }
}

fn box_path(root: &Path, id: &str) -> PathBuf {
    root.join(format!("{id}.yaml"))
}

/// Meta box schemas loaded from one directory.
///
/// ```text
/// schemas/
///   product_details.yaml   <- one MetaBox per file, named by id
///   seo.yaml
/// ```
pub struct SchemaContext {
    root: PathBuf,
    callbacks: CallbackRegistry,
    /// Sorted by id
    boxes: IndexMap<String, MetaBox>,
    read_only: bool,
}

impl SchemaContext {
    /// Open or create a schema directory. Returns a builder for optional configuration.
    ///
    /// ```rust,ignore
    /// let ctx = SchemaContext::open(path)
    ///     .with_callbacks(registry)
    ///     .build()
    ///     .await?;
    /// ```
    pub fn open(root: impl Into<PathBuf>) -> SchemaContextBuilder {
        SchemaContextBuilder {
            root: root.into(),
            callbacks: CallbackRegistry::new(),
            read_only: false,
        }
    }

    /// Get a meta box by id.
    pub fn get(&self, id: &str) -> Option<&MetaBox> {
        self.boxes.get(id)
    }

    /// Get a meta box by id, failing with `SchemaNotFound`.
    pub fn require(&self, id: &str) -> Result<&MetaBox> {
        self.get(id)
            .ok_or_else(|| FieldsError::SchemaNotFound { id: id.to_string() })
    }

    /// All meta boxes, in id order.
    pub fn all(&self) -> impl Iterator<Item = &MetaBox> {
        self.boxes.values()
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Meta boxes shown on the edit screen of `post_type`, in id order.
    pub fn for_post_type(&self, post_type: &str) -> Vec<&MetaBox> {
        self.all().filter(|b| b.shows_on(post_type)).collect()
    }

    /// Write (create or update) a meta box. Persists to YAML immediately.
    pub async fn write(&mut self, meta_box: &MetaBox) -> Result<()> {
        self.ensure_writable()?;
        let path = box_path(&self.root, &meta_box.id);
        atomic_write(&path, meta_box.to_yaml()?.as_bytes()).await?;

        let (_, previous) = self.boxes.insert_full(meta_box.id.clone(), meta_box.clone());
        if previous.is_none() {
            self.boxes.sort_keys();
        }
        debug!(id = %meta_box.id, fields = meta_box.schema.len(), "meta box written");
        Ok(())
    }

    /// Delete a meta box by id, removing its file first.
    pub async fn delete(&mut self, id: &str) -> Result<()> {
        self.ensure_writable()?;
        if !self.boxes.contains_key(id) {
            return Err(FieldsError::SchemaNotFound { id: id.to_string() });
        }

        match fs::remove_file(box_path(&self.root, id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(%id, "meta box file already gone");
            }
            Err(e) => return Err(e.into()),
        }
        self.boxes.shift_remove(id);
        debug!(%id, "meta box deleted");
        Ok(())
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// The root directory path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(FieldsError::ReadOnly {
                path: self.root.clone(),
            });
        }
        Ok(())
    }

    async fn load_boxes(&mut self) -> Result<()> {
        let mut paths = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("yaml") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let content = fs::read_to_string(&path).await?;
            let meta_box = match MetaBox::from_yaml_str(&content, &self.callbacks) {
                Ok(meta_box) => meta_box,
                Err(e) => {
                    warn!(?path, %e, "skipping invalid meta box schema");
                    continue;
                }
            };
            if self.boxes.contains_key(&meta_box.id) {
                let e = FieldsError::DuplicateSchema {
                    id: meta_box.id,
                    path: path.clone(),
                };
                warn!(?path, %e, "skipping duplicate meta box schema");
                continue;
            }
            self.boxes.insert(meta_box.id.clone(), meta_box);
        }
        self.boxes.sort_keys();
        Ok(())
    }
}

/// Write to a temp file then rename for atomic persistence.
async fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no parent dir"))?;
    let tmp = dir.join(format!(".tmp_{}", Ulid::new()));
    fs::write(&tmp, data).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

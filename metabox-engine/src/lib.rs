//! Render and sanitize engine for metabox field schemas
//!
//! Given a validated [`Schema`], the engine does two things:
//!
//! - **Render**: walk the schema against stored values and produce
//!   [`RenderNode`] instructions with encoded names and display-escaped
//!   values
//! - **Sanitize**: walk the schema against a [`RawSubmission`] and produce a
//!   [`SanitizedRecord`], whose absent top-level fields mean delete
//!
//! Both halves share the name encoding from `metabox-fields`, so every name
//! render emits decodes back to the field that produced it.
//!
//! ```rust,ignore
//! let engine = FormEngine::new(EngineConfig::load(None)?);
//! let nodes = engine.render(&meta_box.schema, &stored);
//! let record = engine.sanitize(&meta_box.schema, &submission);
//! record.apply(&meta_box.schema, &mut store)?;
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod kses;
pub mod logging;
pub mod render;
pub mod rules;
pub mod sanitizer;
pub mod strategy;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use host::{MemoryStore, MetaOperation, MetaStore, ValueLookup};
pub use logging::Pretty;
pub use render::{
    Control, FieldMeta, LeafInstruction, OptionChoice, RenderNode, Renderer, RepeatableRow,
    RowTemplate,
};
pub use sanitizer::{RawSubmission, SanitizedRecord, Sanitizer};
pub use strategy::{FieldStrategy, LeafContext, LeafRender, StrategyRegistry};

pub use metabox_fields::{FieldPath, FieldSpec, FieldType, Schema};

/// Configuration plus the strategy registry; the entry point for hosts.
#[derive(Debug, Clone, Default)]
pub struct FormEngine {
    config: EngineConfig,
    strategies: StrategyRegistry,
}

impl FormEngine {
    /// An engine with the built-in strategies.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            strategies: StrategyRegistry::builtin(),
        }
    }

    /// Register (or replace) the strategy for a leaf type.
    pub fn with_strategy(mut self, field_type: FieldType, strategy: impl FieldStrategy + 'static) -> Self {
        self.strategies.register(field_type, strategy);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    pub fn renderer(&self) -> Renderer<'_> {
        Renderer::new(&self.config, &self.strategies)
    }

    pub fn sanitizer(&self) -> Sanitizer<'_> {
        Sanitizer::new(&self.config, &self.strategies)
    }

    /// Render instructions for `schema`, reading stored values from `lookup`.
    pub fn render(&self, schema: &Schema, lookup: &dyn ValueLookup) -> Vec<RenderNode> {
        self.renderer().render(schema, lookup)
    }

    /// Sanitize a raw submission against `schema`.
    pub fn sanitize(&self, schema: &Schema, raw: &RawSubmission) -> SanitizedRecord {
        self.sanitizer().sanitize(schema, raw)
    }
}

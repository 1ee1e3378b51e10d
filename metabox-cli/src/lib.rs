//! metabox command-line tool.
//!
//! Commands:
//! - `metabox validate <path>`: check a meta box file or a directory of them
//! - `metabox render <schema> [--values <json>]`: print render instructions
//! - `metabox sanitize <schema> <submission>`: print the sanitized record and
//!   the store operations it implies
//! - `metabox encode <segments...>` / `metabox decode <key>`: name encoding

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, OutputFormat};

//! CLI definition for the metabox command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// How command results are written to stdout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Yaml => write!(f, "yaml"),
        }
    }
}

/// metabox - declarative custom-field forms
///
/// Validate meta box schemas, preview render instructions and run
/// submissions through the sanitizer.
#[derive(Parser, Debug)]
#[command(name = "metabox")]
#[command(version)]
#[command(about = "Validate, render and sanitize metabox field schemas")]
pub struct Cli {
    /// Enable debug output to stderr
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Engine configuration file (.toml, .yaml or .json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Callback names to bind to a stub that echoes its parameters
    #[arg(long = "callback", global = true, value_name = "NAME")]
    pub callbacks: Vec<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a meta box file, or every meta box in a directory
    Validate {
        /// A meta box YAML file or a directory of them
        path: PathBuf,
    },
    /// Print render instructions for a meta box
    Render {
        /// Meta box YAML file
        schema: PathBuf,
        /// Stored values as a JSON object keyed by top-level field id
        #[arg(long)]
        values: Option<PathBuf>,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Sanitize a submission and print the record and store operations
    Sanitize {
        /// Meta box YAML file
        schema: PathBuf,
        /// Submission as a JSON object of encoded names to values
        submission: PathBuf,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Encode path segments into a form field name (e.g. `links:0 url`)
    Encode {
        /// Segments as `id` or `id:index`
        #[arg(required = true)]
        segments: Vec<String>,
    },
    /// Decode a form field name into its path segments
    Decode {
        /// Encoded name such as `links[0][url]`
        key: String,
    },
}

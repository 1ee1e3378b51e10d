//! Engine configuration loaded with figment.
//!
//! Sources are merged in precedence order, later ones overriding earlier:
//! 1. Built-in defaults
//! 2. An optional configuration file (TOML, YAML or JSON by extension)
//! 3. `METABOX_` environment variables, nested keys split on `__`
//!    (`METABOX_EDITOR__ROWS=12`)

use std::path::Path;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use metabox_fields::EditorSettings;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{EngineError, Result};
use crate::rules::sanitize_key;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "METABOX_";

/// Schemes the Url rule accepts unless configured otherwise.
pub const DEFAULT_URL_SCHEMES: &[&str] = &[
    "http", "https", "ftp", "ftps", "mailto", "news", "irc", "irc6", "ircs", "gopher", "nntp",
    "feed", "telnet", "mms", "rtsp", "sms", "svn", "tel", "fax", "xmpp", "webcal", "urn",
];

/// Settings shared by render and sanitize. Both halves of a round trip must
/// use the same configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Display width for fields that don't set `size`
    pub default_size: u32,
    /// Rows for Textarea controls
    pub textarea_rows: u32,
    /// Editor settings for Editor fields that don't carry their own
    pub editor: EditorSettings,
    /// Value a ticked checkbox submits
    pub checkbox_value: String,
    /// Image shown while an Image field is empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder_image: Option<String>,
    /// URL schemes the Url rule accepts
    pub url_schemes: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_size: 40,
            textarea_rows: 5,
            editor: EditorSettings::default(),
            checkbox_value: "yes".to_string(),
            placeholder_image: None,
            url_schemes: DEFAULT_URL_SCHEMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: EngineConfig = Self::figment(path)?.extract()?;
        config.validate()?;
        debug!(
            default_size = config.default_size,
            schemes = config.url_schemes.len(),
            "engine configuration loaded"
        );
        Ok(config)
    }

    /// Build the figment with all sources in precedence order.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::new().merge(Serialized::defaults(EngineConfig::default()));

        if let Some(path) = path {
            trace!(?path, "merging configuration file");
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase());
            if !matches!(ext.as_deref(), Some("toml" | "yaml" | "yml" | "json")) {
                return Err(EngineError::UnsupportedConfigFormat {
                    path: path.to_path_buf(),
                });
            }
            // figment treats a missing file as an empty source
            if !path.is_file() {
                return Err(EngineError::ConfigNotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = match ext.as_deref() {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => figment.merge(Yaml::file(path)),
            };
        }

        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Check ranges the type system can't express.
    pub fn validate(&self) -> Result<()> {
        if self.default_size == 0 {
            return Err(invalid("default_size", "must be positive"));
        }
        if self.textarea_rows == 0 {
            return Err(invalid("textarea_rows", "must be positive"));
        }
        if self.checkbox_value.is_empty() || sanitize_key(&self.checkbox_value) != self.checkbox_value
        {
            return Err(invalid(
                "checkbox_value",
                "must be a non-empty lowercase key of [a-z0-9_-]",
            ));
        }
        if self.url_schemes.is_empty() {
            return Err(invalid("url_schemes", "at least one scheme is required"));
        }
        Ok(())
    }

    /// Whether the Url rule accepts `scheme`. Case-insensitive.
    pub fn allows_scheme(&self, scheme: &str) -> bool {
        self.url_schemes
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(scheme))
    }
}

fn invalid(key: &str, message: &str) -> EngineError {
    EngineError::InvalidConfig {
        key: key.to_string(),
        message: message.to_string(),
    }
}

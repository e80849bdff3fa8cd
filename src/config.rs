//! Engine configuration
//!
//! Settings can be built in code with the `with_*` methods or loaded from TOML:
//!
//! ```toml
//! [templates]
//! root = "templates"
//! extension = "html"
//!
//! [cache]
//! dir = ".viewkit-cache"
//!
//! [render]
//! max_depth = 64
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Default partial/include nesting limit
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Errors that can occur when loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Settings for building an [`Engine`](crate::Engine)
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Directory template ids are resolved under
    pub template_root: PathBuf,
    /// Directory compiled artifacts are written to
    pub cache_dir: PathBuf,
    /// Extension appended to ids without one
    pub extension: Option<String>,
    /// Maximum partial/include nesting
    pub max_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            template_root: PathBuf::from("templates"),
            cache_dir: PathBuf::from(".viewkit-cache"),
            extension: Some("html".to_string()),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// TOML structure for deserializing configuration
#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    #[serde(default)]
    templates: TomlTemplates,
    #[serde(default)]
    cache: TomlCache,
    #[serde(default)]
    render: TomlRender,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TomlTemplates {
    root: Option<PathBuf>,
    extension: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TomlCache {
    dir: Option<PathBuf>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TomlRender {
    max_depth: Option<usize>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.template_root = root.into();
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Set the default extension; an empty string disables it
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        let extension = extension.trim_start_matches('.');
        self.extension = (!extension.is_empty()).then(|| extension.to_string());
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Load configuration from a TOML file
    ///
    /// Relative paths are taken relative to the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_str(&content)?;
        if let Some(base) = path.parent() {
            config.template_root = rebase(base, config.template_root);
            config.cache_dir = rebase(base, config.cache_dir);
        }
        Ok(config)
    }

    /// Load configuration from a TOML string; missing keys keep their defaults
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let parsed: TomlConfig = toml::from_str(content)?;
        let mut config = Self::default();

        if let Some(root) = parsed.templates.root {
            config.template_root = root;
        }
        if let Some(extension) = parsed.templates.extension {
            config = config.with_extension(extension);
        }
        if let Some(dir) = parsed.cache.dir {
            config.cache_dir = dir;
        }
        if let Some(max_depth) = parsed.render.max_depth {
            config.max_depth = max_depth;
        }

        Ok(config)
    }
}

fn rebase(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path
    }
}

//! viewkit - template compilation and component rendering
//!
//! Templates are plain text with directives for layout inheritance
//! (`@extends`, `@section`, `@yield`), composition (`@partial`, `@include`),
//! control flow and output. They are compiled once into a cached program and
//! re-compiled whenever the source file is newer than its artifact.
//!
//! # Example
//!
//! ```no_run
//! use viewkit::{Component, Engine, EngineConfig, Page};
//!
//! let engine = Engine::new(&EngineConfig::new().with_template_root("templates")).unwrap();
//! let page = Page::builder()
//!     .header(Component::new("header").with("title", "Welcome").into_view())
//!     .view(Component::new("home").with("body", "Hello"))
//!     .footer(Component::new("footer").with("year", 2024).into_view())
//!     .with_partial("sidebar", Component::new("sidebar").into_partial())
//!     .build()
//!     .unwrap();
//! let html = engine.render(&page.into()).unwrap();
//! ```

pub mod compiler;
pub mod config;
pub mod error;
pub mod renderer;
pub mod template;

use std::path::Path;

use thiserror::Error;
use tracing::error;

pub use compiler::{Compiler, Program};
pub use config::{ConfigError, EngineConfig};
pub use error::CompileError;
pub use renderer::{
    Capability, Component, ComponentRenderer, Data, Dispatcher, Page, PageBuilder, Partials,
    RenderContext, Renderable, RenderableKind, RendererRegistry, ViewApi,
};
pub use template::{TemplateCache, TemplateDirectory, TemplateError, TemplateProcessingService};

/// Errors that can occur while rendering
#[derive(Debug, Error)]
pub enum RenderError {
    /// Locating, compiling or loading a template failed
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Renderable is missing something it needs, such as a template id
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// No renderer registered for the kind or any of its capabilities
    #[error("no renderer registered for {kind} renderables")]
    UnsupportedRenderable { kind: RenderableKind },

    /// Partials or includes nested deeper than the configured limit
    #[error("render depth limit of {limit} exceeded")]
    DepthExceeded { limit: usize },

    /// Engine configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RenderError {
    /// The underlying compile error, if rendering failed to compile a template
    pub fn compile_error(&self) -> Option<(&CompileError, Option<&str>)> {
        match self {
            RenderError::Template(TemplateError::Compile { template, error }) => {
                Some((error, template.as_deref()))
            }
            _ => None,
        }
    }
}

/// Configured rendering engine
#[derive(Debug, Clone)]
pub struct Engine {
    dispatcher: Dispatcher,
}

impl Engine {
    /// Build an engine with the standard renderers
    pub fn new(config: &EngineConfig) -> Result<Self, RenderError> {
        Self::with_registry(config, RendererRegistry::standard())
    }

    /// Build an engine with a caller-supplied dispatch table
    pub fn with_registry(
        config: &EngineConfig,
        registry: RendererRegistry,
    ) -> Result<Self, RenderError> {
        let directory = TemplateDirectory::new(&config.template_root)?;
        let directory = match &config.extension {
            Some(extension) => directory.with_extension(extension.as_str()),
            None => directory.without_extension(),
        };
        let service = TemplateProcessingService::new(directory, TemplateCache::new(&config.cache_dir));

        Ok(Self {
            dispatcher: Dispatcher::new(service, registry).with_max_depth(config.max_depth),
        })
    }

    /// Build an engine from a TOML config file
    pub fn from_config_file(path: &Path) -> Result<Self, RenderError> {
        Self::new(&EngineConfig::from_file(path)?)
    }

    /// Render a renderable to a complete string
    pub fn render(&self, renderable: &Renderable) -> Result<String, RenderError> {
        self.dispatcher.render(renderable).inspect_err(|e| {
            error!(
                kind = %renderable.kind(),
                template = renderable.template_id(),
                error = %e,
                "render failed"
            )
        })
    }

    /// Compile (or reuse) a template and return its program
    pub fn compile(&self, template_id: &str) -> Result<Program, RenderError> {
        Ok(self.dispatcher.service().load(template_id)?)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn service(&self) -> &TemplateProcessingService {
        self.dispatcher.service()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn engine(files: &[(&str, &str)]) -> (TempDir, Engine) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("templates");
        fs::create_dir_all(&root).unwrap();
        for (name, content) in files {
            fs::write(root.join(name), content).unwrap();
        }
        let config = EngineConfig::new()
            .with_template_root(&root)
            .with_cache_dir(dir.path().join("cache"));
        let engine = Engine::new(&config).unwrap();
        (dir, engine)
    }

    #[test]
    fn test_render_view() {
        let (_dir, engine) = engine(&[("hello.html", "Hello {{ name }}!")]);
        let view = Component::new("hello").with("name", "Ada").into_view();
        assert_eq!(engine.render(&view).unwrap(), "Hello Ada!");
    }

    #[test]
    fn test_missing_root_is_template_error() {
        let config = EngineConfig::new().with_template_root("/nonexistent/viewkit/root");
        assert!(matches!(
            Engine::new(&config),
            Err(RenderError::Template(TemplateError::InvalidRoot { .. }))
        ));
    }

    #[test]
    fn test_compile_error_is_exposed() {
        let (_dir, engine) = engine(&[("bad.html", "@foreach(items as)<x>@endforeach")]);
        let err = engine
            .render(&Component::new("bad").into_view())
            .unwrap_err();
        let (_, template) = err.compile_error().unwrap();
        assert_eq!(template, Some("bad"));
    }

    #[test]
    fn test_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("views")).unwrap();
        fs::write(dir.path().join("views/a.txt"), "plain").unwrap();
        let path = dir.path().join("engine.toml");
        fs::write(
            &path,
            "[templates]\nroot = \"views\"\nextension = \"txt\"\n[cache]\ndir = \"cache\"\n",
        )
        .unwrap();

        let engine = Engine::from_config_file(&path).unwrap();
        let out = engine.render(&Component::new("a").into_view()).unwrap();
        assert_eq!(out, "plain");
        assert!(dir.path().join("cache").is_dir());
    }

    #[test]
    fn test_bad_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        fs::write(&path, "[render]\nmax_depth = \"deep\"\n").unwrap();
        assert!(matches!(
            Engine::from_config_file(&path),
            Err(RenderError::Config(ConfigError::ParseError(_)))
        ));
    }
}

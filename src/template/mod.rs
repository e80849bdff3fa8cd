//! Template storage: locating sources, caching compiled artifacts
//!
//! [`TemplateProcessingService`] is the only way the renderer obtains a compiled
//! program. It resolves an id through [`TemplateDirectory`], consults the
//! [`TemplateCache`] and recompiles when the source is newer than its artifact.

mod cache;
mod directory;
mod service;

pub use cache::TemplateCache;
pub use directory::{SourceLoader, TemplateDirectory, TemplateError};
pub use service::TemplateProcessingService;

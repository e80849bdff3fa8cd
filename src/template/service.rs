//! Template processing: the single compile-or-reuse entry point

use std::fs;
use std::path::PathBuf;

use tracing::{debug, error, trace};

use super::cache::TemplateCache;
use super::directory::{TemplateDirectory, TemplateError};
use crate::compiler::{Compiler, Program};

/// Resolves template ids to fresh compiled artifacts
#[derive(Debug, Clone)]
pub struct TemplateProcessingService {
    directory: TemplateDirectory,
    cache: TemplateCache,
}

impl TemplateProcessingService {
    pub fn new(directory: TemplateDirectory, cache: TemplateCache) -> Self {
        Self { directory, cache }
    }

    pub fn directory(&self) -> &TemplateDirectory {
        &self.directory
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    /// Path of an up-to-date compiled artifact for `template_id`
    ///
    /// Recompiles when the artifact is missing or older than its source.
    pub fn resolve(&self, template_id: &str) -> Result<PathBuf, TemplateError> {
        let source_path = self.directory.resolve(template_id)?;
        let compiled_path = self.cache.compiled_path(&source_path);

        if self.cache.is_stale(&source_path, &compiled_path) {
            debug!(
                template = template_id,
                source = %source_path.display(),
                "compiling template"
            );
            let source = fs::read_to_string(&source_path)
                .map_err(|_| TemplateError::not_found(template_id, &source_path))?;
            let artifact = Compiler::new(&self.directory)
                .compile_to_artifact(&source)
                .map_err(|e| e.in_template(template_id))
                .inspect_err(|e| {
                    error!(template = template_id, error = %e, "template compilation failed")
                })?;
            self.cache.write(&compiled_path, &artifact)?;
        } else {
            trace!(template = template_id, "reusing compiled template");
        }

        Ok(compiled_path)
    }

    /// Resolve and load the compiled program for `template_id`
    pub fn load(&self, template_id: &str) -> Result<Program, TemplateError> {
        let compiled_path = self.resolve(template_id)?;
        let artifact = fs::read_to_string(&compiled_path)
            .map_err(|_| TemplateError::not_found(template_id, &compiled_path))?;
        Program::from_artifact(&artifact).map_err(|source| TemplateError::Artifact {
            path: compiled_path,
            source,
        })
    }
}

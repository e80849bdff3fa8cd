//! On-disk cache of compiled templates

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;

use super::directory::TemplateError;

/// Compiled artifact store rooted at one directory
///
/// Artifact paths are derived from the source *path* only, sharded by the first
/// four hex digits of its SHA-256 into two nested directories:
/// `<dir>/ab/cd/abcd....json`.
#[derive(Debug, Clone)]
pub struct TemplateCache {
    dir: PathBuf,
}

impl TemplateCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic artifact path for a source file
    pub fn compiled_path(&self, source: &Path) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(source.to_string_lossy().as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        self.dir
            .join(&digest[0..2])
            .join(&digest[2..4])
            .join(format!("{}.json", digest))
    }

    /// True when the artifact is missing or the source is strictly newer
    pub fn is_stale(&self, source: &Path, compiled: &Path) -> bool {
        let Some(compiled_mtime) = modified(compiled) else {
            return true;
        };
        match modified(source) {
            Some(source_mtime) => source_mtime > compiled_mtime,
            // unreadable source: let the caller's read report it
            None => true,
        }
    }

    /// Persist an artifact atomically
    ///
    /// Content goes to a temporary file next to the target and is renamed into
    /// place, so concurrent readers never observe a partially written artifact.
    pub fn write(&self, compiled: &Path, content: &str) -> Result<(), TemplateError> {
        let parent = compiled.parent().unwrap_or(&self.dir);
        fs::create_dir_all(parent).map_err(|e| TemplateError::io(parent, e))?;

        let mut file = NamedTempFile::new_in(parent).map_err(|e| TemplateError::io(parent, e))?;
        file.write_all(content.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| TemplateError::io(file.path(), e))?;
        file.persist(compiled)
            .map_err(|e| TemplateError::io(compiled, e.error))?;

        debug!(path = %compiled.display(), bytes = content.len(), "wrote compiled template");
        Ok(())
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

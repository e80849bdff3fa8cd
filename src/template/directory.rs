//! Template directory: maps logical template ids to source files under one root

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::error::CompileError;

/// Errors that can occur while locating, compiling or caching templates
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template id tries to leave the template root
    #[error("template id '{template}' escapes the template root")]
    Security { template: String },

    /// Template root missing or not a directory
    #[error("template root {path} is not a readable directory")]
    InvalidRoot { path: PathBuf },

    /// Source or compiled file missing or unreadable
    #[error("template not found: {template} ({path})")]
    NotFound { template: String, path: PathBuf },

    /// Filesystem failure while writing the cache
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Compiled program could not be serialized
    #[error("could not serialize compiled template: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },

    /// Compiled artifact on disk is not a valid program
    #[error("invalid compiled artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Template source failed to compile
    #[error("compile error in {}: {error}", template.as_deref().unwrap_or("<source>"))]
    Compile {
        template: Option<String>,
        #[source]
        error: CompileError,
    },
}

impl From<CompileError> for TemplateError {
    fn from(error: CompileError) -> Self {
        TemplateError::Compile {
            template: None,
            error,
        }
    }
}

impl TemplateError {
    pub fn not_found(template: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            template: template.into(),
            path: path.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Name the template a compile error came from
    pub fn in_template(self, id: &str) -> Self {
        match self {
            Self::Compile {
                template: None,
                error,
            } => Self::Compile {
                template: Some(id.to_string()),
                error,
            },
            other => other,
        }
    }
}

/// Source of raw template text by logical id
pub trait SourceLoader {
    fn load(&self, template_id: &str) -> Result<String, TemplateError>;
}

impl<L: SourceLoader + ?Sized> SourceLoader for &L {
    fn load(&self, template_id: &str) -> Result<String, TemplateError> {
        (**self).load(template_id)
    }
}

/// In-memory sources keyed by id, handy for embedding and tests
impl SourceLoader for HashMap<String, String> {
    fn load(&self, template_id: &str) -> Result<String, TemplateError> {
        self.get(template_id)
            .cloned()
            .ok_or_else(|| TemplateError::not_found(template_id, template_id))
    }
}

/// A validated template root directory
#[derive(Debug, Clone)]
pub struct TemplateDirectory {
    /// Canonical root path
    root: PathBuf,
    /// Extension appended to ids that have none
    extension: Option<String>,
}

impl TemplateDirectory {
    /// Open a template root. The root is validated once, here.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let root = root.as_ref();
        let invalid = || TemplateError::InvalidRoot {
            path: root.to_path_buf(),
        };
        let canonical = root.canonicalize().map_err(|_| invalid())?;
        if !canonical.is_dir() {
            return Err(invalid());
        }

        Ok(Self {
            root: canonical,
            extension: Some("html".to_string()),
        })
    }

    /// Set the extension appended to ids without one
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        let extension = extension.trim_start_matches('.');
        self.extension = if extension.is_empty() {
            None
        } else {
            Some(extension.to_string())
        };
        self
    }

    /// Use ids verbatim as file names
    pub fn without_extension(mut self) -> Self {
        self.extension = None;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Resolve a template id to the absolute path of an existing, readable file
    ///
    /// Separators are normalised (`\` becomes `/`), empty and `.` segments are
    /// dropped, and any `..` segment is rejected outright.
    pub fn resolve(&self, template_id: &str) -> Result<PathBuf, TemplateError> {
        let normalized = template_id.replace('\\', "/");
        let mut relative = PathBuf::new();

        for segment in normalized.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(self.traversal(template_id)),
                // on Windows a colon starts a drive prefix or an alternate data stream
                s if cfg!(windows) && s.contains(':') => return Err(self.traversal(template_id)),
                s => relative.push(s),
            }
        }

        if relative.as_os_str().is_empty() {
            return Err(TemplateError::not_found(template_id, &self.root));
        }
        if let Some(extension) = &self.extension {
            if relative.extension().is_none() {
                relative.set_extension(extension);
            }
        }

        let candidate = self.root.join(&relative);
        let resolved = candidate
            .canonicalize()
            .map_err(|_| TemplateError::not_found(template_id, &candidate))?;

        // symlinks may still point outside
        if !resolved.starts_with(&self.root) {
            return Err(self.traversal(template_id));
        }
        if !resolved.is_file() || File::open(&resolved).is_err() {
            return Err(TemplateError::not_found(template_id, &resolved));
        }

        Ok(resolved)
    }

    fn traversal(&self, template_id: &str) -> TemplateError {
        warn!(template = template_id, root = %self.root.display(), "rejected template path traversal");
        TemplateError::Security {
            template: template_id.to_string(),
        }
    }
}

impl SourceLoader for TemplateDirectory {
    fn load(&self, template_id: &str) -> Result<String, TemplateError> {
        let path = self.resolve(template_id)?;
        fs::read_to_string(&path).map_err(|_| TemplateError::not_found(template_id, &path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn site(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        dir
    }

    #[test]
    fn test_resolve_appends_extension() {
        let dir = site(&[("layouts/main.html", "x")]);
        let templates = TemplateDirectory::new(dir.path()).unwrap();
        let path = templates.resolve("layouts/main").unwrap();
        assert!(path.ends_with("layouts/main.html"));
        assert!(path.starts_with(templates.root()));
    }

    #[test]
    fn test_resolve_normalizes_separators() {
        let dir = site(&[("partials/nav.html", "x")]);
        let templates = TemplateDirectory::new(dir.path()).unwrap();
        let a = templates.resolve("partials\\nav").unwrap();
        let b = templates.resolve("/partials//./nav.html").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_traversal_is_rejected() {
        let dir = site(&[("home.html", "x")]);
        let templates = TemplateDirectory::new(dir.path()).unwrap();
        for id in ["../../etc/passwd", "..\\..\\etc\\passwd", "a/../../home", ".."] {
            assert!(
                matches!(templates.resolve(id), Err(TemplateError::Security { .. })),
                "{} should be rejected",
                id
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_colon_is_an_ordinary_character() {
        let dir = site(&[("reports/q1:2024.html", "x")]);
        let templates = TemplateDirectory::new(dir.path()).unwrap();
        let path = templates.resolve("reports/q1:2024").unwrap();
        assert!(path.ends_with("reports/q1:2024.html"));
    }

    #[cfg(windows)]
    #[test]
    fn test_drive_prefix_is_rejected() {
        let dir = site(&[("home.html", "x")]);
        let templates = TemplateDirectory::new(dir.path()).unwrap();
        for id in ["C:/Windows/win.ini", "home.html:stream"] {
            assert!(matches!(
                templates.resolve(id),
                Err(TemplateError::Security { .. })
            ));
        }
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = site(&[]);
        let templates = TemplateDirectory::new(dir.path()).unwrap();
        assert!(matches!(
            templates.resolve("nope"),
            Err(TemplateError::NotFound { .. })
        ));
        assert!(matches!(
            templates.resolve(""),
            Err(TemplateError::NotFound { .. })
        ));
    }

    #[test]
    fn test_directory_is_not_a_template() {
        let dir = site(&[("pages/home.html", "x")]);
        let templates = TemplateDirectory::new(dir.path()).unwrap().without_extension();
        assert!(matches!(
            templates.resolve("pages"),
            Err(TemplateError::NotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_root() {
        let dir = site(&[("file.txt", "x")]);
        assert!(matches!(
            TemplateDirectory::new(dir.path().join("missing")),
            Err(TemplateError::InvalidRoot { .. })
        ));
        assert!(matches!(
            TemplateDirectory::new(dir.path().join("file.txt")),
            Err(TemplateError::InvalidRoot { .. })
        ));
    }

    #[test]
    fn test_with_extension_strips_dot() {
        let dir = site(&[("mail.txt", "x")]);
        let templates = TemplateDirectory::new(dir.path())
            .unwrap()
            .with_extension(".txt");
        assert_eq!(templates.extension(), Some("txt"));
        assert!(templates.resolve("mail").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_rejected() {
        let outside = site(&[("secret.html", "x")]);
        let dir = site(&[]);
        std::os::unix::fs::symlink(outside.path().join("secret.html"), dir.path().join("leak.html"))
            .unwrap();
        let templates = TemplateDirectory::new(dir.path()).unwrap();
        assert!(matches!(
            templates.resolve("leak"),
            Err(TemplateError::Security { .. })
        ));
    }

    #[test]
    fn test_load_reads_source() {
        let dir = site(&[("home.html", "<p>hi</p>")]);
        let templates = TemplateDirectory::new(dir.path()).unwrap();
        assert_eq!(templates.load("home").unwrap(), "<p>hi</p>");
    }
}

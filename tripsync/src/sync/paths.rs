use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("file identity is empty")]
    Empty,
    #[error("file identity contains unsupported component: {0}")]
    UnsupportedComponent(String),
    #[error("source path has no file name: {}", .0.display())]
    NoFileName(PathBuf),
}

/// Relative path addressing one file in the remote namespace, e.g. `trips/42/images/a.jpg`.
///
/// Identities are POSIX-like and normalised on construction: leading slashes and `.` segments
/// are dropped, `..` is rejected so a resolved path can never leave the local root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileIdentity(String);

impl FileIdentity {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, PathError> {
        let raw = raw.as_ref();
        let mut parts = Vec::new();
        for part in raw.split('/') {
            match part {
                "" | "." => continue,
                ".." => return Err(PathError::UnsupportedComponent(raw.to_string())),
                part if part.contains('\\') => {
                    return Err(PathError::UnsupportedComponent(raw.to_string()));
                }
                part => parts.push(part),
            }
        }
        if parts.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(parts.join("/")))
    }

    pub fn join(prefix: &str, name: &str) -> Result<Self, PathError> {
        Self::new(format!("{prefix}/{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final segment of the identity.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FileIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for FileIdentity {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Maps identities under a fixed local root. Pure and deterministic.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, identity: &FileIdentity) -> PathBuf {
        let mut out = self.root.clone();
        for part in identity.as_str().split('/') {
            out.push(part);
        }
        out
    }
}

/// Stable name for a freshly captured file: the final component of its source path.
pub fn file_name_from_source(source: &Path) -> Result<String, PathError> {
    source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| PathError::NoFileName(source.to_path_buf()))
}

//! Injectable view of the process environment.
//!
//! Strategy selection only ever looks at the world through [`Environment`],
//! which keeps it deterministic and testable without touching real variables
//! or files.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Read-only source of environment variables and small configuration files.
#[async_trait]
pub trait Environment: Send + Sync {
    /// Returns the value of `key`, or `None` when unset.
    fn var(&self, key: &str) -> Option<String>;

    /// Reads the file at `path` to a string.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    async fn read_file(&self, path: &Path) -> io::Result<Option<String>>;

    /// Returns the value of `key` if it is set and not blank.
    fn non_empty_var(&self, key: &str) -> Option<String> {
        self.var(key)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    /// Interprets `key` as a boolean flag (`1`, `true`, `yes`, `on`).
    fn flag(&self, key: &str) -> bool {
        self.non_empty_var(key).is_some_and(|value| {
            matches!(
                value.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    }
}

/// The real process environment and filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

#[async_trait]
impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    async fn read_file(&self, path: &Path) -> io::Result<Option<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// A fixed snapshot of variables and files.
///
/// Used by tests and by callers that want to resolve against explicit values
/// instead of the ambient process state.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    vars: HashMap<String, String>,
    files: HashMap<PathBuf, String>,
}

impl StaticEnvironment {
    /// Creates an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a variable.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Adds a file with the given contents.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    /// Removes a variable.
    pub fn remove_var(&mut self, key: &str) {
        self.vars.remove(key);
    }
}

#[async_trait]
impl Environment for StaticEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    async fn read_file(&self, path: &Path) -> io::Result<Option<String>> {
        Ok(self.files.get(path).cloned())
    }
}

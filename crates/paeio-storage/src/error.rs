//! Error types for storage gateway operations.

use crate::backend::{BackendError, BackendErrorKind};

/// Result type for all gateway operations.
pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// Failure of a gateway operation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No credential could be obtained for the first attempt of the operation.
    #[error(transparent)]
    Credential(#[from] paeio_credential::Error),

    /// The backend rejected the credential, and the single re-resolution
    /// either failed or produced a credential that was rejected as well.
    #[error("{operation} '{path}' failed after re-authentication: {reason}")]
    ReauthExhausted {
        operation: &'static str,
        path: String,
        reason: String,
    },

    /// The object does not exist.
    #[error("object not found: {path}")]
    NotFound { path: String },

    /// Network or object-level failure reported by the backend.
    #[error("{operation} '{path}' failed: {source}")]
    Backend {
        operation: &'static str,
        path: String,
        #[source]
        source: BackendError,
    },

    /// The path is neither a key nor a recognized Azure storage URI.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// The glob pattern could not be compiled.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The payload could not be encoded or decoded.
    #[error("payload error: {reason}")]
    Payload { reason: String },

    /// Invalid gateway configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl StorageError {
    /// Create an invalid path error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid pattern error.
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Create a payload error.
    pub fn payload(reason: impl Into<String>) -> Self {
        Self::Payload {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a re-authentication exhausted error.
    pub fn reauth_exhausted(
        operation: &'static str,
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ReauthExhausted {
            operation,
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Classify a backend failure that is not an authentication rejection.
    pub(crate) fn from_backend(
        operation: &'static str,
        path: impl Into<String>,
        source: BackendError,
    ) -> Self {
        let path = path.into();
        match source.kind() {
            BackendErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Backend {
                operation,
                path,
                source,
            },
        }
    }

    /// Returns the credential error, if resolution failed.
    pub fn as_credential(&self) -> Option<&paeio_credential::Error> {
        match self {
            Self::Credential(err) => Some(err),
            _ => None,
        }
    }

    /// Whether the operation may succeed if retried unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Credential(err) => err.is_retryable(),
            Self::Backend { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Get a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            Self::Credential(err) => err.user_message(),
            Self::ReauthExhausted { path, .. } => format!(
                "Access to '{path}' was denied again after signing in anew. \
                 The credential may lack permission on this container."
            ),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_classified() {
        let err = StorageError::from_backend(
            "read",
            "data/missing.csv",
            BackendError::new(BackendErrorKind::NotFound, "404"),
        );
        assert!(matches!(err, StorageError::NotFound { ref path } if path == "data/missing.csv"));
    }

    #[test]
    fn transport_is_retryable() {
        let err = StorageError::from_backend(
            "write",
            "data/out.csv",
            BackendError::new(BackendErrorKind::Transport, "connection reset"),
        );
        assert!(err.is_retryable());
        assert!(err.to_string().starts_with("write 'data/out.csv' failed"));
    }

    #[test]
    fn credential_errors_keep_their_message() {
        let err = StorageError::from(paeio_credential::Error::no_strategy(Vec::new()));
        assert_eq!(err.to_string(), "no credential strategy applicable");
        assert!(err.as_credential().is_some());
    }
}

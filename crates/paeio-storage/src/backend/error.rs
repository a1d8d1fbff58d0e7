//! Classified backend failure.

use std::fmt;

use strum::{AsRefStr, Display};

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// What went wrong at the storage service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum BackendErrorKind {
    /// The service rejected the credential (HTTP 401/403).
    AuthRejected,
    /// The object does not exist.
    NotFound,
    /// The object already exists.
    AlreadyExists,
    /// A conditional request failed.
    Precondition,
    /// Network failure or server error.
    Transport,
    /// Anything else, including client construction failures.
    Other,
}

/// Backend error carrying a kind, a message, and an optional source.
pub struct BackendError {
    kind: BackendErrorKind,
    message: String,
    source: Option<BoxedError>,
}

impl BackendError {
    /// Create an error of the given kind.
    pub fn new(kind: BackendErrorKind, message: impl fmt::Display) -> Self {
        Self {
            kind,
            message: message.to_string(),
            source: None,
        }
    }

    /// Create an authentication rejection.
    pub fn auth_rejected(message: impl fmt::Display) -> Self {
        Self::new(BackendErrorKind::AuthRejected, message)
    }

    /// Attach a source error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The failure classification.
    pub fn kind(&self) -> BackendErrorKind {
        self.kind
    }

    /// Whether the service rejected the credential.
    pub fn is_auth_rejected(&self) -> bool {
        self.kind == BackendErrorKind::AuthRejected
    }

    /// Whether the caller could retry this operation unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind == BackendErrorKind::Transport
    }
}

impl From<object_store::Error> for BackendError {
    fn from(err: object_store::Error) -> Self {
        let kind = match &err {
            object_store::Error::Unauthenticated { .. }
            | object_store::Error::PermissionDenied { .. } => BackendErrorKind::AuthRejected,
            object_store::Error::NotFound { .. } => BackendErrorKind::NotFound,
            object_store::Error::AlreadyExists { .. } => BackendErrorKind::AlreadyExists,
            object_store::Error::Precondition { .. }
            | object_store::Error::NotModified { .. } => BackendErrorKind::Precondition,
            object_store::Error::Generic { .. } => BackendErrorKind::Transport,
            _ => BackendErrorKind::Other,
        };

        Self::new(kind, &err).with_source(err)
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl fmt::Debug for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("source", &self.source)
            .finish()
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

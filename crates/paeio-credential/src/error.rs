//! Error types for credential resolution.

use std::path::PathBuf;
use std::time::Duration;

use crate::strategy::{PartialConfiguration, StrategyKind};

/// Result type for all resolution operations in this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Classified resolution failure.
///
/// Every variant is cheap to clone: a failed in-flight resolution is handed to
/// all callers that were waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// No strategy had all of its required inputs.
    #[error("no credential strategy applicable{}", describe_diagnostics(.diagnostics))]
    NoStrategyApplicable {
        /// Partially configured strategies encountered during selection.
        diagnostics: Vec<PartialConfiguration>,
    },

    /// Inputs were complete but the identity provider rejected them.
    #[error("{strategy} authentication rejected: {reason}")]
    StrategyAuthFailed {
        strategy: StrategyKind,
        reason: String,
    },

    /// The identity provider could not be reached or answered garbage.
    #[error("{strategy} authentication failed in transport: {reason}")]
    AuthTransport {
        strategy: StrategyKind,
        reason: String,
    },

    /// The user did not complete the device-code flow in time.
    #[error("interactive login not completed within {timeout:?}")]
    InteractiveTimeout { timeout: Duration },

    /// The interactive flow was cancelled through the resolver's cancellation token.
    #[error("interactive login cancelled")]
    InteractiveCancelled,

    /// The credentials file exists but could not be read.
    #[error("failed to read credentials file '{}': {reason}", path.display())]
    CredentialsFile { path: PathBuf, reason: String },

    /// Invalid resolver configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create a no-strategy error carrying the selection diagnostics.
    pub fn no_strategy(diagnostics: Vec<PartialConfiguration>) -> Self {
        Self::NoStrategyApplicable { diagnostics }
    }

    /// Create an authentication rejection error.
    pub fn auth_failed(strategy: StrategyKind, reason: impl Into<String>) -> Self {
        Self::StrategyAuthFailed {
            strategy,
            reason: reason.into(),
        }
    }

    /// Create a transport failure error.
    pub fn auth_transport(strategy: StrategyKind, reason: impl Into<String>) -> Self {
        Self::AuthTransport {
            strategy,
            reason: reason.into(),
        }
    }

    /// Create a credentials file error.
    pub fn credentials_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CredentialsFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns the strategy this error is attributed to, if any.
    pub fn strategy(&self) -> Option<StrategyKind> {
        match self {
            Self::StrategyAuthFailed { strategy, .. } | Self::AuthTransport { strategy, .. } => {
                Some(*strategy)
            }
            Self::InteractiveTimeout { .. } | Self::InteractiveCancelled => {
                Some(StrategyKind::InteractiveLogin)
            }
            _ => None,
        }
    }

    /// Whether retrying the same resolution later could succeed without
    /// changing any configuration.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AuthTransport { .. } | Self::InteractiveTimeout { .. }
        )
    }

    /// Get a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            Self::NoStrategyApplicable { diagnostics } if !diagnostics.is_empty() => {
                let parts: Vec<String> = diagnostics.iter().map(ToString::to_string).collect();
                format!(
                    "Azure credentials are only partially configured: {}. \
                     Provide the missing values or allow interactive login.",
                    parts.join("; ")
                )
            }
            Self::NoStrategyApplicable { .. } => format!(
                "No Azure credentials found. Provide a credentials file, set {}, {} and {}, \
                 or allow interactive login.",
                crate::AZURE_CLIENT_ID,
                crate::AZURE_CLIENT_SECRET,
                crate::AZURE_TENANT_ID
            ),
            Self::StrategyAuthFailed { strategy, .. } => {
                format!("The {strategy} credentials were rejected. Check that they are still valid.")
            }
            Self::InteractiveTimeout { timeout } => {
                format!("Interactive login was not completed within {timeout:?}.")
            }
            other => other.to_string(),
        }
    }
}

fn describe_diagnostics(diagnostics: &[PartialConfiguration]) -> String {
    if diagnostics.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = diagnostics.iter().map(ToString::to_string).collect();
    format!(" ({})", parts.join("; "))
}

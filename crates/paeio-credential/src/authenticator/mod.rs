//! Identity provider seam.
//!
//! [`Authenticator`] exchanges strategy inputs for an [`AccessToken`]. The
//! resolver owns the decision of which grant to run and the timeout around
//! it; implementations only speak to the identity provider.

mod aad;

use std::time::Duration;

use async_trait::async_trait;
pub use aad::AadAuthenticator;

use crate::strategy::{InteractiveSettings, ServicePrincipal};
use crate::token::AccessToken;
use crate::TRACING_TARGET_AUTHENTICATOR;

/// Failure reported by an [`Authenticator`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// The identity provider refused the presented credentials.
    #[error("credentials rejected: {0}")]
    Rejected(String),

    /// The user declined the device-code request.
    #[error("login declined by user")]
    Declined,

    /// The device code expired before the user completed the login.
    #[error("device code expired")]
    Expired,

    /// Network or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl AuthError {
    /// Creates a rejection error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    /// Creates a transport error.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport(reason.into())
    }
}

/// Inputs of a device-code login.
pub type DeviceCodeRequest = InteractiveSettings;

/// Instructions the user must follow to finish a device-code login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCodePrompt {
    /// Short code the user types on the verification page.
    pub user_code: String,
    /// Page where the code is entered.
    pub verification_uri: String,
    /// Human readable instructions from the provider.
    pub message: String,
    /// Lifetime of the device code.
    pub expires_in: Duration,
}

/// Displays device-code instructions to the user.
pub trait DeviceCodeNotifier: Send + Sync {
    /// Called once per device-code flow, before polling starts.
    fn notify(&self, prompt: &DeviceCodePrompt);
}

/// Prints the provider's instructions to standard error.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrNotifier;

impl DeviceCodeNotifier for StderrNotifier {
    fn notify(&self, prompt: &DeviceCodePrompt) {
        tracing::info!(
            target: TRACING_TARGET_AUTHENTICATOR,
            verification_uri = %prompt.verification_uri,
            expires_in_secs = prompt.expires_in.as_secs(),
            "Waiting for device code login"
        );

        eprintln!("{}", prompt.message);
    }
}

/// Exchanges strategy inputs for access tokens.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// Runs the client-credentials grant for a service principal.
    async fn client_secret(&self, principal: &ServicePrincipal) -> Result<AccessToken, AuthError>;

    /// Runs the device-code grant, calling `notifier` with the user
    /// instructions and then waiting for the user to complete the login.
    async fn device_code(
        &self,
        request: &DeviceCodeRequest,
        notifier: &dyn DeviceCodeNotifier,
    ) -> Result<AccessToken, AuthError>;
}

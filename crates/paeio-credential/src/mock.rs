//! Scripted [`Authenticator`] and [`DeviceCodeNotifier`] for tests.
//!
//! Available with the `mock` feature:
//!
//! ```toml
//! [dev-dependencies]
//! paeio-credential = { version = "...", features = ["mock"] }
//! ```
//!
//! ```rust,ignore
//! use paeio_credential::mock::MockAuthenticator;
//!
//! let mock = Arc::new(MockAuthenticator::new().reject_client_secret("invalid_client"));
//! let resolver = CredentialResolver::new(ResolverConfig::default(), mock.clone());
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use jiff::SignedDuration;

use crate::authenticator::{
    AuthError, Authenticator, DeviceCodeNotifier, DeviceCodePrompt, DeviceCodeRequest,
};
use crate::strategy::ServicePrincipal;
use crate::token::AccessToken;

#[derive(Debug, Clone)]
enum DeviceCodeBehavior {
    Grant,
    Fail(AuthError),
    Pending,
}

/// Authenticator that issues fake tokens and counts its calls.
#[derive(Debug)]
pub struct MockAuthenticator {
    delay: Option<Duration>,
    lifetime: SignedDuration,
    client_secret_error: Mutex<Option<AuthError>>,
    device_code: DeviceCodeBehavior,
    client_secret_calls: AtomicUsize,
    device_code_calls: AtomicUsize,
    principals: Mutex<Vec<String>>,
}

impl Default for MockAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAuthenticator {
    /// Grants one-hour tokens for every request.
    pub fn new() -> Self {
        Self {
            delay: None,
            lifetime: SignedDuration::from_hours(1),
            client_secret_error: Mutex::new(None),
            device_code: DeviceCodeBehavior::Grant,
            client_secret_calls: AtomicUsize::new(0),
            device_code_calls: AtomicUsize::new(0),
            principals: Mutex::new(Vec::new()),
        }
    }

    /// Waits `delay` before answering any request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Lifetime of issued tokens.
    pub fn with_lifetime(mut self, lifetime: SignedDuration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Rejects every client-secret request.
    pub fn reject_client_secret(self, reason: impl Into<String>) -> Self {
        self.set_client_secret_error(Some(AuthError::rejected(reason)));
        self
    }

    /// Fails every client-secret request with a transport error.
    pub fn fail_transport(self, reason: impl Into<String>) -> Self {
        self.set_client_secret_error(Some(AuthError::transport(reason)));
        self
    }

    /// Changes the client-secret outcome of later calls. `None` grants tokens.
    pub fn set_client_secret_error(&self, error: Option<AuthError>) {
        *lock(&self.client_secret_error) = error;
    }

    /// Device-code logins never complete.
    pub fn pending_device_code(mut self) -> Self {
        self.device_code = DeviceCodeBehavior::Pending;
        self
    }

    /// Device-code logins are declined by the user.
    pub fn decline_device_code(mut self) -> Self {
        self.device_code = DeviceCodeBehavior::Fail(AuthError::Declined);
        self
    }

    /// Number of client-secret grants requested so far.
    pub fn client_secret_calls(&self) -> usize {
        self.client_secret_calls.load(Ordering::SeqCst)
    }

    /// Number of device-code logins started so far.
    pub fn device_code_calls(&self) -> usize {
        self.device_code_calls.load(Ordering::SeqCst)
    }

    /// Total identity provider calls.
    pub fn total_calls(&self) -> usize {
        self.client_secret_calls() + self.device_code_calls()
    }

    /// Client ids presented to the client-secret grant, in call order.
    pub fn client_secret_principals(&self) -> Vec<String> {
        lock(&self.principals).clone()
    }

    async fn wait(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn issue(&self, prefix: &str, call: usize) -> AccessToken {
        AccessToken::expiring_in(format!("{prefix}-token-{call}"), self.lifetime)
    }
}

#[async_trait]
impl Authenticator for MockAuthenticator {
    async fn client_secret(&self, principal: &ServicePrincipal) -> Result<AccessToken, AuthError> {
        let call = self.client_secret_calls.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.principals).push(principal.client_id.clone());
        self.wait().await;

        let error = lock(&self.client_secret_error).clone();
        match error {
            Some(error) => Err(error),
            None => Ok(self.issue("sp", call)),
        }
    }

    async fn device_code(
        &self,
        _request: &DeviceCodeRequest,
        notifier: &dyn DeviceCodeNotifier,
    ) -> Result<AccessToken, AuthError> {
        let call = self.device_code_calls.fetch_add(1, Ordering::SeqCst) + 1;
        notifier.notify(&DeviceCodePrompt {
            user_code: format!("MOCK-{call}"),
            verification_uri: "https://microsoft.com/devicelogin".into(),
            message: format!("Enter MOCK-{call} at https://microsoft.com/devicelogin"),
            expires_in: Duration::from_secs(900),
        });
        self.wait().await;

        match &self.device_code {
            DeviceCodeBehavior::Grant => Ok(self.issue("interactive", call)),
            DeviceCodeBehavior::Fail(error) => Err(error.clone()),
            DeviceCodeBehavior::Pending => std::future::pending().await,
        }
    }
}

/// Notifier that records prompts instead of printing them.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    prompts: Mutex<Vec<DeviceCodePrompt>>,
}

impl RecordingNotifier {
    /// Number of prompts shown.
    pub fn prompts(&self) -> usize {
        lock(&self.prompts).len()
    }

    /// The most recent prompt.
    pub fn last_prompt(&self) -> Option<DeviceCodePrompt> {
        lock(&self.prompts).last().cloned()
    }
}

impl DeviceCodeNotifier for RecordingNotifier {
    fn notify(&self, prompt: &DeviceCodePrompt) {
        lock(&self.prompts).push(prompt.clone());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

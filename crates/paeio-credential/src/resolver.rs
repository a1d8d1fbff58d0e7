//! Memoized, single-flight credential resolution.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

use crate::authenticator::{AuthError, Authenticator, DeviceCodeNotifier, StderrNotifier};
use crate::config::{ResolveOverrides, ResolverConfig};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::strategy::{
    CredentialStrategy, InteractiveSettings, PartialConfiguration, StrategyKind, select_strategy,
};
use crate::token::{AccessToken, ResolvedCredential};
use crate::token_cache::TokenCache;
use crate::TRACING_TARGET_RESOLVER;

/// Failed authentication attempt, kept so that callers queued behind it
/// receive the same outcome instead of starting another attempt.
struct Failure {
    attempt: u64,
    fingerprint: String,
    error: Error,
}

#[derive(Default)]
struct State {
    active: Option<Arc<ResolvedCredential>>,
    last_failure: Option<Failure>,
}

/// Owns the process-wide credential and decides how to obtain it.
///
/// At most one [`ResolvedCredential`] is active at a time. Resolution runs
/// inside a critical section: callers that arrive while another caller is
/// authenticating wait for that attempt and share its result, so N concurrent
/// first calls cause exactly one identity provider round trip or device-code
/// prompt.
///
/// A cached credential is reused as long as the selected strategy and its
/// inputs are unchanged and the token has not expired.
pub struct CredentialResolver {
    config: ResolverConfig,
    authenticator: Arc<dyn Authenticator>,
    notifier: Arc<dyn DeviceCodeNotifier>,
    token_cache: TokenCache,
    interactive_timeout: Duration,
    cancel: CancellationToken,
    completed: AtomicU64,
    state: Mutex<State>,
}

impl CredentialResolver {
    /// Creates a resolver that authenticates through `authenticator`.
    pub fn new(config: ResolverConfig, authenticator: Arc<dyn Authenticator>) -> Self {
        let token_cache = match config.token_cache_path() {
            Some(path) => TokenCache::new(path),
            None => TokenCache::disabled(),
        };

        Self {
            interactive_timeout: config.interactive_timeout(),
            config,
            authenticator,
            notifier: Arc::new(StderrNotifier),
            token_cache,
            cancel: CancellationToken::new(),
            completed: AtomicU64::new(0),
            state: Mutex::new(State::default()),
        }
    }

    /// Replaces how device-code instructions are shown to the user.
    pub fn with_notifier(mut self, notifier: Arc<dyn DeviceCodeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replaces the token cache derived from the configuration.
    pub fn with_token_cache(mut self, token_cache: TokenCache) -> Self {
        self.token_cache = token_cache;
        self
    }

    /// Overrides the interactive login timeout with sub-second precision.
    pub fn with_interactive_timeout(mut self, timeout: Duration) -> Self {
        self.interactive_timeout = timeout;
        self
    }

    /// Returns the resolver configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Token that aborts a running interactive login when cancelled.
    ///
    /// Once cancelled, later resolutions never fall back to interactive login.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Returns the active credential without resolving.
    pub async fn active(&self) -> Option<Arc<ResolvedCredential>> {
        self.state.lock().await.active.clone()
    }

    /// Returns a usable credential, authenticating only when needed.
    ///
    /// A caller that queued behind an attempt which then failed receives that
    /// attempt's error instead of authenticating again, provided its inputs
    /// are the same.
    pub async fn resolve(
        &self,
        env: &dyn Environment,
        overrides: &ResolveOverrides,
    ) -> Result<Arc<ResolvedCredential>> {
        // Sampled before queueing: any attempt finishing after this point
        // was in flight (or queued ahead) when this caller arrived.
        let observed = self.completed.load(Ordering::Acquire);
        let mut state = self.state.lock().await;

        let overrides = self.effective_overrides(overrides);
        let selection = match select_strategy(env, &self.config, &overrides).await {
            Ok(selection) => selection,
            Err(error) => {
                if let Error::NoStrategyApplicable { diagnostics } = &error {
                    warn_partial(diagnostics);
                }
                return Err(error);
            }
        };
        let fingerprint = selection.strategy.fingerprint();

        if let Some(active) = &state.active
            && active.fingerprint() == fingerprint
            && active.is_valid()
        {
            tracing::trace!(
                target: TRACING_TARGET_RESOLVER,
                credential_id = active.id(),
                strategy = %active.strategy(),
                "Reusing active credential"
            );
            return Ok(Arc::clone(active));
        }

        let completed = self.completed.load(Ordering::Acquire);
        if completed != observed
            && let Some(failure) = &state.last_failure
            && failure.attempt == completed
            && failure.fingerprint == fingerprint
        {
            tracing::debug!(
                target: TRACING_TARGET_RESOLVER,
                attempt = failure.attempt,
                "Sharing failure of in-flight resolution"
            );
            return Err(failure.error.clone());
        }

        warn_partial(&selection.diagnostics);

        let kind = selection.strategy.kind();
        tracing::info!(
            target: TRACING_TARGET_RESOLVER,
            strategy = %kind,
            attempt = completed + 1,
            replaces = state.active.as_ref().map(|c| c.id()),
            "Resolving credential"
        );

        let outcome = self.authenticate(&selection.strategy).await;
        let attempt = self.completed.fetch_add(1, Ordering::AcqRel) + 1;

        match outcome {
            Ok(token) => {
                let credential = Arc::new(ResolvedCredential::new(kind, token, fingerprint));
                tracing::info!(
                    target: TRACING_TARGET_RESOLVER,
                    credential_id = credential.id(),
                    strategy = %kind,
                    expires_on = %credential.expires_on(),
                    "Credential resolved"
                );

                state.active = Some(Arc::clone(&credential));
                state.last_failure = None;
                Ok(credential)
            }
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET_RESOLVER,
                    strategy = %kind,
                    attempt,
                    error = %error,
                    "Credential resolution failed"
                );

                state.active = None;
                state.last_failure = Some(Failure {
                    attempt,
                    fingerprint,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    /// Drops `credential` if it is still the active one.
    ///
    /// Returns `false` when another caller already replaced or invalidated
    /// it, in which case the next [`resolve`](Self::resolve) reuses the
    /// replacement instead of authenticating again.
    pub async fn invalidate(&self, credential: &ResolvedCredential) -> bool {
        let mut state = self.state.lock().await;
        if state.active.as_deref() != Some(credential) {
            return false;
        }

        tracing::info!(
            target: TRACING_TARGET_RESOLVER,
            credential_id = credential.id(),
            strategy = %credential.strategy(),
            "Credential invalidated"
        );

        state.active = None;

        // The cached device-code token is what was just rejected.
        if credential.strategy().is_interactive() {
            self.clear_token_cache().await;
        }

        true
    }

    /// Drops the active credential and the interactive token cache.
    pub async fn logout(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.active = None;
        state.last_failure = None;

        let removed = self.token_cache.clear().await.map_err(|e| {
            Error::invalid_config(format!("failed to clear token cache: {e}"))
        })?;

        tracing::info!(
            target: TRACING_TARGET_RESOLVER,
            token_cache_removed = removed,
            "Logged out"
        );

        Ok(())
    }

    fn effective_overrides(&self, overrides: &ResolveOverrides) -> ResolveOverrides {
        if self.cancel.is_cancelled() {
            return overrides.clone().with_interactive(false);
        }
        overrides.clone()
    }

    async fn authenticate(&self, strategy: &CredentialStrategy) -> Result<AccessToken> {
        match strategy {
            CredentialStrategy::ExplicitEnvFile { principal, .. }
            | CredentialStrategy::ServicePrincipal(principal) => self
                .authenticator
                .client_secret(principal)
                .await
                .map_err(|e| classify(strategy.kind(), e)),
            CredentialStrategy::InteractiveLogin(settings) => self.interactive(settings).await,
        }
    }

    async fn interactive(&self, settings: &InteractiveSettings) -> Result<AccessToken> {
        if let Some(token) = self.token_cache.load(settings).await {
            return Ok(token);
        }

        if self.cancel.is_cancelled() {
            return Err(Error::InteractiveCancelled);
        }

        let authenticator = Arc::clone(&self.authenticator);
        let notifier = Arc::clone(&self.notifier);
        let request = settings.clone();
        let mut login = AbortOnDropHandle::new(tokio::spawn(async move {
            authenticator.device_code(&request, notifier.as_ref()).await
        }));

        let timeout = self.interactive_timeout;
        let joined = tokio::select! {
            joined = &mut login => joined,
            () = tokio::time::sleep(timeout) => {
                login.abort();
                tracing::warn!(
                    target: TRACING_TARGET_RESOLVER,
                    timeout_secs = timeout.as_secs_f64(),
                    "Interactive login timed out"
                );
                return Err(Error::InteractiveTimeout { timeout });
            }
            () = self.cancel.cancelled() => {
                login.abort();
                tracing::info!(target: TRACING_TARGET_RESOLVER, "Interactive login cancelled");
                return Err(Error::InteractiveCancelled);
            }
        };

        let token = joined
            .map_err(|e| {
                Error::auth_transport(StrategyKind::InteractiveLogin, format!("login task: {e}"))
            })?
            .map_err(|e| classify(StrategyKind::InteractiveLogin, e))?;

        if let Err(err) = self.token_cache.store(settings, &token).await {
            tracing::warn!(
                target: TRACING_TARGET_RESOLVER,
                error = %err,
                "Failed to cache interactive token"
            );
        }

        Ok(token)
    }

    async fn clear_token_cache(&self) {
        if let Err(err) = self.token_cache.clear().await {
            tracing::warn!(
                target: TRACING_TARGET_RESOLVER,
                error = %err,
                "Failed to clear token cache"
            );
        }
    }
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("config", &self.config)
            .field("token_cache", &self.token_cache)
            .field("interactive_timeout", &self.interactive_timeout)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

fn warn_partial(diagnostics: &[PartialConfiguration]) {
    for diagnostic in diagnostics {
        tracing::warn!(
            target: TRACING_TARGET_RESOLVER,
            strategy = %diagnostic.strategy,
            missing = ?diagnostic.missing,
            note = diagnostic.note.as_deref().unwrap_or_default(),
            "Skipping partially configured credential strategy"
        );
    }
}

fn classify(strategy: StrategyKind, error: AuthError) -> Error {
    match error {
        AuthError::Transport(reason) => Error::auth_transport(strategy, reason),
        rejected => Error::auth_failed(strategy, rejected.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::environment::StaticEnvironment;
    use crate::mock::{MockAuthenticator, RecordingNotifier};
    use crate::{AZURE_CLIENT_ID, AZURE_CLIENT_SECRET, AZURE_TENANT_ID};

    const COMPLETE_FILE: &str =
        "AZURE_CLIENT_ID=file-id\nAZURE_CLIENT_SECRET=file-secret\nAZURE_TENANT_ID=file-tenant\n";

    fn sp_env() -> StaticEnvironment {
        StaticEnvironment::new()
            .with_var(AZURE_CLIENT_ID, "env-id")
            .with_var(AZURE_CLIENT_SECRET, "env-secret")
            .with_var(AZURE_TENANT_ID, "env-tenant")
    }

    fn resolver(mock: &Arc<MockAuthenticator>) -> CredentialResolver {
        let config = ResolverConfig::default().without_token_cache();
        CredentialResolver::new(config, mock.clone())
            .with_notifier(Arc::new(RecordingNotifier::default()))
    }

    fn no_overrides() -> ResolveOverrides {
        ResolveOverrides::new()
    }

    #[tokio::test]
    async fn file_takes_priority_over_environment() {
        let mock = Arc::new(MockAuthenticator::new());
        let env = sp_env().with_file("./credentials.env", COMPLETE_FILE);

        let credential = resolver(&mock).resolve(&env, &no_overrides()).await.unwrap();

        assert_eq!(credential.strategy(), StrategyKind::ExplicitEnvFile);
        assert_eq!(mock.client_secret_principals(), vec!["file-id".to_owned()]);
        assert_eq!(mock.device_code_calls(), 0);
    }

    #[tokio::test]
    async fn resolution_is_idempotent() {
        let mock = Arc::new(MockAuthenticator::new());
        let resolver = resolver(&mock);
        let env = sp_env();

        let first = resolver.resolve(&env, &no_overrides()).await.unwrap();
        let second = resolver.resolve(&env, &no_overrides()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(mock.client_secret_calls(), 1);
    }

    #[tokio::test]
    async fn interactive_resolution_is_idempotent() {
        let mock = Arc::new(MockAuthenticator::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let resolver = resolver(&mock).with_notifier(notifier.clone());
        let env = StaticEnvironment::new();

        let first = resolver.resolve(&env, &no_overrides()).await.unwrap();
        let second = resolver.resolve(&env, &no_overrides()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.strategy(), StrategyKind::InteractiveLogin);
        assert_eq!(mock.device_code_calls(), 1);
        assert_eq!(notifier.prompts(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_calls_authenticate_once() {
        let mock = Arc::new(MockAuthenticator::new().with_delay(Duration::from_millis(50)));
        let resolver = Arc::new(resolver(&mock));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move { resolver.resolve(&sp_env(), &no_overrides()).await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id());
        }

        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(mock.client_secret_calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_failure() {
        let mock = Arc::new(
            MockAuthenticator::new()
                .with_delay(Duration::from_millis(200))
                .reject_client_secret("invalid_client"),
        );
        let resolver = Arc::new(resolver(&mock));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move { resolver.resolve(&sp_env(), &no_overrides()).await })
            })
            .collect();

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, Error::StrategyAuthFailed { .. }));
        }
        assert_eq!(mock.client_secret_calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn late_caller_shares_in_flight_failure() {
        let mock = Arc::new(
            MockAuthenticator::new()
                .with_delay(Duration::from_millis(200))
                .reject_client_secret("invalid_client"),
        );
        let resolver = Arc::new(resolver(&mock));

        let first = {
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move { resolver.resolve(&sp_env(), &no_overrides()).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        let late = resolver.resolve(&sp_env(), &no_overrides()).await.unwrap_err();

        assert!(matches!(late, Error::StrategyAuthFailed { .. }));
        assert!(first.await.unwrap().is_err());
        assert_eq!(mock.client_secret_calls(), 1);

        // Arriving after the failure completed starts a fresh attempt.
        assert!(resolver.resolve(&sp_env(), &no_overrides()).await.is_err());
        assert_eq!(mock.client_secret_calls(), 2);
    }

    #[tokio::test]
    async fn rejected_secret_is_auth_failure() {
        let mock = Arc::new(MockAuthenticator::new().reject_client_secret("invalid_client"));
        let err = resolver(&mock)
            .resolve(&sp_env(), &no_overrides())
            .await
            .unwrap_err();

        let Error::StrategyAuthFailed { strategy, reason } = err else {
            panic!("expected StrategyAuthFailed, got {err:?}");
        };
        assert_eq!(strategy, StrategyKind::ServicePrincipal);
        assert!(reason.contains("invalid_client"));
        assert_eq!(mock.device_code_calls(), 0);
    }

    #[tokio::test]
    async fn rejected_file_does_not_fall_through() {
        let mock = Arc::new(MockAuthenticator::new().reject_client_secret("expired secret"));
        let env = sp_env().with_file("./credentials.env", COMPLETE_FILE);

        let err = resolver(&mock).resolve(&env, &no_overrides()).await.unwrap_err();

        assert_eq!(err.strategy(), Some(StrategyKind::ExplicitEnvFile));
        assert_eq!(mock.client_secret_calls(), 1);
    }

    #[tokio::test]
    async fn transport_failure_is_retryable() {
        let mock = Arc::new(MockAuthenticator::new().fail_transport("connection reset"));
        let err = resolver(&mock)
            .resolve(&sp_env(), &no_overrides())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AuthTransport { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn sequential_retry_after_failure_authenticates_again() {
        let mock = Arc::new(MockAuthenticator::new().fail_transport("connection reset"));
        let resolver = resolver(&mock);

        assert!(resolver.resolve(&sp_env(), &no_overrides()).await.is_err());
        assert!(resolver.resolve(&sp_env(), &no_overrides()).await.is_err());
        assert_eq!(mock.client_secret_calls(), 2);
    }

    #[tokio::test]
    async fn non_interactive_without_inputs_fails_fast() {
        let mock = Arc::new(MockAuthenticator::new());
        let overrides = ResolveOverrides::new().with_interactive(false);

        let err = resolver(&mock)
            .resolve(&StaticEnvironment::new(), &overrides)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoStrategyApplicable { .. }));
        assert_eq!(mock.device_code_calls(), 0);
    }

    #[tokio::test]
    async fn ci_environment_disables_interactive() {
        let mock = Arc::new(MockAuthenticator::new());
        let env = StaticEnvironment::new().with_var("CI", "true");

        let err = resolver(&mock).resolve(&env, &no_overrides()).await.unwrap_err();
        assert!(matches!(err, Error::NoStrategyApplicable { .. }));
    }

    #[tokio::test]
    async fn partial_configuration_is_carried_in_error() {
        let mock = Arc::new(MockAuthenticator::new());
        let env = StaticEnvironment::new()
            .with_var(AZURE_CLIENT_ID, "foo")
            .with_var(AZURE_TENANT_ID, "bar");
        let overrides = ResolveOverrides::new().with_interactive(false);

        let err = resolver(&mock).resolve(&env, &overrides).await.unwrap_err();

        let Error::NoStrategyApplicable { diagnostics } = err else {
            panic!("expected NoStrategyApplicable");
        };
        assert_eq!(diagnostics[0].missing, vec![AZURE_CLIENT_SECRET]);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn partial_configuration_is_logged_when_non_interactive() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer({
                let logs = logs.clone();
                move || logs.clone()
            })
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mock = Arc::new(MockAuthenticator::new());
        let env = StaticEnvironment::new()
            .with_var(AZURE_CLIENT_ID, "foo")
            .with_var(AZURE_TENANT_ID, "bar");
        let overrides = ResolveOverrides::new().with_interactive(false);

        let err = resolver(&mock).resolve(&env, &overrides).await.unwrap_err();

        let output = logs.contents();
        assert!(output.contains("WARN"));
        assert!(output.contains("Skipping partially configured credential strategy"));
        assert!(output.contains("AZURE_CLIENT_SECRET"));
        assert!(err.user_message().contains("AZURE_CLIENT_SECRET"));
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn interactive_login_times_out() {
        let mock = Arc::new(MockAuthenticator::new().pending_device_code());
        let resolver = resolver(&mock).with_interactive_timeout(Duration::from_millis(50));

        let err = resolver
            .resolve(&StaticEnvironment::new(), &no_overrides())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InteractiveTimeout { timeout } if timeout == Duration::from_millis(50)));
        assert!(resolver.active().await.is_none());
    }

    #[tokio::test]
    async fn interactive_login_can_be_cancelled() {
        let mock = Arc::new(MockAuthenticator::new().pending_device_code());
        let resolver = Arc::new(resolver(&mock));
        let cancel = resolver.cancellation_token();

        let task = {
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move {
                resolver
                    .resolve(&StaticEnvironment::new(), &no_overrides())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::InteractiveCancelled));

        // Cancelled resolvers never prompt again.
        let err = resolver
            .resolve(&StaticEnvironment::new(), &no_overrides())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoStrategyApplicable { .. }));
        assert_eq!(mock.device_code_calls(), 1);
    }

    #[tokio::test]
    async fn declined_login_is_auth_failure() {
        let mock = Arc::new(MockAuthenticator::new().decline_device_code());
        let err = resolver(&mock)
            .resolve(&StaticEnvironment::new(), &no_overrides())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::StrategyAuthFailed {
                strategy: StrategyKind::InteractiveLogin,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn invalidate_forces_new_resolution() {
        let mock = Arc::new(MockAuthenticator::new());
        let resolver = resolver(&mock);
        let env = sp_env();

        let first = resolver.resolve(&env, &no_overrides()).await.unwrap();
        assert!(resolver.invalidate(&first).await);
        assert!(!resolver.invalidate(&first).await);

        let second = resolver.resolve(&env, &no_overrides()).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(mock.client_secret_calls(), 2);
    }

    #[tokio::test]
    async fn stale_invalidate_keeps_replacement() {
        let mock = Arc::new(MockAuthenticator::new());
        let resolver = resolver(&mock);
        let env = sp_env();

        let first = resolver.resolve(&env, &no_overrides()).await.unwrap();
        resolver.invalidate(&first).await;
        let second = resolver.resolve(&env, &no_overrides()).await.unwrap();

        assert!(!resolver.invalidate(&first).await);
        assert_eq!(resolver.active().await.as_deref(), Some(second.as_ref()));
    }

    #[tokio::test]
    async fn changed_inputs_replace_credential() {
        let mock = Arc::new(MockAuthenticator::new());
        let resolver = resolver(&mock);

        let first = resolver.resolve(&sp_env(), &no_overrides()).await.unwrap();
        let rotated = sp_env().with_var(AZURE_CLIENT_SECRET, "rotated");
        let second = resolver.resolve(&rotated, &no_overrides()).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(mock.client_secret_calls(), 2);
        assert_eq!(resolver.active().await.as_deref(), Some(second.as_ref()));
    }

    #[tokio::test]
    async fn expired_credential_is_refreshed() {
        let mock = Arc::new(MockAuthenticator::new().with_lifetime(jiff::SignedDuration::from_secs(30)));
        let resolver = resolver(&mock);

        let first = resolver.resolve(&sp_env(), &no_overrides()).await.unwrap();
        assert!(!first.is_valid());
        let second = resolver.resolve(&sp_env(), &no_overrides()).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(mock.client_secret_calls(), 2);
    }

    #[tokio::test]
    async fn interactive_token_cache_survives_resolvers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path().join("token_cache.json"));
        let mock = Arc::new(MockAuthenticator::new());

        let first = resolver(&mock).with_token_cache(cache.clone());
        first.resolve(&StaticEnvironment::new(), &no_overrides()).await.unwrap();

        let second = resolver(&mock).with_token_cache(cache.clone());
        let credential = second
            .resolve(&StaticEnvironment::new(), &no_overrides())
            .await
            .unwrap();

        assert_eq!(credential.strategy(), StrategyKind::InteractiveLogin);
        assert_eq!(mock.device_code_calls(), 1);

        second.logout().await.unwrap();
        assert!(second.active().await.is_none());
        assert!(!dir.path().join("token_cache.json").exists());
    }

    #[tokio::test]
    async fn invalidating_interactive_credential_clears_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token_cache.json");
        let mock = Arc::new(MockAuthenticator::new());
        let resolver = resolver(&mock).with_token_cache(TokenCache::new(&path));

        let credential = resolver
            .resolve(&StaticEnvironment::new(), &no_overrides())
            .await
            .unwrap();
        assert!(path.exists());

        resolver.invalidate(&credential).await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn notifier_receives_prompt() {
        let counter = Arc::new(AtomicUsize::new(0));

        struct Counting(Arc<AtomicUsize>);
        impl DeviceCodeNotifier for Counting {
            fn notify(&self, prompt: &crate::DeviceCodePrompt) {
                assert!(!prompt.user_code.is_empty());
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mock = Arc::new(MockAuthenticator::new());
        let resolver = resolver(&mock).with_notifier(Arc::new(Counting(counter.clone())));
        resolver
            .resolve(&StaticEnvironment::new(), &no_overrides())
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}

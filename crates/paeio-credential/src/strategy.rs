//! Credential strategies and their ordered selection.
//!
//! Selection is a pure function of the [`Environment`], the
//! [`ResolverConfig`] and the per-call [`ResolveOverrides`]. Strategies are
//! checked in a fixed priority order and the first one whose inputs are all
//! present wins:
//!
//! 1. [`StrategyKind::ExplicitEnvFile`]: a credentials file holding
//!    `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET` and `AZURE_TENANT_ID`.
//! 2. [`StrategyKind::ServicePrincipal`]: the same three variables in the
//!    environment.
//! 3. [`StrategyKind::InteractiveLogin`]: the device-code flow, unless
//!    interactive login is disabled.
//!
//! A strategy with only some of its inputs present is never attempted. It is
//! reported as a [`PartialConfiguration`] and selection moves on.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::config::{ResolveOverrides, ResolverConfig};
use crate::credentials_file::CredentialsFile;
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::{AZURE_CLIENT_ID, AZURE_CLIENT_SECRET, AZURE_TENANT_ID, STORAGE_SCOPE};

const SERVICE_PRINCIPAL_KEYS: [&str; 3] = [AZURE_CLIENT_ID, AZURE_CLIENT_SECRET, AZURE_TENANT_ID];

/// Identifies a strategy without its inputs.
///
/// The declaration order is the selection priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize, Display, AsRefStr, EnumString, EnumIter)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StrategyKind {
    /// Service principal read from a credentials file at the project root.
    ExplicitEnvFile,
    /// Service principal read from environment variables.
    ServicePrincipal,
    /// User-driven device-code login.
    InteractiveLogin,
}

impl StrategyKind {
    /// Selection priority, lower is tried first.
    pub fn priority(self) -> u8 {
        match self {
            Self::ExplicitEnvFile => 0,
            Self::ServicePrincipal => 1,
            Self::InteractiveLogin => 2,
        }
    }

    /// Whether this strategy may block on user interaction.
    pub fn is_interactive(self) -> bool {
        matches!(self, Self::InteractiveLogin)
    }
}

/// Client id, secret and tenant of a non-interactive machine identity.
#[derive(Clone, PartialEq, Eq)]
pub struct ServicePrincipal {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
}

impl ServicePrincipal {
    /// Creates a service principal from its three parts.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            tenant_id: tenant_id.into(),
        }
    }

    /// Builds a principal from a key lookup, reporting which keys are missing.
    fn detect(strategy: StrategyKind, lookup: impl Fn(&str) -> Option<String>) -> Presence<Self> {
        let [client_id, client_secret, tenant_id] = SERVICE_PRINCIPAL_KEYS.map(&lookup);

        match (client_id, client_secret, tenant_id) {
            (Some(client_id), Some(client_secret), Some(tenant_id)) => Presence::Complete(Self {
                client_id,
                client_secret,
                tenant_id,
            }),
            (None, None, None) => Presence::Absent,
            _ => {
                let missing = SERVICE_PRINCIPAL_KEYS
                    .into_iter()
                    .filter(|key| lookup(*key).is_none())
                    .collect();
                Presence::Partial(PartialConfiguration::new(strategy, missing))
            }
        }
    }
}

impl fmt::Debug for ServicePrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicePrincipal")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

/// Parameters of the device-code login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveSettings {
    /// Public client application id.
    pub client_id: String,
    /// Tenant id or one of `organizations` / `common`.
    pub tenant_id: String,
    /// Requested OAuth scope.
    pub scope: String,
}

impl InteractiveSettings {
    /// Settings derived from the resolver configuration.
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            client_id: config.interactive_client_id().to_owned(),
            tenant_id: config.interactive_tenant().to_owned(),
            scope: STORAGE_SCOPE.to_owned(),
        }
    }
}

/// A fully validated strategy, ready to be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStrategy {
    /// Service principal read from a credentials file.
    ExplicitEnvFile {
        path: PathBuf,
        principal: ServicePrincipal,
    },
    /// Service principal read from the environment.
    ServicePrincipal(ServicePrincipal),
    /// Device-code login.
    InteractiveLogin(InteractiveSettings),
}

impl CredentialStrategy {
    /// Returns the kind of this strategy.
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::ExplicitEnvFile { .. } => StrategyKind::ExplicitEnvFile,
            Self::ServicePrincipal(_) => StrategyKind::ServicePrincipal,
            Self::InteractiveLogin(_) => StrategyKind::InteractiveLogin,
        }
    }

    /// Returns the service principal for non-interactive strategies.
    pub fn service_principal(&self) -> Option<&ServicePrincipal> {
        match self {
            Self::ExplicitEnvFile { principal, .. } | Self::ServicePrincipal(principal) => {
                Some(principal)
            }
            Self::InteractiveLogin(_) => None,
        }
    }

    /// Stable digest of the strategy and all of its inputs.
    ///
    /// Two selections with equal fingerprints can share one resolved credential.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind().as_ref());

        let mut field = |value: &str| {
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
        };

        match self {
            Self::ExplicitEnvFile { path, principal } => {
                field(&path.to_string_lossy());
                field(&principal.client_id);
                field(&principal.client_secret);
                field(&principal.tenant_id);
            }
            Self::ServicePrincipal(principal) => {
                field(&principal.client_id);
                field(&principal.client_secret);
                field(&principal.tenant_id);
            }
            Self::InteractiveLogin(settings) => {
                field(&settings.client_id);
                field(&settings.tenant_id);
                field(&settings.scope);
            }
        }

        hex::encode(hasher.finalize())
    }
}

/// Warning-level diagnostic for a strategy with only some inputs present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialConfiguration {
    /// The strategy that was skipped.
    pub strategy: StrategyKind,
    /// Required keys that were absent or blank.
    pub missing: Vec<&'static str>,
    /// Extra context, e.g. a parse failure.
    pub note: Option<String>,
}

impl PartialConfiguration {
    /// Creates a diagnostic listing missing keys.
    pub fn new(strategy: StrategyKind, missing: Vec<&'static str>) -> Self {
        Self {
            strategy,
            missing,
            note: None,
        }
    }

    /// Attaches extra context.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl fmt::Display for PartialConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} partially configured", self.strategy)?;
        if !self.missing.is_empty() {
            write!(f, ", missing {}", self.missing.join(", "))?;
        }
        if let Some(note) = &self.note {
            write!(f, " ({note})")?;
        }
        Ok(())
    }
}

/// Outcome of strategy selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// The highest priority strategy with complete inputs.
    pub strategy: CredentialStrategy,
    /// Higher priority strategies that were skipped because of partial inputs.
    pub diagnostics: Vec<PartialConfiguration>,
}

enum Presence<T> {
    Complete(T),
    Partial(PartialConfiguration),
    Absent,
}

/// Selects the strategy to use for the given inputs.
///
/// Fails with [`Error::NoStrategyApplicable`] when no strategy is complete and
/// interactive login is disabled, and with [`Error::CredentialsFile`] when the
/// credentials file exists but cannot be read.
pub async fn select_strategy(
    env: &dyn Environment,
    config: &ResolverConfig,
    overrides: &ResolveOverrides,
) -> Result<Selection> {
    let mut diagnostics = Vec::new();

    let path = match &overrides.credentials_file {
        Some(path) => config.project_root.join(path),
        None => config.credentials_path(),
    };

    match detect_credentials_file(env, &path).await? {
        Presence::Complete(principal) => {
            return Ok(Selection {
                strategy: CredentialStrategy::ExplicitEnvFile { path, principal },
                diagnostics,
            });
        }
        Presence::Partial(diagnostic) => diagnostics.push(diagnostic),
        Presence::Absent => {}
    }

    match ServicePrincipal::detect(StrategyKind::ServicePrincipal, |key| {
        env.non_empty_var(key)
    }) {
        Presence::Complete(principal) => {
            return Ok(Selection {
                strategy: CredentialStrategy::ServicePrincipal(principal),
                diagnostics,
            });
        }
        Presence::Partial(diagnostic) => diagnostics.push(diagnostic),
        Presence::Absent => {}
    }

    if config.interactive_allowed(env, overrides) {
        return Ok(Selection {
            strategy: CredentialStrategy::InteractiveLogin(InteractiveSettings::from_config(
                config,
            )),
            diagnostics,
        });
    }

    Err(Error::no_strategy(diagnostics))
}

async fn detect_credentials_file(
    env: &dyn Environment,
    path: &Path,
) -> Result<Presence<ServicePrincipal>> {
    let contents = match env.read_file(path).await {
        Ok(Some(contents)) => contents,
        Ok(None) => return Ok(Presence::Absent),
        Err(err) => return Err(Error::credentials_file(path, err.to_string())),
    };

    let file = match CredentialsFile::parse(&contents) {
        Ok(file) => file,
        Err(err) => {
            return Ok(Presence::Partial(
                PartialConfiguration::new(
                    StrategyKind::ExplicitEnvFile,
                    SERVICE_PRINCIPAL_KEYS.to_vec(),
                )
                .with_note(format!("{}: {err}", path.display())),
            ));
        }
    };

    let presence = ServicePrincipal::detect(StrategyKind::ExplicitEnvFile, |key| file.get(key));
    Ok(match presence {
        // A present file with none of the keys is still a misconfiguration.
        Presence::Absent => Presence::Partial(
            PartialConfiguration::new(
                StrategyKind::ExplicitEnvFile,
                SERVICE_PRINCIPAL_KEYS.to_vec(),
            )
            .with_note(path.display().to_string()),
        ),
        Presence::Partial(diagnostic) => {
            Presence::Partial(diagnostic.with_note(path.display().to_string()))
        }
        complete => complete,
    })
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;
    use crate::environment::StaticEnvironment;

    const FILE: &str = "./credentials.env";
    const COMPLETE_FILE: &str =
        "AZURE_CLIENT_ID=file-id\nAZURE_CLIENT_SECRET=file-secret\nAZURE_TENANT_ID=file-tenant\n";

    fn sp_env() -> StaticEnvironment {
        StaticEnvironment::new()
            .with_var(AZURE_CLIENT_ID, "env-id")
            .with_var(AZURE_CLIENT_SECRET, "env-secret")
            .with_var(AZURE_TENANT_ID, "env-tenant")
    }

    async fn select(env: &StaticEnvironment) -> Result<Selection> {
        select_strategy(env, &ResolverConfig::default(), &ResolveOverrides::new()).await
    }

    #[test]
    fn priority_follows_declaration_order() {
        let kinds: Vec<_> = StrategyKind::iter().collect();
        let mut sorted = kinds.clone();
        sorted.sort_by_key(|kind| kind.priority());
        assert_eq!(kinds, sorted);
        assert_eq!(StrategyKind::ExplicitEnvFile.to_string(), "explicit-env-file");
    }

    #[tokio::test]
    async fn complete_file_wins_over_environment() {
        let env = sp_env().with_file(FILE, COMPLETE_FILE);
        let selection = select(&env).await.unwrap();

        assert_eq!(selection.strategy.kind(), StrategyKind::ExplicitEnvFile);
        let principal = selection.strategy.service_principal().unwrap();
        assert_eq!(principal.client_id, "file-id");
        assert!(selection.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn complete_file_wins_even_when_non_interactive() {
        let env = StaticEnvironment::new().with_file(FILE, COMPLETE_FILE);
        let config = ResolverConfig::default().with_non_interactive(true);
        let selection = select_strategy(&env, &config, &ResolveOverrides::new()).await.unwrap();
        assert_eq!(selection.strategy.kind(), StrategyKind::ExplicitEnvFile);
    }

    #[tokio::test]
    async fn service_principal_from_environment() {
        let selection = select(&sp_env()).await.unwrap();

        assert_eq!(
            selection.strategy,
            CredentialStrategy::ServicePrincipal(ServicePrincipal::new(
                "env-id",
                "env-secret",
                "env-tenant"
            ))
        );
    }

    #[tokio::test]
    async fn nothing_configured_falls_back_to_interactive() {
        let selection = select(&StaticEnvironment::new()).await.unwrap();
        assert_eq!(selection.strategy.kind(), StrategyKind::InteractiveLogin);
        assert!(selection.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn nothing_configured_non_interactive_fails() {
        let env = StaticEnvironment::new();
        let overrides = ResolveOverrides::new().with_interactive(false);
        let err = select_strategy(&env, &ResolverConfig::default(), &overrides).await.unwrap_err();
        assert!(matches!(err, Error::NoStrategyApplicable { ref diagnostics } if diagnostics.is_empty()));
    }

    #[tokio::test]
    async fn partial_service_principal_is_reported() {
        let env = StaticEnvironment::new()
            .with_var(AZURE_CLIENT_ID, "foo")
            .with_var(AZURE_TENANT_ID, "bar");
        let selection = select(&env).await.unwrap();

        assert_eq!(selection.strategy.kind(), StrategyKind::InteractiveLogin);
        assert_eq!(
            selection.diagnostics,
            vec![PartialConfiguration::new(
                StrategyKind::ServicePrincipal,
                vec![AZURE_CLIENT_SECRET]
            )]
        );
    }

    #[tokio::test]
    async fn blank_secret_counts_as_missing() {
        let env = sp_env().with_var(AZURE_CLIENT_SECRET, "");
        let overrides = ResolveOverrides::new().with_interactive(false);
        let err = select_strategy(&env, &ResolverConfig::default(), &overrides).await.unwrap_err();

        let Error::NoStrategyApplicable { diagnostics } = err else {
            panic!("expected NoStrategyApplicable");
        };
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].missing, vec![AZURE_CLIENT_SECRET]);
    }

    #[tokio::test]
    async fn partial_file_falls_through_to_environment() {
        let env = sp_env().with_file(FILE, "AZURE_CLIENT_ID=file-id\n");
        let selection = select(&env).await.unwrap();

        assert_eq!(selection.strategy.kind(), StrategyKind::ServicePrincipal);
        assert_eq!(selection.diagnostics.len(), 1);
        let diagnostic = &selection.diagnostics[0];
        assert_eq!(diagnostic.strategy, StrategyKind::ExplicitEnvFile);
        assert_eq!(
            diagnostic.missing,
            vec![AZURE_CLIENT_SECRET, AZURE_TENANT_ID]
        );
    }

    #[tokio::test]
    async fn file_without_keys_is_reported() {
        let env = sp_env().with_file(FILE, "OTHER=1\n");
        let selection = select(&env).await.unwrap();

        assert_eq!(selection.strategy.kind(), StrategyKind::ServicePrincipal);
        assert_eq!(selection.diagnostics[0].missing.len(), 3);
    }

    #[tokio::test]
    async fn malformed_file_is_reported() {
        let env = sp_env().with_file(FILE, "AZURE_CLIENT_ID='oops\n");
        let selection = select(&env).await.unwrap();

        assert_eq!(selection.strategy.kind(), StrategyKind::ServicePrincipal);
        assert!(selection.diagnostics[0].note.is_some());
    }

    #[tokio::test]
    async fn override_path_is_used() {
        let env = StaticEnvironment::new().with_file("./other.env", COMPLETE_FILE);
        let overrides = ResolveOverrides::new().with_credentials_file("other.env");
        let selection = select_strategy(&env, &ResolverConfig::default(), &overrides).await.unwrap();

        assert_eq!(
            selection.strategy,
            CredentialStrategy::ExplicitEnvFile {
                path: PathBuf::from("./other.env"),
                principal: ServicePrincipal::new("file-id", "file-secret", "file-tenant"),
            }
        );
    }

    #[tokio::test]
    async fn fingerprint_tracks_inputs() {
        let a = select(&sp_env()).await.unwrap().strategy;
        let b = select(&sp_env()).await.unwrap().strategy;
        let c = select(&sp_env().with_var(AZURE_CLIENT_SECRET, "rotated"))
            .await
            .unwrap()
            .strategy;

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn debug_redacts_secret() {
        let principal = ServicePrincipal::new("id", "hunter2", "tenant");
        let debug = format!("{principal:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}

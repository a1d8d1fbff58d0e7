//! Resolver configuration and per-call overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::error::{Error, Result};

// Default values
const DEFAULT_CREDENTIALS_FILE: &str = "credentials.env";
const DEFAULT_INTERACTIVE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_AUTH_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const DEFAULT_INTERACTIVE_TENANT: &str = "organizations";
/// Public client id of the Azure CLI, registered for the device-code grant.
const DEFAULT_INTERACTIVE_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";
const TOKEN_CACHE_DIR: &str = "paeio";
const TOKEN_CACHE_FILE: &str = "token_cache.json";

/// Environment variable that forces non-interactive mode when truthy.
pub(crate) const CI_VAR: &str = "CI";

/// Configuration for [`CredentialResolver`](crate::CredentialResolver).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct ResolverConfig {
    /// Project root searched for the credentials file.
    #[cfg_attr(
        feature = "config",
        arg(long = "project-root", env = "PAEIO_PROJECT_ROOT", default_value = ".")
    )]
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,

    /// Credentials file name (relative to the project root) or absolute path.
    #[cfg_attr(
        feature = "config",
        arg(long = "credentials-file", env = "PAEIO_CREDENTIALS_FILE")
    )]
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,

    /// Never fall back to the interactive device-code login.
    #[cfg_attr(
        feature = "config",
        arg(long = "non-interactive", env = "PAEIO_NON_INTERACTIVE")
    )]
    #[serde(default)]
    pub non_interactive: bool,

    /// Seconds to wait for the user to finish the device-code login.
    #[cfg_attr(
        feature = "config",
        arg(long = "interactive-timeout", env = "PAEIO_INTERACTIVE_TIMEOUT_SECS")
    )]
    #[serde(default)]
    pub interactive_timeout_secs: Option<u64>,

    /// Public client id used for the device-code login.
    #[cfg_attr(
        feature = "config",
        arg(long = "interactive-client-id", env = "PAEIO_INTERACTIVE_CLIENT_ID")
    )]
    #[serde(default)]
    pub interactive_client_id: Option<String>,

    /// Tenant used for the device-code login (`organizations` when unset).
    #[cfg_attr(
        feature = "config",
        arg(long = "interactive-tenant", env = "PAEIO_INTERACTIVE_TENANT")
    )]
    #[serde(default)]
    pub interactive_tenant: Option<String>,

    /// Location of the interactive token cache.
    #[cfg_attr(
        feature = "config",
        arg(long = "token-cache", env = "PAEIO_TOKEN_CACHE")
    )]
    #[serde(default)]
    pub token_cache_path: Option<PathBuf>,

    /// Do not read or write the interactive token cache.
    #[cfg_attr(
        feature = "config",
        arg(long = "no-token-cache", env = "PAEIO_NO_TOKEN_CACHE")
    )]
    #[serde(default)]
    pub no_token_cache: bool,

    /// Identity provider authority host.
    #[cfg_attr(
        feature = "config",
        arg(long = "authority-host", env = "AZURE_AUTHORITY_HOST")
    )]
    #[serde(default)]
    pub authority_host: Option<String>,

    /// HTTP timeout in seconds for identity provider requests.
    #[cfg_attr(
        feature = "config",
        arg(long = "auth-timeout", env = "PAEIO_AUTH_TIMEOUT_SECS")
    )]
    #[serde(default)]
    pub auth_timeout_secs: Option<u64>,
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            credentials_file: None,
            non_interactive: false,
            interactive_timeout_secs: None,
            interactive_client_id: None,
            interactive_tenant: None,
            token_cache_path: None,
            no_token_cache: false,
            authority_host: None,
            auth_timeout_secs: None,
        }
    }
}

impl ResolverConfig {
    /// Creates a configuration rooted at `project_root`.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            ..Self::default()
        }
    }

    /// Path of the credentials file, resolved against the project root.
    pub fn credentials_path(&self) -> PathBuf {
        let file = self
            .credentials_file
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_CREDENTIALS_FILE));
        self.project_root.join(file)
    }

    /// Returns the interactive timeout as a Duration.
    #[inline]
    pub fn interactive_timeout(&self) -> Duration {
        Duration::from_secs(
            self.interactive_timeout_secs
                .unwrap_or(DEFAULT_INTERACTIVE_TIMEOUT_SECS),
        )
    }

    /// Returns the identity provider HTTP timeout as a Duration.
    #[inline]
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(
            self.auth_timeout_secs
                .unwrap_or(DEFAULT_AUTH_HTTP_TIMEOUT_SECS),
        )
    }

    /// Returns the public client id for the device-code login.
    #[inline]
    pub fn interactive_client_id(&self) -> &str {
        self.interactive_client_id
            .as_deref()
            .unwrap_or(DEFAULT_INTERACTIVE_CLIENT_ID)
    }

    /// Returns the tenant for the device-code login.
    #[inline]
    pub fn interactive_tenant(&self) -> &str {
        self.interactive_tenant
            .as_deref()
            .unwrap_or(DEFAULT_INTERACTIVE_TENANT)
    }

    /// Returns the authority host without a trailing slash.
    pub fn authority_host(&self) -> &str {
        self.authority_host
            .as_deref()
            .unwrap_or(DEFAULT_AUTHORITY_HOST)
            .trim_end_matches('/')
    }

    /// Returns the token cache location, or `None` when caching is disabled
    /// or no cache directory can be determined.
    pub fn token_cache_path(&self) -> Option<PathBuf> {
        if self.no_token_cache {
            return None;
        }

        self.token_cache_path.clone().or_else(|| {
            dirs::cache_dir().map(|dir| dir.join(TOKEN_CACHE_DIR).join(TOKEN_CACHE_FILE))
        })
    }

    /// Whether interactive login may be used, taking the `CI` variable and
    /// per-call overrides into account.
    pub fn interactive_allowed(&self, env: &dyn Environment, overrides: &ResolveOverrides) -> bool {
        if let Some(interactive) = overrides.interactive {
            return interactive;
        }

        !self.non_interactive && !env.flag(CI_VAR)
    }

    /// Set the credentials file name or path.
    #[must_use]
    pub fn with_credentials_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.credentials_file = Some(file.into());
        self
    }

    /// Disable the interactive fallback.
    #[must_use]
    pub fn with_non_interactive(mut self, non_interactive: bool) -> Self {
        self.non_interactive = non_interactive;
        self
    }

    /// Set the interactive timeout in seconds.
    #[must_use]
    pub fn with_interactive_timeout_secs(mut self, secs: u64) -> Self {
        self.interactive_timeout_secs = Some(secs);
        self
    }

    /// Set the token cache location.
    #[must_use]
    pub fn with_token_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_cache_path = Some(path.into());
        self
    }

    /// Disable the interactive token cache.
    #[must_use]
    pub fn without_token_cache(mut self) -> Self {
        self.no_token_cache = true;
        self
    }

    /// Set the identity provider authority host.
    #[must_use]
    pub fn with_authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = Some(host.into());
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.interactive_timeout_secs == Some(0) {
            return Err(Error::invalid_config("interactive timeout must be positive"));
        }

        if self.auth_timeout_secs == Some(0) {
            return Err(Error::invalid_config("auth timeout must be positive"));
        }

        let host = self.authority_host();
        if !host.starts_with("https://") && !host.starts_with("http://") {
            return Err(Error::invalid_config(format!(
                "invalid authority host: {host}"
            )));
        }

        if self.interactive_client_id().trim().is_empty() {
            return Err(Error::invalid_config("interactive client id cannot be empty"));
        }

        Ok(())
    }
}

/// Explicit per-call overrides applied on top of [`ResolverConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveOverrides {
    /// Use this credentials file instead of the configured one.
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
    /// Force interactive login on (`Some(true)`) or off (`Some(false)`).
    #[serde(default)]
    pub interactive: Option<bool>,
}

impl ResolveOverrides {
    /// Creates empty overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the credentials file path.
    #[must_use]
    pub fn with_credentials_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }

    /// Force interactive login on or off.
    #[must_use]
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = Some(interactive);
        self
    }
}

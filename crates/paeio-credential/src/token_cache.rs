//! On-disk cache for tokens obtained through the device-code login.
//!
//! The cache lets a later process reuse an interactive login instead of
//! prompting again. Only interactive tokens are cached; service principal
//! tokens are cheap to re-acquire and are never written to disk.

use std::io;
use std::path::{Path, PathBuf};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::strategy::InteractiveSettings;
use crate::token::AccessToken;
use crate::TRACING_TARGET_TOKEN_CACHE;

#[derive(Debug, Serialize, Deserialize)]
struct CachedToken {
    client_id: String,
    tenant_id: String,
    scope: String,
    cached_at: Timestamp,
    token: AccessToken,
}

/// Location of the interactive token cache, or a disabled cache.
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    path: Option<PathBuf>,
}

impl TokenCache {
    /// Creates a cache stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Creates a cache that never reads or writes anything.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Returns the cache file path, if enabled.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Loads a cached token issued for `settings` that has not expired.
    ///
    /// Unreadable or stale cache files are ignored.
    pub async fn load(&self, settings: &InteractiveSettings) -> Option<AccessToken> {
        let path = self.path.as_deref()?;

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(
                    target: TRACING_TARGET_TOKEN_CACHE,
                    path = %path.display(),
                    error = %err,
                    "Failed to read token cache"
                );
                return None;
            }
        };

        let cached: CachedToken = match serde_json::from_str(&contents) {
            Ok(cached) => cached,
            Err(err) => {
                tracing::warn!(
                    target: TRACING_TARGET_TOKEN_CACHE,
                    path = %path.display(),
                    error = %err,
                    "Ignoring malformed token cache"
                );
                return None;
            }
        };

        if cached.client_id != settings.client_id
            || cached.tenant_id != settings.tenant_id
            || cached.scope != settings.scope
        {
            tracing::debug!(
                target: TRACING_TARGET_TOKEN_CACHE,
                "Token cache belongs to a different client or tenant"
            );
            return None;
        }

        if cached.token.is_expired() {
            tracing::debug!(
                target: TRACING_TARGET_TOKEN_CACHE,
                expired_on = %cached.token.expires_on(),
                "Cached token expired"
            );
            return None;
        }

        tracing::debug!(
            target: TRACING_TARGET_TOKEN_CACHE,
            cached_at = %cached.cached_at,
            expires_on = %cached.token.expires_on(),
            "Using cached interactive token"
        );

        Some(cached.token)
    }

    /// Writes `token` to the cache, creating parent directories as needed.
    pub async fn store(&self, settings: &InteractiveSettings, token: &AccessToken) -> io::Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cached = CachedToken {
            client_id: settings.client_id.clone(),
            tenant_id: settings.tenant_id.clone(),
            scope: settings.scope.clone(),
            cached_at: Timestamp::now(),
            token: token.clone(),
        };

        let contents = serde_json::to_string_pretty(&cached)?;
        tokio::fs::write(path, contents).await?;
        restrict_permissions(path).await?;

        tracing::debug!(
            target: TRACING_TARGET_TOKEN_CACHE,
            path = %path.display(),
            "Stored interactive token"
        );

        Ok(())
    }

    /// Deletes the cache file. Returns whether a file was removed.
    pub async fn clear(&self) -> io::Result<bool> {
        let Some(path) = self.path.as_deref() else {
            return Ok(false);
        };

        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

//! Authenticated object storage gateway.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use paeio_credential::{
    CredentialResolver, Environment, ProcessEnvironment, ResolveOverrides, ResolvedCredential,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::backend::{Backend, BackendError, BackendErrorKind, GetOutput, ObjectInfo};
use crate::config::{StorageConfig, UploadMode};
use crate::connector::{AzureConnector, Connector, Location};
use crate::error::{Result, StorageError};
use crate::glob::GlobPattern;
use crate::payload::Payload;
use crate::uri::AzureUri;
use crate::TRACING_TARGET_GATEWAY;

/// Acknowledgement of a committed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteAck {
    /// The path as passed to [`StorageGateway::write`].
    pub path: String,
    /// Bytes written.
    pub size: usize,
    /// How the body was uploaded.
    pub mode: UploadMode,
    /// Entity tag of the new object, if reported.
    pub e_tag: Option<String>,
    /// Version of the new object, if reported.
    pub version: Option<String>,
}

/// Credential and the backends built from it.
struct Session {
    credential: Arc<ResolvedCredential>,
    backends: HashMap<Location, Arc<dyn Backend>>,
}

#[derive(Clone)]
struct Handle {
    credential: Arc<ResolvedCredential>,
    backend: Arc<dyn Backend>,
}

/// Where a path points: a container plus a key within it.
struct Target {
    location: Location,
    key: String,
    uri: Option<AzureUri>,
}

impl Target {
    /// Renders `key` in the same form the caller used.
    fn render(&self, key: &str) -> String {
        match &self.uri {
            Some(uri) => uri.with_path(key).to_string(),
            None => key.to_owned(),
        }
    }
}

/// Reads and writes objects with a lazily resolved, cached credential.
///
/// The first operation resolves a credential and builds a backend; later
/// operations reuse both. When the service rejects the credential, the
/// gateway invalidates it, resolves again once and retries the operation
/// once. A second rejection is reported as [`StorageError::ReauthExhausted`].
///
/// Paths are either keys in the configured default container or full Azure
/// URIs (see [`AzureUri`]).
pub struct StorageGateway {
    resolver: Arc<CredentialResolver>,
    connector: Arc<dyn Connector>,
    env: Arc<dyn Environment>,
    overrides: ResolveOverrides,
    config: StorageConfig,
    session: RwLock<Option<Session>>,
}

impl StorageGateway {
    /// Creates a gateway that connects through `connector`.
    pub fn new(
        resolver: Arc<CredentialResolver>,
        connector: Arc<dyn Connector>,
        config: StorageConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            resolver,
            connector,
            env: Arc::new(ProcessEnvironment),
            overrides: ResolveOverrides::new(),
            config,
            session: RwLock::new(None),
        })
    }

    /// Creates a gateway for Azure Blob Storage.
    pub fn azure(resolver: Arc<CredentialResolver>, config: StorageConfig) -> Result<Self> {
        let connector = Arc::new(AzureConnector::new(config.clone()));
        Self::new(resolver, connector, config)
    }

    /// Resolves credentials against `env` instead of the process environment.
    pub fn with_environment(mut self, env: Arc<dyn Environment>) -> Self {
        self.env = env;
        self
    }

    /// Applies `overrides` to every resolution.
    pub fn with_overrides(mut self, overrides: ResolveOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// The resolver this gateway obtains credentials from.
    pub fn resolver(&self) -> &Arc<CredentialResolver> {
        &self.resolver
    }

    /// Gateway configuration.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Resolves (or reuses) the credential used for storage requests.
    pub async fn credential(&self) -> Result<Arc<ResolvedCredential>> {
        Ok(self
            .resolver
            .resolve(self.env.as_ref(), &self.overrides)
            .await?)
    }

    /// Reads the whole object at `path`.
    pub async fn read(&self, path: &str) -> Result<Payload> {
        let target = self.object_target(path)?;
        let key = target.key.as_str();

        let output = self
            .execute("read", &target, path, move |backend| async move {
                backend.get(key).await
            })
            .await?;

        tracing::debug!(
            target: TRACING_TARGET_GATEWAY,
            path,
            size = output.data.len(),
            "Object read"
        );

        Ok(into_payload(output))
    }

    /// Reads the object at `uri` with a shared access signature.
    ///
    /// The credential resolver is not consulted and nothing is cached; a
    /// rejected signature is reported as a backend error without retrying.
    pub async fn read_url(&self, uri: &str, sas: &str) -> Result<Payload> {
        let target = self.object_target(uri)?;

        let backend = self
            .connector
            .connect_with_sas(sas, &target.location)
            .map_err(|e| StorageError::from_backend("connect", target.location.to_string(), e))?;
        let output = backend
            .get(&target.key)
            .await
            .map_err(|e| StorageError::from_backend("read_url", uri, e))?;

        tracing::debug!(
            target: TRACING_TARGET_GATEWAY,
            path = uri,
            size = output.data.len(),
            "Object read with shared access signature"
        );

        Ok(into_payload(output))
    }

    /// Replaces the object at `path` with `payload`.
    ///
    /// The object is either fully written or left untouched.
    pub async fn write(&self, path: &str, payload: Payload) -> Result<WriteAck> {
        let target = self.object_target(path)?;
        let key = target.key.as_str();
        let content_type = payload.content_type().map(str::to_owned);
        let content_type = content_type.as_deref();
        let data: Bytes = payload.into_bytes();
        let size = data.len();
        let mode = self.config.upload_mode;
        let chunk_size = self.config.chunk_size();

        let output = self
            .execute("write", &target, path, move |backend| {
                let data = data.clone();
                async move {
                    match mode {
                        UploadMode::Full => backend.put(key, data, content_type).await,
                        UploadMode::Chunks => {
                            backend
                                .put_multipart(key, data, content_type, chunk_size)
                                .await
                        }
                    }
                }
            })
            .await?;

        tracing::info!(
            target: TRACING_TARGET_GATEWAY,
            path,
            size,
            mode = %mode,
            "Object written"
        );

        Ok(WriteAck {
            path: path.to_owned(),
            size,
            mode,
            e_tag: output.e_tag,
            version: output.version,
        })
    }

    /// Whether an object exists at `path`.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        let target = self.object_target(path)?;
        let key = target.key.as_str();

        self.execute("exists", &target, path, move |backend| async move {
            match backend.head(key).await {
                Ok(_) => Ok(true),
                Err(err) if err.kind() == BackendErrorKind::NotFound => Ok(false),
                Err(err) => Err(err),
            }
        })
        .await
    }

    /// Deletes the object at `path`.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let target = self.object_target(path)?;
        let key = target.key.as_str();

        self.execute("delete", &target, path, move |backend| async move {
            backend.delete(key).await
        })
        .await?;

        tracing::info!(target: TRACING_TARGET_GATEWAY, path, "Object deleted");
        Ok(())
    }

    /// Moves the object at `from` to `to` within one container.
    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let source = self.object_target(from)?;
        let destination = self.object_target(to)?;
        if source.location != destination.location {
            return Err(StorageError::invalid_path(
                to,
                format!("rename must stay within {}", source.location),
            ));
        }

        let from_key = source.key.as_str();
        let to_key = destination.key.as_str();

        self.execute("rename", &source, from, move |backend| async move {
            backend.copy(from_key, to_key).await?;
            backend.delete(from_key).await
        })
        .await?;

        tracing::info!(target: TRACING_TARGET_GATEWAY, from, to, "Object renamed");
        Ok(())
    }

    /// Lists every object under the directory `prefix`, recursively.
    ///
    /// Returned keys are rendered in the same form as `prefix`.
    pub async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let target = self.target(prefix)?;
        let key = target.key.trim_end_matches('/');

        let objects = self
            .execute("list", &target, prefix, move |backend| async move {
                backend.list(key).await
            })
            .await?;

        Ok(objects
            .into_iter()
            .map(|info| ObjectInfo {
                key: target.render(&info.key),
                ..info
            })
            .collect())
    }

    /// Returns the paths of all objects matching `pattern`.
    ///
    /// Listing starts at the longest directory prefix without wildcards.
    pub async fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let target = self.target(pattern)?;
        let glob = GlobPattern::new(&target.key)?;
        let prefix = glob.prefix();

        let objects = self
            .execute("glob", &target, pattern, move |backend| async move {
                backend.list(prefix).await
            })
            .await?;

        let mut matches: Vec<String> = objects
            .iter()
            .filter(|info| glob.matches(&info.key))
            .map(|info| target.render(&info.key))
            .collect();
        matches.sort();

        tracing::debug!(
            target: TRACING_TARGET_GATEWAY,
            pattern,
            listed = objects.len(),
            matched = matches.len(),
            "Glob evaluated"
        );

        Ok(matches)
    }

    /// Returns the last path matching `pattern` in lexicographic order.
    ///
    /// With date-stamped names this is the newest version of a dataset.
    pub async fn latest(&self, pattern: &str) -> Result<Option<String>> {
        let latest = self.glob(pattern).await?.pop();

        tracing::debug!(
            target: TRACING_TARGET_GATEWAY,
            pattern,
            latest = latest.as_deref(),
            "Latest match selected"
        );

        Ok(latest)
    }

    /// Drops the cached credential and backends.
    ///
    /// The next operation resolves a credential from scratch.
    pub async fn invalidate(&self) {
        let session = self.session.write().await.take();
        if let Some(session) = session {
            self.resolver.invalidate(&session.credential).await;
        }
    }

    /// Drops the cached credential and signs out of the interactive login.
    pub async fn logout(&self) -> Result<()> {
        self.session.write().await.take();
        self.resolver.logout().await?;
        Ok(())
    }

    fn target(&self, path: &str) -> Result<Target> {
        if AzureUri::is_uri(path) {
            let uri = AzureUri::parse(path)?;
            let account = uri
                .account
                .clone()
                .or_else(|| self.config.account.clone())
                .ok_or_else(|| StorageError::invalid_path(path, "no storage account configured"))?;

            return Ok(Target {
                location: Location::new(account, uri.container.clone()),
                key: uri.path.clone(),
                uri: Some(uri),
            });
        }

        let (Some(account), Some(container)) = (&self.config.account, &self.config.container)
        else {
            return Err(StorageError::invalid_path(
                path,
                "plain keys need a configured account and container; use a full URI",
            ));
        };

        Ok(Target {
            location: Location::new(account.clone(), container.clone()),
            key: path.trim_start_matches('/').to_owned(),
            uri: None,
        })
    }

    fn object_target(&self, path: &str) -> Result<Target> {
        let target = self.target(path)?;
        if target.key.is_empty() || target.key.ends_with('/') {
            return Err(StorageError::invalid_path(path, "path does not name an object"));
        }
        Ok(target)
    }

    /// Runs `op`, re-resolving the credential once if the backend rejects it.
    async fn execute<T, F, Fut>(
        &self,
        operation: &'static str,
        target: &Target,
        path: &str,
        op: F,
    ) -> Result<T>
    where
        F: Fn(Arc<dyn Backend>) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let handle = self.acquire(&target.location).await?;

        let rejection = match op(Arc::clone(&handle.backend)).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_auth_rejected() => err,
            Err(err) => return Err(StorageError::from_backend(operation, path, err)),
        };

        tracing::warn!(
            target: TRACING_TARGET_GATEWAY,
            operation,
            path,
            credential_id = handle.credential.id(),
            strategy = %handle.credential.strategy(),
            error = %rejection,
            "Credential rejected, re-resolving once"
        );

        self.invalidate_handle(&handle).await;

        let handle = match self.acquire(&target.location).await {
            Ok(handle) => handle,
            Err(StorageError::Credential(err)) => {
                return Err(StorageError::reauth_exhausted(operation, path, err.to_string()));
            }
            Err(err) => return Err(err),
        };

        match op(Arc::clone(&handle.backend)).await {
            Ok(value) => Ok(value),
            Err(err) if err.is_auth_rejected() => {
                self.invalidate_handle(&handle).await;
                Err(StorageError::reauth_exhausted(operation, path, err.to_string()))
            }
            Err(err) => Err(StorageError::from_backend(operation, path, err)),
        }
    }

    /// Returns the cached backend for `location`, resolving and connecting
    /// when the cache is empty, stale or bound to an expired credential.
    async fn acquire(&self, location: &Location) -> Result<Handle> {
        {
            let session = self.session.read().await;
            if let Some(session) = session.as_ref()
                && session.credential.is_valid()
                && let Some(backend) = session.backends.get(location)
            {
                return Ok(Handle {
                    credential: Arc::clone(&session.credential),
                    backend: Arc::clone(backend),
                });
            }
        }

        let credential = self
            .resolver
            .resolve(self.env.as_ref(), &self.overrides)
            .await?;

        let mut guard = self.session.write().await;
        let session = match guard.take() {
            Some(session) if session.credential.id() == credential.id() => session,
            _ => Session {
                credential: Arc::clone(&credential),
                backends: HashMap::new(),
            },
        };
        let session = guard.insert(session);

        if let Some(backend) = session.backends.get(location) {
            return Ok(Handle {
                credential,
                backend: Arc::clone(backend),
            });
        }

        let backend = self
            .connector
            .connect(&credential, location)
            .map_err(|e| StorageError::from_backend("connect", location.to_string(), e))?;

        tracing::debug!(
            target: TRACING_TARGET_GATEWAY,
            location = %location,
            credential_id = credential.id(),
            "Backend connected"
        );

        session.backends.insert(location.clone(), Arc::clone(&backend));
        Ok(Handle {
            credential,
            backend,
        })
    }

    async fn invalidate_handle(&self, handle: &Handle) {
        {
            let mut session = self.session.write().await;
            if session
                .as_ref()
                .is_some_and(|s| s.credential.id() == handle.credential.id())
            {
                session.take();
            }
        }
        self.resolver.invalidate(&handle.credential).await;
    }
}

fn into_payload(output: GetOutput) -> Payload {
    let payload = Payload::new(output.data);
    match output.content_type {
        Some(content_type) => payload.with_content_type(content_type),
        None => payload,
    }
}

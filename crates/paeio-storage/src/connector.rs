//! Backend construction from a resolved credential.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use object_store::azure::{AzureConfigKey, MicrosoftAzureBuilder};
use object_store::memory::InMemory;
use object_store::{ClientOptions, RetryConfig};
use paeio_credential::ResolvedCredential;
use serde::{Deserialize, Serialize};

use crate::backend::{Backend, BackendError, BackendErrorKind, ObjectStoreBackend};
use crate::config::StorageConfig;
use crate::TRACING_TARGET_BACKEND;

/// Storage account and container a backend is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub account: String,
    pub container: String,
}

impl Location {
    pub fn new(account: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            container: container.into(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.container)
    }
}

/// Builds a [`Backend`] authenticated with a credential.
///
/// Called once per credential and location; the gateway caches the result
/// until the credential changes.
pub trait Connector: Send + Sync + fmt::Debug {
    /// Creates a backend for `location` that authenticates with `credential`.
    fn connect(
        &self,
        credential: &ResolvedCredential,
        location: &Location,
    ) -> Result<Arc<dyn Backend>, BackendError>;

    /// Creates a backend for `location` that signs requests with a shared
    /// access signature instead of a resolved credential.
    fn connect_with_sas(
        &self,
        _sas: &str,
        _location: &Location,
    ) -> Result<Arc<dyn Backend>, BackendError> {
        Err(BackendError::new(
            BackendErrorKind::Other,
            "shared access signatures are not supported by this connector",
        ))
    }
}

/// Connects to Azure Blob Storage with the credential's bearer token.
#[derive(Debug, Clone)]
pub struct AzureConnector {
    config: StorageConfig,
}

impl AzureConnector {
    /// Creates a connector using the endpoint, timeouts and retries of `config`.
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    fn client_options(&self) -> ClientOptions {
        let options = ClientOptions::new()
            .with_timeout(self.config.request_timeout())
            .with_connect_timeout(self.config.connect_timeout());

        match &self.config.endpoint {
            Some(endpoint) if endpoint.starts_with("http://") => options.with_allow_http(true),
            _ => options,
        }
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.config.max_retries(),
            ..RetryConfig::default()
        }
    }

    fn builder(&self, location: &Location) -> MicrosoftAzureBuilder {
        let builder = MicrosoftAzureBuilder::new()
            .with_account(&location.account)
            .with_container_name(&location.container)
            .with_client_options(self.client_options())
            .with_retry(self.retry_config());

        match &self.config.endpoint {
            Some(endpoint) => builder.with_endpoint(endpoint.clone()),
            None => builder,
        }
    }
}

fn build(builder: MicrosoftAzureBuilder) -> Result<Arc<dyn Backend>, BackendError> {
    let store = builder
        .build()
        .map_err(|e| BackendError::new(BackendErrorKind::Other, &e).with_source(e))?;

    Ok(Arc::new(ObjectStoreBackend::new(store)))
}

impl Connector for AzureConnector {
    fn connect(
        &self,
        credential: &ResolvedCredential,
        location: &Location,
    ) -> Result<Arc<dyn Backend>, BackendError> {
        tracing::debug!(
            target: TRACING_TARGET_BACKEND,
            location = %location,
            credential_id = credential.id(),
            strategy = %credential.strategy(),
            "Connecting to Azure storage"
        );

        build(
            self.builder(location)
                .with_bearer_token_authorization(credential.token().secret()),
        )
    }

    fn connect_with_sas(
        &self,
        sas: &str,
        location: &Location,
    ) -> Result<Arc<dyn Backend>, BackendError> {
        tracing::debug!(
            target: TRACING_TARGET_BACKEND,
            location = %location,
            "Connecting to Azure storage with a shared access signature"
        );

        build(self.builder(location).with_config(AzureConfigKey::SasKey, sas))
    }
}

/// Keeps every location in process memory, ignoring credentials.
///
/// Backends for the same location share one store across connections, so
/// data survives credential changes the way a real container would.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    stores: Mutex<HashMap<Location, Arc<InMemory>>>,
}

impl MemoryConnector {
    /// Creates an empty in-memory connector.
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self, location: &Location) -> Arc<InMemory> {
        let mut stores = self
            .stores
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            stores
                .entry(location.clone())
                .or_insert_with(|| Arc::new(InMemory::new())),
        )
    }
}

impl Connector for MemoryConnector {
    fn connect(
        &self,
        credential: &ResolvedCredential,
        location: &Location,
    ) -> Result<Arc<dyn Backend>, BackendError> {
        tracing::debug!(
            target: TRACING_TARGET_BACKEND,
            location = %location,
            credential_id = credential.id(),
            "Connecting to in-memory storage"
        );

        Ok(Arc::new(ObjectStoreBackend::from_shared(self.store(location))))
    }

    fn connect_with_sas(
        &self,
        sas: &str,
        location: &Location,
    ) -> Result<Arc<dyn Backend>, BackendError> {
        if sas.trim_start_matches('?').is_empty() {
            return Err(BackendError::auth_rejected("empty shared access signature"));
        }

        Ok(Arc::new(ObjectStoreBackend::from_shared(self.store(location))))
    }
}

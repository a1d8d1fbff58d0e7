//! Storage gateway configuration.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::{Result, StorageError};

// Default values
const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_RETRIES: usize = 3;

/// How object bodies are uploaded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, Display, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UploadMode {
    /// One request carrying the whole body.
    #[default]
    Full,
    /// Multipart upload in chunks of `chunk_size` bytes, committed at the end.
    Chunks,
}

/// Configuration for [`StorageGateway`](crate::StorageGateway).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct StorageConfig {
    /// Storage account used for plain keys and `az://` URIs.
    #[cfg_attr(
        feature = "config",
        arg(long = "account", env = "AZURE_STORAGE_ACCOUNT")
    )]
    #[serde(default)]
    pub account: Option<String>,

    /// Container used for plain keys.
    #[cfg_attr(
        feature = "config",
        arg(long = "container", env = "AZURE_STORAGE_CONTAINER")
    )]
    #[serde(default)]
    pub container: Option<String>,

    /// Custom endpoint URL (Azure Stack or Azurite).
    #[cfg_attr(
        feature = "config",
        arg(long = "storage-endpoint", env = "AZURE_STORAGE_ENDPOINT")
    )]
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Upload mode for writes: `full` or `chunks`.
    #[cfg_attr(
        feature = "config",
        arg(long = "upload-mode", env = "PAEIO_UPLOAD_MODE", default_value = "full")
    )]
    #[serde(default)]
    pub upload_mode: UploadMode,

    /// Part size in bytes for chunked uploads.
    #[cfg_attr(
        feature = "config",
        arg(long = "chunk-size", env = "PAEIO_CHUNK_SIZE")
    )]
    #[serde(default)]
    pub chunk_size: Option<usize>,

    /// Per-request timeout in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long = "request-timeout", env = "PAEIO_REQUEST_TIMEOUT_SECS")
    )]
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Connection timeout in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long = "connect-timeout", env = "PAEIO_CONNECT_TIMEOUT_SECS")
    )]
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,

    /// Retries of transient failures inside the storage client.
    #[cfg_attr(
        feature = "config",
        arg(long = "max-retries", env = "PAEIO_MAX_RETRIES")
    )]
    #[serde(default)]
    pub max_retries: Option<usize>,
}

impl StorageConfig {
    /// Creates a configuration for one account and default container.
    pub fn new(account: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            account: Some(account.into()),
            container: Some(container.into()),
            ..Self::default()
        }
    }

    /// Part size for chunked uploads.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    /// Connection timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    /// Retries of transient failures.
    pub fn max_retries(&self) -> usize {
        self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }

    /// Set the custom endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Upload everything in one request.
    #[must_use]
    pub fn with_full_upload(mut self) -> Self {
        self.upload_mode = UploadMode::Full;
        self
    }

    /// Upload through multipart uploads of `chunk_size` bytes.
    #[must_use]
    pub fn with_chunked_upload(mut self, chunk_size: usize) -> Self {
        self.upload_mode = UploadMode::Chunks;
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.account.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(StorageError::invalid_config("account cannot be empty"));
        }

        if self.container.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(StorageError::invalid_config("container cannot be empty"));
        }

        if self.chunk_size == Some(0) {
            return Err(StorageError::invalid_config("chunk size must be positive"));
        }

        if self.request_timeout_secs == Some(0) || self.connect_timeout_secs == Some(0) {
            return Err(StorageError::invalid_config("timeouts must be positive"));
        }

        if let Some(endpoint) = &self.endpoint
            && !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(StorageError::invalid_config(format!(
                "endpoint must be an http(s) URL, got '{endpoint}'"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = StorageConfig::new("acct01", "landing");
        assert_eq!(config.upload_mode, UploadMode::Full);
        assert_eq!(config.chunk_size(), DEFAULT_CHUNK_SIZE);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.max_retries(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn upload_mode_parsing() {
        assert_eq!("chunks".parse::<UploadMode>().unwrap(), UploadMode::Chunks);
        assert_eq!(UploadMode::Full.to_string(), "full");
        assert!("partial".parse::<UploadMode>().is_err());
    }

    #[test]
    fn validation() {
        assert!(
            StorageConfig::new("acct01", "landing")
                .with_chunked_upload(0)
                .validate()
                .is_err()
        );
        assert!(StorageConfig::new("", "landing").validate().is_err());
        assert!(
            StorageConfig::new("acct01", "landing")
                .with_endpoint("127.0.0.1:10000")
                .validate()
                .is_err()
        );
        assert!(
            StorageConfig::new("acct01", "landing")
                .with_endpoint("http://127.0.0.1:10000/devstoreaccount1")
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn deserializes_from_json() {
        let config: StorageConfig =
            serde_json::from_str(r#"{"account":"acct01","upload_mode":"chunks"}"#).unwrap();
        assert_eq!(config.account.as_deref(), Some("acct01"));
        assert_eq!(config.container, None);
        assert_eq!(config.upload_mode, UploadMode::Chunks);
    }
}

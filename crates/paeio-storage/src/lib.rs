#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for gateway operations and re-authentication.
pub const TRACING_TARGET_GATEWAY: &str = "paeio_storage::gateway";

/// Tracing target for backend construction and object store calls.
pub const TRACING_TARGET_BACKEND: &str = "paeio_storage::backend";

pub mod backend;
mod config;
mod connector;
mod error;
mod gateway;
mod glob;
mod payload;
mod uri;

#[doc(hidden)]
pub mod prelude;

pub use config::{StorageConfig, UploadMode};
pub use connector::{AzureConnector, Connector, Location, MemoryConnector};
pub use error::{Result, StorageError};
pub use gateway::{StorageGateway, WriteAck};
pub use glob::GlobPattern;
pub use payload::Payload;
pub use uri::{AzureUri, ServiceKind};

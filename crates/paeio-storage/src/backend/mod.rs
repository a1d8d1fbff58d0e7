//! Object storage seam.
//!
//! [`Backend`] is what the gateway talks to once it holds a credential. The
//! production implementation wraps [`object_store`]; tests wrap it again to
//! script authentication failures.

mod error;
mod store;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

pub use error::{BackendError, BackendErrorKind};
pub use store::ObjectStoreBackend;

/// Metadata of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Key of the object within its container.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, if reported.
    pub last_modified: Option<Timestamp>,
    /// Entity tag, if reported.
    pub e_tag: Option<String>,
}

/// Result of a successful [`Backend::get`].
#[derive(Debug, Clone)]
pub struct GetOutput {
    /// Raw bytes of the object.
    pub data: Bytes,
    /// MIME content-type, if the backend provides one.
    pub content_type: Option<String>,
    /// Object metadata.
    pub info: ObjectInfo,
}

/// Result of a successful put.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOutput {
    /// Entity tag of the new object, if the backend provides one.
    pub e_tag: Option<String>,
    /// Version of the new object, if the backend provides one.
    pub version: Option<String>,
}

impl From<object_store::PutResult> for PutOutput {
    fn from(r: object_store::PutResult) -> Self {
        Self {
            e_tag: r.e_tag,
            version: r.version,
        }
    }
}

/// Authenticated client for one container.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Reads the whole object at `key`.
    async fn get(&self, key: &str) -> Result<GetOutput, BackendError>;

    /// Replaces the object at `key` in a single request.
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<PutOutput, BackendError>;

    /// Replaces the object at `key` through a multipart upload.
    ///
    /// The object only becomes visible once every part is committed; a
    /// failed upload is aborted.
    async fn put_multipart(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
        chunk_size: usize,
    ) -> Result<PutOutput, BackendError>;

    /// Returns metadata without downloading the body.
    async fn head(&self, key: &str) -> Result<ObjectInfo, BackendError>;

    /// Deletes the object at `key`.
    async fn delete(&self, key: &str) -> Result<(), BackendError>;

    /// Copies an object within the container, overwriting `to`.
    async fn copy(&self, from: &str, to: &str) -> Result<(), BackendError>;

    /// Lists every object under `prefix`, recursively.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, BackendError>;
}

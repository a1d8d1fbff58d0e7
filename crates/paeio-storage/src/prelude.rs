//! Convenience re-exports.

pub use crate::backend::ObjectInfo;
pub use crate::config::{StorageConfig, UploadMode};
pub use crate::error::{Result, StorageError};
pub use crate::gateway::{StorageGateway, WriteAck};
pub use crate::payload::Payload;

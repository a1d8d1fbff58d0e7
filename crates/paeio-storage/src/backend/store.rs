//! [`Backend`] backed by [`object_store::ObjectStore`].

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use jiff::Timestamp;
use object_store::path::Path;
use object_store::{
    Attribute, Attributes, ObjectMeta, ObjectStore, PutMode, PutMultipartOpts, PutOptions,
    PutPayload, WriteMultipart,
};

use super::{Backend, BackendError, GetOutput, ObjectInfo, PutOutput};
use crate::TRACING_TARGET_BACKEND;

/// Parts uploaded concurrently during a multipart write.
const MAX_IN_FLIGHT_PARTS: usize = 4;

/// Cloneable handle to any [`ObjectStore`] (Azure, in-memory, ...).
#[derive(Clone, Debug)]
pub struct ObjectStoreBackend(Arc<dyn ObjectStore>);

impl ObjectStoreBackend {
    /// Wrap a concrete [`ObjectStore`] implementation.
    pub fn new(store: impl ObjectStore) -> Self {
        Self(Arc::new(store))
    }

    /// Wrap an already shared store.
    pub fn from_shared(store: Arc<dyn ObjectStore>) -> Self {
        Self(store)
    }
}

fn content_type_attributes(content_type: Option<&str>) -> Attributes {
    let mut attributes = Attributes::new();
    if let Some(ct) = content_type {
        attributes.insert(Attribute::ContentType, ct.to_owned().into());
    }
    attributes
}

fn object_info(meta: ObjectMeta) -> ObjectInfo {
    let last_modified = Timestamp::new(
        meta.last_modified.timestamp(),
        i32::try_from(meta.last_modified.timestamp_subsec_nanos()).unwrap_or_default(),
    )
    .ok();

    ObjectInfo {
        key: meta.location.to_string(),
        size: meta.size,
        last_modified,
        e_tag: meta.e_tag,
    }
}

#[async_trait]
impl Backend for ObjectStoreBackend {
    #[tracing::instrument(name = "backend.get", skip(self))]
    async fn get(&self, key: &str) -> Result<GetOutput, BackendError> {
        let path = Path::from(key);
        let result = self.0.get(&path).await?;
        let meta = result.meta.clone();
        let content_type = result
            .attributes
            .get(&Attribute::ContentType)
            .map(|v| v.to_string());
        let data = result.bytes().await?;

        Ok(GetOutput {
            data,
            content_type,
            info: object_info(meta),
        })
    }

    #[tracing::instrument(
        name = "backend.put",
        skip(self, data),
        fields(size = data.len())
    )]
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<PutOutput, BackendError> {
        let path = Path::from(key);
        let opts = PutOptions {
            mode: PutMode::Overwrite,
            attributes: content_type_attributes(content_type),
            ..Default::default()
        };

        let result = self.0.put_opts(&path, PutPayload::from(data), opts).await?;
        Ok(result.into())
    }

    #[tracing::instrument(
        name = "backend.put_multipart",
        skip(self, data),
        fields(size = data.len())
    )]
    async fn put_multipart(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
        chunk_size: usize,
    ) -> Result<PutOutput, BackendError> {
        if data.is_empty() {
            return self.put(key, data, content_type).await;
        }

        let chunk_size = chunk_size.max(1);
        let path = Path::from(key);
        let opts = PutMultipartOpts {
            attributes: content_type_attributes(content_type),
            ..Default::default()
        };

        let upload = self.0.put_multipart_opts(&path, opts).await?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, chunk_size);

        for chunk in data.chunks(chunk_size) {
            if let Err(err) = writer.wait_for_capacity(MAX_IN_FLIGHT_PARTS).await {
                if let Err(abort_err) = writer.abort().await {
                    tracing::warn!(
                        target: TRACING_TARGET_BACKEND,
                        error = %abort_err,
                        "Failed to abort multipart upload"
                    );
                }
                return Err(err.into());
            }
            writer.write(chunk);
        }

        let result = writer.finish().await?;
        Ok(result.into())
    }

    #[tracing::instrument(name = "backend.head", skip(self))]
    async fn head(&self, key: &str) -> Result<ObjectInfo, BackendError> {
        let path = Path::from(key);
        Ok(object_info(self.0.head(&path).await?))
    }

    #[tracing::instrument(name = "backend.delete", skip(self))]
    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        let path = Path::from(key);
        Ok(self.0.delete(&path).await?)
    }

    #[tracing::instrument(name = "backend.copy", skip(self))]
    async fn copy(&self, from: &str, to: &str) -> Result<(), BackendError> {
        let from = Path::from(from);
        let to = Path::from(to);
        Ok(self.0.copy(&from, &to).await?)
    }

    #[tracing::instrument(name = "backend.list", skip(self))]
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, BackendError> {
        let prefix = if prefix.is_empty() {
            None
        } else {
            Some(Path::from(prefix))
        };

        let metas: Vec<ObjectMeta> = self.0.list(prefix.as_ref()).try_collect().await?;
        Ok(metas.into_iter().map(object_info).collect())
    }
}

#[cfg(test)]
mod tests {
    use object_store::memory::InMemory;

    use super::*;
    use crate::backend::BackendErrorKind;

    fn backend() -> ObjectStoreBackend {
        ObjectStoreBackend::new(InMemory::new())
    }

    #[tokio::test]
    async fn put_and_get() {
        let backend = backend();
        let data = Bytes::from("a,b\n1,2\n");
        backend
            .put("data/out.csv", data.clone(), Some("text/csv"))
            .await
            .unwrap();

        let output = backend.get("data/out.csv").await.unwrap();
        assert_eq!(output.data, data);
        assert_eq!(output.content_type.as_deref(), Some("text/csv"));
        assert_eq!(output.info.key, "data/out.csv");
        assert_eq!(output.info.size, 8);
        assert!(output.info.last_modified.is_some());
    }

    #[tokio::test]
    async fn multipart_upload_reassembles_chunks() {
        let backend = backend();
        let data = Bytes::from((0..1000u32).map(|i| (i % 251) as u8).collect::<Vec<_>>());

        backend
            .put_multipart("big.bin", data.clone(), None, 64)
            .await
            .unwrap();

        assert_eq!(backend.get("big.bin").await.unwrap().data, data);
    }

    #[tokio::test]
    async fn multipart_upload_of_empty_payload() {
        let backend = backend();
        backend
            .put_multipart("empty.bin", Bytes::new(), None, 64)
            .await
            .unwrap();

        assert_eq!(backend.head("empty.bin").await.unwrap().size, 0);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let err = backend().get("missing").await.unwrap_err();
        assert_eq!(err.kind(), BackendErrorKind::NotFound);
    }

    #[tokio::test]
    async fn copy_and_delete() {
        let backend = backend();
        backend.put("a.txt", Bytes::from("x"), None).await.unwrap();
        backend.copy("a.txt", "b.txt").await.unwrap();
        backend.delete("a.txt").await.unwrap();

        assert!(backend.head("a.txt").await.is_err());
        assert_eq!(backend.get("b.txt").await.unwrap().data, Bytes::from("x"));
    }

    #[tokio::test]
    async fn list_is_recursive() {
        let backend = backend();
        for key in ["dir/a.txt", "dir/sub/b.txt", "other/c.txt"] {
            backend.put(key, Bytes::from("x"), None).await.unwrap();
        }

        let mut keys: Vec<_> = backend
            .list("dir")
            .await
            .unwrap()
            .into_iter()
            .map(|info| info.key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["dir/a.txt", "dir/sub/b.txt"]);

        assert_eq!(backend.list("").await.unwrap().len(), 3);
    }
}

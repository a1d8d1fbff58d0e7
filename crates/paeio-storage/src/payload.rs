//! Object contents exchanged with the gateway.

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, StorageError};

/// Bytes read from or written to an object, with an optional content-type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    data: Bytes,
    content_type: Option<String>,
}

impl Payload {
    /// Wraps raw bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            content_type: None,
        }
    }

    /// UTF-8 text payload.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(text.into()).with_content_type("text/plain; charset=utf-8")
    }

    /// Serializes `value` as a single JSON document.
    pub fn from_json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let data = serde_json::to_vec(value).map_err(|e| StorageError::payload(e.to_string()))?;
        Ok(Self::new(data).with_content_type("application/json"))
    }

    /// Serializes `records` as newline-delimited JSON.
    pub fn from_records<'a, T, I>(records: I) -> Result<Self>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut data = Vec::new();
        for record in records {
            serde_json::to_writer(&mut data, record)
                .map_err(|e| StorageError::payload(e.to_string()))?;
            data.push(b'\n');
        }
        Ok(Self::new(data).with_content_type("application/x-ndjson"))
    }

    /// Sets the content-type stored with the object.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Raw bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    /// Consumes the payload, returning its bytes.
    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    /// Content-type, if known.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrows the contents as UTF-8 text.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.data).map_err(|e| StorageError::payload(e.to_string()))
    }

    /// Deserializes the contents as one JSON document.
    pub fn to_json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.data).map_err(|e| StorageError::payload(e.to_string()))
    }

    /// Deserializes newline-delimited JSON records, skipping blank lines.
    pub fn to_records<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.text()?
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line)
                    .map_err(|e| StorageError::payload(format!("record {}: {e}", index + 1)))
            })
            .collect()
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&'static str> for Payload {
    fn from(text: &'static str) -> Self {
        Self::new(text)
    }
}

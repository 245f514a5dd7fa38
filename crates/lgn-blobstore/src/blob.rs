use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// The metadata of a blob, as seen by callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobMetadata {
    /// The full key of the blob inside its container, directory prefix
    /// included.
    pub name: String,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    /// The MD5 digest of the payload, if known.
    pub content_md5: Option<Vec<u8>>,
    pub user_metadata: BTreeMap<String, String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl BlobMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A named payload along with its metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blob {
    pub metadata: BlobMetadata,
    pub payload: Bytes,
}

impl Blob {
    /// Creates a blob whose content length is the size of the payload.
    pub fn new(name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();

        Self {
            metadata: BlobMetadata {
                content_length: Some(payload.len() as u64),
                ..BlobMetadata::new(name)
            },
            payload,
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.metadata.content_type = Some(content_type.into());
        self
    }

    /// Attach a digest computed by the caller.
    #[must_use]
    pub fn with_content_md5(mut self, digest: impl Into<Vec<u8>>) -> Self {
        self.metadata.content_md5 = Some(digest.into());
        self
    }

    #[must_use]
    pub fn with_user_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.user_metadata.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

//! Conversions between generic blobs and native objects.

use tracing::warn;

use crate::{
    gateway::{self, NativeMetadata, NativeObject},
    path, Blob, BlobMetadata, ByteRange, GetOptions,
};

/// The user-metadata key under which the content digest is stored, as the
/// native objects have no digest field of their own.
pub const CONTENT_MD5_METADATA_KEY: &str = "content-md5";

/// Converts a blob into a native object.
///
/// Payload, content type, content length and user metadata are copied as-is.
/// If the blob carries a digest, its hex encoding is stored in the user
/// metadata under [`CONTENT_MD5_METADATA_KEY`]. A caller-supplied entry with
/// the same key is overwritten.
pub fn blob_to_native(blob: Blob) -> NativeObject {
    let Blob { metadata, payload } = blob;
    let mut user_metadata = metadata.user_metadata;

    if let Some(digest) = &metadata.content_md5 {
        let digest = hex::encode(digest);

        if let Some(previous) = user_metadata.insert(CONTENT_MD5_METADATA_KEY.to_string(), digest)
        {
            if previous != user_metadata[CONTENT_MD5_METADATA_KEY] {
                warn!(
                    "blob `{}`: user metadata `{}` was replaced by the content digest",
                    metadata.name, CONTENT_MD5_METADATA_KEY
                );
            }
        }
    }

    NativeObject {
        metadata: NativeMetadata {
            name: metadata.name,
            content_type: metadata.content_type,
            content_length: metadata.content_length,
            user_metadata,
            system_metadata: None,
        },
        payload,
    }
}

/// Converts native metadata into blob metadata.
///
/// The native name is a full native path: the container is stripped from it.
/// A digest stored in the user metadata is decoded back, and left in place.
pub fn native_to_blob_metadata(from: NativeMetadata) -> BlobMetadata {
    let name = match path::parse_path(&from.name) {
        (_, Some(key)) => key.to_string(),
        (name, None) => name.to_string(),
    };

    let content_md5 = from
        .user_metadata
        .get(CONTENT_MD5_METADATA_KEY)
        .and_then(|digest| hex::decode(digest).ok());

    let (content_length, last_modified) = match &from.system_metadata {
        Some(system) => (
            from.content_length.or(Some(system.size)),
            Some(system.last_modified),
        ),
        None => (from.content_length, None),
    };

    BlobMetadata {
        name,
        content_type: from.content_type,
        content_length,
        content_md5,
        user_metadata: from.user_metadata,
        last_modified,
    }
}

/// Converts a native object into a blob.
pub fn native_to_blob(from: NativeObject) -> Blob {
    Blob {
        metadata: native_to_blob_metadata(from.metadata),
        payload: from.payload,
    }
}

/// Converts generic fetch options into native ones.
pub fn to_native_get_options(from: &GetOptions) -> gateway::GetOptions {
    gateway::GetOptions {
        range: from.range.map(|range| match range {
            ByteRange::Range { start, end } => format!("bytes={}-{}", start, end),
            ByteRange::StartAt(start) => format!("bytes={}-", start),
            ByteRange::Tail(count) => format!("bytes=-{}", count),
        }),
        if_modified_since: from.if_modified_since,
        if_unmodified_since: from.if_unmodified_since,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::gateway::{FileType, SystemMetadata};

    #[test]
    fn test_digest_is_stored_as_user_metadata() {
        let blob = Blob::new("a/b.txt", &b"payload"[..])
            .with_content_type("text/plain")
            .with_content_md5(vec![0xab, 0xcd])
            .with_user_metadata("owner", "me");

        let object = blob_to_native(blob);

        assert_eq!(object.metadata.name, "a/b.txt");
        assert_eq!(object.metadata.content_type.as_deref(), Some("text/plain"));
        assert_eq!(object.metadata.content_length, Some(7));
        assert_eq!(
            object.metadata.user_metadata.get(CONTENT_MD5_METADATA_KEY),
            Some(&"abcd".to_string())
        );
        assert_eq!(
            object.metadata.user_metadata.get("owner"),
            Some(&"me".to_string())
        );
        assert_eq!(&object.payload[..], b"payload");
    }

    #[test]
    fn test_digest_overwrites_caller_metadata() {
        let blob = Blob::new("a", &b""[..])
            .with_user_metadata(CONTENT_MD5_METADATA_KEY, "caller")
            .with_content_md5(vec![0x01]);

        let object = blob_to_native(blob);

        assert_eq!(
            object.metadata.user_metadata.get(CONTENT_MD5_METADATA_KEY),
            Some(&"01".to_string())
        );

        // Without a digest, the caller entry is kept.
        let blob = Blob::new("a", &b""[..]).with_user_metadata(CONTENT_MD5_METADATA_KEY, "caller");
        let object = blob_to_native(blob);

        assert_eq!(
            object.metadata.user_metadata.get(CONTENT_MD5_METADATA_KEY),
            Some(&"caller".to_string())
        );
    }

    #[test]
    fn test_native_to_blob_metadata() {
        let now = Utc::now();
        let mut native = NativeMetadata {
            name: "c1/a/b.txt".to_string(),
            content_type: Some("text/plain".to_string()),
            content_length: None,
            system_metadata: Some(SystemMetadata {
                size: 12,
                last_modified: now,
                file_type: FileType::RegularFile,
            }),
            ..NativeMetadata::default()
        };
        native
            .user_metadata
            .insert(CONTENT_MD5_METADATA_KEY.to_string(), "abcd".to_string());

        let metadata = native_to_blob_metadata(native);

        assert_eq!(metadata.name, "a/b.txt");
        assert_eq!(metadata.content_length, Some(12));
        assert_eq!(metadata.content_md5, Some(vec![0xab, 0xcd]));
        assert_eq!(metadata.last_modified, Some(now));
        assert_eq!(
            metadata.user_metadata.get(CONTENT_MD5_METADATA_KEY),
            Some(&"abcd".to_string())
        );
    }

    #[test]
    fn test_to_native_get_options() {
        assert_eq!(
            to_native_get_options(&GetOptions::new().range(0, 9)).range,
            Some("bytes=0-9".to_string())
        );
        assert_eq!(
            to_native_get_options(&GetOptions::new().start_at(4)).range,
            Some("bytes=4-".to_string())
        );
        assert_eq!(
            to_native_get_options(&GetOptions::new().tail(2)).range,
            Some("bytes=-2".to_string())
        );
        assert_eq!(to_native_get_options(&GetOptions::new()).range, None);
    }
}

//! Legion Blob Store
//!
//! A provider-agnostic blob store: containers, directories and blobs exposed
//! through a single interface, translated onto the addressing scheme, option
//! vocabulary and consistency guarantees of a specific backend.
//!
//! The [`BlobStore`] facade owns no state. It builds native paths with the
//! [`path`] helpers, native listing options with [`to_native_list_options`],
//! calls a [`BackendGateway`] and projects the native results back into the
//! generic model.

// crate-specific lint exceptions:
//#![allow()]

mod blob;
mod blob_codec;
mod blob_store;
mod config;
mod errors;
pub mod gateway;
mod list_options;
mod options;
pub mod path;
mod projection;
mod storage_metadata;

pub use blob::{Blob, BlobMetadata};
pub use blob_codec::{
    blob_to_native, native_to_blob, native_to_blob_metadata, to_native_get_options,
    CONTENT_MD5_METADATA_KEY,
};
pub use blob_store::{BlobStore, DeleteConfirmation};
pub use config::{
    BackendConfig, Config, DeleteConfirmationConfig, LocalBackendConfig,
    ENV_LGN_BLOB_STORE_SECTION,
};
pub use errors::{Error, Result};
pub use gateway::{BackendGateway, LocalGateway, MemoryGateway};
pub use list_options::to_native_list_options;
pub use options::{ByteRange, GetOptions, ListContainerOptions};
pub use projection::{project_container_listing, project_directory_listing};
pub use storage_metadata::{PageSet, StorageMetadata, StorageType};

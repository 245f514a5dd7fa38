//! The minimal set of backend operations the blob store depends on, along
//! with the native types those operations exchange.
//!
//! Every backend family implements [`BackendGateway`] once. Paths handed to a
//! gateway are native paths built with [`crate::path`].

mod errors;
mod local;
mod memory;

use std::{collections::BTreeMap, ops::Range, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

pub use errors::{Error, Result, Status};
pub use local::LocalGateway;
pub use memory::MemoryGateway;

/// The page size used when a listing does not specify one.
pub const DEFAULT_MAX_RESULTS: usize = 10_000;

/// Whether a native entry is a directory or a regular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Directory,
    RegularFile,
}

/// Metadata maintained by the backend itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemMetadata {
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub file_type: FileType,
}

/// The metadata of a native object.
///
/// `name` is the key relative to the parent when creating a file, and the
/// full native path when returned by a read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeMetadata {
    pub name: String,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub user_metadata: BTreeMap<String, String>,
    pub system_metadata: Option<SystemMetadata>,
}

/// A native object: metadata and payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeObject {
    pub metadata: NativeMetadata,
    pub payload: Bytes,
}

/// What a native listing covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    /// Every entry of the container whose name starts with the prefix.
    Prefix(String),
    /// Only the entries directly under the path.
    UnderPath(String),
}

impl Default for ListScope {
    fn default() -> Self {
        Self::Prefix(String::new())
    }
}

/// Native listing options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub scope: ListScope,
    pub marker: Option<String>,
    pub max_results: Option<u32>,
}

impl ListOptions {
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.scope = ListScope::Prefix(prefix.into());
        self
    }

    #[must_use]
    pub fn under_path(mut self, path: impl Into<String>) -> Self {
        self.scope = ListScope::UnderPath(path.into());
        self
    }

    #[must_use]
    pub fn after_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    #[must_use]
    pub fn max_results(mut self, max_results: u32) -> Self {
        self.max_results = Some(max_results);
        self
    }
}

/// Native fetch options.
///
/// `range` uses the HTTP `Range` header syntax for a single range:
/// `bytes=0-9`, `bytes=10-` or `bytes=-10`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    pub range: Option<String>,
    pub if_modified_since: Option<DateTime<Utc>>,
    pub if_unmodified_since: Option<DateTime<Utc>>,
}

/// A native listing entry. Directory names end with the path separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub file_type: FileType,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of a native listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryListing {
    pub entries: Vec<DirectoryEntry>,
    pub next_marker: Option<String>,
}

/// The operations a backend must provide.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// Checks whether a path exists.
    ///
    /// A path ending with the separator only matches directories. A container
    /// path matches its directory. Any other path only matches files.
    async fn path_exists(&self, path: &str) -> Result<bool>;

    /// Creates a directory, and its missing ancestors.
    ///
    /// Creating an existing directory is a no-op. If a file occupies the path,
    /// `Error::AlreadyExists` is returned.
    async fn create_directory(&self, path: &str) -> Result<()>;

    /// Creates a file under `parent`, at the key named by the object
    /// metadata.
    ///
    /// The write is all-or-nothing. If the path is already occupied,
    /// `Error::AlreadyExists` is returned.
    async fn create_file(&self, parent: &str, object: NativeObject) -> Result<()>;

    /// Reads a file, honouring the range and preconditions of `options`.
    async fn read_file(&self, path: &str, options: &GetOptions) -> Result<NativeObject>;

    /// Reads the metadata of a file without transferring its payload.
    async fn head_file(&self, path: &str) -> Result<NativeMetadata>;

    /// Deletes a file or an empty directory.
    ///
    /// Below a container, a directory is only deleted through its marker
    /// path, ending with the separator.
    async fn delete_path(&self, path: &str) -> Result<()>;

    /// Lists the top-level directories.
    async fn list_directories(&self) -> Result<DirectoryListing>;

    /// Lists the content of a top-level directory.
    ///
    /// Entry names are relative to `path`.
    async fn list_directory(&self, path: &str, options: &ListOptions)
        -> Result<DirectoryListing>;
}

/// Blanket implementations for Arc<T> variants.

#[async_trait]
impl<T: BackendGateway + ?Sized> BackendGateway for Arc<T> {
    async fn path_exists(&self, path: &str) -> Result<bool> {
        (**self).path_exists(path).await
    }

    async fn create_directory(&self, path: &str) -> Result<()> {
        (**self).create_directory(path).await
    }

    async fn create_file(&self, parent: &str, object: NativeObject) -> Result<()> {
        (**self).create_file(parent, object).await
    }

    async fn read_file(&self, path: &str, options: &GetOptions) -> Result<NativeObject> {
        (**self).read_file(path, options).await
    }

    async fn head_file(&self, path: &str) -> Result<NativeMetadata> {
        (**self).head_file(path).await
    }

    async fn delete_path(&self, path: &str) -> Result<()> {
        (**self).delete_path(path).await
    }

    async fn list_directories(&self) -> Result<DirectoryListing> {
        (**self).list_directories().await
    }

    async fn list_directory(
        &self,
        path: &str,
        options: &ListOptions,
    ) -> Result<DirectoryListing> {
        (**self).list_directory(path, options).await
    }
}

/// Blanket implementations for Box<T> variants.

#[async_trait]
impl<T: BackendGateway + ?Sized> BackendGateway for Box<T> {
    async fn path_exists(&self, path: &str) -> Result<bool> {
        (**self).path_exists(path).await
    }

    async fn create_directory(&self, path: &str) -> Result<()> {
        (**self).create_directory(path).await
    }

    async fn create_file(&self, parent: &str, object: NativeObject) -> Result<()> {
        (**self).create_file(parent, object).await
    }

    async fn read_file(&self, path: &str, options: &GetOptions) -> Result<NativeObject> {
        (**self).read_file(path, options).await
    }

    async fn head_file(&self, path: &str) -> Result<NativeMetadata> {
        (**self).head_file(path).await
    }

    async fn delete_path(&self, path: &str) -> Result<()> {
        (**self).delete_path(path).await
    }

    async fn list_directories(&self) -> Result<DirectoryListing> {
        (**self).list_directories().await
    }

    async fn list_directory(
        &self,
        path: &str,
        options: &ListOptions,
    ) -> Result<DirectoryListing> {
        (**self).list_directory(path, options).await
    }
}

/// Blanket implementations for &T variants.

#[async_trait]
impl<T: BackendGateway + ?Sized> BackendGateway for &T {
    async fn path_exists(&self, path: &str) -> Result<bool> {
        (**self).path_exists(path).await
    }

    async fn create_directory(&self, path: &str) -> Result<()> {
        (**self).create_directory(path).await
    }

    async fn create_file(&self, parent: &str, object: NativeObject) -> Result<()> {
        (**self).create_file(parent, object).await
    }

    async fn read_file(&self, path: &str, options: &GetOptions) -> Result<NativeObject> {
        (**self).read_file(path, options).await
    }

    async fn head_file(&self, path: &str) -> Result<NativeMetadata> {
        (**self).head_file(path).await
    }

    async fn delete_path(&self, path: &str) -> Result<()> {
        (**self).delete_path(path).await
    }

    async fn list_directories(&self) -> Result<DirectoryListing> {
        (**self).list_directories().await
    }

    async fn list_directory(
        &self,
        path: &str,
        options: &ListOptions,
    ) -> Result<DirectoryListing> {
        (**self).list_directory(path, options).await
    }
}

/// Keeps the entries strictly after the marker and cuts the page.
///
/// If entries remain past the page, the last returned name becomes the
/// continuation marker.
pub(crate) fn paginate(
    entries: BTreeMap<String, DirectoryEntry>,
    marker: Option<&str>,
    max_results: Option<u32>,
) -> Result<DirectoryListing> {
    let limit = match max_results {
        Some(0) => {
            return Err(Error::InvalidOption(
                "max_results must be greater than zero".to_string(),
            ))
        }
        Some(max_results) => max_results as usize,
        None => DEFAULT_MAX_RESULTS,
    };

    let mut remaining = entries
        .into_values()
        .filter(|entry| marker.map_or(true, |marker| entry.name.as_str() > marker));

    let entries: Vec<_> = remaining.by_ref().take(limit).collect();

    let next_marker = if remaining.next().is_some() {
        entries.last().map(|entry| entry.name.clone())
    } else {
        None
    };

    Ok(DirectoryListing {
        entries,
        next_marker,
    })
}

/// Resolves a `Range` header value against a payload of `length` bytes.
pub(crate) fn resolve_range(path: &str, range: &str, length: u64) -> Result<Range<usize>> {
    let invalid = || Error::InvalidOption(format!("invalid range `{}`", range));
    let not_satisfiable = || Error::RangeNotSatisfiable {
        path: path.to_string(),
        length,
    };
    let parse = |value: &str| value.parse::<u64>().map_err(|_| invalid());

    let spec = range.strip_prefix("bytes=").ok_or_else(invalid)?;
    let (start, end) = spec.split_once('-').ok_or_else(invalid)?;

    let (start, end) = match (start.trim(), end.trim()) {
        ("", "") => return Err(invalid()),
        ("", count) => {
            let count = parse(count)?;

            if count == 0 || length == 0 {
                return Err(not_satisfiable());
            }

            (length.saturating_sub(count), length - 1)
        }
        (start, "") => (parse(start)?, length.saturating_sub(1)),
        (start, end) => {
            let (start, end) = (parse(start)?, parse(end)?);

            if start > end {
                return Err(invalid());
            }

            (start, end.min(length.saturating_sub(1)))
        }
    };

    if start >= length {
        return Err(not_satisfiable());
    }

    Ok(start as usize..(end + 1) as usize)
}

/// Checks the `if_modified_since` and `if_unmodified_since` preconditions.
pub(crate) fn check_preconditions(
    path: &str,
    last_modified: DateTime<Utc>,
    options: &GetOptions,
) -> Result<()> {
    if let Some(since) = options.if_modified_since {
        if last_modified <= since {
            return Err(Error::PreconditionFailed(path.to_string()));
        }
    }

    if let Some(since) = options.if_unmodified_since {
        if last_modified > since {
            return Err(Error::PreconditionFailed(path.to_string()));
        }
    }

    Ok(())
}

/// Reads a payload slice according to the options, once preconditions hold.
pub(crate) fn apply_get_options(
    path: &str,
    payload: Bytes,
    last_modified: DateTime<Utc>,
    options: &GetOptions,
) -> Result<Bytes> {
    check_preconditions(path, last_modified, options)?;

    match &options.range {
        Some(range) => {
            let range = resolve_range(path, range, payload.len() as u64)?;

            Ok(payload.slice(range))
        }
        None => Ok(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> DirectoryEntry {
        DirectoryEntry {
            name: name.to_string(),
            file_type: FileType::RegularFile,
            size: 0,
            last_modified: None,
        }
    }

    fn entries(names: &[&str]) -> BTreeMap<String, DirectoryEntry> {
        names
            .iter()
            .map(|name| ((*name).to_string(), entry(name)))
            .collect()
    }

    #[test]
    fn test_paginate() {
        let listing = paginate(entries(&["a", "b", "c"]), None, Some(2)).unwrap();

        assert_eq!(listing.entries, vec![entry("a"), entry("b")]);
        assert_eq!(listing.next_marker.as_deref(), Some("b"));

        let listing = paginate(entries(&["a", "b", "c"]), Some("b"), Some(2)).unwrap();

        assert_eq!(listing.entries, vec![entry("c")]);
        assert_eq!(listing.next_marker, None);

        assert!(matches!(
            paginate(entries(&["a"]), None, Some(0)),
            Err(Error::InvalidOption(_))
        ));
    }

    #[test]
    fn test_resolve_range() {
        assert_eq!(resolve_range("p", "bytes=0-3", 10).unwrap(), 0..4);
        assert_eq!(resolve_range("p", "bytes=5-100", 10).unwrap(), 5..10);
        assert_eq!(resolve_range("p", "bytes=7-", 10).unwrap(), 7..10);
        assert_eq!(resolve_range("p", "bytes=-3", 10).unwrap(), 7..10);
        assert_eq!(resolve_range("p", "bytes=-30", 10).unwrap(), 0..10);

        assert!(matches!(
            resolve_range("p", "bytes=10-12", 10),
            Err(Error::RangeNotSatisfiable { length: 10, .. })
        ));
        assert!(matches!(
            resolve_range("p", "bytes=-0", 10),
            Err(Error::RangeNotSatisfiable { .. })
        ));
        assert!(matches!(
            resolve_range("p", "bytes=4-2", 10),
            Err(Error::InvalidOption(_))
        ));
        assert!(matches!(
            resolve_range("p", "items=0-1", 10),
            Err(Error::InvalidOption(_))
        ));
    }

    #[test]
    fn test_check_preconditions() {
        let now = Utc::now();
        let before = now - chrono::Duration::seconds(10);

        let options = GetOptions {
            if_modified_since: Some(before),
            ..GetOptions::default()
        };
        assert!(check_preconditions("p", now, &options).is_ok());

        let options = GetOptions {
            if_modified_since: Some(now),
            ..GetOptions::default()
        };
        assert!(matches!(
            check_preconditions("p", now, &options),
            Err(Error::PreconditionFailed(_))
        ));

        let options = GetOptions {
            if_unmodified_since: Some(before),
            ..GetOptions::default()
        };
        assert!(matches!(
            check_preconditions("p", now, &options),
            Err(Error::PreconditionFailed(_))
        ));
    }
}

//! Projections of native listings into the generic listing model.

use crate::{
    gateway::{DirectoryEntry, DirectoryListing, FileType},
    path::{self, SEPARATOR},
    Error, PageSet, Result, StorageMetadata, StorageType,
};

fn project_entry(entry: DirectoryEntry, directory_type: StorageType) -> Result<StorageMetadata> {
    let is_directory =
        entry.file_type == FileType::Directory || path::is_directory_marker(&entry.name);
    let name = entry.name.trim_end_matches(SEPARATOR);

    if name.is_empty() {
        return Err(Error::Fatal(anyhow::anyhow!(
            "the backend returned a listing entry without a name: `{}`",
            entry.name
        )));
    }

    Ok(if is_directory {
        StorageMetadata {
            name: name.to_string(),
            storage_type: directory_type,
            size: None,
            last_modified: entry.last_modified,
        }
    } else {
        StorageMetadata {
            name: name.to_string(),
            storage_type: StorageType::Blob,
            size: Some(entry.size),
            last_modified: entry.last_modified,
        }
    })
}

fn project(
    listing: DirectoryListing,
    directory_type: StorageType,
) -> Result<PageSet<StorageMetadata>> {
    let items = listing
        .entries
        .into_iter()
        .map(|entry| project_entry(entry, directory_type))
        .collect::<Result<Vec<_>>>()?;

    Ok(PageSet::new(items, listing.next_marker))
}

/// Projects a listing of the top-level directories: directories become
/// containers.
///
/// # Errors
///
/// If an entry has no name, the listing is malformed and `Error::Fatal` is
/// returned.
pub fn project_container_listing(listing: DirectoryListing) -> Result<PageSet<StorageMetadata>> {
    project(listing, StorageType::Container)
}

/// Projects a listing of the content of a container.
///
/// Entries flagged as directories, or whose name ends with the separator,
/// become directories. The order and the continuation marker of the native
/// listing are kept.
///
/// # Errors
///
/// If an entry has no name, the listing is malformed and `Error::Fatal` is
/// returned.
pub fn project_directory_listing(listing: DirectoryListing) -> Result<PageSet<StorageMetadata>> {
    project(listing, StorageType::Directory)
}

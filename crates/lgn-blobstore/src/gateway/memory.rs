use std::{collections::BTreeMap, fmt::Display, ops::Bound, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{
    apply_get_options, paginate, BackendGateway, DirectoryEntry, DirectoryListing, Error,
    FileType, GetOptions, ListOptions, ListScope, NativeMetadata, NativeObject, Result,
    SystemMetadata,
};
use crate::path::{self, SEPARATOR};

/// A `MemoryGateway` is a flat, path-addressed store that keeps everything
/// in RAM.
///
/// Directories are emulated: creating one stores a zero-length marker path
/// ending with the separator, and any path prefix shared by stored objects is
/// treated as a directory as well.
#[derive(Default, Debug, Clone)]
pub struct MemoryGateway {
    entries: Arc<RwLock<BTreeMap<String, MemoryEntry>>>,
}

#[derive(Debug, Clone)]
enum MemoryEntry {
    Directory { last_modified: DateTime<Utc> },
    Object(StoredObject),
}

#[derive(Debug, Clone)]
struct StoredObject {
    payload: Bytes,
    content_type: Option<String>,
    user_metadata: BTreeMap<String, String>,
    last_modified: DateTime<Utc>,
}

impl StoredObject {
    fn metadata(&self, path: &str) -> NativeMetadata {
        NativeMetadata {
            name: path.to_string(),
            content_type: self.content_type.clone(),
            content_length: Some(self.payload.len() as u64),
            user_metadata: self.user_metadata.clone(),
            system_metadata: Some(SystemMetadata {
                size: self.payload.len() as u64,
                last_modified: self.last_modified,
                file_type: FileType::RegularFile,
            }),
        }
    }
}

impl MemoryGateway {
    /// Creates a new, empty, `MemoryGateway`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Display for MemoryGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "in-memory")
    }
}

// Paths sharing a prefix are contiguous in the map, so the first key after the
// directory tells whether it has children.
fn has_children(entries: &BTreeMap<String, MemoryEntry>, directory: &str) -> bool {
    entries
        .range::<str, _>((Bound::Excluded(directory), Bound::Unbounded))
        .next()
        .map_or(false, |(key, _)| key.starts_with(directory))
}

fn directory_exists(entries: &BTreeMap<String, MemoryEntry>, directory: &str) -> bool {
    entries.contains_key(directory) || has_children(entries, directory)
}

fn directory_entry(name: String, last_modified: Option<DateTime<Utc>>) -> DirectoryEntry {
    DirectoryEntry {
        name,
        file_type: FileType::Directory,
        size: 0,
        last_modified,
    }
}

fn to_directory_entry(name: &str, entry: &MemoryEntry) -> DirectoryEntry {
    match entry {
        MemoryEntry::Directory { last_modified } => {
            directory_entry(name.to_string(), Some(*last_modified))
        }
        MemoryEntry::Object(object) => DirectoryEntry {
            name: name.to_string(),
            file_type: FileType::RegularFile,
            size: object.payload.len() as u64,
            last_modified: Some(object.last_modified),
        },
    }
}

#[async_trait]
impl BackendGateway for MemoryGateway {
    #[instrument(skip(self))]
    async fn path_exists(&self, path: &str) -> Result<bool> {
        let entries = self.entries.read().await;

        if path::is_directory_marker(path) {
            return Ok(directory_exists(&entries, path));
        }

        // Below a container, a path without a trailing separator only
        // matches objects.
        if !path::is_container_path(path) {
            return Ok(matches!(entries.get(path), Some(MemoryEntry::Object(_))));
        }

        Ok(entries.contains_key(path) || directory_exists(&entries, &format!("{}/", path)))
    }

    #[instrument(skip(self))]
    async fn create_directory(&self, path: &str) -> Result<()> {
        let path = path.trim_end_matches(SEPARATOR);

        if path.is_empty() {
            return Err(Error::InvalidOption(
                "cannot create a directory with an empty path".to_string(),
            ));
        }

        let mut entries = self.entries.write().await;
        let now = Utc::now();
        let mut marker = String::new();

        for segment in path.split(SEPARATOR).filter(|s| !s.is_empty()) {
            marker.push_str(segment);

            if let Some(MemoryEntry::Object(_)) = entries.get(&marker) {
                return Err(Error::AlreadyExists(marker));
            }

            marker.push(SEPARATOR);

            entries
                .entry(marker.clone())
                .or_insert(MemoryEntry::Directory { last_modified: now });
        }

        debug!("created directory marker `{}`", marker);

        Ok(())
    }

    #[instrument(skip(self, object), fields(name = %object.metadata.name))]
    async fn create_file(&self, parent: &str, object: NativeObject) -> Result<()> {
        let path = path::native_path(parent, &object.metadata.name);
        let container = format!("{}/", path::parse_container_from_path(parent));
        let mut entries = self.entries.write().await;

        if !directory_exists(&entries, &container) {
            return Err(Error::NotFound(container));
        }

        if entries.contains_key(&path) || directory_exists(&entries, &format!("{}/", path)) {
            return Err(Error::AlreadyExists(path));
        }

        if let Some(content_length) = object.metadata.content_length {
            if content_length != object.payload.len() as u64 {
                return Err(Error::InvalidOption(format!(
                    "content length of `{}` is {} but the payload has {} bytes",
                    path,
                    content_length,
                    object.payload.len()
                )));
            }
        }

        debug!("storing {} bytes at `{}`", object.payload.len(), path);

        entries.insert(
            path,
            MemoryEntry::Object(StoredObject {
                payload: object.payload,
                content_type: object.metadata.content_type,
                user_metadata: object.metadata.user_metadata,
                last_modified: Utc::now(),
            }),
        );

        Ok(())
    }

    #[instrument(skip(self))]
    async fn read_file(&self, path: &str, options: &GetOptions) -> Result<NativeObject> {
        let entries = self.entries.read().await;

        match entries.get(path) {
            Some(MemoryEntry::Object(object)) => {
                let payload =
                    apply_get_options(path, object.payload.clone(), object.last_modified, options)?;
                let mut metadata = object.metadata(path);
                metadata.content_length = Some(payload.len() as u64);

                Ok(NativeObject { metadata, payload })
            }
            _ => Err(Error::NotFound(path.to_string())),
        }
    }

    #[instrument(skip(self))]
    async fn head_file(&self, path: &str) -> Result<NativeMetadata> {
        match self.entries.read().await.get(path) {
            Some(MemoryEntry::Object(object)) => Ok(object.metadata(path)),
            _ => Err(Error::NotFound(path.to_string())),
        }
    }

    #[instrument(skip(self))]
    async fn delete_path(&self, path: &str) -> Result<()> {
        let mut entries = self.entries.write().await;

        if !path::is_directory_marker(path) {
            if let Some(MemoryEntry::Object(_)) = entries.get(path) {
                entries.remove(path);

                return Ok(());
            }
        }

        if !path::is_directory_marker(path) && !path::is_container_path(path) {
            return Err(Error::NotFound(path.to_string()));
        }

        let directory = format!("{}/", path.trim_end_matches(SEPARATOR));

        if has_children(&entries, &directory) {
            return Err(Error::DirectoryNotEmpty(directory));
        }

        match entries.remove(&directory) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(path.to_string())),
        }
    }

    #[instrument(skip(self))]
    async fn list_directories(&self) -> Result<DirectoryListing> {
        let entries = self.entries.read().await;
        let mut directories = BTreeMap::new();

        for (key, entry) in entries.iter() {
            match key.split_once(SEPARATOR) {
                Some((container, rest)) => {
                    let name = format!("{}/", container);
                    let listed = directories
                        .entry(name.clone())
                        .or_insert_with(|| directory_entry(name, None));

                    if let (MemoryEntry::Directory { last_modified }, "") = (entry, rest) {
                        listed.last_modified = Some(*last_modified);
                    }
                }
                None => {
                    directories.insert(key.clone(), to_directory_entry(key, entry));
                }
            }
        }

        Ok(DirectoryListing {
            entries: directories.into_values().collect(),
            next_marker: None,
        })
    }

    #[instrument(skip(self))]
    async fn list_directory(
        &self,
        path: &str,
        options: &ListOptions,
    ) -> Result<DirectoryListing> {
        let root = format!("{}/", path.trim_end_matches(SEPARATOR));
        let entries = self.entries.read().await;

        if !directory_exists(&entries, &root) {
            return Err(Error::NotFound(path.to_string()));
        }

        let relative_entries = entries
            .range::<str, _>((Bound::Excluded(root.as_str()), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(root.as_str()))
            .map(|(key, entry)| (&key[root.len()..], entry));

        let mut selected = BTreeMap::new();

        match &options.scope {
            ListScope::Prefix(prefix) => {
                for (name, entry) in relative_entries {
                    if name.starts_with(prefix.as_str()) && name != prefix.as_str() {
                        selected.insert(name.to_string(), to_directory_entry(name, entry));
                    }
                }
            }
            ListScope::UnderPath(under) => {
                let base = match under.trim_end_matches(SEPARATOR) {
                    "" => String::new(),
                    under => format!("{}/", under),
                };

                for (name, entry) in relative_entries {
                    let rest = match name.strip_prefix(base.as_str()) {
                        Some(rest) if !rest.is_empty() => rest,
                        _ => continue,
                    };

                    match rest.find(SEPARATOR) {
                        // A deeper path: only its first level is listed.
                        Some(idx) if idx + 1 < rest.len() => {
                            let child = format!("{}{}", base, &rest[..=idx]);

                            selected
                                .entry(child.clone())
                                .or_insert_with(|| directory_entry(child, None));
                        }
                        _ => {
                            selected.insert(name.to_string(), to_directory_entry(name, entry));
                        }
                    }
                }
            }
        }

        debug!(
            "listed {} entries under `{}` with {:?}",
            selected.len(),
            root,
            options.scope
        );

        paginate(selected, options.marker.as_deref(), options.max_results)
    }
}

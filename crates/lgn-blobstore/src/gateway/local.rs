use std::{
    collections::BTreeMap,
    fmt::Display,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{
    apply_get_options, paginate, BackendGateway, DirectoryEntry, DirectoryListing, Error,
    FileType, GetOptions, ListOptions, ListScope, NativeMetadata, NativeObject, Result,
    SystemMetadata,
};
use crate::path::{self, SEPARATOR};

const OBJECTS_DIR: &str = "objects";
const METADATA_DIR: &str = "metadata";
const STAGING_DIR: &str = "staging";

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A `LocalGateway` is a gateway that stores objects on the local filesystem.
///
/// Payloads live under `objects/`, where directories are real directories.
/// Content type and user metadata are kept in a JSON sidecar under
/// `metadata/`. Writes go through `staging/` and are renamed into place, so a
/// reader never observes a partially written object.
#[derive(Debug, Clone)]
pub struct LocalGateway {
    root: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Sidecar {
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    user_metadata: BTreeMap<String, String>,
}

impl LocalGateway {
    /// Creates a new `LocalGateway` instance who stores objects in the
    /// specified directory.
    ///
    /// # Errors
    ///
    /// If the directory does not exist, or it cannot be created, an error is
    /// returned.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        for dir in [OBJECTS_DIR, METADATA_DIR, STAGING_DIR] {
            tokio::fs::create_dir_all(root.join(dir))
                .await
                .with_context(|| format!("could not create local gateway in: {}", root.display()))
                .map_err(Error::Fatal)?;
        }

        Ok(Self { root })
    }

    fn resolve(&self, base: &str, path: &str) -> Result<PathBuf> {
        let mut resolved = self.root.join(base);

        for segment in path.split(SEPARATOR).filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." {
                return Err(Error::InvalidOption(format!(
                    "path `{}` contains a relative segment",
                    path
                )));
            }

            resolved.push(segment);
        }

        Ok(resolved)
    }

    fn object_path(&self, path: &str) -> Result<PathBuf> {
        self.resolve(OBJECTS_DIR, path)
    }

    fn sidecar_path(&self, path: &str) -> Result<PathBuf> {
        let mut sidecar = self.resolve(METADATA_DIR, path)?.into_os_string();
        sidecar.push(".json");

        Ok(sidecar.into())
    }

    fn staging_path(&self) -> PathBuf {
        let id = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);

        self.root
            .join(STAGING_DIR)
            .join(format!("{}-{}", std::process::id(), id))
    }

    async fn read_sidecar(&self, path: &str) -> Result<Sidecar> {
        let sidecar_path = self.sidecar_path(path)?;

        match tokio::fs::read(&sidecar_path).await {
            Ok(data) => serde_json::from_slice(&data)
                .with_context(|| format!("corrupted metadata for `{}`", path))
                .map_err(Error::Fatal),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Sidecar::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn stage(&self, data: &[u8]) -> Result<PathBuf> {
        let staging = self.staging_path();

        if let Err(err) = tokio::fs::write(&staging, data).await {
            let _ = tokio::fs::remove_file(&staging).await;

            return Err(err.into());
        }

        Ok(staging)
    }

    /// Moves a payload and its sidecar into place. On failure neither is left
    /// behind.
    async fn write_object(
        &self,
        target: &Path,
        payload: &[u8],
        sidecar_path: &Path,
        sidecar: &[u8],
    ) -> Result<()> {
        let staged_sidecar = self.stage(sidecar).await?;
        let staged_payload = match self.stage(payload).await {
            Ok(staged) => staged,
            Err(err) => {
                let _ = tokio::fs::remove_file(&staged_sidecar).await;

                return Err(err);
            }
        };

        if let Err(err) = tokio::fs::rename(&staged_sidecar, sidecar_path).await {
            let _ = tokio::fs::remove_file(&staged_sidecar).await;
            let _ = tokio::fs::remove_file(&staged_payload).await;

            return Err(err.into());
        }

        if let Err(err) = tokio::fs::rename(&staged_payload, target).await {
            let _ = tokio::fs::remove_file(&staged_payload).await;
            let _ = tokio::fs::remove_file(sidecar_path).await;

            return Err(err.into());
        }

        Ok(())
    }
}

impl Display for LocalGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "local (root: {})", self.root.display())
    }
}

async fn stat(path: &Path) -> Result<Option<std::fs::Metadata>> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(Some(metadata)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn modified(metadata: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

fn non_empty(path: &str) -> Result<&str> {
    match path.trim_matches(SEPARATOR) {
        "" => Err(Error::InvalidOption("the path cannot be empty".to_string())),
        _ => Ok(path),
    }
}

async fn read_entries(dir: &Path, base: &str) -> Result<Vec<(String, DirectoryEntry)>> {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(err.into()),
    };

    let mut entries = vec![];

    while let Some(entry) = read_dir.next_entry().await? {
        let metadata = entry.metadata().await?;
        let mut name = format!("{}{}", base, entry.file_name().to_string_lossy());

        let file_type = if metadata.is_dir() {
            name.push(SEPARATOR);
            FileType::Directory
        } else {
            FileType::RegularFile
        };

        entries.push((
            name.clone(),
            DirectoryEntry {
                name,
                file_type,
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                last_modified: modified(&metadata),
            },
        ));
    }

    Ok(entries)
}

#[async_trait]
impl BackendGateway for LocalGateway {
    #[instrument(skip(self))]
    async fn path_exists(&self, path: &str) -> Result<bool> {
        let metadata = stat(&self.object_path(path)?).await?;

        Ok(match metadata {
            Some(metadata) if path::is_directory_marker(path) => metadata.is_dir(),
            Some(metadata) if !path::is_container_path(path) => metadata.is_file(),
            Some(_) => true,
            None => false,
        })
    }

    #[instrument(skip(self))]
    async fn create_directory(&self, path: &str) -> Result<()> {
        let fs_path = self.object_path(non_empty(path)?)?;

        if let Some(metadata) = stat(&fs_path).await? {
            return if metadata.is_dir() {
                Ok(())
            } else {
                Err(Error::AlreadyExists(path.to_string()))
            };
        }

        match tokio::fs::create_dir_all(&fs_path).await {
            Ok(()) => {
                debug!("created directory `{}`", fs_path.display());

                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::AlreadyExists(path.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self, object), fields(name = %object.metadata.name))]
    async fn create_file(&self, parent: &str, object: NativeObject) -> Result<()> {
        let path = path::native_path(parent, &object.metadata.name);
        let container = path::parse_container_from_path(parent);

        match stat(&self.object_path(non_empty(container)?)?).await? {
            Some(metadata) if metadata.is_dir() => {}
            _ => return Err(Error::NotFound(container.to_string())),
        }

        let target = self.object_path(&path)?;

        if stat(&target).await?.is_some() {
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

        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let sidecar = Sidecar {
            content_type: object.metadata.content_type,
            user_metadata: object.metadata.user_metadata,
        };
        let sidecar_path = self.sidecar_path(&path)?;

        if let Some(dir) = sidecar_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let sidecar = serde_json::to_vec(&sidecar)
            .with_context(|| format!("could not serialize metadata for `{}`", path))
            .map_err(Error::Fatal)?;

        debug!("storing {} bytes at `{}`", object.payload.len(), target.display());

        self.write_object(&target, &object.payload, &sidecar_path, &sidecar)
            .await
    }

    #[instrument(skip(self))]
    async fn read_file(&self, path: &str, options: &GetOptions) -> Result<NativeObject> {
        let mut metadata = self.head_file(path).await?;
        let last_modified = metadata
            .system_metadata
            .as_ref()
            .map_or_else(Utc::now, |system| system.last_modified);

        let payload = match tokio::fs::read(self.object_path(path)?).await {
            Ok(data) => Bytes::from(data),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(path.to_string()))
            }
            Err(err) => return Err(err.into()),
        };

        let payload = apply_get_options(path, payload, last_modified, options)?;
        metadata.content_length = Some(payload.len() as u64);

        Ok(NativeObject { metadata, payload })
    }

    #[instrument(skip(self))]
    async fn head_file(&self, path: &str) -> Result<NativeMetadata> {
        if path::is_directory_marker(path) {
            return Err(Error::NotFound(path.to_string()));
        }

        let fs_metadata = match stat(&self.object_path(path)?).await? {
            Some(metadata) if metadata.is_file() => metadata,
            _ => return Err(Error::NotFound(path.to_string())),
        };

        let sidecar = self.read_sidecar(path).await?;

        Ok(NativeMetadata {
            name: path.to_string(),
            content_type: sidecar.content_type,
            content_length: Some(fs_metadata.len()),
            user_metadata: sidecar.user_metadata,
            system_metadata: Some(SystemMetadata {
                size: fs_metadata.len(),
                last_modified: modified(&fs_metadata).unwrap_or_else(Utc::now),
                file_type: FileType::RegularFile,
            }),
        })
    }

    #[instrument(skip(self))]
    async fn delete_path(&self, path: &str) -> Result<()> {
        let fs_path = self.object_path(non_empty(path)?)?;

        match stat(&fs_path).await? {
            Some(metadata) if metadata.is_file() && !path::is_directory_marker(path) => {
                tokio::fs::remove_file(&fs_path).await?;

                match tokio::fs::remove_file(self.sidecar_path(path)?).await {
                    Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
                    _ => Ok(()),
                }
            }
            Some(metadata)
                if metadata.is_dir()
                    && (path::is_directory_marker(path) || path::is_container_path(path)) =>
            {
                if tokio::fs::read_dir(&fs_path)
                    .await?
                    .next_entry()
                    .await?
                    .is_some()
                {
                    return Err(Error::DirectoryNotEmpty(path.to_string()));
                }

                tokio::fs::remove_dir(&fs_path).await?;

                match tokio::fs::remove_dir_all(self.resolve(METADATA_DIR, path)?).await {
                    Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
                    _ => Ok(()),
                }
            }
            _ => Err(Error::NotFound(path.to_string())),
        }
    }

    #[instrument(skip(self))]
    async fn list_directories(&self) -> Result<DirectoryListing> {
        let entries = read_entries(&self.root.join(OBJECTS_DIR), "")
            .await?
            .into_iter()
            .collect::<BTreeMap<_, _>>();

        Ok(DirectoryListing {
            entries: entries.into_values().collect(),
            next_marker: None,
        })
    }

    #[instrument(skip(self))]
    async fn list_directory(
        &self,
        path: &str,
        options: &ListOptions,
    ) -> Result<DirectoryListing> {
        let root = self.object_path(non_empty(path)?)?;

        match stat(&root).await? {
            Some(metadata) if metadata.is_dir() => {}
            _ => return Err(Error::NotFound(path.to_string())),
        }

        let mut selected = BTreeMap::new();

        match &options.scope {
            ListScope::Prefix(prefix) => {
                let mut pending = vec![(root, String::new())];

                while let Some((dir, base)) = pending.pop() {
                    for (name, entry) in read_entries(&dir, &base).await? {
                        if entry.file_type == FileType::Directory {
                            let dir = self.object_path(&path::native_path(path, &name))?;

                            pending.push((dir, name.clone()));
                        }

                        if name.starts_with(prefix.as_str()) && name != *prefix {
                            selected.insert(name, entry);
                        }
                    }
                }
            }
            ListScope::UnderPath(under) => {
                let base = match under.trim_end_matches(SEPARATOR) {
                    "" => String::new(),
                    under => format!("{}/", under),
                };
                let dir = self.object_path(&path::native_path(path, &base))?;

                selected.extend(read_entries(&dir, &base).await?);
            }
        }

        debug!(
            "listed {} entries under `{}` with {:?}",
            selected.len(),
            path,
            options.scope
        );

        paginate(selected, options.marker.as_deref(), options.max_results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn staged_files(gateway: &LocalGateway) -> usize {
        let mut entries = tokio::fs::read_dir(gateway.root.join(STAGING_DIR))
            .await
            .unwrap();
        let mut count = 0;

        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }

        count
    }

    #[tokio::test]
    async fn test_write_object() {
        let root = tempfile::tempdir().unwrap();
        let gateway = LocalGateway::new(root.path()).await.unwrap();

        let target = gateway.object_path("c1/a.txt").unwrap();
        let sidecar_path = gateway.sidecar_path("c1/a.txt").unwrap();

        tokio::fs::create_dir_all(target.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::create_dir_all(sidecar_path.parent().unwrap())
            .await
            .unwrap();

        gateway
            .write_object(&target, b"A", &sidecar_path, b"{}")
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"A");
        assert_eq!(tokio::fs::read(&sidecar_path).await.unwrap(), b"{}");
        assert_eq!(staged_files(&gateway).await, 0);
    }

    #[tokio::test]
    async fn test_write_object_failure_leaves_no_sidecar() {
        let root = tempfile::tempdir().unwrap();
        let gateway = LocalGateway::new(root.path()).await.unwrap();

        // A non-empty directory sits where the payload should go.
        let target = gateway.object_path("c1/d1").unwrap();
        let sidecar_path = gateway.sidecar_path("c1/d1").unwrap();

        tokio::fs::create_dir_all(target.join("d2")).await.unwrap();
        tokio::fs::create_dir_all(sidecar_path.parent().unwrap())
            .await
            .unwrap();

        assert!(gateway
            .write_object(&target, b"A", &sidecar_path, b"{}")
            .await
            .is_err());

        assert!(stat(&sidecar_path).await.unwrap().is_none());
        assert!(target.is_dir());
        assert_eq!(staged_files(&gateway).await, 0);
    }
}

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::{
    blob_to_native,
    gateway::{self, BackendGateway},
    native_to_blob, native_to_blob_metadata, path, project_container_listing,
    project_directory_listing, to_native_get_options, to_native_list_options, Blob, BlobMetadata,
    Error, GetOptions, ListContainerOptions, PageSet, Result, StorageMetadata,
};

/// How deletions are confirmed on backends where a delete becomes visible
/// only after some time.
///
/// After a delete, existence is polled up to `max_attempts` times. The wait
/// between two polls starts at `initial_backoff` and doubles, up to
/// `max_backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteConfirmation {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for DeleteConfirmation {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// A provider-agnostic blob store on top of a backend gateway.
///
/// The store holds no state of its own: every operation is a strictly
/// sequential series of gateway calls, and can run concurrently with any
/// other.
#[derive(Debug, Clone)]
pub struct BlobStore<G> {
    gateway: G,
    delete_confirmation: DeleteConfirmation,
}

impl<G: BackendGateway> BlobStore<G> {
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            delete_confirmation: DeleteConfirmation::default(),
        }
    }

    #[must_use]
    pub fn with_delete_confirmation(mut self, delete_confirmation: DeleteConfirmation) -> Self {
        self.delete_confirmation = delete_confirmation;
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn delete_confirmation(&self) -> &DeleteConfirmation {
        &self.delete_confirmation
    }

    /// Checks whether a container exists. This is always a live check.
    #[instrument(skip(self))]
    pub async fn container_exists(&self, container: &str) -> Result<bool> {
        Ok(self.gateway.path_exists(container).await?)
    }

    /// Checks whether a directory exists, using its marker path
    /// `container/directory/`.
    #[instrument(skip(self))]
    pub async fn directory_exists(&self, container: &str, directory: &str) -> Result<bool> {
        let path = path::directory_marker_path(container, directory);

        Ok(self.gateway.path_exists(&path).await?)
    }

    /// Creates a container.
    ///
    /// The location is accepted for compatibility but ignored, as the backends
    /// have no such concept.
    #[instrument(skip(self))]
    pub async fn create_container_in_location(
        &self,
        location: Option<&str>,
        container: &str,
    ) -> Result<bool> {
        if let Some(location) = location {
            debug!("ignoring location `{}`", location);
        }

        self.gateway.create_directory(container).await?;

        info!("created container `{}`", container);

        Ok(true)
    }

    #[instrument(skip(self))]
    pub async fn create_directory(&self, container: &str, directory: &str) -> Result<()> {
        let path = path::directory_path(container, directory);

        Ok(self.gateway.create_directory(&path).await?)
    }

    #[instrument(skip(self))]
    pub async fn blob_exists(&self, container: &str, key: &str) -> Result<bool> {
        let path = blob_path(container, key)?;

        Ok(self.gateway.path_exists(&path).await?)
    }

    /// Fetches the metadata of a blob, without its payload.
    ///
    /// # Errors
    ///
    /// If the blob does not exist, `Error::NotFound` is returned.
    #[instrument(skip(self))]
    pub async fn blob_metadata(&self, container: &str, key: &str) -> Result<BlobMetadata> {
        let path = blob_path(container, key)?;

        Ok(native_to_blob_metadata(self.gateway.head_file(&path).await?))
    }

    /// Fetches a blob.
    ///
    /// # Errors
    ///
    /// If the blob does not exist, `Error::NotFound` is returned. If the
    /// requested range lies outside of the blob, `Error::RangeNotSatisfiable`
    /// is returned.
    #[instrument(skip(self))]
    pub async fn get_blob(&self, container: &str, key: &str, options: &GetOptions) -> Result<Blob> {
        let path = blob_path(container, key)?;
        let options = to_native_get_options(options);

        Ok(native_to_blob(self.gateway.read_file(&path, &options).await?))
    }

    /// Lists the containers.
    #[instrument(skip(self))]
    pub async fn list_containers(&self) -> Result<PageSet<StorageMetadata>> {
        project_container_listing(self.gateway.list_directories().await?)
    }

    /// Lists the content of a container.
    ///
    /// The container may also be given as a `container/directory` path, in
    /// which case the directory is merged with the one in `options`: a
    /// directory-scoped and a container-scoped listing share this code path.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        container: &str,
        options: &ListContainerOptions,
    ) -> Result<PageSet<StorageMetadata>> {
        let (container, options) = adjust_container_if_dir_option_present(container, options);
        let native_options = to_native_list_options(&options);

        debug!("listing `{}` with {:?}", container, native_options);

        project_directory_listing(
            self.gateway
                .list_directory(container, &native_options)
                .await?,
        )
    }

    /// Lists the content of a `container/directory` native path.
    #[instrument(skip(self))]
    pub async fn list_path(
        &self,
        path: &str,
        options: &ListContainerOptions,
    ) -> Result<PageSet<StorageMetadata>> {
        self.list(path, options).await
    }

    /// Stores a blob and returns its native path, which serves as its
    /// identifier.
    ///
    /// Any existing object at the same path is deleted first: an overwrite is
    /// a delete followed by a create, not an atomic replacement. Readers may
    /// observe `Error::NotFound` in between.
    #[instrument(skip(self, blob), fields(name = %blob.metadata.name))]
    pub async fn put_blob(&self, container: &str, blob: Blob) -> Result<String> {
        let path = blob_path(container, &blob.metadata.name)?;

        self.delete_and_ensure_path_gone(&path).await?;
        self.gateway
            .create_file(container, blob_to_native(blob))
            .await?;

        debug!("stored blob at `{}`", path);

        Ok(path)
    }

    /// Removes a blob. Removing an absent blob succeeds.
    #[instrument(skip(self))]
    pub async fn remove_blob(&self, container: &str, key: &str) -> Result<()> {
        let path = blob_path(container, key)?;

        match self.gateway.delete_path(&path).await {
            Ok(()) => Ok(()),
            Err(gateway::Error::NotFound(_)) => {
                debug!("blob `{}` was already absent", path);

                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Deletes a container and polls until the backend confirms it is gone.
    ///
    /// Returns `false` if the container still exists once the polling bound
    /// of the [`DeleteConfirmation`] policy is reached.
    #[instrument(skip(self))]
    pub async fn delete_and_verify_container_gone(&self, container: &str) -> Result<bool> {
        match self.gateway.delete_path(container).await {
            Ok(()) | Err(gateway::Error::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }

        let gone = self.poll_until_gone(container).await?;

        if gone {
            info!("deleted container `{}`", container);
        }

        Ok(gone)
    }

    /// Removes every blob and directory of a container, keeping the container.
    #[instrument(skip(self))]
    pub async fn clear_container(&self, container: &str) -> Result<()> {
        let entries = self
            .list_all(container, ListContainerOptions::new().recursive())
            .await?;

        self.remove_entries(container, entries).await
    }

    /// Removes a directory and everything under it. An absent directory is
    /// not an error.
    #[instrument(skip(self))]
    pub async fn delete_directory(&self, container: &str, directory: &str) -> Result<()> {
        let entries = self
            .list_all(
                container,
                ListContainerOptions::new()
                    .in_directory(directory)
                    .recursive(),
            )
            .await?;

        self.remove_entries(container, entries).await?;

        let path = path::directory_marker_path(container, directory);

        match self.gateway.delete_path(&path).await {
            Ok(()) | Err(gateway::Error::NotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Clears a container, then deletes it and waits for the deletion to be
    /// confirmed.
    #[instrument(skip(self))]
    pub async fn delete_container(&self, container: &str) -> Result<bool> {
        self.clear_container(container).await?;
        self.delete_and_verify_container_gone(container).await
    }

    /// Counts the blobs matching the listing options, across all pages.
    #[instrument(skip(self))]
    pub async fn count_blobs(
        &self,
        container: &str,
        options: &ListContainerOptions,
    ) -> Result<u64> {
        let entries = self.list_all(container, options.clone()).await?;

        Ok(entries.iter().filter(|entry| entry.is_blob()).count() as u64)
    }

    async fn list_all(
        &self,
        container: &str,
        mut options: ListContainerOptions,
    ) -> Result<Vec<StorageMetadata>> {
        let mut entries = vec![];

        loop {
            let (page, next_marker) = self.list(container, &options).await?.into_parts();

            entries.extend(page);

            match next_marker {
                Some(marker) => options.marker = Some(marker),
                None => return Ok(entries),
            }
        }
    }

    async fn remove_entries(&self, container: &str, entries: Vec<StorageMetadata>) -> Result<()> {
        let (blobs, directories): (Vec<_>, Vec<_>) =
            entries.into_iter().partition(StorageMetadata::is_blob);

        for blob in blobs {
            self.remove_blob(container, &blob.name).await?;
        }

        // Deepest directories come last in a listing.
        for directory in directories.iter().rev() {
            let path = path::directory_marker_path(container, &directory.name);

            match self.gateway.delete_path(&path).await {
                Ok(()) | Err(gateway::Error::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }

    async fn delete_and_ensure_path_gone(&self, path: &str) -> Result<()> {
        match self.gateway.delete_path(path).await {
            Ok(()) => debug!("deleted existing object at `{}`", path),
            Err(gateway::Error::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }

        if self.poll_until_gone(path).await? {
            Ok(())
        } else {
            Err(Error::Transient(anyhow::anyhow!(
                "path `{}` still exists after {} existence checks",
                path,
                self.delete_confirmation.max_attempts
            )))
        }
    }

    /// Polls existence until the backend reports the path absent.
    async fn poll_until_gone(&self, path: &str) -> Result<bool> {
        let policy = &self.delete_confirmation;
        let mut backoff = policy.initial_backoff;

        for attempt in 1..=policy.max_attempts.max(1) {
            match self.gateway.path_exists(path).await {
                Ok(false) | Err(gateway::Error::NotFound(_)) => return Ok(true),
                Ok(true) => {}
                Err(err) => return Err(err.into()),
            }

            if attempt < policy.max_attempts {
                debug!(
                    "`{}` still exists after attempt {}, retrying in {:?}",
                    path, attempt, backoff
                );

                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff, policy.max_backoff);
            }
        }

        warn!(
            "`{}` still exists after {} existence checks",
            path, policy.max_attempts
        );

        Ok(false)
    }
}

fn next_backoff(backoff: Duration, max_backoff: Duration) -> Duration {
    backoff.saturating_mul(2).min(max_backoff)
}

/// Builds the native path of a blob, refusing keys that would address the
/// container itself.
fn blob_path(container: &str, key: &str) -> Result<String> {
    if key.trim_matches(path::SEPARATOR).is_empty() {
        return Err(Error::InvalidOption(format!(
            "the blob key `{}` in container `{}` is empty",
            key, container
        )));
    }

    Ok(path::native_path(container, key))
}

/// Splits an in-path directory off the container and merges it into the
/// listing options.
fn adjust_container_if_dir_option_present<'a>(
    container: &'a str,
    options: &ListContainerOptions,
) -> (&'a str, ListContainerOptions) {
    let mut options = options.clone();

    if let (container, Some(prefix)) = path::parse_path(container) {
        options.directory = Some(match options.directory.take() {
            Some(directory) => path::native_path(prefix, &directory),
            None => prefix.to_string(),
        });

        return (container, options);
    }

    (path::parse_container_from_path(container), options)
}

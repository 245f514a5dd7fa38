use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use lgn_blobstore::{
    gateway::{
        DirectoryListing, GetOptions, ListOptions, NativeMetadata, NativeObject, Result,
    },
    BackendGateway, MemoryGateway,
};
use tokio::sync::Mutex;

/// A gateway call, as observed by a `RecordingGateway`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    PathExists(String),
    CreateDirectory(String),
    CreateFile { parent: String, object: NativeObject },
    ReadFile { path: String, options: GetOptions },
    HeadFile(String),
    DeletePath(String),
    ListDirectories,
    ListDirectory { path: String, options: ListOptions },
}

/// Wraps a `MemoryGateway` and records every call made to it.
///
/// It can also simulate a backend whose deletions become visible only after
/// some existence checks.
#[derive(Debug, Clone, Default)]
pub struct RecordingGateway {
    inner: MemoryGateway,
    calls: Arc<Mutex<Vec<Call>>>,
    lingering_polls: Arc<Mutex<u32>>,
    lingering: Arc<Mutex<HashMap<String, u32>>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deleted paths keep being reported as present for the next `polls`
    /// existence checks.
    pub async fn set_lingering_polls(&self, polls: u32) {
        *self.lingering_polls.lock().await = polls;
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    pub async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    pub async fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().await.iter().filter(|c| predicate(c)).count()
    }

    async fn record(&self, call: Call) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl BackendGateway for RecordingGateway {
    async fn path_exists(&self, path: &str) -> Result<bool> {
        self.record(Call::PathExists(path.to_string())).await;

        if let Some(remaining) = self.lingering.lock().await.get_mut(path) {
            if *remaining > 0 {
                *remaining -= 1;

                return Ok(true);
            }
        }

        self.inner.path_exists(path).await
    }

    async fn create_directory(&self, path: &str) -> Result<()> {
        self.record(Call::CreateDirectory(path.to_string())).await;
        self.inner.create_directory(path).await
    }

    async fn create_file(&self, parent: &str, object: NativeObject) -> Result<()> {
        self.record(Call::CreateFile {
            parent: parent.to_string(),
            object: object.clone(),
        })
        .await;
        self.inner.create_file(parent, object).await
    }

    async fn read_file(&self, path: &str, options: &GetOptions) -> Result<NativeObject> {
        self.record(Call::ReadFile {
            path: path.to_string(),
            options: options.clone(),
        })
        .await;
        self.inner.read_file(path, options).await
    }

    async fn head_file(&self, path: &str) -> Result<NativeMetadata> {
        self.record(Call::HeadFile(path.to_string())).await;
        self.inner.head_file(path).await
    }

    async fn delete_path(&self, path: &str) -> Result<()> {
        self.record(Call::DeletePath(path.to_string())).await;
        self.inner.delete_path(path).await?;

        let polls = *self.lingering_polls.lock().await;

        if polls > 0 {
            self.lingering.lock().await.insert(path.to_string(), polls);
        }

        Ok(())
    }

    async fn list_directories(&self) -> Result<DirectoryListing> {
        self.record(Call::ListDirectories).await;
        self.inner.list_directories().await
    }

    async fn list_directory(&self, path: &str, options: &ListOptions) -> Result<DirectoryListing> {
        self.record(Call::ListDirectory {
            path: path.to_string(),
            options: options.clone(),
        })
        .await;
        self.inner.list_directory(path, options).await
    }
}

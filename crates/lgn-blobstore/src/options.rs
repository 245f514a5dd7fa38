use chrono::{DateTime, Utc};

/// Generic listing options, independent of any backend.
///
/// `directory` and `recursive` jointly decide whether a listing walks the
/// whole subtree or only the level directly under the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListContainerOptions {
    pub directory: Option<String>,
    pub recursive: bool,
    pub marker: Option<String>,
    pub max_results: Option<u32>,
}

impl ListContainerOptions {
    /// Options for a one-level listing at the root of the container.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn in_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    #[must_use]
    pub fn recursive(mut self) -> Self {
        self.recursive = true;
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

/// A byte range to fetch from a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// Bytes `start..=end`.
    Range { start: u64, end: u64 },
    /// Every byte from `start` to the end of the blob.
    StartAt(u64),
    /// The last `n` bytes of the blob.
    Tail(u64),
}

/// Generic fetch options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    pub range: Option<ByteRange>,
    pub if_modified_since: Option<DateTime<Utc>>,
    pub if_unmodified_since: Option<DateTime<Utc>>,
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn range(mut self, start: u64, end: u64) -> Self {
        self.range = Some(ByteRange::Range { start, end });
        self
    }

    #[must_use]
    pub fn start_at(mut self, start: u64) -> Self {
        self.range = Some(ByteRange::StartAt(start));
        self
    }

    #[must_use]
    pub fn tail(mut self, count: u64) -> Self {
        self.range = Some(ByteRange::Tail(count));
        self
    }

    #[must_use]
    pub fn if_modified_since(mut self, since: DateTime<Utc>) -> Self {
        self.if_modified_since = Some(since);
        self
    }

    #[must_use]
    pub fn if_unmodified_since(mut self, since: DateTime<Utc>) -> Self {
        self.if_unmodified_since = Some(since);
        self
    }
}

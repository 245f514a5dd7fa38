use chrono::{DateTime, Utc};

/// The kind of entry returned by a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    Container,
    Directory,
    Blob,
}

/// A single listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageMetadata {
    pub name: String,
    pub storage_type: StorageType,
    pub size: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl StorageMetadata {
    pub fn is_blob(&self) -> bool {
        self.storage_type == StorageType::Blob
    }

    pub fn is_directory(&self) -> bool {
        self.storage_type == StorageType::Directory
    }
}

/// One page of an ordered listing.
///
/// When `next_marker` is set, passing it back unmodified as the listing
/// marker yields the following page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSet<T> {
    items: Vec<T>,
    next_marker: Option<String>,
}

impl<T> PageSet<T> {
    pub fn new(items: Vec<T>, next_marker: Option<String>) -> Self {
        Self { items, next_marker }
    }

    pub fn next_marker(&self) -> Option<&str> {
        self.next_marker.as_deref()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_parts(self) -> (Vec<T>, Option<String>) {
        (self.items, self.next_marker)
    }
}

impl<T> IntoIterator for PageSet<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a PageSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

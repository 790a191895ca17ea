//! Per-volume directory cache.
//!
//! Readers (listing, lookup, existence, stat) take the read lock and may
//! run on any thread. Subtree replacement and invalidation take the write
//! lock and only happen on the service worker, so the lock mainly keeps
//! foreground readers from observing a half-replaced directory.

use parking_lot::RwLock;

use super::entry::{DirectoryEntry, FileDescriptor, FileInfo, FileIterator, ListItem, ListMode};
use super::tree::DirectoryTree;
use crate::remote::RemoteEntry;
use crate::url::{UrlKind, WebfsUrl};

/// Cached directory tree of one volume.
#[derive(Debug, Default)]
pub struct FileSystem {
    tree: RwLock<DirectoryTree>,
}

impl FileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Replace the children of the folder at `url` and mark it cached.
    pub fn add_to_directory(&self, url: &WebfsUrl, entries: &[RemoteEntry]) {
        let folder = url.with_kind(UrlKind::Folder);
        let children = entries.iter().map(DirectoryEntry::from_remote).collect();

        let mut tree = self.tree.write();
        let id = tree.create_entry(&folder);
        if let Some(entry) = tree.get_mut(id) {
            entry.directory = true;
        }
        tree.replace_children(id, children);
        tracing::debug!(url = %folder, count = entries.len(), "Cached directory");
    }

    /// Clear a directory's children and mark it not cached.
    ///
    /// The node itself stays. Returns false if there is no entry at `url`.
    pub fn discard_directory(&self, url: &WebfsUrl) -> bool {
        let folder = url.with_kind(UrlKind::Folder);
        let mut tree = self.tree.write();
        let Some(id) = tree.find_entry(&folder) else {
            return false;
        };
        tree.clear_children(id);
        tree.set_cached(id, false);
        tracing::debug!(url = %folder, "Discarded directory");
        true
    }

    /// Discard every cached directory.
    pub fn discard_all(&self) {
        let mut tree = self.tree.write();
        let root = tree.root();
        tree.clear_children(root);
        tree.set_cached(root, false);
    }

    /// Find or create the entry for `url`, creating missing segments.
    pub fn create_entry(&self, url: &WebfsUrl) {
        self.tree.write().create_entry(url);
    }

    /// Attach remote metadata to the entry for `url`, creating segments as needed.
    ///
    /// Used for search hits, whose parents are usually not cached. An
    /// existing entry of the other kind is left as it is.
    pub fn insert_entry(&self, url: &WebfsUrl, remote: &RemoteEntry) {
        let mut tree = self.tree.write();
        let id = tree.create_entry(url);
        if let Some(entry) = tree.get_mut(id) {
            if entry.directory != url.is_folder() {
                tracing::debug!(url = %url, "Keeping cached entry of other kind");
                return;
            }
            entry.assign(remote);
            entry.name = url.name().to_string();
            entry.directory = url.is_folder();
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Snapshot of the entry at `url`.
    pub fn find_entry(&self, url: &WebfsUrl) -> Option<DirectoryEntry> {
        let tree = self.tree.read();
        tree.find_entry(url).and_then(|id| tree.get(id)).cloned()
    }

    /// Whether the folder at `url` has been fetched and not discarded.
    pub fn is_cached(&self, url: &WebfsUrl) -> bool {
        self.find_entry(&url.with_kind(UrlKind::Folder))
            .is_some_and(|e| e.cached)
    }

    /// A file exists if it has an entry; a folder exists once it is cached.
    pub fn file_exists(&self, url: &WebfsUrl) -> bool {
        match self.find_entry(url) {
            Some(entry) if entry.directory => entry.cached,
            Some(_) => true,
            None => false,
        }
    }

    pub fn file_info(&self, url: &WebfsUrl) -> Option<FileInfo> {
        self.find_entry(url).map(|e| FileInfo::from(&e))
    }

    pub fn open_file_item(&self, url: &WebfsUrl) -> Option<FileDescriptor> {
        self.find_entry(url).map(|e| FileDescriptor::from(&e))
    }

    /// List the cached children of a folder.
    ///
    /// Returns `None` when the folder is unknown or not cached, so callers
    /// can tell "empty" from "not fetched yet".
    pub fn new_iterator(&self, url: &WebfsUrl, mode: ListMode) -> Option<FileIterator> {
        let folder = url.with_kind(UrlKind::Folder);
        let tree = self.tree.read();
        let id = tree.find_entry(&folder)?;
        let children = tree.cached_children(id)?;

        let items = children
            .into_iter()
            .filter_map(|child| tree.get(child))
            .filter(|entry| mode.accepts(entry))
            .map(|entry| {
                let kind = if entry.directory {
                    UrlKind::Folder
                } else {
                    UrlKind::File
                };
                ListItem {
                    url: folder.descend(&entry.name, kind),
                    name: entry.name.clone(),
                    display_name: entry.display_name().to_string(),
                    directory: entry.directory,
                    size: entry.content_length,
                    modified: entry.modified,
                }
            })
            .collect();
        Some(FileIterator::new(items))
    }
}

//! Cached metadata types.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::constants::HIDDEN_FILE_PREFIX;
use crate::remote::{BackendObject, RemoteEntry};
use crate::url::WebfsUrl;

/// Cached metadata for one remote path segment.
///
/// `cached` is only meaningful for directories: it means the children held
/// by the tree reflect a successful fetch. Tree links live in the arena, not
/// here, so this type doubles as the snapshot handed out to readers.
#[derive(Clone, Debug, Default)]
pub struct DirectoryEntry {
    pub name: String,
    pub created: Option<SystemTime>,
    pub modified: Option<SystemTime>,
    pub content_type: String,
    pub content_length: u64,
    pub directory: bool,
    pub flags: u32,
    pub display_name: Option<String>,
    pub object: Option<BackendObject>,
    pub cached: bool,
}

impl DirectoryEntry {
    pub fn new(name: impl Into<String>, directory: bool) -> Self {
        Self {
            name: name.into(),
            directory,
            ..Default::default()
        }
    }

    pub fn from_remote(remote: &RemoteEntry) -> Self {
        let mut entry = Self::new(remote.name.clone(), remote.directory);
        entry.assign(remote);
        entry
    }

    /// Copy remote metadata onto this entry. Name and cached state are kept.
    pub fn assign(&mut self, remote: &RemoteEntry) {
        self.created = remote.created;
        self.modified = remote.modified;
        self.content_type = remote.content_type.clone();
        self.content_length = remote.content_length;
        self.directory = remote.directory;
        self.flags = remote.flags;
        self.display_name = remote.display_name.clone();
        self.object = remote.object.clone();
    }

    pub fn is_hidden(&self) -> bool {
        self.name.starts_with(HIDDEN_FILE_PREFIX)
    }

    /// Name to show to users.
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// Stat-like view of an entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub flags: u32,
    pub size: u64,
    pub directory: bool,
    pub created: Option<SystemTime>,
    pub modified: Option<SystemTime>,
    /// Remote backends report no access time; this mirrors `modified`.
    pub accessed: Option<SystemTime>,
}

impl From<&DirectoryEntry> for FileInfo {
    fn from(entry: &DirectoryEntry) -> Self {
        Self {
            flags: entry.flags,
            size: entry.content_length,
            directory: entry.directory,
            created: entry.created,
            modified: entry.modified,
            accessed: entry.modified,
        }
    }
}

/// Item descriptor handed to UI and transfer code.
#[derive(Clone, Debug)]
pub struct FileDescriptor {
    pub name: String,
    pub content_length: u64,
    pub modified: Option<SystemTime>,
    pub content_type: String,
    /// Backend object attached by the remote client, if any.
    pub object: Option<BackendObject>,
}

impl From<&DirectoryEntry> for FileDescriptor {
    fn from(entry: &DirectoryEntry) -> Self {
        Self {
            name: entry.display_name().to_string(),
            content_length: entry.content_length,
            modified: entry.modified,
            content_type: entry.content_type.clone(),
            object: entry.object.clone(),
        }
    }
}

/// Which children a listing returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMode {
    pub files: bool,
    pub folders: bool,
    pub ignore_hidden: bool,
}

impl ListMode {
    pub const ALL: Self = Self {
        files: true,
        folders: true,
        ignore_hidden: false,
    };

    pub const FILES: Self = Self {
        files: true,
        folders: false,
        ignore_hidden: false,
    };

    pub const FOLDERS: Self = Self {
        files: false,
        folders: true,
        ignore_hidden: false,
    };

    pub fn ignoring_hidden(self) -> Self {
        Self {
            ignore_hidden: true,
            ..self
        }
    }

    pub fn accepts(&self, entry: &DirectoryEntry) -> bool {
        let kind_ok = if entry.directory {
            self.folders
        } else {
            self.files
        };
        kind_ok && !(self.ignore_hidden && entry.is_hidden())
    }
}

impl Default for ListMode {
    fn default() -> Self {
        Self::ALL
    }
}

/// One item of a directory listing.
#[derive(Clone, Debug)]
pub struct ListItem {
    pub url: WebfsUrl,
    pub name: String,
    pub display_name: String,
    pub directory: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Snapshot of a cached directory's children, taken under the read lock.
#[derive(Debug)]
pub struct FileIterator {
    items: std::vec::IntoIter<ListItem>,
}

impl FileIterator {
    pub(crate) fn new(items: Vec<ListItem>) -> Self {
        Self {
            items: items.into_iter(),
        }
    }
}

impl Iterator for FileIterator {
    type Item = ListItem;

    fn next(&mut self) -> Option<ListItem> {
        self.items.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl ExactSizeIterator for FileIterator {}

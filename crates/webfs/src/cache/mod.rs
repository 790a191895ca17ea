//! Directory metadata cache.
//!
//! Each volume owns one [`FileSystem`]: a [`DirectoryTree`] of
//! [`DirectoryEntry`] nodes behind a read/write lock. A directory's
//! children are only visible while its `cached` flag is set.

mod entry;
mod filesystem;
mod tree;

pub use entry::{DirectoryEntry, FileDescriptor, FileInfo, FileIterator, ListItem, ListMode};
pub use filesystem::FileSystem;
pub use tree::{DirectoryTree, NodeId};

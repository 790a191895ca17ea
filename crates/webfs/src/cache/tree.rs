//! Arena-backed directory tree.
//!
//! Nodes live in a `Vec` and refer to each other by [`NodeId`]. Removing a
//! subtree frees its slots for reuse, so ids are only meaningful while the
//! owning lock is held.

use indexmap::IndexMap;

use super::entry::DirectoryEntry;
use crate::url::{UrlKind, WebfsUrl};

/// Index of a node in a [`DirectoryTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
struct Node {
    entry: DirectoryEntry,
    parent: Option<NodeId>,
    /// Keyed by segment name, in insertion (listing) order.
    children: IndexMap<String, NodeId>,
}

/// Cached directory tree of one volume.
#[derive(Debug)]
pub struct DirectoryTree {
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
}

impl Default for DirectoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryTree {
    const ROOT: NodeId = NodeId(0);

    /// Create a tree holding only the root directory.
    pub fn new() -> Self {
        let root = Node {
            entry: DirectoryEntry::new("", true),
            parent: None,
            children: IndexMap::new(),
        };
        Self {
            nodes: vec![Some(root)],
            free: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        Self::ROOT
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn get(&self, id: NodeId) -> Option<&DirectoryEntry> {
        self.node(id).map(|n| &n.entry)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut DirectoryEntry> {
        self.node_mut(id).map(|n| &mut n.entry)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.node(parent).and_then(|n| n.children.get(name).copied())
    }

    /// Children as stored, regardless of the cached flag.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node(id)
            .into_iter()
            .flat_map(|n| n.children.values().copied())
    }

    /// Children a reader may trust: none unless the directory is cached.
    pub fn cached_children(&self, id: NodeId) -> Option<Vec<NodeId>> {
        let node = self.node(id)?;
        if !node.entry.directory || !node.entry.cached {
            return None;
        }
        Some(node.children.values().copied().collect())
    }

    /// Walk segment by segment from the root.
    pub fn lookup<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Option<NodeId> {
        segments
            .into_iter()
            .try_fold(Self::ROOT, |id, segment| self.child(id, segment))
    }

    /// Look up the entry a URL addresses.
    ///
    /// The empty path is the root. A node whose directory flag disagrees with
    /// the URL's declared kind is not returned.
    pub fn find_entry(&self, url: &WebfsUrl) -> Option<NodeId> {
        if url.path().is_empty() {
            return Some(Self::ROOT);
        }
        let id = self.lookup(url.segments())?;
        let entry = self.get(id)?;
        if entry.directory != url.is_folder() {
            tracing::warn!(url = %url, directory = entry.directory, "Cached entry kind differs from url");
            return None;
        }
        Some(id)
    }

    /// Find or create every segment of `url`.
    ///
    /// Intermediate segments are folders; the last one takes the URL's kind.
    /// Existing nodes are reused, never replaced.
    pub fn create_entry(&mut self, url: &WebfsUrl) -> NodeId {
        if let Some(id) = self.find_entry(url) {
            return id;
        }

        let segments: Vec<&str> = url.segments().collect();
        let mut current = Self::ROOT;
        for (index, segment) in segments.iter().enumerate() {
            let last = index + 1 == segments.len();
            current = match self.child(current, segment) {
                Some(existing) => existing,
                None => {
                    let directory = !last || url.kind() == UrlKind::Folder;
                    self.insert_child(current, DirectoryEntry::new(*segment, directory))
                }
            };
        }
        current
    }

    /// Insert `entry` under `parent`, replacing any child with the same name.
    pub fn insert_child(&mut self, parent: NodeId, entry: DirectoryEntry) -> NodeId {
        let name = entry.name.clone();
        if let Some(old) = self.child(parent, &name) {
            self.remove(old);
        }

        let node = Node {
            entry,
            parent: Some(parent),
            children: IndexMap::new(),
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.insert(name, id);
        }
        id
    }

    /// Remove a node and its subtree. The root cannot be removed.
    pub fn remove(&mut self, id: NodeId) {
        if id == Self::ROOT {
            self.clear_children(id);
            return;
        }
        if let Some(parent) = self.parent(id) {
            let name = self.get(id).map(|e| e.name.clone());
            if let (Some(p), Some(name)) = (self.node_mut(parent), name) {
                p.children.shift_remove(&name);
            }
        }
        self.free_subtree(id);
    }

    /// Drop every child of `id`, keeping the node itself.
    pub fn clear_children(&mut self, id: NodeId) {
        let children: Vec<NodeId> = match self.node_mut(id) {
            Some(node) => node.children.drain(..).map(|(_, c)| c).collect(),
            None => return,
        };
        for child in children {
            self.free_subtree(child);
        }
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(current.0).and_then(Option::take) {
                stack.extend(node.children.into_values());
                self.free.push(current);
            }
        }
    }

    /// Replace the children of a directory wholesale and mark it cached.
    pub fn replace_children(&mut self, id: NodeId, entries: Vec<DirectoryEntry>) {
        self.clear_children(id);
        for entry in entries {
            self.insert_child(id, entry);
        }
        self.set_cached(id, true);
    }

    pub fn set_cached(&mut self, id: NodeId, cached: bool) {
        if let Some(entry) = self.get_mut(id) {
            entry.cached = cached;
        }
    }
}

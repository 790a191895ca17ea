//! In-memory remote backend.
//!
//! Used for testing and for local-only volumes. A [`MemoryServer`] holds the
//! namespace; every [`MemoryRemote`] created from it is an independent
//! connection to the same data, so sessions opened next to a volume's own
//! client observe each other's changes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{
    ClientFactory, Credentials, RemoteClient, RemoteEntry, SearchClient, SearchHit, ServerInfo,
};
use crate::error::{WebFsError, WebFsResult};
use crate::search::SearchQuery;

#[derive(Debug, Clone)]
struct Node {
    directory: bool,
    content_length: u64,
    content_type: String,
    created: SystemTime,
    modified: SystemTime,
}

impl Node {
    fn directory() -> Self {
        let now = SystemTime::now();
        Self {
            directory: true,
            content_length: 0,
            content_type: String::new(),
            created: now,
            modified: now,
        }
    }

    fn file(content_length: u64, content_type: &str) -> Self {
        Self {
            directory: false,
            content_length,
            content_type: content_type.to_string(),
            ..Self::directory()
        }
    }

    fn to_entry(&self, name: &str) -> RemoteEntry {
        RemoteEntry {
            name: name.to_string(),
            created: Some(self.created),
            modified: Some(self.modified),
            content_type: self.content_type.clone(),
            content_length: self.content_length,
            directory: self.directory,
            ..Default::default()
        }
    }
}

#[derive(Debug)]
struct ServerState {
    /// Keyed by normalized path; the root is the empty string.
    nodes: RwLock<BTreeMap<String, Node>>,
    info: RwLock<ServerInfo>,
    handshakes: AtomicUsize,
    listings: AtomicUsize,
    reachable: AtomicBool,
    search: AtomicBool,
}

/// Shared in-memory namespace. Cloning yields another handle to the same data.
#[derive(Debug, Clone)]
pub struct MemoryServer {
    state: Arc<ServerState>,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryServer {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(String::new(), Node::directory());
        Self {
            state: Arc::new(ServerState {
                nodes: RwLock::new(nodes),
                info: RwLock::new(ServerInfo::default()),
                handshakes: AtomicUsize::new(0),
                listings: AtomicUsize::new(0),
                reachable: AtomicBool::new(true),
                search: AtomicBool::new(false),
            }),
        }
    }

    /// Normalize a native path: drop leading/trailing `/` and empty segments.
    fn normalize(path: &str) -> String {
        path.split('/')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn parent(path: &str) -> &str {
        path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
    }

    fn name(path: &str) -> &str {
        path.rsplit('/').next().unwrap_or("")
    }

    fn is_under(path: &str, root: &str) -> bool {
        root.is_empty()
            || path == root
            || path.strip_prefix(root).is_some_and(|rest| rest.starts_with('/'))
    }

    /// Ensure all parent directories of `path` exist.
    fn ensure_parents(nodes: &mut BTreeMap<String, Node>, path: &str) {
        let mut current = String::new();
        for segment in Self::parent(path).split('/').filter(|s| !s.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);
            nodes.entry(current.clone()).or_insert_with(Node::directory);
        }
    }

    /// Create a directory and any missing parents.
    pub fn add_directory(&self, path: &str) -> &Self {
        let path = Self::normalize(path);
        let mut nodes = self.state.nodes.write();
        Self::ensure_parents(&mut nodes, &path);
        nodes.entry(path).or_insert_with(Node::directory);
        self
    }

    /// Create or replace a file, creating missing parents.
    pub fn add_file(&self, path: &str, content_length: u64) -> &Self {
        let path = Self::normalize(path);
        let mut nodes = self.state.nodes.write();
        Self::ensure_parents(&mut nodes, &path);
        nodes.insert(path, Node::file(content_length, "application/octet-stream"));
        self
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state.nodes.read().contains_key(&Self::normalize(path))
    }

    pub fn set_info(&self, info: ServerInfo) {
        *self.state.info.write() = info;
    }

    /// Make subsequent connects fail (or succeed again).
    pub fn set_reachable(&self, reachable: bool) {
        self.state.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Offer server-side search to clients.
    pub fn enable_search(&self, enabled: bool) {
        self.state.search.store(enabled, Ordering::SeqCst);
    }

    /// Number of successful connection handshakes across all clients.
    pub fn handshakes(&self) -> usize {
        self.state.handshakes.load(Ordering::SeqCst)
    }

    /// Number of directory listings served across all clients.
    pub fn listings(&self) -> usize {
        self.state.listings.load(Ordering::SeqCst)
    }

    /// A new, unconnected client.
    pub fn client(&self) -> Arc<MemoryRemote> {
        Arc::new(MemoryRemote {
            server: self.clone(),
            connected: AtomicBool::new(false),
        })
    }

    /// Factory for a [`ClientRegistry`](super::ClientRegistry).
    pub fn factory(&self) -> MemoryClientFactory {
        MemoryClientFactory {
            server: self.clone(),
        }
    }
}

/// Creates [`MemoryRemote`] clients that ignore location and credentials.
#[derive(Debug, Clone)]
pub struct MemoryClientFactory {
    server: MemoryServer,
}

impl ClientFactory for MemoryClientFactory {
    fn create(
        &self,
        _location: &Url,
        _credentials: Option<&Credentials>,
    ) -> WebFsResult<Arc<dyn RemoteClient>> {
        Ok(self.server.client())
    }
}

/// One connection to a [`MemoryServer`].
#[derive(Debug)]
pub struct MemoryRemote {
    server: MemoryServer,
    connected: AtomicBool,
}

impl MemoryRemote {
    fn state(&self) -> &ServerState {
        &self.server.state
    }

    fn require_connection(&self) -> WebFsResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(WebFsError::connect_failed("not connected"))
        }
    }
}

#[async_trait]
impl RemoteClient for MemoryRemote {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self, host: &str) -> WebFsResult<()> {
        if !self.state().reachable.load(Ordering::SeqCst) {
            return Err(WebFsError::connect_failed(host));
        }
        self.state().handshakes.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> WebFsResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn server_info(&self, _path: &str) -> WebFsResult<ServerInfo> {
        self.require_connection()?;
        Ok(*self.state().info.read())
    }

    async fn open_directory(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> WebFsResult<Option<Vec<RemoteEntry>>> {
        self.require_connection()?;
        if cancel.is_cancelled() {
            return Err(WebFsError::Cancelled);
        }

        let dir = MemoryServer::normalize(path);
        let nodes = self.state().nodes.read();
        match nodes.get(&dir) {
            Some(node) if node.directory => {}
            Some(_) => return Err(WebFsError::remote(format!("not a directory: {path}"))),
            None => return Err(WebFsError::remote(format!("not found: {path}"))),
        }

        self.state().listings.fetch_add(1, Ordering::SeqCst);
        let entries = nodes
            .iter()
            .filter(|(p, _)| !p.is_empty() && **p != dir && MemoryServer::parent(p) == dir)
            .map(|(p, node)| node.to_entry(MemoryServer::name(p)))
            .collect();
        Ok(Some(entries))
    }

    async fn make_directory(&self, path: &str) -> WebFsResult<()> {
        self.require_connection()?;
        let path = MemoryServer::normalize(path);
        let mut nodes = self.state().nodes.write();
        if nodes.contains_key(&path) {
            return Err(WebFsError::remote(format!("already exists: {path}")));
        }
        match nodes.get(MemoryServer::parent(&path)) {
            Some(parent) if parent.directory => {}
            _ => return Err(WebFsError::remote(format!("no parent directory: {path}"))),
        }
        nodes.insert(path, Node::directory());
        Ok(())
    }

    async fn delete_resource(&self, path: &str) -> WebFsResult<()> {
        self.require_connection()?;
        let path = MemoryServer::normalize(path);
        if path.is_empty() {
            return Err(WebFsError::remote("cannot delete the server root"));
        }
        let mut nodes = self.state().nodes.write();
        if !nodes.contains_key(&path) {
            return Err(WebFsError::remote(format!("not found: {path}")));
        }
        nodes.retain(|p, _| !MemoryServer::is_under(p, &path));
        Ok(())
    }

    async fn move_resource(&self, source: &str, destination: &str) -> WebFsResult<()> {
        self.require_connection()?;
        let source = MemoryServer::normalize(source);
        let destination = MemoryServer::normalize(destination);
        if source.is_empty() || MemoryServer::is_under(&destination, &source) {
            return Err(WebFsError::remote(format!(
                "cannot move {source} to {destination}"
            )));
        }

        let mut nodes = self.state().nodes.write();
        if !nodes.contains_key(&source) {
            return Err(WebFsError::remote(format!("not found: {source}")));
        }
        if nodes.contains_key(&destination) {
            return Err(WebFsError::remote(format!("already exists: {destination}")));
        }

        let moved: Vec<(String, Node)> = nodes
            .iter()
            .filter(|(p, _)| MemoryServer::is_under(p, &source))
            .map(|(p, n)| (format!("{destination}{}", &p[source.len()..]), n.clone()))
            .collect();
        nodes.retain(|p, _| !MemoryServer::is_under(p, &source));
        MemoryServer::ensure_parents(&mut nodes, &destination);
        for (path, node) in moved {
            nodes.insert(path, node);
        }
        Ok(())
    }

    fn search_client(&self) -> Option<&dyn SearchClient> {
        if self.state().search.load(Ordering::SeqCst) {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl SearchClient for MemoryRemote {
    async fn find(
        &self,
        root: &str,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> WebFsResult<Vec<SearchHit>> {
        self.require_connection()?;
        let root = MemoryServer::normalize(root);
        let nodes = self.state().nodes.read();

        let mut hits = Vec::new();
        for (path, node) in nodes.iter() {
            if cancel.is_cancelled() {
                return Err(WebFsError::Cancelled);
            }
            if path == &root || !MemoryServer::is_under(path, &root) {
                continue;
            }
            let name = MemoryServer::name(path);
            if query.matches(name) {
                let mut native = format!("/{path}");
                if node.directory {
                    native.push('/');
                }
                hits.push(SearchHit {
                    path: native,
                    entry: node.to_entry(name),
                });
            }
        }
        Ok(hits)
    }
}

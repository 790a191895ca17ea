//! A mounted remote location.
//!
//! A [`Volume`] pairs an identity (name, label, location, credentials) with a
//! lazily connected [`RemoteClient`] and the volume's [`FileSystem`] cache.
//! It also owns the translation between virtual URLs and the backend's
//! native paths:
//!
//! ```text
//!   location   https://host/dav/files
//!   virtual    webfs://share/docs/a.txt
//!   native     /dav/files/docs/a.txt
//!   full       https://host/dav/files/docs/a.txt
//! ```

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cache::FileSystem;
use crate::error::{WebFsError, WebFsResult};
use crate::remote::{Credentials, RemoteClient, SearchHit, ServerInfo, credentials_match};
use crate::url::{UrlKind, WebfsUrl};

/// Opaque per-volume object supplied by the code that mounted it.
pub type ServerHandler = Arc<dyn Any + Send + Sync>;

/// Capacity statistics, refreshed on connect and by volume update tasks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeStats {
    pub bytes_total: u64,
    pub bytes_free: u64,
    pub flags: u32,
}

impl From<ServerInfo> for VolumeStats {
    fn from(info: ServerInfo) -> Self {
        Self {
            bytes_total: info.bytes_total,
            bytes_free: info.bytes_free,
            flags: info.flags,
        }
    }
}

/// One mounted remote location.
pub struct Volume {
    name: String,
    label: String,
    kind: String,
    location: Option<Url>,
    /// Decoded location path without surrounding `/`.
    mount_path: String,
    credentials: Option<Credentials>,
    hidden: bool,
    client: Option<Arc<dyn RemoteClient>>,
    server_handler: Option<ServerHandler>,
    stats: Mutex<VolumeStats>,
    connect_lock: tokio::sync::Mutex<()>,
    fs: FileSystem,
}

impl std::fmt::Debug for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("location", &self.location.as_ref().map(Url::as_str))
            .field("hidden", &self.hidden)
            .field("connectable", &self.can_connect())
            .finish_non_exhaustive()
    }
}

impl Volume {
    /// Create a volume. Without a client it is local-only: every folder
    /// lists as cached and empty until something is inserted.
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        location: Option<Url>,
        credentials: Option<Credentials>,
        client: Option<Arc<dyn RemoteClient>>,
    ) -> Self {
        let mount_path = location
            .as_ref()
            .map(|l| decode_path(l.path()).trim_matches('/').to_string())
            .unwrap_or_default();
        Self {
            name: name.into(),
            label: label.into(),
            kind: String::new(),
            location,
            mount_path,
            credentials,
            hidden: false,
            client,
            server_handler: None,
            stats: Mutex::new(VolumeStats::default()),
            connect_lock: tokio::sync::Mutex::new(()),
            fs: FileSystem::new(),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn with_server_handler(mut self, handler: Option<ServerHandler>) -> Self {
        self.server_handler = handler;
        self
    }

    /// Assign the final identity before the volume is shared.
    pub(crate) fn rename(&mut self, name: String, label: String) {
        self.name = name;
        self.label = label;
    }

    // ── Identity ─────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Volume sub type, e.g. `webdav`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn location(&self) -> Option<&Url> {
        self.location.as_ref()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn server_handler(&self) -> Option<&ServerHandler> {
        self.server_handler.as_ref()
    }

    pub fn file_system(&self) -> &FileSystem {
        &self.fs
    }

    pub fn stats(&self) -> VolumeStats {
        *self.stats.lock()
    }

    pub fn set_stats(&self, stats: VolumeStats) {
        *self.stats.lock() = stats;
    }

    /// Whether this volume and `location`/`credentials` name the same account.
    ///
    /// `exact` compares whole URLs; otherwise scheme and host are enough.
    pub fn is_equal(&self, location: &Url, credentials: Option<&Credentials>, exact: bool) -> bool {
        let Some(mine) = &self.location else {
            return false;
        };
        let same_location = if exact {
            mine == location
        } else {
            mine.scheme() == location.scheme() && mine.host_str() == location.host_str()
        };
        same_location && credentials_match(self.credentials.as_ref(), credentials)
    }

    // ── Connection ───────────────────────────────────────────────────────

    /// Whether the volume has a remote client at all.
    pub fn can_connect(&self) -> bool {
        self.client.is_some()
    }

    pub fn client(&self) -> Option<&Arc<dyn RemoteClient>> {
        self.client.as_ref()
    }

    fn host(&self) -> &str {
        self.location
            .as_ref()
            .and_then(Url::host_str)
            .unwrap_or_default()
    }

    /// Connect if needed and return the client.
    ///
    /// Already connected clients are returned as is, without another
    /// handshake. A fresh connection refreshes the capacity statistics.
    /// Returns `None` when there is no client or connecting failed.
    pub async fn connect(&self) -> Option<Arc<dyn RemoteClient>> {
        let client = self.client.as_ref()?;
        let _guard = self.connect_lock.lock().await;

        if !client.is_connected() {
            if let Err(err) = client.connect(self.host()).await {
                tracing::warn!(volume = %self.name, error = %err, "Connect failed");
                return None;
            }
            tracing::debug!(volume = %self.name, host = %self.host(), "Connected");

            let root = self.remote_path(&self.root_url());
            match client.server_info(&root).await {
                Ok(info) => self.set_stats(info.into()),
                Err(err) => {
                    tracing::debug!(volume = %self.name, error = %err, "No server info")
                }
            }
        }
        Some(Arc::clone(client))
    }

    pub async fn disconnect(&self) {
        let Some(client) = &self.client else {
            return;
        };
        if client.is_connected() {
            if let Err(err) = client.disconnect().await {
                tracing::warn!(volume = %self.name, error = %err, "Disconnect failed");
            }
        }
    }

    // ── Path translation ─────────────────────────────────────────────────

    pub fn root_url(&self) -> WebfsUrl {
        WebfsUrl::volume_root(self.name.clone())
    }

    /// Native path of a virtual URL: mount path plus relative path,
    /// with a trailing `/` for folders.
    pub fn remote_path(&self, url: &WebfsUrl) -> String {
        let mut path = String::from("/");
        if !self.mount_path.is_empty() {
            path.push_str(&self.mount_path);
            path.push('/');
        }
        path.push_str(url.path());
        if url.is_folder() && !path.ends_with('/') {
            path.push('/');
        }
        path
    }

    /// Virtual URL of a native path. A trailing `/` or `kind` of folder makes a folder URL.
    pub fn webfs_url(&self, remote_path: &str, kind: Option<UrlKind>) -> WebfsUrl {
        let folder = kind == Some(UrlKind::Folder) || remote_path.ends_with('/');
        let trimmed = remote_path.trim_matches('/');

        let relative = if self.mount_path.is_empty() {
            trimmed
        } else if trimmed == self.mount_path {
            ""
        } else {
            match trimmed.strip_prefix(&self.mount_path) {
                Some(rest) if rest.starts_with('/') => rest,
                _ => trimmed,
            }
        };

        let kind = if folder || relative.is_empty() {
            UrlKind::Folder
        } else {
            UrlKind::File
        };
        WebfsUrl::new(self.name.clone(), relative, kind)
    }

    /// Virtual URL of a full server URL on this volume.
    pub fn webfs_url_from_server(&self, server_url: &Url) -> WebfsUrl {
        self.webfs_url(&decode_path(server_url.path()), None)
    }

    /// Server URL of a virtual URL, or `None` for a volume without location.
    ///
    /// Each segment is percent-encoded, so [`webfs_url_from_server`](Self::webfs_url_from_server)
    /// gives back `url` for any name.
    pub fn full_url(&self, url: &WebfsUrl) -> Option<Url> {
        let mut full = self.location.clone()?;
        full.set_path(&encode_path(&self.remote_path(url)));
        Some(full)
    }

    /// `label/path`, for titles and messages.
    pub fn display_string(&self, url: &WebfsUrl) -> String {
        format!("{}/{}", self.label, url.path())
    }

    // ── Cache maintenance ────────────────────────────────────────────────

    /// Fetch a folder from the server and replace its cached children.
    ///
    /// Without a client the folder is marked cached with no children.
    /// A listing call that yields nothing is reported as [`WebFsError::NoListing`]
    /// so the request pipeline can try again.
    #[tracing::instrument(skip(self, url, cancel), fields(volume = %self.name, url = %url))]
    pub async fn update_directory(
        &self,
        url: &WebfsUrl,
        cancel: &CancellationToken,
    ) -> WebFsResult<()> {
        if !self.can_connect() {
            self.fs.add_to_directory(url, &[]);
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(WebFsError::Cancelled);
        }

        let client = self
            .connect()
            .await
            .ok_or_else(|| WebFsError::connect_failed(self.host()))?;
        let path = self.remote_path(&url.with_kind(UrlKind::Folder));
        let entries = client
            .open_directory(&path, cancel)
            .await?
            .ok_or_else(|| WebFsError::no_listing(path.clone()))?;

        if cancel.is_cancelled() {
            return Err(WebFsError::Cancelled);
        }
        self.fs.add_to_directory(url, &entries);
        Ok(())
    }

    /// Clear a cached folder. Returns false if the folder has no entry.
    pub fn discard_directory(&self, url: &WebfsUrl) -> bool {
        self.fs.discard_directory(url)
    }

    /// Make a search hit addressable in the cache and return its virtual URL.
    pub fn insert_search_result(&self, hit: &SearchHit) -> WebfsUrl {
        let kind = hit.entry.directory.then_some(UrlKind::Folder);
        let url = self.webfs_url(&hit.path, kind);
        self.fs.insert_entry(&url, &hit.entry);
        url
    }
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}

fn decode_path(path: &str) -> String {
    urlencoding::decode(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ListMode;
    use crate::remote::{MemoryServer, RemoteEntry};

    fn volume(location: &str) -> Volume {
        Volume::new("share", "Share", Some(Url::parse(location).unwrap()), None, None)
    }

    fn url(s: &str) -> WebfsUrl {
        WebfsUrl::parse(s).unwrap()
    }

    #[test]
    fn test_remote_path() {
        let v = volume("https://host/dav/files/");
        assert_eq!(v.remote_path(&url("webfs://share/")), "/dav/files/");
        assert_eq!(v.remote_path(&url("webfs://share/a/b.txt")), "/dav/files/a/b.txt");
        assert_eq!(v.remote_path(&url("webfs://share/a/")), "/dav/files/a/");

        let bare = volume("https://host");
        assert_eq!(bare.remote_path(&url("webfs://share/")), "/");
        assert_eq!(bare.remote_path(&url("webfs://share/a")), "/a");
    }

    #[test]
    fn test_webfs_url() {
        let v = volume("https://host/dav/files");
        assert_eq!(v.webfs_url("/dav/files/a/b.txt", None), url("webfs://share/a/b.txt"));
        assert_eq!(v.webfs_url("/dav/files/a/", None), url("webfs://share/a/"));
        assert_eq!(
            v.webfs_url("/dav/files/a", Some(UrlKind::Folder)),
            url("webfs://share/a/")
        );
        assert_eq!(v.webfs_url("/dav/files", None), url("webfs://share/"));
        // Prefix only strips on a segment boundary.
        assert_eq!(v.webfs_url("/dav/filesx/a", None), url("webfs://share/dav/filesx/a"));
    }

    #[test]
    fn test_full_url_round_trip() {
        let v = volume("https://host/dav/files/");
        for s in [
            "webfs://share/",
            "webfs://share/docs/",
            "webfs://share/docs/a b.txt",
            "webfs://share/x/y/z/",
        ] {
            let p = url(s);
            let full = v.full_url(&p).unwrap();
            assert_eq!(v.webfs_url_from_server(&full), p, "via {full}");
        }
        assert_eq!(
            v.full_url(&url("webfs://share/docs/a.txt")).unwrap().as_str(),
            "https://host/dav/files/docs/a.txt"
        );
    }

    #[test]
    fn test_full_url_round_trip_escapes() {
        let v = volume("https://host/dav/my%20files/");
        for path in ["a%41.txt", "100% done/", "a b/c d.txt", "übersicht/ñ.md", "x#y?z.txt"] {
            let kind = if path.ends_with('/') { UrlKind::Folder } else { UrlKind::File };
            let p = WebfsUrl::new("share", path.trim_end_matches('/'), kind);
            let full = v.full_url(&p).unwrap();
            assert_eq!(v.webfs_url_from_server(&full), p, "via {full}");
        }
        assert_eq!(
            v.full_url(&url("webfs://share/a%41.txt")).unwrap().as_str(),
            "https://host/dav/my%20files/a%2541.txt"
        );
    }

    #[test]
    fn test_no_location() {
        let v = Volume::new("later", "Later", None, None, None);
        assert!(v.full_url(&v.root_url()).is_none());
        assert!(!v.is_equal(&Url::parse("https://host/").unwrap(), None, false));
        assert!(!v.can_connect());
    }

    #[test]
    fn test_is_equal() {
        let v = Volume::new(
            "share",
            "Share",
            Some(Url::parse("https://host/dav/").unwrap()),
            Some(Credentials::new("alice")),
            None,
        );
        let same = Url::parse("https://host/dav/").unwrap();
        let other_path = Url::parse("https://host/other/").unwrap();
        let alice = Credentials::new("alice");

        assert!(v.is_equal(&same, Some(&alice), true));
        assert!(!v.is_equal(&other_path, Some(&alice), true));
        assert!(v.is_equal(&other_path, Some(&alice), false));
        assert!(!v.is_equal(&same, Some(&Credentials::new("bob")), false));
        assert!(!v.is_equal(&same, None, false));
    }

    #[test]
    fn test_display_string() {
        let v = volume("https://host/");
        assert_eq!(v.display_string(&url("webfs://share/docs/a.txt")), "Share/docs/a.txt");
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let server = MemoryServer::new();
        server.set_info(ServerInfo {
            bytes_total: 100,
            bytes_free: 40,
            flags: 1,
        });
        let client: Arc<dyn RemoteClient> = server.client();
        let v = Volume::new(
            "share",
            "Share",
            Some(Url::parse("mem://files/").unwrap()),
            None,
            Some(client),
        );

        let first = v.connect().await.unwrap();
        let second = v.connect().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(server.handshakes(), 1);
        assert_eq!(v.stats().bytes_free, 40);

        v.disconnect().await;
        assert!(!first.is_connected());
    }

    #[tokio::test]
    async fn test_connect_failure_returns_none() {
        let server = MemoryServer::new();
        server.set_reachable(false);
        let v = Volume::new(
            "share",
            "Share",
            Some(Url::parse("mem://files/").unwrap()),
            None,
            Some(server.client()),
        );
        assert!(v.connect().await.is_none());

        let err = v
            .update_directory(&v.root_url(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(v.file_system().new_iterator(&v.root_url(), ListMode::ALL).is_none());
    }

    #[tokio::test]
    async fn test_update_directory_without_client() {
        let v = Volume::new("local", "Local", None, None, None);
        let docs = url("webfs://local/docs/");
        v.update_directory(&docs, &CancellationToken::new()).await.unwrap();
        assert_eq!(v.file_system().new_iterator(&docs, ListMode::ALL).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_update_directory_fetches() {
        let server = MemoryServer::new();
        server.add_file("/team/a.txt", 5).add_directory("/team/sub");
        let v = Volume::new(
            "share",
            "Share",
            Some(Url::parse("mem://files/team").unwrap()),
            None,
            Some(server.client()),
        );

        let root = v.root_url();
        v.update_directory(&root, &CancellationToken::new()).await.unwrap();
        let names: Vec<String> = v
            .file_system()
            .new_iterator(&root, ListMode::ALL)
            .unwrap()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["a.txt", "sub"]);
        assert!(v.discard_directory(&root));
    }

    #[test]
    fn test_insert_search_result() {
        let v = volume("https://host/dav");
        let hit = SearchHit {
            path: "/dav/deep/notes.txt".into(),
            entry: RemoteEntry::file("notes.txt", 9),
        };
        let found = v.insert_search_result(&hit);
        assert_eq!(found, url("webfs://share/deep/notes.txt"));
        assert!(v.file_system().file_exists(&found));
    }
}

//! Remote client abstraction.
//!
//! A [`RemoteClient`] speaks to one storage backend (WebDAV, a cloud API, an
//! in-memory test server) in its native path syntax. WebFS never talks wire
//! protocols itself: volumes hold a client created by the [`ClientRegistry`]
//! for their location's scheme and translate virtual URLs to native paths
//! before calling it.

mod memory;

pub use memory::{MemoryClientFactory, MemoryRemote, MemoryServer};

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{WebFsError, WebFsResult};
use crate::search::SearchQuery;

/// Opaque backend object attached to a cached entry.
pub type BackendObject = Arc<dyn Any + Send + Sync>;

// ============================================================================
// Credentials
// ============================================================================

/// Identity used to authenticate against a server.
///
/// Secrets are carried in `attributes`; WebFS only compares credentials, it
/// never interprets them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub user_name: String,
    pub attributes: BTreeMap<String, String>,
}

impl Credentials {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Whether `other` identifies the same account as these stored credentials.
    ///
    /// Named accounts compare by user name; anonymous ones compare every attribute.
    pub fn same_identity(&self, other: &Credentials) -> bool {
        if self.user_name.is_empty() {
            self.attributes == other.attributes
        } else {
            self.user_name == other.user_name
        }
    }
}

/// Identity comparison where either side may be absent.
pub fn credentials_match(stored: Option<&Credentials>, other: Option<&Credentials>) -> bool {
    match (stored, other) {
        (None, None) => true,
        (Some(stored), Some(other)) => stored.same_identity(other),
        _ => false,
    }
}

// ============================================================================
// Entries
// ============================================================================

/// One item of a remote directory listing.
#[derive(Clone, Debug, Default)]
pub struct RemoteEntry {
    pub name: String,
    pub created: Option<SystemTime>,
    pub modified: Option<SystemTime>,
    pub content_type: String,
    pub content_length: u64,
    pub directory: bool,
    /// Backend-specific flags, passed through untouched.
    pub flags: u32,
    /// Human-readable name when it differs from `name`.
    pub display_name: Option<String>,
    pub object: Option<BackendObject>,
}

impl RemoteEntry {
    pub fn file(name: impl Into<String>, content_length: u64) -> Self {
        Self {
            name: name.into(),
            content_length,
            ..Default::default()
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directory: true,
            ..Default::default()
        }
    }

    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_object(mut self, object: BackendObject) -> Self {
        self.object = Some(object);
        self
    }
}

/// A server-side search match: the entry plus its absolute native path.
#[derive(Clone, Debug)]
pub struct SearchHit {
    pub path: String,
    pub entry: RemoteEntry,
}

/// Capacity and capability data reported by a server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub bytes_total: u64,
    pub bytes_free: u64,
    pub flags: u32,
}

// ============================================================================
// Client traits
// ============================================================================

/// Connection to one remote backend.
///
/// Paths are native, absolute, and end with `/` for folders. Long-running
/// calls receive a [`CancellationToken`]; honoring it is advisory.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn connect(&self, host: &str) -> WebFsResult<()>;

    async fn disconnect(&self) -> WebFsResult<()>;

    async fn server_info(&self, path: &str) -> WebFsResult<ServerInfo>;

    /// List a directory. `Ok(None)` means the backend produced no listing.
    async fn open_directory(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> WebFsResult<Option<Vec<RemoteEntry>>>;

    async fn make_directory(&self, path: &str) -> WebFsResult<()>;

    async fn delete_resource(&self, path: &str) -> WebFsResult<()>;

    async fn move_resource(&self, source: &str, destination: &str) -> WebFsResult<()>;

    /// Server-side search, if the backend has it.
    fn search_client(&self) -> Option<&dyn SearchClient> {
        None
    }
}

/// Optional server-side search capability.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn find(
        &self,
        root: &str,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> WebFsResult<Vec<SearchHit>>;
}

// ============================================================================
// Client registry
// ============================================================================

/// Creates clients for one location scheme.
pub trait ClientFactory: Send + Sync {
    fn create(
        &self,
        location: &Url,
        credentials: Option<&Credentials>,
    ) -> WebFsResult<Arc<dyn RemoteClient>>;
}

impl<F> ClientFactory for F
where
    F: Fn(&Url, Option<&Credentials>) -> WebFsResult<Arc<dyn RemoteClient>> + Send + Sync,
{
    fn create(
        &self,
        location: &Url,
        credentials: Option<&Credentials>,
    ) -> WebFsResult<Arc<dyn RemoteClient>> {
        self(location, credentials)
    }
}

/// Maps location schemes (`https`, `mem`, ...) to client factories.
#[derive(Default)]
pub struct ClientRegistry {
    factories: HashMap<String, Arc<dyn ClientFactory>>,
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("protocols", &self.protocols())
            .finish()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `protocol`, replacing any previous one.
    pub fn register(&mut self, protocol: impl Into<String>, factory: impl ClientFactory + 'static) {
        self.factories.insert(protocol.into(), Arc::new(factory));
    }

    pub fn with(mut self, protocol: impl Into<String>, factory: impl ClientFactory + 'static) -> Self {
        self.register(protocol, factory);
        self
    }

    pub fn supports(&self, protocol: &str) -> bool {
        self.factories.contains_key(protocol)
    }

    pub fn protocols(&self) -> Vec<&str> {
        let mut protocols: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        protocols.sort_unstable();
        protocols
    }

    /// Create a new, unconnected client for `location`.
    pub fn create(
        &self,
        location: &Url,
        credentials: Option<&Credentials>,
    ) -> WebFsResult<Arc<dyn RemoteClient>> {
        let factory = self.factories.get(location.scheme()).ok_or_else(|| {
            WebFsError::invalid_argument(format!("no client for protocol {}", location.scheme()))
        })?;
        factory.create(location, credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_match_by_user_name() {
        let stored = Credentials::new("alice").with_attribute("token", "a");
        let other = Credentials::new("alice").with_attribute("token", "b");
        assert!(credentials_match(Some(&stored), Some(&other)));
        assert!(!credentials_match(Some(&stored), Some(&Credentials::new("bob"))));
    }

    #[test]
    fn test_anonymous_credentials_match_by_attributes() {
        let stored = Credentials::default().with_attribute("key", "1");
        assert!(credentials_match(
            Some(&stored),
            Some(&Credentials::default().with_attribute("key", "1"))
        ));
        assert!(!credentials_match(
            Some(&stored),
            Some(&Credentials::default().with_attribute("key", "2"))
        ));
    }

    #[test]
    fn test_credentials_presence_must_agree() {
        assert!(credentials_match(None, None));
        assert!(!credentials_match(Some(&Credentials::new("a")), None));
        assert!(!credentials_match(None, Some(&Credentials::new("a"))));
    }

    #[test]
    fn test_registry_creates_by_scheme() {
        let server = MemoryServer::new();
        let registry = ClientRegistry::new().with("mem", server.factory());
        assert!(registry.supports("mem"));
        assert_eq!(registry.protocols(), vec!["mem"]);

        let location = Url::parse("mem://files/team").unwrap();
        let client = registry.create(&location, None).unwrap();
        assert!(!client.is_connected());

        let other = Url::parse("https://example.com/").unwrap();
        assert!(matches!(
            registry.create(&other, None),
            Err(WebFsError::InvalidArgument(_))
        ));
    }
}

//! # webfs
//!
//! Remote volumes presented as one virtual file system.
//!
//! Each mounted [`Volume`] maps a server location (WebDAV share, cloud
//! bucket, ...) into the `webfs://<volume>/<path>` namespace and keeps a
//! cached directory tree of what has been listed so far. A
//! [`WebFileService`] owns the volume list and a single background worker:
//! - directory fetches, structural operations and searches are queued and
//!   run one at a time, with one retry for recoverable failures
//! - results land in the volume cache and are read synchronously
//!   through [`FileSystem`] or the aggregate [`RootFileSystem`]
//! - changes are announced on a [`FlowBus`] as [`WebFsFlow`] messages
//!
//! Backends plug in through [`RemoteClient`] and a [`ClientRegistry`] keyed
//! by location scheme. [`MemoryServer`] provides an in-process backend.

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod flows;
pub mod handler;
pub mod logging;
pub mod remote;
pub mod root;
pub mod search;
pub mod service;
pub mod url;
pub mod volume;

pub use cache::{
    DirectoryEntry, FileDescriptor, FileInfo, FileIterator, FileSystem, ListItem, ListMode,
};
pub use config::{MountSpec, WebFsConfig};
pub use error::{WebFsError, WebFsResult};
pub use flows::{
    FlowBus, FlowMessage, SharedWebFsFlowBus, Subscription, VolumeChangeReason, WebFsFlow,
    matches_pattern, shared_webfs_flow_bus,
};
pub use handler::{InsertPosition, VolumeHandler};
pub use remote::{
    ClientFactory, ClientRegistry, Credentials, MemoryRemote, MemoryServer, RemoteClient,
    RemoteEntry, SearchClient, SearchHit, ServerInfo,
};
pub use root::{RootFileSystem, VolumeInfo, VolumeType};
pub use search::{FileSearcher, SearchQuery, SearchSink};
pub use service::{
    DirectoryChangedAction, FileTask, ForegroundContext, ObserverId, Operation, PendingRequest,
    RemoteSession, RequestId, TransferState, WebFileService,
};
pub use url::{UrlKind, WebfsUrl};
pub use volume::{ServerHandler, Volume, VolumeStats};

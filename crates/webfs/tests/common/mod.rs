//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use url::Url;

use webfs::{
    ClientRegistry, Credentials, FileTask, MemoryRemote, MemoryServer, MountSpec, RemoteClient,
    RemoteEntry, RemoteSession, ServerInfo, WebFileService, WebFsConfig, WebFsError, WebFsResult,
    WebfsUrl,
};

pub fn url(s: &str) -> WebfsUrl {
    WebfsUrl::parse(s).unwrap()
}

/// A memory server with a small tree under `/team`.
pub fn team_server() -> MemoryServer {
    let server = MemoryServer::new();
    server
        .add_file("/team/readme.md", 10)
        .add_file("/team/docs/notes.txt", 20)
        .add_file("/team/docs/old/notes-2019.txt", 30)
        .add_directory("/team/p/x")
        .add_directory("/team/empty");
    server.set_info(ServerInfo {
        bytes_total: 1000,
        bytes_free: 250,
        flags: 0,
    });
    server
}

/// Service on the calling thread with `mem://` routed to `server`.
pub fn service_for(server: &MemoryServer) -> WebFileService {
    service_with(WebFsConfig::default(), server)
}

pub fn service_with(config: WebFsConfig, server: &MemoryServer) -> WebFileService {
    webfs::logging::init_with_default("webfs=debug");
    let clients = ClientRegistry::new().with("mem", server.factory());
    WebFileService::new(config, clients).unwrap()
}

/// Mount `mem://files/team` as `share`.
pub fn mount_share(service: &WebFileService) {
    service
        .mount_file_server(MountSpec::new("mem://files/team", "share", "Team Share"), None)
        .unwrap();
}

/// Run `f` on a thread other than the foreground.
pub fn off_foreground<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    std::thread::scope(|s| s.spawn(f).join().unwrap())
}

/// Drive a future to completion on a fresh runtime, for use inside [`off_foreground`].
pub fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

// ============================================================================
// FlakyRemote
// ============================================================================

/// Wraps a [`MemoryRemote`] and injects failures.
///
/// Null listings make `open_directory` return `Ok(None)`; transient failures
/// make the next listing or mutation fail with a recoverable error. Each
/// injected failure is used up once.
pub struct FlakyRemote {
    inner: Arc<MemoryRemote>,
    null_listings: AtomicUsize,
    transient_failures: AtomicUsize,
    listing_calls: AtomicUsize,
}

impl FlakyRemote {
    pub fn new(server: &MemoryServer) -> Arc<Self> {
        Arc::new(Self {
            inner: server.client(),
            null_listings: AtomicUsize::new(0),
            transient_failures: AtomicUsize::new(0),
            listing_calls: AtomicUsize::new(0),
        })
    }

    pub fn fail_listings(&self, count: usize) {
        self.null_listings.store(count, Ordering::SeqCst);
    }

    pub fn fail_transiently(&self, count: usize) {
        self.transient_failures.store(count, Ordering::SeqCst);
    }

    /// Calls to `open_directory`, including failed ones.
    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_transient(&self, what: &str) -> WebFsResult<()> {
        if Self::take(&self.transient_failures) {
            Err(WebFsError::transient(format!("injected failure: {what}")))
        } else {
            Ok(())
        }
    }

    /// Registry serving this client for `flaky://` locations.
    pub fn registry(self: &Arc<Self>, server: &MemoryServer) -> ClientRegistry {
        let client = Arc::clone(self);
        ClientRegistry::new()
            .with("mem", server.factory())
            .with(
                "flaky",
                move |_: &Url, _: Option<&Credentials>| -> WebFsResult<Arc<dyn RemoteClient>> {
                    Ok(client.clone() as Arc<dyn RemoteClient>)
                },
            )
    }
}

#[async_trait]
impl RemoteClient for FlakyRemote {
    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn connect(&self, host: &str) -> WebFsResult<()> {
        self.inner.connect(host).await
    }

    async fn disconnect(&self) -> WebFsResult<()> {
        self.inner.disconnect().await
    }

    async fn server_info(&self, path: &str) -> WebFsResult<ServerInfo> {
        self.inner.server_info(path).await
    }

    async fn open_directory(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> WebFsResult<Option<Vec<RemoteEntry>>> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take(&self.null_listings) {
            return Ok(None);
        }
        self.check_transient(path)?;
        self.inner.open_directory(path, cancel).await
    }

    async fn make_directory(&self, path: &str) -> WebFsResult<()> {
        self.check_transient(path)?;
        self.inner.make_directory(path).await
    }

    async fn delete_resource(&self, path: &str) -> WebFsResult<()> {
        self.check_transient(path)?;
        self.inner.delete_resource(path).await
    }

    async fn move_resource(&self, source: &str, destination: &str) -> WebFsResult<()> {
        self.check_transient(source)?;
        self.inner.move_resource(source, destination).await
    }
}

// ============================================================================
// Gate
// ============================================================================

/// A task that holds the worker until released.
pub struct Gate {
    rx: tokio::sync::Mutex<Option<oneshot::Receiver<()>>>,
}

impl Gate {
    pub fn new() -> (Arc<Self>, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                rx: tokio::sync::Mutex::new(Some(rx)),
            }),
            tx,
        )
    }
}

#[async_trait]
impl FileTask for Gate {
    async fn perform(&self, _session: &RemoteSession, _cancel: &CancellationToken) -> WebFsResult<()> {
        if let Some(rx) = self.rx.lock().await.take() {
            let _ = rx.await;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "gate"
    }
}

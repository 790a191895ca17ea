//! The WebFS service: mount API and asynchronous request pipeline.
//!
//! One [`WebFileService`] per application context. It owns the volume list,
//! the notification bus and a single background worker; everything that
//! talks to a server or mutates a cache goes through that worker in FIFO
//! order. The service is passed explicitly to whatever needs it.

mod foreground;
mod operation;
mod request;
mod session;
mod worker;

pub use foreground::ForegroundContext;
pub use operation::{DirectoryChangedAction, FileTask, Operation, TransferState};
pub use request::{ObserverId, PendingRequest, RequestId};
pub use session::RemoteSession;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::FileDescriptor;
use crate::config::{MountSpec, WebFsConfig};
use crate::error::{WebFsError, WebFsResult};
use crate::flows::{SharedWebFsFlowBus, Subscription, VolumeChangeReason, WebFsFlow, shared_webfs_flow_bus};
use crate::handler::{InsertPosition, VolumeHandler};
use crate::remote::{ClientRegistry, Credentials};
use crate::root::RootFileSystem;
use crate::search::FileSearcher;
use crate::url::WebfsUrl;
use crate::volume::{ServerHandler, Volume};
use request::{Observers, WorkItem};
use worker::Worker;

/// State shared between the service handle and its worker.
pub(crate) struct Shared {
    pub(crate) handler: VolumeHandler,
    pub(crate) flows: SharedWebFsFlowBus,
    pub(crate) config: WebFsConfig,
    pub(crate) clients: ClientRegistry,
    pub(crate) observers: Arc<Observers>,
}

/// Calls queued for the next foreground turn.
#[derive(Debug)]
enum Deferred {
    Unmount(String),
}

/// Process-wide entry point to remote volumes.
pub struct WebFileService {
    shared: Arc<Shared>,
    foreground: ForegroundContext,
    tx: Mutex<Option<mpsc::UnboundedSender<WorkItem>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    deferred: Mutex<VecDeque<Deferred>>,
    /// Set while a remount swaps volumes; suppresses the unmount notification.
    remounting: AtomicBool,
}

impl std::fmt::Debug for WebFileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebFileService")
            .field("volumes", &self.shared.handler)
            .field("foreground", &self.foreground)
            .field("running", &self.is_running())
            .finish()
    }
}

impl WebFileService {
    /// Start the service. The calling thread becomes the foreground thread.
    pub fn new(config: WebFsConfig, clients: ClientRegistry) -> WebFsResult<Self> {
        Self::with_foreground(config, clients, ForegroundContext::current())
    }

    /// Start the service with an explicit foreground thread.
    pub fn with_foreground(
        config: WebFsConfig,
        clients: ClientRegistry,
        foreground: ForegroundContext,
    ) -> WebFsResult<Self> {
        let shared = Arc::new(Shared {
            handler: VolumeHandler::new(),
            flows: shared_webfs_flow_bus(config.flow_capacity),
            clients,
            observers: Arc::new(Observers::default()),
            config,
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker::new(Arc::clone(&shared), rx);
        let handle = thread::Builder::new()
            .name(shared.config.worker_name.clone())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("Failed to create WebFS worker runtime: {e}");
                        return;
                    }
                };
                rt.block_on(worker.run());
            })?;

        info!(worker = %shared.config.worker_name, "WebFileService started");
        Ok(Self {
            shared,
            foreground,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
            deferred: Mutex::new(VecDeque::new()),
            remounting: AtomicBool::new(false),
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn config(&self) -> &WebFsConfig {
        &self.shared.config
    }

    pub fn volumes(&self) -> &VolumeHandler {
        &self.shared.handler
    }

    pub fn flows(&self) -> &SharedWebFsFlowBus {
        &self.shared.flows
    }

    /// Subscribe to notifications matching `pattern` (e.g. `volumes.*`).
    pub fn subscribe(&self, pattern: &str) -> Subscription {
        self.shared.flows.subscribe(pattern)
    }

    pub fn foreground(&self) -> ForegroundContext {
        self.foreground
    }

    /// The aggregate file system spanning all volumes.
    pub fn root(&self) -> RootFileSystem<'_> {
        RootFileSystem::new(self)
    }

    pub fn is_running(&self) -> bool {
        self.tx.lock().is_some()
    }

    fn send(&self, item: WorkItem) -> WebFsResult<()> {
        let tx = self.tx.lock();
        let tx = tx.as_ref().ok_or(WebFsError::Terminated)?;
        tx.send(item).map_err(|_| WebFsError::Terminated)
    }

    fn ticket<T>(&self, observer: ObserverId) -> (request::Ticket<T>, PendingRequest<T>) {
        Observers::ticket(&self.shared.observers, observer)
    }

    // ── Mounting ─────────────────────────────────────────────────────────

    /// Mount a server location as a volume. Foreground only.
    ///
    /// An empty location mounts a volume without client, reserving the name
    /// for a later [`remount_file_server`](Self::remount_file_server). The
    /// returned volume carries the final, possibly disambiguated, name.
    pub fn mount_file_server(
        &self,
        spec: MountSpec,
        server_handler: Option<ServerHandler>,
    ) -> WebFsResult<Arc<Volume>> {
        self.foreground.require("mount_file_server")?;
        if !self.is_running() {
            return Err(WebFsError::Terminated);
        }
        let volume = self.build_volume(spec, server_handler)?;
        Ok(self.attach_volume(volume, InsertPosition::default()))
    }

    /// Validate a mount request and create the volume's client.
    fn build_volume(
        &self,
        spec: MountSpec,
        server_handler: Option<ServerHandler>,
    ) -> WebFsResult<Volume> {
        if spec.name.is_empty() || spec.label.is_empty() {
            return Err(WebFsError::invalid_argument("volume name and label are required"));
        }

        let (location, client) = if spec.location.is_empty() {
            (None, None)
        } else {
            let location = Url::parse(&spec.location)
                .map_err(|e| WebFsError::invalid_url(format!("{}: {e}", spec.location)))?;
            let client = self
                .shared
                .clients
                .create(&location, spec.credentials.as_ref())?;
            (Some(location), Some(client))
        };

        Ok(
            Volume::new(spec.name, spec.label, location, spec.credentials, client)
                .with_kind(spec.kind)
                .with_hidden(spec.hidden)
                .with_server_handler(server_handler),
        )
    }

    fn attach_volume(&self, volume: Volume, position: InsertPosition) -> Arc<Volume> {
        let volume = self.shared.handler.add_volume(volume, position);
        info!(
            volume = %volume.name(),
            label = %volume.label(),
            location = volume.location().map(Url::as_str).unwrap_or(""),
            "Mounted file server"
        );
        self.shared.flows.publish(WebFsFlow::VolumesChanged {
            name: volume.name().to_string(),
            reason: VolumeChangeReason::Mounted,
        });
        volume
    }

    /// Mount every volume listed in the configuration, in order.
    pub fn mount_configured(&self) -> WebFsResult<Vec<Arc<Volume>>> {
        self.shared
            .config
            .volumes
            .clone()
            .into_iter()
            .map(|spec| self.mount_file_server(spec, None))
            .collect()
    }

    /// Unmount a volume.
    ///
    /// With `deferred` the unmount is queued for [`dispatch_deferred`](Self::dispatch_deferred)
    /// and may be requested from any thread; otherwise it runs now and must
    /// be called on the foreground thread. The volume disconnects on the worker.
    pub fn unmount_file_server(&self, name: &str, deferred: bool) -> WebFsResult<()> {
        if deferred {
            self.deferred
                .lock()
                .push_back(Deferred::Unmount(name.to_string()));
            return Ok(());
        }
        self.foreground.require("unmount_file_server")?;

        let volume = self
            .shared
            .handler
            .remove_volume(name)
            .ok_or_else(|| WebFsError::not_mounted(name))?;
        info!(volume = %name, "Unmounted file server");

        if !self.remounting.load(Ordering::SeqCst) {
            self.shared.flows.publish(WebFsFlow::VolumesChanged {
                name: name.to_string(),
                reason: VolumeChangeReason::Unmounted,
            });
        }
        if volume.can_connect() {
            if let Err(err) = self.send(WorkItem::Disconnect {
                volumes: vec![volume],
            }) {
                debug!(volume = %name, error = %err, "Skipping disconnect");
            }
        }
        Ok(())
    }

    /// Run calls queued for the foreground. Returns how many ran.
    pub fn dispatch_deferred(&self) -> WebFsResult<usize> {
        self.foreground.require("dispatch_deferred")?;
        let pending: Vec<Deferred> = self.deferred.lock().drain(..).collect();
        let count = pending.len();
        for call in pending {
            match call {
                Deferred::Unmount(name) => {
                    if let Err(err) = self.unmount_file_server(&name, false) {
                        warn!(volume = %name, error = %err, "Deferred unmount failed");
                    }
                }
            }
        }
        Ok(count)
    }

    /// Replace a volume's credentials and/or location, keeping its name,
    /// label and list position. Foreground only.
    ///
    /// Listeners see the mount notification but not the unmount in between.
    pub fn remount_file_server(
        &self,
        name: &str,
        new_credentials: Option<Credentials>,
        new_location: Option<&str>,
    ) -> WebFsResult<Arc<Volume>> {
        self.foreground.require("remount_file_server")?;
        let volume = self
            .shared
            .handler
            .open_volume(name)
            .ok_or_else(|| WebFsError::not_mounted(name))?;
        let position = self.shared.handler.volume_position(name);

        let spec = MountSpec {
            location: match new_location {
                Some(location) => location.to_string(),
                None => volume.location().map(Url::to_string).unwrap_or_default(),
            },
            name: volume.name().to_string(),
            label: volume.label().to_string(),
            kind: volume.kind().to_string(),
            credentials: new_credentials.or_else(|| volume.credentials().cloned()),
            hidden: volume.is_hidden(),
        };
        let server_handler = volume.server_handler().cloned();
        drop(volume);

        if !self.is_running() {
            return Err(WebFsError::Terminated);
        }
        // The old volume stays mounted until its replacement is valid.
        let replacement = self.build_volume(spec, server_handler)?;

        self.remounting.store(true, Ordering::SeqCst);
        let unmounted = self.unmount_file_server(name, false);
        self.remounting.store(false, Ordering::SeqCst);
        unmounted?;

        let position = position.map(InsertPosition::At).unwrap_or_default();
        let volume = self.attach_volume(replacement, position);
        info!(volume = %volume.name(), "Remounted file server");
        Ok(volume)
    }

    /// Whether a volume for exactly this location and account is mounted.
    pub fn is_mounted(&self, location: &str, credentials: Option<&Credentials>) -> bool {
        Url::parse(location).is_ok_and(|url| {
            self.shared
                .handler
                .open_with_server_url(&url, credentials, true)
                .is_some()
        })
    }

    /// Virtual URL for a server URL on any volume of the same host and account.
    pub fn translate_server_url(
        &self,
        server_url: &str,
        credentials: Option<&Credentials>,
    ) -> Option<WebfsUrl> {
        let url = Url::parse(server_url).ok()?;
        let volume = self
            .shared
            .handler
            .open_with_server_url(&url, credentials, false)?;
        Some(volume.webfs_url_from_server(&url))
    }

    /// Server URL behind a virtual URL.
    pub fn translate_webfs_url(&self, url: &WebfsUrl) -> Option<Url> {
        self.shared.handler.open_volume(url.host())?.full_url(url)
    }

    /// Handler object supplied when the addressed volume was mounted.
    pub fn open_handler(&self, url: &WebfsUrl) -> Option<ServerHandler> {
        self.shared
            .handler
            .open_volume(url.host())?
            .server_handler()
            .cloned()
    }

    pub fn open_file_item(&self, url: &WebfsUrl) -> Option<FileDescriptor> {
        self.shared
            .handler
            .open_volume(url.host())?
            .file_system()
            .open_file_item(url)
    }

    /// Unmount everything and stop the worker once it has drained its queue.
    ///
    /// Pending requests are cancelled. Later scheduling fails with
    /// [`WebFsError::Terminated`].
    pub fn terminate(&self) {
        let Some(tx) = self.tx.lock().take() else {
            return;
        };

        let volumes = self.shared.handler.remove_all();
        self.shared.observers.cancel_all();
        self.shared.flows.publish(WebFsFlow::VolumesChanged {
            name: String::new(),
            reason: VolumeChangeReason::Changed,
        });
        if !volumes.is_empty() && tx.send(WorkItem::Disconnect { volumes }).is_err() {
            warn!("Worker gone before shutdown disconnect");
        }
        drop(tx);

        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!("WebFS worker panicked");
            }
        }
        info!("WebFileService terminated");
    }

    // ── Requests ─────────────────────────────────────────────────────────

    /// Queue a fetch of the folder at `url` into its volume cache.
    pub fn request_directory(
        &self,
        observer: ObserverId,
        url: &WebfsUrl,
    ) -> WebFsResult<PendingRequest<()>> {
        let (ticket, pending) = self.ticket(observer);
        self.send(WorkItem::GetDirectory {
            url: url.clone(),
            ticket,
        })?;
        debug!(url = %url, request = %pending.id(), "Queued directory request");
        Ok(pending)
    }

    /// Fetch a folder on the calling thread, which must not be the foreground.
    pub async fn request_directory_inline(&self, url: &WebfsUrl) -> WebFsResult<()> {
        self.foreground.forbid("request_directory_inline")?;
        if !self.is_running() {
            return Err(WebFsError::Terminated);
        }
        self.shared
            .get_directory(url, &CancellationToken::new())
            .await
    }

    /// Queue a discard of the cached folder at `url`.
    pub fn discard_directory(
        &self,
        observer: ObserverId,
        url: &WebfsUrl,
    ) -> WebFsResult<PendingRequest<bool>> {
        let (ticket, pending) = self.ticket(observer);
        self.send(WorkItem::Discard {
            url: url.clone(),
            ticket,
        })?;
        Ok(pending)
    }

    /// Discard the cached folder at `url` immediately.
    pub fn discard_directory_now(&self, url: &WebfsUrl) -> WebFsResult<bool> {
        self.shared.discard(url)
    }

    /// Queue a file task for `url`.
    pub fn schedule_task(
        &self,
        observer: ObserverId,
        url: &WebfsUrl,
        task: Arc<dyn FileTask>,
    ) -> WebFsResult<PendingRequest<()>> {
        let (ticket, pending) = self.ticket(observer);
        debug!(url = %url, task = task.name(), request = %pending.id(), "Queued task");
        self.send(WorkItem::Task {
            url: url.clone(),
            task,
            ticket,
        })?;
        Ok(pending)
    }

    /// Queue a search.
    pub fn search(
        &self,
        observer: ObserverId,
        searcher: FileSearcher,
    ) -> WebFsResult<PendingRequest<Vec<WebfsUrl>>> {
        let (ticket, pending) = self.ticket(observer);
        self.send(WorkItem::Search { searcher, ticket })?;
        Ok(pending)
    }

    /// Queue a refresh of a volume's capacity statistics.
    ///
    /// Publishes [`WebFsFlow::VolumeInfoChanged`] when done.
    pub fn update_volume_info(&self, name: &str) -> WebFsResult<()> {
        self.send(WorkItem::UpdateVolume {
            name: name.to_string(),
        })
    }

    /// Cancel every pending or running request of `observer`.
    ///
    /// Running remote calls are not interrupted; their completions are dropped.
    pub fn cancel_operation(&self, observer: ObserverId) -> usize {
        let count = self.shared.observers.cancel(observer);
        if count > 0 {
            debug!(observer = %observer, count, "Cancelled requests");
        }
        count
    }

    /// Open a dedicated connection for `url`'s volume. Not on the foreground thread.
    pub async fn open_session(&self, url: &WebfsUrl) -> WebFsResult<RemoteSession> {
        self.foreground.forbid("open_session")?;
        let volume = self.shared.handler.resolve(url)?;
        let location = volume
            .location()
            .ok_or_else(|| WebFsError::connect_failed(volume.name()))?;

        let client = self
            .shared
            .clients
            .create(location, volume.credentials())?;
        client
            .connect(location.host_str().unwrap_or_default())
            .await?;
        Ok(RemoteSession::owned(
            Arc::clone(&volume),
            client,
            Arc::clone(&self.shared.flows),
            url.clone(),
        ))
    }

    /// Action that announces a change of `url`'s folder when a transfer completes.
    pub fn create_directory_changed_action(&self, url: &WebfsUrl) -> DirectoryChangedAction {
        DirectoryChangedAction::new(url, Arc::clone(&self.shared.flows))
    }
}

impl Drop for WebFileService {
    fn drop(&mut self) {
        // Closing the queue lets the worker finish what is queued and exit.
        self.tx.lock().take();
    }
}

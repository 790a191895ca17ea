//! The single background worker.
//!
//! Runs on a dedicated OS thread with its own current-thread tokio runtime
//! and executes [`WorkItem`]s one at a time in the order they were queued,
//! which gives a total order over every cache mutation and remote call the
//! service issues.
//!
//! ```text
//!   foreground / callers        mpsc (FIFO)         worker thread
//!   ┌──────────────────┐  ───────────────────▶  ┌────────────────────┐
//!   │ request_directory│                        │ retry envelope     │
//!   │ schedule_task    │  ◀───────────────────  │ remote client      │
//!   │ search           │   oneshot per request  │ cache write lock   │
//!   └──────────────────┘                        └────────────────────┘
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::operation::FileTask;
use super::request::WorkItem;
use super::session::RemoteSession;
use super::Shared;
use crate::error::{WebFsError, WebFsResult};
use crate::flows::WebFsFlow;
use crate::search::FileSearcher;
use crate::url::WebfsUrl;

// ── Request logic ────────────────────────────────────────────────────

impl Shared {
    /// Whether to run another attempt after `result`.
    ///
    /// Only the attempt's own error counts, and only a recoverable one.
    fn retry<T>(&self, result: &WebFsResult<T>, attempt: &mut u32, cancel: &CancellationToken) -> bool {
        match result {
            Err(err) if err.is_recoverable() && !cancel.is_cancelled() => {
                if *attempt < self.config.attempts() {
                    debug!(attempt = *attempt, error = %err, "Retrying request");
                    *attempt += 1;
                    true
                } else {
                    warn!(attempts = *attempt, error = %err, "Request failed after retries");
                    false
                }
            }
            _ => false,
        }
    }

    /// Fetch a folder into its volume's cache, with retry.
    pub(crate) async fn get_directory(
        &self,
        url: &WebfsUrl,
        cancel: &CancellationToken,
    ) -> WebFsResult<()> {
        let volume = self.handler.resolve(url)?;
        let mut attempt = 1;
        loop {
            let result = volume.update_directory(url, cancel).await;
            if !self.retry(&result, &mut attempt, cancel) {
                return result;
            }
        }
    }

    /// Run a file task against a connected session, with retry.
    pub(crate) async fn run_task(
        &self,
        url: &WebfsUrl,
        task: &dyn FileTask,
        cancel: &CancellationToken,
    ) -> WebFsResult<()> {
        let volume = self.handler.resolve(url)?;
        let mut attempt = 1;
        loop {
            let result = async {
                if cancel.is_cancelled() {
                    return Err(WebFsError::Cancelled);
                }
                let client = volume
                    .connect()
                    .await
                    .ok_or_else(|| WebFsError::connect_failed(volume.name()))?;
                let session = RemoteSession::shared(
                    Arc::clone(&volume),
                    client,
                    Arc::clone(&self.flows),
                    url.clone(),
                );
                task.perform(&session, cancel).await
            }
            .await;
            if !self.retry(&result, &mut attempt, cancel) {
                return result;
            }
        }
    }

    pub(crate) fn discard(&self, url: &WebfsUrl) -> WebFsResult<bool> {
        let volume = self.handler.resolve(url)?;
        Ok(volume.discard_directory(url))
    }

    async fn search(
        &self,
        searcher: &FileSearcher,
        cancel: &CancellationToken,
    ) -> WebFsResult<Vec<WebfsUrl>> {
        let volume = self.handler.resolve(searcher.start())?;
        let mut results = Vec::new();
        searcher.find(&volume, &mut results, cancel).await?;
        Ok(results)
    }

    async fn update_volume(&self, name: &str) {
        let Some(volume) = self.handler.open_volume(name) else {
            return;
        };
        let Some(client) = volume.connect().await else {
            return;
        };
        match client.server_info(&volume.remote_path(&volume.root_url())).await {
            Ok(info) => {
                volume.set_stats(info.into());
                self.flows.publish(WebFsFlow::VolumeInfoChanged {
                    name: name.to_string(),
                });
            }
            Err(err) => warn!(volume = %name, error = %err, "Volume info update failed"),
        }
    }
}

// ── Worker loop ──────────────────────────────────────────────────────

pub(crate) struct Worker {
    shared: Arc<Shared>,
    rx: mpsc::UnboundedReceiver<WorkItem>,
}

impl Worker {
    pub(crate) fn new(shared: Arc<Shared>, rx: mpsc::UnboundedReceiver<WorkItem>) -> Self {
        Self { shared, rx }
    }

    /// Process items until every sender is gone and the queue is drained.
    pub(crate) async fn run(mut self) {
        debug!("WebFS worker started");
        while let Some(item) = self.rx.recv().await {
            self.handle(item).await;
        }
        info!("WebFS worker stopped");
    }

    #[tracing::instrument(skip_all, fields(kind = item.kind()))]
    async fn handle(&self, item: WorkItem) {
        let shared = &self.shared;
        match item {
            WorkItem::GetDirectory { url, ticket } => {
                debug!(request = %ticket.id(), url = %url, "Fetching directory");
                let result = if ticket.is_cancelled() {
                    Err(WebFsError::Cancelled)
                } else {
                    shared.get_directory(&url, ticket.token()).await
                };
                ticket.complete(result);
            }
            WorkItem::Discard { url, ticket } => {
                let result = shared.discard(&url);
                ticket.complete(result);
            }
            WorkItem::Task { url, task, ticket } => {
                debug!(request = %ticket.id(), url = %url, task = task.name(), "Running task");
                let result = if ticket.is_cancelled() {
                    Err(WebFsError::Cancelled)
                } else {
                    shared.run_task(&url, task.as_ref(), ticket.token()).await
                };
                ticket.complete(result);
            }
            WorkItem::Search { searcher, ticket } => {
                let result = if ticket.is_cancelled() {
                    Err(WebFsError::Cancelled)
                } else {
                    shared.search(&searcher, ticket.token()).await
                };
                ticket.complete(result);
            }
            WorkItem::UpdateVolume { name } => shared.update_volume(&name).await,
            WorkItem::Disconnect { volumes } => {
                futures::future::join_all(volumes.iter().map(|v| v.disconnect())).await;
                debug!(count = volumes.len(), "Disconnected volumes");
            }
        }
    }
}

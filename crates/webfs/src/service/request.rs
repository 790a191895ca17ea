//! Request objects of the service pipeline.
//!
//! Each scheduled request becomes a [`WorkItem`] carrying a [`Ticket`]: the
//! reply channel, the observer tag and a cancellation token. The caller
//! keeps the matching [`PendingRequest`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::operation::FileTask;
use crate::error::WebFsResult;
use crate::search::FileSearcher;
use crate::url::WebfsUrl;
use crate::volume::Volume;

// ============================================================================
// Identifiers
// ============================================================================

/// Tags requests so they can be cancelled together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverId(Uuid);

impl ObserverId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Sequence number of a scheduled request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Pending requests
// ============================================================================

/// Caller side of a scheduled request.
///
/// Resolves to `None` when the request was cancelled: cancelled requests
/// never deliver a completion.
#[derive(Debug)]
pub struct PendingRequest<T> {
    id: RequestId,
    observer: ObserverId,
    rx: oneshot::Receiver<WebFsResult<T>>,
}

impl<T> PendingRequest<T> {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn observer(&self) -> ObserverId {
        self.observer
    }

    /// Wait for the result.
    pub async fn completion(self) -> Option<WebFsResult<T>> {
        self.rx.await.ok()
    }

    /// Wait for the result from synchronous code.
    ///
    /// Panics if called from within an async runtime, like
    /// [`oneshot::Receiver::blocking_recv`].
    pub fn blocking_completion(self) -> Option<WebFsResult<T>> {
        self.rx.blocking_recv().ok()
    }

    /// Take the result if it has been posted, for polling from an event loop.
    ///
    /// `Ok(None)` means still pending; `Err(())` that it was cancelled or dropped.
    pub fn try_completion(&mut self) -> Result<Option<WebFsResult<T>>, ()> {
        match self.rx.try_recv() {
            Ok(result) => Ok(Some(result)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => Err(()),
        }
    }
}

// ============================================================================
// Tickets
// ============================================================================

/// Cancellation tokens of in-flight requests, by observer.
#[derive(Debug, Default)]
pub(crate) struct Observers {
    next_id: AtomicU64,
    tokens: DashMap<ObserverId, Vec<(RequestId, CancellationToken)>>,
}

impl Observers {
    /// Create a tracked ticket and the caller's pending handle.
    pub(crate) fn ticket<T>(
        observers: &Arc<Self>,
        observer: ObserverId,
    ) -> (Ticket<T>, PendingRequest<T>) {
        let id = RequestId(observers.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = CancellationToken::new();
        observers
            .tokens
            .entry(observer)
            .or_default()
            .push((id, cancel.clone()));

        let (tx, rx) = oneshot::channel();
        let ticket = Ticket {
            id,
            observer,
            cancel,
            reply: Some(tx),
            observers: Arc::clone(observers),
        };
        (ticket, PendingRequest { id, observer, rx })
    }

    /// Cancel every tracked request of `observer`. Returns how many there were.
    pub(crate) fn cancel(&self, observer: ObserverId) -> usize {
        match self.tokens.remove(&observer) {
            Some((_, tokens)) => {
                for (_, token) in &tokens {
                    token.cancel();
                }
                tokens.len()
            }
            None => 0,
        }
    }

    /// Cancel everything, for shutdown.
    pub(crate) fn cancel_all(&self) {
        for entry in self.tokens.iter() {
            for (_, token) in entry.value() {
                token.cancel();
            }
        }
        self.tokens.clear();
    }

    fn untrack(&self, observer: ObserverId, id: RequestId) {
        let now_empty = match self.tokens.get_mut(&observer) {
            Some(mut tokens) => {
                tokens.retain(|(request, _)| *request != id);
                tokens.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.tokens.remove_if(&observer, |_, tokens| tokens.is_empty());
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.tokens.iter().map(|e| e.value().len()).sum()
    }
}

/// Worker side of a scheduled request.
///
/// Dropping a ticket without completing it untracks its token; the caller's
/// [`PendingRequest`] then resolves to `None`.
#[derive(Debug)]
pub(crate) struct Ticket<T> {
    id: RequestId,
    observer: ObserverId,
    cancel: CancellationToken,
    reply: Option<oneshot::Sender<WebFsResult<T>>>,
    observers: Arc<Observers>,
}

impl<T> Ticket<T> {
    pub(crate) fn id(&self) -> RequestId {
        self.id
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Post the result, unless the request was cancelled in the meantime.
    pub(crate) fn complete(mut self, result: WebFsResult<T>) {
        self.observers.untrack(self.observer, self.id);
        if self.cancel.is_cancelled() {
            tracing::debug!(request = %self.id, observer = %self.observer, "Dropping cancelled completion");
            return;
        }
        if let Some(reply) = self.reply.take() {
            // The caller may have dropped its handle; nobody is waiting then.
            let _ = reply.send(result);
        }
    }
}

impl<T> Drop for Ticket<T> {
    fn drop(&mut self) {
        self.observers.untrack(self.observer, self.id);
    }
}

// ============================================================================
// Work items
// ============================================================================

/// One unit of work for the service worker.
pub(crate) enum WorkItem {
    GetDirectory {
        url: WebfsUrl,
        ticket: Ticket<()>,
    },
    Discard {
        url: WebfsUrl,
        ticket: Ticket<bool>,
    },
    Task {
        url: WebfsUrl,
        task: Arc<dyn FileTask>,
        ticket: Ticket<()>,
    },
    Search {
        searcher: FileSearcher,
        ticket: Ticket<Vec<WebfsUrl>>,
    },
    /// Refresh capacity statistics and announce them.
    UpdateVolume { name: String },
    /// Tear down connections of unmounted volumes.
    Disconnect { volumes: Vec<Arc<Volume>> },
}

impl WorkItem {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::GetDirectory { .. } => "get_directory",
            Self::Discard { .. } => "discard",
            Self::Task { .. } => "task",
            Self::Search { .. } => "search",
            Self::UpdateVolume { .. } => "update_volume",
            Self::Disconnect { .. } => "disconnect",
        }
    }
}

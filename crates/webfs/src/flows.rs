//! FlowBus pub/sub for WebFS change notifications.
//!
//! Notifications are broadcast, payload-only and unacknowledged: the
//! service publishes a [`WebFsFlow`] and any number of listeners (a file
//! list, a volume menu) subscribe with NATS-style subject patterns and
//! re-query the cache when something they show has changed.
//!
//! Subjects are two dot-separated tokens (`volumes.mounted`,
//! `directory.changed`). A pattern token `*` matches any one token, so
//! `volumes.*` sees every volume list change.
//!
//! ```ignore
//! let bus = shared_webfs_flow_bus(256);
//! let mut sub = bus.subscribe("directory.changed");
//!
//! bus.publish(WebFsFlow::DirectoryChanged { url });
//!
//! while let Some(msg) = sub.recv().await {
//!     println!("refresh {}", msg.payload.url().unwrap());
//! }
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::url::WebfsUrl;

/// Whether `subject` matches `pattern`, token by token.
pub fn matches_pattern(pattern: &str, subject: &str) -> bool {
    let mut pattern = pattern.split('.');
    let mut subject = subject.split('.');
    loop {
        match (pattern.next(), subject.next()) {
            (None, None) => return true,
            (Some(p), Some(s)) if p == "*" || p == s => {}
            _ => return false,
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Why the volume list changed.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum VolumeChangeReason {
    Mounted,
    Unmounted,
    /// Bulk change such as terminate.
    Changed,
}

/// Notifications published by the service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum WebFsFlow {
    /// A volume was mounted or unmounted, or the whole list was reset.
    VolumesChanged {
        /// Volume name; empty for bulk changes.
        name: String,
        reason: VolumeChangeReason,
    },

    /// A cached folder may be stale; listeners should re-request it.
    DirectoryChanged { url: WebfsUrl },

    /// Capacity statistics of a volume were refreshed.
    VolumeInfoChanged { name: String },
}

impl WebFsFlow {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::VolumesChanged { reason, .. } => match reason {
                VolumeChangeReason::Mounted => "volumes.mounted",
                VolumeChangeReason::Unmounted => "volumes.unmounted",
                VolumeChangeReason::Changed => "volumes.changed",
            },
            Self::DirectoryChanged { .. } => "directory.changed",
            Self::VolumeInfoChanged { .. } => "volume.info_changed",
        }
    }

    /// Folder URL for directory notifications.
    pub fn url(&self) -> Option<&WebfsUrl> {
        match self {
            Self::DirectoryChanged { url } => Some(url),
            _ => None,
        }
    }

    /// Volume name for volume notifications.
    pub fn volume_name(&self) -> Option<&str> {
        match self {
            Self::VolumesChanged { name, .. } | Self::VolumeInfoChanged { name } => Some(name),
            Self::DirectoryChanged { url } => Some(url.host()),
        }
    }
}

/// A notification as delivered to subscribers.
#[derive(Clone, Debug)]
pub struct FlowMessage {
    pub subject: &'static str,
    pub payload: WebFsFlow,
}

// ============================================================================
// FlowBus
// ============================================================================

/// Broadcast bus for [`WebFsFlow`] notifications.
///
/// Publishing never blocks; a subscriber that falls more than `capacity`
/// messages behind skips the oldest ones and logs the lag.
#[derive(Debug)]
pub struct FlowBus {
    tx: broadcast::Sender<FlowMessage>,
}

impl FlowBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a notification. Returns the number of receivers it reached.
    pub fn publish(&self, payload: WebFsFlow) -> usize {
        let msg = FlowMessage {
            subject: payload.subject(),
            payload,
        };
        self.tx.send(msg).unwrap_or(0)
    }

    /// Subscribe to notifications whose subject matches `pattern`.
    pub fn subscribe(&self, pattern: &str) -> Subscription {
        Subscription {
            pattern: pattern.to_string(),
            rx: self.tx.subscribe(),
        }
    }
}

pub type SharedWebFsFlowBus = Arc<FlowBus>;

pub fn shared_webfs_flow_bus(capacity: usize) -> SharedWebFsFlowBus {
    Arc::new(FlowBus::new(capacity))
}

// ============================================================================
// Subscription
// ============================================================================

/// A filtered view of a [`FlowBus`].
pub struct Subscription {
    pattern: String,
    rx: broadcast::Receiver<FlowMessage>,
}

impl Subscription {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn lagged(&self, skipped: u64) {
        tracing::warn!(pattern = %self.pattern, lagged = skipped, "Flow subscription lagged behind");
    }

    /// Receive the next matching message, waiting if necessary.
    ///
    /// Returns None once the bus is gone.
    pub async fn recv(&mut self) -> Option<FlowMessage> {
        loop {
            match self.rx.recv().await {
                Ok(msg) if matches_pattern(&self.pattern, msg.subject) => return Some(msg),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => self.lagged(n),
            }
        }
    }

    /// Next matching message that is already queued.
    pub fn try_recv(&mut self) -> Option<FlowMessage> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) if matches_pattern(&self.pattern, msg.subject) => return Some(msg),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(n)) => self.lagged(n),
                Err(_) => return None,
            }
        }
    }

    /// Drain every matching message currently queued.
    pub fn drain(&mut self) -> Vec<FlowMessage> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

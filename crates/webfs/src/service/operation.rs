//! Structural operations and other scheduled file tasks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::session::RemoteSession;
use crate::error::{WebFsError, WebFsResult};
use crate::flows::{SharedWebFsFlowBus, WebFsFlow};
use crate::url::{UrlKind, WebfsUrl};

/// Work scheduled through [`WebFileService::schedule_task`](super::WebFileService::schedule_task).
///
/// Runs on the service worker with a connected session for the target URL.
/// Returning a recoverable error gets the task a second attempt.
#[async_trait]
pub trait FileTask: Send + Sync {
    async fn perform(&self, session: &RemoteSession, cancel: &CancellationToken) -> WebFsResult<()>;

    fn name(&self) -> &str {
        "task"
    }
}

/// Create, remove or move the session URL, then refresh the affected folders.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    CreateFolder,
    RemoveFile,
    MoveFile { target: WebfsUrl },
}

#[async_trait]
impl FileTask for Operation {
    async fn perform(&self, session: &RemoteSession, cancel: &CancellationToken) -> WebFsResult<()> {
        if cancel.is_cancelled() {
            return Err(WebFsError::Cancelled);
        }
        let source = session.url();

        match self {
            Self::CreateFolder => {
                let folder = source.with_kind(UrlKind::Folder);
                session
                    .client()
                    .make_directory(&session.remote_path_of(&folder))
                    .await?;
            }
            Self::RemoveFile => {
                session.client().delete_resource(&session.remote_path()).await?;
            }
            Self::MoveFile { target } => {
                if target.host() != source.host() {
                    return Err(WebFsError::not_supported("move between volumes"));
                }
                session
                    .client()
                    .move_resource(&session.remote_path(), &session.remote_path_of(target))
                    .await?;
            }
        }

        for folder in self.affected_folders(source) {
            session.notify_directory_changed(&folder);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        match self {
            Self::CreateFolder => "create_folder",
            Self::RemoveFile => "remove_file",
            Self::MoveFile { .. } => "move_file",
        }
    }
}

impl Operation {
    /// Parent folders whose listings change when this runs on `source`.
    ///
    /// A move touches both parents, unless one contains the other, in which
    /// case refreshing the outer one covers both.
    pub fn affected_folders(&self, source: &WebfsUrl) -> Vec<WebfsUrl> {
        let source_parent = source.ascend().unwrap_or_else(|| source.with_kind(UrlKind::Folder));
        let Self::MoveFile { target } = self else {
            return vec![source_parent];
        };
        let Some(target_parent) = target.ascend() else {
            return vec![source_parent];
        };

        if source_parent.contains(&target_parent) {
            vec![source_parent]
        } else if target_parent.contains(&source_parent) {
            vec![target_parent]
        } else {
            vec![source_parent, target_parent]
        }
    }
}

/// Progress of a content transfer that WebFS only observes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Announces a folder change when a transfer into it completes.
#[derive(Debug, Clone)]
pub struct DirectoryChangedAction {
    folder: WebfsUrl,
    flows: SharedWebFsFlowBus,
}

impl DirectoryChangedAction {
    /// Bind to `url`, or to its parent folder when `url` is a file.
    pub(crate) fn new(url: &WebfsUrl, flows: SharedWebFsFlowBus) -> Self {
        let folder = if url.is_folder() {
            url.clone()
        } else {
            url.ascend()
                .unwrap_or_else(|| WebfsUrl::volume_root(url.host()))
        };
        Self { folder, flows }
    }

    pub fn folder(&self) -> &WebfsUrl {
        &self.folder
    }

    /// Feed a transfer state. Returns true if a notification went out.
    pub fn on_transfer_state(&self, state: TransferState) -> bool {
        if state != TransferState::Completed {
            return false;
        }
        self.flows.publish(WebFsFlow::DirectoryChanged {
            url: self.folder.clone(),
        });
        true
    }
}

//! Connected view of a volume for structural operations.

use std::sync::Arc;

use crate::flows::{SharedWebFsFlowBus, WebFsFlow};
use crate::remote::RemoteClient;
use crate::url::WebfsUrl;
use crate::volume::Volume;

/// A connected client bound to a volume and a target URL.
///
/// Sessions built for scheduled tasks share the volume's client. Sessions
/// from [`WebFileService::open_session`](super::WebFileService::open_session)
/// own a separate connection, closed by [`RemoteSession::close`].
pub struct RemoteSession {
    volume: Arc<Volume>,
    client: Arc<dyn RemoteClient>,
    flows: SharedWebFsFlowBus,
    url: WebfsUrl,
    owned: bool,
}

impl std::fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession")
            .field("volume", &self.volume.name())
            .field("url", &self.url.to_string())
            .field("owned", &self.owned)
            .finish()
    }
}

impl RemoteSession {
    pub(crate) fn shared(
        volume: Arc<Volume>,
        client: Arc<dyn RemoteClient>,
        flows: SharedWebFsFlowBus,
        url: WebfsUrl,
    ) -> Self {
        Self {
            volume,
            client,
            flows,
            url,
            owned: false,
        }
    }

    pub(crate) fn owned(
        volume: Arc<Volume>,
        client: Arc<dyn RemoteClient>,
        flows: SharedWebFsFlowBus,
        url: WebfsUrl,
    ) -> Self {
        Self {
            owned: true,
            ..Self::shared(volume, client, flows, url)
        }
    }

    pub fn volume(&self) -> &Arc<Volume> {
        &self.volume
    }

    pub fn client(&self) -> &Arc<dyn RemoteClient> {
        &self.client
    }

    /// The URL the session was opened for.
    pub fn url(&self) -> &WebfsUrl {
        &self.url
    }

    /// Native path of the session URL.
    pub fn remote_path(&self) -> String {
        self.volume.remote_path(&self.url)
    }

    /// Native path of another URL on the same volume.
    pub fn remote_path_of(&self, url: &WebfsUrl) -> String {
        self.volume.remote_path(url)
    }

    /// Tell listeners to re-request `folder`. The cached listing stays
    /// readable until they do.
    pub fn notify_directory_changed(&self, folder: &WebfsUrl) {
        self.flows.publish(WebFsFlow::DirectoryChanged {
            url: folder.clone(),
        });
    }

    /// Disconnect an owned connection. Shared clients stay connected.
    pub async fn close(self) {
        if self.owned && self.client.is_connected() {
            if let Err(err) = self.client.disconnect().await {
                tracing::warn!(volume = %self.volume.name(), error = %err, "Session disconnect failed");
            }
        }
    }
}

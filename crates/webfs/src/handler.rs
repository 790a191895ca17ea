//! Registry of mounted volumes.
//!
//! Resolves the `webfs://<volume>/...` namespace to a [`Volume`]. Lookups
//! hand out `Arc<Volume>` clones so callers can keep using a volume after
//! the list lock is released, including after it was unmounted.

use std::sync::Arc;

use parking_lot::RwLock;
use url::Url;

use crate::error::{WebFsError, WebFsResult};
use crate::remote::Credentials;
use crate::url::WebfsUrl;
use crate::volume::Volume;

/// Where a new volume goes in the list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InsertPosition {
    Prepend,
    /// Index into the list; past the end appends.
    At(usize),
    #[default]
    Append,
}

/// Ordered list of mounted volumes.
#[derive(Default)]
pub struct VolumeHandler {
    volumes: RwLock<Vec<Arc<Volume>>>,
}

impl std::fmt::Debug for VolumeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.volumes.read().iter().map(|v| v.name().to_string()).collect();
        f.debug_struct("VolumeHandler").field("volumes", &names).finish()
    }
}

impl VolumeHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a volume, renaming it if its name is taken.
    ///
    /// A second `A` becomes `A1` labelled `"<label> (2)"`, a third `A2`
    /// labelled `"<label> (3)"`, and so on.
    pub fn add_volume(&self, mut volume: Volume, position: InsertPosition) -> Arc<Volume> {
        let mut volumes = self.volumes.write();

        let base = volume.name().to_string();
        let mut name = base.clone();
        let mut index = 1;
        while volumes.iter().any(|v| v.name() == name) {
            name = format!("{base}{index}");
            index += 1;
        }
        let label = if index > 1 {
            format!("{} ({index})", volume.label())
        } else {
            volume.label().to_string()
        };
        volume.rename(name, label);

        let volume = Arc::new(volume);
        let at = match position {
            InsertPosition::Prepend => 0,
            InsertPosition::At(i) => i.min(volumes.len()),
            InsertPosition::Append => volumes.len(),
        };
        volumes.insert(at, Arc::clone(&volume));
        volume
    }

    /// Remove a volume by name, returning it for teardown.
    pub fn remove_volume(&self, name: &str) -> Option<Arc<Volume>> {
        let mut volumes = self.volumes.write();
        let index = volumes.iter().position(|v| v.name() == name)?;
        Some(volumes.remove(index))
    }

    /// Remove every volume, returning them for teardown.
    pub fn remove_all(&self) -> Vec<Arc<Volume>> {
        std::mem::take(&mut *self.volumes.write())
    }

    pub fn open_volume(&self, name: &str) -> Option<Arc<Volume>> {
        self.volumes
            .read()
            .iter()
            .find(|v| v.name() == name)
            .cloned()
    }

    /// The volume a virtual URL addresses.
    pub fn resolve(&self, url: &WebfsUrl) -> WebFsResult<Arc<Volume>> {
        self.open_volume(url.host())
            .ok_or_else(|| WebFsError::not_mounted(url.host()))
    }

    /// First volume mounted for this server location and account.
    ///
    /// With `exact` the whole location must match; otherwise scheme and host do.
    pub fn open_with_server_url(
        &self,
        location: &Url,
        credentials: Option<&Credentials>,
        exact: bool,
    ) -> Option<Arc<Volume>> {
        self.volumes
            .read()
            .iter()
            .find(|v| v.is_equal(location, credentials, exact))
            .cloned()
    }

    pub fn volume_position(&self, name: &str) -> Option<usize> {
        self.volumes.read().iter().position(|v| v.name() == name)
    }

    /// Root folder URLs of all volumes, in list order.
    pub fn volume_locations(&self, want_hidden: bool) -> Vec<WebfsUrl> {
        self.volumes
            .read()
            .iter()
            .filter(|v| want_hidden || !v.is_hidden())
            .map(|v| v.root_url())
            .collect()
    }

    /// Snapshot of the volume list.
    pub fn volumes(&self) -> Vec<Arc<Volume>> {
        self.volumes.read().clone()
    }

    pub fn len(&self) -> usize {
        self.volumes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.read().is_empty()
    }
}

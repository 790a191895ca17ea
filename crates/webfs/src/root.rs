//! The aggregate file system over all mounted volumes.
//!
//! `webfs:///` lists one folder per volume; anything below a volume root is
//! delegated to that volume's cache. Structural calls are scheduled as
//! [`Operation`]s on the service worker.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{FileInfo, FileIterator, ListItem, ListMode};
use crate::constants::HIDDEN_FILE_PREFIX;
use crate::error::{WebFsError, WebFsResult};
use crate::service::{FileTask, ObserverId, Operation, PendingRequest, WebFileService};
use crate::url::WebfsUrl;

/// Storage class reported for volumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum VolumeType {
    Remote,
}

/// Description of a mounted volume.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub kind: VolumeType,
    /// Backend flavour given at mount time, e.g. `webdav`.
    pub sub_type: String,
    pub flags: u32,
    pub label: String,
    /// The volume name.
    pub serial_number: String,
    pub bytes_total: u64,
    pub bytes_free: u64,
}

/// Borrowed view of the service as one file system.
#[derive(Debug, Clone, Copy)]
pub struct RootFileSystem<'a> {
    service: &'a WebFileService,
}

impl<'a> RootFileSystem<'a> {
    pub(crate) fn new(service: &'a WebFileService) -> Self {
        Self { service }
    }

    /// List a folder.
    ///
    /// The aggregate root lists volume roots in mount order. Hidden volumes
    /// appear only when neither the configuration nor `mode` ignores them.
    /// Other folders list their cached children, or `None` while not cached.
    pub fn new_iterator(&self, url: &WebfsUrl, mode: ListMode) -> Option<FileIterator> {
        if !url.is_root() {
            return self
                .service
                .volumes()
                .open_volume(url.host())?
                .file_system()
                .new_iterator(url, mode);
        }

        if !mode.folders {
            return Some(FileIterator::new(Vec::new()));
        }
        let want_hidden = !self.service.config().ignore_hidden_in_root && !mode.ignore_hidden;
        let items = self
            .service
            .volumes()
            .volumes()
            .into_iter()
            .filter(|v| want_hidden || !v.is_hidden())
            .map(|v| ListItem {
                url: v.root_url(),
                name: v.name().to_string(),
                display_name: v.label().to_string(),
                directory: true,
                size: 0,
                modified: None,
            })
            .collect();
        Some(FileIterator::new(items))
    }

    pub fn file_exists(&self, url: &WebfsUrl) -> bool {
        if url.is_root() {
            return true;
        }
        self.service
            .volumes()
            .open_volume(url.host())
            .is_some_and(|v| v.file_system().file_exists(url))
    }

    pub fn file_info(&self, url: &WebfsUrl) -> Option<FileInfo> {
        if url.is_root() {
            return Some(FileInfo {
                directory: true,
                ..Default::default()
            });
        }
        self.service
            .volumes()
            .open_volume(url.host())?
            .file_system()
            .file_info(url)
    }

    /// Describe a volume. With `schedule_update` a refresh of its capacity
    /// statistics is queued; a `volume.info_changed` notification follows.
    pub fn volume_info(&self, name: &str, schedule_update: bool) -> Option<VolumeInfo> {
        let volume = self.service.volumes().open_volume(name)?;
        if schedule_update && volume.can_connect() {
            if let Err(err) = self.service.update_volume_info(name) {
                tracing::debug!(volume = %name, error = %err, "Volume update not scheduled");
            }
        }
        let stats = volume.stats();
        Some(VolumeInfo {
            kind: VolumeType::Remote,
            sub_type: volume.kind().to_string(),
            flags: stats.flags,
            label: volume.label().to_string(),
            serial_number: volume.name().to_string(),
            bytes_total: stats.bytes_total,
            bytes_free: stats.bytes_free,
        })
    }

    pub fn is_hidden_file(&self, url: &WebfsUrl) -> bool {
        url.name().starts_with(HIDDEN_FILE_PREFIX)
    }

    pub fn create_folder(
        &self,
        observer: ObserverId,
        url: &WebfsUrl,
    ) -> WebFsResult<PendingRequest<()>> {
        self.schedule(observer, url, Operation::CreateFolder)
    }

    pub fn remove_file(
        &self,
        observer: ObserverId,
        url: &WebfsUrl,
    ) -> WebFsResult<PendingRequest<()>> {
        self.schedule(observer, url, Operation::RemoveFile)
    }

    /// Remove an empty folder. Recursive removal is not available.
    pub fn remove_folder(
        &self,
        observer: ObserverId,
        url: &WebfsUrl,
        recursive: bool,
    ) -> WebFsResult<PendingRequest<()>> {
        if recursive {
            return Err(WebFsError::not_supported("recursive folder removal"));
        }
        self.schedule(observer, url, Operation::RemoveFile)
    }

    /// Move or rename within one volume.
    pub fn move_file(
        &self,
        observer: ObserverId,
        source: &WebfsUrl,
        target: &WebfsUrl,
    ) -> WebFsResult<PendingRequest<()>> {
        if target.host() != source.host() {
            return Err(WebFsError::not_supported("move between volumes"));
        }
        self.schedule(
            observer,
            source,
            Operation::MoveFile {
                target: target.clone(),
            },
        )
    }

    pub fn copy_file(&self, _source: &WebfsUrl, _target: &WebfsUrl) -> WebFsResult<()> {
        Err(WebFsError::not_supported("copy"))
    }

    fn schedule(
        &self,
        observer: ObserverId,
        url: &WebfsUrl,
        operation: Operation,
    ) -> WebFsResult<PendingRequest<()>> {
        if url.is_root() || url.is_volume_root() {
            return Err(WebFsError::invalid_argument(format!(
                "cannot {} {url}",
                operation.name()
            )));
        }
        self.service.schedule_task(observer, url, Arc::new(operation))
    }
}

//! Virtual URLs of the form `webfs://<volume>/<relative-path>`.
//!
//! The host names a mounted volume; the path is relative to the volume root
//! and carries no leading or trailing separator. Whether the URL addresses a
//! folder or a file is part of the URL itself ([`UrlKind`]), written as a
//! trailing `/` in the string form. The empty host addresses the aggregate
//! root that lists every mounted volume.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{WebFsError, WebFsResult};

/// Scheme of the virtual namespace.
pub const PROTOCOL: &str = "webfs";

/// Declared type of the addressed item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UrlKind {
    File,
    Folder,
}

/// An address in the virtual namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebfsUrl {
    host: String,
    path: String,
    kind: UrlKind,
}

impl WebfsUrl {
    /// Create a URL, normalizing separators in `path`.
    pub fn new(host: impl Into<String>, path: &str, kind: UrlKind) -> Self {
        Self {
            host: host.into(),
            path: normalize(path),
            kind,
        }
    }

    /// The aggregate root listing all volumes.
    pub fn root() -> Self {
        Self::new("", "", UrlKind::Folder)
    }

    /// The root folder of a volume.
    pub fn volume_root(name: impl Into<String>) -> Self {
        Self::new(name, "", UrlKind::Folder)
    }

    /// Parse `webfs://host/path`. A trailing `/` (or an empty path) makes a folder URL.
    pub fn parse(s: &str) -> WebFsResult<Self> {
        let rest = s
            .strip_prefix(PROTOCOL)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(|| WebFsError::invalid_url(s))?;

        let (host, path) = match rest.split_once('/') {
            Some((host, path)) => (host, path),
            None => (rest, ""),
        };
        if host.contains(':') || host.contains('\\') {
            return Err(WebFsError::invalid_url(s));
        }

        let kind = if path.is_empty() || path.ends_with('/') {
            UrlKind::Folder
        } else {
            UrlKind::File
        };
        Ok(Self::new(host, path, kind))
    }

    /// Volume name (empty for the aggregate root).
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Path relative to the volume root, without surrounding separators.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> UrlKind {
        self.kind
    }

    pub fn is_folder(&self) -> bool {
        self.kind == UrlKind::Folder
    }

    /// Whether this addresses the aggregate root.
    pub fn is_root(&self) -> bool {
        self.host.is_empty()
    }

    /// Whether this addresses the root folder of a volume.
    pub fn is_volume_root(&self) -> bool {
        !self.host.is_empty() && self.path.is_empty()
    }

    /// Path segments from the volume root.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }

    /// Last path segment, or the empty string at a volume root.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    /// Same location with a different declared kind.
    pub fn with_kind(&self, kind: UrlKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    /// Child of this URL.
    pub fn descend(&self, name: &str, kind: UrlKind) -> Self {
        let path = if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.path, name)
        };
        Self::new(self.host.clone(), &path, kind)
    }

    /// Parent folder, or `None` at a volume root.
    pub fn ascend(&self) -> Option<Self> {
        if self.path.is_empty() {
            return None;
        }
        let parent = match self.path.rsplit_once('/') {
            Some((parent, _)) => parent,
            None => "",
        };
        Some(Self::new(self.host.clone(), parent, UrlKind::Folder))
    }

    /// Whether `other` is this folder or lies beneath it on the same volume.
    pub fn contains(&self, other: &WebfsUrl) -> bool {
        if self.host != other.host || !self.is_folder() {
            return false;
        }
        self.path.is_empty()
            || other.path == self.path
            || other
                .path
                .strip_prefix(&self.path)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl fmt::Display for WebfsUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", PROTOCOL, self.host, self.path)?;
        if self.is_folder() && !self.path.is_empty() {
            f.write_str("/")?;
        }
        Ok(())
    }
}

impl FromStr for WebfsUrl {
    type Err = WebFsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Drop empty segments so `a//b/` and `/a/b` both become `a/b`.
fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

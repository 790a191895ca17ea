//! Service configuration, loaded from RON.
//!
//! ```ron
//! (
//!     worker_name: "WebFileService",
//!     max_attempts: 2,
//!     volumes: [
//!         (name: "share", label: "Team Share", location: "mem://files/team", kind: "webdav"),
//!     ],
//! )
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_FLOW_CAPACITY, DEFAULT_MAX_ATTEMPTS, DEFAULT_WORKER_NAME};
use crate::error::WebFsResult;
use crate::remote::Credentials;

/// Top-level service configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebFsConfig {
    /// Thread name of the background worker.
    pub worker_name: String,
    /// Attempts per request; values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Capacity of the notification bus.
    pub flow_capacity: usize,
    /// Skip hidden volumes when listing the aggregate root, whatever the list mode.
    pub ignore_hidden_in_root: bool,
    /// Volumes mounted by [`WebFileService::mount_configured`](crate::WebFileService::mount_configured).
    pub volumes: Vec<MountSpec>,
}

impl Default for WebFsConfig {
    fn default() -> Self {
        Self {
            worker_name: DEFAULT_WORKER_NAME.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            flow_capacity: DEFAULT_FLOW_CAPACITY,
            ignore_hidden_in_root: false,
            volumes: Vec::new(),
        }
    }
}

impl WebFsConfig {
    /// Parse a configuration from RON text.
    pub fn from_ron(text: &str) -> WebFsResult<Self> {
        Ok(ron::from_str(text)?)
    }

    /// Read and parse a RON configuration file.
    pub fn load(path: impl AsRef<Path>) -> WebFsResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Parameters of a single mount.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountSpec {
    /// Server location, e.g. `https://host/dav/`. Empty reserves the name
    /// for a volume that gets its location on a later remount.
    pub location: String,
    /// Requested volume name; disambiguated on collision.
    pub name: String,
    /// Display label.
    pub label: String,
    /// Volume sub type reported in volume info, e.g. `webdav`.
    pub kind: String,
    pub credentials: Option<Credentials>,
    /// Excluded from user-visible listings but still addressable.
    pub hidden: bool,
}

impl MountSpec {
    pub fn new(location: impl Into<String>, name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            name: name.into(),
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WebFsError;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = WebFsConfig::from_ron("()").unwrap();
        assert_eq!(config, WebFsConfig::default());
        assert_eq!(config.worker_name, "WebFileService");
        assert_eq!(config.attempts(), 2);
        assert!(!config.ignore_hidden_in_root);
    }

    #[test]
    fn test_parse_volumes() {
        let ron = r#"(
            max_attempts: 3,
            volumes: [
                (name: "share", label: "Share", location: "mem://files/team", kind: "webdav"),
                (name: "later", label: "Later", hidden: true),
                (
                    name: "private",
                    label: "Private",
                    location: "mem://files/me",
                    credentials: Some((user_name: "me")),
                ),
            ],
        )"#;
        let config = WebFsConfig::from_ron(ron).unwrap();
        assert_eq!(config.attempts(), 3);
        assert_eq!(config.volumes.len(), 3);
        assert_eq!(config.volumes[0].kind, "webdav");
        assert!(config.volumes[1].location.is_empty());
        assert!(config.volumes[1].hidden);
        assert_eq!(
            config.volumes[2].credentials.as_ref().map(|c| c.user_name.as_str()),
            Some("me")
        );
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let config = WebFsConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(config.attempts(), 1);
    }

    #[test]
    fn test_parse_error() {
        let err = WebFsConfig::from_ron("(max_attempts: \"two\")").unwrap_err();
        assert!(matches!(err, WebFsError::Config(_)));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "(worker_name: \"webfs-test\")").unwrap();
        let config = WebFsConfig::load(file.path()).unwrap();
        assert_eq!(config.worker_name, "webfs-test");
    }
}

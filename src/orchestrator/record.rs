//! Persisted install record.
//!
//! The record is rewritten after every completed step, so whatever a failed
//! operation managed to do is still known to the next Uninstall.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use super::error::RecordError;
use crate::endpoint::UpstreamEndpoint;

/// Lifecycle state of this host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallState {
    /// Nothing installed (or everything removed).
    #[default]
    Uninstalled,
    /// An Install is in progress or was interrupted.
    Installing,
    /// Install completed.
    Installed,
    /// A Refresh is in progress or was interrupted.
    Refreshing,
    /// An Uninstall is in progress or was interrupted.
    Uninstalling,
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallState::Uninstalled => "uninstalled",
            InstallState::Installing => "installing",
            InstallState::Installed => "installed",
            InstallState::Refreshing => "refreshing",
            InstallState::Uninstalling => "uninstalling",
        };
        f.write_str(name)
    }
}

/// What this tool has changed on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
    /// Current lifecycle state.
    #[serde(default)]
    pub state: InstallState,

    /// Registered service names.
    #[serde(default)]
    pub services: Vec<String>,

    /// Trusted CA thumbprints.
    #[serde(default)]
    pub ca_thumbprints: Vec<String>,

    /// Adapter IDs whose DNS servers were redirected.
    #[serde(default)]
    pub adapters: Vec<String>,

    /// Redirect map files written.
    #[serde(default)]
    pub redirect_maps: Vec<PathBuf>,

    /// Last save time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Endpoints chosen by the last probe, best first.
    #[serde(default)]
    pub endpoints: Vec<UpstreamEndpoint>,
}

impl InstallRecord {
    /// Load the record at `path`. A missing file is a fresh, uninstalled record.
    pub fn load(path: &Path) -> Result<Self, RecordError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No install record at {:?}", path);
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(RecordError::Read {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };
        toml::from_str(&contents).map_err(|e| RecordError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Stamp `updated_at` and atomically replace the file at `path`.
    pub fn save(&mut self, path: &Path) -> Result<(), RecordError> {
        self.updated_at = Some(Utc::now());
        let contents = toml::to_string_pretty(self)?;

        let write = || -> std::io::Result<()> {
            let dir = match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir,
                _ => Path::new("."),
            };
            fs::create_dir_all(dir)?;
            let mut tmp = NamedTempFile::new_in(dir)?;
            tmp.write_all(contents.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(path).map_err(|e| e.error)?;
            Ok(())
        };
        write().map_err(|e| RecordError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!("Saved install record ({}) to {:?}", self.state, path);
        Ok(())
    }

    /// Note a registered service.
    pub fn add_service(&mut self, name: &str) {
        push_unique(&mut self.services, name.to_string());
    }

    /// Note a trusted CA.
    pub fn add_thumbprint(&mut self, thumbprint: &str) {
        push_unique(&mut self.ca_thumbprints, thumbprint.to_string());
    }

    /// Drop thumbprints that are no longer trusted.
    pub fn remove_thumbprints(&mut self, removed: &[String]) {
        self.ca_thumbprints
            .retain(|t| !removed.iter().any(|r| r.eq_ignore_ascii_case(t)));
    }

    /// Note redirected adapters.
    pub fn add_adapters<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            push_unique(&mut self.adapters, id.into());
        }
    }

    /// Note written redirect maps.
    pub fn add_redirect_maps(&mut self, paths: &[PathBuf]) {
        for path in paths {
            push_unique(&mut self.redirect_maps, path.clone());
        }
    }

    /// Forget everything; the host is back to its original state.
    pub fn clear(&mut self) {
        *self = Self {
            updated_at: self.updated_at,
            ..Self::default()
        };
    }
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeSource;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_uninstalled() {
        let dir = tempdir().unwrap();
        let record = InstallRecord::load(&dir.path().join("install-record.toml")).unwrap();
        assert_eq!(record, InstallRecord::default());
        assert_eq!(record.state, InstallState::Uninstalled);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("install-record.toml");
        let mut record = InstallRecord {
            state: InstallState::Installed,
            ..Default::default()
        };
        record.add_service("AcrylicDNSProxySvc");
        record.add_service("AcrylicDNSProxySvc");
        record.add_thumbprint("ABCD");
        record.add_adapters(["{4D36E972-E325-11CE-BFC1-08002BE10318}"]);
        record.add_redirect_maps(&[dir.path().join("hosts.txt")]);
        record.endpoints = vec![UpstreamEndpoint {
            address: "203.0.113.9".parse().unwrap(),
            source: ProbeSource::LatencyTool,
        }];

        record.save(&path).unwrap();
        let loaded = InstallRecord::load(&path).unwrap();

        assert_eq!(loaded, record);
        assert_eq!(loaded.services, vec!["AcrylicDNSProxySvc"]);
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("state = \"installed\""));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("install-record.toml");
        fs::write(&path, "state = 42").unwrap();

        assert!(matches!(
            InstallRecord::load(&path),
            Err(RecordError::Parse { .. })
        ));
    }

    #[test]
    fn test_clear_and_remove_thumbprints() {
        let mut record = InstallRecord::default();
        record.add_thumbprint("AA");
        record.add_thumbprint("BB");

        record.remove_thumbprints(&["aa".to_string()]);
        assert_eq!(record.ca_thumbprints, vec!["BB"]);

        record.state = InstallState::Uninstalling;
        record.clear();
        assert_eq!(record.state, InstallState::Uninstalled);
        assert!(record.ca_thumbprints.is_empty());
    }
}

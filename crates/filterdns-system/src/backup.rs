//! Persistent DNS backup.
//!
//! The backup is written to disk *before* any resolver mutation and removed
//! only *after* a complete restore, so a SIGKILLed process can still be
//! rolled back by the next one. At most one backup exists per host; its
//! presence means DNS is (or was) diverted by us.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SystemError;

const BACKUP_FILE: &str = "dns-backup.json";

/// Original DNS settings captured before modification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsBackup {
    pub created_at: DateTime<Utc>,

    /// Always true in a written backup; the file's existence is the signal.
    pub dns_modified: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linux: Option<LinuxBackup>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub darwin: Option<DarwinBackup>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows: Option<WindowsBackup>,
}

impl DnsBackup {
    pub fn linux(payload: LinuxBackup) -> Self {
        Self {
            created_at: Utc::now(),
            dns_modified: true,
            linux: Some(payload),
            darwin: None,
            windows: None,
        }
    }

    pub fn darwin(payload: DarwinBackup) -> Self {
        Self {
            created_at: Utc::now(),
            dns_modified: true,
            linux: None,
            darwin: Some(payload),
            windows: None,
        }
    }

    pub fn windows(payload: WindowsBackup) -> Self {
        Self {
            created_at: Utc::now(),
            dns_modified: true,
            linux: None,
            darwin: None,
            windows: Some(payload),
        }
    }
}

/// Which Linux DNS management system was diverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinuxDnsSystem {
    #[serde(rename = "systemd-resolved")]
    SystemdResolved,
    #[serde(rename = "networkmanager")]
    NetworkManager,
    #[serde(rename = "resolvconf")]
    ResolvConf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinuxBackup {
    pub system: LinuxDnsSystem,

    /// NetworkManager: connection whose DNS settings were replaced.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub connection_name: String,

    /// NetworkManager: original `ipv4.dns` list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub original_dns: Vec<String>,

    /// NetworkManager: original `ipv4.ignore-auto-dns` flag.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ignore_auto_dns: bool,

    /// systemd-resolved: interface whose per-link DNS was set.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interface: String,

    /// resolvconf: `/etc/resolv.conf` was overwritten (the pre-change file
    /// lives in the sibling copy).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub resolvconf_modified: bool,
}

impl LinuxBackup {
    pub fn systemd_resolved(interface: impl Into<String>) -> Self {
        Self {
            system: LinuxDnsSystem::SystemdResolved,
            connection_name: String::new(),
            original_dns: Vec::new(),
            ignore_auto_dns: false,
            interface: interface.into(),
            resolvconf_modified: false,
        }
    }

    pub fn network_manager(
        connection_name: impl Into<String>,
        original_dns: Vec<String>,
        ignore_auto_dns: bool,
    ) -> Self {
        Self {
            system: LinuxDnsSystem::NetworkManager,
            connection_name: connection_name.into(),
            original_dns,
            ignore_auto_dns,
            interface: String::new(),
            resolvconf_modified: false,
        }
    }

    pub fn resolv_conf() -> Self {
        Self {
            system: LinuxDnsSystem::ResolvConf,
            connection_name: String::new(),
            original_dns: Vec::new(),
            ignore_auto_dns: false,
            interface: String::new(),
            resolvconf_modified: true,
        }
    }
}

/// macOS: network service name → original DNS servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DarwinBackup {
    pub services: BTreeMap<String, Vec<String>>,
}

/// Windows: interface index → original DNS servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowsBackup {
    pub interfaces: BTreeMap<u32, Vec<String>>,
}

/// Reads and writes the single on-disk backup document.
#[derive(Debug, Clone)]
pub struct BackupStore {
    path: PathBuf,
}

impl BackupStore {
    /// Store in the platform's state directory, creating it if needed.
    ///
    /// Failure to create the directory is one of the daemon's two fatal
    /// startup errors.
    pub fn new() -> Result<Self, SystemError> {
        let dir = default_dir();
        fs::create_dir_all(&dir)
            .map_err(|e| SystemError::BackupIo(format!("create {}: {e}", dir.display())))?;
        Ok(Self {
            path: dir.join(BACKUP_FILE),
        })
    }

    /// Store rooted at an explicit directory.
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(BACKUP_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a backup document is present.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Persist a backup. Must happen before the first mutation step.
    pub fn save(&self, backup: &DnsBackup) -> Result<(), SystemError> {
        let data = serde_json::to_vec_pretty(backup)
            .map_err(|e| SystemError::BackupIo(e.to_string()))?;
        fs::write(&self.path, data)
            .map_err(|e| SystemError::BackupIo(format!("write {}: {e}", self.path.display())))?;
        debug!(path = %self.path.display(), "dns backup saved");
        Ok(())
    }

    /// Load the backup.
    ///
    /// `Ok(None)` when no backup exists; `BackupCorrupt` when the file is
    /// present but unreadable or unparsable; the file stays on disk.
    pub fn load(&self) -> Result<Option<DnsBackup>, SystemError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SystemError::BackupIo(format!(
                    "read {}: {e}",
                    self.path.display()
                )));
            }
        };

        match serde_json::from_slice(&data) {
            Ok(backup) => Ok(Some(backup)),
            Err(_) => Err(SystemError::BackupCorrupt {
                path: self.path.clone(),
            }),
        }
    }

    /// Remove the backup after a completed restore; missing is a no-op.
    pub fn clear(&self) -> Result<(), SystemError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "dns backup cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SystemError::BackupIo(format!(
                "remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}

#[cfg(target_os = "macos")]
fn default_dir() -> PathBuf {
    PathBuf::from("/Library/Application Support/FilterDNS")
}

#[cfg(target_os = "windows")]
fn default_dir() -> PathBuf {
    let base = std::env::var_os("PROGRAMDATA").unwrap_or_else(|| "C:\\ProgramData".into());
    PathBuf::from(base).join("FilterDNS")
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn default_dir() -> PathBuf {
    PathBuf::from("/var/lib/filterdns")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_clear_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::with_dir(dir.path());
        assert!(!store.exists());
        assert!(store.load().unwrap().is_none());

        let backup = DnsBackup::linux(LinuxBackup::network_manager(
            "Wired connection 1",
            vec!["192.168.1.1".into()],
            false,
        ));
        store.save(&backup).unwrap();
        assert!(store.exists());

        let loaded = store.load().unwrap().unwrap();
        assert!(loaded.dns_modified);
        let linux = loaded.linux.unwrap();
        assert_eq!(linux.system, LinuxDnsSystem::NetworkManager);
        assert_eq!(linux.connection_name, "Wired connection 1");
        assert_eq!(linux.original_dns, vec!["192.168.1.1".to_string()]);

        store.clear().unwrap();
        assert!(!store.exists());
        // Clearing twice stays a no-op.
        store.clear().unwrap();
    }

    #[test]
    fn corrupt_backup_is_reported_and_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::with_dir(dir.path());
        fs::write(store.path(), b"{ not json").unwrap();

        match store.load() {
            Err(SystemError::BackupCorrupt { path }) => assert_eq!(path, store.path()),
            other => panic!("expected BackupCorrupt, got {other:?}"),
        }
        // The corrupt file is never deleted implicitly.
        assert!(store.exists());
    }

    #[test]
    fn linux_system_tag_matches_wire_names() {
        let backup = DnsBackup::linux(LinuxBackup::systemd_resolved("eth0"));
        let json = serde_json::to_string(&backup).unwrap();
        assert!(json.contains(r#""system":"systemd-resolved""#));
        assert!(json.contains(r#""interface":"eth0""#));
        assert!(json.contains(r#""dns_modified":true"#));
    }

    #[test]
    fn windows_interface_keys_survive_json() {
        let mut interfaces = BTreeMap::new();
        interfaces.insert(12u32, vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
        let backup = DnsBackup::windows(WindowsBackup { interfaces });

        let json = serde_json::to_string(&backup).unwrap();
        let parsed: DnsBackup = serde_json::from_str(&json).unwrap();
        let windows = parsed.windows.unwrap();
        assert_eq!(windows.interfaces[&12], vec!["10.0.0.1", "10.0.0.2"]);
    }
}

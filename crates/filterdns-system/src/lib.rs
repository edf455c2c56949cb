//! System DNS mutation for the FilterDNS client.
//!
//! One mutator per daemon owns the host's resolver configuration: it
//! diverts DNS to the loopback proxy, restores the user's original
//! settings, and keeps a persistent on-disk backup in between so a killed
//! process can be rolled back by the next one. All operations serialize
//! behind a single lock.

pub mod backup;
pub mod error;
mod process;

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "windows")]
mod windows;

use tokio::sync::Mutex;

pub use backup::{BackupStore, DarwinBackup, DnsBackup, LinuxBackup, LinuxDnsSystem, WindowsBackup};
pub use error::SystemError;

/// Owner of the host resolver configuration.
///
/// `set_dns` persists a backup before the first mutation step; `reset_dns`
/// deletes it only after the final restore step succeeds, and is a
/// successful no-op when no backup exists.
pub struct DnsMutator {
    backup: BackupStore,
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    paths: linux::ResolvConfPaths,
    lock: Mutex<()>,
}

impl DnsMutator {
    /// Mutator over the platform's default backup location.
    pub fn new() -> Result<Self, SystemError> {
        Ok(Self::with_backup(BackupStore::new()?))
    }

    /// Mutator over an explicit backup store.
    pub fn with_backup(backup: BackupStore) -> Self {
        Self {
            backup,
            #[cfg(not(any(target_os = "macos", target_os = "windows")))]
            paths: linux::ResolvConfPaths::default(),
            lock: Mutex::new(()),
        }
    }

    /// Mutator with overridden resolv.conf paths, for tests.
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    pub fn with_paths(backup: BackupStore, paths: linux::ResolvConfPaths) -> Self {
        Self {
            backup,
            paths,
            lock: Mutex::new(()),
        }
    }

    /// The backup store this mutator writes through.
    pub fn backup_store(&self) -> &BackupStore {
        &self.backup
    }

    /// Divert the system resolver to `server`.
    pub async fn set_dns(&self, server: &str) -> Result<(), SystemError> {
        let _guard = self.lock.lock().await;

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        return linux::set_dns(&self.backup, &self.paths, server).await;

        #[cfg(target_os = "macos")]
        return macos::set_dns(&self.backup, server).await;

        #[cfg(target_os = "windows")]
        return windows::set_dns(&self.backup, server).await;
    }

    /// Restore the resolver configuration recorded in the backup.
    pub async fn reset_dns(&self) -> Result<(), SystemError> {
        let _guard = self.lock.lock().await;

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        return linux::reset_dns(&self.backup, &self.paths).await;

        #[cfg(target_os = "macos")]
        return macos::reset_dns(&self.backup).await;

        #[cfg(target_os = "windows")]
        return windows::reset_dns(&self.backup).await;
    }

    /// DNS servers the system currently uses.
    pub async fn current_dns(&self) -> Result<Vec<String>, SystemError> {
        let _guard = self.lock.lock().await;

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        return linux::current_dns(&self.paths);

        #[cfg(target_os = "macos")]
        return macos::current_dns().await;

        #[cfg(target_os = "windows")]
        return windows::current_dns().await;
    }
}

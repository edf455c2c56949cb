//! Secret-store contract and implementations.
//!
//! Profile passwords are kept out of the config file. The daemon consumes
//! this trait; the keychain adapter is what production wiring installs,
//! while [`MemorySecretStore`] backs tests and embedding.

use std::collections::HashMap;

use parking_lot::RwLock;

use filterdns_core::defaults;

use crate::error::ConfigError;

/// Access to per-profile upstream passwords.
///
/// Implementations must be cheap to call from the query path: the DoH
/// sender reads the password on every request so external rotations take
/// effect without a restart.
pub trait SecretStore: Send + Sync {
    /// Password for `profile`, or `None` when none is stored.
    fn get_password(&self, profile: &str) -> Result<Option<String>, ConfigError>;

    /// Store or replace the password for `profile`.
    fn set_password(&self, profile: &str, password: &str) -> Result<(), ConfigError>;

    /// Remove the password for `profile`; absent entries are a no-op.
    fn delete_password(&self, profile: &str) -> Result<(), ConfigError>;
}

/// OS-keychain-backed secret store.
pub struct KeyringSecretStore;

impl KeyringSecretStore {
    fn entry(profile: &str) -> Result<keyring::Entry, ConfigError> {
        keyring::Entry::new(defaults::KEYRING_SERVICE, profile)
            .map_err(|e| ConfigError::Keychain(e.to_string()))
    }
}

impl SecretStore for KeyringSecretStore {
    fn get_password(&self, profile: &str) -> Result<Option<String>, ConfigError> {
        match Self::entry(profile)?.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(ConfigError::Keychain(e.to_string())),
        }
    }

    fn set_password(&self, profile: &str, password: &str) -> Result<(), ConfigError> {
        Self::entry(profile)?
            .set_password(password)
            .map_err(|e| ConfigError::Keychain(e.to_string()))
    }

    fn delete_password(&self, profile: &str) -> Result<(), ConfigError> {
        match Self::entry(profile)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(ConfigError::Keychain(e.to_string())),
        }
    }
}

/// In-memory secret store for tests and embedding.
#[derive(Default)]
pub struct MemorySecretStore {
    passwords: RwLock<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get_password(&self, profile: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.passwords.read().get(profile).cloned())
    }

    fn set_password(&self, profile: &str, password: &str) -> Result<(), ConfigError> {
        self.passwords
            .write()
            .insert(profile.to_string(), password.to_string());
        Ok(())
    }

    fn delete_password(&self, profile: &str) -> Result<(), ConfigError> {
        self.passwords.write().remove(profile);
        Ok(())
    }
}

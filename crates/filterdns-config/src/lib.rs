//! Configuration store and secret-store contract for the FilterDNS client.
//!
//! The configuration is a single human-editable JSON document in the
//! per-user config directory (`FilterDNS/config.json`). Profile passwords
//! never touch that file; they live behind the [`SecretStore`] trait, with
//! a system-keychain adapter and an in-memory implementation for tests.

pub mod error;
pub mod secrets;
pub mod store;
pub mod types;
pub mod validate;

pub use error::ConfigError;
pub use secrets::{KeyringSecretStore, MemorySecretStore, SecretStore};
pub use store::ConfigStore;
pub use types::{Config, Forwarder};
pub use validate::validate_config;

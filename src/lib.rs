//! # filterdns
//!
//! Desktop DNS-filtering client core: a loopback DNS proxy that forwards
//! queries to a remote filtering service over DNS-over-HTTPS, split-DNS
//! routing for selected domains, crash-safe mutation of the operating
//! system's resolver configuration, and a Unix-socket control plane.
//!
//! ## Crates
//!
//! - [`filterdns_core`] - Shared constants and defaults
//! - [`filterdns_config`] - Configuration store and secret-store contract
//! - [`filterdns_dns`] - Proxy, cache, forwarder matcher, bootstrap + DoH
//! - [`filterdns_system`] - Per-platform system DNS mutation and backup
//! - [`filterdns_daemon`] - Control-plane daemon and client

pub use filterdns_config as config;
pub use filterdns_core as core;
pub use filterdns_daemon as daemon;
pub use filterdns_dns as dns;
pub use filterdns_system as system;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use filterdns_config::{Config, ConfigStore, Forwarder, SecretStore};
    pub use filterdns_daemon::{CancellationToken, DaemonError};
    #[cfg(unix)]
    pub use filterdns_daemon::{Daemon, DaemonClient, DaemonOptions};
    pub use filterdns_dns::{DnsProxy, DnsProxyError};
    pub use filterdns_system::{BackupStore, DnsMutator, SystemError};
}

//! Control plane of the FilterDNS client.
//!
//! The daemon binds a Unix socket, serves a small JSON request/response
//! protocol (`ping`, `status`, `get_config`, `set_config`, `enable`,
//! `disable`), and owns every mutation of system DNS state. Before serving
//! it checks for an orphaned backup left by a killed predecessor and
//! restores the user's resolver settings. [`DaemonClient`] is the interface
//! external CLI and tray adapters drive the daemon through.

#[cfg(unix)]
mod client;
#[cfg(unix)]
mod daemon;
pub mod error;
pub mod protocol;

#[cfg(unix)]
pub use client::DaemonClient;
#[cfg(unix)]
pub use daemon::{Daemon, DaemonOptions};
pub use error::DaemonError;
pub use protocol::{Request, Response, StatusInfo};
pub use tokio_util::sync::CancellationToken;

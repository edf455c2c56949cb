//! Daemon and control-client errors.
//!
//! Display strings double as the `error` field on the wire, so they stay
//! short and lowercase.

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// `enable` requested before onboarding produced a profile.
    #[error("no profile configured")]
    NoProfileConfigured,

    /// Client side: the control socket is missing or unreachable.
    #[error("daemon unavailable: {0}")]
    Unavailable(String),

    /// Malformed JSON on the control socket.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server answered `success: false`; carries its error string.
    #[error("{0}")]
    Request(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] filterdns_config::ConfigError),

    #[error("{0}")]
    Proxy(#[from] filterdns_dns::DnsProxyError),

    #[error("{0}")]
    System(#[from] filterdns_system::SystemError),
}

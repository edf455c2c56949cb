//! Default configuration values.
//!
//! Centralized default constants for use across all crates.

// ============================================================================
// Proxy Defaults
// ============================================================================

/// Loopback address the DNS proxy binds (UDP and TCP).
pub const PROXY_LISTEN_ADDR: &str = "127.0.0.1:53";
/// Standard DNS port, assumed when a forwarder server omits one.
pub const DNS_PORT: u16 = 53;
/// Per-query budget for cache-miss resolution (upstream UDP or DoH).
pub const QUERY_TIMEOUT_SECS: u64 = 5;
/// Largest DNS message accepted over UDP.
pub const MAX_UDP_MESSAGE_BYTES: usize = 4096;

// ============================================================================
// Cache Defaults
// ============================================================================

/// Default response TTL, clamped down to the smallest answer RR TTL.
pub const CACHE_DEFAULT_TTL_SECS: u64 = 300;
/// Responses whose effective TTL falls below this are not cached.
pub const CACHE_MIN_TTL_SECS: u64 = 10;
/// Maximum number of cached responses.
pub const CACHE_CAPACITY: usize = 10_000;
/// Interval of the background sweep that drops expired entries.
pub const CACHE_PURGE_INTERVAL_SECS: u64 = 60;

// ============================================================================
// Upstream (DoH) Defaults
// ============================================================================

/// Upstream URL used when the config file carries none.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";
/// Public recursive servers used to resolve the DoH hostname, tried in order.
pub const BOOTSTRAP_SERVERS: [&str; 3] = ["1.1.1.1:53", "8.8.8.8:53", "9.9.9.9:53"];
/// Per-attempt timeout for a bootstrap lookup.
pub const BOOTSTRAP_TIMEOUT_SECS: u64 = 5;
/// Overall HTTPS transport timeout for a DoH exchange.
pub const DOH_TRANSPORT_TIMEOUT_SECS: u64 = 10;
/// Wire-format queries larger than this go out as POST instead of GET.
pub const DOH_POST_THRESHOLD_BYTES: usize = 2048;

// ============================================================================
// Control Socket Defaults
// ============================================================================

/// Well-known control socket path on POSIX systems.
pub const SOCKET_PATH: &str = "/var/run/filterdns.sock";
/// Client-side connect timeout.
pub const SOCKET_CONNECT_TIMEOUT_SECS: u64 = 5;
/// Total deadline for one request/response exchange.
pub const SOCKET_DEADLINE_SECS: u64 = 10;
/// Upper bound on a single control request document.
pub const MAX_CONTROL_REQUEST_BYTES: usize = 64 * 1024;

// ============================================================================
// Identity
// ============================================================================

/// Application name used for the per-user config directory.
pub const APP_NAME: &str = "FilterDNS";
/// Service name under which profile passwords live in the OS keychain.
pub const KEYRING_SERVICE: &str = "filterdns-client";

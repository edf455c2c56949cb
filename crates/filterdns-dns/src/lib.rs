//! DNS engine of the FilterDNS client.
//!
//! A loopback UDP+TCP proxy on `127.0.0.1:53` that answers from a bounded
//! TTL cache, shunts split-DNS domains to alternate recursive servers, and
//! forwards everything else to the upstream filtering service over
//! DNS-over-HTTPS (RFC 8484). The DoH endpoint's own hostname is resolved
//! out-of-band through a fixed list of public recursive servers so the
//! client never depends on the resolver it is about to replace.

pub mod bootstrap;
pub mod cache;
pub mod doh;
pub mod error;
pub mod forwarder;
pub mod message;
pub mod proxy;
pub mod stats;

pub use cache::DnsCache;
pub use doh::DohClient;
pub use error::DnsProxyError;
pub use forwarder::ForwarderMatcher;
pub use proxy::DnsProxy;
pub use stats::ProxyStats;

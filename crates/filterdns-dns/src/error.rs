//! DNS proxy errors.

#[derive(Debug, thiserror::Error)]
pub enum DnsProxyError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("dns message: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    #[error("invalid upstream url: {0}")]
    InvalidServerUrl(String),

    /// Bootstrap resolution failed or the HTTPS transport errored.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The DoH server answered with a non-200 status.
    #[error("doh server returned {status}: {body}")]
    UpstreamReject { status: u16, body: String },

    #[error("upstream query timed out")]
    UpstreamTimeout,
}

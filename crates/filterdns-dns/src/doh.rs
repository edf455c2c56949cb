//! DNS-over-HTTPS upstream client (RFC 8484).

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hickory_proto::op::Message;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use filterdns_core::defaults;

use crate::bootstrap;
use crate::error::DnsProxyError;

const DNS_MESSAGE_MIME: &str = "application/dns-message";
const PASSWORD_HEADER: &str = "X-FilterDNS-Password";
/// Longest error-body prefix carried in an `UpstreamReject`.
const REJECT_BODY_LIMIT: usize = 256;

/// Upstream DoH client.
///
/// Every dial to the upstream hostname is pinned to the IPv4 address the
/// bootstrap resolver produced, while TLS SNI and the Host header keep the
/// original hostname so certificate validation and vhost routing still
/// work. When bootstrap fails at construction time the transport is rebuilt
/// lazily on the next query; queries before that succeed fail with
/// `UpstreamUnavailable`.
#[derive(Debug)]
pub struct DohClient {
    server_url: String,
    endpoint: String,
    profile: String,
    host: String,
    port: u16,
    host_is_literal: bool,
    transport: RwLock<Option<reqwest::Client>>,
}

impl DohClient {
    /// Parse the upstream URL and attempt the initial bootstrap.
    ///
    /// URL problems are fatal; an unreachable bootstrap path is not.
    pub async fn new(server_url: &str, profile: &str) -> Result<Self, DnsProxyError> {
        let url = Url::parse(server_url)
            .map_err(|e| DnsProxyError::InvalidServerUrl(format!("{server_url}: {e}")))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(DnsProxyError::InvalidServerUrl(format!(
                    "{server_url}: unsupported scheme '{other}'"
                )));
            }
        }
        let host = url
            .host_str()
            .ok_or_else(|| DnsProxyError::InvalidServerUrl(format!("{server_url}: missing host")))?
            .to_string();
        let port = url.port_or_known_default().unwrap_or(443);
        let host_is_literal = host.parse::<IpAddr>().is_ok();

        let client = Self {
            endpoint: query_endpoint(server_url),
            server_url: server_url.to_string(),
            profile: profile.to_string(),
            host,
            port,
            host_is_literal,
            transport: RwLock::new(None),
        };

        if let Err(e) = client.ensure_transport().await {
            warn!(error = %e, "doh transport not ready yet, will retry on first query");
        }
        Ok(client)
    }

    /// Upstream URL as configured.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Profile this client sends queries under.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Send a wire-format query and return the wire-format answer.
    ///
    /// Queries up to the GET threshold travel as
    /// `GET /dns-query?dns=<base64url>`; larger ones as a POST body.
    pub async fn query(
        &self,
        wire: &[u8],
        password: Option<&str>,
    ) -> Result<Vec<u8>, DnsProxyError> {
        let client = self.ensure_transport().await?;

        let mut request = if use_post(wire.len()) {
            client
                .post(&self.endpoint)
                .header(CONTENT_TYPE, DNS_MESSAGE_MIME)
                .body(wire.to_vec())
        } else {
            client
                .get(&self.endpoint)
                .query(&[("dns", encode_dns_param(wire))])
        };
        if !self.profile.is_empty() {
            request = request.query(&[("profile", self.profile.as_str())]);
        }
        request = request.header(ACCEPT, DNS_MESSAGE_MIME);
        if let Some(pw) = password.filter(|pw| !pw.is_empty()) {
            request = request.header(PASSWORD_HEADER, pw);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DnsProxyError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.bytes().await.unwrap_or_default();
            let prefix = &body[..body.len().min(REJECT_BODY_LIMIT)];
            return Err(DnsProxyError::UpstreamReject {
                status: status.as_u16(),
                body: String::from_utf8_lossy(prefix).into_owned(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DnsProxyError::UpstreamUnavailable(e.to_string()))?;
        // Reject bodies that are not a DNS message before they reach the wire.
        Message::from_vec(&body)?;
        Ok(body.to_vec())
    }

    async fn ensure_transport(&self) -> Result<reqwest::Client, DnsProxyError> {
        if let Some(client) = self.transport.read().await.as_ref() {
            return Ok(client.clone());
        }

        let mut guard = self.transport.write().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(defaults::DOH_TRANSPORT_TIMEOUT_SECS));

        if !self.host_is_literal {
            let ip = bootstrap::resolve_ipv4(&self.host).await?;
            debug!(host = %self.host, ip = %ip, port = self.port, "pinning upstream dial");
            builder = builder.resolve(&self.host, SocketAddr::new(IpAddr::V4(ip), self.port));
        }

        let client = builder
            .build()
            .map_err(|e| DnsProxyError::UpstreamUnavailable(e.to_string()))?;
        *guard = Some(client.clone());
        Ok(client)
    }
}

/// `<server_url without trailing slash>/dns-query`.
fn query_endpoint(server_url: &str) -> String {
    format!("{}/dns-query", server_url.trim_end_matches('/'))
}

/// base64url without padding, as RFC 8484 requires for the `dns` parameter.
fn encode_dns_param(wire: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(wire)
}

/// Wire queries past this size switch from GET to POST.
fn use_post(wire_len: usize) -> bool {
    wire_len > defaults::DOH_POST_THRESHOLD_BYTES
}

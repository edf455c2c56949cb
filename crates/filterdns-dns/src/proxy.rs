//! Loopback DNS proxy: UDP + TCP listeners and query dispatch.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use hickory_proto::op::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use filterdns_config::{Config, Forwarder, SecretStore};
use filterdns_core::defaults;

use crate::cache::DnsCache;
use crate::doh::DohClient;
use crate::error::DnsProxyError;
use crate::forwarder::ForwarderMatcher;
use crate::message::{is_blocked_response, patch_id, question_key, servfail_for};
use crate::stats::ProxyStats;

/// The running loopback proxy.
///
/// Owns the listener tasks and the cache purge tick; dropping the proxy
/// without calling [`DnsProxy::stop`] leaves the tasks to die with the
/// runtime, so the daemon always stops it explicitly.
pub struct DnsProxy {
    state: Arc<ProxyState>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

struct ProxyState {
    matcher: ArcSwap<ForwarderMatcher>,
    doh: ArcSwap<DohClient>,
    cache: DnsCache,
    stats: ProxyStats,
    secrets: Arc<dyn SecretStore>,
}

impl DnsProxy {
    /// Build the upstream client, bind both listeners and start serving.
    ///
    /// A failed bind on either socket is fatal and surfaced to the caller;
    /// a failed bootstrap is not (the DoH client retries lazily).
    pub async fn start(
        config: &Config,
        secrets: Arc<dyn SecretStore>,
    ) -> Result<Self, DnsProxyError> {
        let doh = DohClient::new(&config.server_url, &config.profile).await?;

        let state = Arc::new(ProxyState {
            matcher: ArcSwap::from_pointee(ForwarderMatcher::new(&config.forwarders)),
            doh: ArcSwap::from_pointee(doh),
            cache: DnsCache::new(),
            stats: ProxyStats::new(),
            secrets,
        });

        let udp = UdpSocket::bind(defaults::PROXY_LISTEN_ADDR).await?;
        let tcp = TcpListener::bind(defaults::PROXY_LISTEN_ADDR).await?;
        info!(addr = defaults::PROXY_LISTEN_ADDR, "dns proxy listening");

        let shutdown = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(serve_udp(Arc::new(udp), state.clone(), shutdown.clone())),
            tokio::spawn(serve_tcp(tcp, state.clone(), shutdown.clone())),
            tokio::spawn(purge_tick(state.clone(), shutdown.clone())),
        ];

        Ok(Self {
            state,
            shutdown,
            tasks,
        })
    }

    /// Stop the listeners and abort in-flight upstream work.
    pub async fn stop(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        info!("dns proxy stopped");
    }

    /// Atomically replace the split-DNS rule set.
    pub fn update_forwarders(&self, forwarders: &[Forwarder]) {
        self.state
            .matcher
            .store(Arc::new(ForwarderMatcher::new(forwarders)));
        debug!(rules = forwarders.len(), "forwarders updated");
    }

    /// Apply a new configuration without dropping the bound listeners.
    ///
    /// Always swaps the matcher; additionally tears down and rebuilds the
    /// DoH client (fresh bootstrap included) when the profile or upstream
    /// URL changed.
    pub async fn update_config(&self, config: &Config) -> Result<(), DnsProxyError> {
        self.update_forwarders(&config.forwarders);

        let current = self.state.doh.load();
        if current.profile() != config.profile || current.server_url() != config.server_url {
            info!(
                profile = %config.profile,
                server_url = %config.server_url,
                "rebuilding doh client"
            );
            let doh = DohClient::new(&config.server_url, &config.profile).await?;
            self.state.doh.store(Arc::new(doh));
        }
        Ok(())
    }

    /// `(queries_total, queries_blocked)`.
    pub fn stats(&self) -> (u64, u64) {
        self.state.stats.snapshot()
    }
}

async fn serve_udp(socket: Arc<UdpSocket>, state: Arc<ProxyState>, shutdown: CancellationToken) {
    let mut buf = vec![0u8; defaults::MAX_UDP_MESSAGE_BYTES];
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                debug!("udp listener stopped");
                return;
            }

            result = socket.recv_from(&mut buf) => {
                let (len, peer) = match result {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "udp recv failed");
                        continue;
                    }
                };
                let query = buf[..len].to_vec();
                let socket = socket.clone();
                let state = state.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        response = handle_query(&state, &query) => {
                            if let Some(bytes) = response {
                                if let Err(e) = socket.send_to(&bytes, peer).await {
                                    debug!(error = %e, %peer, "udp send failed");
                                }
                            }
                        }
                    }
                });
            }
        }
    }
}

async fn serve_tcp(listener: TcpListener, state: Arc<ProxyState>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                debug!("tcp listener stopped");
                return;
            }

            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "tcp accept failed");
                        continue;
                    }
                };
                let state = state.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        result = serve_tcp_conn(stream, state) => {
                            if let Err(e) = result {
                                debug!(error = %e, %peer, "tcp connection closed");
                            }
                        }
                    }
                });
            }
        }
    }
}

/// Serve length-prefixed DNS queries on one TCP connection until EOF.
async fn serve_tcp_conn(mut stream: TcpStream, state: Arc<ProxyState>) -> std::io::Result<()> {
    loop {
        let len = match stream.read_u16().await {
            Ok(len) => len as usize,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };
        let mut query = vec![0u8; len];
        stream.read_exact(&mut query).await?;

        if let Some(response) = handle_query(&state, &query).await {
            if response.len() > usize::from(u16::MAX) {
                debug!(len = response.len(), "response exceeds tcp frame limit");
                continue;
            }
            stream.write_u16(response.len() as u16).await?;
            stream.write_all(&response).await?;
            stream.flush().await?;
        }
    }
}

/// Periodically drop expired cache entries.
async fn purge_tick(state: Arc<ProxyState>, shutdown: CancellationToken) {
    let mut tick = tokio::time::interval(Duration::from_secs(defaults::CACHE_PURGE_INTERVAL_SECS));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tick.tick() => state.cache.purge_expired(),
        }
    }
}

/// Dispatch one query: cache, then split-DNS match, then DoH.
///
/// Failures are never retried; they are answered with a SERVFAIL-shaped
/// reply (or nothing at all when the input is not even a DNS message).
async fn handle_query(state: &ProxyState, query: &[u8]) -> Option<Vec<u8>> {
    state.stats.record_query();

    let Ok(msg) = Message::from_vec(query) else {
        debug!("dropping unparsable query");
        return servfail_for(query);
    };
    let Some((name, qtype)) = question_key(&msg) else {
        return servfail_for(query);
    };

    if let Some(mut cached) = state.cache.get(&name, qtype) {
        patch_id(&mut cached, msg.id());
        debug!(name = %name, qtype, "cache hit");
        return Some(cached);
    }

    let budget = Duration::from_secs(defaults::QUERY_TIMEOUT_SECS);
    let outcome = timeout(budget, resolve_upstream(state, query, &name)).await;

    let response = match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            warn!(name = %name, error = %e, "query failed");
            return servfail_for(query);
        }
        Err(_) => {
            warn!(name = %name, "query timed out");
            return servfail_for(query);
        }
    };

    // The cache write happens after the timeout gate, so a cancelled
    // upstream call can never store a partial result.
    state.cache.insert(&name, qtype, &response);

    if let Ok(parsed) = Message::from_vec(&response)
        && is_blocked_response(&parsed)
    {
        state.stats.record_blocked();
    }

    Some(response)
}

/// Forward a cache miss to its upstream: a split-DNS server when a rule
/// matches, the filtering service over DoH otherwise.
async fn resolve_upstream(
    state: &ProxyState,
    query: &[u8],
    name: &str,
) -> Result<Vec<u8>, DnsProxyError> {
    let server = state
        .matcher
        .load()
        .match_domain(name)
        .map(|server| server.to_string());

    if let Some(server) = server {
        debug!(name = %name, server = %server, "split dns forward");
        return forward_udp(query, &server).await;
    }

    let doh = state.doh.load_full();
    let password = match state.secrets.get_password(doh.profile()) {
        Ok(password) => password,
        Err(e) => {
            warn!(error = %e, "secret store lookup failed, sending without password");
            None
        }
    };
    doh.query(query, password.as_deref()).await
}

/// Plain UDP exchange with a split-DNS server. Port 53 is assumed when the
/// server string carries none.
async fn forward_udp(query: &[u8], server: &str) -> Result<Vec<u8>, DnsProxyError> {
    let addr = if server.contains(':') {
        server.to_string()
    } else {
        format!("{server}:{}", defaults::DNS_PORT)
    };
    let target = tokio::net::lookup_host(&addr)
        .await?
        .next()
        .ok_or_else(|| DnsProxyError::UpstreamUnavailable(format!("cannot resolve {addr}")))?;

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.send_to(query, target).await?;

    let mut buf = vec![0u8; defaults::MAX_UDP_MESSAGE_BYTES];
    let (len, _) = socket.recv_from(&mut buf).await?;
    Ok(buf[..len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use filterdns_config::MemorySecretStore;
    use hickory_proto::op::{MessageType, OpCode, Query, ResponseCode};
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::{Name, RData, Record, RecordType};
    use std::net::Ipv4Addr;

    async fn test_state(forwarders: &[Forwarder]) -> Arc<ProxyState> {
        // IP-literal upstream: no bootstrap, and port 9 refuses connections
        // so the DoH path fails fast where a test needs it to.
        let doh = DohClient::new("http://127.0.0.1:9", "home").await.unwrap();
        Arc::new(ProxyState {
            matcher: ArcSwap::from_pointee(ForwarderMatcher::new(forwarders)),
            doh: ArcSwap::from_pointee(doh),
            cache: DnsCache::new(),
            stats: ProxyStats::new(),
            secrets: Arc::new(MemorySecretStore::new()),
        })
    }

    fn query_wire(id: u16, name: &str) -> Vec<u8> {
        let mut msg = Message::new();
        msg.set_id(id);
        msg.set_message_type(MessageType::Query);
        msg.set_op_code(OpCode::Query);
        msg.set_recursion_desired(true);
        msg.add_query(Query::query(
            Name::from_ascii(format!("{name}.")).unwrap(),
            RecordType::A,
        ));
        msg.to_vec().unwrap()
    }

    fn answer_for(request: &Message, ip: Ipv4Addr, ttl: u32) -> Vec<u8> {
        let mut response = Message::new();
        response.set_id(request.id());
        response.set_message_type(MessageType::Response);
        response.add_queries(request.queries().to_vec());
        response.add_answer(Record::from_rdata(
            request.queries()[0].name().clone(),
            ttl,
            RData::A(A::from(ip)),
        ));
        response.to_vec().unwrap()
    }

    /// Fake split-DNS server answering `count` queries with the given IP.
    async fn spawn_fake_dns(ip: Ipv4Addr, count: usize) -> (String, JoinHandle<()>) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            for _ in 0..count {
                let (len, peer) = socket.recv_from(&mut buf).await.unwrap();
                let request = Message::from_vec(&buf[..len]).unwrap();
                let response = answer_for(&request, ip, 300);
                socket.send_to(&response, peer).await.unwrap();
            }
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn empty_question_gets_servfail() {
        let state = test_state(&[]).await;
        let mut msg = Message::new();
        msg.set_id(0x1010);
        msg.set_message_type(MessageType::Query);
        let wire = msg.to_vec().unwrap();

        let response = handle_query(&state, &wire).await.unwrap();
        let parsed = Message::from_vec(&response).unwrap();
        assert_eq!(parsed.id(), 0x1010);
        assert_eq!(parsed.response_code(), ResponseCode::ServFail);
        assert_eq!(state.stats.snapshot().0, 1);
    }

    #[tokio::test]
    async fn split_dns_forward_and_cache() {
        let (addr, server) = spawn_fake_dns(Ipv4Addr::new(100, 64, 0, 1), 1).await;
        let state = test_state(&[Forwarder {
            domain: "ts.net".into(),
            server: addr,
        }])
        .await;

        let response = handle_query(&state, &query_wire(0x2001, "a.b.ts.net"))
            .await
            .unwrap();
        let parsed = Message::from_vec(&response).unwrap();
        assert_eq!(parsed.id(), 0x2001);
        assert_eq!(parsed.answers().len(), 1);
        server.await.unwrap();

        // Second query is served from cache (the fake server answered only
        // once) with the new transaction ID patched in.
        let cached = handle_query(&state, &query_wire(0x2002, "a.b.ts.net"))
            .await
            .unwrap();
        let parsed = Message::from_vec(&cached).unwrap();
        assert_eq!(parsed.id(), 0x2002);
        assert_eq!(parsed.answers().len(), 1);
        assert_eq!(state.stats.snapshot().0, 2);
    }

    #[tokio::test]
    async fn blocked_response_counts() {
        let (addr, server) = spawn_fake_dns(Ipv4Addr::UNSPECIFIED, 1).await;
        let state = test_state(&[Forwarder {
            domain: "ads.example".into(),
            server: addr,
        }])
        .await;

        handle_query(&state, &query_wire(1, "ads.example")).await.unwrap();
        server.await.unwrap();
        assert_eq!(state.stats.snapshot(), (1, 1));
    }

    #[tokio::test]
    async fn doh_failure_yields_servfail() {
        let state = test_state(&[]).await;
        let response = handle_query(&state, &query_wire(0x3003, "example.com"))
            .await
            .unwrap();
        let parsed = Message::from_vec(&response).unwrap();
        assert_eq!(parsed.id(), 0x3003);
        assert_eq!(parsed.response_code(), ResponseCode::ServFail);
        // Failures must not populate the cache.
        assert!(state.cache.is_empty());
    }

    #[tokio::test]
    async fn matcher_swap_reroutes_live() {
        let (addr, server) = spawn_fake_dns(Ipv4Addr::new(10, 0, 0, 53), 1).await;
        let state = test_state(&[]).await;

        // No rule yet: the name would go to the (dead) DoH upstream.
        let miss = handle_query(&state, &query_wire(1, "x.corp")).await.unwrap();
        assert_eq!(
            Message::from_vec(&miss).unwrap().response_code(),
            ResponseCode::ServFail
        );

        state.matcher.store(Arc::new(ForwarderMatcher::new(&[Forwarder {
            domain: "*.corp".into(),
            server: addr,
        }])));

        let hit = handle_query(&state, &query_wire(2, "x.corp")).await.unwrap();
        assert_eq!(Message::from_vec(&hit).unwrap().answers().len(), 1);
        server.await.unwrap();
    }
}

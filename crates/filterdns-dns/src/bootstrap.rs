//! Bootstrap resolution of the DoH endpoint's hostname.
//!
//! By the time the DoH client is in use, the system resolver points at the
//! very proxy that depends on it, so the upstream hostname is resolved
//! out-of-band: a plain A lookup over UDP against a fixed, ordered list of
//! public recursive servers. The first server that answers wins.

use std::net::Ipv4Addr;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RData, RecordType};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info};

use filterdns_core::defaults;

use crate::error::DnsProxyError;

/// Resolve `hostname` to an IPv4 address via the bootstrap server list.
pub async fn resolve_ipv4(hostname: &str) -> Result<Ipv4Addr, DnsProxyError> {
    for server in defaults::BOOTSTRAP_SERVERS {
        match lookup_a(hostname, server).await {
            Ok(ip) => {
                info!(host = hostname, ip = %ip, server, "bootstrap resolved upstream");
                return Ok(ip);
            }
            Err(e) => {
                debug!(host = hostname, server, error = %e, "bootstrap attempt failed");
            }
        }
    }

    Err(DnsProxyError::UpstreamUnavailable(format!(
        "bootstrap resolution failed for {hostname}"
    )))
}

/// One A lookup against one recursive server.
async fn lookup_a(hostname: &str, server: &str) -> Result<Ipv4Addr, DnsProxyError> {
    let query = build_query(hostname)?;
    let wire = query.to_vec()?;

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.send_to(&wire, server).await?;

    let mut buf = vec![0u8; defaults::MAX_UDP_MESSAGE_BYTES];
    let deadline = Duration::from_secs(defaults::BOOTSTRAP_TIMEOUT_SECS);
    let (len, _) = timeout(deadline, socket.recv_from(&mut buf))
        .await
        .map_err(|_| DnsProxyError::UpstreamTimeout)??;

    let response = Message::from_vec(&buf[..len])?;
    if response.id() != query.id() {
        return Err(DnsProxyError::UpstreamUnavailable(format!(
            "bootstrap response id mismatch from {server}"
        )));
    }

    first_a(&response).ok_or_else(|| {
        DnsProxyError::UpstreamUnavailable(format!("no A record for {hostname} from {server}"))
    })
}

/// Recursion-desired A query with a random transaction ID.
fn build_query(hostname: &str) -> Result<Message, DnsProxyError> {
    let name = Name::from_ascii(format!("{hostname}."))
        .map_err(|e| DnsProxyError::InvalidServerUrl(format!("{hostname}: {e}")))?;

    let mut msg = Message::new();
    msg.set_id(rand::random::<u16>());
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    msg.add_query(Query::query(name, RecordType::A));
    Ok(msg)
}

/// First A record in the answer section.
fn first_a(msg: &Message) -> Option<Ipv4Addr> {
    msg.answers().iter().find_map(|record| match record.data() {
        RData::A(a) => Some(a.0),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::Record;
    use hickory_proto::rr::rdata::{A, CNAME};

    #[test]
    fn query_asks_for_a_record() {
        let msg = build_query("filter.example").unwrap();
        assert_eq!(msg.queries().len(), 1);
        let q = &msg.queries()[0];
        assert_eq!(q.query_type(), RecordType::A);
        assert_eq!(q.name().to_ascii(), "filter.example.");
        assert!(msg.recursion_desired());
    }

    #[test]
    fn rejects_unparsable_hostname() {
        build_query("not a hostname").unwrap_err();
    }

    #[test]
    fn first_a_skips_cname() {
        let name = Name::from_ascii("filter.example.").unwrap();
        let target = Name::from_ascii("edge.example.").unwrap();

        let mut msg = Message::new();
        msg.add_answer(Record::from_rdata(
            name,
            300,
            RData::CNAME(CNAME(target.clone())),
        ));
        msg.add_answer(Record::from_rdata(
            target,
            300,
            RData::A(A::from(Ipv4Addr::new(203, 0, 113, 9))),
        ));

        assert_eq!(first_a(&msg), Some(Ipv4Addr::new(203, 0, 113, 9)));
    }

    #[test]
    fn first_a_none_without_a_records() {
        let msg = Message::new();
        assert_eq!(first_a(&msg), None);
    }

    #[tokio::test]
    async fn lookup_resolves_against_local_server() {
        // A one-shot fake recursive server on loopback.
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let responder = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            let request = Message::from_vec(&buf[..len]).unwrap();

            let mut response = Message::new();
            response.set_id(request.id());
            response.set_message_type(MessageType::Response);
            response.add_queries(request.queries().to_vec());
            response.add_answer(Record::from_rdata(
                request.queries()[0].name().clone(),
                300,
                RData::A(A::from(Ipv4Addr::new(203, 0, 113, 9))),
            ));
            server
                .send_to(&response.to_vec().unwrap(), peer)
                .await
                .unwrap();
        });

        let ip = lookup_a("filter.example", &server_addr.to_string())
            .await
            .unwrap();
        assert_eq!(ip, Ipv4Addr::new(203, 0, 113, 9));
        responder.await.unwrap();
    }
}

//! DNS wire-format helpers shared by the proxy, cache and upstream clients.

use std::net::{Ipv4Addr, Ipv6Addr};

use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::RData;

/// Overwrite the transaction ID in a wire-format message.
///
/// Cached responses are stored with the ID of the query that produced them;
/// the proxy patches the copy before it goes back on the wire.
pub fn patch_id(wire: &mut [u8], id: u16) {
    if wire.len() >= 2 {
        wire[0..2].copy_from_slice(&id.to_be_bytes());
    }
}

/// Cache key for a parsed query: lowercased name without the trailing dot,
/// plus the numeric query type. `None` when the question section is empty.
pub fn question_key(msg: &Message) -> Option<(String, u16)> {
    let query = msg.queries().first()?;
    let name = normalize_name(&query.name().to_ascii());
    Some((name, u16::from(query.query_type())))
}

/// Lowercase a domain name and strip the trailing dot.
pub fn normalize_name(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Build a SERVFAIL-shaped reply echoing the query's ID and question.
///
/// Returns `None` when the input does not even parse as a DNS message, in
/// which case there is nothing meaningful to answer.
pub fn servfail_for(query: &[u8]) -> Option<Vec<u8>> {
    let request = Message::from_vec(query).ok()?;
    let mut response = Message::new();
    response.set_id(request.id());
    response.set_message_type(MessageType::Response);
    response.set_op_code(request.op_code());
    response.set_recursion_desired(request.recursion_desired());
    response.set_recursion_available(true);
    response.set_response_code(ResponseCode::ServFail);
    response.add_queries(request.queries().to_vec());
    response.to_vec().ok()
}

/// Whether a response looks like the upstream blocked the domain:
/// NXDOMAIN, or an A answer of 0.0.0.0, or an AAAA answer of `::`.
pub fn is_blocked_response(msg: &Message) -> bool {
    if msg.response_code() == ResponseCode::NXDomain {
        return true;
    }

    msg.answers().iter().any(|record| match record.data() {
        RData::A(a) => a.0 == Ipv4Addr::UNSPECIFIED,
        RData::AAAA(aaaa) => aaaa.0 == Ipv6Addr::UNSPECIFIED,
        _ => false,
    })
}

/// Smallest TTL across the answer section, `None` when there are no answers.
pub fn min_answer_ttl(msg: &Message) -> Option<u32> {
    msg.answers().iter().map(|record| record.ttl()).min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::{OpCode, Query};
    use hickory_proto::rr::rdata::{A, AAAA};
    use hickory_proto::rr::{Name, Record, RecordType};

    fn query_message(id: u16, name: &str, qtype: RecordType) -> Message {
        let mut msg = Message::new();
        msg.set_id(id);
        msg.set_message_type(MessageType::Query);
        msg.set_op_code(OpCode::Query);
        msg.set_recursion_desired(true);
        msg.add_query(Query::query(Name::from_ascii(name).unwrap(), qtype));
        msg
    }

    fn answer(name: &str, rdata: RData, ttl: u32) -> Record {
        Record::from_rdata(Name::from_ascii(name).unwrap(), ttl, rdata)
    }

    #[test]
    fn patch_id_rewrites_first_two_bytes() {
        let mut wire = query_message(0x1111, "example.com.", RecordType::A)
            .to_vec()
            .unwrap();
        patch_id(&mut wire, 0xbeef);
        let parsed = Message::from_vec(&wire).unwrap();
        assert_eq!(parsed.id(), 0xbeef);
    }

    #[test]
    fn question_key_lowercases_and_strips_dot() {
        let msg = query_message(1, "WWW.Example.COM.", RecordType::AAAA);
        let (name, qtype) = question_key(&msg).unwrap();
        assert_eq!(name, "www.example.com");
        assert_eq!(qtype, u16::from(RecordType::AAAA));
    }

    #[test]
    fn question_key_none_for_empty_question() {
        let msg = Message::new();
        assert!(question_key(&msg).is_none());
    }

    #[test]
    fn servfail_echoes_id_and_question() {
        let wire = query_message(0x4242, "fail.example.", RecordType::A)
            .to_vec()
            .unwrap();
        let reply = servfail_for(&wire).unwrap();
        let parsed = Message::from_vec(&reply).unwrap();
        assert_eq!(parsed.id(), 0x4242);
        assert_eq!(parsed.response_code(), ResponseCode::ServFail);
        assert_eq!(parsed.message_type(), MessageType::Response);
        assert_eq!(parsed.queries().len(), 1);
    }

    #[test]
    fn servfail_none_for_garbage() {
        assert!(servfail_for(&[0x01]).is_none());
    }

    #[test]
    fn nxdomain_is_blocked() {
        let mut msg = Message::new();
        msg.set_response_code(ResponseCode::NXDomain);
        assert!(is_blocked_response(&msg));
    }

    #[test]
    fn zero_a_answer_is_blocked() {
        let mut msg = Message::new();
        msg.add_answer(answer(
            "ads.example.",
            RData::A(A::from(Ipv4Addr::UNSPECIFIED)),
            300,
        ));
        assert!(is_blocked_response(&msg));
    }

    #[test]
    fn zero_aaaa_answer_is_blocked() {
        let mut msg = Message::new();
        msg.add_answer(answer(
            "ads.example.",
            RData::AAAA(AAAA::from(Ipv6Addr::UNSPECIFIED)),
            300,
        ));
        assert!(is_blocked_response(&msg));
    }

    #[test]
    fn normal_answer_is_not_blocked() {
        let mut msg = Message::new();
        msg.add_answer(answer(
            "example.com.",
            RData::A(A::from(Ipv4Addr::new(93, 184, 216, 34))),
            300,
        ));
        assert!(!is_blocked_response(&msg));
    }

    #[test]
    fn min_ttl_across_answers() {
        let mut msg = Message::new();
        msg.add_answer(answer(
            "a.example.",
            RData::A(A::from(Ipv4Addr::new(10, 0, 0, 1))),
            120,
        ));
        msg.add_answer(answer(
            "a.example.",
            RData::A(A::from(Ipv4Addr::new(10, 0, 0, 2))),
            30,
        ));
        assert_eq!(min_answer_ttl(&msg), Some(30));
    }

    #[test]
    fn min_ttl_none_without_answers() {
        assert_eq!(min_answer_ttl(&Message::new()), None);
    }
}
